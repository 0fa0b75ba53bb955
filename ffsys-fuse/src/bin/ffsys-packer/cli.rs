use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// FFSys image file
    pub image: PathBuf,

    /// Host directory whose files are packed into a freshly formatted
    /// image
    #[arg(long, short)]
    pub source: Option<PathBuf>,

    /// Block size used when formatting
    #[arg(long, short, default_value_t = 1024)]
    pub block_size: u16,

    /// Print the image's file listing
    #[arg(long, short)]
    pub list: bool,
}
