use crate::models::Browser;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Download the media with the selected preset
    Download,
    /// List the formats the downloader offers for the URL
    Formats,
    /// Print the media title
    Title,
    /// List the configured presets
    Presets,
}

#[derive(Parser, Debug)]
#[command(name = "ytdlp-front")]
#[command(author, version, about = "Download media through yt-dlp with live progress", long_about = None)]
pub struct Args {
    /// Media URL
    pub url: Option<String>,

    /// What to do with the URL
    #[arg(short, long, value_enum, default_value = "download")]
    pub mode: Mode,

    /// Quality preset id (see --mode presets)
    #[arg(short, long, default_value = "720p")]
    pub preset: String,

    /// Output directory
    #[arg(short, long, default_value = "./downloads")]
    pub output: PathBuf,

    /// Import session cookies from a local browser profile
    #[arg(long)]
    pub use_cookies: bool,

    /// Browser to import cookies from
    #[arg(long, value_enum, default_value = "chrome")]
    pub browser: Browser,

    /// Downloader binary to invoke
    #[arg(long, default_value = "yt-dlp")]
    pub binary: String,

    /// JSON file with extra presets (same id replaces a built-in one)
    #[arg(long)]
    pub preset_file: Option<PathBuf>,

    /// Print listings as JSON
    #[arg(long)]
    pub json: bool,
}
