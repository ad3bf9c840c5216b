use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What kind of streams a preset asks the downloader for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetKind {
    /// Best video and audio merged into one container.
    Combined,
    /// A video stream as-is, without merging audio.
    VideoOnly,
    /// Audio extracted and transcoded to mp3.
    AudioOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadPreset {
    pub id: String,
    pub format_selector: String,
    pub container_extension: String,
    pub resolution_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate_size: Option<String>,
    pub display_label: String,
    pub kind: PresetKind,
}

impl DownloadPreset {
    pub fn new(
        id: &str,
        format_selector: &str,
        container_extension: &str,
        resolution_label: &str,
        display_label: &str,
        kind: PresetKind,
    ) -> Self {
        Self {
            id: id.to_string(),
            format_selector: format_selector.to_string(),
            container_extension: container_extension.to_string(),
            resolution_label: resolution_label.to_string(),
            approximate_size: None,
            display_label: display_label.to_string(),
            kind,
        }
    }

    pub fn with_size(mut self, size: Option<String>) -> Self {
        self.approximate_size = size;
        self
    }
}

impl fmt::Display for DownloadPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.display_label,
            self.resolution_label,
            self.approximate_size.as_deref().unwrap_or("Unknown size")
        )
    }
}

/// One parsed progress report from the downloader's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSample {
    /// 0.0 to 100.0
    pub percent_complete: f64,
    pub transfer_rate: String,
    pub estimated_time_remaining: String,
}

/// Browsers the downloader can import session cookies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Opera,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Safari => "safari",
            Self::Edge => "edge",
            Self::Opera => "opera",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthOptions {
    pub use_browser_cookies: bool,
    pub browser: Option<Browser>,
}

impl AuthOptions {
    /// Browser to pull cookies from, if cookie import is enabled.
    pub fn cookie_browser(&self) -> Option<Browser> {
        if self.use_browser_cookies { self.browser } else { None }
    }
}

/// Everything needed to build one download command.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source_url: String,
    pub preset: DownloadPreset,
    pub output_directory: PathBuf,
    pub auth: AuthOptions,
}
