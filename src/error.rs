use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("downloader exited with {}", exit_description(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("failed to read downloader output: {0}")]
    StreamRead(#[source] io::Error),

    #[error("command line is empty")]
    EmptyCommand,

    #[error("download worker stopped unexpectedly: {0}")]
    Worker(String),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_mentions_code() {
        let err = DownloadError::NonZeroExit { code: Some(1) };
        assert_eq!(err.to_string(), "downloader exited with code 1");

        let err = DownloadError::NonZeroExit { code: None };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn spawn_failure_names_program() {
        let err = DownloadError::Spawn {
            program: "yt-dlp".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().starts_with("failed to start yt-dlp"));
    }
}
