//! Error types, one per kind of failure the user can see.
//!
//! The `Display` text is what ends up on screen, so keep it readable.

use thiserror::Error;

/// Input rejected before any network call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a URL")]
    Empty,
    #[error("Please enter a valid YouTube URL")]
    UnsupportedHost,
}

/// Metadata lookup failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("yt-dlp was not found; install it or set `ytdlp_path` in the settings")]
    ExtractorMissing,
    #[error("could not start yt-dlp: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("{message}")]
    Extractor { message: String },
    #[error("unexpected metadata from yt-dlp: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Could not load thumbnail: {0}")]
    Thumbnail(String),
}

/// Download (or transcoding) failed
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("yt-dlp was not found; install it or set `ytdlp_path` in the settings")]
    ExtractorMissing,
    #[error("ffmpeg was not found; it is required to convert audio")]
    TranscoderMissing,
    #[error("could not start yt-dlp: {0}")]
    Spawn(std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{message}")]
    Extractor { message: String },
    #[error("yt-dlp finished without reporting an output file")]
    NoOutput,
}

/// Settings could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid settings: {0}")]
    Load(#[from] ::config::ConfigError),
}
