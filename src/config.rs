use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::bridge::HideDelays;
use crate::error::ConfigError;
use crate::model::MediaKind;

/// Environment variable naming an extra settings file
pub const CONFIG_PATH_ENV: &str = "YTGRAB_CONFIG";
/// Prefix for per-field overrides, e.g. `YTGRAB_POLL_INTERVAL_MS=50`
pub const ENV_PREFIX: &str = "YTGRAB";

/// User-tunable settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub window_title: String,
    pub window_size: [f32; 2],
    pub thumbnail_size: [u32; 2],
    pub dark_mode: bool,
    /// Default destination for audio downloads
    pub audio_dir: PathBuf,
    /// Default destination for video downloads
    pub video_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub success_hide_ms: u64,
    pub failure_hide_ms: u64,
    pub audio_codec: String,
    /// Bitrate in kbit/s passed to the transcoder
    pub audio_quality: String,
    pub video_format: String,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub thumbnail_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let user_dirs = UserDirs::new();
        let fallback = |name: &str| {
            user_dirs
                .as_ref()
                .map(|d| d.home_dir().join(name))
                .unwrap_or_else(|| PathBuf::from(name))
        };
        let audio_dir = user_dirs
            .as_ref()
            .and_then(|d| d.audio_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| fallback("Music"));
        let video_dir = user_dirs
            .as_ref()
            .and_then(|d| d.video_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| fallback("Videos"));

        Self {
            window_title: "YouTube to MP3/MP4".to_string(),
            window_size: [720.0, 640.0],
            thumbnail_size: [500, 360],
            dark_mode: true,
            audio_dir,
            video_dir,
            poll_interval_ms: 100,
            success_hide_ms: 3000,
            failure_hide_ms: 5000,
            audio_codec: "mp3".to_string(),
            audio_quality: "192".to_string(),
            video_format: "best[height<=720]/best".to_string(),
            ytdlp_path: None,
            ffmpeg_path: None,
            thumbnail_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Loads settings from the platform config dir, `$YTGRAB_CONFIG`, and
    /// `YTGRAB_*` variables, in increasing priority.
    pub fn load() -> Result<Self, ConfigError> {
        let mut files = Vec::new();
        if let Some(dirs) = ProjectDirs::from("", "", "ytgrab") {
            files.push(dirs.config_dir().join("settings.toml"));
        }
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            files.push(PathBuf::from(path));
        }
        Self::load_from(&files, true)
    }

    /// Loads settings from the given files (missing ones are skipped),
    /// optionally applying environment overrides on top.
    pub fn load_from(files: &[PathBuf], with_env: bool) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        for file in files {
            debug!(path = %file.display(), "adding settings source");
            builder = builder.add_source(::config::File::from(file.as_path()).required(false));
        }
        if with_env {
            builder = builder.add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        }
        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Like [`Settings::load`], but falls back to defaults on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            warn!(error = %err, "using default settings");
            Self::default()
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn hide_delays(&self) -> HideDelays {
        HideDelays {
            success: Duration::from_millis(self.success_hide_ms),
            failure: Duration::from_millis(self.failure_hide_ms),
        }
    }

    pub fn thumbnail_timeout(&self) -> Duration {
        Duration::from_secs(self.thumbnail_timeout_secs)
    }

    /// Where a download of `kind` goes when the user doesn't pick a folder.
    pub fn default_dir(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::AudioOnly => &self.audio_dir,
            MediaKind::Video => &self.video_dir,
        }
    }
}
