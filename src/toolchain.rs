//! Locating the external executables: the extractor (`yt-dlp`) and the
//! transcoder (`ffmpeg`).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use rust_embed::RustEmbed;
use tracing::{debug, info, warn};

use crate::config::Settings;

pub const YTDLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";

/// Binaries optionally bundled at build time
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

/// Resolves each executable once, on first use
#[derive(Debug, Default)]
pub struct Toolchain {
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
    ytdlp: OnceCell<Option<PathBuf>>,
    ffmpeg: OnceCell<Option<PathBuf>>,
}

impl Toolchain {
    pub fn new(ytdlp_override: Option<PathBuf>, ffmpeg_override: Option<PathBuf>) -> Self {
        Self {
            ytdlp_override,
            ffmpeg_override,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ytdlp_path.clone(), settings.ffmpeg_path.clone())
    }

    /// Path to `yt-dlp`, if one can be found.
    pub fn ytdlp(&self) -> Option<&Path> {
        self.ytdlp
            .get_or_init(|| resolve(YTDLP, self.ytdlp_override.as_deref()))
            .as_deref()
    }

    /// Path to `ffmpeg`, if one can be found.
    pub fn ffmpeg(&self) -> Option<&Path> {
        self.ffmpeg
            .get_or_init(|| resolve(FFMPEG, self.ffmpeg_override.as_deref()))
            .as_deref()
    }
}

/// Configured path, then a bundled copy, then `PATH`.
///
/// A configured path that doesn't exist is reported as missing rather than
/// silently replaced by another copy.
fn resolve(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            debug!(name, path = %path.display(), "using configured executable");
            return Some(path.to_path_buf());
        }
        warn!(name, path = %path.display(), "configured executable does not exist");
        return None;
    }
    if let Some(path) = extract_bundled(name) {
        return Some(path);
    }
    match which::which(name) {
        Ok(path) => {
            debug!(name, path = %path.display(), "found executable on PATH");
            Some(path)
        }
        Err(err) => {
            warn!(name, error = %err, "executable not found");
            None
        }
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Writes a bundled binary into the temp dir and returns its path.
fn extract_bundled(name: &str) -> Option<PathBuf> {
    let file_name = executable_name(name);
    let data = Asset::get(&file_name)?;
    let target = std::env::temp_dir().join("ytgrab").join(&file_name);
    match install_bundled(&target, &data.data) {
        Ok(true) => {
            info!(name, path = %target.display(), "extracted bundled executable");
            Some(target)
        }
        Ok(false) => {
            debug!(name, path = %target.display(), "bundled executable already extracted");
            Some(target)
        }
        Err(err) => {
            warn!(name, error = %err, "could not extract bundled executable");
            None
        }
    }
}

/// Makes `target` hold exactly `bytes`. Returns `false` if it already did.
///
/// A leftover file from an older build or an interrupted write is replaced.
fn install_bundled(target: &Path, bytes: &[u8]) -> std::io::Result<bool> {
    match std::fs::read(target) {
        Ok(existing) if existing == bytes => return Ok(false),
        Ok(_) => debug!(path = %target.display(), "replacing stale executable"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    write_executable(target, bytes)?;
    Ok(true)
}

/// Writes to a sibling file first, so a crash never leaves a truncated
/// executable at `target`.
fn write_executable(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut partial = target.as_os_str().to_owned();
    partial.push(format!(".{}.part", std::process::id()));
    let partial = PathBuf::from(partial);

    let written = (|| {
        let mut f = File::create(&partial)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o755))?;
        }
        std::fs::rename(&partial, target)
    })();
    if written.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    written
}
