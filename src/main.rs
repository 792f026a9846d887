//! Main application for the YouTube to MP3/MP4 downloader GUI

// Window, widgets and the per-frame update loop
mod app;
// Progress channel between download workers and the UI loop
mod bridge;
// Settings file and environment overrides
mod config;
// External downloader spawning logic (yt-dlp)
mod downloader;
// User-facing error types
mod error;
// Tracing subscriber setup
mod logging;
// Data models for metadata, requests and progress events
mod model;
// Progress parsing and status text
mod progress;
// UI state owned by the update loop
mod state;
// Thumbnail fetching module
mod thumbnail;
// Locating yt-dlp and ffmpeg
mod toolchain;
// URL checks before a search
mod validation;

use std::sync::Arc;

use eframe::egui::{self, Visuals};
use tokio::runtime::Runtime;
use tracing::info;

use crate::app::DownloaderApp;
use crate::config::Settings;

/// Program entry point: initializes logging, settings and runtime, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();
    let settings = Settings::load_or_default();
    info!(audio_dir = %settings.audio_dir.display(), video_dir = %settings.video_dir.display(), "starting");

    // Worker runtime, owned by the app rather than a global
    let runtime = Arc::new(Runtime::new()?);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(settings.window_size)
            .with_title(settings.window_title.clone()),
        ..Default::default()
    };
    let title = settings.window_title.clone();
    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            let visuals = if settings.dark_mode { Visuals::dark() } else { Visuals::light() };
            cc.egui_ctx.set_visuals(visuals);
            Box::new(DownloaderApp::new(settings, runtime))
        }),
    )?;
    Ok(())
}
