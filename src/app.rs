//! The window: renders `PresentationState` and turns clicks into work.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
use egui::{Color32, RichText, TextureHandle, TextureOptions};
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::bridge::{Indicator, Outcome, ProgressEmitter};
use crate::config::Settings;
use crate::downloader::Downloader;
use crate::model::{DownloadRequest, MediaKind};
use crate::state::{NoticeLevel, PresentationState, Preview, SearchJob, WorkerMessage};
use crate::thumbnail::fetch_thumbnail;
use crate::toolchain::Toolchain;

const PANEL_FILL: Color32 = Color32::from_rgb(0x1e, 0x2c, 0x42);
const ERROR_FILL: Color32 = Color32::from_rgb(0xff, 0x4c, 0x4c);

/// Application state for the GUI
pub struct DownloaderApp {
    state: PresentationState,
    settings: Settings,
    downloader: Downloader,
    /// Runs metadata fetches and downloads off the UI thread
    runtime: Arc<Runtime>,
    thumbnail: Option<TextureHandle>,
}

impl DownloaderApp {
    pub fn new(settings: Settings, runtime: Arc<Runtime>) -> Self {
        let toolchain = Arc::new(Toolchain::from_settings(&settings));
        Self {
            state: PresentationState::new(settings.hide_delays()),
            downloader: Downloader::new(toolchain, &settings),
            settings,
            runtime,
            thumbnail: None,
        }
    }

    fn search(&mut self, ctx: &egui::Context) {
        if let Some(job) = self.state.search() {
            self.thumbnail = None;
            self.spawn_search(job, ctx.clone());
        }
    }

    fn clear(&mut self) {
        self.state.reset();
        self.thumbnail = None;
    }

    fn start_download(&mut self, kind: MediaKind, ctx: &egui::Context) {
        let destination = choose_download_dir(kind, self.settings.default_dir(kind));
        if let Some((request, emitter)) = self.state.begin_download(kind, destination) {
            self.spawn_download(request, emitter, ctx.clone());
        }
    }

    /// Metadata first, then the thumbnail; each result is posted to the UI
    /// loop tagged with the search's generation.
    fn spawn_search(&self, job: SearchJob, ctx: egui::Context) {
        let downloader = self.downloader.clone();
        let tx = self.state.worker_sender();
        let size = self.settings.thumbnail_size;
        let timeout = self.settings.thumbnail_timeout();
        self.runtime.spawn(async move {
            let SearchJob { generation, url } = job;
            let metadata = downloader.fetch_metadata(&url).await;
            let thumbnail_url = metadata.as_ref().ok().and_then(|m| m.thumbnail_url.clone());
            let _ = tx.send(WorkerMessage::Metadata {
                generation,
                result: metadata.map_err(|e| e.to_string()),
            });
            ctx.request_repaint();

            let Some(thumbnail_url) = thumbnail_url else {
                return;
            };
            let result = tokio::task::spawn_blocking(move || fetch_thumbnail(&thumbnail_url, size, timeout))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()));
            if let Err(err) = &result {
                warn!(error = %err, "thumbnail fetch failed");
            }
            let _ = tx.send(WorkerMessage::Thumbnail { generation, result });
            ctx.request_repaint();
        });
    }

    fn spawn_download(&self, request: DownloadRequest, mut emitter: ProgressEmitter, ctx: egui::Context) {
        let downloader = self.downloader.clone();
        self.runtime.spawn(async move {
            // the outcome already went through the emitter
            let _ = downloader.download(request, &mut emitter).await;
            ctx.request_repaint();
        });
    }

    fn header_ui(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.label(
            RichText::new("Convert YouTube videos to MP3/MP4 files")
                .size(20.0)
                .background_color(PANEL_FILL),
        );
        ui.add_space(8.0);
        let response = ui.add(
            egui::TextEdit::singleline(&mut self.state.url_input)
                .hint_text("Enter YouTube URL here...")
                .desired_width(500.0),
        );
        let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        ui.horizontal(|ui| {
            if ui.button("Search").clicked() || submitted {
                self.search(ctx);
            }
            if ui.button("Clear").clicked() {
                self.clear();
            }
        });
    }

    fn preview_ui(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        match self.state.preview.clone() {
            Preview::Empty => {}
            Preview::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Looking up video...");
                });
            }
            Preview::Failed(message) => {
                ui.label(RichText::new(format!("Error: {message}")).color(Color32::WHITE).background_color(ERROR_FILL));
            }
            Preview::Ready(meta) => {
                ui.label(
                    RichText::new(format!("Title: {}", meta.title))
                        .size(16.0)
                        .background_color(PANEL_FILL),
                );
                ui.label(format!("{} · {}", meta.author, meta.duration_label()));
                if let Some(url) = self.state.current_url() {
                    ui.small(url);
                }
                // Show thumbnail if available
                if let Some(tex) = &self.thumbnail {
                    ui.image(tex);
                }
                ui.horizontal(|ui| {
                    ui.add_enabled_ui(!self.state.is_downloading(), |ui| {
                        for kind in [MediaKind::AudioOnly, MediaKind::Video] {
                            if ui.button(format!("Download as {}", kind.label())).clicked() {
                                self.start_download(kind, ctx);
                            }
                        }
                    });
                });
            }
        }
        for message in &self.state.inline_errors {
            ui.colored_label(ERROR_FILL, message);
        }
    }

    fn progress_ui(&mut self, ui: &mut egui::Ui) {
        let indicator = &self.state.indicator;
        let status = indicator.status();
        match indicator {
            Indicator::Hidden => {}
            Indicator::Showing { fraction, determinate, .. } => {
                let bar = if *determinate {
                    egui::ProgressBar::new(*fraction).show_percentage()
                } else {
                    egui::ProgressBar::new(*fraction).animate(true)
                };
                ui.add(bar.desired_width(400.0));
                ui.label(status);
            }
            Indicator::Terminal { fraction, outcome, .. } => {
                ui.add(egui::ProgressBar::new(*fraction).desired_width(400.0));
                match outcome {
                    Outcome::Finished(_) => ui.label(status),
                    Outcome::Failed(_) => ui.colored_label(ERROR_FILL, status),
                };
            }
        }
        if let Some(dir) = self.state.last_download_dir.clone() {
            if ui.button("Open Folder").clicked() {
                open_folder(&dir);
            }
        }
    }

    fn notice_ui(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.state.notices.front().cloned() else {
            return;
        };
        let color = match notice.level {
            NoticeLevel::Info => Color32::LIGHT_GREEN,
            NoticeLevel::Warning => Color32::YELLOW,
            NoticeLevel::Error => ERROR_FILL,
        };
        egui::Window::new(notice.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.colored_label(color, &notice.message);
                if ui.button("OK").clicked() {
                    self.state.dismiss_notice();
                }
            });
    }
}

/// GUI update loop: called each frame to poll workers and redraw
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.state.poll(Instant::now());

        // Upload a freshly fetched thumbnail
        if let Some(image) = self.state.take_pending_thumbnail() {
            self.thumbnail = Some(ctx.load_texture("thumbnail", image, TextureOptions::default()));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                self.header_ui(ui, ctx);
                ui.add_space(10.0);
                self.preview_ui(ui, ctx);
                ui.add_space(10.0);
                self.progress_ui(ui);
            });
        });

        self.notice_ui(ctx);

        // Request periodic repaint for progress updates, sooner if the bar is due to hide
        let mut next = self.settings.poll_interval();
        if let Some(hide_at) = self.state.indicator.hide_at() {
            next = next.min(hide_at.saturating_duration_since(Instant::now()));
        }
        ctx.request_repaint_after(next);
    }
}

/// Asks for a destination folder; cancelling means "use the default".
fn choose_download_dir(kind: MediaKind, default: &Path) -> PathBuf {
    FileDialog::new()
        .set_title(&format!("Choose folder to save {} file", kind.label()))
        .set_directory(&default.to_path_buf())
        .pick_folder()
        .unwrap_or_else(|| {
            info!(dir = %default.display(), "no folder picked; using default");
            default.to_path_buf()
        })
}

/// Opens `folder` in the platform file manager without blocking the UI.
fn open_folder(folder: &Path) {
    let folder = folder.to_path_buf();
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(all(unix, not(target_os = "macos")))]
        let opener = "xdg-open";

        if let Err(err) = std::process::Command::new(opener).arg(&folder).spawn() {
            warn!(error = %err, dir = %folder.display(), "could not open folder");
        }
    });
}
