//! Everything the window shows, owned by the UI loop.
//!
//! Workers never touch this directly: search workers post [`WorkerMessage`]s
//! and download workers post progress events through the bridge. The loop
//! calls [`PresentationState::poll`] once per frame to fold both in.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

use eframe::egui::ColorImage;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info};

use crate::bridge::{self, HideDelays, Indicator, Outcome, ProgressEmitter, ProgressReceiver};
use crate::model::{DownloadRequest, MediaKind, VideoMetadata};
use crate::validation::validate_url;

/// Result posted by a search worker, tagged with the search it belongs to
pub enum WorkerMessage {
    Metadata {
        generation: u64,
        result: Result<VideoMetadata, String>,
    },
    Thumbnail {
        generation: u64,
        result: Result<ColorImage, String>,
    },
}

/// A search the UI wants run in the background
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchJob {
    pub generation: u64,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message the user has to dismiss
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, title: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.to_string(),
            message: message.into(),
        }
    }
}

/// What the preview area shows
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Preview {
    #[default]
    Empty,
    Loading,
    Ready(VideoMetadata),
    Failed(String),
}

pub struct PresentationState {
    pub url_input: String,
    pub preview: Preview,
    /// Non-fatal problems shown under the preview
    pub inline_errors: Vec<String>,
    pub indicator: Indicator,
    pub notices: VecDeque<Notice>,
    /// Folder of the last finished download
    pub last_download_dir: Option<PathBuf>,
    current_url: Option<String>,
    pending_thumbnail: Option<ColorImage>,
    generation: u64,
    active_dir: Option<PathBuf>,
    progress: Option<ProgressReceiver>,
    worker_tx: UnboundedSender<WorkerMessage>,
    worker_rx: UnboundedReceiver<WorkerMessage>,
    delays: HideDelays,
}

impl PresentationState {
    pub fn new(delays: HideDelays) -> Self {
        let (worker_tx, worker_rx) = unbounded_channel();
        Self {
            url_input: String::new(),
            preview: Preview::Empty,
            inline_errors: Vec::new(),
            indicator: Indicator::Hidden,
            notices: VecDeque::new(),
            last_download_dir: None,
            current_url: None,
            pending_thumbnail: None,
            generation: 0,
            active_dir: None,
            progress: None,
            worker_tx,
            worker_rx,
            delays,
        }
    }

    /// Sender handed to search workers.
    pub fn worker_sender(&self) -> UnboundedSender<WorkerMessage> {
        self.worker_tx.clone()
    }

    /// Validates the URL input and, if it passes, clears the preview and
    /// returns the search to run. Invalid input raises a warning instead.
    pub fn search(&mut self) -> Option<SearchJob> {
        let url = match validate_url(&self.url_input) {
            Ok(url) => url,
            Err(err) => {
                debug!(error = %err, "rejected url");
                self.notices
                    .push_back(Notice::new(NoticeLevel::Warning, "Invalid URL", err.to_string()));
                return None;
            }
        };
        self.clear_preview();
        self.preview = Preview::Loading;
        self.current_url = Some(url.clone());
        info!(%url, generation = self.generation, "searching");
        Some(SearchJob {
            generation: self.generation,
            url,
        })
    }

    /// URL of the video being previewed, if any.
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// True while a download's progress is still being shown as running.
    pub fn is_downloading(&self) -> bool {
        matches!(self.indicator, Indicator::Showing { .. })
    }

    /// Builds the request for the previewed video and shows an empty bar.
    ///
    /// Returns the request with the emitter the worker should report to.
    pub fn begin_download(&mut self, media_kind: MediaKind, destination: PathBuf) -> Option<(DownloadRequest, ProgressEmitter)> {
        let url = self.current_url.clone()?;
        if self.is_downloading() {
            self.notices.push_back(Notice::new(
                NoticeLevel::Warning,
                "Download in progress",
                "Wait for the current download to finish.",
            ));
            return None;
        }
        let (emitter, receiver) = bridge::channel();
        self.progress = Some(receiver);
        self.active_dir = Some(destination.clone());
        self.indicator.start();
        Some((
            DownloadRequest {
                source_url: url,
                media_kind,
                destination_directory: destination,
            },
            emitter,
        ))
    }

    /// Folds in everything workers have posted since the last frame and
    /// expires the hide timer.
    pub fn poll(&mut self, now: Instant) {
        while let Ok(message) = self.worker_rx.try_recv() {
            self.apply_worker_message(message);
        }

        let events = self
            .progress
            .as_mut()
            .map(ProgressReceiver::drain)
            .unwrap_or_default();
        for event in events {
            if let Some(outcome) = self.indicator.apply(event, now, self.delays) {
                self.finish(outcome);
            }
        }

        self.indicator.tick(now);
    }

    /// Takes a freshly decoded thumbnail for upload to the GPU.
    pub fn take_pending_thumbnail(&mut self) -> Option<ColorImage> {
        self.pending_thumbnail.take()
    }

    /// Clears the preview, the URL input and the progress indicator.
    ///
    /// Results from searches or downloads started earlier are ignored
    /// from here on, and any pending hide timer is dropped.
    pub fn reset(&mut self) {
        info!(indicator_visible = !self.indicator.is_hidden(), "resetting view");
        self.clear_preview();
        self.url_input.clear();
        self.indicator.reset();
        self.progress = None;
        self.active_dir = None;
        self.last_download_dir = None;
    }

    pub fn dismiss_notice(&mut self) {
        self.notices.pop_front();
    }

    fn clear_preview(&mut self) {
        self.generation += 1;
        self.preview = Preview::Empty;
        self.inline_errors.clear();
        self.pending_thumbnail = None;
        self.current_url = None;
    }

    fn apply_worker_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Metadata { generation, result } if generation == self.generation => {
                self.preview = match result {
                    Ok(meta) => Preview::Ready(meta),
                    Err(message) => {
                        self.current_url = None;
                        Preview::Failed(message)
                    }
                };
            }
            WorkerMessage::Thumbnail { generation, result } if generation == self.generation => match result {
                Ok(image) => self.pending_thumbnail = Some(image),
                Err(message) => self.inline_errors.push(message),
            },
            _ => debug!("discarding result of an earlier search"),
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        self.progress = None;
        let notice = match outcome {
            Outcome::Finished(path) => {
                self.last_download_dir = self.active_dir.take();
                Notice::new(NoticeLevel::Info, "Download Complete", format!("Downloaded: {}", path.display()))
            }
            Outcome::Failed(reason) => {
                self.active_dir = None;
                Notice::new(NoticeLevel::Error, "Download Failed", reason)
            }
        };
        self.notices.push_back(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProgressEvent, Transfer};
    use pretty_assertions::assert_eq;

    fn meta() -> VideoMetadata {
        VideoMetadata {
            title: "Clip".into(),
            thumbnail_url: None,
            author: "Chan".into(),
            duration_seconds: 10,
        }
    }

    fn searched_state() -> (PresentationState, SearchJob) {
        let mut state = PresentationState::new(HideDelays::default());
        state.url_input = "https://youtu.be/abc123".into();
        let job = state.search().unwrap();
        state
            .worker_sender()
            .send(WorkerMessage::Metadata { generation: job.generation, result: Ok(meta()) })
            .unwrap();
        state.poll(Instant::now());
        (state, job)
    }

    #[test]
    fn invalid_url_warns_without_searching() {
        let mut state = PresentationState::new(HideDelays::default());
        state.url_input = "not a url".into();
        assert_eq!(state.search(), None);
        assert_eq!(state.preview, Preview::Empty);
        let notice = state.notices.front().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(!notice.message.is_empty());
    }

    #[test]
    fn metadata_fills_preview() {
        let (state, job) = searched_state();
        assert_eq!(job.url, "https://youtu.be/abc123");
        assert_eq!(state.preview, Preview::Ready(meta()));
        assert_eq!(state.current_url(), Some("https://youtu.be/abc123"));
    }

    #[test]
    fn fetch_error_is_inline() {
        let mut state = PresentationState::new(HideDelays::default());
        state.url_input = "youtube.com/watch?v=gone".into();
        let job = state.search().unwrap();
        state
            .worker_sender()
            .send(WorkerMessage::Metadata { generation: job.generation, result: Err("Video unavailable".into()) })
            .unwrap();
        state.poll(Instant::now());
        assert_eq!(state.preview, Preview::Failed("Video unavailable".into()));
        assert!(state.notices.is_empty());
        assert_eq!(state.current_url(), None);
    }

    #[test]
    fn stale_results_are_dropped() {
        let (mut state, job) = searched_state();
        state.reset();
        state
            .worker_sender()
            .send(WorkerMessage::Thumbnail { generation: job.generation, result: Err("late".into()) })
            .unwrap();
        state.poll(Instant::now());
        assert!(state.inline_errors.is_empty());
        assert_eq!(state.preview, Preview::Empty);
    }

    #[test]
    fn thumbnail_error_keeps_preview() {
        let (mut state, job) = searched_state();
        state
            .worker_sender()
            .send(WorkerMessage::Thumbnail {
                generation: job.generation,
                result: Err("Could not load thumbnail: 404".into()),
            })
            .unwrap();
        state.poll(Instant::now());
        assert_eq!(state.preview, Preview::Ready(meta()));
        assert_eq!(state.inline_errors, vec!["Could not load thumbnail: 404".to_string()]);
    }

    #[test]
    fn download_requires_a_preview() {
        let mut state = PresentationState::new(HideDelays::default());
        assert!(state.begin_download(MediaKind::Video, "/tmp".into()).is_none());
        assert!(state.indicator.is_hidden());
    }

    #[test]
    fn failed_download_shows_error_and_hides_after_failure_delay() {
        let (mut state, _) = searched_state();
        let (request, mut emitter) = state.begin_download(MediaKind::AudioOnly, "/music".into()).unwrap();
        assert_eq!(request.media_kind, MediaKind::AudioOnly);
        assert!(state.is_downloading());

        let now = Instant::now();
        emitter.emit(ProgressEvent::Downloading(Transfer { downloaded_bytes: 10, total_bytes: Some(100), ..Transfer::default() }));
        emitter.emit(ProgressEvent::Failed { reason: "disk full".into() });
        state.poll(now);

        assert!(state.indicator.status().contains("disk full"));
        assert_eq!(state.notices.back().unwrap().level, NoticeLevel::Error);
        assert_eq!(state.notices.back().unwrap().message, "disk full");

        let delays = HideDelays::default();
        state.poll(now + delays.success);
        assert!(!state.indicator.is_hidden());
        state.poll(now + delays.failure);
        assert!(state.indicator.is_hidden());
        assert_eq!(state.last_download_dir, None);
    }

    #[test]
    fn finished_download_remembers_folder() {
        let (mut state, _) = searched_state();
        let (_, mut emitter) = state.begin_download(MediaKind::Video, "/videos".into()).unwrap();
        assert!(state.begin_download(MediaKind::Video, "/videos".into()).is_none());

        emitter.emit(ProgressEvent::Finished { final_path: "/videos/Clip.mp4".into() });
        state.poll(Instant::now());
        assert_eq!(state.last_download_dir, Some(PathBuf::from("/videos")));
        assert_eq!(state.notices.back().unwrap().title, "Download Complete");
        assert!(!state.is_downloading());

        state.reset();
        assert_eq!(state.last_download_dir, None);
    }

    #[test]
    fn reset_cancels_pending_hide_and_detaches_progress() {
        let (mut state, _) = searched_state();
        let (_, mut emitter) = state.begin_download(MediaKind::Video, "/videos".into()).unwrap();
        let now = Instant::now();
        emitter.emit(ProgressEvent::Failed { reason: "x".into() });
        state.poll(now);
        assert!(state.indicator.hide_at().is_some());

        state.reset();
        assert!(state.indicator.is_hidden());
        assert_eq!(state.indicator.hide_at(), None);
        assert_eq!(state.url_input, "");
        assert_eq!(state.preview, Preview::Empty);

        state.poll(now + HideDelays::default().failure);
        assert!(state.indicator.is_hidden());
    }

    #[test]
    fn reset_mid_download_ignores_later_events() {
        let (mut state, _) = searched_state();
        let (_, mut emitter) = state.begin_download(MediaKind::Video, "/videos".into()).unwrap();
        state.reset();
        emitter.emit(ProgressEvent::Finished { final_path: "/videos/Clip.mp4".into() });
        state.poll(Instant::now());
        assert!(state.indicator.is_hidden());
        assert!(state.notices.is_empty());
    }
}
