//! Moves progress events from a download worker to the UI loop.
//!
//! The worker owns a [`ProgressEmitter`] and pushes events without blocking.
//! The UI loop owns the matching [`ProgressReceiver`], drains it once per
//! frame, and folds each event into an [`Indicator`]. Neither side touches
//! the other's state.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel};
use tracing::debug;

use crate::model::ProgressEvent;
use crate::progress::{failed_text, finished_text, status_text};

/// Creates a connected emitter/receiver pair for one download.
pub fn channel() -> (ProgressEmitter, ProgressReceiver) {
    let (tx, rx) = unbounded_channel();
    (
        ProgressEmitter { tx, terminated: false },
        ProgressReceiver { rx },
    )
}

/// Sending half, held by the download worker
pub struct ProgressEmitter {
    tx: UnboundedSender<ProgressEvent>,
    terminated: bool,
}

impl ProgressEmitter {
    /// Pushes an event. Anything after the first terminal event is dropped.
    ///
    /// Returns `false` if the event was dropped, either because the sequence
    /// already ended or because the UI side went away.
    pub fn emit(&mut self, event: ProgressEvent) -> bool {
        if self.terminated {
            debug!(?event, "dropping event after terminal event");
            return false;
        }
        self.terminated = event.is_terminal();
        self.tx.send(event).is_ok()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Receiving half, polled by the UI loop
pub struct ProgressReceiver {
    rx: UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Takes every event queued so far, in order, without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                // A closed channel with no terminal event can't be told apart
                // from a slow download; the indicator stays until reset.
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}

/// How long a finished indicator stays on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HideDelays {
    pub success: Duration,
    pub failure: Duration,
}

impl Default for HideDelays {
    fn default() -> Self {
        Self {
            success: Duration::from_secs(3),
            failure: Duration::from_secs(5),
        }
    }
}

/// How a download ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished(PathBuf),
    Failed(String),
}

/// The single progress indicator in the window
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Indicator {
    #[default]
    Hidden,
    Showing {
        fraction: f32,
        /// False while the size of the transfer is unknown
        determinate: bool,
        status: String,
    },
    Terminal {
        outcome: Outcome,
        fraction: f32,
        status: String,
        hide_at: Instant,
    },
}

impl Indicator {
    /// Shows an empty bar for a request that just started.
    pub fn start(&mut self) {
        *self = Indicator::Showing {
            fraction: 0.0,
            determinate: true,
            status: "Starting download...".to_string(),
        };
    }

    /// Folds one event into the indicator.
    ///
    /// Returns the outcome when this event ended the download, so the caller
    /// can raise a notification. Events arriving while hidden or after a
    /// terminal event are ignored.
    pub fn apply(&mut self, event: ProgressEvent, now: Instant, delays: HideDelays) -> Option<Outcome> {
        let Indicator::Showing { fraction, determinate, status } = self else {
            debug!(?event, "indicator not showing; ignoring event");
            return None;
        };
        match event {
            ProgressEvent::Downloading(transfer) => {
                match transfer.fraction_complete() {
                    Some(f) => {
                        // never move backwards within one request
                        *fraction = fraction.max(f);
                        *determinate = true;
                    }
                    None => *determinate = false,
                }
                *status = status_text(&transfer);
                None
            }
            ProgressEvent::Finished { final_path } => {
                let outcome = Outcome::Finished(final_path.clone());
                *self = Indicator::Terminal {
                    outcome: outcome.clone(),
                    fraction: 1.0,
                    status: finished_text(&final_path),
                    hide_at: now + delays.success,
                };
                Some(outcome)
            }
            ProgressEvent::Failed { reason } => {
                let outcome = Outcome::Failed(reason.clone());
                *self = Indicator::Terminal {
                    outcome: outcome.clone(),
                    fraction: *fraction,
                    status: failed_text(&reason),
                    hide_at: now + delays.failure,
                };
                Some(outcome)
            }
        }
    }

    /// Hides a terminal indicator once its delay has passed.
    pub fn tick(&mut self, now: Instant) {
        if let Indicator::Terminal { hide_at, .. } = self {
            if now >= *hide_at {
                *self = Indicator::Hidden;
            }
        }
    }

    /// Hides immediately, dropping any pending hide deadline.
    pub fn reset(&mut self) {
        *self = Indicator::Hidden;
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, Indicator::Hidden)
    }

    /// Pending hide deadline, if a terminal state is showing.
    pub fn hide_at(&self) -> Option<Instant> {
        match self {
            Indicator::Terminal { hide_at, .. } => Some(*hide_at),
            _ => None,
        }
    }

    /// Current status line, empty when hidden.
    pub fn status(&self) -> &str {
        match self {
            Indicator::Hidden => "",
            Indicator::Showing { status, .. } | Indicator::Terminal { status, .. } => status,
        }
    }
}
