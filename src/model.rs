use std::path::PathBuf;

/// Bytes in one megabyte, as shown in status text
pub const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Metadata shown in the preview after a successful search
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    /// Human-readable video title
    pub title: String,
    /// Address of the preview image, if the site exposes one
    pub thumbnail_url: Option<String>,
    /// Uploader or channel name
    pub author: String,
    /// Length of the video in whole seconds
    pub duration_seconds: u64,
}

impl VideoMetadata {
    /// Formats the duration as `m:ss`, or `h:mm:ss` past the hour.
    pub fn duration_label(&self) -> String {
        let hours = self.duration_seconds / 3600;
        let minutes = (self.duration_seconds % 3600) / 60;
        let seconds = self.duration_seconds % 60;
        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

/// Which track the user wants saved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio only, transcoded into a compressed format
    AudioOnly,
    /// Audio and video in one container
    Video,
}

impl MediaKind {
    /// Short label used on buttons and dialog titles
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::AudioOnly => "MP3",
            MediaKind::Video => "MP4",
        }
    }
}

/// A confirmed download, handed to a worker exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub source_url: String,
    pub media_kind: MediaKind,
    pub destination_directory: PathBuf,
}

/// Byte counters reported by the extractor while a transfer is running
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transfer {
    pub downloaded_bytes: u64,
    /// Exact size, when the server reports one
    pub total_bytes: Option<u64>,
    /// Extractor's guess at the size, used only when the exact size is unknown
    pub total_bytes_estimate: Option<u64>,
    /// Current rate in bytes per second
    pub speed: Option<f64>,
}

impl Transfer {
    /// Fraction of the transfer completed, in `[0, 1]`.
    ///
    /// Uses the exact total when known, otherwise the estimate. Returns `None`
    /// when neither is available (or either is zero).
    pub fn fraction_complete(&self) -> Option<f32> {
        let total = self
            .total_bytes
            .filter(|t| *t > 0)
            .or(self.total_bytes_estimate.filter(|t| *t > 0))?;
        let fraction = self.downloaded_bytes as f64 / total as f64;
        Some(fraction.clamp(0.0, 1.0) as f32)
    }

    /// True when the fraction is derived from an estimated total.
    pub fn is_approximate(&self) -> bool {
        self.total_bytes.filter(|t| *t > 0).is_none()
            && self.total_bytes_estimate.filter(|t| *t > 0).is_some()
    }
}

/// Events produced by a single download, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Transfer is running
    Downloading(Transfer),
    /// File has been written (and transcoded, for audio)
    Finished { final_path: PathBuf },
    /// Download stopped with an error
    Failed { reason: String },
}

impl ProgressEvent {
    /// Finished and Failed end the sequence
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Downloading(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(downloaded: u64, total: Option<u64>, estimate: Option<u64>) -> Transfer {
        Transfer {
            downloaded_bytes: downloaded,
            total_bytes: total,
            total_bytes_estimate: estimate,
            speed: None,
        }
    }

    #[test]
    fn fraction_uses_exact_total() {
        let t = transfer(250, Some(1000), Some(4000));
        assert_eq!(t.fraction_complete(), Some(0.25));
        assert!(!t.is_approximate());
    }

    #[test]
    fn fraction_falls_back_to_estimate() {
        let t = transfer(500, None, Some(2000));
        assert_eq!(t.fraction_complete(), Some(0.25));
        assert!(t.is_approximate());
    }

    #[test]
    fn fraction_unknown_without_totals() {
        let t = transfer(500, None, None);
        assert_eq!(t.fraction_complete(), None);
        assert!(!t.is_approximate());
    }

    #[test]
    fn fraction_clamps_when_estimate_overshoots() {
        let t = transfer(3000, None, Some(2000));
        assert_eq!(t.fraction_complete(), Some(1.0));
    }

    #[test]
    fn fraction_is_non_decreasing_over_growing_downloads() {
        let total = 7919;
        let mut last = 0.0;
        for downloaded in (0..=total).step_by(37).chain(std::iter::once(total)) {
            let fraction = transfer(downloaded, Some(total), None)
                .fraction_complete()
                .unwrap();
            assert!((fraction as f64 - downloaded as f64 / total as f64).abs() < 1e-6);
            assert!(fraction >= last);
            last = fraction;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn duration_labels() {
        let mut meta = VideoMetadata {
            title: "t".into(),
            thumbnail_url: None,
            author: "a".into(),
            duration_seconds: 65,
        };
        assert_eq!(meta.duration_label(), "1:05");
        meta.duration_seconds = 3725;
        assert_eq!(meta.duration_label(), "1:02:05");
    }

    #[test]
    fn only_downloading_is_non_terminal() {
        assert!(!ProgressEvent::Downloading(Transfer::default()).is_terminal());
        assert!(ProgressEvent::Failed { reason: "x".into() }.is_terminal());
        assert!(ProgressEvent::Finished { final_path: "a.mp3".into() }.is_terminal());
    }
}
