use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, error, info, warn};

use crate::bridge::ProgressEmitter;
use crate::config::Settings;
use crate::error::{DownloadError, FetchError};
use crate::model::{DownloadRequest, MediaKind, ProgressEvent, VideoMetadata};
use crate::progress::{
    finished_template, parse_error_from_line, parse_finished_from_line, parse_progress_from_line,
    progress_template,
};
use crate::toolchain::Toolchain;

/// Talks to yt-dlp for metadata and downloads
#[derive(Debug, Clone)]
pub struct Downloader {
    toolchain: Arc<Toolchain>,
    audio_codec: String,
    audio_quality: String,
    video_format: String,
}

/// Subset of yt-dlp's info JSON that the preview needs
#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
}

impl Downloader {
    pub fn new(toolchain: Arc<Toolchain>, settings: &Settings) -> Self {
        Self {
            toolchain,
            audio_codec: settings.audio_codec.clone(),
            audio_quality: settings.audio_quality.clone(),
            video_format: settings.video_format.clone(),
        }
    }

    /// Looks up title, thumbnail, author and duration without downloading.
    pub async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, FetchError> {
        let ytdlp = self.toolchain.ytdlp().ok_or(FetchError::ExtractorMissing)?;
        debug!(url, "fetching metadata");

        let output = Command::new(ytdlp)
            .args(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings", "--"])
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => FetchError::ExtractorMissing,
                _ => FetchError::Spawn(err),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_error(stderr.lines())
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            warn!(url, %message, "metadata fetch failed");
            return Err(FetchError::Extractor { message });
        }

        parse_metadata(&output.stdout)
    }

    /// Runs one download to completion.
    ///
    /// Emits `Downloading` events while the transfer runs, then exactly one
    /// `Finished` or `Failed` event, and returns the path of the saved file.
    pub async fn download(
        &self,
        request: DownloadRequest,
        emitter: &mut ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        info!(url = %request.source_url, kind = ?request.media_kind, dir = %request.destination_directory.display(), "starting download");
        let result = match self.run_download(&request, emitter).await {
            Ok(final_path) => {
                info!(path = %final_path.display(), "download finished");
                emitter.emit(ProgressEvent::Finished { final_path: final_path.clone() });
                Ok(final_path)
            }
            Err(err) => {
                error!(error = %err, url = %request.source_url, "download failed");
                emitter.emit(ProgressEvent::Failed { reason: err.to_string() });
                Err(err)
            }
        };
        debug_assert!(emitter.is_terminated());
        result
    }

    async fn run_download(
        &self,
        request: &DownloadRequest,
        emitter: &mut ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        let ytdlp = self.toolchain.ytdlp().ok_or(DownloadError::ExtractorMissing)?;
        let ffmpeg = match request.media_kind {
            MediaKind::AudioOnly => Some(self.toolchain.ffmpeg().ok_or(DownloadError::TranscoderMissing)?),
            MediaKind::Video => self.toolchain.ffmpeg(),
        };

        tokio::fs::create_dir_all(&request.destination_directory).await?;

        let mut child = Command::new(ytdlp)
            .args(self.download_args(request, ffmpeg))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => DownloadError::ExtractorMissing,
                _ => DownloadError::Spawn(err),
            })?;

        let stdout = child.stdout.take().ok_or(DownloadError::NoOutput)?;
        let stderr = child.stderr.take().ok_or(DownloadError::NoOutput)?;

        // stderr is drained on its own task so a chatty extractor can't stall stdout
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut last_error = None;
            while let Ok(Some(line)) = next_line_lossy(&mut reader, &mut buf).await {
                debug!(target: "ytgrab::ytdlp", "{line}");
                if let Some(message) = parse_error_from_line(&line) {
                    last_error = Some(message);
                }
            }
            last_error
        });

        let mut final_path = None;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_line_lossy(&mut reader, &mut buf).await? {
            if let Some(transfer) = parse_progress_from_line(&line) {
                emitter.emit(ProgressEvent::Downloading(transfer));
            } else if let Some(path) = parse_finished_from_line(&line) {
                final_path = Some(path);
            } else {
                debug!(target: "ytgrab::ytdlp", "{line}");
            }
        }

        let status = child.wait().await?;
        let last_error = stderr_task.await.unwrap_or_default();
        if !status.success() {
            let message = last_error.unwrap_or_else(|| format!("yt-dlp exited with {status}"));
            return Err(DownloadError::Extractor { message });
        }
        final_path.ok_or(DownloadError::NoOutput)
    }

    /// Command line for one download, minus the executable.
    pub fn download_args(&self, request: &DownloadRequest, ffmpeg: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match request.media_kind {
            MediaKind::AudioOnly => {
                args.extend(["-f", "bestaudio/best", "--extract-audio", "--audio-format"].map(OsString::from));
                args.push(self.audio_codec.clone().into());
                args.push("--audio-quality".into());
                args.push(format!("{}K", self.audio_quality).into());
            }
            MediaKind::Video => {
                args.push("-f".into());
                args.push(self.video_format.clone().into());
            }
        }
        if let Some(ffmpeg) = ffmpeg {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.as_os_str().to_owned());
        }

        args.extend(
            [
                "--newline",
                "--no-playlist",
                "--no-warnings",
                "--quiet",
                "--progress",
                "--no-simulate",
            ]
            .map(OsString::from),
        );
        args.push("--progress-template".into());
        args.push(progress_template().into());
        args.push("--print".into());
        args.push(finished_template().into());
        args.push("--output".into());
        args.push(
            request
                .destination_directory
                .join("%(title)s.%(ext)s")
                .into_os_string(),
        );
        args.push("--".into());
        args.push(request.source_url.clone().into());
        args
    }
}

/// Turns yt-dlp's `--dump-single-json` output into preview metadata.
fn parse_metadata(json: &[u8]) -> Result<VideoMetadata, FetchError> {
    let raw: RawInfo = serde_json::from_slice(json)?;
    Ok(VideoMetadata {
        title: raw.title.unwrap_or_else(|| "Unknown Title".to_string()),
        thumbnail_url: raw.thumbnail.filter(|t| !t.is_empty()),
        author: raw.uploader.unwrap_or_else(|| "Unknown Author".to_string()),
        duration_seconds: raw.duration.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0) as u64,
    })
}

/// Reads one line, replacing bytes that aren't UTF-8.
///
/// File names come back in whatever encoding the console uses, so a strict
/// UTF-8 read would fail on some titles.
async fn next_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

fn last_error<'a>(lines: impl Iterator<Item = &'a str>) -> Option<String> {
    let lines: Vec<&str> = lines.collect();
    lines
        .iter()
        .rev()
        .find_map(|line| parse_error_from_line(line))
        .or_else(|| lines.iter().rev().find(|l| !l.trim().is_empty()).map(|l| l.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::channel;
    use pretty_assertions::assert_eq;

    fn downloader(toolchain: Toolchain) -> Downloader {
        Downloader::new(Arc::new(toolchain), &Settings::default())
    }

    fn request(kind: MediaKind, dir: &Path) -> DownloadRequest {
        DownloadRequest {
            source_url: "https://youtu.be/abc123".to_string(),
            media_kind: kind,
            destination_directory: dir.to_path_buf(),
        }
    }

    fn has_pair(args: &[OsString], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn parses_metadata_with_defaults() {
        let meta = parse_metadata(br#"{"title":"Clip","thumbnail":"https://i.ytimg.com/vi/abc/hq.jpg","uploader":"Chan","duration":61.9,"id":"abc"}"#).unwrap();
        assert_eq!(
            meta,
            VideoMetadata {
                title: "Clip".into(),
                thumbnail_url: Some("https://i.ytimg.com/vi/abc/hq.jpg".into()),
                author: "Chan".into(),
                duration_seconds: 61,
            }
        );

        let meta = parse_metadata(b"{}").unwrap();
        assert_eq!(meta.title, "Unknown Title");
        assert_eq!(meta.author, "Unknown Author");
        assert_eq!(meta.thumbnail_url, None);
        assert_eq!(meta.duration_seconds, 0);
    }

    #[test]
    fn rejects_non_json_metadata() {
        assert!(matches!(parse_metadata(b"oops"), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn picks_last_error_line() {
        let stderr = "WARNING: a\nERROR: first\nERROR: second\n";
        assert_eq!(last_error(stderr.lines()), Some("second".to_string()));
        assert_eq!(last_error("boom\n\n".lines()), Some("boom".to_string()));
        assert_eq!(last_error("".lines()), None);
    }

    #[test]
    fn audio_args_transcode_with_ffmpeg() {
        let d = downloader(Toolchain::default());
        let args = d.download_args(&request(MediaKind::AudioOnly, Path::new("/music")), Some(Path::new("/opt/ffmpeg")));
        assert!(has_pair(&args, "-f", "bestaudio/best"));
        assert!(args.iter().any(|a| a == "--extract-audio"));
        assert!(has_pair(&args, "--audio-format", "mp3"));
        assert!(has_pair(&args, "--audio-quality", "192K"));
        assert!(has_pair(&args, "--ffmpeg-location", "/opt/ffmpeg"));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc123");
    }

    #[test]
    fn video_args_use_configured_format() {
        let d = downloader(Toolchain::default());
        let args = d.download_args(&request(MediaKind::Video, Path::new("/videos")), None);
        assert!(has_pair(&args, "-f", "best[height<=720]/best"));
        assert!(!args.iter().any(|a| a == "--extract-audio"));
        assert!(!args.iter().any(|a| a == "--ffmpeg-location"));
        let output = Path::new("/videos").join("%(title)s.%(ext)s");
        assert!(has_pair(&args, "--output", output.to_str().unwrap()));
    }

    #[tokio::test]
    async fn missing_extractor_fails_with_one_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        let d = downloader(Toolchain::new(Some(dir.path().join("missing-yt-dlp")), None));
        let (mut tx, mut rx) = channel();

        let result = d.download(request(MediaKind::Video, dir.path()), &mut tx).await;
        assert!(matches!(result, Err(DownloadError::ExtractorMissing)));

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProgressEvent::Failed { reason } if reason.contains("yt-dlp")));
    }

    #[tokio::test]
    async fn audio_without_transcoder_fails_before_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("yt-dlp");
        std::fs::write(&fake, b"").unwrap();
        let d = downloader(Toolchain::new(Some(fake), Some(dir.path().join("no-ffmpeg"))));
        let (mut tx, mut rx) = channel();

        let result = d.download(request(MediaKind::AudioOnly, dir.path()), &mut tx).await;
        assert!(matches!(result, Err(DownloadError::TranscoderMissing)));
        assert_eq!(
            rx.drain(),
            vec![ProgressEvent::Failed { reason: DownloadError::TranscoderMissing.to_string() }]
        );
    }

    #[tokio::test]
    async fn missing_extractor_fails_metadata_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let d = downloader(Toolchain::new(Some(dir.path().join("missing")), None));
        let result = d.fetch_metadata("https://youtu.be/abc123").await;
        assert!(matches!(result, Err(FetchError::ExtractorMissing)));
    }

    // One test so the fake scripts aren't exec'd while another test thread
    // still holds them open for writing.
    #[cfg(unix)]
    #[tokio::test]
    async fn fake_extractor_end_to_end() {
        use crate::model::Transfer;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        let ok = script(
            "ok.sh",
            &format!(
                "echo '[youtube] abc: Downloading webpage'\n\
                 echo '[progress]0;2048;NA;NA'\n\
                 echo '[progress]1024;2048;NA;1048576.0'\n\
                 echo '[progress]2048;2048;NA;NA'\n\
                 echo '[finished]{}/Clip.mp4'",
                out.display()
            ),
        );
        let failing = script("fail.sh", "echo 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1");
        let latin1 = script(
            "latin1.sh",
            &format!(
                "printf 'warn \\351\\n' >&2\n\
                 printf '[progress]1024;2048;NA;NA\\n[finished]{}/Caf\\351.mp4\\n'",
                out.display()
            ),
        );
        let latin1_error = script(
            "latin1_error.sh",
            "printf 'bad \\351 byte\\nERROR: gone\\n' >&2\nexit 1",
        );
        let info = script(
            "info.sh",
            r#"echo '{"title":"Clip","uploader":"Chan","duration":5}'"#,
        );

        // successful transfer
        let d = downloader(Toolchain::new(Some(ok), None));
        let (mut tx, mut rx) = channel();
        let path = d.download(request(MediaKind::Video, &out), &mut tx).await.unwrap();
        assert_eq!(path, out.join("Clip.mp4"));
        assert!(out.is_dir());
        let events = rx.drain();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[1],
            ProgressEvent::Downloading(Transfer {
                downloaded_bytes: 1024,
                total_bytes: Some(2048),
                total_bytes_estimate: None,
                speed: Some(1048576.0),
            })
        );
        assert_eq!(events[3], ProgressEvent::Finished { final_path: out.join("Clip.mp4") });

        // extractor error
        let d = downloader(Toolchain::new(Some(failing), None));
        let (mut tx, mut rx) = channel();
        let err = d.download(request(MediaKind::Video, &out), &mut tx).await.unwrap_err();
        assert_eq!(err.to_string(), "[youtube] abc: Video unavailable");
        assert_eq!(
            rx.drain(),
            vec![ProgressEvent::Failed { reason: "[youtube] abc: Video unavailable".into() }]
        );

        let err = d.fetch_metadata("https://youtu.be/abc").await.unwrap_err();
        assert_eq!(err.to_string(), "[youtube] abc: Video unavailable");

        // non-UTF-8 output still finishes, with the bad byte replaced
        let d = downloader(Toolchain::new(Some(latin1), None));
        let (mut tx, mut rx) = channel();
        let path = d.download(request(MediaKind::Video, &out), &mut tx).await.unwrap();
        assert_eq!(path, out.join("Caf\u{FFFD}.mp4"));
        let events = rx.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ProgressEvent::Finished { final_path: out.join("Caf\u{FFFD}.mp4") });

        // and the error after a non-UTF-8 stderr line is still reported
        let d = downloader(Toolchain::new(Some(latin1_error), None));
        let (mut tx, _rx) = channel();
        let err = d.download(request(MediaKind::Video, &out), &mut tx).await.unwrap_err();
        assert_eq!(err.to_string(), "gone");

        // metadata
        let d = downloader(Toolchain::new(Some(info), None));
        let meta = d.fetch_metadata("https://youtu.be/abc").await.unwrap();
        assert_eq!(meta.title, "Clip");
        assert_eq!(meta.duration_label(), "0:05");
    }
}
