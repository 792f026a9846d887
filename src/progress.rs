//! Parsing yt-dlp output into events, and turning events into status text.

use std::path::{Path, PathBuf};

use crate::model::{MEGABYTE, Transfer};

/// Prefix yt-dlp prints in front of each progress line
pub const PROGRESS_PREFIX: &str = "[progress]";
/// Prefix yt-dlp prints in front of the final file path
pub const FINISHED_PREFIX: &str = "[finished]";

/// Value of `--progress-template`; fields are `;`-separated, `NA` when missing.
pub fn progress_template() -> String {
    format!(
        "download:{PROGRESS_PREFIX}%(progress.downloaded_bytes)s;%(progress.total_bytes)s;%(progress.total_bytes_estimate)s;%(progress.speed)s"
    )
}

/// Value of `--print` that reports where the file ended up.
pub fn finished_template() -> String {
    format!("after_move:{FINISHED_PREFIX}%(filepath)s")
}

/// Parses one progress line, e.g. `[progress]1024;4096;NA;512.5`.
pub fn parse_progress_from_line(line: &str) -> Option<Transfer> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split(';');
    let downloaded_bytes = parse_bytes(fields.next()?)?;
    let total_bytes = fields.next().and_then(parse_bytes);
    let total_bytes_estimate = fields.next().and_then(parse_bytes);
    let speed = fields
        .next()
        .and_then(parse_number)
        .filter(|s| *s > 0.0);
    Some(Transfer {
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
        speed,
    })
}

/// Parses the `[finished]<path>` line printed after the file is moved.
pub fn parse_finished_from_line(line: &str) -> Option<PathBuf> {
    let path = line.trim().strip_prefix(FINISHED_PREFIX)?.trim();
    (!path.is_empty() && path != "NA").then(|| PathBuf::from(path))
}

/// Extracts the message from a yt-dlp `ERROR:` line on stderr.
pub fn parse_error_from_line(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix("ERROR:")
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

fn parse_number(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("NA") || field == "None" {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

// Estimates come through as floats ("1234.0")
fn parse_bytes(field: &str) -> Option<u64> {
    parse_number(field).map(|v| v as u64)
}

/// Status line for a running transfer.
///
/// - exact total: `Downloading... 12.5% (1.0/8.0 MB)`
/// - estimated total: `Downloading... 12.5% (~1.0 MB)`
/// - no total: `Downloading... 1.0 MB`
///
/// A non-zero speed is appended as ` (2.5 MB/s)`.
pub fn status_text(transfer: &Transfer) -> String {
    let downloaded_mb = transfer.downloaded_bytes as f64 / MEGABYTE;
    let mut text = match (transfer.fraction_complete(), transfer.total_bytes) {
        (Some(fraction), Some(total)) if !transfer.is_approximate() => {
            let total_mb = total as f64 / MEGABYTE;
            format!(
                "Downloading... {:.1}% ({downloaded_mb:.1}/{total_mb:.1} MB)",
                fraction as f64 * 100.0
            )
        }
        (Some(fraction), _) => format!(
            "Downloading... {:.1}% (~{downloaded_mb:.1} MB)",
            fraction as f64 * 100.0
        ),
        (None, _) => format!("Downloading... {downloaded_mb:.1} MB"),
    };
    if let Some(speed) = transfer.speed.filter(|s| *s > 0.0) {
        text.push_str(&format!(" ({:.1} MB/s)", speed / MEGABYTE));
    }
    text
}

/// Status line once the file is in place.
pub fn finished_text(final_path: &Path) -> String {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| final_path.display().to_string());
    format!("Finished downloading: {name}")
}

/// Status line after a failure.
pub fn failed_text(reason: &str) -> String {
    format!("Error: {reason}")
}
