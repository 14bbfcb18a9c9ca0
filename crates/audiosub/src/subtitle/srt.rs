//! SubRip rendering.

use std::fmt::Write;
use std::path::Path;

use crate::engine::Segment;

pub const MEDIA_TYPE: &str = "application/x-subrip";

/// Formats seconds as `HH:MM:SS,mmm`, rounded to the millisecond.
///
/// Negative and non-finite inputs render as zero.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Renders segments as numbered SRT blocks, each followed by a blank line.
pub fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        // writing into a String cannot fail
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(segment.start),
            format_timestamp(segment.end),
            segment.text.trim()
        );
    }
    out
}

/// Download name for the subtitles of `input`: `<stem>_subtitles.srt`.
pub fn output_filename(input: &str) -> String {
    let stem = Path::new(input)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("transcription");
    format!("{}_subtitles.srt", stem)
}
