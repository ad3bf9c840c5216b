use crate::models::ProgressSample;
use once_cell::sync::Lazy;
use regex::Regex;

// percentage, then rate, then ETA, with anything in between
static PROGRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\.\d+)%.*?(\d+(?:\.\d+)?[A-Za-z]+/s).*?(\d+(?::\d+)+)")
        .expect("progress pattern is valid")
});

/// Extracts a progress sample from one line of downloader output.
///
/// Returns `None` for anything that is not a progress report, e.g.
/// `[Merger] Merging formats into "out.mp4"` or a finished line without ETA.
pub fn parse_progress_line(line: &str) -> Option<ProgressSample> {
    let caps = PROGRESS_PATTERN.captures(line)?;
    let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
    if !(0.0..=100.0).contains(&percent) {
        return None;
    }
    Some(ProgressSample {
        percent_complete: percent,
        transfer_rate: caps.get(2)?.as_str().to_string(),
        estimated_time_remaining: caps.get(3)?.as_str().to_string(),
    })
}
