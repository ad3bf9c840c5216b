use crate::models::{DownloadPreset, PresetKind};
use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+x\d+|\d+p)$").expect("resolution pattern is valid"));
static FILE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^~?\d+(\.\d+)?[KMGT]?i?B$").expect("size pattern is valid"));

/// The fixed preset table offered when nothing else is configured.
pub fn builtin_presets() -> Vec<DownloadPreset> {
    use PresetKind::*;

    vec![
        DownloadPreset::new("best", "best", "mp4", "best available", "Best quality (video+audio)", Combined),
        DownloadPreset::new("1080p", "best[height<=1080]", "mp4", "1080p", "1080p (video+audio)", Combined),
        DownloadPreset::new("720p", "best[height<=720]", "mp4", "720p", "720p (video+audio)", Combined),
        DownloadPreset::new("480p", "best[height<=480]", "mp4", "480p", "480p (video+audio)", Combined),
        DownloadPreset::new("360p", "best[height<=360]", "mp4", "360p", "360p (video+audio)", Combined),
        DownloadPreset::new("worst", "worst", "mp4", "worst available", "Worst quality (video+audio)", Combined),
        DownloadPreset::new("video", "bestvideo", "mp4", "video only", "Best video stream (no audio)", VideoOnly),
        DownloadPreset::new("audio", "bestaudio", "m4a", "audio only", "Best audio quality", AudioOnly),
    ]
}

/// Looks a preset up by id, case-insensitively.
pub fn find_preset<'a>(presets: &'a [DownloadPreset], id: &str) -> Result<&'a DownloadPreset> {
    presets
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| {
            let known: Vec<&str> = presets.iter().map(|p| p.id.as_str()).collect();
            anyhow!("Unknown preset '{}' (available: {})", id, known.join(", "))
        })
}

/// Reads a JSON array of presets.
pub fn load_preset_file(path: &Path) -> Result<Vec<DownloadPreset>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read preset file {}", path.display()))?;

    serde_json::from_str(&content).context("Failed to parse preset file")
}

/// Adds `extra` to `base`, replacing presets that share an id.
pub fn merge_presets(mut base: Vec<DownloadPreset>, extra: Vec<DownloadPreset>) -> Vec<DownloadPreset> {
    for preset in extra {
        match base.iter_mut().find(|p| p.id.eq_ignore_ascii_case(&preset.id)) {
            Some(existing) => *existing = preset,
            None => base.push(preset),
        }
    }
    base
}

/// Turns the downloader's `--list-formats` table into presets.
///
/// The common combined presets are added around the parsed rows so a
/// listing with no usable rows still offers something to pick.
pub fn parse_format_listing(output: &str) -> Vec<DownloadPreset> {
    let mut presets = Vec::new();
    let mut in_table = false;

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if is_table_header(line) {
            in_table = true;
            continue;
        }
        if !in_table || line.starts_with('-') || line.starts_with('=') {
            continue;
        }

        if let Some(preset) = parse_format_row(line) {
            presets.push(preset);
        }
    }

    let mut listing = builtin_presets()
        .into_iter()
        .filter(|p| p.id == "best")
        .collect::<Vec<_>>();
    listing.extend(presets);
    listing.extend(
        builtin_presets()
            .into_iter()
            .filter(|p| matches!(p.id.as_str(), "worst" | "audio" | "720p" | "480p")),
    );
    listing
}

fn is_table_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    (lower.contains("format code") && lower.contains("extension"))
        || (lower.starts_with("id ") && lower.contains("ext"))
}

fn parse_format_row(line: &str) -> Option<DownloadPreset> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }

    let format_id = parts[0];
    let extension = parts[1];
    if format_id.eq_ignore_ascii_case("id") || format_id.eq_ignore_ascii_case("format") {
        return None;
    }

    let mut resolution = "unknown".to_string();
    let mut size = None;
    let mut audio_only = false;
    let mut video_only = false;

    let rest = &parts[2..];
    let mut i = 0;
    while i < rest.len() {
        let part = rest[i];
        let next = rest.get(i + 1).copied();
        if RESOLUTION.is_match(part) && resolution == "unknown" {
            resolution = part.to_string();
        } else if FILE_SIZE.is_match(part) && size.is_none() {
            size = Some(part.trim_start_matches('~').to_string());
        } else if part == "audio" && next == Some("only") {
            resolution = "audio only".to_string();
            audio_only = true;
            i += 1;
        } else if part == "video" && next == Some("only") {
            video_only = true;
            i += 1;
        }
        i += 1;
    }

    let kind = if audio_only {
        PresetKind::AudioOnly
    } else if video_only {
        PresetKind::VideoOnly
    } else {
        PresetKind::Combined
    };

    let description = rest
        .iter()
        .copied()
        .filter(|p| *p != "|")
        .collect::<Vec<_>>()
        .join(" ");

    Some(
        DownloadPreset::new(format_id, format_id, extension, &resolution, &description, kind)
            .with_size(size),
    )
}
