use crate::models::{AuthOptions, DownloadRequest, PresetKind};
use once_cell::sync::Lazy;
use regex::Regex;

static HEIGHT_LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"height<=(\d+)").expect("height pattern is valid"));

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const AUDIO_FORMAT: &str = "mp3";
const MERGE_FORMAT: &str = "mp4";

/// Builds the argument vector for downloading `request` with `binary`.
///
/// The result is handed to the process spawner element by element, so the
/// URL and output directory are never split or interpreted by a shell.
pub fn build_download_command(binary: &str, request: &DownloadRequest) -> Vec<String> {
    let preset = &request.preset;
    let mut args = vec![binary.to_string()];

    if let Some(height) = max_height(&preset.format_selector) {
        args.push("-S".to_string());
        args.push(format!("res:{},fps", height));
    }

    match preset.kind {
        PresetKind::AudioOnly => {
            args.extend(
                [
                    "-f",
                    "bestaudio/best",
                    "-x",
                    "--audio-format",
                    AUDIO_FORMAT,
                    "--audio-quality",
                    "0",
                ]
                .map(String::from),
            );
        }
        PresetKind::VideoOnly => {
            args.push("-f".to_string());
            args.push(preset.format_selector.clone());
        }
        PresetKind::Combined => {
            args.push("-f".to_string());
            args.push(combined_selector(&preset.format_selector));
            args.push("--merge-output-format".to_string());
            args.push(MERGE_FORMAT.to_string());
        }
    }

    args.push("-o".to_string());
    args.push(
        request
            .output_directory
            .join(OUTPUT_TEMPLATE)
            .to_string_lossy()
            .into_owned(),
    );

    push_cookie_args(&mut args, &request.auth);
    args.push("--newline".to_string());
    args.push(request.source_url.clone());
    args
}

/// Command that prints the format table for `url`.
pub fn build_formats_command(binary: &str, url: &str, auth: &AuthOptions) -> Vec<String> {
    let mut args = vec![binary.to_string(), "--list-formats".to_string()];
    push_cookie_args(&mut args, auth);
    args.push(url.to_string());
    args
}

/// Command that prints the media title for `url`.
pub fn build_title_command(binary: &str, url: &str, auth: &AuthOptions) -> Vec<String> {
    let mut args = vec![binary.to_string(), "--get-title".to_string()];
    push_cookie_args(&mut args, auth);
    args.push(url.to_string());
    args
}

fn push_cookie_args(args: &mut Vec<String>, auth: &AuthOptions) {
    if let Some(browser) = auth.cookie_browser() {
        args.push("--cookies-from-browser".to_string());
        args.push(browser.as_str().to_string());
    }
}

/// Selector for a combined download.
///
/// `best` and `best[...]` become a merge of the best video and audio
/// streams carrying the same filters, minus height caps which are expressed
/// as a sort preference instead. Anything else is passed through.
fn combined_selector(format_selector: &str) -> String {
    let Some(rest) = format_selector.strip_prefix("best") else {
        return format_selector.to_string();
    };
    let filters_only =
        rest.starts_with('[') && rest.ends_with(']') && !rest.contains(['/', '+', ',']);
    if !rest.is_empty() && !filters_only {
        return format_selector.to_string();
    }

    let filters: String = rest
        .split(['[', ']'])
        .filter(|f| !f.is_empty() && !f.starts_with("height<="))
        .map(|f| format!("[{}]", f))
        .collect();
    format!("bestvideo{0}+bestaudio/best{0}", filters)
}

/// Height cap embedded in a selector such as `best[height<=720]`.
///
/// Unparseable caps yield `None`; callers then skip the sort preference.
fn max_height(format_selector: &str) -> Option<u32> {
    HEIGHT_LIMIT
        .captures(format_selector)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Browser, DownloadPreset};
    use crate::presets::builtin_presets;
    use std::path::PathBuf;

    fn request(preset: DownloadPreset) -> DownloadRequest {
        DownloadRequest {
            source_url: "https://www.youtube.com/watch?v=abc123".to_string(),
            preset,
            output_directory: PathBuf::from("/tmp/media"),
            auth: AuthOptions::default(),
        }
    }

    fn preset(selector: &str, kind: PresetKind) -> DownloadPreset {
        DownloadPreset::new("custom", selector, "mp4", "custom", "Custom", kind)
    }

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn combined_preset_merges_into_mp4() {
        let args = build_download_command("yt-dlp", &request(preset("best[height<=720]", PresetKind::Combined)));
        assert_eq!(
            args,
            vec![
                "yt-dlp",
                "-S",
                "res:720,fps",
                "-f",
                "bestvideo+bestaudio/best",
                "--merge-output-format",
                "mp4",
                "-o",
                "/tmp/media/%(title)s.%(ext)s",
                "--newline",
                "https://www.youtube.com/watch?v=abc123",
            ]
        );
    }

    #[test]
    fn worst_preset_keeps_its_selector() {
        let presets = builtin_presets();
        let worst = presets.iter().find(|p| p.id == "worst").unwrap().clone();
        let args = build_download_command("yt-dlp", &request(worst));
        assert_eq!(flag_value(&args, "-f"), Some("worst"));
        assert_eq!(flag_value(&args, "--merge-output-format"), Some("mp4"));
        assert!(!args.iter().any(|a| a == "-S"));
    }

    #[test]
    fn combined_filters_survive_the_merge() {
        let args = build_download_command(
            "yt-dlp",
            &request(preset("best[height<=720][fps<=30]", PresetKind::Combined)),
        );
        assert_eq!(
            flag_value(&args, "-f"),
            Some("bestvideo[fps<=30]+bestaudio/best[fps<=30]")
        );
        assert_eq!(flag_value(&args, "-S"), Some("res:720,fps"));

        let args = build_download_command("yt-dlp", &request(preset("18", PresetKind::Combined)));
        assert_eq!(flag_value(&args, "-f"), Some("18"));

        let args = build_download_command(
            "yt-dlp",
            &request(preset("best[height<=480]/worst", PresetKind::Combined)),
        );
        assert_eq!(flag_value(&args, "-f"), Some("best[height<=480]/worst"));
        assert_eq!(flag_value(&args, "-S"), Some("res:480,fps"));

        let args = build_download_command(
            "yt-dlp",
            &request(preset("best[ext=mp4]/best[ext=webm]", PresetKind::Combined)),
        );
        assert_eq!(flag_value(&args, "-f"), Some("best[ext=mp4]/best[ext=webm]"));

        let args = build_download_command("yt-dlp", &request(preset("best", PresetKind::Combined)));
        assert_eq!(flag_value(&args, "-f"), Some("bestvideo+bestaudio/best"));
    }

    #[test]
    fn audio_presets_always_extract() {
        let audio: Vec<_> = builtin_presets()
            .into_iter()
            .filter(|p| p.kind == PresetKind::AudioOnly)
            .chain([preset("bestaudio[height<=480]", PresetKind::AudioOnly)])
            .collect();
        assert!(!audio.is_empty());

        for p in audio {
            let args = build_download_command("yt-dlp", &request(p));
            assert!(args.iter().any(|a| a == "-x"));
            assert_eq!(flag_value(&args, "--audio-format"), Some("mp3"));
            assert_eq!(flag_value(&args, "--audio-quality"), Some("0"));
            let selector = flag_value(&args, "-f").unwrap();
            assert!(!selector.contains("bestvideo"));
            assert!(!args.iter().any(|a| a == "--merge-output-format"));
        }
    }

    #[test]
    fn video_only_selector_is_passed_through() {
        let args = build_download_command(
            "yt-dlp",
            &request(preset("bestvideo[height<=1080]", PresetKind::VideoOnly)),
        );
        assert_eq!(flag_value(&args, "-f"), Some("bestvideo[height<=1080]"));
        assert_eq!(flag_value(&args, "-S"), Some("res:1080,fps"));
        assert!(!args.iter().any(|a| a == "--merge-output-format"));
        assert!(!args.iter().any(|a| a == "-x"));
    }

    #[test]
    fn every_height_cap_becomes_sort_preference() {
        for height in [144, 360, 480, 720, 1080, 2160] {
            let selector = format!("best[height<={}]", height);
            let args = build_download_command("yt-dlp", &request(preset(&selector, PresetKind::Combined)));
            assert_eq!(flag_value(&args, "-S"), Some(format!("res:{},fps", height).as_str()));
        }
    }

    #[test]
    fn malformed_height_skips_sort_preference() {
        for selector in ["best[height<=abc]", "best[height<=]", "best", "best[height<=99999999999]"] {
            let args = build_download_command("yt-dlp", &request(preset(selector, PresetKind::Combined)));
            assert!(!args.iter().any(|a| a == "-S"), "unexpected -S for {}", selector);
            assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc123");
        }
    }

    #[test]
    fn special_characters_stay_single_tokens() {
        let mut req = request(preset("best", PresetKind::Combined));
        req.source_url = "https://example.com/watch?v=a b&list=x;rm -rf".to_string();
        req.output_directory = PathBuf::from("/tmp/my videos & clips; yes");

        let args = build_download_command("yt-dlp", &req);
        assert_eq!(args.last().unwrap(), &req.source_url);
        assert_eq!(
            flag_value(&args, "-o"),
            Some("/tmp/my videos & clips; yes/%(title)s.%(ext)s")
        );
    }

    #[test]
    fn browser_cookies_only_when_enabled() {
        let mut req = request(preset("best", PresetKind::Combined));
        req.auth = AuthOptions {
            use_browser_cookies: true,
            browser: Some(Browser::Edge),
        };
        let args = build_download_command("yt-dlp", &req);
        assert_eq!(flag_value(&args, "--cookies-from-browser"), Some("edge"));

        req.auth.use_browser_cookies = false;
        let args = build_download_command("yt-dlp", &req);
        assert!(!args.iter().any(|a| a == "--cookies-from-browser"));
    }

    #[test]
    fn url_is_always_last_and_binary_first() {
        for p in builtin_presets() {
            let args = build_download_command("/opt/bin/yt-dlp", &request(p));
            assert_eq!(args[0], "/opt/bin/yt-dlp");
            assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc123");
            assert!(args.iter().any(|a| a == "--newline"));
        }
    }

    #[test]
    fn title_and_format_commands_carry_cookies() {
        let auth = AuthOptions {
            use_browser_cookies: true,
            browser: Some(Browser::Firefox),
        };
        assert_eq!(
            build_formats_command("yt-dlp", "https://x.test/v", &auth),
            vec!["yt-dlp", "--list-formats", "--cookies-from-browser", "firefox", "https://x.test/v"]
        );
        assert_eq!(
            build_title_command("yt-dlp", "https://x.test/v", &AuthOptions::default()),
            vec!["yt-dlp", "--get-title", "https://x.test/v"]
        );
    }
}
