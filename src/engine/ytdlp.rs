//! yt-dlp specifics: the command line we hand it and how we read its output.

use std::path::Path;

/// Upper bound on user-facing error text, in characters.
const MAX_ERROR_CHARS: usize = 1500;
const TRUNCATED_MARKER: &str = " (truncated)";
const FILENAME_MAX_LEN: &str = "180";
const OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";
/// Emitted by yt-dlp on every run under an old interpreter; never the real cause.
const NOISY_PREFIXES: &[&str] = &["Deprecated Feature: Support for Python version"];

/// Format selector for the current muxer availability.
pub fn format_selector(ffmpeg: bool) -> &'static str {
    if ffmpeg {
        "bestvideo*+bestaudio/best"
    } else {
        "best[ext=mp4]/best"
    }
}

/// Arguments for downloading a single URL into `folder`.
///
/// `ffmpeg_location` is passed through when the muxer was found somewhere yt-dlp
/// would not look on its own. The URL always follows `--` so input that looks
/// like a flag is never parsed as one.
pub fn build_download_args(
    url: &str,
    folder: &Path,
    ffmpeg: bool,
    ffmpeg_location: Option<&Path>,
) -> Vec<String> {
    let outtmpl = folder.join(OUTPUT_TEMPLATE);
    let mut args: Vec<String> = vec![
        "--no-warnings".into(),
        "--no-progress".into(),
        "--no-playlist".into(),
        "--windows-filenames".into(),
        "--trim-filenames".into(),
        FILENAME_MAX_LEN.into(),
        "-f".into(),
        format_selector(ffmpeg).into(),
    ];
    if ffmpeg {
        args.push("--merge-output-format".into());
        args.push("mp4".into());
        if let Some(location) = ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(location.to_string_lossy().into_owned());
        }
    }
    args.extend([
        "-o".into(),
        outtmpl.to_string_lossy().into_owned(),
        "--dump-json".into(),
        "--no-simulate".into(),
        "--".into(),
        url.to_string(),
    ]);
    args
}

/// Title from `--dump-json` output: the last line that parses as a JSON object
/// with a non-empty string `title`. Anything unparseable is skipped.
pub fn parse_title(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .filter_map(|v| {
            v.as_object()?
                .get("title")?
                .as_str()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
        .last()
}

/// Trim stderr into something worth showing a user.
pub fn clean_error(stderr: &str) -> String {
    let raw = stderr.trim();
    if raw.is_empty() {
        return String::new();
    }

    let filtered = raw
        .lines()
        .filter(|line| !NOISY_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect::<Vec<_>>()
        .join("\n");
    let filtered = filtered.trim();
    let msg = if filtered.is_empty() { raw } else { filtered };

    match msg.char_indices().nth(MAX_ERROR_CHARS) {
        None => msg.to_string(),
        Some((cut, _)) => format!("{}{TRUNCATED_MARKER}", &msg[..cut]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn last_titled_line_wins() {
        let out = "{\"id\":\"abc\"}\n{\"title\":\"My Video\",\"id\":\"abc\"}\n";
        assert_eq!(parse_title(out).as_deref(), Some("My Video"));

        let two = "{\"title\":\"First\"}\nnot json\n{\"title\":\"  Second  \"}\n{\"title\":\"\"}\n";
        assert_eq!(parse_title(two).as_deref(), Some("Second"));
    }

    #[test]
    fn no_object_lines_means_no_title() {
        assert_eq!(parse_title(""), None);
        assert_eq!(parse_title("[download] 100%\nplain text\n[1,2]\n"), None);
        assert_eq!(parse_title("{\"title\": 42}\n{broken\n"), None);
    }

    #[test]
    fn clean_error_drops_noise_but_keeps_raw_fallback() {
        let noisy = "Deprecated Feature: Support for Python version 3.8 has been deprecated\nERROR: Unsupported URL: https://x\n";
        assert_eq!(clean_error(noisy), "ERROR: Unsupported URL: https://x");

        let only_noise = "Deprecated Feature: Support for Python version 3.8 has been deprecated";
        assert_eq!(clean_error(only_noise), only_noise);

        assert_eq!(clean_error("  \n "), "");
    }

    #[test]
    fn clean_error_truncates_long_text() {
        let long = "e".repeat(2000);
        let cleaned = clean_error(&long);
        assert_eq!(cleaned, format!("{} (truncated)", "e".repeat(1500)));

        let exact = "x".repeat(1500);
        assert_eq!(clean_error(&exact), exact);
    }

    #[test]
    fn clean_error_truncates_on_char_boundaries() {
        let wide = "é".repeat(1600);
        let cleaned = clean_error(&wide);
        assert!(cleaned.ends_with(" (truncated)"));
        assert_eq!(cleaned.chars().filter(|c| *c == 'é').count(), 1500);
    }

    #[test]
    fn args_follow_muxer_availability() {
        let folder = PathBuf::from("/tmp/dl");
        let with = build_download_args("https://v/1", &folder, true, None);
        assert!(with.windows(2).any(|w| w == ["-f", "bestvideo*+bestaudio/best"]));
        assert!(with.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(with.windows(2).any(|w| w == ["--trim-filenames", "180"]));
        assert_eq!(with.last().map(String::as_str), Some("https://v/1"));

        let without = build_download_args("https://v/1", &folder, false, Some(Path::new("/opt/ffmpeg")));
        assert!(without.windows(2).any(|w| w == ["-f", "best[ext=mp4]/best"]));
        assert!(!without.iter().any(|a| a == "--merge-output-format"));
        assert!(!without.iter().any(|a| a == "--ffmpeg-location"));
        assert!(!with.iter().any(|a| a == "--ffmpeg-location"));
        for flag in ["--no-warnings", "--no-progress", "--no-playlist", "--windows-filenames", "--dump-json", "--no-simulate"] {
            assert!(without.iter().any(|a| a == flag), "missing {flag}");
        }
        let tmpl = folder.join("%(title)s [%(id)s].%(ext)s");
        assert!(without.windows(2).any(|w| w[0] == "-o" && w[1] == tmpl.to_string_lossy()));
    }

    #[test]
    fn ffmpeg_location_follows_override() {
        let args = build_download_args("https://v/1", Path::new("/dl"), true, Some(Path::new("/opt/ff/ffmpeg")));
        assert!(args.windows(2).any(|w| w == ["--ffmpeg-location", "/opt/ff/ffmpeg"]));
    }

    #[test]
    fn flag_like_input_stays_positional() {
        let args = build_download_args("--exec=touch /tmp/x", Path::new("/dl"), false, None);
        assert_eq!(&args[args.len() - 2..], ["--", "--exec=touch /tmp/x"]);
        assert_eq!(args.iter().filter(|a| a.starts_with("--exec")).count(), 1);
    }
}
