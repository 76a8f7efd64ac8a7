//! Download folder resolution.

use std::path::{Path, PathBuf};

/// `~/Downloads`, or `./Downloads` if no home directory can be determined.
pub fn default_downloads_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Downloads")
}

fn expand_tilde(p: &str) -> PathBuf {
    let home = || dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if p == "~" {
        return home();
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home().join(rest);
    }
    PathBuf::from(p)
}

fn absolutize(p: &Path) -> PathBuf {
    if p.is_absolute() {
        return p.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(p))
        .unwrap_or_else(|_| p.to_path_buf())
}

/// Turn user input into the directory downloads should land in.
///
/// Empty input means the default downloads dir, a leading `~` expands to home,
/// and a path naming an existing file resolves to that file's directory. The
/// folder is not created here.
pub async fn normalize_download_dir(input: Option<&str>) -> PathBuf {
    let raw = input.map(str::trim).unwrap_or("");
    let candidate = if raw.is_empty() {
        default_downloads_dir()
    } else {
        expand_tilde(raw)
    };
    let resolved = absolutize(&candidate);

    match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_file() => resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(resolved),
        _ => resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_input_uses_default() {
        assert_eq!(normalize_download_dir(None).await, default_downloads_dir());
        assert_eq!(
            normalize_download_dir(Some("   ")).await,
            default_downloads_dir()
        );
    }

    #[tokio::test]
    async fn tilde_expands_to_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(normalize_download_dir(Some("~")).await, home);
        assert_eq!(
            normalize_download_dir(Some("~/Videos/clips")).await,
            home.join("Videos").join("clips")
        );
    }

    #[tokio::test]
    async fn existing_file_resolves_to_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("video.mp4");
        std::fs::write(&file, b"x").unwrap();
        let input = file.display().to_string();
        assert_eq!(normalize_download_dir(Some(&input)).await, dir.path());
    }

    #[tokio::test]
    async fn missing_path_is_kept_as_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("not").join("yet");
        let input = format!("  {}  ", target.display());
        assert_eq!(normalize_download_dir(Some(&input)).await, target);
    }

    #[tokio::test]
    async fn relative_paths_are_made_absolute() {
        let out = normalize_download_dir(Some("some-relative-dir")).await;
        assert!(out.is_absolute());
        assert!(out.ends_with("some-relative-dir"));
    }
}
