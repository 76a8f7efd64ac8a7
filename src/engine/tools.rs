//! Resolution of the external yt-dlp and ffmpeg binaries.
//!
//! A `ToolLocator` is built once at startup and shared by reference. Each lookup
//! runs at most once per locator; failures of the yt-dlp lookup are cached too.

use super::process::{self, RunRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;

const YTDLP_BARE: &str = "yt-dlp";
const FFMPEG_BARE: &str = "ffmpeg";
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// The fetch tool (yt-dlp).
    Fetch,
    /// The muxer (ffmpeg).
    Mux,
}

/// Where to look. Built from the environment by `config`, or by hand in tests.
#[derive(Debug, Clone, Default)]
pub struct ToolSettings {
    pub ytdlp_override: Option<PathBuf>,
    pub ffmpeg_override: Option<PathBuf>,
    /// Directory whose `.venv` (and its parent's `.venv`) is searched.
    pub search_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub path: PathBuf,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct YtDlpStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ToolLocator {
    settings: ToolSettings,
    ytdlp: OnceCell<Result<ResolvedTool, String>>,
    ffmpeg: OnceCell<bool>,
}

impl ToolLocator {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            ytdlp: OnceCell::new(),
            ffmpeg: OnceCell::new(),
        }
    }

    /// Path for `kind`. The muxer never fails: when it is not usable the bare
    /// command name comes back, and callers should gate on `has_ffmpeg`.
    pub async fn locate(&self, kind: ToolKind) -> Result<PathBuf, String> {
        match kind {
            ToolKind::Fetch => self.resolve_ytdlp().await.map(|t| t.path),
            ToolKind::Mux => Ok(self.ffmpeg_command()),
        }
    }

    /// Resolve yt-dlp, verifying the candidate with `--version`.
    pub async fn resolve_ytdlp(&self) -> Result<ResolvedTool, String> {
        self.ytdlp
            .get_or_init(|| async {
                let candidate = self.ytdlp_candidate().await;
                match probe_version(&candidate, "--version").await {
                    Some(version) => {
                        tracing::debug!(path = %candidate.display(), %version, "resolved yt-dlp");
                        Ok(ResolvedTool {
                            path: candidate,
                            version,
                        })
                    }
                    None => {
                        let suffix = if candidate.as_os_str() == YTDLP_BARE {
                            String::new()
                        } else {
                            format!(" (checked: {})", candidate.display())
                        };
                        let msg = format!(
                            "yt-dlp not found. Install it (Homebrew or pip) or set YTDLP_PATH.{suffix}"
                        );
                        tracing::warn!("{msg}");
                        Err(msg)
                    }
                }
            })
            .await
            .clone()
    }

    /// Best-effort ffmpeg presence check; cached after the first call.
    pub async fn has_ffmpeg(&self) -> bool {
        *self
            .ffmpeg
            .get_or_init(|| async {
                let cmd = self.ffmpeg_command();
                let ok = probe_version(&cmd, "-version").await.is_some();
                tracing::debug!(command = %cmd.display(), ok, "probed ffmpeg");
                ok
            })
            .await
    }

    /// Explicit muxer path to hand to yt-dlp, if one was configured.
    pub fn ffmpeg_override(&self) -> Option<&Path> {
        self.settings.ffmpeg_override.as_deref()
    }

    /// Health snapshot for the `check` command.
    pub async fn ytdlp_status(&self) -> YtDlpStatus {
        match self.resolve_ytdlp().await {
            Ok(tool) => YtDlpStatus {
                ok: true,
                path: Some(tool.path.display().to_string()),
                version: Some(tool.version),
                error: None,
            },
            Err(e) => YtDlpStatus {
                ok: false,
                path: None,
                version: None,
                error: Some(e),
            },
        }
    }

    fn ffmpeg_command(&self) -> PathBuf {
        self.settings
            .ffmpeg_override
            .clone()
            .unwrap_or_else(|| PathBuf::from(FFMPEG_BARE))
    }

    async fn ytdlp_candidate(&self) -> PathBuf {
        if let Some(p) = self.settings.ytdlp_override.as_deref() {
            if is_executable(p).await {
                return p.to_path_buf();
            }
            tracing::debug!(path = %p.display(), "YTDLP_PATH is not executable; ignoring");
        }

        for candidate in venv_candidates(&self.settings.search_root) {
            if is_executable(&candidate).await {
                return candidate;
            }
        }

        PathBuf::from(YTDLP_BARE)
    }
}

/// Project-local virtualenv locations, in priority order.
fn venv_candidates(root: &Path) -> [PathBuf; 2] {
    let (bin_dir, exe) = if cfg!(windows) {
        ("Scripts", "yt-dlp.exe")
    } else {
        ("bin", "yt-dlp")
    };
    [
        root.join(".venv").join(bin_dir).join(exe),
        root.join("..").join(".venv").join(bin_dir).join(exe),
    ]
}

async fn is_executable(path: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    meta.is_file() && has_exec_bit(&meta)
}

#[cfg(unix)]
fn has_exec_bit(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &std::fs::Metadata) -> bool {
    true
}

/// First stdout line of `<program> <flag>`, or "unknown" if it exits 0 silently.
async fn probe_version(program: &Path, flag: &str) -> Option<String> {
    let res = process::run(RunRequest::new(program, [flag]).timeout(PROBE_TIMEOUT)).await;
    if !res.success() {
        return None;
    }
    let first = res.stdout.lines().next().unwrap_or("").trim();
    Some(if first.is_empty() {
        "unknown".to_string()
    } else {
        first.to_string()
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    /// Write an executable shell script.
    #[cfg(unix)]
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Lines the fake tool appended to its invocation log.
    pub fn log_lines(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
