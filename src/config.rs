//! Environment and persisted settings.

use crate::engine::tools::ToolSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "media-batch-dl";
const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_MAX_HISTORY_SESSIONS: u32 = 30;
pub const MAX_HISTORY_SESSIONS_CAP: u32 = 200;

/// Values read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    /// Running on a hosted platform where downloads land on someone else's disk.
    pub hosted: bool,
    pub allow_hosted_downloads: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str| get(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        let flag = |key: &str| get(key).is_some_and(|v| v == "1");
        Self {
            ytdlp_path: path("YTDLP_PATH"),
            ffmpeg_path: path("FFMPEG_PATH"),
            hosted: flag("VERCEL"),
            allow_hosted_downloads: flag("ALLOW_HOSTED_DOWNLOADS"),
        }
    }

    pub fn downloads_blocked(&self) -> bool {
        self.hosted && !self.allow_hosted_downloads
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            ytdlp_override: self.ytdlp_path.clone(),
            ffmpeg_override: self.ffmpeg_path.clone(),
            search_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// 0 turns history off.
    pub max_history_sessions: u32,
    pub remember_folder: bool,
    pub last_folder: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_history_sessions: DEFAULT_MAX_HISTORY_SESSIONS,
            remember_folder: true,
            last_folder: None,
        }
    }
}

/// Loose on-disk shape: anything of the wrong type falls back to the default.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    max_history_sessions: Option<serde_json::Value>,
    remember_folder: Option<serde_json::Value>,
    last_folder: Option<serde_json::Value>,
}

impl Settings {
    fn coerce(raw: RawSettings) -> Self {
        let defaults = Settings::default();
        let max_history_sessions = raw
            .max_history_sessions
            .as_ref()
            .and_then(serde_json::Value::as_f64)
            .filter(|n| n.is_finite())
            .map(|n| n.round().clamp(0.0, MAX_HISTORY_SESSIONS_CAP as f64) as u32)
            .unwrap_or(defaults.max_history_sessions);
        let remember_folder = raw
            .remember_folder
            .as_ref()
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(defaults.remember_folder);
        let last_folder = raw
            .last_folder
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty());
        Self {
            max_history_sessions,
            remember_folder,
            last_folder,
        }
    }

    pub fn set_max_history_sessions(&mut self, n: u32) {
        self.max_history_sessions = n.min(MAX_HISTORY_SESSIONS_CAP);
    }

    /// Folder to use when none was given on the command line.
    pub fn default_folder(&self) -> Option<&str> {
        if self.remember_folder {
            self.last_folder.as_deref()
        } else {
            None
        }
    }
}

/// Reads and writes `settings.json`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config dir>/media-batch-dl/settings.json`.
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir().context("could not determine config directory")?;
        Ok(Self::new(base.join(APP_DIR).join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield defaults.
    pub fn load(&self) -> Settings {
        let raw = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str::<RawSettings>(&s).ok())
            .unwrap_or_default();
        Settings::coerce(raw)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        crate::storage::write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn env_overrides_and_hosted_gate() {
        let cfg = env(&[("YTDLP_PATH", "/opt/yt-dlp"), ("FFMPEG_PATH", " "), ("VERCEL", "1")]);
        assert_eq!(cfg.ytdlp_path, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(cfg.ffmpeg_path, None);
        assert!(cfg.downloads_blocked());

        let allowed = env(&[("VERCEL", "1"), ("ALLOW_HOSTED_DOWNLOADS", "1")]);
        assert!(!allowed.downloads_blocked());

        assert!(!env(&[("VERCEL", "true")]).downloads_blocked());
        assert!(!env(&[]).downloads_blocked());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn bad_values_are_coerced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"max_history_sessions": 999.4, "remember_folder": "yes", "last_folder": 7}"#,
        )
        .unwrap();
        let s = SettingsStore::new(path.clone()).load();
        assert_eq!(s.max_history_sessions, 200);
        assert!(s.remember_folder);
        assert_eq!(s.last_folder, None);

        std::fs::write(&path, r#"{"max_history_sessions": -3}"#).unwrap();
        assert_eq!(SettingsStore::new(path.clone()).load().max_history_sessions, 0);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(path).load(), Settings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        let mut s = Settings::default();
        s.set_max_history_sessions(500);
        s.last_folder = Some("/media/clips".into());
        store.save(&s).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.max_history_sessions, 200);
        assert_eq!(loaded.default_folder(), Some("/media/clips"));

        s.remember_folder = false;
        assert_eq!(s.default_folder(), None);
    }
}
