//! Download history persistence.
//!
//! History is a single JSON array of sessions, newest first. Entries that do not
//! look like sessions are skipped on read rather than failing the whole file.

use crate::model::{DownloadOutcome, DownloadSession};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

const APP_DIR: &str = "media-batch-dl";
const HISTORY_FILE: &str = "history.json";

pub struct HistoryStore {
    path: PathBuf,
    revision: watch::Sender<u64>,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Self {
        let (revision, _) = watch::channel(0);
        Self { path, revision }
    }

    /// `<local data dir>/media-batch-dl/history.json`.
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_local_dir().context("could not determine data directory")?;
        Ok(Self::new(base.join(APP_DIR).join(HISTORY_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revision counter, bumped after every successful write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Every readable session, newest first.
    pub fn load_all(&self) -> Result<Vec<DownloadSession>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("read {}", self.path.display())),
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text) else {
            tracing::warn!(path = %self.path.display(), "history file is not a JSON array; ignoring");
            return Ok(Vec::new());
        };
        let mut sessions: Vec<DownloadSession> = items.iter().filter_map(coerce_session).collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    pub fn load_recent(&self, limit: usize) -> Result<Vec<DownloadSession>> {
        let mut sessions = self.load_all()?;
        sessions.truncate(limit);
        Ok(sessions)
    }

    pub fn find(&self, id: &str) -> Result<Option<DownloadSession>> {
        Ok(self.load_all()?.into_iter().find(|s| s.id == id))
    }

    /// Prepend `session`, drop older copies of its id, keep at most `max_sessions`.
    pub fn append(&self, session: DownloadSession, max_sessions: usize) -> Result<()> {
        if max_sessions == 0 {
            return Ok(());
        }
        let id = session.id.clone();
        let mut next = vec![session];
        next.extend(self.load_all()?.into_iter().filter(|s| s.id != id));
        next.truncate(max_sessions);
        self.write(&next)
    }

    pub fn clear(&self) -> Result<()> {
        self.write(&[])
    }

    fn write(&self, sessions: &[DownloadSession]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(sessions)?;
        write_atomic(&self.path, &json).with_context(|| format!("write {}", self.path.display()))?;
        self.revision.send_modify(|r| *r += 1);
        Ok(())
    }
}

/// Write through a sibling temp file and rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

fn coerce_session(v: &Value) -> Option<DownloadSession> {
    let obj = v.as_object()?;
    let id = obj.get("id")?.as_str().filter(|s| !s.is_empty())?;
    let started_at = obj.get("started_at")?.as_i64()?;
    let finished_at = obj.get("finished_at")?.as_i64()?;
    let folder = obj.get("folder")?.as_str()?;
    let ffmpeg = obj.get("ffmpeg")?.as_bool()?;
    let results = obj
        .get("results")?
        .as_array()?
        .iter()
        .filter_map(coerce_outcome)
        .collect();
    Some(DownloadSession {
        id: id.to_string(),
        started_at,
        finished_at,
        folder: folder.to_string(),
        ffmpeg,
        results,
    })
}

fn coerce_outcome(v: &Value) -> Option<DownloadOutcome> {
    let obj = v.as_object()?;
    let url = obj.get("url")?.as_str().filter(|s| !s.is_empty())?.to_string();
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
    match obj.get("status")?.as_str()? {
        "success" => Some(DownloadOutcome::Success {
            url,
            title: text("title"),
        }),
        "failed" => Some(DownloadOutcome::Failed {
            url,
            error: text("error").unwrap_or_default(),
        }),
        _ => None,
    }
}
