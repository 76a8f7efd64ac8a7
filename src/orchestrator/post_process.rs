//! Post-batch processing utilities.
//!
//! Turns a finished batch into a history session and remembers the folder that
//! was used.

use crate::config::{Settings, SettingsStore};
use crate::model::{BatchReport, DownloadSession};
use crate::storage::HistoryStore;
use rand::RngCore;
use time::OffsetDateTime;

/// Result of post-batch processing, ready for presentation layers.
pub(crate) struct ProcessedBatch {
    pub session: Option<DownloadSession>,
    pub messages: Vec<String>,
}

/// Generate a random session id.
fn gen_session_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

fn unix_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Build the history record for a batch. Batches that finished nothing (e.g.
/// cancelled before the first URL completed) produce no session.
fn build_session(
    report: &BatchReport,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
) -> Option<DownloadSession> {
    if report.outcomes.is_empty() {
        return None;
    }
    Some(DownloadSession {
        id: gen_session_id(),
        started_at: unix_millis(started_at),
        finished_at: unix_millis(finished_at),
        folder: report.download_folder.display().to_string(),
        ffmpeg: report.ffmpeg,
        results: report.outcomes.clone(),
    })
}

/// Record the batch in history (when enabled) and remember its folder.
pub(crate) fn process_batch_completion(
    history: Option<&HistoryStore>,
    settings_store: &SettingsStore,
    settings: &Settings,
    started_at: OffsetDateTime,
    report: &BatchReport,
) -> ProcessedBatch {
    let mut messages = Vec::new();
    let session = build_session(report, started_at, OffsetDateTime::now_utc());

    if let (Some(store), Some(session)) = (history, session.as_ref()) {
        if let Err(e) = store.append(session.clone(), settings.max_history_sessions as usize) {
            tracing::warn!(error = %e, "failed to record history");
            messages.push(format!("History save failed: {e:#}"));
        }
    }

    if settings.remember_folder && !report.outcomes.is_empty() {
        let folder = report.download_folder.display().to_string();
        if settings.last_folder.as_deref() != Some(folder.as_str()) {
            let mut next = settings.clone();
            next.last_folder = Some(folder);
            if let Err(e) = settings_store.save(&next) {
                tracing::warn!(error = %e, "failed to remember download folder");
            }
        }
    }

    ProcessedBatch { session, messages }
}
