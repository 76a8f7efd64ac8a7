//! Text summary builder for CLI output.
//!
//! This module formats human-readable lines for batch reports and history.

use crate::model::{BatchReport, DownloadOutcome, DownloadSession};
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn outcome_line(outcome: &DownloadOutcome) -> String {
    match outcome {
        DownloadOutcome::Success { url, title } => match title {
            Some(t) => format!("  ok      {t} ({url})"),
            None => format!("  ok      {url}"),
        },
        DownloadOutcome::Failed { url, error } => {
            // Errors may span lines; keep the summary one line per URL.
            let first = error.lines().next().unwrap_or("");
            format!("  failed  {url}: {first}")
        }
    }
}

fn counts(outcomes: &[DownloadOutcome]) -> (usize, usize) {
    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    (ok, outcomes.len() - ok)
}

/// Final lines printed after a batch.
pub(crate) fn build_batch_summary(report: &BatchReport) -> TextSummary {
    let mut lines = Vec::new();
    let (ok, failed) = counts(&report.outcomes);

    if report.cancelled {
        lines.push(format!(
            "Batch cancelled: {ok} downloaded, {failed} failed."
        ));
    } else if failed == 0 {
        lines.push(format!("All downloads complete ({ok})."));
    } else {
        lines.push(format!("Finished: {ok} downloaded, {failed} failed."));
    }
    for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
        lines.push(outcome_line(outcome));
    }
    lines.push(format!("Saved to: {}", report.download_folder.display()));

    TextSummary { lines }
}

/// Unix millis as `YYYY-MM-DD HH:MM:SS +HH:MM` in `offset`.
pub(crate) fn format_timestamp(ms: i64, offset: UtcOffset) -> String {
    let Ok(utc) = OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000) else {
        return ms.to_string();
    };
    let local = utc.to_offset(offset);
    let (h, m, _) = offset.as_hms();
    let sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} {}{:02}:{:02}",
        local.year(),
        local.month() as u8,
        local.day(),
        local.hour(),
        local.minute(),
        local.second(),
        sign,
        h.unsigned_abs(),
        m.unsigned_abs()
    )
}

fn elapsed(session: &DownloadSession) -> String {
    let secs = (session.finished_at - session.started_at).max(0) / 1000;
    humantime::format_duration(Duration::from_secs(secs as u64)).to_string()
}

fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// One line per session, newest first.
pub(crate) fn build_history_list(sessions: &[DownloadSession]) -> TextSummary {
    if sessions.is_empty() {
        return TextSummary {
            lines: vec!["No download history.".to_string()],
        };
    }
    let offset = local_offset();
    let lines = sessions
        .iter()
        .map(|s| {
            let sum = s.summary();
            format!(
                "{}  {}  {}/{} ok  {}  {}",
                s.id,
                format_timestamp(s.started_at, offset),
                sum.success,
                sum.total,
                elapsed(s),
                s.folder
            )
        })
        .collect();
    TextSummary { lines }
}

pub(crate) fn build_session_detail(session: &DownloadSession) -> TextSummary {
    let offset = local_offset();
    let sum = session.summary();
    let mut lines = vec![
        format!("Session:  {}", session.id),
        format!("Started:  {}", format_timestamp(session.started_at, offset)),
        format!("Finished: {}", format_timestamp(session.finished_at, offset)),
        format!("Elapsed:  {}", elapsed(session)),
        format!("Folder:   {}", session.folder),
        format!("ffmpeg:   {}", if session.ffmpeg { "yes" } else { "no" }),
        format!(
            "Results:  {} total, {} ok, {} failed",
            sum.total, sum.success, sum.failed
        ),
    ];
    lines.extend(session.results.iter().map(outcome_line));
    TextSummary { lines }
}
