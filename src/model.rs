use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything one batch run needs, built once by the CLI layer.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub urls: Vec<String>,
    pub folder: Option<String>,
    pub per_url_timeout: Duration,
}

/// Outcome of a single URL. Serialized with a `status` tag so it matches the
/// `{url, status: "success", title?} | {url, status: "failed", error}` wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DownloadOutcome {
    Success {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Failed {
        url: String,
        error: String,
    },
}

impl DownloadOutcome {
    pub fn url(&self) -> &str {
        match self {
            DownloadOutcome::Success { url, .. } | DownloadOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        total: usize,
        folder: PathBuf,
        ffmpeg: bool,
    },
    Progress(BatchProgress),
    UrlStarted {
        index: usize,
        total: usize,
        url: String,
    },
    UrlFinished {
        outcome: DownloadOutcome,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the engine and consumed by CLI layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    // Messages generated outside the engine.
    Message(String),
    FfmpegMissing,
    Cancelled { completed: usize, total: usize },
}

impl InfoEvent {
    /// Render a human-readable message for CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::FfmpegMissing => "ffmpeg not found. Downloading single-file formats when possible. Install ffmpeg for best quality.".to_string(),
            InfoEvent::Cancelled { completed, total } => {
                format!("Cancelled after {completed}/{total} download(s).")
            }
        }
    }
}

/// What a batch hands back to its caller.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<DownloadOutcome>,
    pub download_folder: PathBuf,
    pub ffmpeg: bool,
    pub cancelled: bool,
}

/// Response body shared by the JSON output mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchResponse {
    Success {
        results: Vec<DownloadOutcome>,
        download_folder: String,
        ffmpeg: bool,
    },
    Error {
        message: String,
    },
}

impl From<&BatchReport> for BatchResponse {
    fn from(report: &BatchReport) -> Self {
        BatchResponse::Success {
            results: report.outcomes.clone(),
            download_folder: report.download_folder.display().to_string(),
            ffmpeg: report.ffmpeg,
        }
    }
}

/// Persisted record of one finished (or cancelled) batch. Timestamps are unix millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSession {
    pub id: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub folder: String,
    pub ffmpeg: bool,
    pub results: Vec<DownloadOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl DownloadSession {
    pub fn summary(&self) -> SessionSummary {
        let total = self.results.len();
        let success = self.results.iter().filter(|r| r.is_success()).count();
        SessionSummary {
            total,
            success,
            failed: total - success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_status_tag() {
        let ok = DownloadOutcome::Success {
            url: "https://a".into(),
            title: None,
        };
        let failed = DownloadOutcome::Failed {
            url: "https://b".into(),
            error: "boom".into(),
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"status": "success", "url": "https://a"})
        );
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"status": "failed", "url": "https://b", "error": "boom"})
        );
    }

    #[test]
    fn response_matches_wire_shape() {
        let report = BatchReport {
            outcomes: vec![DownloadOutcome::Success {
                url: "https://a".into(),
                title: Some("A".into()),
            }],
            download_folder: PathBuf::from("/tmp/dl"),
            ffmpeg: true,
            cancelled: false,
        };
        let v = serde_json::to_value(BatchResponse::from(&report)).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["download_folder"], "/tmp/dl");
        assert_eq!(v["ffmpeg"], true);
        assert_eq!(v["results"][0]["title"], "A");

        let err = BatchResponse::Error {
            message: "No URLs provided".into(),
        };
        assert_eq!(
            serde_json::to_value(err).unwrap(),
            serde_json::json!({"status": "error", "message": "No URLs provided"})
        );
    }

    #[test]
    fn summary_counts_failures() {
        let session = DownloadSession {
            id: "1".into(),
            started_at: 1,
            finished_at: 2,
            folder: "/x".into(),
            ffmpeg: false,
            results: vec![
                DownloadOutcome::Success {
                    url: "a".into(),
                    title: None,
                },
                DownloadOutcome::Failed {
                    url: "b".into(),
                    error: "e".into(),
                },
                DownloadOutcome::Failed {
                    url: "c".into(),
                    error: "e".into(),
                },
            ],
        };
        assert_eq!(
            session.summary(),
            SessionSummary {
                total: 3,
                success: 1,
                failed: 2
            }
        );
    }
}
