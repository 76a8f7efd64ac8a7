pub mod process;
pub mod tools;
pub mod ytdlp;

use crate::error::BatchError;
use crate::model::{BatchConfig, BatchEvent, BatchProgress, BatchReport, DownloadOutcome, InfoEvent};
use process::RunRequest;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tools::{ToolKind, ToolLocator};

/// Hard ceiling on URLs per batch.
pub const MAX_URLS: usize = 200;
/// Per-invocation limit; a batch of N URLs can take up to N times this.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15 * 60);

const GENERIC_FAILURE: &str = "Download failed";

pub struct BatchEngine {
    cfg: BatchConfig,
}

impl BatchEngine {
    pub fn new(cfg: BatchConfig) -> Self {
        Self { cfg }
    }

    /// Download every URL in order, one yt-dlp process at a time.
    ///
    /// Batch-fatal problems (bad input, missing folder, missing yt-dlp) come back
    /// as `Err` before anything is spawned. Per-URL failures become failed
    /// outcomes. Cancelling `cancel` kills the in-flight process, drops that
    /// URL, and returns what finished before it.
    pub async fn run(
        self,
        locator: &ToolLocator,
        event_tx: mpsc::UnboundedSender<BatchEvent>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        let BatchConfig {
            urls,
            folder,
            per_url_timeout,
        } = self.cfg;

        validate_urls(&urls)?;

        let download_dir = crate::paths::normalize_download_dir(folder.as_deref()).await;
        tokio::fs::create_dir_all(&download_dir)
            .await
            .map_err(|source| BatchError::Folder {
                path: download_dir.clone(),
                source,
            })?;

        let fetch_tool = locator
            .locate(ToolKind::Fetch)
            .await
            .map_err(BatchError::ToolNotFound)?;
        let ffmpeg = locator.has_ffmpeg().await;
        let ffmpeg_location = locator.ffmpeg_override().filter(|_| ffmpeg);

        let total = urls.len();
        tracing::info!(total, folder = %download_dir.display(), ffmpeg, "starting batch");
        let _ = event_tx.send(BatchEvent::Started {
            total,
            folder: download_dir.clone(),
            ffmpeg,
        });
        if !ffmpeg {
            let _ = event_tx.send(BatchEvent::Info(InfoEvent::FfmpegMissing));
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;

        for (i, url) in urls.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let _ = event_tx.send(BatchEvent::Progress(BatchProgress {
                completed: i,
                total,
            }));
            let _ = event_tx.send(BatchEvent::UrlStarted {
                index: i,
                total,
                url: url.clone(),
            });

            let args = ytdlp::build_download_args(url, &download_dir, ffmpeg, ffmpeg_location);
            let res = process::run(
                RunRequest::new(&fetch_tool, args)
                    .cancel_on(&cancel)
                    .timeout(per_url_timeout),
            )
            .await;

            // The in-flight URL was killed on our behalf; it is not an outcome. A
            // child that finished before the kill keeps its outcome, and the next
            // iteration stops the loop.
            if res.cancelled {
                cancelled = true;
                break;
            }

            let outcome = outcome_for(url, &res);
            if let DownloadOutcome::Failed { error, .. } = &outcome {
                tracing::warn!(%url, code = res.code, %error, "download failed");
            }
            let _ = event_tx.send(BatchEvent::UrlFinished {
                outcome: outcome.clone(),
            });
            outcomes.push(outcome);

            let _ = event_tx.send(BatchEvent::Progress(BatchProgress {
                completed: i + 1,
                total,
            }));
        }

        if cancelled {
            let _ = event_tx.send(BatchEvent::Info(InfoEvent::Cancelled {
                completed: outcomes.len(),
                total,
            }));
        }
        tracing::info!(
            completed = outcomes.len(),
            total,
            cancelled,
            "batch finished"
        );

        Ok(BatchReport {
            outcomes,
            download_folder: download_dir,
            ffmpeg,
            cancelled,
        })
    }
}

fn validate_urls(urls: &[String]) -> Result<(), BatchError> {
    if urls.is_empty() {
        return Err(BatchError::Validation("No URLs provided".into()));
    }
    if urls.len() > MAX_URLS {
        return Err(BatchError::Validation(format!(
            "Too many URLs (max {MAX_URLS})."
        )));
    }
    Ok(())
}

fn outcome_for(url: &str, res: &process::RunResult) -> DownloadOutcome {
    if res.success() {
        DownloadOutcome::Success {
            url: url.to_string(),
            title: ytdlp::parse_title(&res.stdout),
        }
    } else {
        let error = ytdlp::clean_error(&res.stderr);
        DownloadOutcome::Failed {
            url: url.to_string(),
            error: if error.is_empty() {
                GENERIC_FAILURE.to_string()
            } else {
                error
            },
        }
    }
}
