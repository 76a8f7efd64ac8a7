//! Batch-fatal error types.
//!
//! Anything in here stops a batch before (or instead of) attempting URLs. Per-URL
//! failures never become errors; they are recorded as failed outcomes.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    /// Empty or oversized URL list.
    #[error("{0}")]
    Validation(String),

    /// The fetch tool could not be resolved; carries the user-facing explanation.
    #[error("{0}")]
    ToolNotFound(String),

    /// The destination folder could not be created.
    #[error("Unable to create download folder: {} ({source})", path.display())]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Running in a hosted environment without explicit permission.
    #[error("Downloads are disabled on hosted deployments. Run the tool locally so yt-dlp can save to your machine, or set ALLOW_HOSTED_DOWNLOADS=1 (not recommended).")]
    HostedDisabled,
}
