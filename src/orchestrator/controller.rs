//! Batch lifecycle controller.
//!
//! Owns the running batch task and its cancellation token, and emits events for
//! presentation layers.

use crate::engine::tools::ToolLocator;
use crate::engine::BatchEngine;
use crate::model::{BatchConfig, BatchEvent, BatchReport, InfoEvent};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Commands emitted by UI layers to control the running batch.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Cancel,
}

/// Run one batch to completion, honouring cancel requests from `cmd_rx`.
///
/// The returned report is partial when the batch was cancelled.
pub(crate) async fn run_controller(
    locator: Arc<ToolLocator>,
    cfg: BatchConfig,
    event_tx: UnboundedSender<BatchEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<BatchReport> {
    let cancel = CancellationToken::new();
    let engine = BatchEngine::new(cfg);
    let mut handle = {
        let event_tx = event_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run(&locator, event_tx, cancel).await })
    };

    // Cancel watchdog: if the child takes a while to die, keep the user informed.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));
    let mut commands_open = true;

    let joined = loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(UiCommand::Cancel) => {
                        if !cancel.is_cancelled() {
                            cancel.cancel();
                            let _ = event_tx.send(BatchEvent::Info(InfoEvent::Message(
                                "Cancelling…".into(),
                            )));
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        }
                    }
                    // No more UI input; just wait for the batch.
                    None => commands_open = false,
                }
            }
            joined = &mut handle => break joined,
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline {
                        let _ = event_tx.send(BatchEvent::Info(InfoEvent::Message(
                            "Still cancelling…".into(),
                        )));
                        cancel_deadline = None;
                    }
                }
            }
        }
    };

    Ok(joined.map_err(|e| anyhow::anyhow!("batch task failed: {e}"))??)
}
