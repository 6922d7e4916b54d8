//! Task monitoring: poll the node until the task reaches a terminal state
//!
//! The poll loop is owned here, not hidden inside a collaborator call, so
//! cancellation can interrupt the inter-poll wait deterministically. The
//! cadence is a fixed interval; the remote job runs for minutes to hours,
//! so adaptive backoff would only delay the first report of a finished
//! task.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::node::NodeClient;
use crate::progress::{MonotonicProgress, ProgressSink};
use crate::types::{Task, TaskStatus};

/// Poll the node until `task` reaches a terminal state.
///
/// The task record is refreshed in place on every poll; non-terminal polls
/// drive the sink with the current processing progress. The wait between
/// polls is a select over the sleep and `cancel`, so a cancellation request
/// is serviced within one cycle instead of after a full interval.
///
/// # Errors
///
/// - [`Error::Connection`] if a poll cannot reach the node; surfaced
///   immediately rather than retried, since the outer retry is the next
///   scheduled poll anyway
/// - [`Error::TaskFailed`] if the node reports a failed status, carrying
///   the last `log_tail` lines of the processing log
/// - [`Error::Canceled`] on local cancellation (after a best-effort remote
///   cancel) or when the node reports the task canceled
pub async fn await_completion(
    node: &NodeClient,
    task: &mut Task,
    sink: &dyn ProgressSink,
    interval: Duration,
    log_tail: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let progress = MonotonicProgress::new(sink);

    loop {
        if cancel.is_cancelled() {
            return cancel_and_unwind(node, task).await;
        }

        let info = node.task_info(&task.id).await?;
        let remote_error = info.status.error_message.clone();
        task.absorb(&info);

        match task.status {
            TaskStatus::Completed => {
                progress.finish();
                info!(id = %task.id, "task completed");
                return Ok(());
            }
            TaskStatus::Failed => {
                // Best-effort: the failure itself matters more than the tail
                let tail = node
                    .task_output(&task.id, log_tail)
                    .await
                    .unwrap_or_default();
                return Err(Error::TaskFailed {
                    id: task.id.clone(),
                    message: remote_error
                        .unwrap_or_else(|| "processing failed on node".to_string()),
                    log_tail: tail,
                });
            }
            TaskStatus::Canceled => {
                info!(id = %task.id, "task was canceled on the node");
                return Err(Error::Canceled);
            }
            TaskStatus::Queued | TaskStatus::Running => {
                debug!(id = %task.id, status = %task.status, progress = task.progress, "poll");
                progress.set(task.progress);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return cancel_and_unwind(node, task).await,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Send a best-effort cancel to the node and unwind locally.
///
/// The local unwind never blocks on remote confirmation: the request is
/// bounded by the client timeout and its outcome only affects logging.
/// The node owns true task state after we exit.
async fn cancel_and_unwind(node: &NodeClient, task: &Task) -> Result<()> {
    info!(id = %task.id, "cancellation requested, notifying node");
    if let Err(e) = node.cancel_task(&task.id).await {
        warn!(id = %task.id, error = %e, "remote cancel request failed");
    }
    Err(Error::Canceled)
}
