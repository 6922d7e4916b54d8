//! One-call orchestration of the full task lifecycle
//!
//! Submit, monitor, and retrieve run strictly in sequence: each stage's
//! precondition is the previous stage's postcondition, so there is nothing
//! to overlap. Failures are classified at the stage that raised them and
//! propagated unchanged; the pipeline performs no recovery, because a
//! partially submitted or partially downloaded task has no well-defined
//! resume semantics.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RunConfig;
use crate::error::Result;
use crate::node::NodeClient;
use crate::options::TaskOptions;
use crate::progress::ProgressSink;
use crate::types::TaskId;
use crate::utils::fmt_elapsed_time;
use crate::{monitor, retrieve, submit};

/// Everything a single run needs as input
#[derive(Clone, Debug)]
pub struct RunPlan {
    /// Ordered input files to upload; must be non-empty
    pub files: Vec<PathBuf>,
    /// Human-readable task name
    pub task_name: String,
    /// Opaque task settings passed through to the node
    pub options: TaskOptions,
    /// Directory the result bundle is unpacked into
    pub destination: PathBuf,
}

/// One progress sink per pipeline stage
///
/// Each stage's progress stream independently runs 0 to 100.
pub struct StageSinks<'a> {
    /// Receives upload progress during submission
    pub upload: &'a dyn ProgressSink,
    /// Receives processing progress during monitoring
    pub processing: &'a dyn ProgressSink,
    /// Receives download progress during retrieval
    pub download: &'a dyn ProgressSink,
}

/// What a successful run produced
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Node-assigned task identifier
    pub task_id: TaskId,
    /// Number of input images the node accepted
    pub image_count: u32,
    /// Remote processing time in milliseconds, if the node reported one
    pub processing_time_ms: Option<u64>,
    /// Directory the assets were saved into
    pub destination: PathBuf,
}

/// Run the full pipeline: submit the plan's files, wait for the task to
/// complete, and unpack its results into the plan's destination.
///
/// `cancel` interrupts the monitoring wait within one cycle; a best-effort
/// remote cancel is sent before unwinding with [`crate::Error::Canceled`].
pub async fn run_pipeline(
    node: &NodeClient,
    plan: &RunPlan,
    sinks: StageSinks<'_>,
    run: &RunConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let mut task = submit::submit(
        node,
        &plan.files,
        &plan.task_name,
        &plan.options,
        sinks.upload,
    )
    .await?;
    info!(id = %task.id, images = task.image_count, "task accepted by node");

    monitor::await_completion(
        node,
        &mut task,
        sinks.processing,
        run.poll_interval(),
        run.log_tail_lines,
        cancel,
    )
    .await?;
    if let Some(ms) = task.processing_time_ms {
        info!(name = %task.name, elapsed = %fmt_elapsed_time(ms), "processing finished");
    }

    retrieve::retrieve(node, &task, &plan.destination, sinks.download).await?;

    Ok(RunSummary {
        task_id: task.id,
        image_count: task.image_count,
        processing_time_ms: task.processing_time_ms,
        destination: plan.destination.clone(),
    })
}
