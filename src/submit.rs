//! Task submission: upload input files and obtain a task handle

use std::path::PathBuf;
use tracing::debug;

use crate::error::{Error, Result};
use crate::node::NodeClient;
use crate::options::TaskOptions;
use crate::progress::ProgressSink;
use crate::types::Task;

/// Upload `files` to the node and create a processing task.
///
/// Callers are responsible for filtering the list to valid input images
/// and resolving relative paths; an empty list is rejected here as a
/// precondition failure before anything touches the network.
///
/// On success the returned [`Task`] carries the node-assigned id, the
/// resolved name, and the image count the node accepted. The sink receives
/// upload progress in [0, 100].
///
/// # Errors
///
/// - [`Error::NoInputFiles`] if `files` is empty
/// - [`Error::Connection`] if the node is unreachable within the timeout
/// - [`Error::Protocol`] if the node rejects the request
pub async fn submit(
    node: &NodeClient,
    files: &[PathBuf],
    name: &str,
    options: &TaskOptions,
    sink: &dyn ProgressSink,
) -> Result<Task> {
    if files.is_empty() {
        return Err(Error::NoInputFiles);
    }

    let id = node.create_task(files, name, options, sink).await?;

    // Task creation only returns the id; a follow-up info fetch fills in
    // the initial status and the accepted image count.
    let info = node.task_info(&id).await?;
    let task = Task::from_info(&info, name);

    debug!(id = %task.id, status = %task.status, images = task.image_count, "task submitted");
    Ok(task)
}
