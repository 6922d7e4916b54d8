//! Result retrieval: download and unpack the completed task's asset bundle
//!
//! The bundle is streamed to a temporary archive inside the destination
//! directory (same filesystem, so no cross-device surprises), then
//! unpacked and removed. On failure the partial output is left in place;
//! there is no rollback and no resume — a retry redownloads the full
//! bundle and overwrites whatever the archive contains.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::node::NodeClient;
use crate::progress::ProgressSink;
use crate::types::{Task, TaskStatus};

/// Download and unpack the result bundle for `task` into `destination`.
///
/// Requires `task.status == Completed`. The sink receives download
/// progress in [0, 100]. Re-running over an existing destination only
/// overwrites the files the bundle itself contains.
///
/// # Errors
///
/// - [`Error::InvalidState`] if the task has not completed
/// - [`Error::Connection`] on network interruption mid-download
/// - [`Error::Storage`] if the destination cannot be written
/// - [`Error::Protocol`] if the node serves an unreadable bundle
pub async fn retrieve(
    node: &NodeClient,
    task: &Task,
    destination: &Path,
    sink: &dyn ProgressSink,
) -> Result<()> {
    if task.status != TaskStatus::Completed {
        return Err(Error::InvalidState(format!(
            "cannot retrieve results for task {} in status {}",
            task.id, task.status
        )));
    }

    tokio::fs::create_dir_all(destination).await.map_err(|e| {
        Error::Storage(format!(
            "cannot create destination '{}': {}",
            destination.display(),
            e
        ))
    })?;

    let archive_path = destination.join(format!("{}-assets.zip.part", task.id));
    node.download_assets(&task.id, &archive_path, sink).await?;

    let archive = archive_path.clone();
    let dest = destination.to_path_buf();
    tokio::task::spawn_blocking(move || unpack_bundle(&archive, &dest))
        .await
        .map_err(|e| Error::Storage(format!("extraction task panicked: {}", e)))??;

    if let Err(e) = tokio::fs::remove_file(&archive_path).await {
        warn!(path = %archive_path.display(), error = %e, "could not remove temporary archive");
    }

    info!(id = %task.id, dest = %destination.display(), "assets saved");
    Ok(())
}

/// Unpack a downloaded asset bundle into `dest`.
///
/// Entries with unsafe paths (absolute or escaping the destination) are
/// skipped rather than extracted.
fn unpack_bundle(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        Error::Storage(format!(
            "cannot open downloaded bundle '{}': {}",
            archive_path.display(),
            e
        ))
    })?;

    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::Protocol(format!("node served an unreadable result bundle: {}", e)))?;

    let mut extracted = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Protocol(format!("unreadable bundle entry: {}", e)))?;

        let Some(relative) = entry.enclosed_name().map(PathBuf::from) else {
            warn!(entry = entry.name(), "skipping bundle entry with unsafe path");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| {
                Error::Storage(format!(
                    "cannot create directory '{}': {}",
                    out_path.display(),
                    e
                ))
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!(
                    "cannot create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut out_file = std::fs::File::create(&out_path).map_err(|e| {
            Error::Storage(format!("cannot create file '{}': {}", out_path.display(), e))
        })?;
        std::io::copy(&mut entry, &mut out_file).map_err(|e| {
            Error::Storage(format!("cannot write file '{}': {}", out_path.display(), e))
        })?;
        extracted += 1;
    }

    debug!(files = extracted, dest = %dest.display(), "bundle unpacked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopSink;
    use crate::types::TaskId;

    fn completed_task() -> Task {
        Task {
            id: TaskId::new("abc"),
            name: "survey".into(),
            image_count: 12,
            status: TaskStatus::Completed,
            progress: 100.0,
            processing_time_ms: Some(1000),
        }
    }

    #[tokio::test]
    async fn non_completed_task_is_rejected() {
        let base = url::Url::parse("http://127.0.0.1:1/").unwrap();
        let node =
            NodeClient::with_base_url(base, "", std::time::Duration::from_secs(1)).unwrap();
        let task = Task {
            status: TaskStatus::Running,
            ..completed_task()
        };

        let dir = tempfile::tempdir().unwrap();
        let err = retrieve(&node, &task, dir.path(), &NoopSink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn unpack_skips_unsafe_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.zip");

        // Build an archive with one normal entry and one path-traversal entry
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let opts = zip::write::FileOptions::default();
            writer.start_file("odm_orthophoto/odm_orthophoto.tif", opts).unwrap();
            std::io::Write::write_all(&mut writer, b"tif bytes").unwrap();
            writer.start_file("../escape.txt", opts).unwrap();
            std::io::Write::write_all(&mut writer, b"nope").unwrap();
            writer.finish().unwrap();
        }

        let dest = dir.path().join("out");
        unpack_bundle(&archive_path, &dest).unwrap();

        assert!(dest.join("odm_orthophoto/odm_orthophoto.tif").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }
}
