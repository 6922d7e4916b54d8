//! Core types for odm-pilot: task identity, status, and the local task record

use serde::{Deserialize, Serialize};

/// Unique identifier for a processing task, assigned by the node at creation
///
/// Opaque to this crate; NodeODM uses a UUID string. Immutable once set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a TaskId from the node-assigned identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Remote task status
///
/// Wire codes match the NodeODM status enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted by the node, waiting for a processing slot
    Queued,
    /// Actively processing
    Running,
    /// Finished successfully, results available for download
    Completed,
    /// Processing failed on the node
    Failed,
    /// Canceled on request
    Canceled,
}

impl TaskStatus {
    /// Convert a NodeODM status code to a TaskStatus
    ///
    /// Unknown codes map to `Failed` so an unrecognized node response is
    /// surfaced rather than polled forever.
    pub fn from_code(code: i32) -> Self {
        match code {
            10 => TaskStatus::Queued,
            20 => TaskStatus::Running,
            30 => TaskStatus::Failed,
            40 => TaskStatus::Completed,
            50 => TaskStatus::Canceled,
            _ => TaskStatus::Failed,
        }
    }

    /// Convert a TaskStatus to its NodeODM status code
    pub fn to_code(&self) -> i32 {
        match self {
            TaskStatus::Queued => 10,
            TaskStatus::Running => 20,
            TaskStatus::Failed => 30,
            TaskStatus::Completed => 40,
            TaskStatus::Canceled => 50,
        }
    }

    /// Whether this status is terminal (no further transitions happen)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        };
        write!(f, "{}", name)
    }
}

/// Status block inside a task info response
#[derive(Clone, Debug, Deserialize)]
pub struct StatusBlock {
    /// NodeODM status code (see [`TaskStatus::from_code`])
    pub code: i32,
    /// Error message accompanying a failed status, if any
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

/// Task information payload returned by `GET /task/<id>/info`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Node-assigned task identifier
    pub uuid: String,
    /// Task name, if the node stores one
    #[serde(default)]
    pub name: Option<String>,
    /// Current status
    pub status: StatusBlock,
    /// Processing progress in [0, 100]
    #[serde(default)]
    pub progress: f32,
    /// Number of input images the node accepted
    #[serde(default)]
    pub images_count: u32,
    /// Processing time in milliseconds (-1 while unknown)
    #[serde(default = "default_processing_time")]
    pub processing_time: i64,
}

fn default_processing_time() -> i64 {
    -1
}

/// Local cache of a remote task's state
///
/// Created exactly once per run by the submitter. The monitor refreshes it
/// in place from successive info polls; there is a single writer and the
/// record is never read concurrently, so no locking is involved.
#[derive(Clone, Debug)]
pub struct Task {
    /// Node-assigned identifier; never changes after creation
    pub id: TaskId,
    /// Human-readable label (defaults to the input folder's base name)
    pub name: String,
    /// Number of input files the node accepted
    pub image_count: u32,
    /// Last observed status
    pub status: TaskStatus,
    /// Last observed progress for the processing stage, in [0, 100]
    pub progress: f32,
    /// Total processing time in milliseconds, once terminal
    pub processing_time_ms: Option<u64>,
}

impl Task {
    /// Build the initial local record from a freshly created task's info
    pub fn from_info(info: &TaskInfo, fallback_name: &str) -> Self {
        let mut task = Self {
            id: TaskId::new(info.uuid.clone()),
            name: info
                .name
                .clone()
                .unwrap_or_else(|| fallback_name.to_string()),
            image_count: info.images_count,
            status: TaskStatus::from_code(info.status.code),
            progress: 0.0,
            processing_time_ms: None,
        };
        task.absorb(info);
        task
    }

    /// Fold a fresh info poll into the local record.
    ///
    /// Status transitions are monotonic toward a terminal state: once a
    /// terminal status has been observed, later polls cannot move the record
    /// out of it. Progress never decreases within the processing stage; on
    /// completion it is pinned at 100, on failure it stays frozen at the
    /// last observed value.
    pub fn absorb(&mut self, info: &TaskInfo) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::from_code(info.status.code);
        }
        match self.status {
            TaskStatus::Completed => self.progress = 100.0,
            TaskStatus::Failed | TaskStatus::Canceled => {}
            TaskStatus::Queued | TaskStatus::Running => {
                let observed = info.progress.clamp(0.0, 100.0);
                if observed > self.progress {
                    self.progress = observed;
                }
            }
        }
        if self.status.is_terminal() && info.processing_time >= 0 {
            self.processing_time_ms = Some(info.processing_time as u64);
        }
        if info.images_count > 0 {
            self.image_count = info.images_count;
        }
    }
}
