//! # odm-pilot
//!
//! Client library (and CLI) for driving a photogrammetry task through a
//! remote NodeODM processing node: upload a batch of photos, poll the
//! resulting task to completion, and unpack the produced assets locally.
//!
//! ## Design Philosophy
//!
//! - **Single pass/fail pipeline** - submit, monitor, retrieve run strictly
//!   in sequence with no recovery layer; a failed run is reported, not
//!   resumed
//! - **Classified failures** - every error maps to one of five failure
//!   domains (connection, protocol, task execution, cancellation, storage)
//! - **Presentation-free core** - progress is emitted through injected
//!   sinks; rendering belongs to the caller
//! - **Cooperative cancellation** - an interrupt during monitoring sends a
//!   best-effort remote cancel and unwinds within one poll cycle
//!
//! ## Quick Start
//!
//! ```no_run
//! use odm_pilot::{
//!     run_pipeline, NodeClient, NodeConfig, NoopSink, RunConfig, RunPlan, StageSinks,
//!     TaskOptions,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = NodeClient::new(&NodeConfig::default())?;
//!     let plan = RunPlan {
//!         files: odm_pilot::list_images("photos".as_ref())?,
//!         task_name: "survey".to_string(),
//!         options: TaskOptions::default(),
//!         destination: "/data/results".into(),
//!     };
//!     let sinks = StageSinks {
//!         upload: &NoopSink,
//!         processing: &NoopSink,
//!         download: &NoopSink,
//!     };
//!
//!     let summary = run_pipeline(
//!         &node,
//!         &plan,
//!         sinks,
//!         &RunConfig::default(),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!     println!("assets saved in {}", summary.destination.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types and failure classification
pub mod error;
/// Task monitoring (poll loop and cancellation)
pub mod monitor;
/// HTTP client for the processing node
pub mod node;
/// Opaque task options
pub mod options;
/// Progress sink abstraction
pub mod progress;
/// Result retrieval and unpacking
pub mod retrieve;
/// One-call pipeline orchestration
pub mod runner;
/// Task submission
pub mod submit;
/// Core types
pub mod types;
/// Input enumeration and small helpers
pub mod utils;

// Re-export commonly used types
pub use config::{NodeConfig, RunConfig};
pub use error::{Error, FailureKind, Result};
pub use node::NodeClient;
pub use options::TaskOptions;
pub use progress::{NoopSink, ProgressSink, RecordingSink};
pub use runner::{RunPlan, RunSummary, StageSinks, run_pipeline};
pub use types::{Task, TaskId, TaskInfo, TaskStatus};
pub use utils::{fmt_elapsed_time, list_images, validate_output_dir};

use tokio_util::sync::CancellationToken;

/// Spawn a background listener that cancels the returned token on the
/// first termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with a `ctrl_c` fallback if
///   signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Must be called from within a tokio runtime.
pub fn cancel_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let signaled = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signaled.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        _ => {
            tracing::warn!("Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
