//! Configuration types for odm-pilot
//!
//! All knobs are explicit values handed to the pipeline, not ambient
//! globals: the node address and credentials live in [`NodeConfig`], the
//! per-run behavior (poll cadence, diagnostic tail length) in [`RunConfig`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for a remote processing node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hostname or IP address of the processing node (default: "localhost")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the processing node (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Authentication token, appended to every request; empty means the
    /// node does not require authentication
    #[serde(default)]
    pub token: String,

    /// Timeout in seconds applied to every network request (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NodeConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL of the node's HTTP API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Per-run behavior of the orchestration pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seconds between status polls while the task is processing
    /// (default: 30). The cadence is fixed, not adaptive: remote jobs run
    /// for minutes to hours, so backoff buys nothing.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Number of trailing log lines to fetch when a task fails (default: 10)
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

impl RunConfig {
    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_log_tail_lines() -> u32 {
    10
}
