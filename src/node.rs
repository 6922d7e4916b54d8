//! Thin HTTP client for a NodeODM processing node
//!
//! This is the transport boundary of the pipeline. Each method maps one
//! node API operation and classifies its failures at the edge: transport
//! problems become [`Error::Connection`], response-level rejections become
//! [`Error::Protocol`], and local write failures during the asset download
//! become [`Error::Storage`]. Nothing above this module sees a raw
//! `reqwest::Error`.

use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::options::TaskOptions;
use crate::progress::{MonotonicProgress, ProgressSink};
use crate::types::{TaskId, TaskInfo};

/// Handle to a remote processing node
///
/// Cheap to construct; holds a connection pool internally via reqwest.
/// The configured timeout applies to every request, including the asset
/// download, so no call can hang past it.
#[derive(Clone, Debug)]
pub struct NodeClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

/// Response to `POST /task/new`
#[derive(Debug, Deserialize)]
struct TaskCreated {
    uuid: String,
}

/// Error body some node endpoints return, sometimes with a 200 status
#[derive(Debug, Deserialize)]
struct NodeError {
    #[serde(default)]
    error: Option<String>,
}

impl NodeClient {
    /// Create a client for the node described by `config`
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url())
            .map_err(|e| Error::Protocol(format!("invalid node address: {}", e)))?;
        Self::with_base_url(base, &config.token, config.timeout())
    }

    /// Create a client from an explicit base URL, token, and timeout.
    ///
    /// Useful when the node sits behind a proxy, and for pointing tests at
    /// a mock server.
    pub fn with_base_url(base: Url, token: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Connection(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base,
            token: token.to_string(),
        })
    }

    /// Build a request URL for `path`, appending the auth token if set
    fn url(&self, path: &str) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| Error::Protocol(format!("invalid request path '{}': {}", path, e)))?;
        if !self.token.is_empty() {
            url.query_pairs_mut().append_pair("token", &self.token);
        }
        Ok(url)
    }

    /// Decode a node response, surfacing `{"error": ...}` bodies.
    ///
    /// NodeODM reports request-level rejections as an error object, and not
    /// always with a failing HTTP status, so the body is checked first.
    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(Error::from_transport)?;

        if let Ok(NodeError { error: Some(message) }) = serde_json::from_slice::<NodeError>(&bytes)
        {
            return Err(Error::Protocol(message));
        }
        if !status.is_success() {
            return Err(Error::Protocol(format!("node returned HTTP {}", status)));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Protocol(format!("malformed node response: {}", e)))
    }

    /// Upload a set of input files and create a task on the node.
    ///
    /// All files go out as one atomic task-creation request. Files are
    /// streamed off disk, never buffered whole in memory, so batch size is
    /// bounded only by the node. The sink is driven with the cumulative
    /// share of input bytes sent over the wire, reaching 100 once the node
    /// has acknowledged the task. No task exists on the node if this
    /// returns an error before the request is sent.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if an input file cannot be opened
    /// - [`Error::Connection`] if the node is unreachable or times out
    /// - [`Error::Protocol`] if the node rejects the request
    pub async fn create_task(
        &self,
        files: &[PathBuf],
        name: &str,
        options: &TaskOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TaskId> {
        let progress = MonotonicProgress::new(sink);

        let mut sized = Vec::with_capacity(files.len());
        let mut total_bytes = 0u64;
        for path in files {
            let meta = tokio::fs::metadata(path).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot stat input file '{}': {}", path.display(), e),
                ))
            })?;
            total_bytes += meta.len();
            sized.push((path, meta.len()));
        }

        debug!(files = files.len(), total_bytes, name, "streaming task upload");

        let mut form = reqwest::multipart::Form::new()
            .text("name", name.to_string())
            .text("options", options.to_wire()?);

        // Shared byte counter, bumped as each file chunk leaves for the wire
        let sent = Arc::new(AtomicU64::new(0));
        for (path, len) in sized {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot open input file '{}': {}", path.display(), e),
                ))
            })?;

            let counter = Arc::clone(&sent);
            let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            });

            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            form = form.part(
                "images",
                reqwest::multipart::Part::stream_with_length(
                    reqwest::Body::wrap_stream(stream),
                    len,
                )
                .file_name(filename),
            );
        }

        let request = self
            .http
            .post(self.url("task/new")?)
            .multipart(form)
            .send();
        tokio::pin!(request);

        // Sample the counter while the body streams out
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        let response = loop {
            tokio::select! {
                result = &mut request => break result.map_err(Error::from_transport)?,
                _ = ticker.tick() => {
                    if total_bytes > 0 {
                        let share = sent.load(Ordering::Relaxed) as f64 / total_bytes as f64;
                        progress.set((share * 100.0) as f32);
                    }
                }
            }
        };

        let created: TaskCreated = Self::decode(response).await?;
        progress.finish();

        info!(uuid = %created.uuid, images = files.len(), "task created on node");
        Ok(TaskId::new(created.uuid))
    }

    /// Fetch current task information from the node
    pub async fn task_info(&self, id: &TaskId) -> Result<TaskInfo> {
        let response = self
            .http
            .get(self.url(&format!("task/{}/info", id))?)
            .send()
            .await
            .map_err(Error::from_transport)?;
        Self::decode(response).await
    }

    /// Fetch the last `tail` lines of a task's processing log.
    ///
    /// The node's `line` parameter follows slice semantics, so a negative
    /// offset selects a tail.
    pub async fn task_output(&self, id: &TaskId, tail: u32) -> Result<Vec<String>> {
        let mut url = self.url(&format!("task/{}/output", id))?;
        url.query_pairs_mut()
            .append_pair("line", &format!("-{}", tail));
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Error::from_transport)?;
        Self::decode(response).await
    }

    /// Request cancellation of a task on the node.
    ///
    /// The node keeps ownership of the task either way; callers treat this
    /// as best-effort.
    pub async fn cancel_task(&self, id: &TaskId) -> Result<()> {
        let response = self
            .http
            .post(self.url("task/cancel")?)
            .json(&serde_json::json!({ "uuid": id }))
            .send()
            .await
            .map_err(Error::from_transport)?;

        #[derive(Deserialize)]
        struct Acknowledged {
            #[serde(default)]
            success: bool,
        }
        let ack: Acknowledged = Self::decode(response).await?;
        if !ack.success {
            return Err(Error::Protocol(format!(
                "node did not acknowledge cancellation of task {}",
                id
            )));
        }
        debug!(%id, "cancellation acknowledged by node");
        Ok(())
    }

    /// Stream the complete result bundle for a task to `dest`.
    ///
    /// Progress is derived from the response content length when the node
    /// provides one, finishing at 100 once the stream is drained and
    /// flushed.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the stream is interrupted mid-download
    /// - [`Error::Protocol`] if the node refuses to serve the bundle
    /// - [`Error::Storage`] if `dest` cannot be written
    pub async fn download_assets(
        &self,
        id: &TaskId,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        let response = self
            .http
            .get(self.url(&format!("task/{}/download/all.zip", id))?)
            .send()
            .await
            .map_err(Error::from_transport)?;

        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "node returned HTTP {} for task {} assets",
                response.status(),
                id
            )));
        }

        let total = response.content_length();
        let progress = MonotonicProgress::new(sink);

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            Error::Storage(format!("cannot create '{}': {}", dest.display(), e))
        })?;

        let mut received = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            // The status was already accepted, so a body error here means the
            // connection dropped mid-transfer, not a node-side rejection
            let chunk = chunk
                .map_err(|e| Error::Connection(format!("download interrupted: {}", e)))?;
            file.write_all(&chunk).await.map_err(|e| {
                Error::Storage(format!("cannot write '{}': {}", dest.display(), e))
            })?;
            received += chunk.len() as u64;
            if let Some(total) = total
                && total > 0
            {
                progress.set((received as f64 / total as f64 * 100.0) as f32);
            }
        }

        file.flush().await.map_err(|e| {
            Error::Storage(format!("cannot flush '{}': {}", dest.display(), e))
        })?;
        progress.finish();

        debug!(%id, bytes = received, dest = %dest.display(), "asset bundle downloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::progress::{NoopSink, RecordingSink};
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> NodeClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        NodeClient::with_base_url(base, "", Duration::from_secs(5)).unwrap()
    }

    fn assert_non_decreasing(samples: &[f32]) {
        for window in samples.windows(2) {
            assert!(
                window[1] >= window[0],
                "progress regressed: {:?}",
                samples
            );
        }
    }

    async fn write_images(dir: &Path, count: usize) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for i in 0..count {
            let path = dir.join(format!("img_{:03}.jpg", i));
            tokio::fs::write(&path, vec![0xffu8; 64]).await.unwrap();
            files.push(path);
        }
        files
    }

    #[tokio::test]
    async fn create_task_returns_node_assigned_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"uuid": "7d3a-0b"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let files = write_images(dir.path(), 3).await;
        let sink = RecordingSink::new();

        let id = client(&server)
            .create_task(&files, "survey", &TaskOptions::default(), &sink)
            .await
            .unwrap();

        assert_eq!(id.as_str(), "7d3a-0b");
        let samples = sink.samples();
        assert_non_decreasing(&samples);
        assert_eq!(samples.last().copied(), Some(100.0));
    }

    #[tokio::test]
    async fn create_task_error_body_is_protocol_failure() {
        let server = MockServer::start().await;
        // NodeODM rejects bad requests with an error body and a 200 status
        Mock::given(method("POST"))
            .and(path("/task/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": "unknown option: dtm-mode"})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let files = write_images(dir.path(), 1).await;

        let err = client(&server)
            .create_task(&files, "survey", &TaskOptions::default(), &NoopSink)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol);
        assert!(err.to_string().contains("unknown option"));
    }

    #[tokio::test]
    async fn unreachable_node_is_connection_failure() {
        // Nothing listens on port 1
        let base = Url::parse("http://127.0.0.1:1/").unwrap();
        let node = NodeClient::with_base_url(base, "", Duration::from_secs(2)).unwrap();
        let err = node.task_info(&TaskId::new("x")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Connection);
    }

    #[tokio::test]
    async fn task_info_parses_node_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/abc/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uuid": "abc",
                "name": "survey",
                "status": {"code": 20},
                "progress": 37.5,
                "imagesCount": 12,
                "processingTime": -1
            })))
            .mount(&server)
            .await;

        let info = client(&server).task_info(&TaskId::new("abc")).await.unwrap();
        assert_eq!(info.uuid, "abc");
        assert_eq!(info.status.code, 20);
        assert_eq!(info.progress, 37.5);
        assert_eq!(info.images_count, 12);
    }

    #[tokio::test]
    async fn token_is_appended_to_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/abc/info"))
            .and(query_param("token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uuid": "abc",
                "status": {"code": 10}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        let node = NodeClient::with_base_url(base, "secret", Duration::from_secs(5)).unwrap();
        node.task_info(&TaskId::new("abc")).await.unwrap();
    }

    #[tokio::test]
    async fn task_output_requests_a_tail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/abc/output"))
            .and(query_param("line", "-10"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!(["line 1", "line 2"])),
            )
            .mount(&server)
            .await;

        let lines = client(&server)
            .task_output(&TaskId::new("abc"), 10)
            .await
            .unwrap();
        assert_eq!(lines, vec!["line 1".to_string(), "line 2".to_string()]);
    }

    #[tokio::test]
    async fn cancel_task_posts_uuid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task/cancel"))
            .and(body_string_contains("abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server).cancel_task(&TaskId::new("abc")).await.unwrap();
    }

    #[tokio::test]
    async fn unacknowledged_cancel_is_protocol_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task/cancel"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .cancel_task(&TaskId::new("abc"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol);
    }

    #[tokio::test]
    async fn download_assets_streams_to_disk_with_progress() {
        let server = MockServer::start().await;
        let payload = vec![0xabu8; 4096];
        Mock::given(method("GET"))
            .and(path("/task/abc/download/all.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("all.zip");
        let sink = RecordingSink::new();

        client(&server)
            .download_assets(&TaskId::new("abc"), &dest, &sink)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), payload);
        let samples = sink.samples();
        assert_non_decreasing(&samples);
        assert_eq!(samples.last().copied(), Some(100.0));
    }

    #[tokio::test]
    async fn download_assets_http_error_is_protocol_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/abc/download/all.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(&server)
            .download_assets(&TaskId::new("abc"), &dir.path().join("all.zip"), &NoopSink)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol);
    }

    #[tokio::test]
    async fn download_assets_unwritable_dest_is_storage_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/abc/download/all.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
            .mount(&server)
            .await;

        // Destination parent does not exist
        let dest = Path::new("/nonexistent-odm-pilot-dir/all.zip");
        let err = client(&server)
            .download_assets(&TaskId::new("abc"), dest, &NoopSink)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Storage);
    }

    #[tokio::test]
    async fn interrupted_download_is_connection_failure() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // A server that promises 1000 bytes, sends a few, and hangs up
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                    .await;
                let _ = socket.flush().await;
            }
        });

        let base = Url::parse(&format!("http://{}/", addr)).unwrap();
        let node = NodeClient::with_base_url(base, "", Duration::from_secs(5)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = node
            .download_assets(&TaskId::new("abc"), &dir.path().join("all.zip"), &NoopSink)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Connection);
    }

    /// Matches requests whose body is at least the given number of bytes
    struct BodyAtLeast(usize);

    impl wiremock::Match for BodyAtLeast {
        fn matches(&self, request: &wiremock::Request) -> bool {
            request.body.len() >= self.0
        }
    }

    #[tokio::test]
    async fn create_task_streams_multi_chunk_files() {
        let server = MockServer::start().await;
        // The file below spans many read chunks; the node must still receive
        // the complete multipart body
        Mock::given(method("POST"))
            .and(path("/task/new"))
            .and(BodyAtLeast(300_000))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"uuid": "7d3a-0b"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("ortho_input.jpg");
        tokio::fs::write(&big, vec![0xd8u8; 300_000]).await.unwrap();
        let sink = RecordingSink::new();

        let id = client(&server)
            .create_task(&[big], "survey", &TaskOptions::default(), &sink)
            .await
            .unwrap();

        assert_eq!(id.as_str(), "7d3a-0b");
        let samples = sink.samples();
        assert_non_decreasing(&samples);
        assert_eq!(samples.last().copied(), Some(100.0));
    }
}
