//! Coordinator HTTP client.

use std::path::Path;
use std::time::Duration;

use himawari_models::Task;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::upload::{ArtifactUpload, UploadReceipt};

/// Header carrying the worker's concurrency hint on acquisition.
pub const THREADS_HEADER: &str = "X-Himawari-Threads";

const TASK_PATH: &str = "task";
const TASK_DONE_PATH: &str = "task/done";

/// Configuration for the coordinator client.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Coordinator `host[:port]` or base URL
    pub address: String,
    /// Timeout for one acquire call
    pub acquire_timeout: Duration,
    /// Timeout for one artifact upload
    pub upload_timeout: Duration,
    /// Value sent in the concurrency hint header
    pub threads_hint: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            acquire_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(3600), // 1 hour
            threads_hint: 0,
        }
    }
}

impl CoordinatorConfig {
    /// Create config for `address` with default timeouts.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Base URL of the coordinator. Bare `host[:port]` means plain HTTP.
    pub fn base_url(&self) -> ClientResult<Url> {
        let address = self.address.trim();
        let raw = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let mut url = Url::parse(&raw).map_err(|source| ClientError::InvalidAddress {
            address: self.address.clone(),
            source,
        })?;
        if url.cannot_be_a_base() {
            return Err(ClientError::InvalidAddress {
                address: self.address.clone(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            });
        }
        // Make `join` append rather than replace the last segment.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Client for the coordinator's two endpoints.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http: Client,
    config: CoordinatorConfig,
    task_url: Url,
    done_url: Url,
}

impl CoordinatorClient {
    /// Create a new coordinator client.
    pub fn new(config: CoordinatorConfig) -> ClientResult<Self> {
        let base = config.base_url()?;
        let join = |path: &str| {
            base.join(path).map_err(|source| ClientError::InvalidAddress {
                address: config.address.clone(),
                source,
            })
        };
        let task_url = join(TASK_PATH)?;
        let done_url = join(TASK_DONE_PATH)?;

        // Timeouts are per request: uploads and acquisitions differ by
        // orders of magnitude.
        let http = Client::builder().build().map_err(ClientError::Network)?;

        Ok(Self {
            http,
            config,
            task_url,
            done_url,
        })
    }

    /// Ask the coordinator for one task.
    ///
    /// Any status other than 200 is [`ClientError::NoWork`]; a 200 with an
    /// unusable body is [`ClientError::Protocol`].
    pub async fn acquire_task(&self) -> ClientResult<Task> {
        let response = self
            .http
            .get(self.task_url.clone())
            .header(THREADS_HEADER, self.config.threads_hint.to_string())
            .timeout(self.config.acquire_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(status = %status, "Coordinator has no work");
            return Err(ClientError::NoWork(status));
        }

        let body = response.bytes().await?;
        let task = Task::decode(&body)?;
        Ok(task)
    }

    /// Stream the artifact at `artifact` to the coordinator for `task`.
    ///
    /// `upload_timeout` bounds the whole exchange, not just the wait for
    /// response headers.
    pub async fn submit_result(&self, task: &Task, artifact: &Path) -> ClientResult<UploadReceipt> {
        let (form, producer) = ArtifactUpload::new(task.id(), artifact)?.start();
        let abort = producer.abort_handle();

        let exchange = async {
            let sent = self
                .http
                .post(self.done_url.clone())
                .multipart(form)
                .timeout(self.config.upload_timeout)
                .send()
                .await;
            producer.finish(sent).await
        };

        let (response, bytes) = match tokio::time::timeout(self.config.upload_timeout, exchange).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                abort.abort();
                warn!(task_id = %task.id(), timeout = ?self.config.upload_timeout, "Upload timed out");
                return Err(ClientError::UploadTimedOut(self.config.upload_timeout));
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::UploadRejected(status.to_string()));
        }

        info!(task_id = %task.id(), bytes, "Artifact accepted by coordinator");
        Ok(UploadReceipt { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use himawari_models::TaskDecodeError;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CoordinatorClient {
        let mut config = CoordinatorConfig::new(server.uri());
        config.threads_hint = 3;
        config.acquire_timeout = Duration::from_millis(500);
        config.upload_timeout = Duration::from_secs(10);
        CoordinatorClient::new(config).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.upload_timeout, Duration::from_secs(3600));
        tokio_test::assert_ok!(config.base_url());
    }

    #[test]
    fn test_base_url_accepts_bare_host() {
        let url = CoordinatorConfig::new("10.0.0.5:8080").base_url().unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.5:8080/");
        assert_eq!(url.join("task/done").unwrap().as_str(), "http://10.0.0.5:8080/task/done");

        let url = CoordinatorConfig::new("https://coord.example/api").base_url().unwrap();
        assert_eq!(url.join("task").unwrap().as_str(), "https://coord.example/api/task");
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        let err = CoordinatorConfig::new("").base_url().unwrap_err();
        assert!(matches!(err, ClientError::InvalidAddress { .. }));

        let err = CoordinatorConfig::new("http://[::1").base_url().unwrap_err();
        assert!(matches!(err, ClientError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_acquire_task_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task"))
            .and(header(THREADS_HEADER, "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Id":"abc","Command":"ffmpeg","Args":["-i","in.mp4"],"PresetData":"x=1"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let task = client_for(&server).acquire_task().await.unwrap();
        assert_eq!(task.id().as_str(), "abc");
        assert_eq!(task.command(), "ffmpeg");
        assert_eq!(task.args(), ["-i", "in.mp4"]);
        assert_eq!(task.preset_data(), "x=1");
    }

    #[tokio::test]
    async fn test_acquire_non_200_is_no_work() {
        for status in [204u16, 404, 500, 503] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/task"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = client_for(&server).acquire_task().await.unwrap_err();
            assert!(err.is_no_work(), "status {status}: {err}");
        }
    }

    #[tokio::test]
    async fn test_acquire_empty_id_is_protocol_violation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Id":"","Command":"ffmpeg"}"#))
            .mount(&server)
            .await;

        let err = client_for(&server).acquire_task().await.unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(matches!(err, ClientError::Protocol(TaskDecodeError::EmptyId)));
    }

    #[tokio::test]
    async fn test_acquire_malformed_body_is_protocol_violation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).acquire_task().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(TaskDecodeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"Id":"late"}"#)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).acquire_task().await.unwrap_err();
        match err {
            ClientError::Network(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_acquire_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CoordinatorClient::new(CoordinatorConfig::new(addr.to_string())).unwrap();
        let err = client.acquire_task().await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }

    #[tokio::test]
    async fn test_submit_result_streams_two_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task/done"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("abc.mp4");
        let data = b"\x00\x00\x00\x18ftypmp42 fake video payload".repeat(10_000);
        tokio::fs::write(&artifact, &data).await.unwrap();

        let task = Task::new("abc", "ffmpeg").unwrap();
        let receipt = client_for(&server).submit_result(&task, &artifact).await.unwrap();
        assert_eq!(receipt.bytes, data.len() as u64);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        let body = &request.body;
        let find = |needle: &[u8]| body.windows(needle.len()).position(|w| w == needle);
        let uuid_at = find(b"name=\"uuid\"").expect("uuid field");
        let file_at = find(b"name=\"videodata\"; filename=\"abc.mp4\"").expect("file part");
        assert!(uuid_at < file_at, "uuid field must come first");
        assert!(find(b"\r\n\r\nabc\r\n").is_some());
        assert!(find(&data).is_some(), "artifact bytes forwarded intact");
    }

    #[tokio::test]
    async fn test_submit_result_non_200_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task/done"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("abc.mp4");
        tokio::fs::write(&artifact, b"video").await.unwrap();

        let task = Task::new("abc", "ffmpeg").unwrap();
        let err = client_for(&server).submit_result(&task, &artifact).await.unwrap_err();
        match err {
            ClientError::UploadRejected(status) => assert_eq!(status, "500 Internal Server Error"),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Answers once the request head has arrived, then holds the socket
    /// open without reading the rest of the body.
    async fn answer_early_and_stall(status_line: &'static str) -> (String, tokio::task::JoinHandle<()>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 4096];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let reply = format!("{status_line}\r\ncontent-length: 0\r\n\r\n");
            socket.write_all(reply.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        (address, server)
    }

    #[tokio::test]
    async fn test_submit_result_is_bounded_when_coordinator_stops_reading() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("abc.mp4");
        tokio::fs::write(&artifact, vec![0u8; 32 * 1024 * 1024]).await.unwrap();
        let task = Task::new("abc", "ffmpeg").unwrap();

        for status_line in ["HTTP/1.1 413 Payload Too Large", "HTTP/1.1 200 OK"] {
            let (address, server) = answer_early_and_stall(status_line).await;
            let mut config = CoordinatorConfig::new(address);
            config.upload_timeout = Duration::from_secs(2);
            let client = CoordinatorClient::new(config).unwrap();

            let outcome = tokio::time::timeout(Duration::from_secs(10), client.submit_result(&task, &artifact))
                .await
                .unwrap_or_else(|_| panic!("{status_line}: upload outlived its timeout"));

            let err = outcome.unwrap_err();
            assert!(
                matches!(
                    err,
                    ClientError::UploadRejected(_) | ClientError::UploadTimedOut(_) | ClientError::Network(_)
                ),
                "{status_line}: unexpected error: {err}"
            );
            server.abort();
        }
    }

    #[tokio::test]
    async fn test_submit_missing_artifact_fails_instead_of_truncating() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task/done"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let task = Task::new("abc", "ffmpeg").unwrap();
        let err = client_for(&server)
            .submit_result(&task, &dir.path().join("abc.mp4"))
            .await
            .unwrap_err();

        assert!(err.is_artifact());
        match err {
            ClientError::Artifact(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }
}
