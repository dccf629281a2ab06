//! Streaming multi-part upload of an output artifact.
//!
//! The artifact is never held in memory as a whole. A producer task reads
//! the file in chunks and hands them over a bounded channel; the outgoing
//! request body drains the other end. The producer blocks when the channel
//! is full, and the request only completes once the producer has closed its
//! end, so the two must run concurrently.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use himawari_models::TaskId;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Multi-part field carrying the task id.
pub const UUID_FIELD: &str = "uuid";
/// Multi-part field carrying the artifact bytes.
pub const FILE_FIELD: &str = "videodata";

/// Chunks in flight between the file reader and the request body.
pub const UPLOAD_QUEUE_DEPTH: usize = 8;
/// Size of each chunk read from the artifact.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

type Chunk = io::Result<Bytes>;

/// Result of an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Artifact bytes forwarded into the request body
    pub bytes: u64,
}

/// A multi-part body whose file part is fed by a not-yet-started producer.
///
/// Call [`ArtifactUpload::start`] right before sending the form so the
/// producer and the request run side by side.
pub struct ArtifactUpload {
    form: Form,
    path: PathBuf,
    sender: mpsc::Sender<Chunk>,
}

impl ArtifactUpload {
    /// Build the two-part body: the `uuid` text field, then the
    /// `videodata` file part named after the artifact.
    pub fn new(task_id: &TaskId, artifact: &Path) -> ClientResult<Self> {
        let file_name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| task_id.artifact_file_name());

        let (sender, receiver) = mpsc::channel::<Chunk>(UPLOAD_QUEUE_DEPTH);
        let part = Part::stream(Body::wrap_stream(ReceiverStream::new(receiver)))
            .file_name(file_name)
            .mime_str("application/octet-stream")?;

        let form = Form::new()
            .text(UUID_FIELD, task_id.to_string())
            .part(FILE_FIELD, part);

        Ok(Self {
            form,
            path: artifact.to_path_buf(),
            sender,
        })
    }

    /// Spawn the producer and hand back the form for the request.
    pub fn start(self) -> (Form, UploadProducer) {
        let forwarded = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(produce(self.path, self.sender, Arc::clone(&forwarded)));
        (self.form, UploadProducer { handle, forwarded })
    }
}

/// Handle on a running producer.
///
/// Dropping it does not stop the producer; call [`UploadProducer::abort`]
/// when the request is given up.
pub struct UploadProducer {
    handle: JoinHandle<io::Result<u64>>,
    forwarded: Arc<AtomicU64>,
}

impl UploadProducer {
    /// Bytes pushed into the request body so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Handle that can stop the producer after `self` has moved into a
    /// future.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    /// Wait for the producer and fold its outcome into the request outcome.
    ///
    /// A producer failure always wins over a success status: the coordinator
    /// must never be told a truncated artifact was fine. A non-200 answer that
    /// arrives while the producer is still running stops the producer, since
    /// nothing will drain the rest of the body.
    pub(crate) async fn finish(
        mut self,
        sent: Result<reqwest::Response, reqwest::Error>,
    ) -> ClientResult<(reqwest::Response, u64)> {
        let sent = match sent {
            Ok(response) if response.status() != StatusCode::OK && !self.handle.is_finished() => {
                self.abort();
                debug!(
                    status = %response.status(),
                    bytes = self.forwarded(),
                    "Coordinator answered before the artifact was sent"
                );
                return Ok((response, self.forwarded()));
            }
            other => other,
        };

        let produced = match (&mut self.handle).await {
            Ok(result) => result,
            Err(join_error) => Err(io::Error::other(join_error)),
        };

        match (sent, produced) {
            (Ok(response), Ok(bytes)) => Ok((response, bytes)),
            // The server answered before reading everything; report its status.
            (Ok(response), Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                Ok((response, self.forwarded()))
            }
            (Ok(_), Err(e)) => Err(ClientError::Artifact(e)),
            (Err(send_error), Err(e)) if e.kind() != ErrorKind::BrokenPipe => {
                debug!(error = %send_error, "Request failed after artifact stream error");
                Err(ClientError::Artifact(e))
            }
            (Err(send_error), _) => Err(ClientError::Network(send_error)),
        }
    }
}

/// Producer side: forward the file, then close the channel.
///
/// On failure an error item is pushed before closing, so the request body
/// ends with an error instead of looking complete.
async fn produce(path: PathBuf, sender: mpsc::Sender<Chunk>, forwarded: Arc<AtomicU64>) -> io::Result<u64> {
    let result = forward_file(&path, &sender, &forwarded).await;

    match result {
        Ok(bytes) => {
            debug!(path = %path.display(), bytes, "Artifact fully forwarded");
        }
        Err(ref e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!(path = %path.display(), "Upload body dropped before artifact was forwarded");
        }
        Err(ref e) => {
            warn!(path = %path.display(), error = %e, "Failed to stream artifact");
            let _ = sender.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
        }
    }

    // `sender` drops here, which is the end-of-stream signal.
    result
}

async fn forward_file(
    path: &Path,
    sender: &mpsc::Sender<Chunk>,
    forwarded: &AtomicU64,
) -> io::Result<u64> {
    let file = File::open(path).await?;
    let mut chunks = ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE);

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let len = chunk.len() as u64;
        if sender.send(Ok(chunk)).await.is_err() {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "upload body dropped"));
        }
        forwarded.fetch_add(len, Ordering::Relaxed);
    }

    Ok(forwarded.load(Ordering::Relaxed))
}
