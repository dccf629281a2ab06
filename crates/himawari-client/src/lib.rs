//! HTTP client for the Himawari coordinator.
//!
//! The coordinator exposes two endpoints: `GET /task` hands out one task,
//! `POST /task/done` takes the finished artifact as a streamed multi-part
//! body. Acquisition and upload use independent timeouts.

pub mod client;
pub mod error;
pub mod upload;

pub use client::{CoordinatorClient, CoordinatorConfig, THREADS_HEADER};
pub use error::{ClientError, ClientResult};
pub use reqwest::StatusCode;
pub use upload::{ArtifactUpload, UploadProducer, UploadReceipt, FILE_FIELD, UUID_FIELD};
