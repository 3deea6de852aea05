//! Contracts for moving finished PDFs around: the remote artifact store and
//! the concatenation tool.

use std::{path::Path, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact `{path}` has no poster id file name")]
    InvalidPath { path: String },
    #[error("artifact io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact store request failed: {0}")]
    Request(String),
    #[error("artifact store responded with status {status} for `{key}`")]
    Status { key: String, status: u16 },
}

/// Remote home of rendered PDFs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Publish the local file at `path`.
    async fn upload(&self, path: &Path) -> Result<(), ArtifactError>;

    /// Fetch the given posters back into the local artifact directory.
    async fn download(&self, ids: &[Uuid]) -> Result<(), ArtifactError>;

    /// Whether local copies may be discarded after use.
    fn keeps_remote_copy(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum ConcatError {
    #[error("failed to start concatenation tool: {0}")]
    Spawn(String),
    #[error("concatenation output failed: {0}")]
    Io(String),
    #[error("concatenation tool reported: {0}")]
    Tool(String),
    #[error("concatenation tool exited with status {0}")]
    Exit(String),
}

pub type PdfStream = Pin<Box<dyn Stream<Item = Result<Bytes, ConcatError>> + Send>>;

/// Merges single-poster PDFs into one document, pages in the given order.
#[async_trait]
pub trait PdfMerger: Send + Sync {
    /// An empty `ids` yields an empty stream.
    fn concatenate(&self, ids: &[Uuid]) -> PdfStream;

    /// Best-effort removal of the local copies of `ids`.
    async fn remove_files(&self, ids: &[Uuid]);
}
