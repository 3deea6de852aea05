use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::render::RenderProps;

/// Queue message driving one poster's render. The id is the poster id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: Uuid,
    pub props: RenderProps,
}

impl RenderJob {
    pub fn new(id: Uuid, props: RenderProps) -> Self {
        Self { id, props }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to encode job payload: {0}")]
    Encode(String),
    #[error("queue backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RenderQueue: Send + Sync {
    /// Schedule `job`. Enqueuing an id that is already waiting or running is a no-op.
    async fn enqueue(&self, job: RenderJob) -> Result<(), QueueError>;

    /// Drop the job for `id` if it has not started yet.
    ///
    /// `false` means the job is running (or gone) and only the cancellation
    /// bus can still reach it.
    async fn remove(&self, id: Uuid) -> Result<bool, QueueError>;
}
