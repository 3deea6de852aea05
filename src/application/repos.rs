//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{
    BuildRecord, BuildSummary, BuildWithPosters, EventRecord, PosterRecord,
};
use crate::domain::types::{BuildStatus, EventType, PosterStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewPosterRecord {
    pub build_id: Uuid,
    pub props: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewEventRecord {
    pub poster_id: Uuid,
    pub event_type: EventType,
    pub message: String,
}

impl NewEventRecord {
    pub fn info(poster_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            poster_id,
            event_type: EventType::Info,
            message: message.into(),
        }
    }

    pub fn error(poster_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            poster_id,
            event_type: EventType::Error,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait PostersRepo: Send + Sync {
    async fn find_poster(&self, id: Uuid) -> Result<Option<PosterRecord>, RepoError>;

    async fn create_poster(&self, poster: NewPosterRecord) -> Result<PosterRecord, RepoError>;

    /// Move a `Pending` poster to `status`.
    ///
    /// Returns `None` when the poster does not exist or already left `Pending`;
    /// terminal statuses are never overwritten.
    async fn finish_poster(
        &self,
        id: Uuid,
        status: PosterStatus,
    ) -> Result<Option<PosterRecord>, RepoError>;

    async fn remove_poster(&self, id: Uuid) -> Result<Option<PosterRecord>, RepoError>;

    /// Posters of a build in creation order.
    async fn list_build_posters(&self, build_id: Uuid) -> Result<Vec<PosterRecord>, RepoError>;
}

#[async_trait]
pub trait BuildsRepo: Send + Sync {
    async fn list_builds(&self) -> Result<Vec<BuildSummary>, RepoError>;

    async fn find_build(&self, id: Uuid) -> Result<Option<BuildWithPosters>, RepoError>;

    async fn create_build(&self, title: &str) -> Result<BuildRecord, RepoError>;

    async fn update_build_status(
        &self,
        id: Uuid,
        status: BuildStatus,
    ) -> Result<Option<BuildRecord>, RepoError>;

    async fn remove_build(&self, id: Uuid) -> Result<Option<BuildRecord>, RepoError>;
}

#[async_trait]
pub trait EventsRepo: Send + Sync {
    async fn append_event(&self, event: NewEventRecord) -> Result<EventRecord, RepoError>;

    async fn list_poster_events(&self, poster_id: Uuid) -> Result<Vec<EventRecord>, RepoError>;
}
