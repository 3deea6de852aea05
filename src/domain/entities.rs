//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{BuildStatus, EventType, PosterStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosterRecord {
    pub id: Uuid,
    pub build_id: Uuid,
    pub props: serde_json::Value,
    pub status: PosterStatus,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub created_at: OffsetDateTime,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub updated_at: OffsetDateTime,
}

impl PosterRecord {
    /// Display name configured by the renderer props, if any.
    pub fn configured_name(&self) -> Option<&str> {
        self.props
            .get("configuration")
            .and_then(|configuration| configuration.get("name"))
            .and_then(|name| name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildRecord {
    pub id: Uuid,
    pub title: String,
    pub status: BuildStatus,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub created_at: OffsetDateTime,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub updated_at: OffsetDateTime,
}

/// Build listing row with per-status poster counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub build: BuildRecord,
    pub pending: u64,
    pub ready: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildWithPosters {
    pub build: BuildRecord,
    pub posters: Vec<PosterRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub poster_id: Uuid,
    pub event_type: EventType,
    pub message: String,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub created_at: OffsetDateTime,
}
