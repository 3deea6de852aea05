use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::repos::{EventsRepo, NewEventRecord};

use super::types::RenderFailure;

/// Receives the progress of one job, in the order the pipeline produces it.
#[async_trait]
pub trait RenderEvents: Send + Sync {
    async fn info(&self, message: &str);

    async fn error(&self, failure: &RenderFailure);
}

/// Logs pipeline events and appends them to the poster's event log.
pub struct PosterEventLog {
    poster_id: Uuid,
    events: Arc<dyn EventsRepo>,
}

impl PosterEventLog {
    pub fn new(poster_id: Uuid, events: Arc<dyn EventsRepo>) -> Self {
        Self { poster_id, events }
    }

    async fn append(&self, record: NewEventRecord) {
        if let Err(err) = self.events.append_event(record).await {
            warn!(
                target = "application::render::events",
                poster_id = %self.poster_id,
                error = %err,
                "failed to append poster event"
            );
        }
    }
}

#[async_trait]
impl RenderEvents for PosterEventLog {
    async fn info(&self, message: &str) {
        info!(
            target = "application::render::events",
            poster_id = %self.poster_id,
            "{message}"
        );
        self.append(NewEventRecord::info(self.poster_id, message))
            .await;
    }

    async fn error(&self, failure: &RenderFailure) {
        error!(
            target = "application::render::events",
            poster_id = %self.poster_id,
            error = ?failure,
            "{failure}"
        );
        self.append(NewEventRecord::error(self.poster_id, failure.to_string()))
            .await;
    }
}
