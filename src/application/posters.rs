//! Caller-facing poster operations: create, cancel, remove and inspect.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        error::AppError,
        jobs::{CancellationBus, RenderJob, RenderQueue},
        render::RenderProps,
        repos::{BuildsRepo, EventsRepo, NewPosterRecord, PostersRepo},
    },
    domain::{
        entities::{EventRecord, PosterRecord},
        error::DomainError,
        types::PosterStatus,
    },
};

/// How a cancel request reached (or did not need to reach) the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPath {
    /// The poster had already left `Pending`.
    AlreadyFinished,
    /// The job was still queued and was removed.
    Dequeued,
    /// The job was running; a cancellation was broadcast to the workers.
    Broadcast,
}

impl CancelPath {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelPath::AlreadyFinished => "finished",
            CancelPath::Dequeued => "queue",
            CancelPath::Broadcast => "bus",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelResult {
    pub poster: PosterRecord,
    pub path: CancelPath,
}

pub struct PosterService {
    posters: Arc<dyn PostersRepo>,
    builds: Arc<dyn BuildsRepo>,
    events: Arc<dyn EventsRepo>,
    queue: Arc<dyn RenderQueue>,
    bus: Arc<dyn CancellationBus>,
}

impl PosterService {
    pub fn new(
        posters: Arc<dyn PostersRepo>,
        builds: Arc<dyn BuildsRepo>,
        events: Arc<dyn EventsRepo>,
        queue: Arc<dyn RenderQueue>,
        bus: Arc<dyn CancellationBus>,
    ) -> Self {
        Self {
            posters,
            builds,
            events,
            queue,
            bus,
        }
    }

    /// Create one `Pending` poster per props object and enqueue its job.
    ///
    /// Stops at the first enqueue error and marks that poster `Failed`.
    /// Posters created before it stay queued.
    pub async fn create_posters(
        &self,
        build_id: Uuid,
        props: Vec<serde_json::Value>,
    ) -> Result<Vec<PosterRecord>, AppError> {
        if self.builds.find_build(build_id).await?.is_none() {
            return Err(DomainError::not_found("build", build_id).into());
        }

        let props = props
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                RenderProps::try_from(value)
                    .map_err(|err| AppError::validation(format!("props[{index}]: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut created = Vec::with_capacity(props.len());
        for props in props {
            let poster = self
                .posters
                .create_poster(NewPosterRecord {
                    build_id,
                    props: props.to_json(),
                })
                .await?;
            if let Err(err) = self.queue.enqueue(RenderJob::new(poster.id, props)).await {
                self.fail_unqueued(poster.id).await;
                return Err(err.into());
            }

            info!(
                target = "application::posters::create",
                poster_id = %poster.id,
                build_id = %build_id,
                "poster queued for rendering"
            );
            created.push(poster);
        }

        Ok(created)
    }

    async fn fail_unqueued(&self, id: Uuid) {
        if let Err(err) = self.posters.finish_poster(id, PosterStatus::Failed).await {
            warn!(
                target = "application::posters::create",
                poster_id = %id,
                error = %err,
                "failed to mark unqueued poster as failed"
            );
        }
    }

    /// Mark the poster `Failed` and stop its job wherever it is.
    ///
    /// Queue removal is tried first; only a job that already started is
    /// reached through the cancellation bus. Canceling a finished poster is a
    /// no-op.
    pub async fn cancel_poster(&self, id: Uuid) -> Result<CancelResult, AppError> {
        let Some(poster) = self.posters.finish_poster(id, PosterStatus::Failed).await? else {
            let poster = self
                .posters
                .find_poster(id)
                .await?
                .ok_or(DomainError::not_found("poster", id))?;
            return Ok(CancelResult {
                poster,
                path: CancelPath::AlreadyFinished,
            });
        };

        let path = self.stop_job(id).await?;
        metrics::counter!("postergen_cancellations_total", "path" => path.as_str()).increment(1);

        info!(
            target = "application::posters::cancel",
            poster_id = %id,
            path = path.as_str(),
            "poster canceled"
        );

        Ok(CancelResult { poster, path })
    }

    /// Delete the poster and its events. A pending job is stopped as well.
    pub async fn remove_poster(&self, id: Uuid) -> Result<PosterRecord, AppError> {
        let poster = self
            .posters
            .remove_poster(id)
            .await?
            .ok_or(DomainError::not_found("poster", id))?;

        if poster.status == PosterStatus::Pending
            && let Err(err) = self.stop_job(id).await
        {
            warn!(
                target = "application::posters::remove",
                poster_id = %id,
                error = %err,
                "failed to stop job of removed poster"
            );
        }

        Ok(poster)
    }

    pub async fn poster(&self, id: Uuid) -> Result<PosterRecord, AppError> {
        self.posters
            .find_poster(id)
            .await?
            .ok_or_else(|| DomainError::not_found("poster", id).into())
    }

    pub async fn events(&self, id: Uuid) -> Result<Vec<EventRecord>, AppError> {
        self.poster(id).await?;
        Ok(self.events.list_poster_events(id).await?)
    }

    async fn stop_job(&self, id: Uuid) -> Result<CancelPath, AppError> {
        if self.queue.remove(id).await? {
            return Ok(CancelPath::Dequeued);
        }
        self.bus.publish(id).await?;
        Ok(CancelPath::Broadcast)
    }
}
