use std::time::Instant;

use apalis::prelude::{Data, Error as ApalisError};
use tracing::{debug, error, info, warn};

use crate::{
    application::render::{InFlightError, PosterEventLog, RenderOutcome, RenderRequest},
    domain::types::PosterStatus,
};

use super::{context::RenderWorkerContext, queue::RenderJob};

/// apalis handler for the render queue.
///
/// Always resolves `Ok`: the outcome is recorded on the poster, never on the job.
pub async fn process_render_job(
    job: RenderJob,
    context: Data<RenderWorkerContext>,
) -> Result<(), ApalisError> {
    execute_render_job(&context, job).await;
    Ok(())
}

/// Run one job to a terminal poster status.
///
/// Returns `None` when the same poster is already executing in this process.
pub async fn execute_render_job(
    ctx: &RenderWorkerContext,
    job: RenderJob,
) -> Option<RenderOutcome> {
    let started_at = Instant::now();

    let guard = match ctx.inflight.acquire(job.id) {
        Ok(guard) => guard,
        Err(InFlightError::AlreadyRunning { poster_id }) => {
            warn!(
                target = "application::jobs::worker",
                poster_id = %poster_id,
                "render already in flight; skipping duplicate delivery"
            );
            return None;
        }
    };
    let current = ctx.current.enter(job.id);

    let log = PosterEventLog::new(job.id, ctx.events.clone());
    let request = RenderRequest {
        id: job.id,
        props: &job.props,
        events: &log,
    };
    let outcome = ctx.controller.run(&request).await;
    metrics::counter!("postergen_render_outcomes_total", "outcome" => outcome.as_str())
        .increment(1);

    let status = if outcome.success() {
        PosterStatus::Ready
    } else {
        PosterStatus::Failed
    };

    match ctx.posters.finish_poster(job.id, status).await {
        Ok(Some(_)) => info!(
            target = "application::jobs::worker",
            poster_id = %job.id,
            status = status.as_str(),
            attempts = outcome.attempts(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "render job finished"
        ),
        Ok(None) => debug!(
            target = "application::jobs::worker",
            poster_id = %job.id,
            outcome = outcome.as_str(),
            "poster already finished or removed; status left untouched"
        ),
        Err(err) => error!(
            target = "application::jobs::worker",
            poster_id = %job.id,
            status = status.as_str(),
            error = %err,
            "failed to persist terminal poster status"
        ),
    }

    drop(current);
    drop(guard);
    Some(outcome)
}
