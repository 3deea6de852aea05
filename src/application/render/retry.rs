use std::{sync::Arc, time::Duration, time::Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{application::repos::PostersRepo, domain::types::PosterStatus};

use super::{
    events::RenderEvents,
    executor::{RenderAttempt, RenderExecutor},
    session::BrowserSessionManager,
    types::{RenderFailure, RenderProps},
};

pub const MAX_RENDER_ATTEMPTS: u32 = 3;
pub const RENDER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RENDER_ATTEMPTS,
            attempt_timeout: RENDER_TIMEOUT,
        }
    }
}

/// Inputs for one job run.
pub struct RenderRequest<'a> {
    pub id: Uuid,
    pub props: &'a RenderProps,
    pub events: &'a dyn RenderEvents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered { attempts: u32 },
    /// The poster left `Pending` (failed, rendered or removed) before an
    /// attempt started.
    Canceled { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl RenderOutcome {
    pub fn success(self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }

    pub fn attempts(self) -> u32 {
        match self {
            RenderOutcome::Rendered { attempts }
            | RenderOutcome::Canceled { attempts }
            | RenderOutcome::Exhausted { attempts } => attempts,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RenderOutcome::Rendered { .. } => "rendered",
            RenderOutcome::Canceled { .. } => "canceled",
            RenderOutcome::Exhausted { .. } => "exhausted",
        }
    }
}

#[derive(Debug)]
enum RetryState {
    CheckCancel,
    Attempt,
    Retry(RenderFailure),
    Success,
    Canceled,
    Exhausted,
}

/// Bounded retry loop around [`RenderExecutor::render_once`].
pub struct RetryController {
    posters: Arc<dyn PostersRepo>,
    sessions: BrowserSessionManager,
    executor: Arc<RenderExecutor>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(
        posters: Arc<dyn PostersRepo>,
        sessions: BrowserSessionManager,
        executor: Arc<RenderExecutor>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            posters,
            sessions,
            executor,
            policy,
        }
    }

    /// Run attempts until one succeeds, the poster is canceled, or the
    /// policy is exhausted. Never returns an error.
    pub async fn run(&self, request: &RenderRequest<'_>) -> RenderOutcome {
        let mut attempts = 0u32;
        let mut state = RetryState::CheckCancel;

        loop {
            state = match state {
                RetryState::CheckCancel => match self.check_cancel(request).await {
                    // A failed status check uses up an attempt.
                    RetryState::Retry(failure) => {
                        attempts += 1;
                        RetryState::Retry(failure)
                    }
                    next => next,
                },
                RetryState::Attempt => {
                    attempts += 1;
                    self.attempt(request, attempts).await
                }
                RetryState::Retry(failure) => {
                    request.events.error(&failure).await;
                    if attempts >= self.policy.max_attempts {
                        RetryState::Exhausted
                    } else {
                        RetryState::CheckCancel
                    }
                }
                RetryState::Success => {
                    request.events.info("Rendered successfully").await;
                    return RenderOutcome::Rendered { attempts };
                }
                RetryState::Canceled => {
                    request.events.info("Failed or canceled").await;
                    return RenderOutcome::Canceled { attempts };
                }
                RetryState::Exhausted => return RenderOutcome::Exhausted { attempts },
            };
        }
    }

    async fn check_cancel(&self, request: &RenderRequest<'_>) -> RetryState {
        match self.posters.find_poster(request.id).await {
            Ok(Some(poster)) if poster.status == PosterStatus::Pending => RetryState::Attempt,
            Ok(_) => RetryState::Canceled,
            Err(err) => {
                warn!(
                    target = "application::render::retry",
                    poster_id = %request.id,
                    error = %err,
                    "poster status check failed"
                );
                RetryState::Retry(RenderFailure::Infrastructure(format!(
                    "poster status check failed: {err}"
                )))
            }
        }
    }

    async fn attempt(&self, request: &RenderRequest<'_>, attempt: u32) -> RetryState {
        let message = if attempt > 1 { "Retrying" } else { "Rendering" };
        request.events.info(message).await;
        metrics::counter!("postergen_render_attempts_total").increment(1);

        let lease = match self.sessions.acquire().await {
            Ok(lease) => lease,
            Err(err) => return RetryState::Retry(RenderFailure::Render(err)),
        };
        if lease.fresh {
            request.events.info("Creating new browser instance").await;
        }

        let render_attempt = RenderAttempt {
            id: request.id,
            props: request.props,
            events: request.events,
        };

        let started_at = Instant::now();
        let result = tokio::time::timeout(
            self.policy.attempt_timeout,
            self.executor
                .render_once(&self.sessions, lease.session.as_ref(), &render_attempt),
        )
        .await;
        metrics::histogram!("postergen_render_attempt_ms")
            .record(started_at.elapsed().as_millis() as f64);

        debug!(
            target = "application::render::retry",
            poster_id = %request.id,
            attempt,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "attempt finished"
        );

        match result {
            Ok(Ok(_)) => RetryState::Success,
            Ok(Err(err)) => RetryState::Retry(RenderFailure::Render(err)),
            Err(_) => {
                // The abandoned page may still hold the renderer busy.
                self.sessions.terminate().await;
                RetryState::Retry(RenderFailure::Timeout(self.policy.attempt_timeout))
            }
        }
    }
}
