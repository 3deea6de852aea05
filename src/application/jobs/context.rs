use std::sync::Arc;

use crate::application::{
    render::{CurrentJob, InFlightRenders, RetryController},
    repos::{EventsRepo, PostersRepo},
};

/// State owned by one worker process and shared with its job handler.
#[derive(Clone)]
pub struct RenderWorkerContext {
    pub posters: Arc<dyn PostersRepo>,
    pub events: Arc<dyn EventsRepo>,
    pub controller: Arc<RetryController>,
    pub current: CurrentJob,
    pub inflight: InFlightRenders,
}
