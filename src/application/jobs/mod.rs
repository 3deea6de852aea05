//! Render queue plumbing: job payload, cancellation bus and the worker handler.

mod cancel;
mod context;
mod queue;
mod worker;

pub use cancel::{
    BusError, CancellationBus, CancellationListener, CancellationStream, LocalCancellationBus,
};
pub use context::RenderWorkerContext;
pub use queue::{QueueError, RenderJob, RenderQueue};
pub use worker::{execute_render_job, process_render_job};
