//! Poster rendering pipeline.
//!
//! A job runs through the [`RetryController`], which drives one
//! [`RenderExecutor`] attempt at a time on the browser owned by the
//! [`BrowserSessionManager`]. Progress is reported through [`RenderEvents`].
//! Status transitions of the poster itself happen in the worker loop.

mod events;
mod executor;
mod retry;
mod runtime;
mod session;
mod types;

pub use events::{PosterEventLog, RenderEvents};
pub use executor::{RenderAttempt, RenderExecutor};
pub use retry::{
    MAX_RENDER_ATTEMPTS, RENDER_TIMEOUT, RenderOutcome, RenderRequest, RetryController,
    RetryPolicy,
};
pub use runtime::{CurrentJob, CurrentJobGuard, InFlightError, InFlightRenders, RenderGuard};
pub use session::{
    BrowserLauncher, BrowserSession, BrowserSessionManager, OpenedPage, RenderPage, SessionLease,
};
pub use types::{
    CompletionSignal, ConsoleLevel, MediaType, PRINT_SCALE, PageEvent, PrintOptions, RenderError,
    RenderFailure, RenderProps,
};
