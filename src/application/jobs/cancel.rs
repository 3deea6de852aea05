use std::pin::Pin;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::render::{BrowserSessionManager, CurrentJob};

const LOCAL_BUS_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("cancellation bus unavailable: {0}")]
    Unavailable(String),
    #[error("failed to publish cancellation: {0}")]
    Publish(String),
}

pub type CancellationStream = Pin<Box<dyn Stream<Item = Uuid> + Send>>;

/// Fire-and-forget broadcast of job ids to every worker.
#[async_trait]
pub trait CancellationBus: Send + Sync {
    async fn publish(&self, job_id: Uuid) -> Result<(), BusError>;

    async fn subscribe(&self) -> Result<CancellationStream, BusError>;
}

/// In-process bus for single-process deployments and tests.
#[derive(Clone)]
pub struct LocalCancellationBus {
    sender: broadcast::Sender<Uuid>,
}

impl LocalCancellationBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOCAL_BUS_CAPACITY);
        Self { sender }
    }
}

impl Default for LocalCancellationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CancellationBus for LocalCancellationBus {
    async fn publish(&self, job_id: Uuid) -> Result<(), BusError> {
        // No subscribers simply means no worker is running.
        let _ = self.sender.send(job_id);
        Ok(())
    }

    async fn subscribe(&self) -> Result<CancellationStream, BusError> {
        let mut receiver = self.sender.subscribe();
        Ok(Box::pin(stream! {
            loop {
                match receiver.recv().await {
                    Ok(job_id) => yield job_id,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            target = "application::jobs::cancel",
                            skipped, "cancellation subscriber lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

/// Per-worker subscriber terminating the browser when its current job is canceled.
#[derive(Clone)]
pub struct CancellationListener {
    current: CurrentJob,
    sessions: BrowserSessionManager,
}

impl CancellationListener {
    pub fn new(current: CurrentJob, sessions: BrowserSessionManager) -> Self {
        Self { current, sessions }
    }

    /// Returns whether the message matched the job running on this worker.
    pub async fn handle(&self, job_id: Uuid) -> bool {
        if !self.current.is(job_id) {
            debug!(
                target = "application::jobs::cancel",
                job_id = %job_id,
                "cancellation for a job not running here"
            );
            return false;
        }

        info!(
            target = "application::jobs::cancel",
            job_id = %job_id,
            "cancellation matched current job; terminating browser session"
        );
        metrics::counter!("postergen_cancellations_total", "path" => "worker").increment(1);
        self.sessions.terminate().await;
        true
    }

    pub fn spawn(self, mut messages: CancellationStream) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job_id) = messages.next().await {
                self.handle(job_id).await;
            }
            debug!(
                target = "application::jobs::cancel",
                "cancellation stream ended"
            );
        })
    }
}
