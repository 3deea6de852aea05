//! Cancellation bus over Postgres `LISTEN`/`NOTIFY`.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgListener};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::jobs::{BusError, CancellationBus, CancellationStream};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Every worker listens on one channel; publishers notify it with a poster id.
#[derive(Clone)]
pub struct PgCancellationBus {
    pool: PgPool,
    channel: String,
}

impl PgCancellationBus {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl CancellationBus for PgCancellationBus {
    async fn publish(&self, job_id: Uuid) -> Result<(), BusError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|err| BusError::Publish(err.to_string()))?;

        debug!(
            target = "infra::pubsub",
            channel = %self.channel,
            job_id = %job_id,
            "cancellation published"
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<CancellationStream, BusError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|err| BusError::Unavailable(err.to_string()))?;
        listener
            .listen(&self.channel)
            .await
            .map_err(|err| BusError::Unavailable(err.to_string()))?;

        let channel = self.channel.clone();
        Ok(Box::pin(stream! {
            loop {
                match listener.recv().await {
                    Ok(notification) => match Uuid::parse_str(notification.payload()) {
                        Ok(job_id) => yield job_id,
                        Err(err) => warn!(
                            target = "infra::pubsub",
                            channel = %channel,
                            payload = notification.payload(),
                            error = %err,
                            "ignoring malformed cancellation"
                        ),
                    },
                    // The listener reconnects on the next `recv`.
                    Err(err) => {
                        warn!(
                            target = "infra::pubsub",
                            channel = %channel,
                            error = %err,
                            "cancellation listener error"
                        );
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }))
    }
}
