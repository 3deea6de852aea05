//! Render queue on top of the apalis Postgres job table.

use std::time::Duration;

use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::jobs::{QueueError, RenderJob, RenderQueue};

/// Delivery attempts apalis may make for one job. Render retries happen inside
/// the job; these only cover redelivery after a worker vanished.
const QUEUE_MAX_ATTEMPTS: i32 = 25;

#[derive(Clone)]
pub struct PostgresRenderQueue {
    pool: PgPool,
    namespace: String,
}

impl PostgresRenderQueue {
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Storage the worker consumes from. Jobs locked by a worker that stopped
    /// heartbeating for `orphaned_after` return to `Pending`.
    pub fn storage(
        &self,
        poll_interval: Duration,
        orphaned_after: Duration,
    ) -> PostgresStorage<RenderJob> {
        let config = ApalisSqlConfig::new(&self.namespace)
            .set_poll_interval(poll_interval)
            .set_reenqueue_orphaned_after(orphaned_after);
        PostgresStorage::new_with_config(self.pool.clone(), config)
    }

    async fn is_scheduled(&self, id: Uuid) -> Result<bool, QueueError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                  FROM apalis.jobs
                 WHERE job_type = $1
                   AND status IN ('Pending', 'Running')
                   AND job->>'id' = $2
            )
            "#,
        )
        .bind(&self.namespace)
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(backend_error)
    }
}

#[async_trait]
impl RenderQueue for PostgresRenderQueue {
    async fn enqueue(&self, job: RenderJob) -> Result<(), QueueError> {
        if self.is_scheduled(job.id).await? {
            debug!(
                target = "infra::queue",
                poster_id = %job.id,
                "job already scheduled; skipping enqueue"
            );
            return Ok(());
        }

        let payload =
            serde_json::to_value(&job).map_err(|err| QueueError::Encode(err.to_string()))?;

        let job_id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id
            "#,
        )
        .bind(&self.namespace)
        .bind(payload)
        .bind("Pending")
        .bind(OffsetDateTime::now_utc())
        .bind(QUEUE_MAX_ATTEMPTS)
        .bind(0_i32)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_error)?;

        info!(
            target = "infra::queue",
            poster_id = %job.id,
            job_id = %job_id,
            namespace = %self.namespace,
            "render job enqueued"
        );
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r#"
            DELETE FROM apalis.jobs
             WHERE job_type = $1
               AND status = 'Pending'
               AND job->>'id' = $2
            "#,
        )
        .bind(&self.namespace)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        let removed = result.rows_affected() > 0;
        debug!(
            target = "infra::queue",
            poster_id = %id,
            removed,
            "queue removal attempted"
        );
        Ok(removed)
    }
}

fn backend_error(err: sqlx::Error) -> QueueError {
    QueueError::Backend(err.to_string())
}
