use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{EventsRepo, NewEventRecord, RepoError},
    domain::{entities::EventRecord, types::EventType},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    poster_id: Uuid,
    event_type: EventType,
    message: String,
    created_at: OffsetDateTime,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            poster_id: row.poster_id,
            event_type: row.event_type,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl EventsRepo for PostgresRepositories {
    async fn append_event(&self, event: NewEventRecord) -> Result<EventRecord, RepoError> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO poster_events (id, poster_id, event_type, message)
            VALUES ($1, $2, $3, $4)
            RETURNING id, poster_id, event_type, message, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.poster_id)
        .bind(event.event_type)
        .bind(&event.message)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn list_poster_events(&self, poster_id: Uuid) -> Result<Vec<EventRecord>, RepoError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, poster_id, event_type, message, created_at
            FROM poster_events
            WHERE poster_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(poster_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EventRecord::from).collect())
    }
}
