use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{BuildsRepo, PostersRepo, RepoError},
    domain::{
        entities::{BuildRecord, BuildSummary, BuildWithPosters},
        types::BuildStatus,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct BuildRow {
    id: Uuid,
    title: String,
    status: BuildStatus,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<BuildRow> for BuildRecord {
    fn from(row: BuildRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BuildSummaryRow {
    #[sqlx(flatten)]
    build: BuildRow,
    pending: i64,
    ready: i64,
    failed: i64,
}

#[async_trait]
impl BuildsRepo for PostgresRepositories {
    async fn list_builds(&self) -> Result<Vec<BuildSummary>, RepoError> {
        let rows = sqlx::query_as::<_, BuildSummaryRow>(
            r#"
            SELECT b.id, b.title, b.status, b.created_at, b.updated_at,
                   COUNT(p.id) FILTER (WHERE p.status = 'PENDING') AS pending,
                   COUNT(p.id) FILTER (WHERE p.status = 'READY') AS ready,
                   COUNT(p.id) FILTER (WHERE p.status = 'FAILED') AS failed
            FROM builds b
            LEFT JOIN posters p ON p.build_id = b.id
            GROUP BY b.id
            ORDER BY b.created_at DESC, b.id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(BuildSummary {
                    build: row.build.into(),
                    pending: Self::convert_count(row.pending)?,
                    ready: Self::convert_count(row.ready)?,
                    failed: Self::convert_count(row.failed)?,
                })
            })
            .collect()
    }

    async fn find_build(&self, id: Uuid) -> Result<Option<BuildWithPosters>, RepoError> {
        let row = sqlx::query_as::<_, BuildRow>(
            "SELECT id, title, status, created_at, updated_at FROM builds WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let posters = self.list_build_posters(id).await?;
        Ok(Some(BuildWithPosters {
            build: row.into(),
            posters,
        }))
    }

    async fn create_build(&self, title: &str) -> Result<BuildRecord, RepoError> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            INSERT INTO builds (id, title, status)
            VALUES ($1, $2, $3)
            RETURNING id, title, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(BuildStatus::Open)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_build_status(
        &self,
        id: Uuid,
        status: BuildStatus,
    ) -> Result<Option<BuildRecord>, RepoError> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            UPDATE builds
               SET status = $2, updated_at = now()
             WHERE id = $1
            RETURNING id, title, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(BuildRecord::from))
    }

    async fn remove_build(&self, id: Uuid) -> Result<Option<BuildRecord>, RepoError> {
        let row = sqlx::query_as::<_, BuildRow>(
            "DELETE FROM builds WHERE id = $1 RETURNING id, title, status, created_at, updated_at",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(BuildRecord::from))
    }
}
