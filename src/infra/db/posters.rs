use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{NewPosterRecord, PostersRepo, RepoError},
    domain::{entities::PosterRecord, types::PosterStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const POSTER_COLUMNS: &str = "id, build_id, props, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PosterRow {
    id: Uuid,
    build_id: Uuid,
    props: serde_json::Value,
    status: PosterStatus,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PosterRow> for PosterRecord {
    fn from(row: PosterRow) -> Self {
        Self {
            id: row.id,
            build_id: row.build_id,
            props: row.props,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PostersRepo for PostgresRepositories {
    async fn find_poster(&self, id: Uuid) -> Result<Option<PosterRecord>, RepoError> {
        let row = sqlx::query_as::<_, PosterRow>(&format!(
            "SELECT {POSTER_COLUMNS} FROM posters WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PosterRecord::from))
    }

    async fn create_poster(&self, poster: NewPosterRecord) -> Result<PosterRecord, RepoError> {
        let row = sqlx::query_as::<_, PosterRow>(&format!(
            "INSERT INTO posters (id, build_id, props, status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {POSTER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(poster.build_id)
        .bind(&poster.props)
        .bind(PosterStatus::Pending)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn finish_poster(
        &self,
        id: Uuid,
        status: PosterStatus,
    ) -> Result<Option<PosterRecord>, RepoError> {
        if !status.is_terminal() {
            return Err(RepoError::InvalidInput {
                message: format!("`{}` is not a terminal poster status", status.as_str()),
            });
        }

        let row = sqlx::query_as::<_, PosterRow>(&format!(
            "UPDATE posters \
                SET status = $2, updated_at = now() \
              WHERE id = $1 AND status = $3 \
             RETURNING {POSTER_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(PosterStatus::Pending)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PosterRecord::from))
    }

    async fn remove_poster(&self, id: Uuid) -> Result<Option<PosterRecord>, RepoError> {
        let row = sqlx::query_as::<_, PosterRow>(&format!(
            "DELETE FROM posters WHERE id = $1 RETURNING {POSTER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PosterRecord::from))
    }

    async fn list_build_posters(&self, build_id: Uuid) -> Result<Vec<PosterRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PosterRow>(&format!(
            "SELECT {POSTER_COLUMNS} FROM posters \
              WHERE build_id = $1 \
              ORDER BY created_at, id"
        ))
        .bind(build_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PosterRecord::from).collect())
    }
}
