use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    application::{error::AppError, repos::BuildsRepo},
    domain::{
        entities::{BuildRecord, BuildSummary, BuildWithPosters},
        error::DomainError,
        types::BuildStatus,
    },
};

const MAX_TITLE_CHARS: usize = 200;

pub struct BuildService {
    builds: Arc<dyn BuildsRepo>,
}

impl BuildService {
    pub fn new(builds: Arc<dyn BuildsRepo>) -> Self {
        Self { builds }
    }

    pub async fn list(&self) -> Result<Vec<BuildSummary>, AppError> {
        Ok(self.builds.list_builds().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<BuildWithPosters, AppError> {
        self.builds
            .find_build(id)
            .await?
            .ok_or_else(|| DomainError::not_found("build", id).into())
    }

    pub async fn create(&self, title: &str) -> Result<BuildRecord, AppError> {
        let title = normalize_title(title)?;
        let build = self.builds.create_build(&title).await?;
        info!(
            target = "application::builds::create",
            build_id = %build.id,
            title = %build.title,
            "build created"
        );
        Ok(build)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: BuildStatus,
    ) -> Result<BuildRecord, AppError> {
        self.builds
            .update_build_status(id, status)
            .await?
            .ok_or_else(|| DomainError::not_found("build", id).into())
    }

    /// Delete the build together with its posters and their events.
    pub async fn remove(&self, id: Uuid) -> Result<BuildRecord, AppError> {
        self.builds
            .remove_build(id)
            .await?
            .ok_or_else(|| DomainError::not_found("build", id).into())
    }
}

fn normalize_title(title: &str) -> Result<String, DomainError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("build title must not be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::validation(format!(
            "build title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
