//! Build and poster downloads: fetch finished PDFs and merge them into one stream.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    application::{
        error::AppError,
        repos::{BuildsRepo, PostersRepo},
        storage::{ArtifactStore, PdfMerger, PdfStream},
    },
    domain::{entities::PosterRecord, error::DomainError, types::PosterStatus},
};

/// A merged PDF ready to be written out.
pub struct PdfDownload {
    pub file_name: String,
    pub poster_ids: Vec<Uuid>,
    pub stream: PdfStream,
}

pub struct DownloadService {
    builds: Arc<dyn BuildsRepo>,
    posters: Arc<dyn PostersRepo>,
    store: Arc<dyn ArtifactStore>,
    merger: Arc<dyn PdfMerger>,
}

impl DownloadService {
    pub fn new(
        builds: Arc<dyn BuildsRepo>,
        posters: Arc<dyn PostersRepo>,
        store: Arc<dyn ArtifactStore>,
        merger: Arc<dyn PdfMerger>,
    ) -> Self {
        Self {
            builds,
            posters,
            store,
            merger,
        }
    }

    /// All `Ready` posters of the build, in stored order, as one document.
    pub async fn download_build(&self, id: Uuid) -> Result<PdfDownload, AppError> {
        let build = self
            .builds
            .find_build(id)
            .await?
            .ok_or(DomainError::not_found("build", id))?;

        let poster_ids = ready_poster_ids(&build.posters);
        info!(
            target = "application::download::build",
            build_id = %id,
            posters = build.posters.len(),
            ready = poster_ids.len(),
            "downloading build"
        );

        let file_name = format!("{}-{}.pdf", build.build.title, id);
        self.merge(file_name, poster_ids).await
    }

    /// A single poster, named after its configured name.
    pub async fn download_poster(&self, id: Uuid) -> Result<PdfDownload, AppError> {
        let poster = self
            .posters
            .find_poster(id)
            .await?
            .ok_or(DomainError::not_found("poster", id))?;

        let name = poster
            .configured_name()
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string());
        self.merge(format!("{name}.pdf"), vec![id]).await
    }

    async fn merge(&self, file_name: String, poster_ids: Vec<Uuid>) -> Result<PdfDownload, AppError> {
        self.store.download(&poster_ids).await?;
        let merged = self.merger.concatenate(&poster_ids);
        let stream = remove_after_completion(
            merged,
            Arc::clone(&self.merger),
            poster_ids.clone(),
            self.store.keeps_remote_copy(),
        );

        Ok(PdfDownload {
            file_name,
            poster_ids,
            stream,
        })
    }
}

pub fn ready_poster_ids(posters: &[PosterRecord]) -> Vec<Uuid> {
    posters
        .iter()
        .filter(|poster| poster.status == PosterStatus::Ready)
        .map(|poster| poster.id)
        .collect()
}

/// Drop local copies once `inner` has been consumed without error.
fn remove_after_completion(
    inner: PdfStream,
    merger: Arc<dyn PdfMerger>,
    ids: Vec<Uuid>,
    remove: bool,
) -> PdfStream {
    Box::pin(stream! {
        let mut inner = inner;
        let mut failed = false;
        while let Some(chunk) = inner.next().await {
            failed |= chunk.is_err();
            yield chunk;
        }
        if remove && !failed {
            debug!(
                target = "application::download",
                count = ids.len(),
                "removing local copies after download"
            );
            merger.remove_files(&ids).await;
        }
    })
}
