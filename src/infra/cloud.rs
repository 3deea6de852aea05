//! Artifact stores: an HTTP object store and a local-only fallback.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::storage::{ArtifactError, ArtifactStore};

use super::artifacts::PdfArtifacts;

/// Stores artifacts as `{base_url}/{id}.pdf` objects.
pub struct HttpArtifactStore {
    client: Client,
    base: Url,
    token: Option<String>,
    artifacts: Arc<PdfArtifacts>,
}

impl HttpArtifactStore {
    pub fn new(
        base: Url,
        token: Option<String>,
        artifacts: Arc<PdfArtifacts>,
    ) -> Result<Self, ArtifactError> {
        let client = Client::builder()
            .user_agent(concat!("postergen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ArtifactError::Request(err.to_string()))?;
        // A trailing slash keeps `join` from replacing the last path segment.
        let base = if base.path().ends_with('/') {
            base
        } else {
            let mut base = base;
            let path = format!("{}/", base.path());
            base.set_path(&path);
            base
        };
        Ok(Self {
            client,
            base,
            token,
            artifacts,
        })
    }

    pub fn object_url(&self, key: &str) -> Result<Url, ArtifactError> {
        self.base
            .join(key)
            .map_err(|err| ArtifactError::Request(err.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<(), ArtifactError> {
        let key = format!("{id}.pdf");
        let url = self.object_url(&key)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|err| ArtifactError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::Status {
                key,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ArtifactError::Request(err.to_string()))?;
        fs::write(self.artifacts.path_for(id), &body).await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn upload(&self, path: &Path) -> Result<(), ArtifactError> {
        let key = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|_| PdfArtifacts::id_of(path).is_some())
            .ok_or_else(|| ArtifactError::InvalidPath {
                path: path.display().to_string(),
            })?
            .to_string();

        let contents = fs::read(path).await?;
        let size = contents.len();
        let url = self.object_url(&key)?;
        let response = self
            .authorize(self.client.put(url))
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(contents)
            .send()
            .await
            .map_err(|err| ArtifactError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::Status {
                key,
                status: status.as_u16(),
            });
        }

        info!(
            target = "infra::cloud::upload",
            key = %key,
            size_bytes = size,
            "artifact uploaded"
        );
        Ok(())
    }

    async fn download(&self, ids: &[Uuid]) -> Result<(), ArtifactError> {
        let fetches = ids.iter().map(|id| self.fetch(*id));
        futures::future::try_join_all(fetches).await?;
        debug!(
            target = "infra::cloud::download",
            count = ids.len(),
            "artifacts downloaded"
        );
        Ok(())
    }

    fn keeps_remote_copy(&self) -> bool {
        true
    }
}

/// Keeps artifacts only in the local directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalArtifactStore;

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, path: &Path) -> Result<(), ArtifactError> {
        debug!(
            target = "infra::cloud::local",
            path = %path.display(),
            "no remote store configured; artifact kept locally"
        );
        Ok(())
    }

    async fn download(&self, _ids: &[Uuid]) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn keeps_remote_copy(&self) -> bool {
        false
    }
}
