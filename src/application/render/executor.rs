use std::{future::Future, path::PathBuf, sync::Arc, time::Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{application::storage::ArtifactStore, infra::artifacts::PdfArtifacts};

use super::{
    events::RenderEvents,
    session::{BrowserSession, BrowserSessionManager, OpenedPage, RenderPage},
    types::{CompletionSignal, MediaType, PageEvent, PrintOptions, RenderError, RenderProps},
};

const PROPS_QUERY_PARAM: &str = "props";

/// Per-attempt inputs. Lives only for the duration of one attempt.
pub struct RenderAttempt<'a> {
    pub id: Uuid,
    pub props: &'a RenderProps,
    pub events: &'a dyn RenderEvents,
}

/// Drives one page through navigation, completion, printing and upload.
pub struct RenderExecutor {
    client_url: Url,
    media: MediaType,
    artifacts: Arc<PdfArtifacts>,
    store: Arc<dyn ArtifactStore>,
}

impl RenderExecutor {
    pub fn new(
        client_url: Url,
        media: MediaType,
        artifacts: Arc<PdfArtifacts>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            client_url,
            media,
            artifacts,
            store,
        }
    }

    /// Renderer URL with the serialized props (including the poster id) in the query.
    pub fn render_url(&self, id: Uuid, props: &RenderProps) -> Result<Url, RenderError> {
        let encoded = serde_json::to_string(&props.with_id(id))
            .map_err(|err| RenderError::InvalidProps(err.to_string()))?;
        let mut url = self.client_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair(PROPS_QUERY_PARAM, &encoded);
        Ok(url)
    }

    /// Run exactly one attempt on `session`.
    ///
    /// A page crash closes the page and terminates the whole session through
    /// `sessions`; the next attempt starts on a fresh process.
    pub async fn render_once(
        &self,
        sessions: &BrowserSessionManager,
        session: &dyn BrowserSession,
        attempt: &RenderAttempt<'_>,
    ) -> Result<PathBuf, RenderError> {
        let started_at = Instant::now();
        let OpenedPage { page, events } = session.open_page().await?;
        let mut watch = PageWatch::new(events, attempt.events);

        let result = self.drive(page.as_ref(), &mut watch, attempt).await;

        match &result {
            Ok(path) => {
                info!(
                    target = "application::render::executor",
                    poster_id = %attempt.id,
                    path = %path.display(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "poster rendered"
                );
            }
            Err(RenderError::Crashed(reason)) => {
                warn!(
                    target = "application::render::executor",
                    poster_id = %attempt.id,
                    reason = %reason,
                    "page crashed; terminating browser session"
                );
                let _ = page.close().await;
                sessions.terminate().await;
            }
            Err(err) => {
                debug!(
                    target = "application::render::executor",
                    poster_id = %attempt.id,
                    error = %err,
                    "attempt failed; closing page"
                );
                let _ = page.close().await;
            }
        }

        result
    }

    async fn drive(
        &self,
        page: &dyn RenderPage,
        watch: &mut PageWatch<'_>,
        attempt: &RenderAttempt<'_>,
    ) -> Result<PathBuf, RenderError> {
        let url = self.render_url(attempt.id, attempt.props)?;
        debug!(
            target = "application::render::executor",
            poster_id = %attempt.id,
            url = %url,
            "navigating"
        );
        watch.guard(page.navigate(url.as_str())).await?;

        let (width, height) = match watch.guard(page.wait_for_completion()).await? {
            CompletionSignal::Ready { width, height } => (width, height),
            CompletionSignal::Failed(message) => return Err(RenderError::Reported(message)),
        };

        watch.guard(page.emulate_media(self.media)).await?;

        let options = PrintOptions::for_render(attempt.props, width, height);
        let contents = watch.guard(page.print_pdf(&options)).await?;

        let path = self
            .artifacts
            .write(attempt.id, &contents)
            .await
            .map_err(|err| RenderError::Artifact(err.to_string()))?;

        if let Err(err) = page.close().await {
            warn!(
                target = "application::render::executor",
                poster_id = %attempt.id,
                error = %err,
                "failed to close page after printing"
            );
        }

        self.store
            .upload(&path)
            .await
            .map_err(|err| RenderError::Upload(err.to_string()))?;

        Ok(path)
    }
}

/// Races page operations against the page's event channel.
///
/// Console output is forwarded as info events; a crash aborts the operation.
struct PageWatch<'a> {
    events: mpsc::UnboundedReceiver<PageEvent>,
    sink: &'a dyn RenderEvents,
    open: bool,
}

impl<'a> PageWatch<'a> {
    fn new(events: mpsc::UnboundedReceiver<PageEvent>, sink: &'a dyn RenderEvents) -> Self {
        Self {
            events,
            sink,
            open: true,
        }
    }

    async fn guard<T, F>(&mut self, operation: F) -> Result<T, RenderError>
    where
        F: Future<Output = Result<T, RenderError>>,
    {
        tokio::pin!(operation);
        loop {
            tokio::select! {
                result = &mut operation => return result,
                event = self.events.recv(), if self.open => match event {
                    Some(PageEvent::Console { level, text }) => {
                        let message = format!("Console({}): {}", level.as_str(), text);
                        self.sink.info(&message).await;
                    }
                    Some(PageEvent::Crashed(reason)) => return Err(RenderError::Crashed(reason)),
                    None => self.open = false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::cloud::LocalArtifactStore;

    fn executor(client_url: &str) -> RenderExecutor {
        let dir = std::env::temp_dir().join("postergen-executor-url-test");
        RenderExecutor::new(
            Url::parse(client_url).unwrap(),
            MediaType::Print,
            Arc::new(PdfArtifacts::new(dir).unwrap()),
            Arc::new(LocalArtifactStore),
        )
    }

    #[test]
    fn render_url_carries_props_with_id() {
        let executor = executor("http://localhost:5000/");
        let id = Uuid::new_v4();
        let props = RenderProps::try_from(serde_json::json!({ "stopId": "1040129", "label": "a b&c" }))
            .unwrap();

        let url = executor.render_url(id, &props).unwrap();
        let (key, value) = url.query_pairs().next().unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&value).unwrap();

        assert_eq!(key, "props");
        assert_eq!(decoded["id"], serde_json::json!(id.to_string()));
        assert_eq!(decoded["label"], serde_json::json!("a b&c"));
        assert_eq!(url.path(), "/");
    }
}
