use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use super::types::{CompletionSignal, MediaType, PageEvent, PrintOptions, RenderError};

/// Starts rendering-engine processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, RenderError>;
}

/// A running rendering-engine process.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn open_page(&self) -> Result<OpenedPage, RenderError>;

    /// Force-close the process. Must be safe to call more than once.
    async fn close(&self);

    /// Resolves once the process has disconnected for any reason.
    async fn disconnected(&self);
}

/// One tab of a session.
#[async_trait]
pub trait RenderPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), RenderError>;

    /// Wait for the page's own completion hook. Never times out on its own.
    async fn wait_for_completion(&self) -> Result<CompletionSignal, RenderError>;

    async fn emulate_media(&self, media: MediaType) -> Result<(), RenderError>;

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, RenderError>;

    async fn close(&self) -> Result<(), RenderError>;
}

pub struct OpenedPage {
    pub page: Box<dyn RenderPage>,
    pub events: mpsc::UnboundedReceiver<PageEvent>,
}

/// Handle returned by [`BrowserSessionManager::acquire`].
pub struct SessionLease {
    pub session: Arc<dyn BrowserSession>,
    /// `true` when this call had to launch a new process.
    pub fresh: bool,
}

#[derive(Default)]
struct SessionSlot {
    generation: u64,
    session: Option<Arc<dyn BrowserSession>>,
}

/// Owns the single reusable browser process of one worker.
///
/// Page crashes, cancellation and shutdown all end in the same state: the slot
/// is empty and the next [`acquire`](Self::acquire) launches a new process.
#[derive(Clone)]
pub struct BrowserSessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    slot: Arc<Mutex<SessionSlot>>,
}

impl BrowserSessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            slot: Arc::new(Mutex::new(SessionSlot::default())),
        }
    }

    pub async fn acquire(&self) -> Result<SessionLease, RenderError> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.session.as_ref() {
            return Ok(SessionLease {
                session: Arc::clone(session),
                fresh: false,
            });
        }

        let session = self.launcher.launch().await?;
        metrics::counter!("postergen_browser_launches_total").increment(1);

        slot.generation += 1;
        slot.session = Some(Arc::clone(&session));
        self.watch_disconnect(slot.generation, Arc::clone(&session));

        info!(
            target = "application::render::session",
            generation = slot.generation,
            "browser session launched"
        );

        Ok(SessionLease {
            session,
            fresh: true,
        })
    }

    /// Close the current process, if any, and clear the slot.
    pub async fn terminate(&self) {
        let session = {
            let mut slot = self.slot.lock().await;
            slot.session.take()
        };

        if let Some(session) = session {
            info!(
                target = "application::render::session",
                "terminating browser session"
            );
            session.close().await;
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.session.is_some()
    }

    fn watch_disconnect(&self, generation: u64, session: Arc<dyn BrowserSession>) {
        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            session.disconnected().await;
            let mut slot = slot.lock().await;
            if slot.generation == generation && slot.session.is_some() {
                warn!(
                    target = "application::render::session",
                    generation, "browser disconnected; session cleared"
                );
                slot.session = None;
            }
        });
    }
}
