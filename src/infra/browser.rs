//! Headless Chrome backend for the render pipeline (chromiumoxide / CDP).

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::{
        browser_protocol::{
            emulation::SetEmulatedMediaParams,
            inspector::{EnableParams as InspectorEnableParams, EventTargetCrashed},
            page::{AddScriptToEvaluateOnNewDocumentParams, PrintToPdfParams},
        },
        js_protocol::runtime::{ConsoleApiCalledType, EvaluateParams, EventConsoleApiCalled},
    },
};
use futures::StreamExt;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::application::render::{
    BrowserLauncher, BrowserSession, CompletionSignal, ConsoleLevel, MediaType, OpenedPage,
    PageEvent, PrintOptions, RenderError, RenderPage,
};

/// Installs `window.callPhantom` before any page script runs. The promise
/// resolves with whatever the renderer passes to the hook.
const COMPLETION_HOOK: &str = "window.__posterDone = new Promise(function (resolve) { \
     window.callPhantom = function (opts) { resolve(opts || {}); }; });";
const AWAIT_COMPLETION: &str = "window.__posterDone";

/// Launches one Chrome process per call.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    headless: bool,
}

impl ChromeLauncher {
    pub fn new(executable: Option<PathBuf>, headless: bool) -> Self {
        Self {
            executable,
            headless,
        }
    }

    fn config(&self) -> Result<BrowserConfig, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = self.executable.as_ref() {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(RenderError::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, RenderError> {
        let config = self.config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| RenderError::Launch(err.to_string()))?;

        let (disconnected, _) = watch::channel(false);
        let notifier = disconnected.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(
                        target = "infra::browser",
                        error = %err,
                        "browser handler stopped"
                    );
                    break;
                }
            }
            notifier.send_replace(true);
        });

        info!(
            target = "infra::browser",
            headless = self.headless,
            "chrome launched"
        );

        Ok(Arc::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            disconnected,
            handler_task,
        }))
    }
}

pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    disconnected: watch::Sender<bool>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn open_page(&self) -> Result<OpenedPage, RenderError> {
        let page = {
            let browser = self.browser.lock().await;
            let browser = browser.as_ref().ok_or(RenderError::SessionClosed)?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|err| RenderError::Page(err.to_string()))?
        };

        let hook = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(COMPLETION_HOOK)
            .build()
            .map_err(RenderError::Page)?;
        page.execute(hook)
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?;
        page.execute(InspectorEnableParams::default())
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?;

        let (sender, events) = mpsc::unbounded_channel();
        let listeners = spawn_listeners(&page, sender).await?;

        Ok(OpenedPage {
            page: Box::new(ChromePage { page, listeners }),
            events,
        })
    }

    async fn close(&self) {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(err) = browser.close().await {
                warn!(
                    target = "infra::browser",
                    error = %err,
                    "graceful browser close failed; killing process"
                );
                let _ = browser.kill().await;
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        self.disconnected.send_replace(true);
    }

    async fn disconnected(&self) {
        let mut receiver = self.disconnected.subscribe();
        let _ = receiver.wait_for(|disconnected| *disconnected).await;
    }
}

async fn spawn_listeners(
    page: &Page,
    sender: mpsc::UnboundedSender<PageEvent>,
) -> Result<Vec<JoinHandle<()>>, RenderError> {
    let mut console = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|err| RenderError::Page(err.to_string()))?;
    let mut crashes = page
        .event_listener::<EventTargetCrashed>()
        .await
        .map_err(|err| RenderError::Page(err.to_string()))?;

    let console_sender = sender.clone();
    let console_task = tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let Some(level) = console_level(&event.r#type) else {
                continue;
            };
            let text = event
                .args
                .iter()
                .map(|arg| match (&arg.value, &arg.description) {
                    (Some(serde_json::Value::String(text)), _) => text.clone(),
                    (Some(value), _) => value.to_string(),
                    (None, Some(description)) => description.clone(),
                    (None, None) => String::new(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            if console_sender.send(PageEvent::Console { level, text }).is_err() {
                break;
            }
        }
    });

    let crash_task = tokio::spawn(async move {
        if crashes.next().await.is_some() {
            let _ = sender.send(PageEvent::Crashed("target crashed".to_string()));
        }
    });

    Ok(vec![console_task, crash_task])
}

/// Only `log`, `warning` and `error` calls reach the poster log.
fn console_level(kind: &ConsoleApiCalledType) -> Option<ConsoleLevel> {
    match kind {
        ConsoleApiCalledType::Log => Some(ConsoleLevel::Log),
        ConsoleApiCalledType::Warning => Some(ConsoleLevel::Warning),
        ConsoleApiCalledType::Error => Some(ConsoleLevel::Error),
        _ => None,
    }
}

pub struct ChromePage {
    page: Page,
    listeners: Vec<JoinHandle<()>>,
}

#[async_trait]
impl RenderPage for ChromePage {
    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|err| RenderError::Navigation(err.to_string()))
    }

    async fn wait_for_completion(&self) -> Result<CompletionSignal, RenderError> {
        let params = EvaluateParams::builder()
            .expression(AWAIT_COMPLETION)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(RenderError::Page)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?;
        let value: serde_json::Value = result
            .into_value()
            .map_err(|err| RenderError::InvalidSignal(err.to_string()))?;

        CompletionSignal::from_hook_value(&value)
    }

    async fn emulate_media(&self, media: MediaType) -> Result<(), RenderError> {
        let params = SetEmulatedMediaParams::builder().media(media.as_str()).build();
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|err| RenderError::Page(err.to_string()))
    }

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, RenderError> {
        self.page
            .pdf(print_params(options))
            .await
            .map_err(|err| RenderError::Print(err.to_string()))
    }

    async fn close(&self) -> Result<(), RenderError> {
        for listener in &self.listeners {
            listener.abort();
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(|err| RenderError::Page(err.to_string()))
    }
}

fn print_params(options: &PrintOptions) -> PrintToPdfParams {
    PrintToPdfParams {
        print_background: Some(options.print_background),
        paper_width: Some(options.paper_width),
        paper_height: Some(options.paper_height),
        margin_top: Some(options.margin),
        margin_bottom: Some(options.margin),
        margin_left: Some(options.margin),
        margin_right: Some(options.margin),
        scale: Some(options.scale),
        page_ranges: options.page_ranges.clone(),
        ..Default::default()
    }
}
