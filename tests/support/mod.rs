//! In-memory stand-ins for the store, queue, browser and PDF tools.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use postergen::{
    application::{
        jobs::{QueueError, RenderJob, RenderQueue, RenderWorkerContext},
        render::{
            BrowserLauncher, BrowserSession, BrowserSessionManager, CompletionSignal, ConsoleLevel,
            CurrentJob, InFlightRenders, MediaType, OpenedPage, PageEvent, PrintOptions,
            RenderError, RenderExecutor, RenderPage, RetryController, RetryPolicy,
        },
        repos::{
            BuildsRepo, EventsRepo, NewEventRecord, NewPosterRecord, PostersRepo, RepoError,
        },
        storage::{ArtifactError, ArtifactStore, ConcatError, PdfMerger, PdfStream},
    },
    domain::{
        entities::{BuildRecord, BuildSummary, BuildWithPosters, EventRecord, PosterRecord},
        types::{BuildStatus, EventType, PosterStatus},
    },
    infra::{artifacts::PdfArtifacts, cloud::LocalArtifactStore},
};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use url::Url;
use uuid::Uuid;

pub const FAKE_PDF: &[u8] = b"%PDF-1.4 fake poster";

#[derive(Default)]
struct StoreState {
    builds: Vec<BuildRecord>,
    posters: Vec<PosterRecord>,
    events: Vec<EventRecord>,
}

/// Store with the same terminal-status rules as the Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_status_checks: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_build(&self, title: &str) -> BuildRecord {
        let now = OffsetDateTime::now_utc();
        let build = BuildRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            status: BuildStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().builds.push(build.clone());
        build
    }

    pub fn seed_poster(&self, build_id: Uuid, status: PosterStatus) -> PosterRecord {
        let now = OffsetDateTime::now_utc();
        let poster = PosterRecord {
            id: Uuid::new_v4(),
            build_id,
            props: serde_json::json!({ "configuration": { "name": "Kamppi" } }),
            status,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().posters.push(poster.clone());
        poster
    }

    pub fn status(&self, id: Uuid) -> Option<PosterStatus> {
        self.state
            .lock()
            .unwrap()
            .posters
            .iter()
            .find(|poster| poster.id == id)
            .map(|poster| poster.status)
    }

    pub fn events_of(&self, id: Uuid) -> Vec<(EventType, String)> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|event| event.poster_id == id)
            .map(|event| (event.event_type, event.message.clone()))
            .collect()
    }

    pub fn messages(&self, id: Uuid, kind: EventType) -> Vec<String> {
        self.events_of(id)
            .into_iter()
            .filter(|(event_type, _)| *event_type == kind)
            .map(|(_, message)| message)
            .collect()
    }

    /// Make `find_poster` fail until switched back.
    pub fn fail_status_checks(&self, fail: bool) {
        *self.fail_status_checks.lock().unwrap() = fail;
    }
}

#[async_trait]
impl PostersRepo for MemoryStore {
    async fn find_poster(&self, id: Uuid) -> Result<Option<PosterRecord>, RepoError> {
        if *self.fail_status_checks.lock().unwrap() {
            return Err(RepoError::Timeout);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .posters
            .iter()
            .find(|poster| poster.id == id)
            .cloned())
    }

    async fn create_poster(&self, poster: NewPosterRecord) -> Result<PosterRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = PosterRecord {
            id: Uuid::new_v4(),
            build_id: poster.build_id,
            props: poster.props,
            status: PosterStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().posters.push(record.clone());
        Ok(record)
    }

    async fn finish_poster(
        &self,
        id: Uuid,
        status: PosterStatus,
    ) -> Result<Option<PosterRecord>, RepoError> {
        let mut state = self.state.lock().unwrap();
        let Some(poster) = state
            .posters
            .iter_mut()
            .find(|poster| poster.id == id && poster.status == PosterStatus::Pending)
        else {
            return Ok(None);
        };
        poster.status = status;
        poster.updated_at = OffsetDateTime::now_utc();
        Ok(Some(poster.clone()))
    }

    async fn remove_poster(&self, id: Uuid) -> Result<Option<PosterRecord>, RepoError> {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.posters.iter().position(|poster| poster.id == id) else {
            return Ok(None);
        };
        state.events.retain(|event| event.poster_id != id);
        Ok(Some(state.posters.remove(index)))
    }

    async fn list_build_posters(&self, build_id: Uuid) -> Result<Vec<PosterRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .posters
            .iter()
            .filter(|poster| poster.build_id == build_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BuildsRepo for MemoryStore {
    async fn list_builds(&self) -> Result<Vec<BuildSummary>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .builds
            .iter()
            .map(|build| {
                let count = |status| {
                    state
                        .posters
                        .iter()
                        .filter(|poster| poster.build_id == build.id && poster.status == status)
                        .count() as u64
                };
                BuildSummary {
                    build: build.clone(),
                    pending: count(PosterStatus::Pending),
                    ready: count(PosterStatus::Ready),
                    failed: count(PosterStatus::Failed),
                }
            })
            .collect())
    }

    async fn find_build(&self, id: Uuid) -> Result<Option<BuildWithPosters>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .builds
            .iter()
            .find(|build| build.id == id)
            .map(|build| BuildWithPosters {
                build: build.clone(),
                posters: state
                    .posters
                    .iter()
                    .filter(|poster| poster.build_id == id)
                    .cloned()
                    .collect(),
            }))
    }

    async fn create_build(&self, title: &str) -> Result<BuildRecord, RepoError> {
        Ok(self.seed_build(title))
    }

    async fn update_build_status(
        &self,
        id: Uuid,
        status: BuildStatus,
    ) -> Result<Option<BuildRecord>, RepoError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .builds
            .iter_mut()
            .find(|build| build.id == id)
            .map(|build| {
                build.status = status;
                build.clone()
            }))
    }

    async fn remove_build(&self, id: Uuid) -> Result<Option<BuildRecord>, RepoError> {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.builds.iter().position(|build| build.id == id) else {
            return Ok(None);
        };
        let removed: Vec<Uuid> = state
            .posters
            .iter()
            .filter(|poster| poster.build_id == id)
            .map(|poster| poster.id)
            .collect();
        state.posters.retain(|poster| poster.build_id != id);
        state
            .events
            .retain(|event| !removed.contains(&event.poster_id));
        Ok(Some(state.builds.remove(index)))
    }
}

#[async_trait]
impl EventsRepo for MemoryStore {
    async fn append_event(&self, event: NewEventRecord) -> Result<EventRecord, RepoError> {
        let record = EventRecord {
            id: Uuid::new_v4(),
            poster_id: event.poster_id,
            event_type: event.event_type,
            message: event.message,
            created_at: OffsetDateTime::now_utc(),
        };
        self.state.lock().unwrap().events.push(record.clone());
        Ok(record)
    }

    async fn list_poster_events(&self, poster_id: Uuid) -> Result<Vec<EventRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|event| event.poster_id == poster_id)
            .cloned()
            .collect())
    }
}

/// Queue holding jobs until a test hands them to the worker.
#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<RenderJob>>,
    fail_enqueue: Mutex<bool>,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// What a worker poll would receive next.
    pub fn deliver(&self) -> Option<RenderJob> {
        self.pending.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Make `enqueue` fail until switched back.
    pub fn fail_enqueue(&self, fail: bool) {
        *self.fail_enqueue.lock().unwrap() = fail;
    }
}

#[async_trait]
impl RenderQueue for MemoryQueue {
    async fn enqueue(&self, job: RenderJob) -> Result<(), QueueError> {
        if *self.fail_enqueue.lock().unwrap() {
            return Err(QueueError::Backend("connection reset".to_string()));
        }
        let mut pending = self.pending.lock().unwrap();
        if !pending.iter().any(|queued| queued.id == job.id) {
            pending.push_back(job);
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<bool, QueueError> {
        let mut pending = self.pending.lock().unwrap();
        let before = pending.len();
        pending.retain(|job| job.id != id);
        Ok(pending.len() != before)
    }
}

/// Behavior of one opened page.
#[derive(Debug, Clone)]
pub enum PageScript {
    /// The renderer finishes with the given content size.
    Ready { width: f64, height: f64 },
    /// The renderer reports an error through its completion hook.
    Report(String),
    /// The renderer never finishes; only closing the session ends the wait.
    Hang,
    /// The page crashes while the renderer is working.
    Crash,
}

#[derive(Default)]
struct BrowserState {
    script: VecDeque<PageScript>,
    launches: usize,
    closes: usize,
    pages: usize,
    printed: Vec<PrintOptions>,
    media: Vec<MediaType>,
    urls: Vec<String>,
}

/// Browser driven by a queue of page scripts shared across launches.
#[derive(Clone)]
pub struct ScriptedBrowser {
    state: Arc<Mutex<BrowserState>>,
    waiting: Arc<watch::Sender<usize>>,
}

impl ScriptedBrowser {
    pub fn new(script: impl IntoIterator<Item = PageScript>) -> Self {
        let (waiting, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(BrowserState {
                script: script.into_iter().collect(),
                ..Default::default()
            })),
            waiting: Arc::new(waiting),
        }
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn pages(&self) -> usize {
        self.state.lock().unwrap().pages
    }

    pub fn printed(&self) -> Vec<PrintOptions> {
        self.state.lock().unwrap().printed.clone()
    }

    pub fn media(&self) -> Vec<MediaType> {
        self.state.lock().unwrap().media.clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().urls.clone()
    }

    /// Resolve once `count` pages have entered their completion wait.
    pub async fn wait_for_hung_pages(&self, count: usize) {
        let mut receiver = self.waiting.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            receiver.wait_for(|waiting| *waiting >= count),
        )
        .await
        .expect("page never started waiting")
        .expect("browser dropped");
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, RenderError> {
        self.state.lock().unwrap().launches += 1;
        let (closed, _) = watch::channel(false);
        Ok(Arc::new(ScriptedSession {
            browser: self.clone(),
            closed: Arc::new(closed),
        }))
    }
}

struct ScriptedSession {
    browser: ScriptedBrowser,
    closed: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn open_page(&self) -> Result<OpenedPage, RenderError> {
        if *self.closed.borrow() {
            return Err(RenderError::SessionClosed);
        }
        let script = {
            let mut state = self.browser.state.lock().unwrap();
            state.pages += 1;
            state
                .script
                .pop_front()
                .unwrap_or(PageScript::Report("script exhausted".to_string()))
        };

        let (sender, events) = mpsc::unbounded_channel();
        let _ = sender.send(PageEvent::Console {
            level: ConsoleLevel::Log,
            text: "map tiles loaded".to_string(),
        });

        Ok(OpenedPage {
            page: Box::new(ScriptedPage {
                browser: self.browser.clone(),
                script,
                closed: Arc::clone(&self.closed),
                sender,
            }),
            events,
        })
    }

    async fn close(&self) {
        if !self.closed.send_replace(true) {
            self.browser.state.lock().unwrap().closes += 1;
        }
    }

    async fn disconnected(&self) {
        let mut receiver = self.closed.subscribe();
        let _ = receiver.wait_for(|closed| *closed).await;
    }
}

struct ScriptedPage {
    browser: ScriptedBrowser,
    script: PageScript,
    closed: Arc<watch::Sender<bool>>,
    sender: mpsc::UnboundedSender<PageEvent>,
}

#[async_trait]
impl RenderPage for ScriptedPage {
    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        self.browser.state.lock().unwrap().urls.push(url.to_string());
        Ok(())
    }

    async fn wait_for_completion(&self) -> Result<CompletionSignal, RenderError> {
        match &self.script {
            PageScript::Ready { width, height } => Ok(CompletionSignal::Ready {
                width: *width,
                height: *height,
            }),
            PageScript::Report(message) => Ok(CompletionSignal::Failed(message.clone())),
            PageScript::Crash => {
                let _ = self
                    .sender
                    .send(PageEvent::Crashed("renderer process gone".to_string()));
                futures::future::pending().await
            }
            PageScript::Hang => {
                self.browser.waiting.send_modify(|waiting| *waiting += 1);
                let mut closed = self.closed.subscribe();
                let _ = closed.wait_for(|closed| *closed).await;
                Err(RenderError::SessionClosed)
            }
        }
    }

    async fn emulate_media(&self, media: MediaType) -> Result<(), RenderError> {
        self.browser.state.lock().unwrap().media.push(media);
        Ok(())
    }

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, RenderError> {
        self.browser
            .state
            .lock()
            .unwrap()
            .printed
            .push(options.clone());
        Ok(FAKE_PDF.to_vec())
    }

    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Merger that records its inputs and streams the ids back as text.
#[derive(Default)]
pub struct RecordingMerger {
    pub concatenated: Mutex<Vec<Vec<Uuid>>>,
    pub removed: Mutex<Vec<Uuid>>,
    pub fail: bool,
}

#[async_trait]
impl PdfMerger for RecordingMerger {
    fn concatenate(&self, ids: &[Uuid]) -> PdfStream {
        self.concatenated.lock().unwrap().push(ids.to_vec());
        let mut chunks: Vec<Result<Bytes, ConcatError>> = ids
            .iter()
            .map(|id| Ok(Bytes::from(format!("{id};"))))
            .collect();
        if self.fail {
            chunks.push(Err(ConcatError::Exit("exit status: 1".to_string())));
        }
        Box::pin(futures::stream::iter(chunks))
    }

    async fn remove_files(&self, ids: &[Uuid]) {
        self.removed.lock().unwrap().extend_from_slice(ids);
    }
}

/// Remote store that only records calls.
#[derive(Default)]
pub struct RecordingStore {
    pub downloaded: Mutex<Vec<Vec<Uuid>>>,
    pub keeps_remote: bool,
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn upload(&self, _path: &Path) -> Result<(), ArtifactError> {
        Ok(())
    }

    async fn download(&self, ids: &[Uuid]) -> Result<(), ArtifactError> {
        self.downloaded.lock().unwrap().push(ids.to_vec());
        Ok(())
    }

    fn keeps_remote_copy(&self) -> bool {
        self.keeps_remote
    }
}

/// A worker process wired to in-memory collaborators.
pub struct WorkerHarness {
    pub store: Arc<MemoryStore>,
    pub browser: ScriptedBrowser,
    pub sessions: BrowserSessionManager,
    pub context: RenderWorkerContext,
    pub artifacts: Arc<PdfArtifacts>,
    _dir: tempfile::TempDir,
}

impl WorkerHarness {
    pub fn new(script: impl IntoIterator<Item = PageScript>, policy: RetryPolicy) -> Self {
        Self::with_store(MemoryStore::new(), script, policy)
    }

    pub fn with_store(
        store: Arc<MemoryStore>,
        script: impl IntoIterator<Item = PageScript>,
        policy: RetryPolicy,
    ) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let artifacts =
            Arc::new(PdfArtifacts::new(dir.path().join("output")).expect("artifact dir"));
        let browser = ScriptedBrowser::new(script);
        let sessions = BrowserSessionManager::new(Arc::new(browser.clone()));
        let executor = Arc::new(RenderExecutor::new(
            Url::parse("http://localhost:5000/").expect("client url"),
            MediaType::Print,
            Arc::clone(&artifacts),
            Arc::new(LocalArtifactStore),
        ));
        let controller = Arc::new(RetryController::new(
            store.clone(),
            sessions.clone(),
            executor,
            policy,
        ));
        let context = RenderWorkerContext {
            posters: store.clone(),
            events: store.clone(),
            controller,
            current: CurrentJob::new(),
            inflight: InFlightRenders::new(),
        };

        Self {
            store,
            browser,
            sessions,
            context,
            artifacts,
            _dir: dir,
        }
    }
}

pub fn props() -> postergen::application::render::RenderProps {
    postergen::application::render::RenderProps::try_from(serde_json::json!({
        "stopId": "H1234",
        "configuration": { "name": "Kamppi" }
    }))
    .expect("props object")
}

pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        attempt_timeout: Duration::from_secs(30),
    }
}
