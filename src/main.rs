use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use futures::StreamExt;
use postergen::{
    application::{
        builds::BuildService,
        download::{DownloadService, PdfDownload},
        error::AppError,
        jobs::{CancellationBus, CancellationListener, RenderWorkerContext, process_render_job},
        posters::PosterService,
        render::{
            BrowserSessionManager, CurrentJob, InFlightRenders, RenderExecutor, RetryController,
            RetryPolicy,
        },
        repos::{BuildsRepo, EventsRepo, PostersRepo},
        storage::ArtifactStore,
    },
    config,
    infra::{
        artifacts::PdfArtifacts,
        browser::ChromeLauncher,
        cloud::{HttpArtifactStore, LocalArtifactStore},
        db::PostgresRepositories,
        error::InfraError,
        pdf::PdftkMerger,
        pubsub::PgCancellationBus,
        queue::PostgresRenderQueue,
        telemetry,
    },
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain().join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Worker(Box::<config::WorkerArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Worker(_) => run_worker(settings).await,
        config::Command::Builds(args) => run_builds(settings, args.command).await,
        config::Command::Posters(args) => run_posters(settings, args.command).await,
        config::Command::Download(args) => run_download(settings, args.command).await,
    }
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let posters: Arc<dyn PostersRepo> = repositories.clone();
    let events: Arc<dyn EventsRepo> = repositories.clone();

    let (artifacts, store) = build_artifact_store(&settings)?;
    let executor = Arc::new(RenderExecutor::new(
        settings.render.client_url.clone(),
        settings.render.media,
        artifacts,
        store,
    ));
    let launcher = Arc::new(ChromeLauncher::new(
        settings.render.chrome_executable.clone(),
        settings.render.headless,
    ));
    let sessions = BrowserSessionManager::new(launcher);
    let policy = RetryPolicy {
        max_attempts: settings.render.max_attempts.get(),
        attempt_timeout: settings.render.attempt_timeout,
    };
    let controller = Arc::new(RetryController::new(
        posters.clone(),
        sessions.clone(),
        executor,
        policy,
    ));

    let current = CurrentJob::new();
    let context = RenderWorkerContext {
        posters,
        events,
        controller,
        current: current.clone(),
        inflight: InFlightRenders::new(),
    };

    let bus = PgCancellationBus::new(
        repositories.pool().clone(),
        settings.queue.cancel_channel.clone(),
    );
    let cancellations = bus.subscribe().await?;
    let listener = CancellationListener::new(current, sessions.clone()).spawn(cancellations);

    let queue = PostgresRenderQueue::new(
        repositories.pool().clone(),
        settings.queue.namespace.clone(),
    );
    let storage = queue.storage(
        settings.queue.poll_interval,
        settings.queue.reenqueue_orphaned_after,
    );

    // One job at a time: the browser session and the cancel slot are per process.
    let worker = WorkerBuilder::new(settings.worker.name.clone())
        .concurrency(1)
        .data(context)
        .backend(storage)
        .build_fn(process_render_job);

    info!(
        target = "postergen::worker",
        worker = %settings.worker.name,
        namespace = %queue.namespace(),
        max_attempts = policy.max_attempts,
        "render worker started"
    );

    let result = Monitor::new()
        .register(worker)
        .run_with_signal(tokio::signal::ctrl_c())
        .await;

    listener.abort();
    sessions.terminate().await;
    info!(target = "postergen::worker", "render worker stopped");

    result.map_err(|err| AppError::unexpected(format!("render worker failed: {err}")))
}

async fn run_builds(
    settings: config::Settings,
    command: config::BuildsCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let service = BuildService::new(repositories);

    match command {
        config::BuildsCommand::List => print_json(&service.list().await?),
        config::BuildsCommand::Show { id } => print_json(&service.get(id).await?),
        config::BuildsCommand::Create { title } => print_json(&service.create(&title).await?),
        config::BuildsCommand::Status { id, status } => {
            print_json(&service.update_status(id, status).await?)
        }
        config::BuildsCommand::Remove { id } => print_json(&service.remove(id).await?),
    }
}

async fn run_posters(
    settings: config::Settings,
    command: config::PostersCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let pool = repositories.pool().clone();
    let service = PosterService::new(
        repositories.clone(),
        repositories.clone(),
        repositories,
        Arc::new(PostgresRenderQueue::new(
            pool.clone(),
            settings.queue.namespace.clone(),
        )),
        Arc::new(PgCancellationBus::new(
            pool,
            settings.queue.cancel_channel.clone(),
        )),
    );

    match command {
        config::PostersCommand::Create { build_id, props } => {
            let props = read_props_file(&props).await?;
            print_json(&service.create_posters(build_id, props).await?)
        }
        config::PostersCommand::Show { id } => print_json(&service.poster(id).await?),
        config::PostersCommand::Events { id } => print_json(&service.events(id).await?),
        config::PostersCommand::Cancel { id } => {
            let result = service.cancel_poster(id).await?;
            info!(
                target = "postergen::posters",
                poster_id = %id,
                path = result.path.as_str(),
                "cancel handled"
            );
            print_json(&result.poster)
        }
        config::PostersCommand::Remove { id } => print_json(&service.remove_poster(id).await?),
    }
}

async fn run_download(
    settings: config::Settings,
    command: config::DownloadCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let builds: Arc<dyn BuildsRepo> = repositories.clone();
    let posters: Arc<dyn PostersRepo> = repositories;

    let (artifacts, store) = build_artifact_store(&settings)?;
    let merger = Arc::new(PdftkMerger::new(
        settings.artifacts.pdftk_path.clone(),
        artifacts,
    ));
    let service = DownloadService::new(builds, posters, store, merger);

    let (download, output) = match command {
        config::DownloadCommand::Build { id, output } => (service.download_build(id).await?, output),
        config::DownloadCommand::Poster { id, output } => {
            (service.download_poster(id).await?, output)
        }
    };

    let target = output.unwrap_or_else(|| PathBuf::from(&download.file_name));
    write_download(download, &target).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::Connect)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_artifact_store(
    settings: &config::Settings,
) -> Result<(Arc<PdfArtifacts>, Arc<dyn ArtifactStore>), AppError> {
    let artifacts = Arc::new(
        PdfArtifacts::new(settings.artifacts.directory.clone()).map_err(InfraError::from)?,
    );

    let store: Arc<dyn ArtifactStore> = match settings.cloud.base_url.clone() {
        Some(base) => Arc::new(HttpArtifactStore::new(
            base,
            settings.cloud.token.clone(),
            Arc::clone(&artifacts),
        )?),
        None => Arc::new(LocalArtifactStore),
    };

    Ok((artifacts, store))
}

async fn read_props_file(path: &Path) -> Result<Vec<serde_json::Value>, AppError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(InfraError::from)?;
    serde_json::from_str(&contents).map_err(|err| {
        AppError::validation(format!(
            "{} must hold a JSON array of render props: {err}",
            path.display()
        ))
    })
}

async fn write_download(download: PdfDownload, target: &Path) -> Result<(), AppError> {
    let PdfDownload {
        poster_ids,
        mut stream,
        ..
    } = download;

    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(InfraError::from)?;
    let mut written = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                drop(file);
                if let Err(remove_err) = tokio::fs::remove_file(target).await {
                    warn!(
                        target = "postergen::download",
                        path = %target.display(),
                        error = %remove_err,
                        "failed to remove partial download"
                    );
                }
                return Err(err.into());
            }
        };
        written += chunk.len();
        file.write_all(&chunk).await.map_err(InfraError::from)?;
    }
    file.flush().await.map_err(InfraError::from)?;

    info!(
        target = "postergen::download",
        path = %target.display(),
        posters = poster_ids.len(),
        bytes = written,
        "download written"
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
