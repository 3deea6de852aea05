use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use uuid::Uuid;

use crate::domain::types::BuildStatus;

/// Command-line arguments for the postergen binary.
#[derive(Debug, Parser)]
#[command(name = "postergen", version, about = "Poster render pipeline")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "POSTERGEN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run one render worker process.
    Worker(Box<WorkerArgs>),
    /// Inspect and manage builds.
    Builds(BuildsArgs),
    /// Create, inspect and cancel posters.
    Posters(PostersArgs),
    /// Write merged poster PDFs to a file.
    Download(DownloadArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: WorkerOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct QueueOverrides {
    /// Override the job namespace render jobs are pushed to.
    #[arg(long = "queue-namespace", value_name = "NAME")]
    pub queue_namespace: Option<String>,

    /// Override the notification channel carrying cancellations.
    #[arg(long = "queue-cancel-channel", value_name = "CHANNEL")]
    pub queue_cancel_channel: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ArtifactOverrides {
    /// Override the directory rendered PDFs are written to.
    #[arg(long = "artifacts-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub artifacts_directory: Option<PathBuf>,

    /// Override the pdftk executable used for concatenation.
    #[arg(long = "artifacts-pdftk-path", value_name = "PATH")]
    pub artifacts_pdftk_path: Option<PathBuf>,

    /// Override the object store base URL.
    #[arg(long = "cloud-base-url", value_name = "URL")]
    pub cloud_base_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub queue: QueueOverrides,

    #[command(flatten)]
    pub artifacts: ArtifactOverrides,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the URL of the poster renderer page.
    #[arg(long = "render-client-url", value_name = "URL")]
    pub render_client_url: Option<String>,

    /// Override the number of attempts per poster.
    #[arg(long = "render-max-attempts", value_name = "COUNT")]
    pub render_max_attempts: Option<u32>,

    /// Override the per-attempt timeout.
    #[arg(long = "render-attempt-timeout-seconds", value_name = "SECONDS")]
    pub render_attempt_timeout_seconds: Option<u64>,

    /// Override the emulated CSS media type (print|screen).
    #[arg(long = "render-media", value_name = "MEDIA")]
    pub render_media: Option<String>,

    /// Override the Chrome executable.
    #[arg(long = "render-chrome-executable", value_name = "PATH")]
    pub render_chrome_executable: Option<PathBuf>,

    /// Toggle headless mode.
    #[arg(
        long = "render-headless",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub render_headless: Option<bool>,

    /// Override the worker name reported to the queue.
    #[arg(long = "worker-name", value_name = "NAME")]
    pub worker_name: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct BuildsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: BuildsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum BuildsCommand {
    /// List builds with poster counts.
    List,
    /// Show a build and its posters.
    Show { id: Uuid },
    /// Create an empty build.
    Create {
        #[arg(long)]
        title: String,
    },
    /// Set the production status of a build.
    Status {
        id: Uuid,
        #[arg(value_parser = parse_build_status)]
        status: BuildStatus,
    },
    /// Delete a build with its posters.
    Remove { id: Uuid },
}

#[derive(Debug, Args, Clone)]
pub struct PostersArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub queue: QueueOverrides,

    #[command(subcommand)]
    pub command: PostersCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PostersCommand {
    /// Create one poster per element of a JSON array of render props.
    Create {
        #[arg(long = "build", value_name = "ID")]
        build_id: Uuid,
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        props: PathBuf,
    },
    /// Show a poster.
    Show { id: Uuid },
    /// List the event log of a poster.
    Events { id: Uuid },
    /// Cancel a pending or running poster.
    Cancel { id: Uuid },
    /// Delete a poster and its events.
    Remove { id: Uuid },
}

#[derive(Debug, Args, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub artifacts: ArtifactOverrides,

    #[command(subcommand)]
    pub command: DownloadCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum DownloadCommand {
    /// Every ready poster of a build as one document.
    Build {
        id: Uuid,
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    /// A single poster.
    Poster {
        id: Uuid,
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
}

fn parse_build_status(value: &str) -> Result<BuildStatus, String> {
    BuildStatus::try_from(value)
        .map_err(|()| format!("unknown build status `{value}` (OPEN|IN_PRODUCTION|PRODUCED)"))
}
