//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::render::{MAX_RENDER_ATTEMPTS, MediaType, RENDER_TIMEOUT};

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "postergen";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CLIENT_URL: &str = "http://localhost:5000";
const DEFAULT_QUEUE_NAMESPACE: &str = "render_poster";
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_REENQUEUE_ORPHANED_AFTER_SECS: u64 = 300;
const DEFAULT_CANCEL_CHANNEL: &str = "poster_cancel";
const DEFAULT_ARTIFACTS_DIR: &str = "output";
const DEFAULT_PDFTK_PATH: &str = "pdftk";
const MAX_CHANNEL_NAME_LEN: usize = 63;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub render: RenderSettings,
    pub queue: QueueSettings,
    pub artifacts: ArtifactSettings,
    pub cloud: CloudSettings,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub client_url: Url,
    pub max_attempts: NonZeroU32,
    pub attempt_timeout: Duration,
    pub media: MediaType,
    /// `None` lets the driver locate an installed Chrome.
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub namespace: String,
    pub poll_interval: Duration,
    pub reenqueue_orphaned_after: Duration,
    pub cancel_channel: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
    pub pdftk_path: PathBuf,
}

/// Remote object store. Without a base URL rendered files stay local.
#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub base_url: Option<Url>,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub name: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("POSTERGEN").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_command_overrides(cli.command.as_ref());

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    render: RawRenderSettings,
    queue: RawQueueSettings,
    artifacts: RawArtifactSettings,
    cloud: RawCloudSettings,
    worker: RawWorkerSettings,
}

impl RawSettings {
    fn apply_command_overrides(&mut self, command: Option<&Command>) {
        match command {
            Some(Command::Worker(args)) => self.apply_worker_overrides(&args.overrides),
            Some(Command::Builds(args)) => self.apply_database_override(&args.database),
            Some(Command::Posters(args)) => {
                self.apply_database_override(&args.database);
                self.apply_queue_overrides(&args.queue);
            }
            Some(Command::Download(args)) => {
                self.apply_database_override(&args.database);
                self.apply_artifact_overrides(&args.artifacts);
            }
            None => self.apply_worker_overrides(&WorkerOverrides::default()),
        }
    }

    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        if let Some(level) = overrides.logging.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.logging.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.render_client_url.as_ref() {
            self.render.client_url = Some(url.clone());
        }
        if let Some(attempts) = overrides.render_max_attempts {
            self.render.max_attempts = Some(attempts);
        }
        if let Some(seconds) = overrides.render_attempt_timeout_seconds {
            self.render.attempt_timeout_seconds = Some(seconds);
        }
        if let Some(media) = overrides.render_media.as_ref() {
            self.render.media = Some(media.clone());
        }
        if let Some(path) = overrides.render_chrome_executable.as_ref() {
            self.render.chrome_executable = Some(path.clone());
        }
        if let Some(headless) = overrides.render_headless {
            self.render.headless = Some(headless);
        }
        if let Some(name) = overrides.worker_name.as_ref() {
            self.worker.name = Some(name.clone());
        }

        self.apply_queue_overrides(&overrides.queue);
        self.apply_artifact_overrides(&overrides.artifacts);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_queue_overrides(&mut self, overrides: &QueueOverrides) {
        if let Some(namespace) = overrides.queue_namespace.as_ref() {
            self.queue.namespace = Some(namespace.clone());
        }
        if let Some(channel) = overrides.queue_cancel_channel.as_ref() {
            self.queue.cancel_channel = Some(channel.clone());
        }
    }

    fn apply_artifact_overrides(&mut self, overrides: &ArtifactOverrides) {
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }
        if let Some(path) = overrides.artifacts_pdftk_path.as_ref() {
            self.artifacts.pdftk_path = Some(path.clone());
        }
        if let Some(url) = overrides.cloud_base_url.as_ref() {
            self.cloud.base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            render,
            queue,
            artifacts,
            cloud,
            worker,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            render: build_render_settings(render)?,
            queue: build_queue_settings(queue)?,
            artifacts: build_artifact_settings(artifacts)?,
            cloud: build_cloud_settings(cloud)?,
            worker: build_worker_settings(worker)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let client_url = parse_url(
        render.client_url.as_deref().unwrap_or(DEFAULT_CLIENT_URL),
        "render.client_url",
    )?;

    let max_attempts = non_zero_u32(
        render.max_attempts.unwrap_or(MAX_RENDER_ATTEMPTS).into(),
        "render.max_attempts",
    )?;

    let timeout_secs = render
        .attempt_timeout_seconds
        .unwrap_or(RENDER_TIMEOUT.as_secs());
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "render.attempt_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let media = match render.media.as_deref() {
        Some(value) => MediaType::try_from(value).map_err(|()| {
            LoadError::invalid("render.media", format!("unknown media type `{value}`"))
        })?,
        None => MediaType::Print,
    };

    let chrome_executable = render
        .chrome_executable
        .filter(|path| !path.as_os_str().is_empty());

    Ok(RenderSettings {
        client_url,
        max_attempts,
        attempt_timeout: Duration::from_secs(timeout_secs),
        media,
        chrome_executable,
        headless: render.headless.unwrap_or(true),
    })
}

fn build_queue_settings(queue: RawQueueSettings) -> Result<QueueSettings, LoadError> {
    let namespace =
        non_blank(queue.namespace).unwrap_or_else(|| DEFAULT_QUEUE_NAMESPACE.to_string());

    let poll_ms = queue
        .poll_interval_ms
        .unwrap_or(DEFAULT_QUEUE_POLL_INTERVAL_MS);
    if poll_ms == 0 {
        return Err(LoadError::invalid(
            "queue.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    let orphaned_secs = queue
        .reenqueue_orphaned_after_seconds
        .unwrap_or(DEFAULT_REENQUEUE_ORPHANED_AFTER_SECS);
    if orphaned_secs == 0 {
        return Err(LoadError::invalid(
            "queue.reenqueue_orphaned_after_seconds",
            "must be greater than zero",
        ));
    }

    let cancel_channel =
        non_blank(queue.cancel_channel).unwrap_or_else(|| DEFAULT_CANCEL_CHANNEL.to_string());
    validate_channel_name(&cancel_channel)
        .map_err(|reason| LoadError::invalid("queue.cancel_channel", reason))?;

    Ok(QueueSettings {
        namespace,
        poll_interval: Duration::from_millis(poll_ms),
        reenqueue_orphaned_after: Duration::from_secs(orphaned_secs),
        cancel_channel,
    })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.directory",
            "path must not be empty",
        ));
    }

    let pdftk_path = artifacts
        .pdftk_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PDFTK_PATH));
    if pdftk_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.pdftk_path",
            "path must not be empty",
        ));
    }

    Ok(ArtifactSettings {
        directory,
        pdftk_path,
    })
}

fn build_cloud_settings(cloud: RawCloudSettings) -> Result<CloudSettings, LoadError> {
    let base_url = non_blank(cloud.base_url)
        .map(|value| parse_url(&value, "cloud.base_url"))
        .transpose()?;

    Ok(CloudSettings {
        base_url,
        token: non_blank(cloud.token),
    })
}

fn build_worker_settings(worker: RawWorkerSettings) -> Result<WorkerSettings, LoadError> {
    let name = non_blank(worker.name)
        .unwrap_or_else(|| format!("render-worker-{}", std::process::id()));
    Ok(WorkerSettings { name })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    client_url: Option<String>,
    max_attempts: Option<u32>,
    attempt_timeout_seconds: Option<u64>,
    media: Option<String>,
    chrome_executable: Option<PathBuf>,
    headless: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQueueSettings {
    namespace: Option<String>,
    poll_interval_ms: Option<u64>,
    reenqueue_orphaned_after_seconds: Option<u64>,
    cancel_channel: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
    pdftk_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCloudSettings {
    base_url: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    name: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    Url::parse(value).map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))
}

/// Postgres channel names are plain identifiers.
fn validate_channel_name(name: &str) -> Result<(), String> {
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(format!(
            "must be at most {MAX_CHANNEL_NAME_LEN} characters"
        ));
    }
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_');
    if !starts_well || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(format!(
            "`{name}` must be a lowercase identifier ([a-z_][a-z0-9_]*)"
        ));
    }
    Ok(())
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
