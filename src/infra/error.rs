use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Failures while bootstrapping the process environment. Sourced variants
/// leave the detail to their source.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("filesystem operation failed")]
    Io(#[from] std::io::Error),
    #[error("failed to connect to database")]
    Connect(#[source] sqlx::Error),
    #[error("failed to apply migrations")]
    Migrate(#[from] MigrateError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
