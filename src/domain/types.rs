//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

/// Lifecycle of a single poster. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "poster_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PosterStatus {
    Pending,
    Ready,
    Failed,
}

impl PosterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PosterStatus::Pending => "PENDING",
            PosterStatus::Ready => "READY",
            PosterStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PosterStatus::Pending)
    }
}

impl TryFrom<&str> for PosterStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PosterStatus::Pending),
            "READY" => Ok(PosterStatus::Ready),
            "FAILED" => Ok(PosterStatus::Failed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "build_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Open,
    InProduction,
    Produced,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Open => "OPEN",
            BuildStatus::InProduction => "IN_PRODUCTION",
            BuildStatus::Produced => "PRODUCED",
        }
    }
}

impl TryFrom<&str> for BuildStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(BuildStatus::Open),
            "IN_PRODUCTION" => Ok(BuildStatus::InProduction),
            "PRODUCED" => Ok(BuildStatus::Produced),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "poster_event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Info,
    Error,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Info => "INFO",
            EventType::Error => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PosterStatus::Pending.is_terminal());
        assert!(PosterStatus::Ready.is_terminal());
        assert!(PosterStatus::Failed.is_terminal());
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!(PosterStatus::try_from("ready"), Ok(PosterStatus::Ready));
        assert_eq!(
            BuildStatus::try_from("in_production"),
            Ok(BuildStatus::InProduction)
        );
        assert!(PosterStatus::try_from("done").is_err());
    }

    #[test]
    fn poster_status_serializes_in_upper_case() {
        let json = serde_json::to_string(&PosterStatus::Failed).unwrap();
        assert_eq!(json, "\"FAILED\"");
    }
}
