//! Infrastructure adapters and runtime bootstrap.

pub mod artifacts;
pub mod browser;
pub mod cloud;
pub mod db;
pub mod error;
pub mod pdf;
pub mod pubsub;
pub mod queue;
pub mod telemetry;
