//! Render pipeline that turns queued poster requests into PDFs.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
