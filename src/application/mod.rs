//! Application services: the render pipeline, its job plumbing and the
//! caller-facing poster, build and download operations.

pub mod builds;
pub mod download;
pub mod error;
pub mod jobs;
pub mod posters;
pub mod render;
pub mod repos;
pub mod storage;
