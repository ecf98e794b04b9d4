//! Mirrors a local directory tree into an S3-compatible object store,
//! tracking per-job and per-file progress in a relational store so a job
//! can be resumed across restarts or re-scanned to pick up new files.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod object_store;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use error::AppError;
