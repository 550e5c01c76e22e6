//! Meter Reader: pulls electricity meter photos from Google Drive, reads them
//! with a vision-language model under a fixed request quota, and serves the
//! readings over HTTP.

pub mod api;
pub mod config;
pub mod drive;
pub mod error;
pub mod images;
pub mod limiter;
pub mod pipeline;
pub mod vision;
