// Shared transfer core for the media library service

pub mod catalog;
pub mod config;
pub mod errors;
pub mod models;
pub mod recorder;
pub mod retry;
pub mod sftp;
pub mod telemetry;
pub mod transfer;
