pub mod config;
pub mod db;
pub mod ingest;
pub mod playback;
pub mod query;

/// Application name for XDG paths
pub const APP_NAME: &str = "essaydb";
