//! Error kinds for the recording engine (§7).
//!
//! These are the kinds the daemon tick logs-and-swallows per subsystem; only
//! user-invoked actions (register/watch/add-pattern) propagate them to a
//! caller verbatim.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraqError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("platform capability unavailable: {0}")]
    PlatformUnavailable(String),

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("checkpoint error at {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint json error at {path}: {source}")]
    CheckpointJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("foreign database error: {0}")]
    ForeignDb(String),

    #[error("integrity error recovered at startup: {0}")]
    Integrity(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TraqError>;
