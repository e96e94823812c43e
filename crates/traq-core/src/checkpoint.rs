//! On-disk ingestion checkpoints (§3 "Checkpoints", §6 persisted layout).
//!
//! Best-effort durability: loss only replays already-deduplicated work, so
//! writes are "write a temp file, rename over" rather than anything
//! transactional, matching §5's "atomic... recommended but not mandated".

use crate::error::{Result, TraqError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn load<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| TraqError::CheckpointJson {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(TraqError::Checkpoint {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| TraqError::CheckpointJson {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| TraqError::Checkpoint {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|source| TraqError::Checkpoint {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| TraqError::Checkpoint {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ShellCheckpoint {
    pub offsets: HashMap<String, u64>,
}

pub struct ShellCheckpointStore {
    path: PathBuf,
    state: ShellCheckpoint,
}

impl ShellCheckpointStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = load(&path)?;
        Ok(Self { path, state })
    }

    pub fn offset(&self, history_path: &str) -> u64 {
        self.state.offsets.get(history_path).copied().unwrap_or(0)
    }

    pub fn set_offset(&mut self, history_path: &str, offset: u64) -> Result<()> {
        self.state.offsets.insert(history_path.to_string(), offset);
        save(&self.path, &self.state)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GitCheckpoint {
    pub last_commits: HashMap<String, String>,
}

pub struct GitCheckpointStore {
    path: PathBuf,
    state: GitCheckpoint,
}

impl GitCheckpointStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = load(&path)?;
        Ok(Self { path, state })
    }

    pub fn last_commit(&self, repository_id: i64) -> Option<&str> {
        self.state
            .last_commits
            .get(&repository_id.to_string())
            .map(String::as_str)
    }

    pub fn set_last_commit(&mut self, repository_id: i64, hash: &str) -> Result<()> {
        self.state
            .last_commits
            .insert(repository_id.to_string(), hash.to_string());
        save(&self.path, &self.state)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BrowserCheckpoint {
    pub last_timestamps: HashMap<String, i64>,
}

pub struct BrowserCheckpointStore {
    path: PathBuf,
    state: BrowserCheckpoint,
}

impl BrowserCheckpointStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = load(&path)?;
        Ok(Self { path, state })
    }

    pub fn last_timestamp(&self, browser: &str) -> i64 {
        self.state.last_timestamps.get(browser).copied().unwrap_or(0)
    }

    pub fn set_last_timestamp(&mut self, browser: &str, timestamp: i64) -> Result<()> {
        let entry = self
            .state
            .last_timestamps
            .entry(browser.to_string())
            .or_insert(0);
        if timestamp > *entry {
            *entry = timestamp;
        }
        save(&self.path, &self.state)
    }
}
