//! IPC wire protocol exchanged between `traq-cli` and `traq-daemon` over a
//! Unix domain socket (§6 "External interfaces").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub interval_seconds: Option<u64>,
    pub afk_timeout_seconds: Option<u64>,
    pub resume_window_seconds: Option<u64>,
    pub quality: Option<i32>,
    pub duplicate_threshold: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    GetStatus,
    Pause,
    Resume,
    ForceCapture,
    RegisterGitRepo { path: String },
    DiscoverGitRepos { roots: Vec<String> },
    UnregisterGitRepo { path: String },
    WatchDirectory { path: String },
    UnwatchDirectory { path: String },
    UpdateConfig(ConfigPatch),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    pub paused: bool,
    pub is_afk: bool,
    pub current_session: Option<i64>,
    pub session_duration_seconds: Option<i64>,
    pub idle_duration_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Status(StatusReport),
    Ok,
    Error(String),
}
