//! Daemon configuration (§6 "Enumerated configuration options").
//!
//! Plain struct + setters rather than a builder. Validation happens in the
//! setters so the tick path's config read stays a cheap clone.

use crate::error::{Result, TraqError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellTypeOption {
    Auto,
    Bash,
    Zsh,
    Fish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Chromium,
    Brave,
    Edge,
    Firefox,
}

impl Browser {
    pub const ALL: [Browser; 5] = [
        Browser::Chrome,
        Browser::Chromium,
        Browser::Brave,
        Browser::Edge,
        Browser::Firefox,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Chromium => "chromium",
            Browser::Brave => "brave",
            Browser::Edge => "edge",
            Browser::Firefox => "firefox",
        }
    }

    pub fn is_chromium_family(&self) -> bool {
        !matches!(self, Browser::Firefox)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    ActiveWindow,
    Primary,
    Specific,
}

/// Built-in shell-history exclude patterns, always active (§4.6).
pub fn builtin_secret_pattern() -> Regex {
    Regex::new(r"(?i)password|passwd|secret|token|key=|api_key|apikey|auth").unwrap()
}

pub const TRIVIAL_COMMANDS: &[&str] = &["ls", "cd", "pwd", "clear", "exit", "history"];

pub const DEFAULT_FILE_WATCH_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".cache",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    "target",
    "build",
    "dist",
    ".next",
];

pub const DEFAULT_FILE_EXCLUDE_EXTENSIONS: &[&str] = &[
    "swp", "swo", "tmp", "pyc", "pyo", "o", "a", "so", "dylib", "lock",
];

pub const DEFAULT_GIT_DISCOVERY_SKIP: &[&str] = &[
    "node_modules",
    ".cache",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    ".npm",
    ".cargo",
    "target",
];

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub interval: Duration,
    pub afk_timeout: Duration,
    pub resume_window: Duration,
    pub min_session_duration: Duration,

    pub quality: u8,
    pub duplicate_threshold: u32,
    pub thumbnail_width: u32,

    pub monitor_mode: MonitorMode,
    pub monitor_index: usize,

    pub shell_type: ShellTypeOption,
    pub shell_history_path: Option<PathBuf>,
    pub shell_exclude_patterns: Vec<String>,

    pub file_exclude_patterns: Vec<String>,
    pub file_allowed_extensions: Option<Vec<String>>,
    pub file_flush_interval: Duration,

    pub enabled_browsers: Vec<Browser>,
    pub excluded_domains: Vec<String>,
    pub browser_history_limit_days: u32,

    pub git_search_roots: Vec<PathBuf>,
    pub git_discovery_max_depth: usize,
    pub git_poll_max_commits: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            afk_timeout: Duration::from_secs(180),
            resume_window: Duration::from_secs(300),
            min_session_duration: Duration::from_secs(0),

            quality: 80,
            duplicate_threshold: 3,
            thumbnail_width: 200,

            monitor_mode: MonitorMode::ActiveWindow,
            monitor_index: 0,

            shell_type: ShellTypeOption::Auto,
            shell_history_path: None,
            shell_exclude_patterns: Vec::new(),

            file_exclude_patterns: DEFAULT_FILE_WATCH_EXCLUDES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            file_allowed_extensions: None,
            file_flush_interval: Duration::from_secs(5),

            enabled_browsers: Browser::ALL.to_vec(),
            excluded_domains: Vec::new(),
            browser_history_limit_days: 0,

            git_search_roots: Vec::new(),
            git_discovery_max_depth: 4,
            git_poll_max_commits: 200,
        }
    }
}

impl DaemonConfig {
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn set_afk_timeout(&mut self, timeout: Duration) {
        self.afk_timeout = timeout;
    }

    pub fn set_resume_window(&mut self, window: Duration) {
        self.resume_window = window;
    }

    /// Quality is coerced, never rejected — §4.5/§8: "outside (0, 100] is
    /// coerced to 80".
    pub fn set_quality(&mut self, quality: i32) {
        self.quality = if quality <= 0 || quality > 100 {
            80
        } else {
            quality as u8
        };
    }

    pub fn set_duplicate_threshold(&mut self, threshold: u32) {
        self.duplicate_threshold = threshold;
    }

    pub fn set_monitor_mode(&mut self, mode: MonitorMode, index: usize) {
        self.monitor_mode = mode;
        self.monitor_index = index;
    }

    pub fn set_shell_type(&mut self, shell_type: ShellTypeOption) {
        self.shell_type = shell_type;
    }

    pub fn set_shell_history_path(&mut self, path: Option<PathBuf>) {
        self.shell_history_path = path;
    }

    /// Rejects a malformed user regex, per §4.6.
    pub fn add_shell_exclude_pattern(&mut self, pattern: String) -> Result<()> {
        Regex::new(&pattern).map_err(|e| TraqError::Config(format!("invalid regex: {e}")))?;
        self.shell_exclude_patterns.push(pattern);
        Ok(())
    }

    pub fn add_file_exclude_pattern(&mut self, pattern: String) {
        self.file_exclude_patterns.push(pattern);
    }

    pub fn set_file_allowed_extensions(&mut self, extensions: Option<Vec<String>>) {
        self.file_allowed_extensions = extensions;
    }

    pub fn set_enabled_browsers(&mut self, browsers: Vec<Browser>) {
        self.enabled_browsers = browsers;
    }

    pub fn set_excluded_domains(&mut self, domains: Vec<String>) {
        self.excluded_domains = domains;
    }

    pub fn set_browser_history_limit_days(&mut self, days: u32) {
        self.browser_history_limit_days = days;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_coercion_boundary() {
        let mut cfg = DaemonConfig::default();
        cfg.set_quality(0);
        assert_eq!(cfg.quality, 80);
        cfg.set_quality(101);
        assert_eq!(cfg.quality, 80);
        cfg.set_quality(-5);
        assert_eq!(cfg.quality, 80);
        cfg.set_quality(55);
        assert_eq!(cfg.quality, 55);
        cfg.set_quality(100);
        assert_eq!(cfg.quality, 100);
    }

    #[test]
    fn malformed_regex_rejected() {
        let mut cfg = DaemonConfig::default();
        assert!(cfg.add_shell_exclude_pattern("(unterminated".to_string()).is_err());
        assert!(cfg.add_shell_exclude_pattern("^ok$".to_string()).is_ok());
    }
}
