//! Loads `DaemonConfig` from a TOML file layered under `TRAQ_`-prefixed
//! environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use traq_core::config::{Browser, DaemonConfig, MonitorMode, ShellTypeOption};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    interval_seconds: Option<u64>,
    afk_timeout_seconds: Option<u64>,
    resume_window_seconds: Option<u64>,
    min_session_duration_seconds: Option<u64>,
    quality: Option<i32>,
    duplicate_threshold: Option<u32>,
    thumbnail_width: Option<u32>,
    monitor_mode: Option<String>,
    monitor_index: Option<usize>,
    shell_type: Option<String>,
    shell_history_path: Option<String>,
    shell_exclude_patterns: Option<Vec<String>>,
    file_exclude_patterns: Option<Vec<String>>,
    file_allowed_extensions: Option<Vec<String>>,
    file_flush_interval_seconds: Option<u64>,
    enabled_browsers: Option<Vec<String>>,
    excluded_domains: Option<Vec<String>>,
    browser_history_limit_days: Option<u32>,
    git_search_roots: Option<Vec<String>>,
    git_discovery_max_depth: Option<usize>,
    git_poll_max_commits: Option<usize>,
}

pub fn load(path: &Path) -> Result<DaemonConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("TRAQ"));
    let raw: RawConfig = builder
        .build()
        .context("building config layers")?
        .try_deserialize()
        .context("deserializing traq.toml")?;

    let mut cfg = DaemonConfig::default();
    if let Some(v) = raw.interval_seconds {
        cfg.set_interval(Duration::from_secs(v));
    }
    if let Some(v) = raw.afk_timeout_seconds {
        cfg.set_afk_timeout(Duration::from_secs(v));
    }
    if let Some(v) = raw.resume_window_seconds {
        cfg.set_resume_window(Duration::from_secs(v));
    }
    if let Some(v) = raw.min_session_duration_seconds {
        cfg.min_session_duration = Duration::from_secs(v);
    }
    if let Some(v) = raw.quality {
        cfg.set_quality(v);
    }
    if let Some(v) = raw.duplicate_threshold {
        cfg.set_duplicate_threshold(v);
    }
    if let Some(v) = raw.thumbnail_width {
        cfg.thumbnail_width = v;
    }
    if let Some(mode) = raw.monitor_mode.as_deref() {
        let parsed = match mode {
            "primary" => MonitorMode::Primary,
            "specific" => MonitorMode::Specific,
            _ => MonitorMode::ActiveWindow,
        };
        cfg.set_monitor_mode(parsed, raw.monitor_index.unwrap_or(0));
    }
    if let Some(shell) = raw.shell_type.as_deref() {
        let parsed = match shell {
            "bash" => ShellTypeOption::Bash,
            "zsh" => ShellTypeOption::Zsh,
            "fish" => ShellTypeOption::Fish,
            _ => ShellTypeOption::Auto,
        };
        cfg.set_shell_type(parsed);
    }
    if let Some(path) = raw.shell_history_path {
        cfg.set_shell_history_path(Some(path.into()));
    }
    for pattern in raw.shell_exclude_patterns.into_iter().flatten() {
        cfg.add_shell_exclude_pattern(pattern).context("invalid shell exclude pattern")?;
    }
    for pattern in raw.file_exclude_patterns.into_iter().flatten() {
        cfg.add_file_exclude_pattern(pattern);
    }
    if let Some(extensions) = raw.file_allowed_extensions {
        cfg.set_file_allowed_extensions(Some(extensions));
    }
    if let Some(v) = raw.file_flush_interval_seconds {
        cfg.file_flush_interval = Duration::from_secs(v);
    }
    if let Some(browsers) = raw.enabled_browsers {
        let parsed: Vec<Browser> = browsers
            .iter()
            .filter_map(|b| Browser::ALL.iter().find(|candidate| candidate.as_str() == b).copied())
            .collect();
        cfg.set_enabled_browsers(parsed);
    }
    if let Some(domains) = raw.excluded_domains {
        cfg.set_excluded_domains(domains);
    }
    if let Some(v) = raw.browser_history_limit_days {
        cfg.set_browser_history_limit_days(v);
    }
    if let Some(roots) = raw.git_search_roots {
        cfg.git_search_roots = roots.into_iter().map(Into::into).collect();
    }
    if let Some(v) = raw.git_discovery_max_depth {
        cfg.git_discovery_max_depth = v;
    }
    if let Some(v) = raw.git_poll_max_commits {
        cfg.git_poll_max_commits = v;
    }

    Ok(cfg)
}
