//! Shell history tracker (§4.6).

use crate::checkpoint::ShellCheckpointStore;
use crate::config::{builtin_secret_pattern, DaemonConfig, ShellType, ShellTypeOption, TRIVIAL_COMMANDS};
use crate::error::Result;
use crate::platform::Platform;
use crate::storage::{NewShellCommand, Storage};
use regex::Regex;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

struct ParsedCommand {
    timestamp: i64,
    command: String,
    duration_seconds: Option<f64>,
}

pub struct ShellTracker {
    platform: Arc<dyn Platform>,
    storage: Arc<Storage>,
    checkpoint: ShellCheckpointStore,
    user_patterns: Vec<Regex>,
    secret_pattern: Regex,
}

impl ShellTracker {
    pub fn new(platform: Arc<dyn Platform>, storage: Arc<Storage>, checkpoint: ShellCheckpointStore) -> Self {
        Self {
            platform,
            storage,
            checkpoint,
            user_patterns: Vec::new(),
            secret_pattern: builtin_secret_pattern(),
        }
    }

    pub fn set_user_exclude_patterns(&mut self, patterns: &[String]) -> Result<()> {
        self.user_patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| crate::error::TraqError::Config(format!("invalid shell exclude pattern: {e}")))?;
        Ok(())
    }

    fn resolve_dialect_and_path(&self, config: &DaemonConfig) -> Result<Option<(ShellType, PathBuf)>> {
        let dialect = match config.shell_type {
            ShellTypeOption::Auto => self.platform.get_shell_type(),
            ShellTypeOption::Bash => ShellType::Bash,
            ShellTypeOption::Zsh => ShellType::Zsh,
            ShellTypeOption::Fish => ShellType::Fish,
        };
        let path = match &config.shell_history_path {
            Some(p) => Some(p.clone()),
            None => self.platform.get_shell_history_path(dialect)?,
        };
        Ok(path.map(|p| (dialect, p)))
    }

    fn is_excluded(&self, command: &str) -> bool {
        if self.secret_pattern.is_match(command) {
            return true;
        }
        if TRIVIAL_COMMANDS.contains(&command.trim()) {
            return true;
        }
        self.user_patterns.iter().any(|re| re.is_match(command))
    }

    /// Reads newly-appended commands and persists them, tagged with
    /// `session_id`. Returns the rows actually inserted.
    pub fn poll(&mut self, session_id: i64, config: &DaemonConfig) -> Result<Vec<NewShellCommand>> {
        self.set_user_exclude_patterns(&config.shell_exclude_patterns)?;

        let Some((dialect, path)) = self.resolve_dialect_and_path(config)? else {
            return Ok(Vec::new());
        };
        let path_str = path.to_string_lossy().to_string();

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => return Ok(Vec::new()),
        };
        let size = metadata.len();
        let mut offset = self.checkpoint.offset(&path_str);

        // Rotation/truncation: next poll re-parses from offset 0 (§4.6, §8).
        if size < offset {
            offset = 0;
        }

        let mut file = std::fs::File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;

        let parsed = match dialect {
            ShellType::Bash => parse_bash(&buf),
            ShellType::Zsh => parse_zsh(&buf),
            ShellType::Fish => parse_fish(&buf),
            ShellType::PowerShell => Vec::new(),
        };

        let hostname = hostname_string();
        let mut inserted = Vec::new();
        for p in parsed {
            if self.is_excluded(&p.command) {
                continue;
            }
            let row = NewShellCommand {
                timestamp: p.timestamp,
                command: p.command,
                shell_type: dialect_str(dialect).to_string(),
                duration_seconds: p.duration_seconds.filter(|d| *d > 0.0),
                hostname: hostname.clone(),
                session_id,
            };
            if self.storage.insert_shell_command(&row)? {
                inserted.push(row);
            }
        }

        self.checkpoint.set_offset(&path_str, size)?;
        Ok(inserted)
    }
}

fn dialect_str(shell: ShellType) -> &'static str {
    match shell {
        ShellType::Bash => "bash",
        ShellType::Zsh => "zsh",
        ShellType::Fish => "fish",
        ShellType::PowerShell => "powershell",
    }
}

fn hostname_string() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// `#<ts>` sets a pending timestamp; the next non-`#` line is the command
/// (§4.6 "Bash").
fn parse_bash(buf: &str) -> Vec<ParsedCommand> {
    let mut out = Vec::new();
    let mut pending_ts: Option<i64> = None;
    for line in buf.lines() {
        if let Some(rest) = line.strip_prefix('#') {
            if let Ok(ts) = rest.trim().parse::<i64>() {
                pending_ts = Some(ts);
                continue;
            }
        }
        if line.trim().is_empty() {
            continue;
        }
        out.push(ParsedCommand {
            timestamp: pending_ts.take().unwrap_or_else(now),
            command: line.to_string(),
            duration_seconds: None,
        });
    }
    out
}

/// `: <ts>:<duration>;<command>` (§4.6 "Zsh"). Duration is stored only if
/// greater than zero (§4.6, §8).
fn parse_zsh(buf: &str) -> Vec<ParsedCommand> {
    let mut out = Vec::new();
    for line in buf.lines() {
        let Some(rest) = line.strip_prefix(": ") else {
            continue;
        };
        let Some((meta, command)) = rest.split_once(';') else {
            continue;
        };
        let Some((ts_str, dur_str)) = meta.split_once(':') else {
            continue;
        };
        let Ok(ts) = ts_str.trim().parse::<i64>() else {
            continue;
        };
        let duration_seconds = dur_str.trim().parse::<f64>().ok();
        out.push(ParsedCommand {
            timestamp: ts,
            command: command.to_string(),
            duration_seconds,
        });
    }
    out
}

/// `- cmd: <command>` / `  when: <ts>` blocks (§4.6 "Fish"); `paths:` lines
/// are ignored.
fn parse_fish(buf: &str) -> Vec<ParsedCommand> {
    let mut out = Vec::new();
    let mut pending_cmd: Option<String> = None;
    for line in buf.lines() {
        let trimmed = line.trim_start();
        if let Some(cmd) = trimmed.strip_prefix("- cmd: ") {
            if let Some(cmd) = pending_cmd.take() {
                out.push(ParsedCommand {
                    timestamp: now(),
                    command: cmd,
                    duration_seconds: None,
                });
            }
            pending_cmd = Some(cmd.to_string());
        } else if let Some(ts_str) = trimmed.strip_prefix("when: ") {
            if let (Some(cmd), Ok(ts)) = (pending_cmd.take(), ts_str.trim().parse::<i64>()) {
                out.push(ParsedCommand {
                    timestamp: ts,
                    command: cmd,
                    duration_seconds: None,
                });
            }
        }
    }
    if let Some(cmd) = pending_cmd.take() {
        out.push(ParsedCommand {
            timestamp: now(),
            command: cmd,
            duration_seconds: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_pairs_timestamp_with_next_command() {
        let buf = "#1690000000\nls -la\n#1690000010\ncargo build\n";
        let parsed = parse_bash(buf);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].timestamp, 1690000000);
        assert_eq!(parsed[0].command, "ls -la");
        assert_eq!(parsed[1].command, "cargo build");
    }

    #[test]
    fn zsh_parses_timestamp_and_command() {
        let buf = ": 1690000000:0;git status\n";
        let parsed = parse_zsh(buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].timestamp, 1690000000);
        assert_eq!(parsed[0].command, "git status");
        assert_eq!(parsed[0].duration_seconds, Some(0.0));
    }

    #[test]
    fn zsh_nonzero_duration_is_carried() {
        let buf = ": 1690000000:12;cargo build --release\n";
        let parsed = parse_zsh(buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].duration_seconds, Some(12.0));
    }

    struct NoopPlatform;
    impl Platform for NoopPlatform {
        fn data_dir(&self) -> PathBuf {
            PathBuf::new()
        }
        fn config_dir(&self) -> PathBuf {
            PathBuf::new()
        }
        fn cache_dir(&self) -> PathBuf {
            PathBuf::new()
        }
        fn get_active_window(&self) -> Result<Option<crate::platform::WindowInfo>> {
            Ok(None)
        }
        fn get_last_input_time(&self) -> Result<std::time::SystemTime> {
            Ok(std::time::SystemTime::now())
        }
        fn get_shell_history_path(&self, _shell: ShellType) -> Result<Option<PathBuf>> {
            Ok(None)
        }
        fn get_shell_type(&self) -> ShellType {
            ShellType::Bash
        }
        fn get_browser_history_paths(&self) -> std::collections::HashMap<crate::config::Browser, PathBuf> {
            std::collections::HashMap::new()
        }
        fn open_url(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        fn show_notification(&self, _title: &str, _body: &str) -> Result<()> {
            Ok(())
        }
        fn display_count(&self) -> Result<usize> {
            Ok(1)
        }
        fn display_bounds(&self, _index: usize) -> Result<crate::platform::DisplayBounds> {
            unreachable!()
        }
        fn capture_display(&self, _index: usize) -> Result<crate::platform::CapturedFrame> {
            unreachable!()
        }
    }

    #[test]
    fn poll_applies_user_exclude_patterns_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("bash_history");
        std::fs::write(&history_path, "#1690000000\nls -la\n#1690000010\nnuke-prod --force\n").unwrap();

        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let session = storage.create_session(0).unwrap();
        let checkpoint =
            ShellCheckpointStore::load(dir.path().join("shell_checkpoint.json")).unwrap();
        let platform: Arc<dyn Platform> = Arc::new(NoopPlatform);
        let mut tracker = ShellTracker::new(platform, Arc::clone(&storage), checkpoint);

        let mut config = DaemonConfig::default();
        config.shell_history_path = Some(history_path);
        config.shell_type = ShellTypeOption::Bash;
        config.shell_exclude_patterns = vec!["nuke-prod".to_string()];

        let inserted = tracker.poll(session.id, &config).unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].command, "ls -la");
    }

    #[test]
    fn fish_parses_cmd_and_when_block() {
        let buf = "- cmd: cargo test\n  when: 1690000000\n";
        let parsed = parse_fish(buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].command, "cargo test");
        assert_eq!(parsed[0].timestamp, 1690000000);
    }

    #[test]
    fn builtin_patterns_exclude_secrets_and_trivial_commands() {
        let secret_pattern = builtin_secret_pattern();
        assert!(secret_pattern.is_match("export API_KEY=abcd"));
        assert!(secret_pattern.is_match("login --password hunter2"));
        assert!(TRIVIAL_COMMANDS.contains(&"ls"));
        assert!(!secret_pattern.is_match("cargo build --release"));
    }
}
