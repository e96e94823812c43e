//! The storage boundary (§3, §4 "Storage boundary": 1% share but the single
//! consistency boundary every other subsystem writes through).
//!
//! One `rusqlite::Connection` guarded by a `Mutex`, matching §3's "Ownership"
//! paragraph: "every mutating operation is a self-contained idempotent
//! statement; no in-memory transactional coupling between components."
//! Dedup keys are enforced with `UNIQUE` constraints and `INSERT OR IGNORE`
//! rather than a read-then-write race.

use crate::error::{Result, TraqError};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: i64,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub screenshot_count: i64,
    pub summary_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AfkEvent {
    pub id: i64,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub session_id: i64,
    pub trigger_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScreenshotMeta {
    pub app_name: Option<String>,
    pub window_title: Option<String>,
    pub window_class: Option<String>,
    pub pid: Option<i64>,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub monitor_name: Option<String>,
    pub monitor_width: Option<i64>,
    pub monitor_height: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewWindowFocusEvent {
    pub app_name: String,
    pub window_title: String,
    pub window_class: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_seconds: f64,
    pub session_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewShellCommand {
    pub timestamp: i64,
    pub command: String,
    pub shell_type: String,
    pub duration_seconds: Option<f64>,
    pub hostname: String,
    pub session_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GitRepository {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub remote_url: Option<String>,
    pub last_scanned: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewGitCommit {
    pub repository_id: i64,
    pub hash: String,
    pub short_hash: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub subject: String,
    pub message: String,
    pub files_changed: i64,
    pub insertions: i64,
    pub deletions: i64,
    pub branch: String,
    pub session_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewFileEvent {
    pub timestamp: i64,
    pub file_path: String,
    pub file_name: String,
    pub directory: String,
    pub file_extension: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub event_type: String,
    pub session_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewBrowserVisit {
    pub timestamp: i64,
    pub url: String,
    pub title: String,
    pub domain: String,
    pub browser: String,
    pub visit_duration_seconds: Option<i64>,
    pub session_id: i64,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    duration_seconds INTEGER,
    screenshot_count INTEGER NOT NULL DEFAULT 0,
    summary_id INTEGER
);

CREATE TABLE IF NOT EXISTS afk_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    trigger_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS screenshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    thumbnail_path TEXT NOT NULL,
    hash TEXT NOT NULL,
    app_name TEXT,
    window_title TEXT,
    window_class TEXT,
    pid INTEGER,
    x INTEGER, y INTEGER, width INTEGER, height INTEGER,
    monitor_name TEXT,
    monitor_width INTEGER, monitor_height INTEGER,
    session_id INTEGER NOT NULL REFERENCES sessions(id)
);

CREATE TABLE IF NOT EXISTS window_focus_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_name TEXT NOT NULL,
    window_title TEXT NOT NULL,
    window_class TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    duration_seconds REAL NOT NULL,
    session_id INTEGER NOT NULL REFERENCES sessions(id)
);

CREATE TABLE IF NOT EXISTS shell_commands (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    command TEXT NOT NULL,
    shell_type TEXT NOT NULL,
    duration_seconds REAL,
    hostname TEXT NOT NULL,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    UNIQUE(timestamp, command)
);

CREATE TABLE IF NOT EXISTS git_repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    remote_url TEXT,
    last_scanned INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS git_commits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL REFERENCES git_repositories(id),
    hash TEXT NOT NULL,
    short_hash TEXT NOT NULL,
    author_name TEXT NOT NULL,
    author_email TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    subject TEXT NOT NULL,
    message TEXT NOT NULL,
    files_changed INTEGER NOT NULL,
    insertions INTEGER NOT NULL,
    deletions INTEGER NOT NULL,
    branch TEXT NOT NULL,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    UNIQUE(repository_id, hash)
);

CREATE TABLE IF NOT EXISTS file_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    directory TEXT NOT NULL,
    file_extension TEXT,
    file_size_bytes INTEGER,
    event_type TEXT NOT NULL,
    session_id INTEGER NOT NULL REFERENCES sessions(id)
);

CREATE TABLE IF NOT EXISTS browser_visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    domain TEXT NOT NULL,
    browser TEXT NOT NULL,
    visit_duration_seconds INTEGER,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    UNIQUE(timestamp, url, browser)
);
";

impl Storage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---------------------------- Sessions ----------------------------

    pub fn create_session(&self, start_time: i64) -> Result<Session> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (start_time, end_time, duration_seconds, screenshot_count) VALUES (?1, NULL, NULL, 0)",
            params![start_time],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Session {
            id,
            start_time,
            end_time: None,
            duration_seconds: None,
            screenshot_count: 0,
            summary_id: None,
        })
    }

    pub fn get_open_session(&self) -> Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, start_time, end_time, duration_seconds, screenshot_count, summary_id
             FROM sessions WHERE end_time IS NULL ORDER BY id DESC LIMIT 1",
            [],
            row_to_session,
        )
        .optional()
        .map_err(TraqError::from)
    }

    pub fn get_most_recently_ended_session(&self) -> Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, start_time, end_time, duration_seconds, screenshot_count, summary_id
             FROM sessions WHERE end_time IS NOT NULL ORDER BY end_time DESC LIMIT 1",
            [],
            row_to_session,
        )
        .optional()
        .map_err(TraqError::from)
    }

    /// Reopens a previously-closed session (§4.3 resume rule step 1).
    pub fn reopen_session(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET end_time = NULL, duration_seconds = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Closes a session; duration is clamped to zero, never stored negative
    /// (§4.3 close rule, §8 invariant).
    pub fn close_session(&self, id: i64, end_time: i64) -> Result<()> {
        let conn = self.lock();
        let start_time: i64 = conn.query_row(
            "SELECT start_time FROM sessions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let duration = (end_time - start_time).max(0);
        conn.execute(
            "UPDATE sessions SET end_time = ?2, duration_seconds = ?3 WHERE id = ?1",
            params![id, end_time, duration],
        )?;
        Ok(())
    }

    /// Force-closes any session with a null `end_time` older than `horizon`
    /// seconds relative to `now` (§4.1 start sequence step 2, "orphaned").
    pub fn close_orphan_sessions(&self, now: i64, horizon_seconds: i64) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, start_time FROM sessions WHERE end_time IS NULL AND start_time < ?1",
        )?;
        let cutoff = now - horizon_seconds;
        let rows: Vec<(i64, i64)> = stmt
            .query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        let mut closed = Vec::new();
        for (id, start_time) in rows {
            let duration = (now - start_time).max(0);
            conn.execute(
                "UPDATE sessions SET end_time = ?2, duration_seconds = ?3 WHERE id = ?1",
                params![id, now, duration],
            )?;
            closed.push(id);
        }
        Ok(closed)
    }

    pub fn increment_screenshot_count(&self, session_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET screenshot_count = screenshot_count + 1 WHERE id = ?1",
            params![session_id],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, start_time, end_time, duration_seconds, screenshot_count, summary_id
             FROM sessions WHERE id = ?1",
            params![id],
            row_to_session,
        )
        .optional()
        .map_err(TraqError::from)
    }

    // ---------------------------- AFK events ----------------------------

    pub fn create_afk_event(&self, start_time: i64, session_id: i64, trigger_type: &str) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO afk_events (start_time, end_time, session_id, trigger_type) VALUES (?1, NULL, ?2, ?3)",
            params![start_time, session_id, trigger_type],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn close_afk_event(&self, id: i64, end_time: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE afk_events SET end_time = ?2 WHERE id = ?1",
            params![id, end_time],
        )?;
        Ok(())
    }

    pub fn get_open_afk_event(&self) -> Result<Option<AfkEvent>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, start_time, end_time, session_id, trigger_type FROM afk_events
             WHERE end_time IS NULL ORDER BY id DESC LIMIT 1",
            [],
            row_to_afk_event,
        )
        .optional()
        .map_err(TraqError::from)
    }

    /// Unconditional orphan recovery (§3 "On daemon start, any AFK event
    /// with null end_time is closed to the current wall-clock time").
    pub fn close_orphan_afk_events(&self, now: i64) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id FROM afk_events WHERE end_time IS NULL")?;
        let ids: Vec<i64> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        for id in &ids {
            conn.execute(
                "UPDATE afk_events SET end_time = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }
        Ok(ids)
    }

    // ---------------------------- Screenshots ----------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_screenshot(
        &self,
        timestamp: i64,
        file_path: &str,
        thumbnail_path: &str,
        hash: &str,
        meta: &ScreenshotMeta,
        session_id: i64,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO screenshots (timestamp, file_path, thumbnail_path, hash, app_name, window_title,
                window_class, pid, x, y, width, height, monitor_name, monitor_width, monitor_height, session_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                timestamp,
                file_path,
                thumbnail_path,
                hash,
                meta.app_name,
                meta.window_title,
                meta.window_class,
                meta.pid,
                meta.x,
                meta.y,
                meta.width,
                meta.height,
                meta.monitor_name,
                meta.monitor_width,
                meta.monitor_height,
                session_id,
            ],
        )?;
        drop(conn);
        self.increment_screenshot_count(session_id)?;
        Ok(self.lock().last_insert_rowid())
    }

    // ---------------------------- Window focus ----------------------------

    pub fn insert_window_focus_event(&self, event: &NewWindowFocusEvent) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO window_focus_events (app_name, window_title, window_class, start_time, end_time, duration_seconds, session_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                event.app_name,
                event.window_title,
                event.window_class,
                event.start_time,
                event.end_time,
                event.duration_seconds,
                event.session_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ---------------------------- Shell commands ----------------------------

    /// Returns `true` if a new row was inserted (dedup on (timestamp, command)).
    pub fn insert_shell_command(&self, cmd: &NewShellCommand) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO shell_commands (timestamp, command, shell_type, duration_seconds, hostname, session_id)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                cmd.timestamp,
                cmd.command,
                cmd.shell_type,
                cmd.duration_seconds,
                cmd.hostname,
                cmd.session_id,
            ],
        )?;
        Ok(changed > 0)
    }

    // ---------------------------- Git repositories ----------------------------

    pub fn find_git_repository_by_path(&self, path: &str) -> Result<Option<GitRepository>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, path, name, remote_url, last_scanned, is_active FROM git_repositories WHERE path = ?1",
            params![path],
            row_to_git_repo,
        )
        .optional()
        .map_err(TraqError::from)
    }

    pub fn register_git_repository(&self, path: &str, name: &str, remote_url: Option<&str>) -> Result<GitRepository> {
        if let Some(existing) = self.find_git_repository_by_path(path)? {
            return Ok(existing);
        }
        let conn = self.lock();
        conn.execute(
            "INSERT INTO git_repositories (path, name, remote_url, last_scanned, is_active) VALUES (?1,?2,?3,NULL,1)",
            params![path, name, remote_url],
        )?;
        let id = conn.last_insert_rowid();
        Ok(GitRepository {
            id,
            path: path.to_string(),
            name: name.to_string(),
            remote_url: remote_url.map(str::to_string),
            last_scanned: None,
            is_active: true,
        })
    }

    pub fn unregister_git_repository(&self, path: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE git_repositories SET is_active = 0 WHERE path = ?1",
            params![path],
        )?;
        Ok(())
    }

    pub fn list_active_git_repositories(&self) -> Result<Vec<GitRepository>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, path, name, remote_url, last_scanned, is_active FROM git_repositories WHERE is_active = 1",
        )?;
        let rows = stmt
            .query_map([], row_to_git_repo)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_all_git_repository_paths(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT path FROM git_repositories")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_git_repository_scan(&self, id: i64, last_scanned: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE git_repositories SET last_scanned = ?2 WHERE id = ?1",
            params![id, last_scanned],
        )?;
        Ok(())
    }

    // ---------------------------- Git commits ----------------------------

    /// Returns `true` if a new row was inserted (dedup on (repository_id, hash)).
    pub fn insert_git_commit(&self, commit: &NewGitCommit) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO git_commits
             (repository_id, hash, short_hash, author_name, author_email, timestamp, subject, message,
              files_changed, insertions, deletions, branch, session_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                commit.repository_id,
                commit.hash,
                commit.short_hash,
                commit.author_name,
                commit.author_email,
                commit.timestamp,
                commit.subject,
                commit.message,
                commit.files_changed,
                commit.insertions,
                commit.deletions,
                commit.branch,
                commit.session_id,
            ],
        )?;
        Ok(changed > 0)
    }

    // ---------------------------- File events ----------------------------

    pub fn insert_file_event(&self, event: &NewFileEvent) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO file_events (timestamp, file_path, file_name, directory, file_extension, file_size_bytes, event_type, session_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                event.timestamp,
                event.file_path,
                event.file_name,
                event.directory,
                event.file_extension,
                event.file_size_bytes,
                event.event_type,
                event.session_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ---------------------------- Browser visits ----------------------------

    /// Returns `true` if a new row was inserted (dedup on (timestamp, url, browser)).
    pub fn insert_browser_visit(&self, visit: &NewBrowserVisit) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO browser_visits (timestamp, url, title, domain, browser, visit_duration_seconds, session_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                visit.timestamp,
                visit.url,
                visit.title,
                visit.domain,
                visit.browser,
                visit.visit_duration_seconds,
                visit.session_id,
            ],
        )?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub fn count(&self, table: &str) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(TraqError::from)
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        duration_seconds: row.get(3)?,
        screenshot_count: row.get(4)?,
        summary_id: row.get(5)?,
    })
}

fn row_to_afk_event(row: &rusqlite::Row) -> rusqlite::Result<AfkEvent> {
    Ok(AfkEvent {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        session_id: row.get(3)?,
        trigger_type: row.get(4)?,
    })
}

fn row_to_git_repo(row: &rusqlite::Row) -> rusqlite::Result<GitRepository> {
    Ok(GitRepository {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        remote_url: row.get(3)?,
        last_scanned: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lifecycle_duration_non_negative() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.create_session(0).unwrap();
        storage.close_session(session.id, 500).unwrap();
        let reloaded = storage.get_session(session.id).unwrap().unwrap();
        assert_eq!(reloaded.duration_seconds, Some(500));

        // Clock skew: end_time before start_time must clamp to zero.
        let session2 = storage.create_session(1000).unwrap();
        storage.close_session(session2.id, 900).unwrap();
        let reloaded2 = storage.get_session(session2.id).unwrap().unwrap();
        assert_eq!(reloaded2.duration_seconds, Some(0));
    }

    #[test]
    fn only_one_open_session_at_a_time() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(storage.get_open_session().unwrap().is_none());
        let s1 = storage.create_session(0).unwrap();
        assert_eq!(storage.get_open_session().unwrap().unwrap().id, s1.id);
    }

    #[test]
    fn orphan_sessions_closed_after_horizon() {
        let storage = Storage::open_in_memory().unwrap();
        let old = storage.create_session(0).unwrap();
        let recent = storage.create_session(100_000).unwrap();
        let now = 13 * 3600; // 13h after old session started
        let closed = storage.close_orphan_sessions(now, 12 * 3600).unwrap();
        assert_eq!(closed, vec![old.id]);
        assert!(storage.get_session(old.id).unwrap().unwrap().end_time.is_some());
        assert!(storage.get_session(recent.id).unwrap().unwrap().end_time.is_none());
    }

    #[test]
    fn shell_command_dedup() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.create_session(0).unwrap();
        let cmd = NewShellCommand {
            timestamp: 1,
            command: "echo hi".into(),
            shell_type: "bash".into(),
            duration_seconds: None,
            hostname: "host".into(),
            session_id: session.id,
        };
        assert!(storage.insert_shell_command(&cmd).unwrap());
        assert!(!storage.insert_shell_command(&cmd).unwrap());
        assert_eq!(storage.count("shell_commands").unwrap(), 1);
    }

    #[test]
    fn git_commit_dedup_per_repo() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.create_session(0).unwrap();
        let repo = storage.register_git_repository("/repo", "repo", None).unwrap();
        let commit = NewGitCommit {
            repository_id: repo.id,
            hash: "a".repeat(40),
            short_hash: "a".repeat(7),
            author_name: "Test".into(),
            author_email: "t@example.com".into(),
            timestamp: 1,
            subject: "subject".into(),
            message: "subject".into(),
            files_changed: 1,
            insertions: 3,
            deletions: 0,
            branch: "main".into(),
            session_id: session.id,
        };
        assert!(storage.insert_git_commit(&commit).unwrap());
        assert!(!storage.insert_git_commit(&commit).unwrap());
        assert_eq!(storage.count("git_commits").unwrap(), 1);
    }

    #[test]
    fn browser_visit_dedup() {
        let storage = Storage::open_in_memory().unwrap();
        let session = storage.create_session(0).unwrap();
        let visit = NewBrowserVisit {
            timestamp: 1,
            url: "https://example.com".into(),
            title: "Example".into(),
            domain: "example.com".into(),
            browser: "chrome".into(),
            visit_duration_seconds: None,
            session_id: session.id,
        };
        assert!(storage.insert_browser_visit(&visit).unwrap());
        assert!(!storage.insert_browser_visit(&visit).unwrap());
        assert_eq!(storage.count("browser_visits").unwrap(), 1);
    }

    #[test]
    fn register_git_repository_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let first = storage.register_git_repository("/repo", "repo", None).unwrap();
        let second = storage.register_git_repository("/repo", "repo", None).unwrap();
        assert_eq!(first.id, second.id);
    }
}
