//! Browser history tracker (§4.9).
//!
//! The browser's history SQLite file is held open by a write lock while the
//! browser runs, so it is copied to a scratch path and opened read-only
//! there (mirrors the storage boundary's single-`Connection` discipline,
//! just against a foreign schema instead of our own).

use crate::checkpoint::BrowserCheckpointStore;
use crate::config::{Browser, DaemonConfig};
use crate::error::{Result, TraqError};
use crate::platform::Platform;
use crate::storage::{NewBrowserVisit, Storage};
use rusqlite::Connection;
use std::sync::Arc;

/// Microseconds between the Windows/Chrome epoch (1601-01-01) and the Unix
/// epoch (1970-01-01).
const WEBKIT_EPOCH_OFFSET_US: i64 = 11_644_473_600_000_000;

pub struct BrowserTracker {
    platform: Arc<dyn Platform>,
    storage: Arc<Storage>,
    checkpoint: BrowserCheckpointStore,
}

struct RawVisit {
    timestamp: i64,
    url: String,
    title: String,
    visit_duration_seconds: Option<i64>,
}

impl BrowserTracker {
    pub fn new(platform: Arc<dyn Platform>, storage: Arc<Storage>, checkpoint: BrowserCheckpointStore) -> Self {
        Self {
            platform,
            storage,
            checkpoint,
        }
    }

    pub fn poll(&mut self, session_id: i64, config: &DaemonConfig) -> Result<Vec<NewBrowserVisit>> {
        let paths = self.platform.get_browser_history_paths();
        let mut inserted = Vec::new();

        for browser in &config.enabled_browsers {
            let Some(path) = paths.get(browser) else {
                continue;
            };
            if !path.exists() {
                continue;
            }

            let tmp = tempfile::Builder::new()
                .prefix("traq-history-")
                .suffix(".sqlite")
                .tempfile()
                .map_err(|e| TraqError::ForeignDb(format!("failed to create scratch copy: {e}")))?;
            std::fs::copy(path, tmp.path())
                .map_err(|e| TraqError::ForeignDb(format!("failed to copy {path:?}: {e}")))?;

            let conn = Connection::open(tmp.path())
                .map_err(|e| TraqError::ForeignDb(format!("failed to open history copy: {e}")))?;

            let since = self.checkpoint.last_timestamp(browser.as_str());
            let horizon = if config.browser_history_limit_days > 0 {
                now() - config.browser_history_limit_days as i64 * 86_400
            } else {
                0
            };
            let floor = since.max(horizon);

            let visits = if browser.is_chromium_family() {
                read_chromium_visits(&conn, floor)
            } else {
                read_firefox_visits(&conn, floor)
            }
            .map_err(|e| TraqError::ForeignDb(format!("query failed for {}: {e}", browser.as_str())))?;

            let mut max_ts = since;
            for visit in visits {
                let domain = extract_domain(&visit.url);
                if config.excluded_domains.iter().any(|d| domain.eq_ignore_ascii_case(d)) {
                    continue;
                }
                let row = NewBrowserVisit {
                    timestamp: visit.timestamp,
                    url: visit.url,
                    title: visit.title,
                    domain,
                    browser: browser.as_str().to_string(),
                    visit_duration_seconds: visit.visit_duration_seconds,
                    session_id,
                };
                if self.storage.insert_browser_visit(&row)? {
                    inserted.push(row);
                }
                max_ts = max_ts.max(visit.timestamp);
            }
            self.checkpoint.set_last_timestamp(browser.as_str(), max_ts)?;
        }

        Ok(inserted)
    }
}

fn read_chromium_visits(conn: &Connection, since: i64) -> rusqlite::Result<Vec<RawVisit>> {
    let since_webkit = (since * 1_000_000) + WEBKIT_EPOCH_OFFSET_US;
    let mut stmt = conn.prepare(
        "SELECT urls.url, urls.title, visits.visit_time, visits.visit_duration
         FROM visits JOIN urls ON visits.url = urls.id
         WHERE visits.visit_time > ?1
         ORDER BY visits.visit_time ASC
         LIMIT 1000",
    )?;
    let rows = stmt.query_map(rusqlite::params![since_webkit], |row| {
        let url: String = row.get(0)?;
        let title: Option<String> = row.get(1)?;
        let visit_time: i64 = row.get(2)?;
        let visit_duration_us: i64 = row.get(3)?;
        Ok(RawVisit {
            timestamp: (visit_time - WEBKIT_EPOCH_OFFSET_US) / 1_000_000,
            url,
            title: title.unwrap_or_default(),
            visit_duration_seconds: (visit_duration_us > 0).then_some(visit_duration_us / 1_000_000),
        })
    })?;
    rows.collect()
}

fn read_firefox_visits(conn: &Connection, since: i64) -> rusqlite::Result<Vec<RawVisit>> {
    let since_us = since * 1_000_000;
    let mut stmt = conn.prepare(
        "SELECT moz_places.url, moz_places.title, moz_historyvisits.visit_date
         FROM moz_historyvisits JOIN moz_places ON moz_historyvisits.place_id = moz_places.id
         WHERE moz_historyvisits.visit_date > ?1
         ORDER BY moz_historyvisits.visit_date ASC
         LIMIT 1000",
    )?;
    let rows = stmt.query_map(rusqlite::params![since_us], |row| {
        let url: String = row.get(0)?;
        let title: Option<String> = row.get(1)?;
        let visit_date: i64 = row.get(2)?;
        Ok(RawVisit {
            timestamp: visit_date / 1_000_000,
            url,
            title: title.unwrap_or_default(),
            visit_duration_seconds: None,
        })
    })?;
    rows.collect()
}

fn extract_domain(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme.split(['/', '?', '#']).next().unwrap_or(without_scheme);
    host.split('@').last().unwrap_or(host).to_string()
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_domain_strips_scheme_and_path() {
        assert_eq!(extract_domain("https://example.com/path?q=1"), "example.com");
        assert_eq!(extract_domain("http://user@sub.example.com"), "sub.example.com");
    }

    fn build_chromium_db(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE urls (id INTEGER PRIMARY KEY, url TEXT, title TEXT);
             CREATE TABLE visits (id INTEGER PRIMARY KEY, url INTEGER, visit_time INTEGER, visit_duration INTEGER);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO urls (id, url, title) VALUES (1, 'https://example.com', 'Example')",
            [],
        )
        .unwrap();
        let webkit_time = 1_700_000_000 * 1_000_000 + WEBKIT_EPOCH_OFFSET_US;
        conn.execute(
            "INSERT INTO visits (url, visit_time, visit_duration) VALUES (1, ?1, 45000000)",
            rusqlite::params![webkit_time],
        )
        .unwrap();
    }

    #[test]
    fn chromium_dedup_across_polls() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("History");
        build_chromium_db(&history_path);

        struct FixedPathPlatform(std::path::PathBuf);
        impl Platform for FixedPathPlatform {
            fn data_dir(&self) -> std::path::PathBuf {
                std::path::PathBuf::new()
            }
            fn config_dir(&self) -> std::path::PathBuf {
                std::path::PathBuf::new()
            }
            fn cache_dir(&self) -> std::path::PathBuf {
                std::path::PathBuf::new()
            }
            fn get_active_window(&self) -> Result<Option<crate::platform::WindowInfo>> {
                Ok(None)
            }
            fn get_last_input_time(&self) -> Result<std::time::SystemTime> {
                Ok(std::time::SystemTime::now())
            }
            fn get_shell_history_path(&self, _shell: crate::config::ShellType) -> Result<Option<std::path::PathBuf>> {
                Ok(None)
            }
            fn get_shell_type(&self) -> crate::config::ShellType {
                crate::config::ShellType::Bash
            }
            fn get_browser_history_paths(&self) -> std::collections::HashMap<Browser, std::path::PathBuf> {
                let mut map = std::collections::HashMap::new();
                map.insert(Browser::Chrome, self.0.clone());
                map
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

        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let session = storage.create_session(0).unwrap();
        let ckpt = BrowserCheckpointStore::load(dir.path().join("browser_checkpoint.json")).unwrap();
        let platform = Arc::new(FixedPathPlatform(history_path));
        let mut tracker = BrowserTracker::new(platform, Arc::clone(&storage), ckpt);

        let mut config = DaemonConfig::default();
        config.set_enabled_browsers(vec![Browser::Chrome]);

        let first = tracker.poll(session.id, &config).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].visit_duration_seconds, Some(45));
        let second = tracker.poll(session.id, &config).unwrap();
        assert_eq!(second.len(), 0);
        assert_eq!(storage.count("browser_visits").unwrap(), 1);
    }
}
