//! Filesystem change tracker (§4.8).
//!
//! Watch management and the create/modify/delete/rename vocabulary are built
//! on a synchronous queue drained on each daemon tick, collapsing same-path
//! events by priority across one flush interval rather than debouncing each
//! path on its own timer.

use crate::config::DaemonConfig;
use crate::error::{Result, TraqError};
use crate::storage::{NewFileEvent, Storage};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventPriority {
    Modify,
    Rename,
    Create,
    Delete,
}

fn priority(kind: &str) -> EventPriority {
    match kind {
        "delete" => EventPriority::Delete,
        "create" => EventPriority::Create,
        "rename" => EventPriority::Rename,
        _ => EventPriority::Modify,
    }
}

struct RawEvent {
    path: PathBuf,
    kind: &'static str,
    timestamp: i64,
    session_id: i64,
}

pub struct FileTracker {
    storage: Arc<Storage>,
    watcher: RecommendedWatcher,
    rx: Receiver<RawEvent>,
    watched: Mutex<Vec<PathBuf>>,
    session_id: Arc<Mutex<i64>>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl FileTracker {
    pub fn new(storage: Arc<Storage>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<RawEvent>();
        let session_id = Arc::new(Mutex::new(0));
        let session_for_cb = Arc::clone(&session_id);

        let watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
            let Ok(event) = res else { return };
            let Some(kind) = map_kind(&event.kind) else { return };
            // Session id captured at event-handling time, not at flush time
            // (so a session boundary crossed mid-flush does not relabel
            // already-observed events).
            let session_id = *session_for_cb.lock().unwrap_or_else(|e| e.into_inner());
            let timestamp = unix_now();
            for path in event.paths {
                let _ = tx.send(RawEvent {
                    path,
                    kind,
                    timestamp,
                    session_id,
                });
            }
        })
        .map_err(|e| TraqError::Config(format!("failed to create file watcher: {e}")))?;

        Ok(Self {
            storage,
            watcher,
            rx,
            watched: Mutex::new(Vec::new()),
            session_id,
        })
    }

    pub fn set_session_id(&self, session_id: i64) {
        *self.session_id.lock().unwrap_or_else(|e| e.into_inner()) = session_id;
    }

    pub fn watch(&self, path: &Path) -> Result<()> {
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| TraqError::Config(format!("failed to watch {path:?}: {e}")))?;
        self.watched.lock().unwrap_or_else(|e| e.into_inner()).push(path.to_path_buf());
        Ok(())
    }

    pub fn unwatch(&self, path: &Path) -> Result<()> {
        self.watcher
            .unwatch(path)
            .map_err(|e| TraqError::Config(format!("failed to unwatch {path:?}: {e}")))?;
        self.watched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|p| p != path);
        Ok(())
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drains the raw queue accumulated since the previous flush, collapses
    /// same-path events by priority (delete > create > rename > modify,
    /// ties broken by latest timestamp), applies exclude filtering, and
    /// persists the survivors (§4.8 "Flush").
    pub fn flush(&self, config: &DaemonConfig) -> Result<Vec<NewFileEvent>> {
        let exclude_patterns: Vec<Regex> = config
            .file_exclude_patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        let mut collapsed: HashMap<PathBuf, RawEvent> = HashMap::new();
        while let Ok(raw) = self.rx.try_recv() {
            match collapsed.get(&raw.path) {
                Some(existing)
                    if priority(existing.kind) > priority(raw.kind)
                        || (priority(existing.kind) == priority(raw.kind) && existing.timestamp >= raw.timestamp) => {}
                _ => {
                    collapsed.insert(raw.path.clone(), raw);
                }
            }
        }

        let mut inserted = Vec::new();
        for (path, raw) in collapsed {
            if is_excluded(&path, &exclude_patterns, config.file_allowed_extensions.as_deref()) {
                continue;
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let directory = path
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            let file_extension = path.extension().map(|e| e.to_string_lossy().to_string());
            let file_size_bytes = std::fs::metadata(&path).ok().map(|m| m.len() as i64);

            let event = NewFileEvent {
                timestamp: raw.timestamp,
                file_path: path.to_string_lossy().to_string(),
                file_name,
                directory,
                file_extension,
                file_size_bytes,
                event_type: raw.kind.to_string(),
                session_id: raw.session_id,
            };
            self.storage.insert_file_event(&event)?;
            inserted.push(event);
        }
        Ok(inserted)
    }
}

fn map_kind(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Create(_) => Some("create"),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some("rename"),
        // Permission-only changes (chmod) are ignored (§4.8).
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some("modify"),
        EventKind::Remove(_) => Some("delete"),
        _ => None,
    }
}

fn is_excluded(path: &Path, patterns: &[Regex], allowed_extensions: Option<&[String]>) -> bool {
    let path_str = path.to_string_lossy();
    if patterns.iter().any(|re| re.is_match(&path_str)) {
        return true;
    }
    if let Some(allowed) = allowed_extensions {
        let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase());
        return !ext.is_some_and(|e| allowed.iter().any(|a| a.to_lowercase() == e));
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if crate::config::DEFAULT_FILE_EXCLUDE_EXTENSIONS.contains(&ext) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_delete_over_create_over_rename_over_modify() {
        assert!(priority("delete") > priority("create"));
        assert!(priority("create") > priority("rename"));
        assert!(priority("rename") > priority("modify"));
    }

    #[test]
    fn permission_only_changes_are_ignored() {
        assert_eq!(
            map_kind(&EventKind::Modify(notify::event::ModifyKind::Metadata(
                notify::event::MetadataKind::Permissions
            ))),
            None
        );
        assert_eq!(
            map_kind(&EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content
            ))),
            Some("modify")
        );
    }

    #[test]
    fn default_excluded_extension_is_rejected() {
        let path = PathBuf::from("src/main.rs.swp");
        assert!(is_excluded(&path, &[], None));
    }

    #[test]
    fn allowed_extensions_reject_everything_else() {
        let allowed = vec!["rs".to_string()];
        assert!(!is_excluded(&PathBuf::from("a.rs"), &[], Some(&allowed)));
        assert!(is_excluded(&PathBuf::from("a.txt"), &[], Some(&allowed)));
    }

    #[test]
    fn flush_collapses_duplicate_events_for_same_path() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let session = storage.create_session(0).unwrap();
        let tracker = FileTracker::new(Arc::clone(&storage)).unwrap();
        tracker.set_session_id(session.id);

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("watched.txt");
        tracker.watch(dir.path()).unwrap();
        std::fs::write(&file_path, "hello").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(200));
        let config = DaemonConfig::default();
        let events = tracker.flush(&config).unwrap();
        assert!(events.iter().any(|e| e.file_path.contains("watched.txt")));
    }
}
