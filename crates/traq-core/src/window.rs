//! Window focus tracker (§4.4).
//!
//! The in-memory "current focus" bookkeeping accumulates one open interval
//! and finalizes it when focus moves on. A closing interval is only ever
//! persisted — never re-opened — so there is no cumulative metrics struct
//! to maintain.

use crate::platform::{Platform, WindowInfo};
use crate::storage::{NewWindowFocusEvent, Storage};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct OpenFocus {
    info: WindowInfo,
    start_time: i64,
    session_id: i64,
}

pub struct WindowTracker {
    platform: Arc<dyn Platform>,
    storage: Arc<Storage>,
    current: Option<OpenFocus>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl WindowTracker {
    pub fn new(platform: Arc<dyn Platform>, storage: Arc<Storage>) -> Self {
        Self {
            platform,
            storage,
            current: None,
        }
    }

    /// Returns the freshly-polled window (if any) and whether it differs
    /// from the cached focus by title OR app name.
    pub fn poll(&self) -> crate::error::Result<(Option<WindowInfo>, bool)> {
        let window = self.platform.get_active_window()?;
        let changed = match (&window, &self.current) {
            (Some(w), Some(cur)) => w.title != cur.info.title || w.app_name != cur.info.app_name,
            (Some(_), None) => true,
            (None, Some(_)) => true,
            (None, None) => false,
        };
        Ok((window, changed))
    }

    /// Closes the prior focus interval (persisting it if it lasted long
    /// enough) and opens a new one.
    pub fn record_focus_change(&mut self, new_info: Option<WindowInfo>, session_id: i64) -> crate::error::Result<()> {
        self.close_current(unix_now())?;
        self.current = new_info.map(|info| OpenFocus {
            info,
            start_time: unix_now(),
            session_id,
        });
        Ok(())
    }

    /// Closes the open interval without opening a new one (daemon shutdown).
    pub fn flush_current_focus(&mut self) -> crate::error::Result<()> {
        self.close_current(unix_now())
    }

    /// Rewrites the session id of the currently-open interval, without
    /// closing it.
    pub fn update_session_id(&mut self, session_id: i64) {
        if let Some(cur) = self.current.as_mut() {
            cur.session_id = session_id;
        }
    }

    /// The window info of the currently-open interval, if any — used to
    /// bind window metadata onto a screenshot row (§4.1 tick step 7).
    pub fn current_info(&self) -> Option<&WindowInfo> {
        self.current.as_ref().map(|c| &c.info)
    }

    fn close_current(&mut self, end_time: i64) -> crate::error::Result<()> {
        let Some(open) = self.current.take() else {
            return Ok(());
        };
        let duration = (end_time - open.start_time) as f64;
        // Shorter focuses are silently dropped (§4.4 duration policy).
        if duration < 1.0 {
            return Ok(());
        }
        self.storage.insert_window_focus_event(&NewWindowFocusEvent {
            app_name: open.info.app_name,
            window_title: open.info.title,
            window_class: open.info.class,
            start_time: open.start_time,
            end_time,
            duration_seconds: duration,
            session_id: open.session_id,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Browser, ShellType};
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct StubPlatform;
    impl Platform for StubPlatform {
        fn data_dir(&self) -> PathBuf {
            PathBuf::new()
        }
        fn config_dir(&self) -> PathBuf {
            PathBuf::new()
        }
        fn cache_dir(&self) -> PathBuf {
            PathBuf::new()
        }
        fn get_active_window(&self) -> crate::error::Result<Option<WindowInfo>> {
            Ok(None)
        }
        fn get_last_input_time(&self) -> crate::error::Result<SystemTime> {
            Ok(SystemTime::now())
        }
        fn get_shell_history_path(&self, _shell: ShellType) -> crate::error::Result<Option<PathBuf>> {
            Ok(None)
        }
        fn get_shell_type(&self) -> ShellType {
            ShellType::Bash
        }
        fn get_browser_history_paths(&self) -> HashMap<Browser, PathBuf> {
            HashMap::new()
        }
        fn open_url(&self, _url: &str) -> crate::error::Result<()> {
            Ok(())
        }
        fn show_notification(&self, _title: &str, _body: &str) -> crate::error::Result<()> {
            Ok(())
        }
        fn display_count(&self) -> crate::error::Result<usize> {
            Ok(1)
        }
        fn display_bounds(&self, _index: usize) -> crate::error::Result<crate::platform::DisplayBounds> {
            unreachable!()
        }
        fn capture_display(&self, _index: usize) -> crate::error::Result<crate::platform::CapturedFrame> {
            unreachable!()
        }
    }

    fn make_window(title: &str) -> WindowInfo {
        WindowInfo {
            title: title.into(),
            app_name: "App".into(),
            class: "cls".into(),
            pid: None,
            x: 0,
            y: 0,
            width: 100,
            height: 100,
            monitor: None,
        }
    }

    #[test]
    fn short_focus_is_dropped() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let session = storage.create_session(0).unwrap();
        let mut tracker = WindowTracker::new(Arc::new(StubPlatform), Arc::clone(&storage));

        tracker.record_focus_change(Some(make_window("A")), session.id).unwrap();
        // Immediately switch — interval is < 1s, must be dropped.
        tracker.record_focus_change(Some(make_window("B")), session.id).unwrap();

        assert_eq!(storage.count("window_focus_events").unwrap(), 0);
    }

    #[test]
    fn update_session_id_does_not_close_interval() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let session = storage.create_session(0).unwrap();
        let mut tracker = WindowTracker::new(Arc::new(StubPlatform), Arc::clone(&storage));
        tracker.record_focus_change(Some(make_window("A")), session.id).unwrap();
        tracker.update_session_id(session.id + 1);
        assert_eq!(storage.count("window_focus_events").unwrap(), 0);
    }
}
