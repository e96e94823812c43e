//! Daemon orchestrator (§4.1).
//!
//! One `RwLock` guards the small pieces of state `start`/`stop`/`pause`/
//! `resume`/`update_config` need exclusively and `is_running`/`is_paused`/
//! `get_status` need only to read; every subsystem keeps its own internal
//! lock, matching §4.1's concurrency notes: narrow, short-held locks over
//! one coarse mutex around the whole daemon.

use crate::afk::{AfkDetector, AfkObserver};
use crate::capture::ScreenCapture;
use crate::checkpoint::{BrowserCheckpointStore, GitCheckpointStore, ShellCheckpointStore};
use crate::config::DaemonConfig;
use crate::error::Result;
use crate::platform::Platform;
use crate::protocol::StatusReport;
use crate::session::SessionManager;
use crate::storage::{ScreenshotMeta, Storage};
use crate::trackers::{BrowserTracker, FileTracker, GitTracker, ShellTracker};
use crate::window::WindowTracker;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tracing::{error, info, warn};

/// Twelve hours: the horizon past which a never-closed session from a
/// previous crash/reboot is force-closed at startup instead of resumed
/// (§4.1 start sequence step 2).
const ORPHAN_SESSION_HORIZON_SECONDS: i64 = 12 * 3600;

struct DaemonState {
    running: bool,
    paused: bool,
    config: DaemonConfig,
}

struct SessionAfkObserver {
    storage: Arc<Storage>,
    session: Arc<Mutex<SessionManager>>,
    open_afk_event: Mutex<Option<i64>>,
}

fn to_unix(t: SystemTime) -> i64 {
    t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

impl AfkObserver for SessionAfkObserver {
    fn on_afk(&self, afk_start: SystemTime) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let session_id = session.get_current_session().map(|s| s.id);
        let afk_start_unix = to_unix(afk_start);
        if let Some(session_id) = session_id {
            match self.storage.create_afk_event(afk_start_unix, session_id, "idle") {
                Ok(id) => *self.open_afk_event.lock().unwrap_or_else(|e| e.into_inner()) = Some(id),
                Err(e) => warn!("failed to record afk event: {e}"),
            }
        }
        if let Err(e) = session.handle_afk(afk_start_unix) {
            warn!("failed to end session on afk transition: {e}");
        }
    }

    fn on_return(&self, now: SystemTime) {
        let now_unix = to_unix(now);
        if let Some(id) = self.open_afk_event.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if let Err(e) = self.storage.close_afk_event(id, now_unix) {
                warn!("failed to close afk event: {e}");
            }
        }
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = session.handle_return(now_unix) {
            warn!("failed to start session on return: {e}");
        }
    }
}

pub struct Daemon {
    platform: Arc<dyn Platform>,
    storage: Arc<Storage>,
    state: RwLock<DaemonState>,
    afk: Mutex<AfkDetector>,
    session: Arc<Mutex<SessionManager>>,
    window: Mutex<WindowTracker>,
    capture: Mutex<ScreenCapture>,
    last_hash: Mutex<Option<String>>,
    shell: Mutex<ShellTracker>,
    git: Mutex<GitTracker>,
    browser: Mutex<BrowserTracker>,
    file: Arc<FileTracker>,
}

impl Daemon {
    pub fn new(platform: Arc<dyn Platform>, storage: Arc<Storage>, data_dir: PathBuf, config: DaemonConfig) -> Result<Self> {
        let session = Arc::new(Mutex::new(SessionManager::new(Arc::clone(&storage))));
        {
            let mut guard = session.lock().unwrap();
            guard.set_resume_window(config.resume_window);
            guard.set_min_duration(config.min_session_duration);
        }

        let mut afk = AfkDetector::new(Arc::clone(&platform), config.afk_timeout);
        afk.set_callbacks(Arc::new(SessionAfkObserver {
            storage: Arc::clone(&storage),
            session: Arc::clone(&session),
            open_afk_event: Mutex::new(None),
        }));

        let shell = ShellTracker::new(
            Arc::clone(&platform),
            Arc::clone(&storage),
            ShellCheckpointStore::load(data_dir.join("shell_checkpoint.json"))?,
        );
        let git = GitTracker::new(
            Arc::clone(&storage),
            GitCheckpointStore::load(data_dir.join("git_checkpoint.json"))?,
        );
        let browser = BrowserTracker::new(
            Arc::clone(&platform),
            Arc::clone(&storage),
            BrowserCheckpointStore::load(data_dir.join("browser_checkpoint.json"))?,
        );
        let file = Arc::new(FileTracker::new(Arc::clone(&storage))?);
        let capture = ScreenCapture::new(Arc::clone(&platform), data_dir.clone(), config.quality, config.thumbnail_width);
        let window = WindowTracker::new(Arc::clone(&platform), Arc::clone(&storage));

        Ok(Self {
            platform,
            storage,
            state: RwLock::new(DaemonState {
                running: false,
                paused: false,
                config,
            }),
            afk: Mutex::new(afk),
            session,
            window: Mutex::new(window),
            capture: Mutex::new(capture),
            last_hash: Mutex::new(None),
            shell: Mutex::new(shell),
            git: Mutex::new(git),
            browser: Mutex::new(browser),
            file,
        })
    }

    /// §4.1 "Start sequence".
    pub fn start(&self) -> Result<()> {
        let now = unix_now();
        let closed_afk = self.storage.close_orphan_afk_events(now)?;
        if !closed_afk.is_empty() {
            info!("closed {} orphan afk event(s) at startup", closed_afk.len());
        }
        let closed_sessions = self.storage.close_orphan_sessions(now, ORPHAN_SESSION_HORIZON_SECONDS)?;
        if !closed_sessions.is_empty() {
            info!("closed {} orphan session(s) at startup", closed_sessions.len());
        }

        let session_id = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.ensure_session(now)?.id
        };
        self.file.set_session_id(session_id);

        self.state.write().unwrap_or_else(|e| e.into_inner()).running = true;
        Ok(())
    }

    /// §4.1 "Stop sequence".
    pub fn stop(&self) -> Result<()> {
        self.window.lock().unwrap_or_else(|e| e.into_inner()).flush_current_focus()?;
        let now = unix_now();
        self.session.lock().unwrap_or_else(|e| e.into_inner()).end_session(now)?;
        self.state.write().unwrap_or_else(|e| e.into_inner()).running = false;
        Ok(())
    }

    pub fn pause(&self) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).paused = true;
    }

    pub fn resume(&self) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).paused = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).running
    }

    pub fn is_paused(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).paused
    }

    pub fn get_status(&self) -> StatusReport {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let afk = self.afk.lock().unwrap_or_else(|e| e.into_inner());
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let now = unix_now();
        StatusReport {
            running: state.running,
            paused: state.paused,
            is_afk: afk.is_afk(),
            current_session: session.get_current_session().map(|s| s.id),
            session_duration_seconds: session.get_session_duration(now),
            idle_duration_seconds: afk.get_idle_duration().as_secs() as i64,
        }
    }

    /// §4.1 "Tick". A single pass; not reentrant (the tick task is driven
    /// serially by the binary's scheduler, never concurrently).
    pub fn tick(&self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        let mut afk = self.afk.lock().unwrap_or_else(|e| e.into_inner());
        if afk.poll() {
            return Ok(());
        }
        let currently_afk = afk.is_afk();
        drop(afk);
        if currently_afk {
            return Ok(());
        }

        if self.is_paused() {
            return Ok(());
        }

        let now = unix_now();
        let session_id = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.ensure_session(now)?.id
        };
        self.file.set_session_id(session_id);

        {
            let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            match window.poll() {
                Ok((info, changed)) => {
                    if changed {
                        if let Err(e) = window.record_focus_change(info, session_id) {
                            warn!("failed to record focus change: {e}");
                        }
                    } else {
                        window.update_session_id(session_id);
                    }
                }
                Err(e) => warn!("failed to poll active window: {e}"),
            }
        }

        if let Err(e) = self.capture_if_due(session_id) {
            warn!("screenshot capture failed: {e}");
        }

        let config = self.state.read().unwrap_or_else(|e| e.into_inner()).config.clone();
        if let Err(e) = self.shell.lock().unwrap_or_else(|e| e.into_inner()).poll(session_id, &config) {
            warn!("shell poller failed: {e}");
        }
        if let Err(e) = self.git.lock().unwrap_or_else(|e| e.into_inner()).poll(session_id, &config) {
            warn!("git poller failed: {e}");
        }
        if let Err(e) = self.browser.lock().unwrap_or_else(|e| e.into_inner()).poll(session_id, &config) {
            warn!("browser poller failed: {e}");
        }

        Ok(())
    }

    pub fn force_capture(&self) -> Result<()> {
        let session_id = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.ensure_session(unix_now())?.id
        };
        self.capture_one(session_id)
    }

    fn capture_if_due(&self, session_id: i64) -> Result<()> {
        self.capture_one(session_id)
    }

    /// §4.1 tick step 6-7: resolve the monitor, capture, dedup by dHash.
    fn capture_one(&self, session_id: i64) -> Result<()> {
        let config = self.state.read().unwrap_or_else(|e| e.into_inner()).config.clone();
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        let focused = window.current_info().cloned();
        drop(window);

        let capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
        let monitor_index = capture.resolve_monitor_index(config.monitor_mode, config.monitor_index, focused.as_ref());
        let explicit_index = matches!(config.monitor_mode, crate::config::MonitorMode::Specific);
        let result = capture.capture(monitor_index, explicit_index)?;

        let mut last_hash = self.last_hash.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = last_hash.as_ref() {
            if crate::capture::are_similar(prev, &result.hash, config.duplicate_threshold) {
                capture.discard(&result);
                return Ok(());
            }
        }
        *last_hash = Some(result.hash.clone());
        drop(last_hash);

        let meta = ScreenshotMeta {
            app_name: focused.as_ref().map(|w| w.app_name.clone()),
            window_title: focused.as_ref().map(|w| w.title.clone()),
            window_class: focused.as_ref().map(|w| w.class.clone()),
            pid: focused.as_ref().and_then(|w| w.pid).map(|p| p as i64),
            x: focused.as_ref().map(|w| w.x as i64),
            y: focused.as_ref().map(|w| w.y as i64),
            width: focused.as_ref().map(|w| w.width as i64),
            height: focused.as_ref().map(|w| w.height as i64),
            monitor_name: Some(result.monitor_name.clone()),
            monitor_width: Some(result.width as i64),
            monitor_height: Some(result.height as i64),
        };
        self.storage.insert_screenshot(
            unix_now(),
            &result.file_path.to_string_lossy(),
            &result.thumbnail_path.to_string_lossy(),
            &result.hash,
            &meta,
            session_id,
        )?;
        Ok(())
    }

    pub fn register_git_repo(&self, path: &Path) -> Result<()> {
        self.git.lock().unwrap_or_else(|e| e.into_inner()).register(path)?;
        Ok(())
    }

    pub fn unregister_git_repo(&self, path: &Path) -> Result<()> {
        self.git.lock().unwrap_or_else(|e| e.into_inner()).unregister(path)
    }

    /// §4.7 "Discovery" exposed as an operator affordance (§"Supplemented
    /// (non-conflicting) features" / git repository discovery command).
    pub fn discover_git_repos(&self, roots: &[PathBuf]) -> Result<usize> {
        let config = self.state.read().unwrap_or_else(|e| e.into_inner()).config.clone();
        let found = self
            .git
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .discover(roots, config.git_discovery_max_depth, &config_skip_list())?;
        Ok(found.len())
    }

    pub fn watch_directory(&self, path: &Path) -> Result<()> {
        self.file.watch(path)
    }

    pub fn unwatch_directory(&self, path: &Path) -> Result<()> {
        self.file.unwatch(path)
    }

    /// Drains and persists buffered filesystem events (§4.8 "runs
    /// asynchronously" — the caller schedules this independently of `tick`).
    pub fn flush_file_events(&self) -> Result<()> {
        let config = self.state.read().unwrap_or_else(|e| e.into_inner()).config.clone();
        match self.file.flush(&config) {
            Ok(events) => {
                if !events.is_empty() {
                    info!("flushed {} file event(s)", events.len());
                }
                Ok(())
            }
            Err(e) => {
                error!("file event flush failed: {e}");
                Err(e)
            }
        }
    }

    pub fn config_snapshot(&self) -> DaemonConfig {
        self.state.read().unwrap_or_else(|e| e.into_inner()).config.clone()
    }

    pub fn update_config(&self, f: impl FnOnce(&mut DaemonConfig)) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state.config);
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }
}

fn config_skip_list() -> Vec<String> {
    crate::config::DEFAULT_GIT_DISCOVERY_SKIP.iter().map(|s| s.to_string()).collect()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
