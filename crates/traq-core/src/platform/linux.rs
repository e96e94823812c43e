//! Linux platform backend.
//!
//! Last-input time is derived from `evdev` device timestamps read directly
//! from `/dev/input`: just the most recent event timestamp per device,
//! tracked in a background thread so `get_last_input_time` never blocks on
//! I/O. Active-window and display enumeration use `xcap`, which backs onto
//! X11 / Wayland portals.

use super::{CapturedFrame, DisplayBounds, Platform, WindowInfo};
use crate::config::{Browser, ShellType};
use crate::error::{Result, TraqError};
use evdev::Device;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub struct LinuxPlatform {
    /// Last observed input timestamp, epoch micros. Updated by a background
    /// thread polling `/dev/input/event*`; read without blocking by `poll`.
    last_input_us: Arc<AtomicU64>,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        let last_input_us = Arc::new(AtomicU64::new(now_us()));
        spawn_input_watcher(Arc::clone(&last_input_us));
        Self { last_input_us }
    }

    fn discover_input_devices() -> Vec<PathBuf> {
        let mut devices = Vec::new();
        if let Ok(entries) = std::fs::read_dir("/dev/input") {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.to_str().map_or(false, |s| s.contains("event")) {
                    if Device::open(&path).is_ok() {
                        devices.push(path);
                    }
                }
            }
        }
        devices
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Spawns one OS thread per discovered input device, each blocking on
/// `fetch_events` and bumping `last_input_us` on every event. Blocking reads
/// are fine here: these threads do nothing else and never touch the tick
/// loop directly.
fn spawn_input_watcher(last_input_us: Arc<AtomicU64>) {
    let devices = LinuxPlatform::discover_input_devices();
    if devices.is_empty() {
        warn!("no /dev/input devices found; idle detection will report startup time only");
        return;
    }
    for path in devices {
        let last_input_us = Arc::clone(&last_input_us);
        std::thread::spawn(move || {
            let mut device = match Device::open(&path) {
                Ok(d) => d,
                Err(e) => {
                    debug!("failed to open {:?}: {}", path, e);
                    return;
                }
            };
            loop {
                match device.fetch_events() {
                    Ok(events) => {
                        if events.count() > 0 {
                            last_input_us.store(now_us(), Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        debug!("event stream ended for {:?}: {}", path, e);
                        break;
                    }
                }
            }
        });
    }
}

impl Platform for LinuxPlatform {
    fn data_dir(&self) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("traq")
    }

    fn config_dir(&self) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("traq")
    }

    fn cache_dir(&self) -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("traq")
    }

    fn get_active_window(&self) -> Result<Option<WindowInfo>> {
        let window = match xcap::Window::all() {
            Ok(windows) => windows.into_iter().find(|w| {
                w.is_focused().unwrap_or(false) && !w.is_minimized().unwrap_or(true)
            }),
            Err(e) => return Err(TraqError::PlatformUnavailable(e.to_string())),
        };

        Ok(window.and_then(|w| {
            Some(WindowInfo {
                title: w.title().ok()?,
                app_name: w.app_name().ok()?,
                class: w.app_name().unwrap_or_default(),
                pid: w.pid().ok(),
                x: w.x().unwrap_or(0),
                y: w.y().unwrap_or(0),
                width: w.width().unwrap_or(0),
                height: w.height().unwrap_or(0),
                monitor: None,
            })
        }))
    }

    fn get_last_input_time(&self) -> Result<SystemTime> {
        let us = self.last_input_us.load(Ordering::Relaxed);
        Ok(UNIX_EPOCH + Duration::from_micros(us))
    }

    fn get_shell_history_path(&self, shell: ShellType) -> Result<Option<PathBuf>> {
        let home = dirs::home_dir().ok_or_else(|| {
            TraqError::PlatformUnavailable("no home directory".into())
        })?;
        Ok(match shell {
            ShellType::Bash => Some(home.join(".bash_history")),
            ShellType::Zsh => {
                let zdotdir = std::env::var("ZDOTDIR").map(PathBuf::from).unwrap_or(home);
                Some(zdotdir.join(".zsh_history"))
            }
            ShellType::Fish => Some(
                dirs::data_dir()
                    .unwrap_or(home)
                    .join("fish/fish_history"),
            ),
            ShellType::PowerShell => None,
        })
    }

    fn get_shell_type(&self) -> ShellType {
        match std::env::var("SHELL") {
            Ok(s) if s.contains("zsh") => ShellType::Zsh,
            Ok(s) if s.contains("fish") => ShellType::Fish,
            _ => ShellType::Bash,
        }
    }

    fn get_browser_history_paths(&self) -> HashMap<Browser, PathBuf> {
        let mut map = HashMap::new();
        let Some(config) = dirs::config_dir() else {
            return map;
        };
        let candidates: &[(Browser, &str)] = &[
            (Browser::Chrome, "google-chrome/Default/History"),
            (Browser::Chromium, "chromium/Default/History"),
            (Browser::Brave, "BraveSoftware/Brave-Browser/Default/History"),
            (Browser::Edge, "microsoft-edge/Default/History"),
        ];
        for (browser, rel) in candidates {
            let path = config.join(rel);
            if path.exists() {
                map.insert(*browser, path);
            }
        }
        if let Some(home) = dirs::home_dir() {
            let profiles_root = home.join(".mozilla/firefox");
            if let Ok(entries) = std::fs::read_dir(&profiles_root) {
                for entry in entries.flatten() {
                    let places = entry.path().join("places.sqlite");
                    if places.exists() {
                        map.insert(Browser::Firefox, places);
                        break;
                    }
                }
            }
        }
        map
    }

    fn open_url(&self, url: &str) -> Result<()> {
        std::process::Command::new("xdg-open")
            .arg(url)
            .spawn()
            .map_err(|e| TraqError::PlatformUnavailable(e.to_string()))?;
        Ok(())
    }

    fn show_notification(&self, title: &str, body: &str) -> Result<()> {
        std::process::Command::new("notify-send")
            .arg(title)
            .arg(body)
            .spawn()
            .map_err(|e| TraqError::PlatformUnavailable(e.to_string()))?;
        Ok(())
    }

    fn display_count(&self) -> Result<usize> {
        xcap::Monitor::all()
            .map(|m| m.len())
            .map_err(|e| TraqError::PlatformUnavailable(e.to_string()))
    }

    fn display_bounds(&self, index: usize) -> Result<DisplayBounds> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| TraqError::PlatformUnavailable(e.to_string()))?;
        let monitor = monitors
            .get(index)
            .ok_or_else(|| TraqError::PlatformUnavailable(format!("no monitor {index}")))?;
        Ok(DisplayBounds {
            x: monitor.x().unwrap_or(0),
            y: monitor.y().unwrap_or(0),
            width: monitor.width().unwrap_or(0),
            height: monitor.height().unwrap_or(0),
        })
    }

    fn capture_display(&self, index: usize) -> Result<CapturedFrame> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| TraqError::PlatformUnavailable(e.to_string()))?;
        let monitor = monitors
            .get(index)
            .ok_or_else(|| TraqError::Capture(format!("no monitor {index}")))?;
        let image = monitor
            .capture_image()
            .map_err(|e| TraqError::Capture(e.to_string()))?;
        Ok(CapturedFrame {
            image,
            monitor_index: index,
            monitor_name: monitor.name().unwrap_or_else(|_| format!("monitor-{index}")),
        })
    }
}
