//! Platform capability interface consumed by the core (§6): paths, active
//! window, last-input time, shell/browser discovery, and user-visible side
//! effects (`open_url`, `show_notification`). Concrete implementations live
//! in per-OS submodules; only Linux is implemented here.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod unsupported;

use crate::config::{Browser, ShellType};
use crate::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;

/// A focused-window snapshot as reported by the OS.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub title: String,
    pub app_name: String,
    pub class: String,
    pub pid: Option<u32>,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Index of the monitor the window is reported on, if known.
    pub monitor: Option<usize>,
}

impl WindowInfo {
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width as i32 / 2, self.y + self.height as i32 / 2)
    }
}

/// Bounds of one physical display, in the same coordinate space as
/// `WindowInfo`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayBounds {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x + self.width as i32
            && y < self.y + self.height as i32
    }
}

/// One captured frame: raw RGBA pixels plus the display it came from.
pub struct CapturedFrame {
    pub image: image::RgbaImage,
    pub monitor_index: usize,
    pub monitor_name: String,
}

/// The host capability surface. One implementation per OS; the daemon and
/// its subsystems hold a `Arc<dyn Platform>` and never match on `cfg!`.
pub trait Platform: Send + Sync {
    fn data_dir(&self) -> PathBuf;
    fn config_dir(&self) -> PathBuf;
    fn cache_dir(&self) -> PathBuf;

    /// Current focused window, or `None` if nothing is focused / the
    /// platform cannot determine it right now.
    fn get_active_window(&self) -> Result<Option<WindowInfo>>;

    /// Wall-clock time of the last keyboard/mouse input event.
    fn get_last_input_time(&self) -> Result<std::time::SystemTime>;

    fn get_shell_history_path(&self, shell: ShellType) -> Result<Option<PathBuf>>;
    fn get_shell_type(&self) -> ShellType;

    fn get_browser_history_paths(&self) -> HashMap<Browser, PathBuf>;

    fn open_url(&self, url: &str) -> Result<()>;
    fn show_notification(&self, title: &str, body: &str) -> Result<()>;

    /// Number of active displays.
    fn display_count(&self) -> Result<usize>;
    fn display_bounds(&self, index: usize) -> Result<DisplayBounds>;
    fn capture_display(&self, index: usize) -> Result<CapturedFrame>;
}

#[cfg(target_os = "linux")]
pub fn default_platform() -> std::sync::Arc<dyn Platform> {
    std::sync::Arc::new(linux::LinuxPlatform::new())
}

#[cfg(not(target_os = "linux"))]
pub fn default_platform() -> std::sync::Arc<dyn Platform> {
    std::sync::Arc::new(unsupported::UnsupportedPlatform::new())
}
