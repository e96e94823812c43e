//! Fallback platform for OSes without a dedicated backend.
//!
//! Keeps the crate buildable cross-platform; every capability reports
//! `PlatformUnavailable` so callers degrade the way §7 specifies ("a
//! subsystem that cannot make progress silently produces no new rows").

use super::{CapturedFrame, DisplayBounds, Platform, WindowInfo};
use crate::config::{Browser, ShellType};
use crate::error::{Result, TraqError};
use std::collections::HashMap;
use std::path::PathBuf;

pub struct UnsupportedPlatform;

impl UnsupportedPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnsupportedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable<T>() -> Result<T> {
    Err(TraqError::PlatformUnavailable(
        "no platform backend for this OS".into(),
    ))
}

impl Platform for UnsupportedPlatform {
    fn data_dir(&self) -> PathBuf {
        dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("traq")
    }
    fn config_dir(&self) -> PathBuf {
        dirs::config_dir().unwrap_or_else(std::env::temp_dir).join("traq")
    }
    fn cache_dir(&self) -> PathBuf {
        dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("traq")
    }
    fn get_active_window(&self) -> Result<Option<WindowInfo>> {
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
    fn get_browser_history_paths(&self) -> HashMap<Browser, PathBuf> {
        HashMap::new()
    }
    fn open_url(&self, _url: &str) -> Result<()> {
        unavailable()
    }
    fn show_notification(&self, _title: &str, _body: &str) -> Result<()> {
        unavailable()
    }
    fn display_count(&self) -> Result<usize> {
        unavailable()
    }
    fn display_bounds(&self, _index: usize) -> Result<DisplayBounds> {
        unavailable()
    }
    fn capture_display(&self, _index: usize) -> Result<CapturedFrame> {
        unavailable()
    }
}
