//! Screen capture subsystem (§4.5).

pub mod dhash;

use crate::config::MonitorMode;
use crate::error::{Result, TraqError};
use crate::platform::{DisplayBounds, Platform, WindowInfo};
use chrono::{Local, TimeZone};
use image::imageops::FilterType;
use std::path::PathBuf;
use std::sync::Arc;

pub use dhash::are_similar;

pub struct CaptureResult {
    pub file_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub hash: String,
    pub width: u32,
    pub height: u32,
    pub monitor_index: usize,
    pub monitor_name: String,
}

pub struct ScreenCapture {
    platform: Arc<dyn Platform>,
    data_dir: PathBuf,
    quality: u8,
    thumbnail_width: u32,
}

impl ScreenCapture {
    pub fn new(platform: Arc<dyn Platform>, data_dir: PathBuf, quality: u8, thumbnail_width: u32) -> Self {
        Self {
            platform,
            data_dir,
            quality,
            thumbnail_width,
        }
    }

    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality;
    }

    pub fn set_thumbnail_width(&mut self, width: u32) {
        self.thumbnail_width = width;
    }

    /// Resolves which monitor to capture given the daemon's configured mode
    /// and the currently-focused window (§4.5 "Monitor resolution").
    pub fn resolve_monitor_index(
        &self,
        mode: MonitorMode,
        configured_index: usize,
        focused_window: Option<&WindowInfo>,
    ) -> usize {
        match mode {
            MonitorMode::Primary => 0,
            MonitorMode::Specific => {
                let count = self.platform.display_count().unwrap_or(1);
                if configured_index < count {
                    configured_index
                } else {
                    0
                }
            }
            MonitorMode::ActiveWindow => {
                let Some(window) = focused_window else {
                    return 0;
                };
                let (cx, cy) = window.center();
                let count = self.platform.display_count().unwrap_or(1);
                for i in 0..count {
                    if let Ok(bounds) = self.platform.display_bounds(i) {
                        if bounds.contains(cx, cy) {
                            return i;
                        }
                    }
                }
                0
            }
        }
    }

    pub fn capture(&self, monitor_index: usize, explicit_index: bool) -> Result<CaptureResult> {
        let frame = self.platform.capture_display(monitor_index)?;
        let hash = dhash::dhash(&frame.image);

        let now = Local::now();
        let (file_path, thumb_path) =
            self.paths_for(now.timestamp(), monitor_index, explicit_index);

        self.encode_full(&frame.image, &file_path)?;
        self.encode_thumbnail(&frame.image, &thumb_path)?;

        Ok(CaptureResult {
            file_path,
            thumbnail_path: thumb_path,
            hash,
            width: frame.image.width(),
            height: frame.image.height(),
            monitor_index: frame.monitor_index,
            monitor_name: frame.monitor_name,
        })
    }

    /// `<data_dir>/screenshots/YYYY/MM/DD/HHMMSS[_mN].webp` (+ `_thumb`
    /// companion), per §4.5 "File layout".
    fn paths_for(&self, timestamp: i64, monitor_index: usize, explicit_index: bool) -> (PathBuf, PathBuf) {
        let dt = Local
            .timestamp_opt(timestamp, 0)
            .single()
            .unwrap_or_else(Local::now);
        let dir = self
            .data_dir
            .join("screenshots")
            .join(dt.format("%Y").to_string())
            .join(dt.format("%m").to_string())
            .join(dt.format("%d").to_string());

        let suffix = if explicit_index {
            format!("_m{monitor_index}")
        } else {
            String::new()
        };
        let stem = format!("{}{}", dt.format("%H%M%S"), suffix);
        (
            dir.join(format!("{stem}.webp")),
            dir.join(format!("{stem}_thumb.webp")),
        )
    }

    fn encode_full(&self, image: &image::RgbaImage, path: &PathBuf) -> Result<()> {
        self.encode_webp(image, path)
    }

    fn encode_thumbnail(&self, image: &image::RgbaImage, path: &PathBuf) -> Result<()> {
        let (w, h) = (image.width(), image.height());
        let target_width = self.thumbnail_width.max(1);
        let target_height = ((h as u64 * target_width as u64) / w.max(1) as u64).max(1) as u32;
        let thumb = image::imageops::resize(image, target_width, target_height, FilterType::Lanczos3);
        self.encode_webp(&thumb, path)
    }

    fn encode_webp(&self, image: &image::RgbaImage, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let encoder = webp::Encoder::from_rgba(image.as_raw(), image.width(), image.height());
        let encoded = encoder.encode(self.quality as f32);
        std::fs::write(path, &*encoded)
            .map_err(|e| TraqError::Capture(format!("failed to write {path:?}: {e}")))
    }

    /// Deletes both the image and its thumbnail (§4.1 step 7, §5 "no other
    /// code path leaves orphan image files").
    pub fn discard(&self, result: &CaptureResult) {
        let _ = std::fs::remove_file(&result.file_path);
        let _ = std::fs::remove_file(&result.thumbnail_path);
    }

    pub fn display_bounds(&self, index: usize) -> Result<DisplayBounds> {
        self.platform.display_bounds(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_resolution_specific_falls_back_out_of_range() {
        struct FakePlatform;
        impl Platform for FakePlatform {
            fn data_dir(&self) -> PathBuf {
                PathBuf::new()
            }
            fn config_dir(&self) -> PathBuf {
                PathBuf::new()
            }
            fn cache_dir(&self) -> PathBuf {
                PathBuf::new()
            }
            fn get_active_window(&self) -> Result<Option<WindowInfo>> {
                Ok(None)
            }
            fn get_last_input_time(&self) -> Result<std::time::SystemTime> {
                Ok(std::time::SystemTime::now())
            }
            fn get_shell_history_path(
                &self,
                _shell: crate::config::ShellType,
            ) -> Result<Option<PathBuf>> {
                Ok(None)
            }
            fn get_shell_type(&self) -> crate::config::ShellType {
                crate::config::ShellType::Bash
            }
            fn get_browser_history_paths(
                &self,
            ) -> std::collections::HashMap<crate::config::Browser, PathBuf> {
                Default::default()
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
            fn display_bounds(&self, _index: usize) -> Result<DisplayBounds> {
                Ok(DisplayBounds {
                    x: 0,
                    y: 0,
                    width: 1920,
                    height: 1080,
                })
            }
            fn capture_display(&self, _index: usize) -> Result<crate::platform::CapturedFrame> {
                unreachable!()
            }
        }

        let capture = ScreenCapture::new(Arc::new(FakePlatform), PathBuf::new(), 80, 200);
        let idx = capture.resolve_monitor_index(MonitorMode::Specific, 5, None);
        assert_eq!(idx, 0);

        let idx_primary = capture.resolve_monitor_index(MonitorMode::Primary, 5, None);
        assert_eq!(idx_primary, 0);
    }
}
