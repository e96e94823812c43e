//! AFK (away-from-keyboard) detector (§4.2).
//!
//! Polymorphic over the `Platform::get_last_input_time` capability. The
//! "sample" is a single instant rather than a stream, since all that's
//! needed is a threshold crossing, not kinematic analysis.

use crate::platform::Platform;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Observer invoked synchronously from `poll` on a state transition. Per
/// §5, callbacks "perform only cheap bookkeeping and small database
/// writes" and must not block indefinitely.
pub trait AfkObserver: Send + Sync {
    fn on_afk(&self, afk_start: SystemTime);
    fn on_return(&self, now: SystemTime);
}

pub struct NullObserver;
impl AfkObserver for NullObserver {
    fn on_afk(&self, _afk_start: SystemTime) {}
    fn on_return(&self, _now: SystemTime) {}
}

pub struct AfkDetector {
    platform: Arc<dyn Platform>,
    timeout: Duration,
    is_afk: bool,
    afk_start: Option<SystemTime>,
    last_active: SystemTime,
    observer: Arc<dyn AfkObserver>,
}

impl AfkDetector {
    pub fn new(platform: Arc<dyn Platform>, timeout: Duration) -> Self {
        Self {
            platform,
            timeout,
            is_afk: false,
            afk_start: None,
            last_active: SystemTime::now(),
            observer: Arc::new(NullObserver),
        }
    }

    pub fn set_callbacks(&mut self, observer: Arc<dyn AfkObserver>) {
        self.observer = observer;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_afk(&self) -> bool {
        self.is_afk
    }

    pub fn get_idle_duration(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.last_active)
            .unwrap_or_default()
    }

    pub fn get_afk_duration(&self) -> Option<Duration> {
        let start = self.afk_start?;
        Some(SystemTime::now().duration_since(start).unwrap_or_default())
    }

    /// Returns `true` if the AFK state flipped this poll. On platform
    /// failure, returns `false` without touching state (§4.2: "If the
    /// platform call fails, return false").
    pub fn poll(&mut self) -> bool {
        let last_input_time = match self.platform.get_last_input_time() {
            Ok(t) => t,
            Err(_) => return false,
        };

        let now = SystemTime::now();
        let idle = now.duration_since(last_input_time).unwrap_or_default();

        if idle >= self.timeout && !self.is_afk {
            self.is_afk = true;
            // Inclusive of the idle prelude, not `now` (§4.2).
            self.afk_start = Some(last_input_time);
            self.observer.on_afk(last_input_time);
            true
        } else if idle < self.timeout && self.is_afk {
            self.is_afk = false;
            self.afk_start = None;
            self.last_active = now;
            self.observer.on_return(now);
            true
        } else {
            false
        }
    }

    pub fn force_afk(&mut self) {
        if !self.is_afk {
            let now = SystemTime::now();
            self.is_afk = true;
            self.afk_start = Some(now);
            self.observer.on_afk(now);
        }
    }

    pub fn force_return(&mut self) {
        if self.is_afk {
            let now = SystemTime::now();
            self.is_afk = false;
            self.afk_start = None;
            self.last_active = now;
            self.observer.on_return(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Browser, ShellType};
    use crate::error::Result as TraqResult;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakePlatform {
        last_input: Mutex<SystemTime>,
    }

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
        fn get_active_window(&self) -> TraqResult<Option<crate::platform::WindowInfo>> {
            Ok(None)
        }
        fn get_last_input_time(&self) -> TraqResult<SystemTime> {
            Ok(*self.last_input.lock().unwrap())
        }
        fn get_shell_history_path(&self, _shell: ShellType) -> TraqResult<Option<PathBuf>> {
            Ok(None)
        }
        fn get_shell_type(&self) -> ShellType {
            ShellType::Bash
        }
        fn get_browser_history_paths(&self) -> HashMap<Browser, PathBuf> {
            HashMap::new()
        }
        fn open_url(&self, _url: &str) -> TraqResult<()> {
            Ok(())
        }
        fn show_notification(&self, _title: &str, _body: &str) -> TraqResult<()> {
            Ok(())
        }
        fn display_count(&self) -> TraqResult<usize> {
            Ok(1)
        }
        fn display_bounds(&self, _index: usize) -> TraqResult<crate::platform::DisplayBounds> {
            unreachable!()
        }
        fn capture_display(&self, _index: usize) -> TraqResult<crate::platform::CapturedFrame> {
            unreachable!()
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        afk_calls: AtomicUsize,
        return_calls: AtomicUsize,
    }

    impl AfkObserver for CountingObserver {
        fn on_afk(&self, _afk_start: SystemTime) {
            self.afk_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn on_return(&self, _now: SystemTime) {
            self.return_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn transitions_to_afk_at_threshold_inclusive() {
        let last_input = SystemTime::now() - Duration::from_secs(180);
        let platform = Arc::new(FakePlatform {
            last_input: Mutex::new(last_input),
        });
        let observer = Arc::new(CountingObserver::default());
        let mut detector = AfkDetector::new(platform, Duration::from_secs(180));
        detector.set_callbacks(observer.clone());

        assert!(detector.poll());
        assert!(detector.is_afk());
        assert_eq!(observer.afk_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn returns_from_afk_clears_start() {
        let platform = Arc::new(FakePlatform {
            last_input: Mutex::new(SystemTime::now() - Duration::from_secs(300)),
        });
        let mut detector = AfkDetector::new(Arc::clone(&platform) as Arc<dyn Platform>, Duration::from_secs(180));
        assert!(detector.poll());
        assert!(detector.is_afk());

        *platform.last_input.lock().unwrap() = SystemTime::now();
        assert!(detector.poll());
        assert!(!detector.is_afk());
        assert!(detector.get_afk_duration().is_none());
    }

    #[test]
    fn platform_failure_does_not_flip_state() {
        struct FailingPlatform;
        impl Platform for FailingPlatform {
            fn data_dir(&self) -> PathBuf {
                PathBuf::new()
            }
            fn config_dir(&self) -> PathBuf {
                PathBuf::new()
            }
            fn cache_dir(&self) -> PathBuf {
                PathBuf::new()
            }
            fn get_active_window(&self) -> TraqResult<Option<crate::platform::WindowInfo>> {
                Ok(None)
            }
            fn get_last_input_time(&self) -> TraqResult<SystemTime> {
                Err(crate::error::TraqError::PlatformUnavailable("boom".into()))
            }
            fn get_shell_history_path(&self, _shell: ShellType) -> TraqResult<Option<PathBuf>> {
                Ok(None)
            }
            fn get_shell_type(&self) -> ShellType {
                ShellType::Bash
            }
            fn get_browser_history_paths(&self) -> HashMap<Browser, PathBuf> {
                HashMap::new()
            }
            fn open_url(&self, _url: &str) -> TraqResult<()> {
                Ok(())
            }
            fn show_notification(&self, _title: &str, _body: &str) -> TraqResult<()> {
                Ok(())
            }
            fn display_count(&self) -> TraqResult<usize> {
                Ok(1)
            }
            fn display_bounds(&self, _index: usize) -> TraqResult<crate::platform::DisplayBounds> {
                unreachable!()
            }
            fn capture_display(&self, _index: usize) -> TraqResult<crate::platform::CapturedFrame> {
                unreachable!()
            }
        }

        let mut detector = AfkDetector::new(Arc::new(FailingPlatform), Duration::from_secs(180));
        assert!(!detector.poll());
        assert!(!detector.is_afk());
    }
}
