//! End-to-end exercises of the daemon orchestrator against the real
//! platform backend and an in-memory store: construct the real thing, drive
//! it through a lifecycle, assert on observable state rather than
//! internals.

use std::sync::Arc;
use tempfile::tempdir;
use traq_core::config::DaemonConfig;
use traq_core::platform::default_platform;
use traq_core::storage::Storage;
use traq_core::Daemon;

fn test_daemon(data_dir: &std::path::Path) -> Daemon {
    let platform = default_platform();
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    Daemon::new(platform, storage, data_dir.to_path_buf(), DaemonConfig::default()).unwrap()
}

#[test]
fn start_opens_a_session_and_stop_closes_it() {
    let dir = tempdir().unwrap();
    let daemon = test_daemon(dir.path());

    assert!(!daemon.is_running());
    daemon.start().unwrap();
    assert!(daemon.is_running());

    let status = daemon.get_status();
    assert!(status.running);
    assert!(status.current_session.is_some());

    daemon.stop().unwrap();
    assert!(!daemon.is_running());
}

#[test]
fn pause_and_resume_toggle_status_without_erroring_the_tick() {
    let dir = tempdir().unwrap();
    let daemon = test_daemon(dir.path());
    daemon.start().unwrap();

    daemon.pause();
    assert!(daemon.is_paused());
    assert!(daemon.tick().is_ok());

    daemon.resume();
    assert!(!daemon.is_paused());
    assert!(daemon.tick().is_ok());

    daemon.stop().unwrap();
}

#[test]
fn tick_before_start_is_a_harmless_no_op() {
    let dir = tempdir().unwrap();
    let daemon = test_daemon(dir.path());
    assert!(daemon.tick().is_ok());
    assert!(!daemon.is_running());
}

#[test]
fn discover_git_repos_walks_roots_and_registers_found_repositories() {
    let dir = tempdir().unwrap();
    let daemon = test_daemon(dir.path());

    let nested = dir.path().join("workspace").join("project");
    std::fs::create_dir_all(&nested).unwrap();
    git2::Repository::init(&nested).unwrap();

    let found = daemon.discover_git_repos(&[dir.path().join("workspace")]).unwrap();
    assert_eq!(found, 1);

    // Re-discovering the same tree finds nothing new (already registered).
    let found_again = daemon.discover_git_repos(&[dir.path().join("workspace")]).unwrap();
    assert_eq!(found_again, 0);
}

#[test]
fn register_and_unregister_git_repo_round_trip() {
    let dir = tempdir().unwrap();
    let daemon = test_daemon(dir.path());
    let repo_dir = dir.path().join("repo");
    std::fs::create_dir_all(&repo_dir).unwrap();
    git2::Repository::init(&repo_dir).unwrap();

    daemon.register_git_repo(&repo_dir).unwrap();
    daemon.unregister_git_repo(&repo_dir).unwrap();
}

#[test]
fn watch_and_unwatch_directory_round_trip() {
    let dir = tempdir().unwrap();
    let daemon = test_daemon(dir.path());
    let watched = dir.path().join("project");
    std::fs::create_dir_all(&watched).unwrap();

    daemon.watch_directory(&watched).unwrap();
    daemon.unwatch_directory(&watched).unwrap();
    assert!(daemon.flush_file_events().is_ok());
}

#[test]
fn update_config_is_visible_on_the_next_snapshot() {
    let dir = tempdir().unwrap();
    let daemon = test_daemon(dir.path());

    let before = daemon.config_snapshot();
    assert_eq!(before.quality, 80);

    daemon.update_config(|cfg| cfg.set_quality(42));
    let after = daemon.config_snapshot();
    assert_eq!(after.quality, 42);
}
