//! Unix-domain-socket control channel: bind, accept-loop under a
//! `tokio::select!` against a shutdown signal, one spawned task per
//! connection, read-request/write-response over a single read/write pair.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use traq_core::daemon::Daemon;
use traq_core::protocol::{Request, Response, StatusReport};

pub struct IpcServer {
    socket_path: PathBuf,
    daemon: Arc<Daemon>,
    shutdown: CancellationToken,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, daemon: Arc<Daemon>, shutdown: CancellationToken) -> Self {
        Self {
            socket_path,
            daemon,
            shutdown,
        }
    }

    pub async fn start(self) -> Result<()> {
        if Path::new(&self.socket_path).exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!("ipc server listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("ipc server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((mut stream, _)) => {
                            let daemon = Arc::clone(&self.daemon);
                            tokio::spawn(async move {
                                let mut buffer = vec![0u8; 4096];
                                let n = match stream.read(&mut buffer).await {
                                    Ok(n) if n > 0 => n,
                                    _ => return,
                                };

                                let request: std::result::Result<Request, _> = serde_json::from_slice(&buffer[..n]);
                                let response = handle(&daemon, request);

                                if let Ok(bytes) = serde_json::to_vec(&response) {
                                    let _ = stream.write_all(&bytes).await;
                                }
                            });
                        }
                        Err(e) => error!("failed to accept ipc connection: {e}"),
                    }
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

fn handle(daemon: &Daemon, request: std::result::Result<Request, serde_json::Error>) -> Response {
    let request = match request {
        Ok(r) => r,
        Err(e) => return Response::Error(format!("invalid request: {e}")),
    };

    match request {
        Request::GetStatus => Response::Status(status_of(daemon)),
        Request::Pause => {
            daemon.pause();
            Response::Ok
        }
        Request::Resume => {
            daemon.resume();
            Response::Ok
        }
        Request::ForceCapture => match daemon.force_capture() {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::RegisterGitRepo { path } => match daemon.register_git_repo(Path::new(&path)) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::UnregisterGitRepo { path } => match daemon.unregister_git_repo(Path::new(&path)) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::DiscoverGitRepos { roots } => {
            let roots: Vec<PathBuf> = roots.into_iter().map(PathBuf::from).collect();
            match daemon.discover_git_repos(&roots) {
                Ok(count) => {
                    info!("git discovery registered {count} repositor(y/ies)");
                    Response::Ok
                }
                Err(e) => Response::Error(e.to_string()),
            }
        }
        Request::WatchDirectory { path } => match daemon.watch_directory(Path::new(&path)) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::UnwatchDirectory { path } => match daemon.unwatch_directory(Path::new(&path)) {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::UpdateConfig(patch) => {
            daemon.update_config(|cfg| {
                if let Some(v) = patch.interval_seconds {
                    cfg.set_interval(std::time::Duration::from_secs(v));
                }
                if let Some(v) = patch.afk_timeout_seconds {
                    cfg.set_afk_timeout(std::time::Duration::from_secs(v));
                }
                if let Some(v) = patch.resume_window_seconds {
                    cfg.set_resume_window(std::time::Duration::from_secs(v));
                }
                if let Some(v) = patch.quality {
                    cfg.set_quality(v);
                }
                if let Some(v) = patch.duplicate_threshold {
                    cfg.set_duplicate_threshold(v);
                }
            });
            Response::Ok
        }
    }
}

fn status_of(daemon: &Daemon) -> StatusReport {
    daemon.get_status()
}
