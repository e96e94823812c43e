use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traq_core::platform::default_platform;
use traq_core::protocol::{ConfigPatch, Request, Response};

#[derive(Parser, Debug)]
#[command(name = "traq", about = "Control client for the traq recording daemon", version)]
struct Cli {
    /// Path to the daemon's control socket (default: <data_dir>/traq.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the daemon's current status
    Status,
    /// Pause recording
    Pause,
    /// Resume recording
    Resume,
    /// Capture a screenshot immediately, bypassing the tick interval
    ForceCapture,
    /// Register a git repository for commit ingestion
    RegisterGit {
        path: String,
    },
    /// Stop ingesting commits from a git repository
    UnregisterGit {
        path: String,
    },
    /// Start watching a directory for filesystem changes
    WatchDir {
        path: String,
    },
    /// Stop watching a directory
    UnwatchDir {
        path: String,
    },
    /// Git repository discovery / checkpoint inspection
    #[command(subcommand)]
    Git(GitCommands),
    /// Inspect on-disk ingestion checkpoints
    #[command(subcommand)]
    Checkpoint(CheckpointCommands),
    /// Patch live daemon configuration (unset fields are left unchanged)
    ConfigSet {
        #[arg(long)]
        interval_seconds: Option<u64>,
        #[arg(long)]
        afk_timeout_seconds: Option<u64>,
        #[arg(long)]
        resume_window_seconds: Option<u64>,
        #[arg(long)]
        quality: Option<i32>,
        #[arg(long)]
        duplicate_threshold: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum GitCommands {
    /// Walk the given roots for git repositories and register each one found
    Discover { roots: Vec<String> },
}

#[derive(Subcommand, Debug)]
enum CheckpointCommands {
    /// Print the shell/git/browser checkpoint files
    Show,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "traq_cli=warn".into()))
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let cli = Cli::parse();
    let platform = default_platform();
    let data_dir = platform.data_dir();
    let socket_path = cli.socket.clone().unwrap_or_else(|| data_dir.join("traq.sock"));

    match cli.command {
        Commands::Status => {
            let response = send(&socket_path, &Request::GetStatus)?;
            match response {
                Response::Status(status) => {
                    println!("running: {}", status.running);
                    println!("paused: {}", status.paused);
                    println!("afk: {}", status.is_afk);
                    println!("session: {:?}", status.current_session);
                    println!("session duration (s): {:?}", status.session_duration_seconds);
                    println!("idle duration (s): {}", status.idle_duration_seconds);
                }
                Response::Error(e) => bail!("daemon error: {e}"),
                Response::Ok => println!("ok"),
            }
        }
        Commands::Pause => print_ok(send(&socket_path, &Request::Pause)?)?,
        Commands::Resume => print_ok(send(&socket_path, &Request::Resume)?)?,
        Commands::ForceCapture => print_ok(send(&socket_path, &Request::ForceCapture)?)?,
        Commands::RegisterGit { path } => print_ok(send(&socket_path, &Request::RegisterGitRepo { path })?)?,
        Commands::UnregisterGit { path } => print_ok(send(&socket_path, &Request::UnregisterGitRepo { path })?)?,
        Commands::WatchDir { path } => print_ok(send(&socket_path, &Request::WatchDirectory { path })?)?,
        Commands::UnwatchDir { path } => print_ok(send(&socket_path, &Request::UnwatchDirectory { path })?)?,
        Commands::Git(GitCommands::Discover { roots }) => {
            print_ok(send(&socket_path, &Request::DiscoverGitRepos { roots })?)?;
        }
        Commands::Checkpoint(CheckpointCommands::Show) => show_checkpoints(&data_dir)?,
        Commands::ConfigSet {
            interval_seconds,
            afk_timeout_seconds,
            resume_window_seconds,
            quality,
            duplicate_threshold,
        } => {
            let patch = ConfigPatch {
                interval_seconds,
                afk_timeout_seconds,
                resume_window_seconds,
                quality,
                duplicate_threshold,
            };
            print_ok(send(&socket_path, &Request::UpdateConfig(patch))?)?;
        }
    }

    Ok(())
}

fn print_ok(response: Response) -> Result<()> {
    match response {
        Response::Ok => {
            println!("ok");
            Ok(())
        }
        Response::Error(e) => bail!("daemon error: {e}"),
        Response::Status(status) => {
            println!("{status:?}");
            Ok(())
        }
    }
}

fn send(socket_path: &PathBuf, request: &Request) -> Result<Response> {
    debug!("connecting to {}", socket_path.display());
    let mut stream = UnixStream::connect(socket_path)
        .with_context(|| format!("connecting to daemon socket at {}", socket_path.display()))?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let bytes = serde_json::to_vec(request)?;
    stream.write_all(&bytes)?;
    stream.shutdown(std::net::Shutdown::Write)?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    let response: Response = serde_json::from_slice(&buf).context("decoding daemon response")?;
    Ok(response)
}

/// `traq checkpoint show` — read-only inspection, does not mutate ingestion
/// state (§"Supplemented (non-conflicting) features").
fn show_checkpoints(data_dir: &std::path::Path) -> Result<()> {
    for name in ["shell_checkpoint.json", "git_checkpoint.json", "browser_checkpoint.json"] {
        let path = data_dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => println!("== {name} ==\n{contents}"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => println!("== {name} == (not yet created)"),
            Err(e) => println!("== {name} == (error reading: {e})"),
        }
    }
    Ok(())
}
