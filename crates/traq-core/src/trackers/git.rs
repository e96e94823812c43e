//! Git commit tracker (§4.7).

use crate::checkpoint::GitCheckpointStore;
use crate::config::DaemonConfig;
use crate::error::{Result, TraqError};
use crate::storage::{GitRepository, NewGitCommit, Storage};
use git2::{Oid, Repository};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub struct GitTracker {
    storage: Arc<Storage>,
    checkpoint: GitCheckpointStore,
}

impl GitTracker {
    pub fn new(storage: Arc<Storage>, checkpoint: GitCheckpointStore) -> Self {
        Self { storage, checkpoint }
    }

    /// Walks `roots` up to `max_depth`, registering every `.git` directory
    /// found along the way (§4.7 "Discovery"). A repository's subtree is not
    /// traversed further once found, and repositories already registered are
    /// left out of the returned list.
    pub fn discover(&self, roots: &[PathBuf], max_depth: usize, skip: &[String]) -> Result<Vec<GitRepository>> {
        let mut found = Vec::new();
        for root in roots {
            let mut walker = WalkDir::new(root)
                .max_depth(max_depth)
                .into_iter()
                .filter_entry(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .map(|name| !skip.iter().any(|s| s == name))
                        .unwrap_or(true)
                });
            while let Some(entry) = walker.next() {
                let Ok(entry) = entry else { continue };
                if entry.file_type().is_dir() && entry.file_name() == ".git" {
                    walker.skip_current_dir();
                    let repo_path = entry.path().parent().unwrap_or(entry.path());
                    let already_registered = self
                        .storage
                        .find_git_repository_by_path(&repo_path.to_string_lossy())?
                        .is_some();
                    if let Ok(repo) = self.register(repo_path) {
                        if !already_registered {
                            found.push(repo);
                        }
                    }
                }
            }
        }
        Ok(found)
    }

    pub fn register(&self, path: &Path) -> Result<GitRepository> {
        let repo = Repository::open(path)
            .map_err(|e| TraqError::Config(format!("not a git repository: {e}")))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let remote_url = repo
            .find_remote("origin")
            .ok()
            .and_then(|r| r.url().map(str::to_string));
        self.storage
            .register_git_repository(&path.to_string_lossy(), &name, remote_url.as_deref())
    }

    pub fn unregister(&self, path: &Path) -> Result<()> {
        self.storage.unregister_git_repository(&path.to_string_lossy())
    }

    /// Walks new commits on every active repository's current branch and
    /// persists them, bounded by the checkpoint and `max_commits` (§4.7
    /// "Polling").
    pub fn poll(&mut self, session_id: i64, config: &DaemonConfig) -> Result<Vec<NewGitCommit>> {
        let mut inserted = Vec::new();
        for repo_row in self.storage.list_active_git_repositories()? {
            let Ok(repo) = Repository::open(&repo_row.path) else {
                continue;
            };
            let commits = self.poll_repository(&repo, &repo_row, session_id, config.git_poll_max_commits)?;
            inserted.extend(commits);
        }
        Ok(inserted)
    }

    fn poll_repository(
        &mut self,
        repo: &Repository,
        repo_row: &GitRepository,
        session_id: i64,
        max_commits: usize,
    ) -> Result<Vec<NewGitCommit>> {
        let Ok(head) = repo.head() else {
            return Ok(Vec::new());
        };
        let branch = head.shorthand().unwrap_or("HEAD").to_string();
        let Ok(head_commit) = head.peel_to_commit() else {
            return Ok(Vec::new());
        };

        let stop_at = self
            .checkpoint
            .last_commit(repo_row.id)
            .and_then(|hash| Oid::from_str(hash).ok());

        let mut revwalk = repo.revwalk().map_err(|e| TraqError::Config(e.to_string()))?;
        revwalk.push(head_commit.id()).map_err(|e| TraqError::Config(e.to_string()))?;

        let mut oids = Vec::new();
        for oid in revwalk.flatten() {
            if Some(oid) == stop_at {
                break;
            }
            oids.push(oid);
            if oids.len() >= max_commits {
                break;
            }
        }
        // Oldest first, so the checkpoint always advances to the true tip.
        oids.reverse();

        let mut inserted = Vec::new();
        for oid in &oids {
            let Ok(commit) = repo.find_commit(*oid) else {
                continue;
            };
            let (files_changed, insertions, deletions) = diff_stats(repo, &commit);
            let hash = commit.id().to_string();
            let short_hash = hash[..7.min(hash.len())].to_string();
            let row = NewGitCommit {
                repository_id: repo_row.id,
                hash,
                short_hash,
                author_name: commit.author().name().unwrap_or("unknown").to_string(),
                author_email: commit.author().email().unwrap_or("").to_string(),
                timestamp: commit.time().seconds(),
                subject: commit.summary().unwrap_or("").to_string(),
                message: commit.message().unwrap_or("").to_string(),
                files_changed,
                insertions,
                deletions,
                branch: branch.clone(),
                session_id,
            };
            if self.storage.insert_git_commit(&row)? {
                inserted.push(row);
            }
        }

        if let Some(newest) = oids.last() {
            self.checkpoint.set_last_commit(repo_row.id, &newest.to_string())?;
        }
        self.storage.update_git_repository_scan(repo_row.id, now())?;
        Ok(inserted)
    }
}

fn diff_stats(repo: &Repository, commit: &git2::Commit) -> (i64, i64, i64) {
    let tree = match commit.tree() {
        Ok(t) => t,
        Err(_) => return (0, 0, 0),
    };
    let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
    let diff = match repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None) {
        Ok(d) => d,
        Err(_) => return (0, 0, 0),
    };
    match diff.stats() {
        Ok(stats) => (
            stats.files_changed() as i64,
            stats.insertions() as i64,
            stats.deletions() as i64,
        ),
        Err(_) => (0, 0, 0),
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
