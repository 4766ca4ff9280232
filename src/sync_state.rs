use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Commits already merged into the mirror, per upstream repository
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncState {
    /// Map of repository path -> merged commit hashes
    pub repos: HashMap<String, HashSet<String>>,
}

impl SyncState {
    /// Load state from disk
    pub fn load(state_path: &Path) -> Result<Self> {
        if !state_path.exists() {
            tracing::debug!("Sync state not found, starting fresh");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(state_path).context("Failed to read sync state file")?;

        let state: SyncState =
            serde_json::from_str(&content).context("Failed to parse sync state file")?;

        tracing::info!(
            "Loaded sync state with {} merged commits",
            state.total_commits()
        );
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, state_path: &Path) -> Result<()> {
        if let Some(parent) = state_path.parent() {
            fs::create_dir_all(parent).context("Failed to create sync state directory")?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize sync state")?;

        fs::write(state_path, content).context("Failed to write sync state file")?;

        tracing::debug!("Saved sync state to {:?}", state_path);
        Ok(())
    }

    pub fn has_commit(&self, repo: &str, commit_hash: &str) -> bool {
        self.repos
            .get(repo)
            .is_some_and(|commits| commits.contains(commit_hash))
    }

    /// Merged commits for a repository (empty when unknown)
    pub fn commits(&self, repo: &str) -> HashSet<String> {
        self.repos.get(repo).cloned().unwrap_or_default()
    }

    pub fn commit_count(&self, repo: &str) -> usize {
        self.repos.get(repo).map_or(0, HashSet::len)
    }

    pub fn record_commit(&mut self, repo: &str, commit_hash: &str) {
        self.repos
            .entry(repo.to_string())
            .or_default()
            .insert(commit_hash.to_string());
    }

    /// Forget a repository, e.g. before a full rebuild
    pub fn reset_repo(&mut self, repo: &str) -> bool {
        self.repos.remove(repo).is_some()
    }

    pub fn total_commits(&self) -> usize {
        self.repos.values().map(HashSet::len).sum()
    }
}
