//! Walking upstream history and folding each relevant commit into the mirror.


use crate::error::{MirrorError, StoreError};
use crate::git::{CommitFilter, CommitInfo, CommitSource};
use crate::lock::MirrorLock;
use crate::mirror::{CommitRef, MergeOutcome, Mirror, MirrorStore, merge_manifest};
use crate::snapshot::SnapshotProducer;
use crate::sync_state::SyncState;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// How a sync run treats prior progress and failures
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Where merged commit hashes are persisted
    pub state_path: PathBuf,
    /// Directory holding the output-root lock files
    pub lock_dir: PathBuf,
    /// Ignore recorded progress and rebuild the mirror from every commit
    pub full: bool,
    /// Record a failed commit and move on instead of stopping the run
    pub continue_on_error: bool,
}

/// A commit that could not be merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitFailure {
    pub commit: String,
    pub error: String,
}

/// Summary of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Pending commits found in history
    pub commits_seen: usize,
    pub commits_merged: usize,
    /// Commits that touched nothing the filter watches
    pub commits_skipped: usize,
    pub commits_failed: usize,
    pub files_added: usize,
    pub files_updated: usize,
    pub errors: Vec<CommitFailure>,
    pub duration_ms: u64,
}

/// Drives a [`CommitSource`] and a [`SnapshotProducer`] into a mirror
pub struct MirrorSync<S, P> {
    source: S,
    producer: P,
    filter: CommitFilter,
    store: MirrorStore,
    options: SyncOptions,
}

impl<S: CommitSource, P: SnapshotProducer> MirrorSync<S, P> {
    pub fn new(
        source: S,
        producer: P,
        filter: CommitFilter,
        store: MirrorStore,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            producer,
            filter,
            store,
            options,
        }
    }

    /// Merge every pending commit, oldest first.
    ///
    /// Each merged commit is recorded in the sync state before the next one
    /// starts, so an interrupted run resumes where it stopped.
    pub fn run(&self) -> Result<SyncReport, MirrorError> {
        let start = Instant::now();
        let root = self.store.root().display().to_string();

        let _lock = MirrorLock::try_acquire(&self.options.lock_dir, self.store.root())?
            .ok_or_else(|| StoreError::Locked(root.clone()))?;

        let repo = self.source.id();
        let mut state = SyncState::load(&self.options.state_path)?;
        if self.options.full && state.reset_repo(&repo) {
            tracing::info!("Full sync: forgot recorded progress for {}", repo);
        }

        let commits = self.source.commits(&state.commits(&repo))?;
        tracing::info!("Syncing {} pending commits into {}", commits.len(), root);

        let mut report = SyncReport {
            commits_seen: commits.len(),
            ..Default::default()
        };
        // A full run rebuilds from an empty mirror instead of the stored one
        let mut mirror: Option<Mirror> = self.options.full.then(Mirror::new);

        for commit in &commits {
            if !self.filter.is_relevant(commit) {
                tracing::debug!("Skipping {}: no watched paths touched", short(&commit.hash));
                report.commits_skipped += 1;
                state.record_commit(&repo, &commit.hash);
                state.save(&self.options.state_path)?;
                continue;
            }

            match self.merge_commit(commit, mirror.take()) {
                Ok(outcome) => {
                    tracing::info!(
                        "Merged {} \"{}\" ({} added, {} updated)",
                        short(&commit.hash),
                        commit.summary(),
                        outcome.added(),
                        outcome.updated()
                    );
                    report.commits_merged += 1;
                    report.files_added += outcome.added();
                    report.files_updated += outcome.updated();
                    mirror = Some(outcome.mirror);
                }
                Err(e) => {
                    tracing::error!("Failed to merge {}: {}", short(&commit.hash), e);
                    report.commits_failed += 1;
                    report.errors.push(CommitFailure {
                        commit: commit.hash.clone(),
                        error: e.to_string(),
                    });
                    if self.options.full && report.commits_merged == 0 {
                        mirror = Some(Mirror::new());
                    }

                    if !self.options.continue_on_error {
                        break;
                    }
                }
            }

            state.record_commit(&repo, &commit.hash);
            state.save(&self.options.state_path)?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Sync finished: {} merged, {} skipped, {} failed in {} ms",
            report.commits_merged,
            report.commits_skipped,
            report.commits_failed,
            report.duration_ms
        );
        Ok(report)
    }

    fn merge_commit(
        &self,
        commit: &CommitInfo,
        prior: Option<Mirror>,
    ) -> Result<MergeOutcome, MirrorError> {
        self.source.checkout(&commit.hash)?;
        let snapshot = self.producer.produce(self.source.workdir(), commit)?;
        let commit_ref = CommitRef::new(commit.hash.clone(), commit.timestamp());

        merge_manifest(
            &snapshot.manifest,
            &snapshot.source_root,
            &self.store,
            &commit_ref,
            prior,
        )
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
