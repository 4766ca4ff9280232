//! Upstream commit history: which commits exist, which ones touch the
//! registry, and checking each one out for the snapshot producer.

/// Glob-based relevance filter over touched paths
pub mod filter;
/// Git repository walking and commit extraction
pub mod walker;
/// Cloning and refreshing the local working copy
pub mod working_copy;

#[cfg(test)]
pub(crate) mod test_support;

pub use filter::CommitFilter;
pub use walker::{CommitInfo, GitWalker, WalkOptions};
pub use working_copy::WorkingCopy;

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

/// Supplies commits, oldest first, and materialises their trees
pub trait CommitSource {
    /// Stable identity of the upstream, used to key the sync state
    fn id(&self) -> String;

    /// Directory the checked-out tree lives in
    fn workdir(&self) -> &Path;

    /// Commits not in `skip`, oldest first
    fn commits(&self, skip: &HashSet<String>) -> Result<Vec<CommitInfo>>;

    /// Make `hash`'s tree the content of [`CommitSource::workdir`]
    fn checkout(&self, hash: &str) -> Result<()>;
}

/// A git working copy walked with fixed options
pub struct GitCommitSource {
    walker: GitWalker,
    options: WalkOptions,
}

impl GitCommitSource {
    pub fn new(walker: GitWalker, options: WalkOptions) -> Self {
        Self { walker, options }
    }
}

impl CommitSource for GitCommitSource {
    fn id(&self) -> String {
        self.walker.repo_path().display().to_string()
    }

    fn workdir(&self) -> &Path {
        self.walker.repo_path()
    }

    fn commits(&self, skip: &HashSet<String>) -> Result<Vec<CommitInfo>> {
        self.walker.iter_commits(&self.options, skip)
    }

    fn checkout(&self, hash: &str) -> Result<()> {
        self.walker.checkout(hash)
    }
}
