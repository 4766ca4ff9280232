use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use git2::build::CheckoutBuilder;
use git2::{BranchType, Oid, Repository, Sort};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Information about a git commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// Full commit SHA hash (40 characters)
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Commit timestamp (Unix epoch seconds)
    pub commit_date: i64,
    /// Paths touched relative to the first parent, old and new sides
    pub files_changed: Vec<String>,
}

impl CommitInfo {
    /// Commit time as an RFC 3339 UTC string
    pub fn timestamp(&self) -> String {
        DateTime::from_timestamp(self.commit_date, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// First line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Which part of history to walk
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Branch to walk; HEAD when unset
    pub branch: Option<String>,
    /// Stop after this many pending commits
    pub max_count: Option<usize>,
    /// Skip commits older than this (epoch seconds)
    pub since: Option<i64>,
    /// Skip commits newer than this (epoch seconds)
    pub until: Option<i64>,
}

/// Git repository walker for extracting commit information
pub struct GitWalker {
    repo: Repository,
    repo_path: PathBuf,
}

impl GitWalker {
    pub(crate) fn from_repository(repo: Repository) -> Result<Self> {
        let repo_path = repo
            .workdir()
            .context("Repository has no working tree")?
            .to_path_buf();
        Ok(Self { repo, repo_path })
    }

    /// Get the repository root path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub(crate) fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Get the current branch name, or None if detached HEAD
    pub fn current_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(|s| s.to_string())
    }

    /// Check if repository has any commits
    pub fn has_commits(&self) -> bool {
        self.repo.head().is_ok()
    }

    /// Tip of `branch`, preferring the local branch over `origin/<branch>`
    fn branch_tip(&self, branch: &str) -> Result<Oid> {
        let reference = match self.repo.find_branch(branch, BranchType::Local) {
            Ok(local) => local,
            Err(_) => self
                .repo
                .find_branch(&format!("origin/{}", branch), BranchType::Remote)
                .with_context(|| format!("Failed to find branch '{}'", branch))?,
        };
        reference
            .get()
            .target()
            .with_context(|| format!("Branch '{}' has no target", branch))
    }

    /// Commits reachable from the walk start, oldest first, minus `skip_hashes`
    pub fn iter_commits(
        &self,
        options: &WalkOptions,
        skip_hashes: &HashSet<String>,
    ) -> Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;

        match &options.branch {
            Some(branch) => revwalk.push(self.branch_tip(branch)?)?,
            None if !self.has_commits() => {
                tracing::info!("{} has no commits yet", self.repo_path.display());
                return Ok(Vec::new());
            }
            None => revwalk.push_head().context("Repository has no HEAD")?,
        }

        let max = options.max_count.unwrap_or(usize::MAX);
        let mut commits = Vec::new();
        let mut skipped = 0usize;

        for oid in revwalk {
            if commits.len() >= max {
                break;
            }

            let commit = self.repo.find_commit(oid?)?;
            let hash = commit.id().to_string();

            if skip_hashes.contains(&hash) {
                skipped += 1;
                continue;
            }

            let commit_time = commit.time().seconds();
            if options.since.is_some_and(|since| commit_time < since) {
                continue;
            }
            if options.until.is_some_and(|until| commit_time > until) {
                continue;
            }

            commits.push(self.extract_commit_info(&commit)?);

            if commits.len() % 50 == 0 {
                tracing::debug!("Processed {} commits", commits.len());
            }
        }

        tracing::info!(
            "Found {} pending commits ({} already merged)",
            commits.len(),
            skipped
        );
        Ok(commits)
    }

    fn extract_commit_info(&self, commit: &git2::Commit) -> Result<CommitInfo> {
        let author = commit.author();

        Ok(CommitInfo {
            hash: commit.id().to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            commit_date: commit.time().seconds(),
            files_changed: self.files_changed(commit)?,
        })
    }

    /// Paths touched by `commit`; the root commit diffs against the empty tree
    fn files_changed(&self, commit: &git2::Commit) -> Result<Vec<String>> {
        let tree = commit.tree()?;
        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };

        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut paths = BTreeSet::new();
        for delta in diff.deltas() {
            for path in [delta.old_file().path(), delta.new_file().path()]
                .into_iter()
                .flatten()
            {
                paths.insert(path.to_string_lossy().into_owned());
            }
        }

        Ok(paths.into_iter().collect())
    }

    /// Force the working tree to `hash` and detach HEAD there
    pub fn checkout(&self, hash: &str) -> Result<()> {
        let oid = Oid::from_str(hash).with_context(|| format!("Invalid commit hash '{}'", hash))?;
        let commit = self
            .repo
            .find_commit(oid)
            .with_context(|| format!("Commit {} not found", hash))?;

        let mut builder = CheckoutBuilder::new();
        builder.force().remove_untracked(true);

        self.repo
            .checkout_tree(commit.as_object(), Some(&mut builder))
            .with_context(|| format!("Failed to check out {}", hash))?;
        self.repo
            .set_head_detached(oid)
            .with_context(|| format!("Failed to detach HEAD at {}", hash))?;

        tracing::debug!("Checked out {}", &hash[..hash.len().min(12)]);
        Ok(())
    }
}
