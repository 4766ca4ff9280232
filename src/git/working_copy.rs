use super::{GitCommitSource, GitWalker, WalkOptions};
use anyhow::{Context, Result, bail};
use git2::build::RepoBuilder;
use git2::{BranchType, Repository};
use std::fs;
use std::path::Path;

const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Local checkout of the upstream registry repository
pub struct WorkingCopy {
    walker: GitWalker,
    branch: Option<String>,
}

impl WorkingCopy {
    /// Open `path`, refreshing it from `url` when given, or clone `url` into it.
    ///
    /// `branch` is the branch to follow; when unset it is taken from the
    /// checkout (current branch, then `origin/HEAD`, then main or master).
    pub fn prepare(url: Option<&str>, path: &Path, branch: Option<&str>) -> Result<Self> {
        let repo = if path.join(".git").exists() {
            let repo = Repository::open(path)
                .with_context(|| format!("Failed to open working copy {}", path.display()))?;
            if let Some(url) = url {
                fetch(&repo, url)?;
            }
            repo
        } else {
            let Some(url) = url else {
                bail!(
                    "No git repository at {} and no repository URL configured",
                    path.display()
                );
            };
            clone(url, path, branch)?
        };

        let walker = GitWalker::from_repository(repo)?;
        let branch = match branch {
            Some(b) => Some(b.to_string()),
            None => resolve_branch(&walker),
        };

        if url.is_some()
            && let Some(b) = &branch
        {
            fast_forward(walker.repository(), b)?;
        }

        tracing::info!(
            "Working copy ready at {} (branch: {})",
            walker.repo_path().display(),
            branch.as_deref().unwrap_or("HEAD")
        );

        Ok(Self { walker, branch })
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Commit source walking the followed branch
    pub fn into_source(self, max_count: Option<usize>) -> GitCommitSource {
        let options = WalkOptions {
            branch: self.branch,
            max_count,
            ..Default::default()
        };
        GitCommitSource::new(self.walker, options)
    }
}

fn clone(url: &str, path: &Path, branch: Option<&str>) -> Result<Repository> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    tracing::info!("Cloning {} into {}", url, path.display());

    let mut builder = RepoBuilder::new();
    if let Some(branch) = branch {
        builder.branch(branch);
    }
    builder
        .clone(url, path)
        .with_context(|| format!("Failed to clone {}", url))
}

fn fetch(repo: &Repository, url: &str) -> Result<()> {
    let mut remote = match repo.find_remote("origin") {
        Ok(remote) if remote.url() == Some(url) => remote,
        Ok(_) => {
            repo.remote_set_url("origin", url)
                .context("Failed to update origin URL")?;
            repo.find_remote("origin")?
        }
        Err(_) => repo
            .remote("origin", url)
            .context("Failed to add origin remote")?,
    };

    tracing::info!("Fetching {}", url);
    remote
        .fetch(&[FETCH_REFSPEC], None, None)
        .with_context(|| format!("Failed to fetch {}", url))
}

/// Move `refs/heads/<branch>` to `origin/<branch>` when the remote has it
fn fast_forward(repo: &Repository, branch: &str) -> Result<()> {
    let Ok(remote) = repo.find_branch(&format!("origin/{}", branch), BranchType::Remote) else {
        return Ok(());
    };
    let Some(target) = remote.get().target() else {
        return Ok(());
    };

    repo.reference(
        &format!("refs/heads/{}", branch),
        target,
        true,
        "registry-mirror: fast-forward",
    )
    .with_context(|| format!("Failed to update branch '{}'", branch))?;
    Ok(())
}

fn resolve_branch(walker: &GitWalker) -> Option<String> {
    if let Some(current) = walker.current_branch() {
        return Some(current);
    }

    let repo = walker.repository();
    if let Ok(origin_head) = repo.find_reference("refs/remotes/origin/HEAD")
        && let Some(target) = origin_head.symbolic_target()
        && let Some(name) = target.strip_prefix("refs/remotes/origin/")
    {
        return Some(name.to_string());
    }

    if let Some(name) = ["main", "master"]
        .into_iter()
        .find(|name| repo.find_branch(name, BranchType::Local).is_ok())
    {
        return Some(name.to_string());
    }

    // A single local branch is unambiguous
    let mut names = repo
        .branches(Some(BranchType::Local))
        .ok()?
        .filter_map(|branch| branch.ok())
        .filter_map(|(branch, _)| branch.name().ok().flatten().map(str::to_string));
    match (names.next(), names.next()) {
        (Some(name), None) => Some(name),
        _ => None,
    }
}
