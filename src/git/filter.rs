use super::CommitInfo;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Decides whether a commit touched anything the mirror cares about
#[derive(Debug, Clone)]
pub struct CommitFilter {
    globs: Option<GlobSet>,
}

impl CommitFilter {
    /// Build from glob patterns; no patterns means every commit is relevant
    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self { globs: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob '{}'", pattern))?);
        }
        let globs = builder.build().context("Failed to build glob set")?;
        Ok(Self { globs: Some(globs) })
    }

    pub fn is_relevant(&self, commit: &CommitInfo) -> bool {
        match &self.globs {
            None => true,
            Some(globs) => commit.files_changed.iter().any(|path| globs.is_match(path)),
        }
    }
}
