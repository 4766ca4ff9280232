//! Folding one commit's manifest into the mirror.
//!
//! The routine is generic over [`FileDescriptor`], so the structured and the
//! legacy manifest shapes go through exactly the same decisions. A merge runs
//! in three phases:
//!
//! 1. read and digest every referenced source file (in parallel); any
//!    unreadable file aborts before anything is mutated or written
//! 2. apply the per-file decisions to the mirror, in manifest order
//! 3. write the document of every manifest component, then the index

use super::{Component, Mirror, MirrorFile, MirrorStore};
use crate::digest::digest;
use crate::error::{MergeError, MirrorError};
use crate::manifest::{FileDescriptor, Manifest, ManifestComponent};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component as PathComponent, Path};

/// Attribution stamped on every file version a merge writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub id: String,
    /// ISO 8601
    pub timestamp: String,
}

impl CommitRef {
    pub fn new(id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: timestamp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Updated,
}

/// One per-file event emitted by a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub component: String,
    pub path: String,
    pub change_type: ChangeType,
}

/// Result of a merge: the whole updated mirror plus what changed
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub mirror: Mirror,
    pub changelog: Vec<ChangelogEntry>,
}

impl MergeOutcome {
    pub fn added(&self) -> usize {
        self.count(ChangeType::Added)
    }

    pub fn updated(&self) -> usize {
        self.count(ChangeType::Updated)
    }

    fn count(&self, change_type: ChangeType) -> usize {
        self.changelog
            .iter()
            .filter(|entry| entry.change_type == change_type)
            .count()
    }
}

/// Content of a source file as read for this commit
struct SourceFile {
    path: String,
    content: String,
    digest: String,
}

/// Merge a manifest of either shape
pub fn merge_manifest(
    manifest: &Manifest,
    source_root: &Path,
    store: &MirrorStore,
    commit: &CommitRef,
    prior: Option<Mirror>,
) -> Result<MergeOutcome, MirrorError> {
    match manifest {
        Manifest::Structured(components) => merge(components, source_root, store, commit, prior),
        Manifest::Legacy(components) => merge(components, source_root, store, commit, prior),
    }
}

/// Fold `components` into the mirror and persist the result under `store`.
///
/// Without a `prior` mirror the current state is reconstructed from the
/// store. The prior mirror is consumed even on failure; callers recover by
/// passing `None` next time, which reloads the last persisted state.
pub fn merge<D: FileDescriptor>(
    components: &[ManifestComponent<D>],
    source_root: &Path,
    store: &MirrorStore,
    commit: &CommitRef,
    prior: Option<Mirror>,
) -> Result<MergeOutcome, MirrorError> {
    let sources = components
        .par_iter()
        .map(|component| read_sources(component, source_root))
        .collect::<Result<Vec<_>, MirrorError>>()?;

    let mut mirror = prior.unwrap_or_else(|| store.load_mirror());
    let mut changelog = Vec::new();

    for (manifest_component, files) in components.iter().zip(sources) {
        let component = mirror
            .components
            .entry(manifest_component.name.clone())
            .or_insert_with(|| {
                tracing::debug!("New component '{}'", manifest_component.name);
                Component::new(
                    manifest_component.name.clone(),
                    manifest_component.kind.clone(),
                    Vec::new(),
                )
            });

        component.kind.clone_from(&manifest_component.kind);
        component
            .dependencies
            .clone_from(&manifest_component.dependencies);

        for file in files {
            let path = file.path.clone();
            if let Some(change_type) = apply_file(component, file, commit) {
                changelog.push(ChangelogEntry {
                    component: component.name.clone(),
                    path,
                    change_type,
                });
            }
        }
    }

    let touched: Vec<&Component> = components
        .iter()
        .filter_map(|component| mirror.get(&component.name))
        .collect();
    store.save_components(&touched)?;
    store.save_index(&mirror)?;

    tracing::info!(
        "Merged commit {}: {} components, {} file changes",
        commit.id,
        components.len(),
        changelog.len()
    );

    Ok(MergeOutcome { mirror, changelog })
}

fn read_sources<D: FileDescriptor>(
    component: &ManifestComponent<D>,
    source_root: &Path,
) -> Result<Vec<SourceFile>, MirrorError> {
    component
        .files
        .par_iter()
        .map(|descriptor| -> Result<SourceFile, MirrorError> {
            let path = descriptor.path();
            if !is_contained(path) {
                return Err(MergeError::UnsafePath {
                    component: component.name.clone(),
                    path: path.to_string(),
                }
                .into());
            }

            let full_path = source_root.join(path);
            let content =
                fs::read_to_string(&full_path).map_err(|e| MergeError::SourceRead {
                    path: full_path.display().to_string(),
                    reason: e.to_string(),
                })?;

            Ok(SourceFile {
                path: path.to_string(),
                digest: digest(&content),
                content,
            })
        })
        .collect()
}

/// Whether `path` stays below whatever root it is joined onto
fn is_contained(path: &str) -> bool {
    let mut normal = false;
    for part in Path::new(path).components() {
        match part {
            PathComponent::Normal(_) => normal = true,
            PathComponent::CurDir => {}
            PathComponent::ParentDir | PathComponent::RootDir | PathComponent::Prefix(_) => {
                return false;
            }
        }
    }
    normal
}

/// Record `file` as the current version if its content changed.
fn apply_file(component: &mut Component, file: SourceFile, commit: &CommitRef) -> Option<ChangeType> {
    let Some(existing) = component.files.get_mut(&file.path) else {
        tracing::debug!("{}/{}: added", component.name, file.path);
        component.files.insert(
            file.path.clone(),
            MirrorFile {
                path: file.path,
                digest: file.digest,
                content: file.content,
                commit: commit.id.clone(),
                timestamp: commit.timestamp.clone(),
                history: Vec::new(),
                versions: 1,
            },
        );
        return Some(ChangeType::Added);
    };

    if existing.digest == file.digest {
        return None;
    }

    let previous_versions = existing.versions;
    let mut history = std::mem::take(&mut existing.history);
    let already_archived = history
        .last()
        .is_some_and(|entry| entry.digest == existing.digest);
    if already_archived {
        tracing::debug!(
            "{}/{}: superseded version already archived",
            component.name,
            file.path
        );
    } else {
        history.push(existing.to_history_entry());
    }

    // Never decreases; a retried commit is not counted twice
    let versions = if already_archived {
        previous_versions.max(history.len() as u32 + 1)
    } else {
        previous_versions.saturating_add(1).max(history.len() as u32 + 1)
    };
    tracing::debug!("{}/{}: updated to version {}", component.name, file.path, versions);

    *existing = MirrorFile {
        path: file.path,
        digest: file.digest,
        content: file.content,
        commit: commit.id.clone(),
        timestamp: commit.timestamp.clone(),
        history,
        versions,
    };
    Some(ChangeType::Updated)
}
