//! The versioned mirror and the engine that folds manifests into it.
//!
//! The in-memory [`Mirror`] is keyed by component name, and each
//! [`Component`] by file path. Both maps keep first-seen order, and on disk
//! they are written as arrays in that order, matching the `index.json` /
//! `items/<name>.json` layout.

/// Generic merge routine shared by both manifest shapes
pub mod merge;
/// Load/save contract for the persisted mirror directory
pub mod store;


pub use merge::{ChangeType, ChangelogEntry, CommitRef, MergeOutcome, merge, merge_manifest};
pub use store::MirrorStore;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A superseded version of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub digest: String,
    pub content: String,
    pub commit: String,
    pub timestamp: String,
}

/// The current version of a file plus everything it replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorFile {
    pub path: String,
    pub digest: String,
    pub content: String,
    pub commit: String,
    pub timestamp: String,
    /// Oldest first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub versions: u32,
}

impl MirrorFile {
    /// Snapshot of the current version, as it would be archived
    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            digest: self.digest.clone(),
            content: self.content.clone(),
            commit: self.commit.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// A named registry component and the versioned files it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Manifest order, new paths appended
    #[serde(with = "files_by_path")]
    pub files: IndexMap<String, MirrorFile>,
}

impl Component {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            dependencies,
            files: IndexMap::new(),
        }
    }

    pub fn file(&self, path: &str) -> Option<&MirrorFile> {
        self.files.get(path)
    }

    /// Project the component onto its index entry
    pub fn to_index_entry(&self) -> IndexEntry {
        IndexEntry {
            name: self.name.clone(),
            kind: self.kind.clone(),
            dependencies: self.dependencies.clone(),
            files: self
                .files
                .values()
                .map(|file| IndexFile {
                    path: file.path.clone(),
                    versions: file.versions,
                })
                .collect(),
        }
    }
}

/// Per-file slice of the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    pub path: String,
    pub versions: u32,
}

/// One row of `index.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub files: Vec<IndexFile>,
}

/// Every component seen so far, keyed by name in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mirror {
    pub components: IndexMap<String, Component>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Insert or replace a component under its own name; a replaced
    /// component keeps its position
    pub fn insert(&mut self, component: Component) {
        self.components.insert(component.name.clone(), component);
    }

    /// The simplified projection persisted as `index.json`
    pub fn index(&self) -> Vec<IndexEntry> {
        self.components
            .values()
            .map(Component::to_index_entry)
            .collect()
    }
}

/// Serializes the path-keyed file map as an array of file records
mod files_by_path {
    use super::MirrorFile;
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(files: &IndexMap<String, MirrorFile>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let list: Vec<&MirrorFile> = files.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<IndexMap<String, MirrorFile>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<MirrorFile>::deserialize(deserializer)?;
        let mut files = IndexMap::with_capacity(list.len());
        for file in list {
            if files.contains_key(&file.path) {
                return Err(serde::de::Error::custom(format!(
                    "duplicate file path '{}'",
                    file.path
                )));
            }
            files.insert(file.path.clone(), file);
        }
        Ok(files)
    }
}
