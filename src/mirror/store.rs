use super::{Component, IndexEntry, Mirror};
use crate::error::{MirrorError, StoreError, ValidationError};
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// File name of the simplified index
pub const INDEX_FILE: &str = "index.json";
/// Directory holding one full document per component
pub const ITEMS_DIR: &str = "items";

static ITEM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@._-]+$").expect("static regex is valid"));

/// Whether `name` can be used as a component document file name.
pub fn is_valid_item_name(name: &str) -> bool {
    name != "." && name != ".." && ITEM_NAME.is_match(name)
}

/// Reject names that would escape `items/` or produce odd file names
pub fn validate_item_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty("item name".to_string()));
    }
    if !is_valid_item_name(name) {
        return Err(ValidationError::InvalidItemName(name.to_string()));
    }
    Ok(())
}

/// Directory-backed persistence for the mirror
///
/// Layout:
/// - `index.json`: array of [`IndexEntry`]
/// - `items/<name>.json`: one full [`Component`] document each
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn items_dir(&self) -> PathBuf {
        self.root.join(ITEMS_DIR)
    }

    pub fn item_path(&self, name: &str) -> PathBuf {
        self.items_dir().join(format!("{}.json", name))
    }

    /// Read `index.json`; `Ok(None)` when no mirror has been written yet
    pub fn load_index(&self) -> Result<Option<Vec<IndexEntry>>, MirrorError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Read one component document; `Ok(None)` when it does not exist
    pub fn load_component(&self, name: &str) -> Result<Option<Component>, MirrorError> {
        validate_item_name(name)?;

        let path = self.item_path(name);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Reconstruct the mirror from the index and the documents it references.
    ///
    /// Never fails: an unreadable index yields an empty mirror and an
    /// unreadable document drops that component, both with a warning.
    pub fn load_mirror(&self) -> Mirror {
        let entries = match self.load_index() {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                tracing::debug!(
                    "No index at {}, starting with an empty mirror",
                    self.index_path().display()
                );
                return Mirror::new();
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable index: {}", e);
                return Mirror::new();
            }
        };

        let mut mirror = Mirror::new();
        for entry in entries {
            match self.load_component(&entry.name) {
                Ok(Some(component)) => mirror.insert(component),
                Ok(None) => tracing::warn!(
                    "Index lists '{}' but {} is missing; treating it as new",
                    entry.name,
                    self.item_path(&entry.name).display()
                ),
                Err(e) => tracing::warn!(
                    "No prior state for '{}': {}",
                    entry.name,
                    e
                ),
            }
        }

        tracing::info!(
            "Loaded mirror with {} components from {}",
            mirror.len(),
            self.root.display()
        );
        mirror
    }

    /// Write one full component document
    pub fn save_component(&self, component: &Component) -> Result<(), MirrorError> {
        validate_item_name(&component.name)?;
        write_json(&self.item_path(&component.name), component)
    }

    /// Write several component documents; each owns its own file
    pub fn save_components(&self, components: &[&Component]) -> Result<(), MirrorError> {
        components
            .par_iter()
            .try_for_each(|component| self.save_component(component))
    }

    /// Rewrite `index.json` from the whole mirror
    pub fn save_index(&self, mirror: &Mirror) -> Result<(), MirrorError> {
        write_json(&self.index_path(), &mirror.index())
    }

    /// Rebuild the mirror from every document under `items/`, then rewrite
    /// the index from it.
    ///
    /// Components the old index still lists keep their position; documents
    /// it does not know about follow in file name order.
    pub fn rebuild_index(&self) -> Result<Mirror, MirrorError> {
        let mut found = Mirror::new();
        let items_dir = self.items_dir();

        if items_dir.is_dir() {
            for entry in WalkDir::new(&items_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|ext| ext.to_str()) != Some("json")
                {
                    continue;
                }

                match read_json::<Component>(path) {
                    Ok(component) => found.insert(component),
                    Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        let previous = self.load_index().ok().flatten().unwrap_or_default();
        let mut mirror = Mirror::new();
        for entry in &previous {
            if let Some(component) = found.components.shift_remove(&entry.name) {
                mirror.insert(component);
            }
        }
        for (_, component) in found.components {
            mirror.insert(component);
        }

        self.save_index(&mirror)?;
        tracing::info!("Rebuilt index with {} components", mirror.len());
        Ok(mirror)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, MirrorError> {
    let prior_state_error = |reason: String| StoreError::PriorStateRead {
        path: path.display().to_string(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| prior_state_error(e.to_string()))?;
    let value = serde_json::from_str(&content).map_err(|e| prior_state_error(e.to_string()))?;
    Ok(value)
}

/// Serialize and write through a sibling temp file so readers never see a
/// truncated document.
fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), MirrorError> {
    let persist_error = |reason: String| StoreError::Persist {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| persist_error(e.to_string()))?;
    }

    let content = serde_json::to_string_pretty(value).map_err(|e| persist_error(e.to_string()))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, content).map_err(|e| persist_error(e.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|e| persist_error(e.to_string()))?;

    tracing::debug!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{HistoryEntry, MirrorFile};
    use tempfile::tempdir;

    fn component(name: &str) -> Component {
        let mut component = Component::new(name, "components:ui", vec!["clsx".to_string()]);
        component.files.insert(
            "ui/a.tsx".to_string(),
            MirrorFile {
                path: "ui/a.tsx".to_string(),
                digest: crate::digest::digest("new"),
                content: "new".to_string(),
                commit: "c2".to_string(),
                timestamp: "2024-01-02T00:00:00Z".to_string(),
                history: vec![HistoryEntry {
                    digest: crate::digest::digest("old"),
                    content: "old".to_string(),
                    commit: "c1".to_string(),
                    timestamp: "2024-01-01T00:00:00Z".to_string(),
                }],
                versions: 2,
            },
        );
        component
    }

    #[test]
    fn test_item_names() {
        assert!(is_valid_item_name("button"));
        assert!(is_valid_item_name("data-table"));
        assert!(is_valid_item_name("v1.2_thing@beta"));
        assert!(!is_valid_item_name(".."));
        assert!(!is_valid_item_name("."));
        assert!(!is_valid_item_name("../secret"));
        assert!(!is_valid_item_name("a/b"));
        assert!(!is_valid_item_name(""));
        assert!(matches!(
            validate_item_name(""),
            Err(ValidationError::Empty(_))
        ));
    }

    #[test]
    fn test_load_mirror_without_index_is_empty() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path());
        assert!(store.load_mirror().is_empty());
        assert!(store.load_index().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path().join("mirror"));

        let mut mirror = Mirror::new();
        mirror.insert(component("button"));
        mirror.insert(component("card"));

        let components: Vec<&Component> = mirror.components.values().collect();
        store.save_components(&components).unwrap();
        store.save_index(&mirror).unwrap();

        assert!(store.item_path("button").exists());
        assert!(!dir.path().join("mirror/items/button.json.tmp").exists());

        let loaded = store.load_mirror();
        assert_eq!(loaded, mirror);
    }

    #[test]
    fn test_document_layout() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path());
        store.save_component(&component("button")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.item_path("button")).unwrap()).unwrap();
        assert_eq!(raw["name"], "button");
        assert_eq!(raw["type"], "components:ui");
        assert!(raw["files"].is_array());
        assert_eq!(raw["files"][0]["path"], "ui/a.tsx");
        assert_eq!(raw["files"][0]["versions"], 2);
        assert_eq!(raw["files"][0]["history"][0]["commit"], "c1");
    }

    #[test]
    fn test_corrupt_document_is_skipped() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path());

        let mut mirror = Mirror::new();
        mirror.insert(component("button"));
        mirror.insert(component("card"));
        store.save_component(mirror.get("button").unwrap()).unwrap();
        store.save_component(mirror.get("card").unwrap()).unwrap();
        store.save_index(&mirror).unwrap();

        fs::write(store.item_path("card"), "{ truncated").unwrap();

        let loaded = store.load_mirror();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get("button").is_some());

        let err = store.load_component("card").unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_corrupt_index_yields_empty_mirror() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path());
        fs::write(store.index_path(), "not json").unwrap();

        assert!(store.load_mirror().is_empty());
    }

    #[test]
    fn test_load_component_rejects_traversal() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path());
        let err = store.load_component("../index").unwrap_err();
        assert!(matches!(err, MirrorError::Validation(_)));
    }

    #[test]
    fn test_rebuild_index_from_items() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path());
        store.save_component(&component("button")).unwrap();
        store.save_component(&component("card")).unwrap();
        fs::write(store.items_dir().join("broken.json"), "[").unwrap();
        fs::write(store.items_dir().join("notes.txt"), "ignored").unwrap();

        let mirror = store.rebuild_index().unwrap();
        assert_eq!(mirror.len(), 2);

        let index = store.load_index().unwrap().unwrap();
        let names: Vec<&str> = index.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["button", "card"]);
    }

    #[test]
    fn test_rebuild_index_keeps_indexed_order() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path());

        let mut mirror = Mirror::new();
        mirror.insert(component("zeta"));
        mirror.insert(component("alpha"));
        store.save_components(&mirror.components.values().collect::<Vec<_>>()).unwrap();
        store.save_index(&mirror).unwrap();
        store.save_component(&component("beta")).unwrap();

        let rebuilt = store.rebuild_index().unwrap();
        let names: Vec<&str> = rebuilt.components.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "beta"]);

        let index = store.load_index().unwrap().unwrap();
        assert_eq!(index[0].name, "zeta");
        assert_eq!(index[2].name, "beta");
    }

    #[test]
    fn test_persist_failure_is_fatal() {
        let dir = tempdir().unwrap();
        // A regular file where the mirror directory should be
        let blocker = dir.path().join("mirror");
        fs::write(&blocker, "").unwrap();

        let store = MirrorStore::new(&blocker);
        let err = store.save_component(&component("button")).unwrap_err();
        assert!(matches!(err, MirrorError::Store(StoreError::Persist { .. })));
        assert!(err.is_fatal());
    }
}
