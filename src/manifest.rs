//! Snapshot manifests: the components and files reported for one commit.
//!
//! Two shapes are accepted. The current shape describes every file with a
//! structured descriptor (`{"path": ..., ...}`), the legacy shape lists bare
//! path strings. Both resolve to the same thing as far as versioning is
//! concerned: a path relative to the snapshot's source root.

use crate::error::{ManifestError, MirrorError};
use crate::mirror::store::is_valid_item_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Resolves a raw manifest file entry to the path it refers to
pub trait FileDescriptor: Sync {
    fn path(&self) -> &str;
}

/// Legacy descriptor: the entry is the path.
impl FileDescriptor for String {
    fn path(&self) -> &str {
        self
    }
}

/// Current descriptor: `{path, ...}` with any additional fields kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFile {
    pub path: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FileDescriptor for StructuredFile {
    fn path(&self) -> &str {
        &self.path
    }
}

/// One component as described by the snapshot producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestComponent<D> {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub files: Vec<D>,
}

/// Which of the two descriptor shapes a manifest uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestShape {
    Structured,
    Legacy,
}

/// A parsed manifest in either shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Manifest {
    Structured(Vec<ManifestComponent<StructuredFile>>),
    Legacy(Vec<ManifestComponent<String>>),
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self, MirrorError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.display().to_string()).into());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ManifestError::ParseFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let manifest = Self::parse(&content)?;
        tracing::debug!(
            "Loaded {:?} manifest with {} components from {}",
            manifest.shape(),
            manifest.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Parse a manifest document.
    ///
    /// Accepts a bare component array, or an object carrying the array
    /// under `items`.
    pub fn parse(content: &str) -> Result<Self, MirrorError> {
        let mut value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| ManifestError::ParseFailed(format!("Invalid JSON: {}", e)))?;

        if let Some(items) = value.get_mut("items") {
            value = items.take();
        }

        let manifest: Manifest = serde_json::from_value(value).map_err(|e| {
            ManifestError::ParseFailed(format!("Not a component list in either shape: {}", e))
        })?;

        manifest.validate()?;
        Ok(manifest)
    }

    pub fn shape(&self) -> ManifestShape {
        match self {
            Manifest::Structured(_) => ManifestShape::Structured,
            Manifest::Legacy(_) => ManifestShape::Legacy,
        }
    }

    /// Number of components in the manifest
    pub fn len(&self) -> usize {
        match self {
            Manifest::Structured(components) => components.len(),
            Manifest::Legacy(components) => components.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject manifests that would break the mirror's uniqueness rules
    pub fn validate(&self) -> Result<(), ManifestError> {
        match self {
            Manifest::Structured(components) => validate_components(components),
            Manifest::Legacy(components) => validate_components(components),
        }
    }
}

fn validate_components<D: FileDescriptor>(
    components: &[ManifestComponent<D>],
) -> Result<(), ManifestError> {
    let mut names = HashSet::new();
    for component in components {
        if !is_valid_item_name(&component.name) {
            return Err(ManifestError::InvalidComponentName(component.name.clone()));
        }
        if !names.insert(component.name.as_str()) {
            return Err(ManifestError::DuplicateComponent(component.name.clone()));
        }

        let mut paths = HashSet::new();
        for file in &component.files {
            if !paths.insert(file.path()) {
                return Err(ManifestError::DuplicatePath {
                    component: component.name.clone(),
                    path: file.path().to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STRUCTURED: &str = r#"[
        {
            "name": "button",
            "type": "components:ui",
            "dependencies": ["@radix-ui/react-slot"],
            "files": [{"path": "ui/button.tsx", "type": "registry:ui"}]
        }
    ]"#;

    const LEGACY: &str = r#"[
        {"name": "button", "type": "components:ui", "files": ["ui/button.tsx"]}
    ]"#;

    #[test]
    fn test_parse_structured() {
        let manifest = Manifest::parse(STRUCTURED).unwrap();
        assert_eq!(manifest.shape(), ManifestShape::Structured);

        let Manifest::Structured(components) = manifest else {
            panic!("expected structured manifest");
        };
        assert_eq!(components[0].kind, "components:ui");
        assert_eq!(components[0].files[0].path(), "ui/button.tsx");
        assert_eq!(
            components[0].files[0].extra.get("type"),
            Some(&serde_json::Value::String("registry:ui".to_string()))
        );
    }

    #[test]
    fn test_parse_legacy_defaults_dependencies() {
        let manifest = Manifest::parse(LEGACY).unwrap();
        assert_eq!(manifest.shape(), ManifestShape::Legacy);

        let Manifest::Legacy(components) = manifest else {
            panic!("expected legacy manifest");
        };
        assert!(components[0].dependencies.is_empty());
        assert_eq!(components[0].files[0].path(), "ui/button.tsx");
    }

    #[test]
    fn test_parse_items_wrapper() {
        let wrapped = format!(r#"{{"name": "acme", "items": {}}}"#, STRUCTURED);
        let manifest = Manifest::parse(&wrapped).unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_rejects_duplicate_component() {
        let doc = r#"[
            {"name": "a", "type": "t", "files": []},
            {"name": "a", "type": "t", "files": []}
        ]"#;
        let err = Manifest::parse(doc).unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Manifest(ManifestError::DuplicateComponent(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_path() {
        let doc = r#"[{"name": "a", "type": "t", "files": ["x.ts", "x.ts"]}]"#;
        let err = Manifest::parse(doc).unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Manifest(ManifestError::DuplicatePath { .. })
        ));
    }

    #[test]
    fn test_rejects_unsafe_component_name() {
        let doc = r#"[{"name": "../escape", "type": "t", "files": []}]"#;
        let err = Manifest::parse(doc).unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Manifest(ManifestError::InvalidComponentName(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Manifest::parse("{not json").is_err());
        assert!(Manifest::parse(r#"[{"name": "a"}]"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("registry.json")).unwrap_err();
        assert!(matches!(err, MirrorError::Manifest(ManifestError::NotFound(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, LEGACY).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(!manifest.is_empty());
    }
}
