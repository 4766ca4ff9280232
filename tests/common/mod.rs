//! Shared fixtures for integration tests
#![allow(dead_code)]

use anyhow::Result;
use git2::{Repository, Signature, Time};
use std::fs;
use std::path::Path;

/// Legacy-shape manifest listing one `components:ui` item per `(name, path)`
pub fn legacy_manifest(items: &[(&str, &str)]) -> String {
    let components: Vec<serde_json::Value> = items
        .iter()
        .map(|(name, path)| {
            serde_json::json!({
                "name": name,
                "type": "components:ui",
                "files": [path],
            })
        })
        .collect();
    serde_json::to_string_pretty(&components).unwrap()
}

/// Structured-shape manifest with the same content as [`legacy_manifest`]
pub fn structured_manifest(items: &[(&str, &str)]) -> String {
    let components: Vec<serde_json::Value> = items
        .iter()
        .map(|(name, path)| {
            serde_json::json!({
                "name": name,
                "type": "components:ui",
                "dependencies": [],
                "files": [{ "path": path, "type": "registry:ui" }],
            })
        })
        .collect();
    serde_json::to_string_pretty(&components).unwrap()
}

pub fn write_file(root: &Path, path: &str, content: &str) -> Result<()> {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(full, content)?;
    Ok(())
}

/// Commit `files` on top of HEAD at `when` (epoch seconds)
pub fn commit(repo: &Repository, files: &[(&str, &str)], message: &str, when: i64) -> Result<String> {
    let workdir = repo.workdir().expect("non-bare repository").to_path_buf();
    let mut index = repo.index()?;
    for (path, content) in files {
        write_file(&workdir, path, content)?;
        index.add_path(Path::new(path))?;
    }
    index.write()?;

    let tree = repo.find_tree(index.write_tree()?)?;
    let sig = Signature::new("Registry Dev", "dev@example.com", &Time::new(when, 0))?;
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    Ok(repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?
        .to_string())
}
