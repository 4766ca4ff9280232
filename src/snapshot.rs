//! Turning a checked-out commit into a manifest plus the directory its file
//! descriptors resolve against.

use crate::config::SnapshotConfig;
use crate::error::{MirrorError, SnapshotError};
use crate::git::CommitInfo;
use crate::manifest::Manifest;
use std::path::{Path, PathBuf};
use std::process::Command;

/// What one commit looks like to the merge engine
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub manifest: Manifest,
    pub source_root: PathBuf,
}

/// Produces a [`Snapshot`] from a working tree already at `commit`
pub trait SnapshotProducer {
    fn produce(&self, workdir: &Path, commit: &CommitInfo) -> Result<Snapshot, MirrorError>;
}

/// Runs an optional build command, then reads the manifest it left behind
#[derive(Debug, Clone)]
pub struct CommandSnapshotProducer {
    command: Vec<String>,
    manifest_path: PathBuf,
    source_root: PathBuf,
}

impl CommandSnapshotProducer {
    pub fn new(command: Vec<String>, manifest_path: PathBuf, source_root: PathBuf) -> Self {
        Self {
            command,
            manifest_path,
            source_root,
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.manifest_path.clone(),
            config.source_root.clone(),
        )
    }

    fn run_command(&self, workdir: &Path) -> Result<(), SnapshotError> {
        let Some((program, args)) = self.command.split_first() else {
            return Ok(());
        };
        let command_line = self.command.join(" ");

        tracing::debug!("Running '{}' in {}", command_line, workdir.display());

        let output = Command::new(program)
            .args(args)
            .current_dir(workdir)
            .output()
            .map_err(|e| SnapshotError::Spawn {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SnapshotError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl SnapshotProducer for CommandSnapshotProducer {
    fn produce(&self, workdir: &Path, commit: &CommitInfo) -> Result<Snapshot, MirrorError> {
        self.run_command(workdir)?;

        let manifest = Manifest::load(&workdir.join(&self.manifest_path))?;
        tracing::debug!(
            "Commit {} reports {} components",
            &commit.hash[..commit.hash.len().min(12)],
            manifest.len()
        );

        Ok(Snapshot {
            manifest,
            source_root: workdir.join(&self.source_root),
        })
    }
}
