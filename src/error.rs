/// Centralized error types for registry-mirror using thiserror
///
/// Source-side failures abort the commit being merged, prior-state failures
/// degrade to "no prior state", persistence failures abort the commit.
use thiserror::Error;

/// Main error type for the mirror
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while folding a manifest into the mirror
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to read source file '{path}': {reason}")]
    SourceRead { path: String, reason: String },

    #[error("Component '{component}' lists '{path}', which is not inside the source root")]
    UnsafePath { component: String, path: String },
}

/// Errors related to the persisted mirror documents
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read prior mirror document '{path}': {reason}")]
    PriorStateRead { path: String, reason: String },

    #[error("Failed to persist mirror document '{path}': {reason}")]
    Persist { path: String, reason: String },

    #[error("Mirror at '{0}' is locked by another process")]
    Locked(String),
}

/// Errors related to snapshot manifests
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    NotFound(String),

    #[error("Failed to parse manifest: {0}")]
    ParseFailed(String),

    #[error("Component name '{0}' cannot be used as a document name")]
    InvalidComponentName(String),

    #[error("Component '{0}' appears more than once in the manifest")]
    DuplicateComponent(String),

    #[error("Component '{component}' lists '{path}' more than once")]
    DuplicatePath { component: String, path: String },
}

/// Errors raised while turning a checked-out commit into a manifest
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to start '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid item name: {0}")]
    InvalidItemName(String),

    #[error("Empty {0}")]
    Empty(String),
}

impl From<anyhow::Error> for MirrorError {
    fn from(err: anyhow::Error) -> Self {
        MirrorError::Other(format!("{:#}", err))
    }
}

impl MirrorError {
    /// Whether this error must abort the commit being merged.
    ///
    /// Only a prior-state read is recoverable; everything else means the
    /// commit's changes cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MirrorError::Store(StoreError::PriorStateRead { .. }))
    }

    /// Check if this is a user error (bad input) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MirrorError::Validation(_)
                | MirrorError::Manifest(_)
                | MirrorError::Config(ConfigError::InvalidValue { .. })
        )
    }
}
