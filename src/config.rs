/// Configuration system for registry-mirror
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, MirrorError};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upstream repository and commit selection
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// How a commit is turned into a manifest
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Where the mirror lives
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Read API
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Clone URL; when unset the working copy must already exist
    #[serde(default)]
    pub url: Option<String>,

    /// Working copy path
    #[serde(default = "default_checkout_path")]
    pub path: PathBuf,

    /// Branch to walk (HEAD when unset)
    #[serde(default)]
    pub branch: Option<String>,

    /// Globs over touched paths that make a commit relevant
    #[serde(default = "default_watch_paths")]
    pub watch_paths: Vec<String>,

    /// Upper bound on commits walked per run (0 = unlimited)
    #[serde(default)]
    pub max_commits: usize,
}

/// Snapshot production configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Build command run in the working copy before reading the manifest
    #[serde(default)]
    pub command: Vec<String>,

    /// Manifest location relative to the working copy
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Directory file descriptors are resolved against, relative to the working copy
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
}

/// Mirror persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Directory holding `index.json` and `items/`
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Commits already merged
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Keep going with later commits when one commit fails
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

/// Read API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Base for absolute links; derived from the Host header when empty
    #[serde(default)]
    pub public_url: String,
}

fn default_checkout_path() -> PathBuf {
    crate::paths::PlatformPaths::default_checkout_path()
}

fn default_watch_paths() -> Vec<String> {
    vec!["registry/**".to_string()]
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("registry.json")
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_root() -> PathBuf {
    crate::paths::PlatformPaths::default_output_root()
}

fn default_state_path() -> PathBuf {
    crate::paths::PlatformPaths::default_sync_state_path()
}

fn default_continue_on_error() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: default_checkout_path(),
            branch: None,
            watch_paths: default_watch_paths(),
            max_commits: 0,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            manifest_path: default_manifest_path(),
            source_root: default_source_root(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            state_path: default_state_path(),
            continue_on_error: default_continue_on_error(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, MirrorError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path, the default location, or
    /// fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, MirrorError> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let config_path = crate::paths::PlatformPaths::default_config_path();
        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), MirrorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, MirrorError> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)).into()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.snapshot.manifest_path.as_os_str().is_empty() {
            return Err(invalid("snapshot.manifest_path", "must not be empty"));
        }

        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(invalid(
                "server.bind",
                &format!("'{}' is not a socket address", self.server.bind),
            ));
        }

        for pattern in &self.repository.watch_paths {
            if let Err(e) = Glob::new(pattern) {
                return Err(invalid("repository.watch_paths", &e.to_string()));
            }
        }

        let public_url = &self.server.public_url;
        if !public_url.is_empty()
            && !public_url.starts_with("http://")
            && !public_url.starts_with("https://")
        {
            return Err(invalid(
                "server.public_url",
                &format!("must start with http:// or https://, got '{}'", public_url),
            ));
        }

        Ok(())
    }

    /// Apply `REGISTRY_MIRROR_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("REGISTRY_MIRROR_REPO_URL") {
            self.repository.url = Some(url);
        }

        if let Some(path) = lookup("REGISTRY_MIRROR_REPO_PATH") {
            self.repository.path = PathBuf::from(path);
        }

        if let Some(branch) = lookup("REGISTRY_MIRROR_BRANCH") {
            self.repository.branch = Some(branch);
        }

        if let Some(output) = lookup("REGISTRY_MIRROR_OUTPUT") {
            self.mirror.output_root = PathBuf::from(output);
        }

        if let Some(bind) = lookup("REGISTRY_MIRROR_BIND") {
            self.server.bind = bind;
        }

        if let Some(public_url) = lookup("REGISTRY_MIRROR_PUBLIC_URL") {
            self.server.public_url = public_url;
        }
    }

    /// Load, apply environment overrides, validate
    pub fn new(path: Option<&Path>) -> Result<Self, MirrorError> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: &str) -> MirrorError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.snapshot.manifest_path, PathBuf::from("registry.json"));
        assert_eq!(config.repository.watch_paths, vec!["registry/**".to_string()]);
        assert!(config.mirror.continue_on_error);
        assert!(config.repository.url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_bind() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(MirrorError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_validate_invalid_glob() {
        let mut config = Config::default();
        config.repository.watch_paths = vec!["registry/[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_public_url_scheme() {
        let mut config = Config::default();
        config.server.public_url = "ftp://mirror".to_string();
        assert!(config.validate().is_err());

        config.server.public_url = "https://mirror.example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.repository.branch = Some("main".to_string());
        config.snapshot.command = vec!["pnpm".to_string(), "build:registry".to_string()];
        config.mirror.continue_on_error = false;

        config.save(path).unwrap();
        let loaded = Config::from_file(path).unwrap();

        assert_eq!(loaded.repository.branch.as_deref(), Some("main"));
        assert_eq!(loaded.snapshot.command, config.snapshot.command);
        assert!(!loaded.mirror.continue_on_error);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "[server]\nbind = \"0.0.0.0:9000\"\n\n[repository]\nwatch_paths = [\"apps/www/registry/**\"]\n",
        )
        .unwrap();

        let loaded = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.server.bind, "0.0.0.0:9000");
        assert_eq!(loaded.repository.watch_paths, vec!["apps/www/registry/**"]);
        assert_eq!(loaded.snapshot.manifest_path, PathBuf::from("registry.json"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::from_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(
            result.unwrap_err(),
            MirrorError::Config(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[server\nbind = ").unwrap();
        assert!(matches!(
            Config::from_file(temp_file.path()).unwrap_err(),
            MirrorError::Config(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = [
            ("REGISTRY_MIRROR_REPO_URL", "https://example.com/ui.git"),
            ("REGISTRY_MIRROR_BRANCH", "main"),
            ("REGISTRY_MIRROR_OUTPUT", "/srv/mirror"),
            ("REGISTRY_MIRROR_BIND", "0.0.0.0:3000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.repository.url.as_deref(),
            Some("https://example.com/ui.git")
        );
        assert_eq!(config.repository.branch.as_deref(), Some("main"));
        assert_eq!(config.mirror.output_root, PathBuf::from("/srv/mirror"));
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert!(config.server.public_url.is_empty());
    }
}
