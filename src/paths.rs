/// Centralized platform-specific path computation
///
/// Follows the XDG Base Directory specification on Unix-like systems.
use std::path::PathBuf;

const APP_DIR: &str = "registry-mirror";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Data directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    std::env::var("HOME").map(|home| PathBuf::from(home).join(".local/share"))
                })
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Cache directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Caches
    /// - Linux/Unix: $XDG_CACHE_HOME or ~/.cache
    pub fn cache_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Caches"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".cache")))
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Config directory via `dirs`, falling back to the working directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    pub fn project_cache_dir() -> PathBuf {
        Self::cache_dir().join(APP_DIR)
    }

    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Working copy of the upstream repository
    ///
    /// Returns: {data_dir}/registry-mirror/checkout
    pub fn default_checkout_path() -> PathBuf {
        Self::project_data_dir().join("checkout")
    }

    /// Persisted mirror (`index.json` + `items/`)
    ///
    /// Returns: {data_dir}/registry-mirror/mirror
    pub fn default_output_root() -> PathBuf {
        Self::project_data_dir().join("mirror")
    }

    /// Set of commits already merged
    ///
    /// Returns: {cache_dir}/registry-mirror/sync_state.json
    pub fn default_sync_state_path() -> PathBuf {
        Self::project_cache_dir().join("sync_state.json")
    }

    /// Returns: {cache_dir}/registry-mirror/locks
    pub fn lock_dir() -> PathBuf {
        Self::project_cache_dir().join("locks")
    }

    /// Returns: {config_dir}/registry-mirror/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
