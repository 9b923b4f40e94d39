//! Loading and saving configuration documents.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::git;

use super::schema::{DaemonConfig, RepoConfig};

/// Directory under the repository root that holds git-copy's own files.
pub const META_DIR: &str = ".git-copy";

pub fn repo_config_path(repo_path: &Path) -> PathBuf {
    repo_path.join(META_DIR).join("config.json")
}

pub fn load_repo_config(path: &Path) -> Result<RepoConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_repo_config_from_str(&content)
}

pub fn load_repo_config_from_str(content: &str) -> Result<RepoConfig, ConfigError> {
    let mut config: RepoConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn save_repo_config(path: &Path, config: &RepoConfig) -> Result<(), ConfigError> {
    let mut config = config.clone();
    config.validate()?;
    let body = serde_json::to_string_pretty(&config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, body).map_err(|e| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Loads `.git-copy/config.json` from the working tree when present, and
/// otherwise from the main/master branch via `git show`: the config is
/// authoritative on the head branch even when another branch is checked
/// out.
pub fn load_repo_config_from_any_branch(repo_path: &Path) -> Result<RepoConfig, ConfigError> {
    let path = repo_config_path(repo_path);
    match std::fs::read_to_string(&path) {
        Ok(content) => return load_repo_config_from_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(ConfigError::ReadFile {
                path,
                source: e,
            })
        }
    }

    for branch in ["main", "master"] {
        let spec = format!("{branch}:{META_DIR}/config.json");
        match git::show(repo_path, &spec) {
            Ok(bytes) => {
                debug!(branch, "loaded config from branch");
                let content = String::from_utf8_lossy(&bytes);
                return load_repo_config_from_str(&content);
            }
            Err(_) => continue,
        }
    }

    Err(ConfigError::NotFound(repo_path.to_path_buf()))
}

pub fn daemon_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("git-copy").join("daemon.json"))
}

/// Loads the daemon config, backfilling unset fields from the defaults.
/// A missing file yields the defaults.
pub fn load_daemon_config() -> Result<DaemonConfig, ConfigError> {
    let Some(path) = daemon_config_path() else {
        return Ok(DaemonConfig::default());
    };
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DaemonConfig::default())
        }
        Err(e) => return Err(ConfigError::ReadFile { path, source: e }),
    };
    let mut config: DaemonConfig = serde_json::from_str(&content)?;
    let defaults = DaemonConfig::default();
    if config.poll_interval == 0 {
        config.poll_interval = defaults.poll_interval;
    }
    if config.cache_dir.as_os_str().is_empty() {
        config.cache_dir = defaults.cache_dir;
    }
    if config.max_concurrent == 0 {
        config.max_concurrent = defaults.max_concurrent;
    }
    if config.roots.is_empty() {
        config.roots = defaults.roots;
    }
    Ok(config)
}
