//! Per-repository sync state (`.git-copy/state.json`).
//!
//! The state file is memory, not configuration: fingerprints of the last
//! successful sync per target, used only for skip decisions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::META_DIR;
use crate::error::StateError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepoState {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetState {
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error: String,
    /// Fingerprint of the source ref map at the last successful sync.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_private_refs: String,
    /// Fingerprint of the scrubbed repo's refs after the last push. Kept
    /// for forward compatibility; skip decisions never read it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_public_push: String,
    /// Fingerprint of the ruleset at the last successful sync.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_config_hash: String,
}

pub fn state_path(repo_path: &Path) -> PathBuf {
    repo_path.join(META_DIR).join("state.json")
}

/// Loads the state; a missing file yields an empty state.
pub fn load(repo_path: &Path) -> Result<RepoState, StateError> {
    let path = state_path(repo_path);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RepoState::default()),
        Err(e) => return Err(StateError::ReadFile { path, source: e }),
    };
    let state: RepoState = serde_json::from_str(&content)?;
    Ok(state)
}

/// Saves the state with `0600` permissions, creating parent directories
/// and refreshing `updated_at`.
pub fn save(repo_path: &Path, state: &mut RepoState) -> Result<(), StateError> {
    state.updated_at = Some(Utc::now());
    let path = state_path(repo_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StateError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let body = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, body).map_err(|e| StateError::WriteFile {
        path: path.clone(),
        source: e,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms).map_err(|e| StateError::WriteFile {
            path,
            source: e,
        })?;
    }
    Ok(())
}
