//! Configuration schema for per-repository replication and the daemon.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const REPO_CONFIG_VERSION: u32 = 1;

/// The per-repository config document (`.git-copy/config.json`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepoConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub private_username: String,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub defaults: TargetDefaults,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// Rule defaults shared by every target.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetDefaults {
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub opt_in: Vec<String>,
    #[serde(default)]
    pub replace_history_with_current: Vec<String>,
    /// Extra substring replacements, applied in the order written.
    #[serde(
        default,
        with = "ordered_pairs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub extra_replacements: Vec<(String, String)>,
}

/// One public replication target.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Target {
    pub label: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opt_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_history_with_current: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthRef>,
    /// "full" replicates all history; "future" only what comes after the
    /// first sync.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub initial_history_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_sync_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Target {
    /// The replacement token; falls back to the account name.
    pub fn effective_replacement(&self) -> &str {
        match self.replacement.as_deref() {
            Some(r) if !r.trim().is_empty() => r,
            _ => &self.account,
        }
    }
}

/// How to authenticate pushes to a target.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthRef {
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl RepoConfig {
    /// Normalizes and validates the document in place.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.version != REPO_CONFIG_VERSION && self.version != 0 {
            return Err(ConfigError::UnsupportedConfigVersion(self.version));
        }
        if self.private_username.trim().is_empty() {
            return Err(ConfigError::MissingPrivate);
        }
        if self.head_branch.trim().is_empty() {
            self.head_branch = "main".to_string();
        }

        let mut seen: HashSet<String> = HashSet::new();
        for (i, target) in self.targets.iter_mut().enumerate() {
            target.label = target.label.trim().to_string();
            if target.label.is_empty() {
                return Err(ConfigError::MissingTargetField {
                    target: format!("targets[{i}]"),
                    field: "label",
                });
            }
            if !seen.insert(target.label.to_lowercase()) {
                return Err(ConfigError::DuplicateTargetLabel(target.label.clone()));
            }
            if target.repo_url.trim().is_empty() {
                return Err(ConfigError::MissingTargetField {
                    target: target.label.clone(),
                    field: "repo_url",
                });
            }
            if target.account.trim().is_empty() {
                return Err(ConfigError::MissingTargetField {
                    target: target.label.clone(),
                    field: "account",
                });
            }
            if target.repo_name.trim().is_empty() {
                return Err(ConfigError::MissingTargetField {
                    target: target.label.clone(),
                    field: "repo_name",
                });
            }
            if target.initial_history_mode.is_empty() {
                target.initial_history_mode = "full".to_string();
            }
            if target.initial_history_mode != "full" && target.initial_history_mode != "future" {
                return Err(ConfigError::InvalidHistoryMode {
                    target: target.label.clone(),
                    value: target.initial_history_mode.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The starting config written by `init`.
pub fn default_config(private_username: &str, head_branch: &str) -> RepoConfig {
    RepoConfig {
        version: REPO_CONFIG_VERSION,
        private_username: private_username.to_string(),
        head_branch: head_branch.to_string(),
        defaults: TargetDefaults {
            exclude: vec![".git-copy/**".into(), "CLAUDE.md".into(), ".env".into()],
            ..TargetDefaults::default()
        },
        targets: Vec::new(),
    }
}

/// Daemon configuration (`<user-config>/git-copy/daemon.json`).
/// The polling loop itself lives outside the core; this is its contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// Poll interval in seconds.
    #[serde(default)]
    pub poll_interval: u64,
    #[serde(default)]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub max_concurrent: usize,
    #[serde(default)]
    pub notify_on_error: bool,
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            roots: vec![home.clone()],
            poll_interval: 30,
            cache_dir: home.join(".cache").join("git-copy"),
            max_concurrent: 2,
            notify_on_error: true,
        }
    }
}

/// Serializes `Vec<(String, String)>` as a JSON object, preserving the
/// user-written order on both read and write.
mod ordered_pairs {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        pairs: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (k, v) in pairs {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of replacement strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    pairs.push((k, v));
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}
