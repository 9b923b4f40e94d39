//! Authentication environment for pushes.
//!
//! Publication relies on git's own credential machinery; the only thing the
//! driver injects is a `GH_TOKEN` for GitHub HTTPS targets, resolved from
//! the environment variable the target's auth reference names.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::schema::Target;

/// Resolves a secret from the named environment variable.
fn token_from_env(name: &str) -> Option<SecretString> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(SecretString::new(value)),
        _ => None,
    }
}

/// Environment variables to set when pushing to `target`.
///
/// Only GitHub HTTPS URLs need a token injected; SSH remotes and other
/// hosts authenticate through git's configured credentials.
pub fn push_env(target: &Target) -> Vec<(String, String)> {
    if !target.repo_url.starts_with("https://") || !target.repo_url.contains("github.com") {
        return Vec::new();
    }

    let Some(auth) = &target.auth else {
        return Vec::new();
    };
    let Some(env_name) = &auth.token_env else {
        return Vec::new();
    };
    match token_from_env(env_name) {
        Some(token) => {
            debug!(target = %target.label, env = %env_name, "injecting GH_TOKEN for push");
            vec![("GH_TOKEN".to_string(), token.expose_secret().to_string())]
        }
        None => Vec::new(),
    }
}
