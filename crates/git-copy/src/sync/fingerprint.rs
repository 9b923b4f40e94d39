//! Change-detection fingerprints.
//!
//! These digests exist only to decide whether a target needs a rebuild;
//! they are never a security boundary. Lists are sorted before hashing so
//! that reordering equivalent configuration does not force a resync.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::schema::{RepoConfig, Target};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprint of a reference map: sorted `ref=oid` lines, hashed.
pub fn refs_fingerprint(refs: &BTreeMap<String, String>) -> String {
    let mut buf = String::new();
    for (name, oid) in refs {
        buf.push_str(name);
        buf.push('=');
        buf.push_str(oid);
        buf.push('\n');
    }
    sha256_hex(buf.as_bytes())
}

/// The scrub-affecting fields of one target's effective configuration,
/// in canonical form. Field order is fixed by the struct; lists are
/// sorted; the extra-replacement pairs are keyed canonically.
#[derive(Serialize)]
struct RulePayload<'a> {
    version: u32,

    private_username: &'a str,
    head_branch: &'a str,

    target_label: &'a str,
    provider: &'a str,
    account: &'a str,
    repo_name: &'a str,
    repo_url: &'a str,
    replacement: &'a str,
    public_author_name: &'a str,
    public_author_email: &'a str,
    initial_history_mode: &'a str,

    exclude: Vec<String>,
    opt_in: Vec<String>,
    replace_history_with_current: Vec<String>,
    extra_replacements: BTreeMap<&'a str, &'a str>,
}

/// Fingerprint of everything that affects scrubbing or publication for
/// one target.
pub fn rules_fingerprint(cfg: &RepoConfig, target: &Target) -> String {
    let mut exclude = merged(&cfg.defaults.exclude, &target.exclude);
    let mut opt_in = merged(&cfg.defaults.opt_in, &target.opt_in);
    let mut collapse = merged(
        &cfg.defaults.replace_history_with_current,
        &target.replace_history_with_current,
    );
    exclude.sort();
    opt_in.sort();
    collapse.sort();

    let extra: BTreeMap<&str, &str> = cfg
        .defaults
        .extra_replacements
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let payload = RulePayload {
        version: 1,
        private_username: &cfg.private_username,
        head_branch: &cfg.head_branch,
        target_label: &target.label,
        provider: &target.provider,
        account: &target.account,
        repo_name: &target.repo_name,
        repo_url: &target.repo_url,
        replacement: target.effective_replacement(),
        public_author_name: target.public_author_name.as_deref().unwrap_or(""),
        public_author_email: target.public_author_email.as_deref().unwrap_or(""),
        initial_history_mode: &target.initial_history_mode,
        exclude,
        opt_in,
        replace_history_with_current: collapse,
        extra_replacements: extra,
    };

    let body = serde_json::to_vec(&payload).expect("payload serializes");
    sha256_hex(&body)
}

fn merged(defaults: &[String], extra: &[String]) -> Vec<String> {
    defaults.iter().chain(extra.iter()).cloned().collect()
}

/// Cache key for a repository: a short hex prefix of the SHA-256 of its
/// canonical absolute path.
pub fn repo_cache_key(repo_path: &Path) -> String {
    let canonical = std::fs::canonicalize(repo_path).unwrap_or_else(|_| repo_path.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(&digest[..8])
}
