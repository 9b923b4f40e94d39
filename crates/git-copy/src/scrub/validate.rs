//! Post-rewrite validation of a scrubbed bare repository.
//!
//! Runs before anything is published: first every tree reachable from a
//! branch or tag ref is checked for forbidden paths, then every object
//! payload is scanned for the private username. The scan short-circuits
//! on the first violation.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::git::{self, GitError};

use super::pattern;

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("found forbidden path in target repo: {path} (ref {ref_name})")]
    ForbiddenPathPresent { path: String, ref_name: String },

    #[error("private username still present in scrubbed git objects")]
    PrivateIdentifierPresent,

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Validates the freshly rewritten bare repository at `bare_path`.
///
/// `forbidden_paths` are exact path matches supplied by the caller; the
/// protected directory family is always checked. An empty private username
/// validates trivially.
pub fn validate_scrubbed_repo(
    bare_path: &Path,
    private_username: &str,
    forbidden_paths: &[String],
) -> Result<(), ValidateError> {
    if private_username.is_empty() {
        return Ok(());
    }

    check_forbidden_paths(bare_path, forbidden_paths)?;
    check_residual_identifier(bare_path, private_username)
}

fn check_forbidden_paths(bare_path: &Path, forbidden: &[String]) -> Result<(), ValidateError> {
    let refs = git::list_refs(bare_path)?;
    for ref_name in refs.keys() {
        if !ref_name.starts_with("refs/heads/") && !ref_name.starts_with("refs/tags/") {
            continue;
        }
        let out = git::run(
            Some(bare_path),
            &["ls-tree", "-r", "--name-only", "--full-tree", ref_name],
        )?;
        for path in out.stdout_str().lines() {
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            if pattern::is_protected_path(path)
                || forbidden.iter().any(|bad| !bad.is_empty() && path == bad)
            {
                return Err(ValidateError::ForbiddenPathPresent {
                    path: path.to_string(),
                    ref_name: ref_name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Streams every object through `cat-file --batch-all-objects --batch` and
/// scans payloads (and headers) case-insensitively for the username.
fn check_residual_identifier(bare_path: &Path, private: &str) -> Result<(), ValidateError> {
    debug!(repo = %bare_path.display(), "scanning objects for residual identifier");

    let mut child = Command::new("git")
        .args(["cat-file", "--batch-all-objects", "--batch"])
        .current_dir(bare_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GitError::Spawn {
            cmd: "cat-file --batch-all-objects --batch".to_string(),
            source: e,
        })?;

    let needle = private.to_lowercase();
    let needle_bytes = needle.as_bytes();
    let mut reader = BufReader::new(child.stdout.take().expect("stdout piped"));

    let scan = (|| -> Result<(), ValidateError> {
        let mut header = String::new();
        loop {
            header.clear();
            if reader.read_line(&mut header)? == 0 {
                return Ok(());
            }
            let line = header.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split(' ');
            let (_sha, _kind, size) = match (parts.next(), parts.next(), parts.next()) {
                (Some(a), Some(b), Some(c)) => (a, b, c),
                _ => continue,
            };
            let size: usize = size.parse().unwrap_or(0);

            let mut payload = vec![0u8; size];
            reader.read_exact(&mut payload)?;
            // Trailing newline after each object payload.
            let mut nl = [0u8; 1];
            let _ = reader.read(&mut nl)?;

            payload.make_ascii_lowercase();
            if contains_subslice(&payload, needle_bytes) || line.to_lowercase().contains(&needle) {
                return Err(ValidateError::PrivateIdentifierPresent);
            }
        }
    })();

    match scan {
        Ok(()) => {
            let status = child.wait()?;
            if !status.success() {
                return Err(GitError::SubprocessFailed {
                    cmd: "cat-file --batch-all-objects --batch".to_string(),
                    stderr: drain_stderr(&mut child),
                }
                .into());
            }
            Ok(())
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(e)
        }
    }
}

fn drain_stderr(child: &mut std::process::Child) -> String {
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf);
    }
    buf.trim().to_string()
}

pub(crate) fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
