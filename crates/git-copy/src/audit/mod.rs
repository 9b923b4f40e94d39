//! Independent post-hoc verification of a bare repository.
//!
//! The audit never treats a finding as an error: it collects everything it
//! can (up to per-category caps) and reports. It runs against the local
//! scrubbed cache or a fresh mirror clone of the published remote.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

use crate::git::{self, GitError};

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("a repository path is required")]
    MissingRepoPath,

    #[error("a remote URL is required")]
    MissingRemoteUrl,

    #[error("unexpected cat-file header: '{0}'")]
    UnexpectedCatFileHeader(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Paths that must not appear anywhere in reachable history.
    pub forbidden_paths: Vec<String>,
    /// Substrings that must not appear in any reachable blob.
    pub forbidden_strings: Vec<String>,
    pub case_insensitive: bool,
    /// Files whose content must be identical at their first introduction
    /// and at HEAD.
    pub replace_history_files: Vec<String>,
    /// Blobs larger than this are skipped.
    pub max_blob_bytes: u64,
    /// Cap on findings per category.
    pub max_hits: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            forbidden_paths: vec![
                ".git-copy".into(),
                ".claude".into(),
                "CLAUDE.md".into(),
                ".env".into(),
                ".envrc".into(),
            ],
            forbidden_strings: Vec::new(),
            case_insensitive: true,
            replace_history_files: Vec::new(),
            max_blob_bytes: 5 * 1024 * 1024,
            max_hits: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    PathHistory,
    StringHit,
    ReplaceHistoryMismatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub path: String,
    /// Commit sha for history findings, blob sha for string hits.
    pub reference: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub repo_path: PathBuf,
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Audits a bare repository and returns the findings report.
pub fn audit_bare_repo(bare_path: &Path, opts: &AuditOptions) -> Result<Report, AuditError> {
    if bare_path.as_os_str().is_empty() {
        return Err(AuditError::MissingRepoPath);
    }
    let opts = normalize_options(opts.clone());
    let mut findings = Vec::new();

    // 1) Forbidden paths anywhere in reachable history.
    for path in &opts.forbidden_paths {
        let out = git::run(Some(bare_path), &["rev-list", "--all", "--", path])?;
        for (i, sha) in non_empty_lines(&out.stdout_str()).into_iter().enumerate() {
            if i >= opts.max_hits {
                break;
            }
            findings.push(Finding {
                kind: FindingKind::PathHistory,
                path: path.clone(),
                reference: sha,
                detail: "path exists in reachable history".into(),
            });
        }
    }

    // 2) Collapsed files must match HEAD at their first introduction.
    for path in &opts.replace_history_files {
        let Ok(head) = git::show(bare_path, &format!("HEAD:{path}")) else {
            continue;
        };
        let Some(first_sha) = first_commit_touching(bare_path, path)? else {
            continue;
        };
        let Ok(first) = git::show(bare_path, &format!("{first_sha}:{path}")) else {
            continue;
        };
        if head != first {
            findings.push(Finding {
                kind: FindingKind::ReplaceHistoryMismatch,
                path: path.clone(),
                reference: first_sha,
                detail: "file content at first introduction does not match HEAD".into(),
            });
        }
    }

    // 3) Forbidden substrings in reachable blobs.
    if !opts.forbidden_strings.is_empty() {
        findings.extend(scan_reachable_blobs(bare_path, &opts)?);
    }

    Ok(Report {
        repo_path: bare_path.to_path_buf(),
        findings,
    })
}

/// A mirror clone in a temporary directory; removed on drop.
pub struct MirrorClone {
    path: PathBuf,
    _tmp: TempDir,
}

impl MirrorClone {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Clones `remote_url` with `--mirror` into a fresh temporary directory so
/// the published repository itself can be audited. GitHub pull-request
/// refs are fetched best-effort afterwards.
pub fn clone_mirror_to_temp(remote_url: &str) -> Result<MirrorClone, AuditError> {
    if remote_url.trim().is_empty() {
        return Err(AuditError::MissingRemoteUrl);
    }
    let tmp = TempDir::with_prefix("git-copy-audit-")?;
    let dst = tmp.path().join("repo.git");
    let dst_str = dst.to_string_lossy().to_string();

    git::run(None, &["clone", "--mirror", remote_url, &dst_str])?;

    let pr_fetch = git::run(
        Some(&dst),
        &[
            "fetch",
            "origin",
            "+refs/pull/*/head:refs/pull/*/head",
            "+refs/pull/*/merge:refs/pull/*/merge",
        ],
    );
    if let Err(e) = pr_fetch {
        debug!(error = %e, "PR ref fetch failed; continuing");
    }

    Ok(MirrorClone { path: dst, _tmp: tmp })
}

fn normalize_options(mut opts: AuditOptions) -> AuditOptions {
    let defaults = AuditOptions::default();
    if opts.max_blob_bytes == 0 {
        opts.max_blob_bytes = defaults.max_blob_bytes;
    }
    if opts.max_hits == 0 {
        opts.max_hits = defaults.max_hits;
    }

    // De-duplicate needles, case-insensitively when the scan is.
    let mut seen = HashSet::new();
    opts.forbidden_strings.retain(|s| {
        let s = s.trim();
        if s.is_empty() {
            return false;
        }
        let key = if opts.case_insensitive {
            s.to_lowercase()
        } else {
            s.to_string()
        };
        seen.insert(key)
    });

    opts.forbidden_paths = normalize_list(&opts.forbidden_paths);
    opts.replace_history_files = normalize_list(&opts.replace_history_files);
    opts
}

fn normalize_list(list: &[String]) -> Vec<String> {
    let mut out: Vec<String> = list
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    out.sort();
    out
}

fn non_empty_lines(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn first_commit_touching(repo: &Path, path: &str) -> Result<Option<String>, AuditError> {
    let out = git::run(Some(repo), &["rev-list", "--reverse", "--all", "--", path])?;
    Ok(non_empty_lines(&out.stdout_str()).into_iter().next())
}

/// Enumerates reachable objects with their paths, filters to blobs under
/// the size cap, and streams their contents through the substring search.
fn scan_reachable_blobs(repo: &Path, opts: &AuditOptions) -> Result<Vec<Finding>, AuditError> {
    let rev = git::run(Some(repo), &["rev-list", "--objects", "--all"])?;
    let mut obj_to_path: HashMap<String, String> = HashMap::new();
    let mut obj_list = String::new();
    for line in rev.stdout_str().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(' ') {
            Some((sha, path)) => {
                obj_list.push_str(sha);
                obj_list.push('\n');
                obj_to_path.entry(sha.to_string()).or_insert_with(|| path.to_string());
            }
            None => {
                obj_list.push_str(line);
                obj_list.push('\n');
            }
        }
    }

    let blob_shas = list_blobs_under_cap(repo, &obj_list, opts.max_blob_bytes)?;
    if blob_shas.is_empty() {
        return Ok(Vec::new());
    }

    let needles: Vec<(Vec<u8>, String)> = opts
        .forbidden_strings
        .iter()
        .map(|s| {
            let needle = if opts.case_insensitive {
                s.to_lowercase().into_bytes()
            } else {
                s.clone().into_bytes()
            };
            (needle, s.clone())
        })
        .collect();

    let mut child = Command::new("git")
        .args(["cat-file", "--batch"])
        .current_dir(repo)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| GitError::Spawn {
            cmd: "cat-file --batch".to_string(),
            source: e,
        })?;

    let mut stdin = child.stdin.take().expect("stdin piped");
    let shas_for_writer = blob_shas.clone();
    let writer = thread::spawn(move || {
        for sha in &shas_for_writer {
            if writeln!(stdin, "{sha}").is_err() {
                break;
            }
        }
        // Dropping stdin signals EOF to cat-file.
    });

    let mut reader = BufReader::new(child.stdout.take().expect("stdout piped"));
    let mut findings = Vec::new();

    let scan = (|| -> Result<(), AuditError> {
        let case_insensitive = opts.case_insensitive;
        for _ in &blob_shas {
            let mut header = String::new();
            if reader.read_line(&mut header)? == 0 {
                break;
            }
            let header = header.trim();
            if header.is_empty() {
                continue;
            }
            if header.ends_with(" missing") {
                continue;
            }
            let parts: Vec<&str> = header.split(' ').collect();
            if parts.len() < 3 {
                return Err(AuditError::UnexpectedCatFileHeader(header.to_string()));
            }
            let sha = parts[0];
            let kind = parts[1];
            let size: usize = parts[2]
                .parse()
                .map_err(|_| AuditError::UnexpectedCatFileHeader(header.to_string()))?;

            let mut payload = vec![0u8; size];
            reader.read_exact(&mut payload)?;
            let mut nl = [0u8; 1];
            let _ = reader.read(&mut nl)?;

            if kind != "blob" {
                continue;
            }
            if case_insensitive {
                payload.make_ascii_lowercase();
            }
            for (needle, original) in &needles {
                if needle.is_empty() {
                    continue;
                }
                if payload.windows(needle.len()).any(|w| w == &needle[..]) {
                    findings.push(Finding {
                        kind: FindingKind::StringHit,
                        path: obj_to_path.get(sha).cloned().unwrap_or_default(),
                        reference: sha.to_string(),
                        detail: format!("contains forbidden string '{original}'"),
                    });
                    break;
                }
            }
            if findings.len() >= opts.max_hits {
                break;
            }
        }
        Ok(())
    })();

    match scan {
        Ok(()) => {
            let _ = writer.join();
            let _ = child.wait();
            Ok(findings)
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = writer.join();
            Err(e)
        }
    }
}

fn list_blobs_under_cap(
    repo: &Path,
    obj_list: &str,
    max_blob_bytes: u64,
) -> Result<Vec<String>, AuditError> {
    let mut child = Command::new("git")
        .args([
            "cat-file",
            "--batch-check=%(objectname) %(objecttype) %(objectsize)",
        ])
        .current_dir(repo)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GitError::Spawn {
            cmd: "cat-file --batch-check".to_string(),
            source: e,
        })?;

    child
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(obj_list.as_bytes())?;

    let mut stdout = String::new();
    child
        .stdout
        .take()
        .expect("stdout piped")
        .read_to_string(&mut stdout)?;
    let status = child.wait()?;
    if !status.success() {
        return Err(GitError::SubprocessFailed {
            cmd: "cat-file --batch-check".to_string(),
            stderr: String::new(),
        }
        .into());
    }

    let mut blobs = Vec::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.trim().split(' ').collect();
        if parts.len() != 3 || parts[1] != "blob" {
            continue;
        }
        let Ok(size) = parts[2].parse::<u64>() else {
            continue;
        };
        if max_blob_bytes > 0 && size > max_blob_bytes {
            continue;
        }
        blobs.push(parts[0].to_string());
    }
    Ok(blobs)
}
