//! The per-target synchronization driver.
//!
//! For each target: freshen the source, fingerprint refs and rules, skip
//! when nothing changed, otherwise rebuild the scrubbed bare repository
//! (export | filter | import), validate it, atomically commit it to the
//! cache, mirror-push it, and record the outcome.

pub mod fingerprint;

use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::schema::{RepoConfig, Target};
use crate::error::GitCopyError;
use crate::git::{self, auth, GitError};
use crate::scrub::{
    validate_scrubbed_repo, CompiledRules, ExportFilter, FilterError, Rules, RulesError,
    ValidateError,
};
use crate::state;

pub use fingerprint::{refs_fingerprint, repo_cache_key, rules_fingerprint};

/// Sensitive files the validator checks by exact name when they were not
/// explicitly opted in.
const SENSITIVE_FILES: &[&str] = &[".env", "CLAUDE.md"];

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("export filter failed: {0}")]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("failed to move scrubbed repo into place: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Cache root; defaults to the user cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Restrict the sync to one target label.
    pub only_target: Option<String>,
    /// Validate the scrubbed repository before publishing.
    pub validate: bool,
    /// Checked between targets; when set, no further targets are started.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            cache_dir: None,
            only_target: None,
            validate: true,
            cancel: None,
        }
    }
}

/// Outcome of one target's sync attempt.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub label: String,
    pub repo_url: String,
    /// Short hash of the source HEAD.
    pub source_commit: String,
    /// False when the target was already up to date.
    pub did_work: bool,
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cache")
        })
        .join("git-copy")
}

/// Synchronizes every configured target (or the selected one) of a
/// repository. Per-target failures are recorded in the outcome and the
/// state file; they do not abort the remaining targets.
pub fn sync_repo(
    repo_path: &Path,
    cfg: &RepoConfig,
    opts: &SyncOptions,
) -> Result<Vec<TargetOutcome>, GitCopyError> {
    let mut cfg = cfg.clone();
    cfg.validate()?;

    // Freshen the source first, best effort.
    match git::has_clean_worktree(repo_path) {
        Ok(true) => {
            if let Err(e) = git::pull_rebase_autostash(repo_path) {
                debug!(error = %e, "pull --rebase --autostash failed; continuing");
            }
        }
        _ => {
            if let Err(e) = git::fetch_all(repo_path) {
                debug!(error = %e, "fetch --all failed; continuing");
            }
        }
    }

    let private_refs = git::list_refs(repo_path).map_err(SyncError::Git)?;
    let private_refs_hash = refs_fingerprint(&private_refs);

    let mut st = state::load(repo_path).unwrap_or_default();
    let repo_key = repo_cache_key(repo_path);
    let source_commit = git::head_short(repo_path);

    let mut results = Vec::new();
    for target in &cfg.targets {
        if let Some(only) = &opts.only_target {
            if &target.label != only {
                continue;
            }
        }
        if let Some(cancel) = &opts.cancel {
            if cancel.load(Ordering::Relaxed) {
                info!("sync cancelled; skipping remaining targets");
                break;
            }
        }

        let config_hash = rules_fingerprint(&cfg, target);
        let ts = st.targets.entry(target.label.clone()).or_default();

        if ts.last_private_refs == private_refs_hash
            && ts.last_config_hash == config_hash
            && ts.last_error.is_empty()
        {
            debug!(target = %target.label, "fingerprints unchanged; up to date");
            results.push(TargetOutcome {
                label: target.label.clone(),
                repo_url: target.repo_url.clone(),
                source_commit: source_commit.clone(),
                did_work: false,
                error: None,
            });
            continue;
        }

        let outcome = sync_target(repo_path, &repo_key, &cfg, target, opts);
        match &outcome {
            Ok(()) => {
                ts.last_sync_at = Some(chrono::Utc::now());
                ts.last_error.clear();
                ts.last_private_refs = private_refs_hash.clone();
                ts.last_config_hash = config_hash;
                info!(target = %target.label, "synced");
            }
            Err(e) => {
                // Fingerprints stay untouched so the next run retries.
                ts.last_error = e.to_string();
                warn!(target = %target.label, error = %e, "sync failed");
            }
        }
        results.push(TargetOutcome {
            label: target.label.clone(),
            repo_url: target.repo_url.clone(),
            source_commit: source_commit.clone(),
            did_work: true,
            error: outcome.err().map(|e| e.to_string()),
        });

        if let Err(e) = state::save(repo_path, &mut st) {
            warn!(error = %e, "failed to persist sync state");
        }
    }

    Ok(results)
}

/// The exact-match forbidden files for validation: sensitive names that
/// were not explicitly opted in.
fn forbidden_paths(opt_in: &[String]) -> Vec<String> {
    SENSITIVE_FILES
        .iter()
        .filter(|name| !opt_in.iter().any(|p| p == *name))
        .map(|name| name.to_string())
        .collect()
}

fn sync_target(
    repo_path: &Path,
    repo_key: &str,
    cfg: &RepoConfig,
    target: &Target,
    opts: &SyncOptions,
) -> Result<(), SyncError> {
    let exclude = merge_lists(&cfg.defaults.exclude, &target.exclude);
    let opt_in = merge_lists(&cfg.defaults.opt_in, &target.opt_in);
    let collapse = merge_lists(
        &cfg.defaults.replace_history_with_current,
        &target.replace_history_with_current,
    );

    // Current content at HEAD for collapse paths; files absent from HEAD
    // yield no content and disappear from history entirely.
    let mut collapse_content = HashMap::new();
    for path in &collapse {
        match git::show(repo_path, &format!("HEAD:{path}")) {
            Ok(bytes) => {
                collapse_content.insert(path.clone(), bytes);
            }
            Err(e) => debug!(path = %path, error = %e, "collapse path not present at HEAD"),
        }
    }

    let rules = CompiledRules::compile(Rules {
        private_username: cfg.private_username.clone(),
        replacement: target.effective_replacement().to_string(),
        extra_replacements: cfg.defaults.extra_replacements.clone(),
        exclude_patterns: exclude,
        opt_in_paths: opt_in.clone(),
        replace_history_paths: collapse,
        replace_history_content: collapse_content,
        public_author_name: target.public_author_name.clone().unwrap_or_default(),
        public_author_email: target.public_author_email.clone().unwrap_or_default(),
    })?;

    let cache_dir = opts
        .cache_dir
        .clone()
        .unwrap_or_else(default_cache_dir)
        .join(repo_key);
    std::fs::create_dir_all(&cache_dir)?;
    let final_bare = cache_dir.join(format!("{}.git", target.label));
    let tmp_bare = cache_dir.join(format!("{}.tmp.git", target.label));

    let _ = std::fs::remove_dir_all(&tmp_bare);
    git::init_bare(&tmp_bare)?;

    if let Err(e) = scrub_into(repo_path, &tmp_bare, rules) {
        let _ = std::fs::remove_dir_all(&tmp_bare);
        return Err(e);
    }

    if opts.validate {
        if let Err(e) =
            validate_scrubbed_repo(&tmp_bare, &cfg.private_username, &forbidden_paths(&opt_in))
        {
            let _ = std::fs::remove_dir_all(&tmp_bare);
            return Err(e.into());
        }
    }

    // Atomic commit of the cache: remove-then-rename.
    let _ = std::fs::remove_dir_all(&final_bare);
    std::fs::rename(&tmp_bare, &final_bare).map_err(|source| SyncError::RenameFailed {
        from: tmp_bare.clone(),
        to: final_bare.clone(),
        source,
    })?;

    git::push_mirror(&final_bare, &target.repo_url, &auth::push_env(target))?;
    Ok(())
}

fn merge_lists(defaults: &[String], extra: &[String]) -> Vec<String> {
    defaults.iter().chain(extra.iter()).cloned().collect()
}

fn stderr_collector(stderr: Option<ChildStderr>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf.trim().to_string()
    })
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Runs export | filter | import into `dst_bare`, which must be an
/// initialized empty bare repository.
///
/// Teardown order is load-bearing: the filter is joined first because it
/// owns the exporter's stdout; reaping the exporter before that pipe is
/// drained can deadlock on large histories. Only then are the exporter
/// and importer reaped, in that order.
pub fn scrub_into(repo_path: &Path, dst_bare: &Path, rules: CompiledRules) -> Result<(), SyncError> {
    let mut importer = git::spawn_fast_import(dst_bare)?;
    let mut exporter = match git::spawn_fast_export(repo_path, git::FAST_EXPORT_ARGS) {
        Ok(child) => child,
        Err(e) => {
            kill_and_reap(&mut importer);
            return Err(e.into());
        }
    };

    let export_stdout = exporter.stdout.take().expect("stdout piped");
    let import_stdin = importer.stdin.take().expect("stdin piped");
    let export_stderr = stderr_collector(exporter.stderr.take());
    let import_stderr = stderr_collector(importer.stderr.take());

    let mut filter = ExportFilter::new(rules);
    let filter_handle = thread::spawn(move || -> Result<(), FilterError> {
        // Dropping import_stdin at the end of this closure closes the
        // importer's pipe and lets it finish.
        filter.run(BufReader::new(export_stdout), import_stdin)
    });

    let filter_result = filter_handle.join().unwrap_or_else(|_| {
        Err(FilterError::Io(std::io::Error::other(
            "filter thread panicked",
        )))
    });

    let export_status =
        git::wait_with_deadline(&mut exporter, git::SHORT_CMD_TIMEOUT, "fast-export");
    let export_stderr = export_stderr.join().unwrap_or_default();
    match export_status {
        Ok(status) if status.success() => {}
        Ok(_) => {
            kill_and_reap(&mut importer);
            return Err(GitError::SubprocessFailed {
                cmd: "fast-export".to_string(),
                stderr: export_stderr,
            }
            .into());
        }
        Err(e) => {
            kill_and_reap(&mut importer);
            return Err(e.into());
        }
    }

    if let Err(e) = filter_result {
        kill_and_reap(&mut importer);
        return Err(e.into());
    }

    let import_status =
        git::wait_with_deadline(&mut importer, git::SHORT_CMD_TIMEOUT, "fast-import")?;
    let import_stderr = import_stderr.join().unwrap_or_default();
    if !import_status.success() {
        return Err(GitError::SubprocessFailed {
            cmd: "fast-import --force --quiet".to_string(),
            stderr: import_stderr,
        }
        .into());
    }

    // Condense the freshly imported objects; best effort.
    if let Err(e) = git::repack(dst_bare) {
        debug!(error = %e, "repack after import failed");
    }
    Ok(())
}
