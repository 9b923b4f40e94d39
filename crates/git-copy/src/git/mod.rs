//! Thin subprocess adapter over the host `git` binary.
//!
//! Every operation the core needs is a subprocess call; nothing here
//! parses git's object format. Short commands are bounded by a ten-minute
//! deadline, the mirror push by twenty minutes.

pub mod auth;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

pub const SHORT_CMD_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Error, Debug)]
pub enum GitError {
    #[error("git {cmd} failed: {stderr}")]
    SubprocessFailed { cmd: String, stderr: String },

    #[error("git {cmd} timed out after {}s", timeout.as_secs())]
    Timeout { cmd: String, timeout: Duration },

    #[error("failed to spawn git {cmd}: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Captured output of a finished git command.
#[derive(Debug, Default)]
pub struct CmdOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CmdOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs a git command with the default short-command deadline.
pub fn run(dir: Option<&Path>, args: &[&str]) -> Result<CmdOutput, GitError> {
    run_with(dir, args, SHORT_CMD_TIMEOUT, &[])
}

/// Runs a git command with an explicit deadline and extra environment.
pub fn run_with(
    dir: Option<&Path>,
    args: &[&str],
    timeout: Duration,
    env: &[(String, String)],
) -> Result<CmdOutput, GitError> {
    let cmd_desc = args.join(" ");
    debug!(cmd = %cmd_desc, "running git");

    let mut command = Command::new("git");
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|e| GitError::Spawn {
        cmd: cmd_desc.clone(),
        source: e,
    })?;

    let stdout_pipe = child.stdout.take().expect("stdout piped");
    let stderr_pipe = child.stderr.take().expect("stderr piped");
    let stdout_thread = thread::spawn(move || drain(stdout_pipe));
    let stderr_thread = thread::spawn(move || drain(stderr_pipe));

    let status = wait_with_deadline(&mut child, timeout, &cmd_desc)?;

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr_bytes = stderr_thread.join().unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr_bytes).trim().to_string();

    if !status.success() {
        return Err(GitError::SubprocessFailed {
            cmd: cmd_desc,
            stderr,
        });
    }
    Ok(CmdOutput { stdout, stderr })
}

fn drain(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    buf
}

/// Polls a child until it exits or the deadline passes; on timeout the
/// child is killed.
pub fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    cmd_desc: &str,
) -> Result<std::process::ExitStatus, GitError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GitError::Timeout {
                cmd: cmd_desc.to_string(),
                timeout,
            });
        }
        thread::sleep(Duration::from_millis(25));
    }
}

pub fn is_repository(path: &Path) -> bool {
    run(Some(path), &["rev-parse", "--is-inside-work-tree"]).is_ok()
}

pub fn toplevel(path: &Path) -> Result<PathBuf, GitError> {
    let out = run(Some(path), &["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(out.stdout_str().trim()))
}

/// Current branch name, or `None` when HEAD is detached.
pub fn current_branch(path: &Path) -> Option<String> {
    run(Some(path), &["symbolic-ref", "--quiet", "--short", "HEAD"])
        .ok()
        .map(|out| out.stdout_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

pub fn has_clean_worktree(path: &Path) -> Result<bool, GitError> {
    let out = run(Some(path), &["status", "--porcelain"])?;
    Ok(out.stdout_str().trim().is_empty())
}

pub fn pull_rebase_autostash(path: &Path) -> Result<(), GitError> {
    run(Some(path), &["pull", "--rebase", "--autostash"]).map(|_| ())
}

pub fn fetch_all(path: &Path) -> Result<(), GitError> {
    run(Some(path), &["fetch", "--all", "--prune"]).map(|_| ())
}

/// All refs with their object ids. An empty repository (where `show-ref`
/// exits nonzero) yields an empty map.
pub fn list_refs(path: &Path) -> Result<BTreeMap<String, String>, GitError> {
    let out = match run(Some(path), &["show-ref"]) {
        Ok(out) => out,
        Err(GitError::SubprocessFailed { .. }) => return Ok(BTreeMap::new()),
        Err(e) => return Err(e),
    };
    let mut refs = BTreeMap::new();
    for line in out.stdout_str().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((oid, name)) = line.split_once(' ') {
            refs.insert(name.to_string(), oid.to_string());
        }
    }
    Ok(refs)
}

/// Short hash of HEAD; empty when the repository has no commits.
pub fn head_short(path: &Path) -> String {
    run(Some(path), &["rev-parse", "--short", "HEAD"])
        .map(|out| out.stdout_str().trim().to_string())
        .unwrap_or_default()
}

/// Reads an object's content, e.g. `show(repo, "HEAD:LICENSE")`.
pub fn show(path: &Path, spec: &str) -> Result<Vec<u8>, GitError> {
    run(Some(path), &["show", spec]).map(|out| out.stdout)
}

pub fn init_bare(path: &Path) -> Result<(), GitError> {
    let path_str = path.to_string_lossy();
    run(None, &["init", "--bare", &path_str]).map(|_| ())
}

/// Condenses loose objects after an import.
pub fn repack(path: &Path) -> Result<(), GitError> {
    run(Some(path), &["repack", "-adq"]).map(|_| ())
}

pub fn push_mirror(
    bare_path: &Path,
    remote_url: &str,
    env: &[(String, String)],
) -> Result<(), GitError> {
    run_with(
        Some(bare_path),
        &["push", "--mirror", "--force", remote_url],
        PUSH_TIMEOUT,
        env,
    )
    .map(|_| ())
}

/// Spawns `git fast-export` with stdout piped; the caller owns the stream.
pub fn spawn_fast_export(repo_path: &Path, args: &[&str]) -> Result<Child, GitError> {
    let mut all_args = vec!["fast-export"];
    all_args.extend_from_slice(args);
    let cmd_desc = all_args.join(" ");
    Command::new("git")
        .args(&all_args)
        .current_dir(repo_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GitError::Spawn {
            cmd: cmd_desc,
            source: e,
        })
}

/// Spawns `git fast-import --force --quiet` with stdin piped.
pub fn spawn_fast_import(bare_path: &Path) -> Result<Child, GitError> {
    Command::new("git")
        .args(["fast-import", "--force", "--quiet"])
        .current_dir(bare_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GitError::Spawn {
            cmd: "fast-import --force --quiet".to_string(),
            source: e,
        })
}

/// Arguments the driver passes to `fast-export` for a full-history scrub.
pub const FAST_EXPORT_ARGS: &[&str] =
    &["--all", "--signed-tags=strip", "--tag-of-filtered-object=rewrite"];
