//! Shared fixtures for integration tests.
//!
//! Most tests drive real `git` subprocesses; they return early when no git
//! binary is available so the suite stays runnable everywhere.

#![allow(dead_code)]

pub mod builders;

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// True when a usable `git` binary is on PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A throwaway git repository with a deterministic identity.
pub struct TestRepo {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    pub fn init() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("repo");
        std::fs::create_dir_all(&path).expect("mkdir repo");

        if !git_ok(&path, &["init", "-b", "main"]) {
            assert!(git_ok(&path, &["init"]), "git init failed");
            git_ok(&path, &["checkout", "-b", "main"]);
        }
        assert!(git_ok(&path, &["config", "user.name", "obinnaokechukwu"]));
        assert!(git_ok(
            &path,
            &["config", "user.email", "obinnaokechukwu@private.invalid"]
        ));

        Self { _dir: dir, path }
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write file");
    }

    pub fn commit_all(&self, message: &str) {
        assert!(git_ok(&self.path, &["add", "-A"]));
        assert!(
            git_ok(&self.path, &["commit", "-m", message]),
            "commit failed: {message}"
        );
    }

    pub fn remove(&self, rel: &str) {
        assert!(git_ok(&self.path, &["rm", "-q", rel]));
    }

    /// Runs git in the repo and returns stdout; panics on failure.
    pub fn git(&self, args: &[&str]) -> String {
        git_stdout(&self.path, args)
    }
}

/// An empty bare repository to import or push into.
pub struct TestBare {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestBare {
    pub fn init() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("out.git");
        let path_str = path.to_string_lossy().to_string();
        assert!(git_ok(dir.path(), &["init", "--bare", &path_str]));
        Self { _dir: dir, path }
    }

    pub fn git(&self, args: &[&str]) -> String {
        git_stdout(&self.path, args)
    }

    pub fn git_result(&self, args: &[&str]) -> Result<String, String> {
        let out = Command::new("git")
            .current_dir(&self.path)
            .args(args)
            .output()
            .expect("spawn git");
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).into_owned())
        } else {
            Err(String::from_utf8_lossy(&out.stderr).into_owned())
        }
    }
}

fn git_ok(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}
