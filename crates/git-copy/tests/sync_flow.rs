//! Driver-level tests: skip decisions, cache layout, state recording,
//! and publication to a local mirror.

mod common;

use common::builders::{local_target, ConfigBuilder};
use common::{git_available, TestBare, TestRepo};
use git_copy::state;
use git_copy::sync::{repo_cache_key, sync_repo, SyncOptions};
use tempfile::TempDir;

struct SyncFixture {
    repo: TestRepo,
    mirror: TestBare,
    cache: TempDir,
}

impl SyncFixture {
    fn new() -> Self {
        let repo = TestRepo::init();
        repo.write("a.txt", "hello obinnaokechukwu\n");
        repo.commit_all("add obinnaokechukwu");
        repo.write(".env", "SECRET=obinnaokechukwu\n");
        repo.commit_all("add env");
        Self {
            repo,
            mirror: TestBare::init(),
            cache: TempDir::new().expect("cache dir"),
        }
    }

    fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new("obinnaokechukwu")
            .exclude(&[".env"])
            .target(local_target(
                "public",
                &self.mirror.path.to_string_lossy(),
            ))
    }

    fn options(&self) -> SyncOptions {
        SyncOptions {
            cache_dir: Some(self.cache.path().to_path_buf()),
            ..SyncOptions::default()
        }
    }
}

#[test]
fn first_sync_builds_validates_and_publishes() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    let cfg = fx.config().build();

    let results = sync_repo(&fx.repo.path, &cfg, &fx.options()).expect("sync");
    assert_eq!(results.len(), 1);
    assert!(results[0].did_work);
    assert!(results[0].succeeded(), "error: {:?}", results[0].error);

    // The scrubbed cache exists under <cache>/<repo-key>/<label>.git.
    let cache_bare = fx
        .cache
        .path()
        .join(repo_cache_key(&fx.repo.path))
        .join("public.git");
    assert!(cache_bare.is_dir(), "missing cache at {cache_bare:?}");

    // The mirror received the scrubbed history.
    let content = fx.mirror.git(&["show", "refs/heads/main:a.txt"]);
    assert_eq!(content, "hello johndoe\n");
    let tree = fx.mirror.git(&["ls-tree", "-r", "--name-only", "refs/heads/main"]);
    assert!(!tree.contains(".env"));

    // State records the success.
    let st = state::load(&fx.repo.path).expect("state");
    let ts = &st.targets["public"];
    assert!(ts.last_error.is_empty());
    assert!(!ts.last_private_refs.is_empty());
    assert!(!ts.last_config_hash.is_empty());
    assert!(ts.last_sync_at.is_some());
}

#[test]
fn unchanged_fingerprints_skip_all_work() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    let cfg = fx.config().build();
    let opts = fx.options();

    let first = sync_repo(&fx.repo.path, &cfg, &opts).expect("first sync");
    assert!(first[0].did_work);

    let second = sync_repo(&fx.repo.path, &cfg, &opts).expect("second sync");
    assert_eq!(second.len(), 1);
    assert!(!second[0].did_work, "expected up-to-date skip");
    assert!(second[0].succeeded());
}

#[test]
fn changed_collapse_list_forces_rebuild() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    let opts = fx.options();

    let cfg = fx.config().build();
    sync_repo(&fx.repo.path, &cfg, &opts).expect("first sync");

    // Same refs, different ruleset: the collapse list changed.
    let cfg = fx.config().collapse(&["a.txt"]).build();
    let results = sync_repo(&fx.repo.path, &cfg, &opts).expect("second sync");
    assert!(results[0].did_work, "expected rebuild after rule change");
    assert!(results[0].succeeded(), "error: {:?}", results[0].error);
}

#[test]
fn new_commit_forces_rebuild() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    let cfg = fx.config().build();
    let opts = fx.options();

    sync_repo(&fx.repo.path, &cfg, &opts).expect("first sync");

    fx.repo.write("b.txt", "more from obinnaokechukwu\n");
    fx.repo.commit_all("second file");

    let results = sync_repo(&fx.repo.path, &cfg, &opts).expect("second sync");
    assert!(results[0].did_work);
    assert!(results[0].succeeded(), "error: {:?}", results[0].error);
    let content = fx.mirror.git(&["show", "refs/heads/main:b.txt"]);
    assert_eq!(content, "more from johndoe\n");
}

#[test]
fn failed_target_records_error_and_retries() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    // Point the target at a URL that cannot be pushed to.
    let cfg = ConfigBuilder::new("obinnaokechukwu")
        .exclude(&[".env"])
        .target(local_target("public", "/nonexistent/push/destination.git"))
        .build();
    let opts = fx.options();

    let results = sync_repo(&fx.repo.path, &cfg, &opts).expect("sync runs");
    assert!(results[0].error.is_some());

    let st = state::load(&fx.repo.path).expect("state");
    let ts = &st.targets["public"];
    assert!(!ts.last_error.is_empty());
    // Fingerprints stay clear so the next run retries.
    assert!(ts.last_private_refs.is_empty());

    // A second run retries rather than skipping.
    let retry = sync_repo(&fx.repo.path, &cfg, &opts).expect("retry runs");
    assert!(retry[0].did_work);
}

#[test]
fn only_target_selects_one_of_many() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    let second_mirror = TestBare::init();
    let cfg = fx
        .config()
        .target(local_target(
            "backup",
            &second_mirror.path.to_string_lossy(),
        ))
        .build();

    let opts = SyncOptions {
        only_target: Some("backup".to_string()),
        ..fx.options()
    };
    let results = sync_repo(&fx.repo.path, &cfg, &opts).expect("sync");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].label, "backup");
}

#[test]
fn cancellation_stops_before_any_target() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    let cfg = fx.config().build();

    let cancel = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let opts = SyncOptions {
        cancel: Some(cancel),
        ..fx.options()
    };
    let results = sync_repo(&fx.repo.path, &cfg, &opts).expect("sync");
    assert!(results.is_empty(), "cancelled sync should do nothing");
}

#[test]
fn validate_flag_gates_the_forbidden_path_check() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    // .env is neither excluded nor opted in, so the filter keeps it and
    // the validator's exact-name check rejects the rewritten repository.
    let cfg = ConfigBuilder::new("obinnaokechukwu")
        .target(local_target(
            "public",
            &fx.mirror.path.to_string_lossy(),
        ))
        .build();

    let checked = sync_repo(&fx.repo.path, &cfg, &fx.options()).expect("sync runs");
    let err = checked[0].error.as_ref().expect("expected validation failure");
    assert!(err.contains("forbidden path"), "unexpected error: {err}");

    // With validation off, the same build is committed and published.
    let unchecked = SyncOptions {
        validate: false,
        ..fx.options()
    };
    let results = sync_repo(&fx.repo.path, &cfg, &unchecked).expect("sync runs");
    assert!(results[0].did_work);
    assert!(results[0].succeeded(), "error: {:?}", results[0].error);
    let content = fx.mirror.git(&["show", "refs/heads/main:.env"]);
    assert_eq!(content, "SECRET=johndoe\n");
}

#[test]
fn opted_in_sensitive_file_is_published_scrubbed() {
    if !git_available() {
        return;
    }
    let fx = SyncFixture::new();
    let mut cfg = fx.config().build();
    cfg.defaults.opt_in = vec![".env".to_string()];

    let results = sync_repo(&fx.repo.path, &cfg, &fx.options()).expect("sync");
    assert!(results[0].succeeded(), "error: {:?}", results[0].error);

    // Opting in keeps the file and drops it from the validator's
    // forbidden set; its content still goes through the substitutions.
    let content = fx.mirror.git(&["show", "refs/heads/main:.env"]);
    assert_eq!(content, "SECRET=johndoe\n");
}
