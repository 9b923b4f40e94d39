use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use git_copy::audit::{audit_bare_repo, clone_mirror_to_temp};
use git_copy::config::{load_repo_config_from_any_branch, RepoConfig, Target};
use git_copy::sync::{default_cache_dir, repo_cache_key, sync_repo, SyncOptions};

use super::{audit_options, print_report};

#[derive(Args)]
pub struct SyncArgs {
    /// Path to the repository (default: current directory)
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Sync only this target label
    #[arg(long)]
    pub target: Option<String>,

    /// Audit the local scrubbed cache after a successful sync
    #[arg(long)]
    pub audit: bool,

    /// Also audit the published remote by cloning it (implies --audit)
    #[arg(long)]
    pub audit_remote: bool,
}

pub fn run(args: SyncArgs) -> anyhow::Result<()> {
    let repo_path = super::resolve_repo_path(args.repo)?;
    let cfg = load_repo_config_from_any_branch(&repo_path)?;

    let opts = SyncOptions {
        only_target: args.target.clone(),
        ..SyncOptions::default()
    };
    let results = sync_repo(&repo_path, &cfg, &opts)?;

    let mut failed = false;
    for result in &results {
        match &result.error {
            Some(err) => {
                failed = true;
                println!("{}: ERROR: {}", result.label, err);
                continue;
            }
            None if result.did_work => {
                println!(
                    "{}: synced {} \u{2192} {}",
                    result.label, result.source_commit, result.repo_url
                );
            }
            None => println!("{}: up to date ({})", result.label, result.source_commit),
        }

        if !(args.audit || args.audit_remote) {
            continue;
        }
        let Some(target) = cfg.targets.iter().find(|t| t.label == result.label) else {
            bail!("internal error: missing target config for '{}'", result.label);
        };
        audit_target(&repo_path, &cfg, target, args.audit_remote)?;
    }

    if failed {
        bail!("one or more targets failed");
    }
    Ok(())
}

fn audit_target(
    repo_path: &std::path::Path,
    cfg: &RepoConfig,
    target: &Target,
    remote: bool,
) -> anyhow::Result<()> {
    let opts = audit_options(cfg, target, &[]);

    let local_bare = default_cache_dir()
        .join(repo_cache_key(repo_path))
        .join(format!("{}.git", target.label));

    println!("{}: audit (local)", target.label);
    let report = audit_bare_repo(&local_bare, &opts)?;
    print_report(&report);
    if !report.passed() {
        bail!("audit failed (local)");
    }

    if remote {
        println!("{}: audit (remote)", target.label);
        let clone = clone_mirror_to_temp(&target.repo_url)?;
        let report = audit_bare_repo(clone.path(), &opts)?;
        print_report(&report);
        if !report.passed() {
            bail!("audit failed (remote)");
        }
    }
    Ok(())
}
