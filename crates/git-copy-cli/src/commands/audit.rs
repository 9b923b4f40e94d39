use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use git_copy::audit::{audit_bare_repo, clone_mirror_to_temp};
use git_copy::config::load_repo_config_from_any_branch;
use git_copy::sync::{default_cache_dir, repo_cache_key};

use super::{audit_options, print_report};

#[derive(Args)]
pub struct AuditArgs {
    /// Path to the repository (default: current directory)
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Audit only this target label
    #[arg(long)]
    pub target: Option<String>,

    /// Also audit the remote mirror by cloning it
    #[arg(long)]
    pub remote: bool,

    /// Forbidden substring to search for (repeatable)
    #[arg(long = "string")]
    pub strings: Vec<String>,
}

pub fn run(args: AuditArgs) -> anyhow::Result<()> {
    let repo_path = super::resolve_repo_path(args.repo)?;
    let cfg = load_repo_config_from_any_branch(&repo_path)?;
    let target = super::select_target(&cfg, args.target.as_deref())?;

    let opts = audit_options(&cfg, target, &args.strings);
    println!("Audit target '{}'", target.label);

    let local_bare = default_cache_dir()
        .join(repo_cache_key(&repo_path))
        .join(format!("{}.git", target.label));

    if local_bare.exists() {
        println!("- Local scrubbed repo: {}", local_bare.display());
        let report = audit_bare_repo(&local_bare, &opts)?;
        print_report(&report);
        if !report.passed() {
            bail!("audit failed (local)");
        }
    } else {
        println!("- Local scrubbed repo: (missing) {}", local_bare.display());
        println!("  Tip: run `git-copy sync` first to generate the local scrubbed cache.");
    }

    if args.remote {
        println!("- Remote repo: {}", target.repo_url);
        let clone = clone_mirror_to_temp(&target.repo_url)?;
        let report = audit_bare_repo(clone.path(), &opts)?;
        print_report(&report);
        if !report.passed() {
            bail!("audit failed (remote)");
        }
    }

    println!("Audit: OK");
    Ok(())
}
