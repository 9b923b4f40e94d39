pub mod audit;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{bail, Context};
use git_copy::audit::{AuditOptions, Finding, FindingKind, Report};
use git_copy::config::{RepoConfig, Target};

/// Resolves the repository to operate on: the `--repo` flag or the current
/// directory, widened to the repository toplevel.
pub fn resolve_repo_path(repo_flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let start = match repo_flag {
        Some(path) => path,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    if !git_copy::git::is_repository(&start) {
        bail!("not a git repository: {}", start.display());
    }
    git_copy::git::toplevel(&start).context("cannot resolve repository toplevel")
}

/// Picks a target by label, or the only configured one.
pub fn select_target<'a>(cfg: &'a RepoConfig, label: Option<&str>) -> anyhow::Result<&'a Target> {
    match label {
        None => {
            if cfg.targets.len() == 1 {
                Ok(&cfg.targets[0])
            } else {
                bail!("more than one target configured; pass --target LABEL")
            }
        }
        Some(label) => cfg
            .targets
            .iter()
            .find(|t| t.label == label)
            .with_context(|| format!("no target labeled '{label}'")),
    }
}

/// Audit options for one target: the defaults plus the private username
/// and the target's collapse list.
pub fn audit_options(cfg: &RepoConfig, target: &Target, extra_strings: &[String]) -> AuditOptions {
    let mut opts = AuditOptions::default();
    opts.forbidden_strings.push(cfg.private_username.clone());
    opts.forbidden_strings.extend_from_slice(extra_strings);
    opts.replace_history_files = cfg
        .defaults
        .replace_history_with_current
        .iter()
        .chain(target.replace_history_with_current.iter())
        .cloned()
        .collect();
    opts
}

pub fn print_report(report: &Report) {
    if report.passed() {
        println!("  no findings");
        return;
    }
    for finding in &report.findings {
        println!(
            "  [{}] {} ({}): {}",
            kind_str(finding),
            finding.path,
            finding.reference,
            finding.detail
        );
    }
}

fn kind_str(finding: &Finding) -> &'static str {
    match finding.kind {
        FindingKind::PathHistory => "path-history",
        FindingKind::StringHit => "string-hit",
        FindingKind::ReplaceHistoryMismatch => "replace-history-mismatch",
    }
}
