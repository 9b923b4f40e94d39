use std::path::PathBuf;

use clap::Args;
use git_copy::config::load_repo_config_from_any_branch;
use git_copy::state;

#[derive(Args)]
pub struct StatusArgs {
    /// Path to the repository (default: current directory)
    #[arg(long)]
    pub repo: Option<PathBuf>,
}

pub fn run(args: StatusArgs) -> anyhow::Result<()> {
    let repo_path = super::resolve_repo_path(args.repo)?;
    let cfg = load_repo_config_from_any_branch(&repo_path)?;
    let st = state::load(&repo_path)?;

    println!("Repo: {}", repo_path.display());
    for target in &cfg.targets {
        match st.targets.get(&target.label) {
            None => println!("- {}: never synced", target.label),
            Some(ts) if !ts.last_error.is_empty() => {
                println!("- {}: ERROR ({})", target.label, ts.last_error)
            }
            Some(ts) => {
                let when = ts
                    .last_sync_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("- {}: ok (last sync {})", target.label, when);
            }
        }
    }
    Ok(())
}
