//! git-copy: scrubbed one-way replication of a private git repository to
//! public mirrors.
//!
//! The pipeline consumes `git fast-export`, rewrites history under a
//! compiled ruleset (exclusions, opt-ins, case-preserving substitution,
//! identity rewriting, selective history collapse), feeds the result to
//! `git fast-import`, proves the rewritten repository clean, and only then
//! mirror-pushes it.

pub mod audit;
pub mod config;
pub mod error;
pub mod git;
pub mod scrub;
pub mod state;
pub mod sync;

pub use audit::{audit_bare_repo, clone_mirror_to_temp, AuditError, AuditOptions, Report};
pub use config::{load_repo_config_from_any_branch, RepoConfig, Target};
pub use error::{ConfigError, GitCopyError, Result, StateError};
pub use scrub::{CompiledRules, ExportFilter, FilterError, Rules, RulesError, ValidateError};
pub use state::{RepoState, TargetState};
pub use sync::{default_cache_dir, sync_repo, SyncError, SyncOptions, TargetOutcome};
