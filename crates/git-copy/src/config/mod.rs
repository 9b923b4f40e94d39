pub mod loader;
pub mod schema;

pub use loader::{
    daemon_config_path, load_daemon_config, load_repo_config, load_repo_config_from_any_branch,
    load_repo_config_from_str, repo_config_path, save_repo_config, META_DIR,
};
pub use schema::{
    default_config, AuthRef, DaemonConfig, RepoConfig, Target, TargetDefaults,
    REPO_CONFIG_VERSION,
};
