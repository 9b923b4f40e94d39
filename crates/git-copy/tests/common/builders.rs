//! Builders for test configurations.

#![allow(dead_code)]

use git_copy::config::{RepoConfig, Target, TargetDefaults};

/// Builder for `RepoConfig` instances with one target.
pub struct ConfigBuilder {
    private_username: String,
    head_branch: String,
    defaults: TargetDefaults,
    targets: Vec<Target>,
}

impl ConfigBuilder {
    pub fn new(private_username: &str) -> Self {
        Self {
            private_username: private_username.to_string(),
            head_branch: "main".to_string(),
            defaults: TargetDefaults::default(),
            targets: Vec::new(),
        }
    }

    pub fn exclude(mut self, patterns: &[&str]) -> Self {
        self.defaults.exclude = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn opt_in(mut self, paths: &[&str]) -> Self {
        self.defaults.opt_in = paths.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn collapse(mut self, paths: &[&str]) -> Self {
        self.defaults.replace_history_with_current =
            paths.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn extra_replacement(mut self, old: &str, new: &str) -> Self {
        self.defaults
            .extra_replacements
            .push((old.to_string(), new.to_string()));
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn build(self) -> RepoConfig {
        RepoConfig {
            version: 1,
            private_username: self.private_username,
            head_branch: self.head_branch,
            defaults: self.defaults,
            targets: self.targets,
        }
    }
}

/// A target pushing to a local path, for tests without a network.
pub fn local_target(label: &str, push_url: &str) -> Target {
    Target {
        label: label.to_string(),
        provider: "github".to_string(),
        account: "johndoe".to_string(),
        repo_name: "project".to_string(),
        repo_url: push_url.to_string(),
        public_author_name: Some("John Doe".to_string()),
        public_author_email: Some("john@public.invalid".to_string()),
        ..Target::default()
    }
}
