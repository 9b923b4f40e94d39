//! Compilation of the composite scrub ruleset.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::pattern::{self, PathPattern};
use super::subst::Substitution;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("private username is required")]
    MissingPrivate,

    #[error("replacement is required")]
    MissingReplacement,

    #[error("replacement string must not contain the private username")]
    ReplacementContainsPrivate,

    #[error("invalid extra replacement pattern '{pattern}': {reason}")]
    InvalidExtraPattern { pattern: String, reason: String },
}

/// User-authored scrub rules for one target, before compilation.
#[derive(Debug, Clone, Default)]
pub struct Rules {
    pub private_username: String,
    pub replacement: String,
    /// Extra (pattern, replacement) pairs, applied after the private
    /// username in the order given.
    pub extra_replacements: Vec<(String, String)>,

    pub exclude_patterns: Vec<String>,
    pub opt_in_paths: Vec<String>,

    /// Paths whose history collapses to their current content.
    pub replace_history_paths: Vec<String>,
    /// Current bytes at HEAD for each collapse path that exists there.
    pub replace_history_content: HashMap<String, Vec<u8>>,

    pub public_author_name: String,
    pub public_author_email: String,
}

/// The immutable compiled ruleset consumed by the stream filter and the
/// validator.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    private: String,
    /// Substitutions in application order: the private username first,
    /// then the extra pairs.
    subs: Vec<Substitution>,

    exclude: Vec<PathPattern>,
    opt_in: HashSet<String>,

    collapse_paths: Vec<String>,
    collapse_content: HashMap<String, Vec<u8>>,

    public_author_name: String,
    public_author_email: String,
}

impl CompiledRules {
    pub fn compile(rules: Rules) -> Result<Self, RulesError> {
        let private = rules.private_username.trim().to_string();
        if private.is_empty() {
            return Err(RulesError::MissingPrivate);
        }
        let replacement = rules.replacement.trim().to_string();
        if replacement.is_empty() {
            return Err(RulesError::MissingReplacement);
        }
        if replacement
            .to_lowercase()
            .contains(&private.to_lowercase())
        {
            return Err(RulesError::ReplacementContainsPrivate);
        }

        let mut subs = Vec::with_capacity(1 + rules.extra_replacements.len());
        subs.push(
            Substitution::literal(&private, &replacement).map_err(|e| {
                RulesError::InvalidExtraPattern {
                    pattern: private.clone(),
                    reason: e.to_string(),
                }
            })?,
        );
        for (old, new) in &rules.extra_replacements {
            let old = old.trim();
            if old.is_empty() {
                continue;
            }
            subs.push(Substitution::literal(old, new).map_err(|e| {
                RulesError::InvalidExtraPattern {
                    pattern: old.to_string(),
                    reason: e.to_string(),
                }
            })?);
        }

        // Seed with the protected patterns, then append user patterns;
        // anything already inside the protected family is redundant.
        let mut raw_exclude = pattern::protected_patterns();
        for p in &rules.exclude_patterns {
            let p = pattern::normalize(p);
            if p.is_empty() || pattern::is_protected_path(&p) {
                continue;
            }
            raw_exclude.push(p);
        }

        let mut opt_in = HashSet::new();
        for p in &rules.opt_in_paths {
            let p = pattern::normalize(p);
            if p.is_empty() || pattern::is_protected_path(&p) {
                continue;
            }
            opt_in.insert(p);
        }

        // Opt-ins strip matching literals from the exclude list, but the
        // protected entries always stay.
        let mut exclude = Vec::with_capacity(raw_exclude.len());
        for p in raw_exclude {
            if !pattern::is_protected_pattern(&p) && opt_in.contains(&p) {
                continue;
            }
            if let Some(compiled) = PathPattern::parse(&p) {
                exclude.push(compiled);
            }
        }

        let public_author_name = match rules.public_author_name.trim() {
            "" => replacement.clone(),
            name => name.to_string(),
        };
        let public_author_email = match rules.public_author_email.trim() {
            "" => format!("{replacement}@example.invalid"),
            email => email.to_string(),
        };

        // Collapse content is scrubbed once here so the filter emits the
        // public form directly.
        let mut collapse_paths = Vec::new();
        let mut collapse_content = HashMap::new();
        for p in &rules.replace_history_paths {
            let p = pattern::normalize(p);
            if p.is_empty() || collapse_paths.contains(&p) {
                continue;
            }
            collapse_paths.push(p);
        }
        for (p, content) in &rules.replace_history_content {
            let p = pattern::normalize(p);
            if !collapse_paths.contains(&p) {
                continue;
            }
            let scrubbed = subs
                .iter()
                .fold(content.clone(), |acc, sub| sub.apply(&acc));
            collapse_content.insert(p, scrubbed);
        }

        Ok(Self {
            private,
            subs,
            exclude,
            opt_in,
            collapse_paths,
            collapse_content,
            public_author_name,
            public_author_email,
        })
    }

    pub fn private_username(&self) -> &str {
        &self.private
    }

    pub fn public_author_name(&self) -> &str {
        &self.public_author_name
    }

    pub fn public_author_email(&self) -> &str {
        &self.public_author_email
    }

    pub fn opt_in_paths(&self) -> &HashSet<String> {
        &self.opt_in
    }

    /// Collapse paths in configuration order (normalized).
    pub fn collapse_paths(&self) -> &[String] {
        &self.collapse_paths
    }

    pub fn is_collapse_path(&self, normalized: &str) -> bool {
        self.collapse_paths.iter().any(|p| p == normalized)
    }

    /// Scrubbed HEAD bytes for a collapse path, if the file exists at HEAD.
    pub fn collapse_content(&self, normalized: &str) -> Option<&[u8]> {
        self.collapse_content.get(normalized).map(Vec::as_slice)
    }

    pub fn should_exclude(&self, path: &str) -> bool {
        let p = pattern::normalize(path);
        if pattern::is_protected_path(&p) {
            return true;
        }
        self.exclude.iter().any(|pat| pat.matches(&p))
    }

    /// Runs the substitution pipeline over a byte payload.
    pub fn rewrite_bytes(&self, input: &[u8]) -> Vec<u8> {
        self.subs
            .iter()
            .fold(input.to_vec(), |acc, sub| sub.apply(&acc))
    }

    /// Runs the substitution pipeline over a string (paths, refs).
    pub fn rewrite_str(&self, input: &str) -> String {
        String::from_utf8_lossy(&self.rewrite_bytes(input.as_bytes())).into_owned()
    }
}
