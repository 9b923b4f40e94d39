//! Path normalization and glob matching for exclusion rules.
//!
//! Patterns are split on `/`. A literal `**` segment matches any number of
//! path segments (including zero); every other segment is matched against
//! the corresponding path segment with single-segment shell-glob semantics
//! and never crosses a separator.

use glob::Pattern;

/// Directories that are always excluded and cannot be opted back in.
pub const PROTECTED_DIRS: &[&str] = &[".git-copy", ".claude"];

/// Normalizes a path for matching: trims whitespace, drops a leading `./`,
/// and converts backslashes to forward slashes.
pub fn normalize(path: &str) -> String {
    let p = path.trim();
    if p.is_empty() {
        return String::new();
    }
    let p = p.strip_prefix("./").unwrap_or(p);
    p.replace('\\', "/")
}

/// Returns true if the path lies inside one of the protected directories.
pub fn is_protected_path(path: &str) -> bool {
    let p = normalize(path);
    PROTECTED_DIRS
        .iter()
        .any(|dir| p == *dir || p.starts_with(&format!("{dir}/")))
}

/// Glob patterns covering every protected directory.
pub fn protected_patterns() -> Vec<String> {
    PROTECTED_DIRS.iter().map(|d| format!("{d}/**")).collect()
}

/// Returns true if the pattern is one of the protected `<dir>/**` entries.
pub fn is_protected_pattern(pattern: &str) -> bool {
    PROTECTED_DIRS
        .iter()
        .any(|dir| pattern == format!("{dir}/**"))
}

/// A compiled exclusion pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    /// A literal `**`: matches any number of path segments.
    Any,
    Glob(Pattern),
}

impl PathPattern {
    /// Parses a pattern. Returns `None` when a segment is not a valid glob;
    /// such a pattern can never match anything.
    pub fn parse(pattern: &str) -> Option<Self> {
        let raw = normalize(pattern);
        let mut segments = Vec::new();
        for seg in raw.split('/') {
            if seg == "**" {
                segments.push(Segment::Any);
            } else {
                segments.push(Segment::Glob(Pattern::new(seg).ok()?));
            }
        }
        Some(Self { raw, segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches a normalized path against the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let target = normalize(path);
        let segs: Vec<&str> = target.split('/').collect();
        match_segments(&self.segments, &segs)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(Segment::Any) => {
            // `**` may absorb any number of leading segments.
            (0..=path.len()).any(|k| match_segments(&pattern[1..], &path[k..]))
        }
        Some(Segment::Glob(glob)) => match path.first() {
            None => false,
            Some(seg) => glob.matches(seg) && match_segments(&pattern[1..], &path[1..]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        PathPattern::parse(pattern).map(|p| p.matches(path)).unwrap_or(false)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  ./a/b.txt "), "a/b.txt");
        assert_eq!(normalize("a\\b\\c"), "a/b/c");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_literal_match() {
        assert!(matches(".env", ".env"));
        assert!(!matches(".env", "sub/.env"));
    }

    #[test]
    fn test_single_segment_glob_does_not_cross_separator() {
        assert!(matches("*.log", "debug.log"));
        assert!(!matches("*.log", "logs/debug.log"));
        assert!(matches("src/*.rs", "src/main.rs"));
        assert!(!matches("src/*.rs", "src/sub/main.rs"));
    }

    #[test]
    fn test_double_star_matches_any_depth() {
        assert!(matches(".git-copy/**", ".git-copy/state.json"));
        assert!(matches(".git-copy/**", ".git-copy/a/b/c"));
        assert!(matches("**/*.secret", "top.secret"));
        assert!(matches("**/*.secret", "a/b/top.secret"));
        assert!(!matches("**/*.secret", "a/b/top.txt"));
    }

    #[test]
    fn test_character_classes() {
        assert!(matches("file[0-9].txt", "file3.txt"));
        assert!(!matches("file[0-9].txt", "filex.txt"));
    }

    #[test]
    fn test_protected_paths() {
        assert!(is_protected_path(".git-copy/config.json"));
        assert!(is_protected_path(".claude"));
        assert!(is_protected_path("./.claude/session.json"));
        assert!(!is_protected_path("src/.claude.rs"));
        assert!(!is_protected_path("nested/.git-copy/file"));
    }

    #[test]
    fn test_invalid_glob_never_matches() {
        assert!(!matches("[unclosed", "[unclosed"));
    }
}
