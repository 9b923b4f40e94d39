//! Case-preserving byte substitution.
//!
//! All patterns are case-insensitive literals compiled over bytes, so the
//! engine is safe for binary payloads: matching happens on ASCII ranges and
//! random bytes never match.

use regex::bytes::Regex;

/// One compiled substitution: a case-insensitive literal pattern plus its
/// replacement text.
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: Regex,
    replacement: String,
}

impl Substitution {
    /// Compiles a case-insensitive literal pattern.
    pub fn literal(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!("(?i){}", regex::escape(pattern)))?;
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
        })
    }

    /// Replaces every match in `input`, carrying the case pattern of each
    /// match over to the replacement.
    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        self.pattern
            .replace_all(input, |caps: &regex::bytes::Captures<'_>| {
                apply_case_pattern(&caps[0], &self.replacement)
            })
            .into_owned()
    }
}

/// Applies the case pattern of `matched` to `replacement`:
/// all-lowercase match yields a lowercased replacement, all-uppercase an
/// uppercased one, a title-case match a title-cased one, and anything else
/// the replacement verbatim. Only ASCII letters count as cased.
fn apply_case_pattern(matched: &[u8], replacement: &str) -> Vec<u8> {
    if matched.is_empty() {
        return replacement.as_bytes().to_vec();
    }

    let has_upper = matched.iter().any(u8::is_ascii_uppercase);
    let has_lower = matched.iter().any(u8::is_ascii_lowercase);

    if !has_upper {
        return replacement.to_ascii_lowercase().into_bytes();
    }
    if !has_lower {
        return replacement.to_ascii_uppercase().into_bytes();
    }

    // Title case: first byte uppercase, no uppercase afterwards.
    if matched[0].is_ascii_uppercase() && !matched[1..].iter().any(u8::is_ascii_uppercase) {
        let mut out = replacement.to_ascii_lowercase().into_bytes();
        if let Some(first) = out.first_mut() {
            first.make_ascii_uppercase();
        }
        return out;
    }

    replacement.as_bytes().to_vec()
}
