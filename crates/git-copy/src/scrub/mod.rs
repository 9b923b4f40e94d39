//! History scrubbing: rule compilation, the export-stream filter, and the
//! pre-publish validator.

pub mod filter;
pub mod pattern;
pub mod rules;
pub mod stream;
pub mod subst;
pub mod validate;

pub use filter::{ExportFilter, FilterError, SYNTHETIC_MARK_BASE};
pub use rules::{CompiledRules, Rules, RulesError};
pub use validate::{validate_scrubbed_repo, ValidateError};
