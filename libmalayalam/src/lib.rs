//! libmalayalam crate root
//!
//! Malayalam scheme for `libvarnam-core`: the rule set, the word hooks and an
//! `Engine` that opens a core engine with them registered.
//!
//! Public API exported here:
//! - `Engine` from `engine`
//! - `symbols`, `write_rule_table` from `scheme`
//! - `partialize`, `sanitize` from `rules`

pub mod engine;
pub mod rules;
pub mod scheme;

pub use engine::Engine;
pub use rules::{partialize, sanitize};
pub use scheme::{symbols, write_rule_table};

// Convenience re-exports for common types used by callers.
pub use libvarnam_core::{
    CancellationToken, Config, LearnEntry, LearnStatus, Outcome, Suggestion,
    TransliterationResult, VarnamError,
};
