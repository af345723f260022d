//! libvarnam-core
//!
//! Rule based transliteration from romanized keystrokes into Indic scripts,
//! ranked with a dictionary learned from the user's words. Language crates
//! (libmalayalam) supply the rule set and scheme hooks.
//!
//! Rule tables and learnings are `redb` databases; records are bincode encoded.
//!
//! Public API:
//! - `Varnam` - Engine handle: transliterate, reverse, learn, train, unlearn
//! - `TransliterationResult` - Ranked candidate lists for one input
//! - `RuleTable` / `Symbol` - Transliteration rules and their lookup
//! - `Tokenizer` / `Expander` - Keystrokes to tokens to candidate words
//! - `Dictionary` - Persistent learned words and keystroke patterns
//! - `CancellationToken` / `Outcome` - Request cancellation
//! - `Config` - Limits and feature flags
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Result, VarnamError};

pub mod symbol;
pub use symbol::{
    AcceptCondition, MatchFilter, MatchType, Suggestion, Symbol, SymbolKind, Token,
};

pub mod lang;
pub use lang::LangRules;

pub mod cancel;
pub use cancel::{CancellationToken, Outcome};

pub mod rule_table;
pub use rule_table::{RuleTable, SchemeDetails, SymbolQuery, TextFilter};

pub mod tokenizer;
pub use tokenizer::Tokenizer;

pub mod expander;
pub use expander::Expander;

pub mod dictionary;
pub use dictionary::{Dictionary, Learnings, WordEntry};

pub mod search;
pub use search::{DictionaryResult, MoreDictionaryResult};

pub mod learner;
pub use learner::{LearnEntry, LearnStatus};

pub mod engine;
pub use engine::{
    SearchSource, TransliterationHandle, TransliterationResult, Varnam, WordPartializer,
    WordSanitizer,
};

pub mod trace;
pub use trace::init_tracing;

#[cfg(test)]
mod testutil;

/// Engine configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Completions taken per matched dictionary word.
    pub dictionary_suggestions_limit: usize,
    /// Words taken from learned keystroke patterns.
    pub pattern_dictionary_suggestions_limit: usize,
    /// Candidates kept from the full rule expansion.
    pub tokenizer_suggestions_limit: usize,
    /// Produce tokenizer suggestions even when the dictionary matched exactly.
    pub tokenizer_suggestions_always: bool,
    /// Walk the dictionary with exact rules only.
    pub dictionary_match_exact: bool,
    /// Render digits in the scheme's script instead of passing them through.
    pub indic_digits: bool,
    /// Emit token dumps at trace level.
    pub debug: bool,

    // Cache Management
    /// Maximum number of entries in the input -> result cache
    pub max_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dictionary_suggestions_limit: 5,
            pattern_dictionary_suggestions_limit: 5,
            tokenizer_suggestions_limit: 10,
            tokenizer_suggestions_always: true,
            dictionary_match_exact: false,
            indic_digits: false,
            debug: false,
            max_cache_size: 256,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    // ========== Suggestion Limits ==========

    /// Set the same limit for dictionary, pattern and tokenizer suggestions.
    pub fn set_suggestion_limits(&mut self, limit: usize) {
        self.dictionary_suggestions_limit = limit;
        self.pattern_dictionary_suggestions_limit = limit;
        self.tokenizer_suggestions_limit = limit;
    }

    /// Largest number of candidates any single list can hold.
    pub fn max_suggestions(&self) -> usize {
        self.dictionary_suggestions_limit
            .max(self.pattern_dictionary_suggestions_limit)
            .max(self.tokenizer_suggestions_limit)
    }

    // ========== Debug ==========

    pub fn toggle_debug(&mut self) {
        self.debug = !self.debug;
    }
}

/// Utility helpers.
pub mod utils {
    use crate::symbol::{ZWJ, ZWNJ};

    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }

    /// Scheme independent cleanup of a word before it is learned: NFC, no
    /// surrounding whitespace, no leading joiners, no trailing ZWNJ.
    pub fn sanitize_word(s: &str) -> String {
        normalize(s)
            .trim_start_matches(|c: char| c == ZWJ || c == ZWNJ)
            .trim_end_matches(ZWNJ)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("tokenizer_suggestions_limit = 3\nindic_digits = true\n")
            .unwrap();
        assert_eq!(config.tokenizer_suggestions_limit, 3);
        assert!(config.indic_digits);
        assert_eq!(config.dictionary_suggestions_limit, 5);
        assert!(config.tokenizer_suggestions_always);
    }

    #[test]
    fn toml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("varnam.toml");
        let mut config = Config::default();
        config.set_suggestion_limits(7);
        config.toggle_debug();
        config.save_toml(&path).unwrap();
        assert_eq!(Config::load_toml(&path).unwrap(), config);
        assert_eq!(config.max_suggestions(), 7);
    }

    #[test]
    fn sanitize_strips_joiners() {
        assert_eq!(utils::sanitize_word(" \u{200d}\u{200c}മല\u{200c}\n"), "മല");
        // a trailing ZWJ is meaningful
        assert_eq!(utils::sanitize_word("ന്\u{200d}"), "ന്\u{200d}");
    }

    #[test]
    fn normalize_composes() {
        // ൊ written as its two-part decomposition
        assert_eq!(utils::normalize("\u{0D46}\u{0D3E}"), "\u{0D4A}");
    }
}
