// core/src/lang.rs
//
// Per-scheme constants consulted by the tokenizer and the expander.

use std::ops::RangeInclusive;

/// Per-scheme rendering rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangRules {
    /// Language code from the rule table metadata (e.g. "ml").
    pub lang_code: String,
    /// Rendered virama, empty when the scheme has none.
    pub virama: String,
    /// Render digits through the rule table instead of passing them through.
    pub indic_digits: bool,
    /// Unicode block of the scheme's own script, if known.
    pub script_block: Option<RangeInclusive<char>>,
}

impl LangRules {
    pub fn new(lang_code: &str, virama: &str) -> Self {
        Self {
            lang_code: lang_code.to_string(),
            virama: virama.to_string(),
            indic_digits: false,
            script_block: script_block(lang_code),
        }
    }

    pub fn with_indic_digits(mut self, enabled: bool) -> Self {
        self.indic_digits = enabled;
        self
    }

    /// Whether `ch` belongs to the scheme's script.
    pub fn is_script_char(&self, ch: char) -> bool {
        self.script_block
            .as_ref()
            .is_some_and(|block| block.contains(&ch))
    }

    /// Strip one trailing virama from `word`.
    pub fn remove_last_virama<'a>(&self, word: &'a str) -> &'a str {
        if self.virama.is_empty() {
            return word;
        }
        word.strip_suffix(self.virama.as_str()).unwrap_or(word)
    }
}

/// Unicode block for the languages with a known script.
pub fn script_block(lang_code: &str) -> Option<RangeInclusive<char>> {
    match lang_code {
        "ml" => Some('\u{0D00}'..='\u{0D7F}'),
        "kn" => Some('\u{0C80}'..='\u{0CFF}'),
        "hi" => Some('\u{0900}'..='\u{097F}'),
        "ta" => Some('\u{0B80}'..='\u{0BFF}'),
        "te" => Some('\u{0C00}'..='\u{0C7F}'),
        _ => None,
    }
}
