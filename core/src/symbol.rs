//! Rule-table symbols, tokens and suggestions.
//!
//! Public API:
//! - `Symbol` - one transliteration rule (pattern → rendered forms)
//! - `Token` - unit produced by the tokenizer (literal text or ambiguity set)
//! - `Suggestion` - a weighted candidate word
//! - `sort_suggestions` - the stable ranking shared by every result list
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Zero width non-joiner.
pub const ZWNJ: char = '\u{200c}';
/// Zero width joiner.
pub const ZWJ: char = '\u{200d}';

/// Seed weight of a freshly started suggestion.
pub const BASIC_WEIGHT: i32 = 10;
/// Rank subtracted from when scoring by match type; EXACT (1) scores above POSSIBILITY (2).
pub const POSSIBILITY_RANK: i32 = 2;
/// Confidence of a newly learned full word.
pub const MIN_LEARNT_CONFIDENCE: i32 = 30;
/// Boost per matched pattern character for partial pattern-dictionary matches.
pub const PATTERN_LENGTH_BOOST: i32 = 50;
/// Upper bound on pattern and value lengths, in characters.
pub const MAX_SYMBOL_LENGTH: usize = 30;
/// Tag requesting that value2 be rendered regardless of position.
pub const RENDER_VALUE2_TAG: &str = "render_value2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Vowel = 1,
    Consonant = 2,
    DeadConsonant = 3,
    ConsonantVowel = 4,
    Number = 5,
    Symbol = 6,
    Anusvara = 7,
    Visarga = 8,
    Virama = 9,
    Other = 10,
    NonJoiner = 11,
    Joiner = 12,
    Period = 13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchType {
    Exact = 1,
    Possibility = 2,
}

impl MatchType {
    pub fn rank(self) -> i32 {
        self as i32
    }
}

/// Match-type filter used by rule lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchFilter {
    All,
    Exact,
    Possibility,
}

impl MatchFilter {
    pub fn admits(self, match_type: MatchType) -> bool {
        match self {
            MatchFilter::All => true,
            MatchFilter::Exact => match_type == MatchType::Exact,
            MatchFilter::Possibility => match_type == MatchType::Possibility,
        }
    }
}

/// Where in a word a rule may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AcceptCondition {
    #[default]
    All = 0,
    StartsWith = 1,
    InBetween = 2,
    EndsWith = 3,
}

impl AcceptCondition {
    /// Position state of token `index` in a sequence of `len` tokens.
    pub fn for_position(index: usize, len: usize) -> Self {
        if index == 0 {
            AcceptCondition::StartsWith
        } else if index + 1 == len {
            AcceptCondition::EndsWith
        } else {
            AcceptCondition::InBetween
        }
    }
}

/// A transliteration rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: u32,
    pub kind: SymbolKind,
    pub match_type: MatchType,
    pub pattern: String,
    pub value1: String,
    pub value2: String,
    pub value3: String,
    pub tag: String,
    pub weight: i32,
    pub priority: i32,
    pub accept_condition: AcceptCondition,
    pub flags: i32,
}

impl Symbol {
    /// Build an EXACT rule with empty secondary values. Ids are assigned when the
    /// rule table is written.
    pub fn new(kind: SymbolKind, pattern: &str, value1: &str) -> Self {
        Self {
            id: 0,
            kind,
            match_type: MatchType::Exact,
            pattern: pattern.to_string(),
            value1: value1.to_string(),
            value2: String::new(),
            value3: String::new(),
            tag: String::new(),
            weight: 0,
            priority: 0,
            accept_condition: AcceptCondition::All,
            flags: 0,
        }
    }

    pub fn with_value2(mut self, value2: &str) -> Self {
        self.value2 = value2.to_string();
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }

    /// Mark as a POSSIBILITY rule with the given weight.
    pub fn possibility(mut self, weight: i32) -> Self {
        self.match_type = MatchType::Possibility;
        self.weight = weight;
        self
    }

    pub fn accepting(mut self, condition: AcceptCondition) -> Self {
        self.accept_condition = condition;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// A passthrough rule for an already rendered script character.
    pub fn literal(text: &str) -> Self {
        Self::new(SymbolKind::Other, text, text)
    }

    pub(crate) fn lookup_order(a: &Symbol, b: &Symbol) -> Ordering {
        a.match_type
            .cmp(&b.match_type)
            .then_with(|| b.weight.cmp(&a.weight))
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Output of the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Text passed through unchanged. The tokenizer produces single characters;
    /// tail completion seeds a whole already-resolved word here.
    Char { text: String, position: usize },
    /// Rules that all matched `pattern`, best first.
    Symbol {
        symbols: Vec<Symbol>,
        pattern: String,
        position: usize,
    },
}

impl Token {
    /// Byte offset of the last byte this token consumed.
    pub fn position(&self) -> usize {
        match self {
            Token::Char { position, .. } | Token::Symbol { position, .. } => *position,
        }
    }

    /// Input text this token consumed.
    pub fn consumed(&self) -> &str {
        match self {
            Token::Char { text, .. } => text,
            Token::Symbol { pattern, .. } => pattern,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        match self {
            Token::Char { .. } => &[],
            Token::Symbol { symbols, .. } => symbols,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Token::Symbol { .. })
    }
}

/// A candidate word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub word: String,
    pub weight: i32,
    /// Unix seconds of the last learn or train event, 0 if never learned.
    pub learned_on: u64,
}

impl Suggestion {
    pub fn new(word: impl Into<String>, weight: i32) -> Self {
        Self {
            word: word.into(),
            weight,
            learned_on: 0,
        }
    }

    pub fn is_learned(&self) -> bool {
        self.learned_on != 0
    }
}

/// Stable ranking: learned words first when learned status differs, then weight descending.
pub fn sort_suggestions(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.is_learned()
            .cmp(&a.is_learned())
            .then_with(|| b.weight.cmp(&a.weight))
    });
}

/// Drop later entries whose word already appeared.
pub fn dedup_suggestions(suggestions: &mut Vec<Suggestion>) {
    let mut seen = ahash::AHashSet::with_capacity(suggestions.len());
    suggestions.retain(|s| seen.insert(s.word.clone()));
}
