//! Malayalam rule set.
//!
//! Rules are generated from the tables below. Their order is significant: the
//! rule table assigns ids in insertion order and ids break ties between rules
//! of equal rank, so
//! - word endings (chillu, anusvara) come before the plain dead consonants,
//! - alternate consonants come before the long-a possibilities.
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use libvarnam_core::{AcceptCondition, Result, RuleTable, SchemeDetails, Symbol, SymbolKind};

pub const SCHEME_ID: &str = "ml";
pub const LANG_CODE: &str = "ml";
pub const VIRAMA: &str = "\u{0D4D}";

/// Possibility rules rank below exact ones by this much.
const POSSIBILITY_WEIGHT: i32 = 1;

/// (pattern, independent vowel, vowel sign)
const VOWELS: &[(&str, &str, &str)] = &[
    ("a", "അ", ""),
    ("aa", "ആ", "ാ"),
    ("A", "ആ", "ാ"),
    ("i", "ഇ", "ി"),
    ("ee", "ഈ", "ീ"),
    ("I", "ഈ", "ീ"),
    ("u", "ഉ", "ു"),
    ("oo", "ഊ", "ൂ"),
    ("U", "ഊ", "ൂ"),
    ("e", "എ", "െ"),
    ("E", "ഏ", "േ"),
    ("ai", "ഐ", "ൈ"),
    ("o", "ഒ", "ൊ"),
    ("O", "ഓ", "ോ"),
    ("au", "ഔ", "ൌ"),
];

/// (pattern, consonant letter)
///
/// Every proper prefix of a pattern is itself a pattern, since the tokenizer
/// only backtracks one character.
const CONSONANTS: &[(&str, &str)] = &[
    ("k", "ക"),
    ("c", "ക"),
    ("kh", "ഖ"),
    ("g", "ഗ"),
    ("gh", "ഘ"),
    ("ng", "ങ"),
    ("ch", "ച"),
    ("chh", "ഛ"),
    ("j", "ജ"),
    ("jh", "ഝ"),
    ("nj", "ഞ"),
    ("t", "ട"),
    ("T", "ട"),
    ("Th", "ഠ"),
    ("D", "ഡ"),
    ("Dh", "ഢ"),
    ("N", "ണ"),
    ("th", "ത"),
    ("thh", "ഥ"),
    ("d", "ദ"),
    ("dh", "ധ"),
    ("n", "ന"),
    ("p", "പ"),
    ("ph", "ഫ"),
    ("f", "ഫ"),
    ("b", "ബ"),
    ("bh", "ഭ"),
    ("m", "മ"),
    ("y", "യ"),
    ("r", "ര"),
    ("l", "ല"),
    ("v", "വ"),
    ("w", "വ"),
    ("sh", "ശ"),
    ("S", "ഷ"),
    ("s", "സ"),
    ("h", "ഹ"),
    ("L", "ള"),
    ("z", "ഴ"),
    ("zh", "ഴ"),
    ("R", "റ"),
];

/// Other consonants a pattern is commonly typed for.
const ALTERNATES: &[(&str, &str)] = &[
    ("l", "ള"),
    ("n", "ണ"),
    ("r", "റ"),
    ("d", "ഡ"),
    ("t", "റ്റ"),
    ("s", "ശ"),
];

/// Forms a consonant takes at the end of a word: (pattern, value, kind)
const WORD_ENDINGS: &[(&str, &str, SymbolKind)] = &[
    ("m", "ം", SymbolKind::Anusvara),
    ("n", "ൻ", SymbolKind::DeadConsonant),
    ("l", "ൽ", SymbolKind::DeadConsonant),
    ("r", "ർ", SymbolKind::DeadConsonant),
    ("N", "ൺ", SymbolKind::DeadConsonant),
    ("L", "ൾ", SymbolKind::DeadConsonant),
];

const DIGITS: [&str; 10] = ["൦", "൧", "൨", "൩", "൪", "൫", "൬", "൭", "൮", "൯"];

fn dead(letter: &str) -> String {
    format!("{letter}{VIRAMA}")
}

/// Dead consonant, consonant with inherent a, and one consonant-vowel rule per
/// vowel sign.
fn consonant_forms(pattern: &str, letter: &str) -> Vec<Symbol> {
    let mut out = vec![
        Symbol::new(SymbolKind::DeadConsonant, pattern, &dead(letter)),
        Symbol::new(SymbolKind::Consonant, &format!("{pattern}a"), letter),
    ];
    for (vowel, _, sign) in VOWELS.iter().filter(|(_, _, sign)| !sign.is_empty()) {
        out.push(Symbol::new(
            SymbolKind::ConsonantVowel,
            &format!("{pattern}{vowel}"),
            &format!("{letter}{sign}"),
        ));
    }
    out
}

/// Every Malayalam rule, in id order.
pub fn symbols() -> Vec<Symbol> {
    let mut out = Vec::new();

    for (pattern, value, kind) in WORD_ENDINGS {
        out.push(Symbol::new(*kind, pattern, value).accepting(AcceptCondition::EndsWith));
    }

    for (pattern, vowel, sign) in VOWELS {
        out.push(Symbol::new(SymbolKind::Vowel, pattern, vowel).with_value2(sign));
    }

    for (pattern, letter) in CONSONANTS {
        out.extend(consonant_forms(pattern, letter));
    }

    for (pattern, letter) in ALTERNATES {
        out.extend(
            consonant_forms(pattern, letter)
                .into_iter()
                .map(|s| s.possibility(POSSIBILITY_WEIGHT)),
        );
    }

    // "la" is often typed for ലാ
    let long_a = CONSONANTS.iter().chain(ALTERNATES.iter());
    for (pattern, letter) in long_a {
        out.push(
            Symbol::new(
                SymbolKind::ConsonantVowel,
                &format!("{pattern}a"),
                &format!("{letter}ാ"),
            )
            .possibility(POSSIBILITY_WEIGHT),
        );
    }

    out.push(Symbol::new(SymbolKind::Virama, "~", VIRAMA));
    out.push(Symbol::new(SymbolKind::NonJoiner, "_", "\u{200c}"));
    out.push(Symbol::new(SymbolKind::Joiner, "__", "\u{200d}"));
    out.push(Symbol::new(SymbolKind::Anusvara, "M", "ം"));
    out.push(Symbol::new(SymbolKind::Visarga, "H", "ഃ"));
    for (digit, value) in DIGITS.iter().enumerate() {
        out.push(Symbol::new(SymbolKind::Number, &digit.to_string(), value));
    }
    out
}

pub fn details() -> SchemeDetails {
    let compiled = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    SchemeDetails {
        identifier: SCHEME_ID.to_string(),
        lang_code: LANG_CODE.to_string(),
        display_name: "Malayalam".to_string(),
        author: "libmalayalam".to_string(),
        compiled_date: compiled.to_string(),
        is_stable: true,
    }
}

/// Write the Malayalam rule table to `path`, replacing any existing file.
pub fn write_rule_table<P: AsRef<Path>>(path: P) -> Result<RuleTable> {
    let symbols = symbols();
    tracing::debug!(rules = symbols.len(), path = %path.as_ref().display(), "writing rule table");
    RuleTable::create(path, &details(), &symbols)
}
