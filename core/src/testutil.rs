//! Small Malayalam rule table shared by unit tests.
use tempfile::TempDir;

use crate::lang::LangRules;
use crate::rule_table::{RuleTable, SchemeDetails};
use crate::symbol::{AcceptCondition, Symbol, SymbolKind::*};

pub(crate) const VIRAMA: &str = "\u{0D4D}";

pub(crate) fn symbols() -> Vec<Symbol> {
    let end = AcceptCondition::EndsWith;
    vec![
        // word endings come first so they win ties
        Symbol::new(Anusvara, "m", "ം").accepting(end),
        Symbol::new(DeadConsonant, "l", "ൽ").accepting(end),
        Symbol::new(Vowel, "a", "അ"),
        Symbol::new(Vowel, "aa", "ആ").with_value2("ാ"),
        Symbol::new(Vowel, "i", "ഇ").with_value2("ി"),
        Symbol::new(DeadConsonant, "m", "മ്"),
        Symbol::new(DeadConsonant, "l", "ല്"),
        Symbol::new(DeadConsonant, "y", "യ്"),
        Symbol::new(DeadConsonant, "n", "ന്"),
        Symbol::new(DeadConsonant, "th", "ത്"),
        Symbol::new(Consonant, "ma", "മ"),
        Symbol::new(Consonant, "la", "ല"),
        Symbol::new(Consonant, "La", "ള"),
        Symbol::new(Consonant, "ya", "യ"),
        Symbol::new(Consonant, "na", "ന"),
        Symbol::new(Consonant, "tha", "ത"),
        Symbol::new(ConsonantVowel, "maa", "മാ"),
        Symbol::new(ConsonantVowel, "laa", "ലാ"),
        Symbol::new(ConsonantVowel, "yaa", "യാ"),
        Symbol::new(ConsonantVowel, "yi", "യി"),
        Symbol::new(DeadConsonant, "l", "ള്").possibility(1),
        Symbol::new(Consonant, "la", "ള").possibility(1),
        Symbol::new(ConsonantVowel, "ma", "മാ").possibility(1),
        Symbol::new(ConsonantVowel, "la", "ലാ").possibility(1),
        Symbol::new(ConsonantVowel, "la", "ളാ").possibility(1),
        Symbol::new(ConsonantVowel, "ya", "യാ").possibility(1),
        Symbol::new(Virama, "~", VIRAMA),
        Symbol::new(NonJoiner, "_", "\u{200c}"),
        Symbol::new(Number, "1", "൧"),
    ]
}

pub(crate) fn details() -> SchemeDetails {
    SchemeDetails {
        identifier: "ml-test".into(),
        lang_code: "ml".into(),
        display_name: "Malayalam (test)".into(),
        author: "tests".into(),
        compiled_date: "2024-01-01".into(),
        is_stable: false,
    }
}

pub(crate) fn rule_table() -> (TempDir, RuleTable) {
    let dir = tempfile::tempdir().expect("tempdir");
    let table =
        RuleTable::create(dir.path().join("ml.vst"), &details(), &symbols()).expect("rule table");
    (dir, table)
}

pub(crate) fn lang() -> LangRules {
    LangRules::new("ml", VIRAMA)
}
