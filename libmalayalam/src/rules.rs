//! Malayalam specific word hooks.
//!
//! - `partialize`: a word matched by the start of a longer input loses its
//!   word-final form (chillu or anusvara), so the rest of the input can be
//!   appended to the base consonant.
//! - `sanitize`: old style chillu sequences (consonant, virama, ZWJ) become the
//!   atomic chillu letters before a word is learned.
use libvarnam_core::Suggestion;

/// Word-final letter and the consonant it stands for mid-word. ർ maps to റ
/// because words typed this way are mostly borrowed.
const CHILLU_BASES: &[(char, char)] = &[
    ('ർ', 'റ'),
    ('ൻ', 'ന'),
    ('ൽ', 'ല'),
    ('ൺ', 'ണ'),
    ('ൾ', 'ള'),
    ('ം', 'മ'),
];

const OLD_CHILLUS: &[(&str, &str)] = &[
    ("ണ്\u{200d}", "ൺ"),
    ("ന്\u{200d}", "ൻ"),
    ("ര്\u{200d}", "ർ"),
    ("ല്\u{200d}", "ൽ"),
    ("ള്\u{200d}", "ൾ"),
    ("ക്\u{200d}", "ൿ"),
];

pub fn partialize(suggestion: &mut Suggestion) {
    let Some(last) = suggestion.word.chars().last() else {
        return;
    };
    if let Some((_, base)) = CHILLU_BASES.iter().find(|(chillu, _)| *chillu == last) {
        suggestion.word.pop();
        suggestion.word.push(*base);
    }
}

pub fn sanitize(word: &str) -> String {
    OLD_CHILLUS
        .iter()
        .fold(word.to_string(), |word, (old, atomic)| word.replace(old, atomic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partialized(word: &str) -> String {
        let mut suggestion = Suggestion::new(word, 30);
        partialize(&mut suggestion);
        suggestion.word
    }

    #[test]
    fn final_chillu_becomes_base_consonant() {
        assert_eq!(partialized("അവൻ"), "അവന");
        assert_eq!(partialized("കാർ"), "കാറ");
        assert_eq!(partialized("മലയാളം"), "മലയാളമ");
        assert_eq!(partialized("മൽ"), "മല");
    }

    #[test]
    fn other_endings_untouched() {
        assert_eq!(partialized("മല"), "മല");
        assert_eq!(partialized(""), "");
    }

    #[test]
    fn old_chillus_become_atomic() {
        assert_eq!(sanitize("അവന്\u{200d}"), "അവൻ");
        assert_eq!(sanitize("കാര്\u{200d}"), "കാർ");
        assert_eq!(sanitize("മല"), "മല");
    }
}
