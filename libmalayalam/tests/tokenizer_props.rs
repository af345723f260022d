// Property tests for tokenizing and expanding arbitrary keystrokes with the
// Malayalam rule table.

use std::sync::OnceLock;

use libvarnam_core::{Expander, LangRules, MatchFilter, RuleTable, Token, Tokenizer};
use proptest::prelude::*;
use tempfile::TempDir;

fn table() -> &'static (TempDir, RuleTable) {
    static TABLE: OnceLock<(TempDir, RuleTable)> = OnceLock::new();
    TABLE.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = libmalayalam::write_rule_table(dir.path().join("ml.vst")).expect("rule table");
        (dir, table)
    })
}

fn lang() -> LangRules {
    LangRules::new("ml", libmalayalam::scheme::VIRAMA)
}

/// Keystrokes drawn from the scheme's alphabet plus a few passthrough characters.
fn arb_input() -> impl Strategy<Value = String> {
    let keys = prop::sample::select(vec![
        'a', 'A', 'b', 'c', 'd', 'D', 'e', 'E', 'g', 'h', 'H', 'i', 'I', 'j', 'k', 'l', 'L', 'm',
        'M', 'n', 'N', 'o', 'O', 'p', 'r', 'R', 's', 'S', 't', 'T', 'u', 'U', 'v', 'w', 'y', 'z',
        '~', '_', '1', '9', '!', ' ', 'മ', 'x', 'q',
    ]);
    prop::collection::vec(keys, 1..24).prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn tokens_cover_the_input(input in arb_input()) {
        let (_, table) = table();
        let lang = lang();
        let tokens = Tokenizer::new(table, &lang)
            .tokenize(&input, MatchFilter::All, false)
            .unwrap();

        let consumed: String = tokens.iter().map(Token::consumed).collect();
        prop_assert_eq!(&consumed, &input);

        let positions: Vec<usize> = tokens.iter().map(Token::position).collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(positions.last().copied(), Some(input.len() - 1));

        for token in &tokens {
            if let Token::Symbol { symbols, .. } = token {
                prop_assert!(!symbols.is_empty());
            }
        }
    }

    #[test]
    fn greedy_expansion_is_never_empty(input in arb_input()) {
        let (_, table) = table();
        let lang = lang();
        let tokens = Tokenizer::new(table, &lang)
            .tokenize(&input, MatchFilter::Exact, false)
            .unwrap();
        let out = Expander::new(&lang).expand(&tokens, true, false);
        prop_assert!(!out.is_empty());
        prop_assert!(out.iter().all(|s| !s.word.is_empty()));
    }
}
