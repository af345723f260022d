//! Expansion of a token lattice into weighted candidate words.
//!
//! Every token position contributes one rendered piece per admissible rule.
//! The first admissible rule extends a candidate in place and each further
//! rule forks a copy, so `expand` enumerates every tokenization path.
//! `expand_within` keeps only the best `limit` candidates after each position
//! and polls a cancellation token, which bounds both memory and latency on long
//! inputs. Scores are a sum of per-position terms, so the best `limit` complete
//! words always descend from the best `limit` prefixes.
//!
//! Scoring, for a rule at position `i` of `n` tokens:
//! - seed (i == 0): `BASIC_WEIGHT - weight`
//! - extension: `old - weight + (n - i) + (POSSIBILITY_RANK - match_type)`
use crate::cancel::{CancellationToken, SearchResult};
use crate::lang::LangRules;
use crate::symbol::{
    AcceptCondition, MatchType, Suggestion, Symbol, SymbolKind, Token, BASIC_WEIGHT,
    POSSIBILITY_RANK, RENDER_VALUE2_TAG, ZWNJ,
};

pub struct Expander<'a> {
    lang: &'a LangRules,
}

impl<'a> Expander<'a> {
    pub fn new(lang: &'a LangRules) -> Self {
        Self { lang }
    }

    /// Rules usable at token `index` of `len`. Never empty for a non-empty token.
    pub fn admissible<'s>(
        &self,
        symbols: &'s [Symbol],
        index: usize,
        len: usize,
        greedy: bool,
    ) -> Vec<&'s Symbol> {
        let state = AcceptCondition::for_position(index, len);
        let picked: Vec<&Symbol> = symbols
            .iter()
            .filter(|s| !(greedy && s.match_type == MatchType::Possibility))
            .filter(|s| s.accept_condition == AcceptCondition::All || s.accept_condition == state)
            .collect();
        if picked.is_empty() {
            symbols.iter().take(1).collect()
        } else {
            picked
        }
    }

    /// Append the rendering of `symbol` to `word`. `position` is the rendering
    /// position, already shifted for partial expansions.
    pub fn render(&self, word: &mut String, symbol: &Symbol, position: usize) {
        if symbol.kind == SymbolKind::Virama {
            if !self.lang.virama.is_empty() && word.ends_with(self.lang.virama.as_str()) {
                word.push(ZWNJ);
            } else {
                word.push_str(&symbol.value1);
                word.push(ZWNJ);
            }
            return;
        }
        word.push_str(value_for(symbol, position));
    }

    pub fn seed_weight(symbol: &Symbol) -> i32 {
        BASIC_WEIGHT - symbol.weight
    }

    pub fn extend_weight(weight: i32, symbol: &Symbol, index: usize, len: usize) -> i32 {
        weight - symbol.weight + (len - index) as i32 + (POSSIBILITY_RANK - symbol.match_type.rank())
    }

    /// Expand `tokens` into every candidate. `greedy` restricts to EXACT
    /// rules; `partial` treats the first token as non-initial when picking
    /// values. The output grows with the product of the ambiguity at each
    /// position.
    pub fn expand(&self, tokens: &[Token], greedy: bool, partial: bool) -> Vec<Suggestion> {
        self.expand_limited(tokens, greedy, partial, usize::MAX)
    }

    /// `expand` keeping at most `limit` candidates.
    pub fn expand_limited(
        &self,
        tokens: &[Token],
        greedy: bool,
        partial: bool,
        limit: usize,
    ) -> Vec<Suggestion> {
        // a fresh token never fires and expansion touches no store
        self.expand_within(tokens, greedy, partial, limit, &CancellationToken::new())
            .unwrap_or_default()
    }

    /// Like `expand`, but at most `limit` candidates survive each position.
    pub(crate) fn expand_within(
        &self,
        tokens: &[Token],
        greedy: bool,
        partial: bool,
        limit: usize,
        cancel: &CancellationToken,
    ) -> SearchResult<Vec<Suggestion>> {
        let n = tokens.len();
        let mut results: Vec<Suggestion> = Vec::new();
        let mut forks = 0usize;

        for (i, token) in tokens.iter().enumerate() {
            cancel.checkpoint()?;
            let position = if partial { i + 1 } else { i };
            match token {
                Token::Char { text, .. } => {
                    if i == 0 {
                        results.push(Suggestion::new(text.clone(), BASIC_WEIGHT));
                    } else {
                        for suggestion in results.iter_mut() {
                            suggestion.word.push_str(text);
                        }
                    }
                }
                Token::Symbol { symbols, .. } => {
                    let admissible = self.admissible(symbols, i, n, greedy);
                    if i == 0 {
                        for symbol in admissible {
                            let mut word = String::new();
                            self.render(&mut word, symbol, position);
                            results.push(Suggestion::new(word, Self::seed_weight(symbol)));
                        }
                        continue;
                    }

                    let in_flight = results.len();
                    for j in 0..in_flight {
                        let till = results[j].clone();
                        for (k, symbol) in admissible.iter().enumerate() {
                            let mut word = till.word.clone();
                            self.render(&mut word, symbol, position);
                            let weight = Self::extend_weight(till.weight, symbol, i, n);
                            if k == 0 {
                                results[j].word = word;
                                results[j].weight = weight;
                            } else {
                                forks += 1;
                                if forks % CANCEL_CHECK_FORKS == 0 {
                                    cancel.checkpoint()?;
                                }
                                results.push(Suggestion {
                                    word,
                                    weight,
                                    learned_on: till.learned_on,
                                });
                            }
                        }
                    }
                }
            }
            keep_best(&mut results, limit);
        }
        Ok(results)
    }
}

/// Forks between two cancellation checks inside one position.
const CANCEL_CHECK_FORKS: usize = 256;

/// Drop all but the `width` heaviest candidates. Survivors keep their order and
/// ties at the cutoff go to the earlier candidate.
fn keep_best(results: &mut Vec<Suggestion>, width: usize) {
    if results.len() <= width {
        return;
    }
    if width == 0 {
        results.clear();
        return;
    }
    let mut weights: Vec<i32> = results.iter().map(|s| s.weight).collect();
    let (_, cutoff, _) = weights.select_nth_unstable_by(width - 1, |a, b| b.cmp(a));
    let cutoff = *cutoff;
    let above = results.iter().filter(|s| s.weight > cutoff).count();
    let mut ties = width - above;
    results.retain(|s| {
        if s.weight > cutoff {
            true
        } else if s.weight == cutoff && ties > 0 {
            ties -= 1;
            true
        } else {
            false
        }
    });
}

/// value2 for vowel signs after the first position or when the rule asks for
/// it, value1 otherwise.
fn value_for(symbol: &Symbol, position: usize) -> &str {
    let wants_value2 =
        symbol.tag == RENDER_VALUE2_TAG || (symbol.kind == SymbolKind::Vowel && position > 0);
    if wants_value2 && !symbol.value2.is_empty() {
        &symbol.value2
    } else {
        &symbol.value1
    }
}
