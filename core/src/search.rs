// core/src/search.rs
//
// The three independent searches of a transliteration request.
//
// A `Searcher` borrows everything it needs from the engine and is shared by
// reference across the request's worker threads. Each search checks the
// request's cancellation token between units of work.

use ahash::AHashMap;

use crate::cancel::{CancellationToken, SearchResult};
use crate::dictionary::Dictionary;
use crate::engine::WordPartializer;
use crate::expander::Expander;
use crate::lang::LangRules;
use crate::rule_table::RuleTable;
use crate::symbol::{
    sort_suggestions, MatchFilter, Suggestion, Token, BASIC_WEIGHT, PATTERN_LENGTH_BOOST,
};
use crate::tokenizer::{retain_exact, Tokenizer};
use crate::Config;

/// Outcome of walking the token lattice against the dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictionaryResult {
    /// Dictionary words hit at the furthest position reached.
    pub matches: Vec<Suggestion>,
    /// Whether the furthest position is the last token.
    pub exact_match: bool,
    /// Byte position of the furthest token with a dictionary hit.
    pub longest_match_position: Option<usize>,
}

/// Exact rows and strict-prefix completions for a set of matched words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoreDictionaryResult {
    pub exact_words: Vec<Suggestion>,
    /// One completion list per input word, in input order.
    pub completions: Vec<Vec<Suggestion>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DictionarySuggestions {
    pub exact_words: Vec<Suggestion>,
    pub exact_matches: Vec<Suggestion>,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PatternSuggestions {
    pub exact_words: Vec<Suggestion>,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone)]
struct Candidate {
    word: String,
    weight: i32,
    pruned: bool,
}

pub(crate) struct Searcher<'a> {
    pub table: &'a RuleTable,
    pub dict: &'a Dictionary,
    pub lang: &'a LangRules,
    pub config: &'a Config,
    pub partializers: &'a [WordPartializer],
    pub cancel: &'a CancellationToken,
}

impl<'a> Searcher<'a> {
    fn tokenizer(&self) -> Tokenizer<'a> {
        Tokenizer::new(self.table, self.lang)
    }

    fn expander(&self) -> Expander<'a> {
        Expander::new(self.lang)
    }

    /// Dictionary rows for exactly these words, keyed by word.
    fn lookup_candidates(
        &self,
        candidates: &[Candidate],
    ) -> SearchResult<AHashMap<String, Suggestion>> {
        let terms: Vec<String> = candidates.iter().map(|c| c.word.clone()).collect();
        let rows = self.dict.search_by_prefixes(&terms, false, terms.len())?;
        Ok(rows.into_iter().map(|s| (s.word.clone(), s)).collect())
    }

    /// Walk `tokens` like the expander, keeping only continuations that exist
    /// in the dictionary.
    pub fn get_from_dictionary(&self, tokens: &[Token]) -> SearchResult<DictionaryResult> {
        let expander = self.expander();
        let n = tokens.len();
        let mut in_flight: Vec<Candidate> = Vec::new();
        let mut result = DictionaryResult::default();

        for (i, token) in tokens.iter().enumerate() {
            self.cancel.checkpoint()?;

            let symbols = match token {
                Token::Char { text, .. } => {
                    if i == 0 {
                        in_flight.push(Candidate {
                            word: text.clone(),
                            weight: BASIC_WEIGHT,
                            pruned: false,
                        });
                    } else {
                        for candidate in in_flight.iter_mut().filter(|c| !c.pruned) {
                            candidate.word.push_str(text);
                        }
                    }
                    continue;
                }
                Token::Symbol { symbols, .. } => symbols,
            };

            let admissible = expander.admissible(symbols, i, n, false);
            let mut found = Vec::new();

            if i == 0 {
                let seeds: Vec<Candidate> = admissible
                    .iter()
                    .map(|symbol| {
                        let mut word = String::new();
                        expander.render(&mut word, symbol, i);
                        Candidate {
                            word,
                            weight: Expander::seed_weight(symbol),
                            pruned: false,
                        }
                    })
                    .collect();
                let hits = self.lookup_candidates(&seeds)?;
                for mut seed in seeds {
                    match hits.get(&seed.word) {
                        Some(hit) => found.push(hit.clone()),
                        None => seed.pruned = true,
                    }
                    in_flight.push(seed);
                }
            } else {
                for j in 0..in_flight.len() {
                    if in_flight[j].pruned {
                        continue;
                    }
                    let till = in_flight[j].clone();
                    let extended: Vec<Candidate> = admissible
                        .iter()
                        .map(|symbol| {
                            let mut word = till.word.clone();
                            expander.render(&mut word, symbol, i);
                            Candidate {
                                word,
                                weight: Expander::extend_weight(till.weight, symbol, i, n),
                                pruned: false,
                            }
                        })
                        .collect();
                    let hits = self.lookup_candidates(&extended)?;

                    for (k, mut candidate) in extended.into_iter().enumerate() {
                        match hits.get(&candidate.word) {
                            Some(hit) => found.push(hit.clone()),
                            None => candidate.pruned = true,
                        }
                        if k == 0 {
                            in_flight[j] = candidate;
                        } else if !candidate.pruned {
                            in_flight.push(candidate);
                        }
                    }
                }
            }

            if !found.is_empty() {
                result.matches = found;
                result.longest_match_position = Some(token.position());
            }
        }

        result.exact_match = result.longest_match_position.is_some()
            && result.longest_match_position == tokens.last().map(Token::position);
        Ok(result)
    }

    /// Split fully matched words into their exact rows and longer completions.
    pub fn get_more_from_dictionary(
        &self,
        words: &[Suggestion],
    ) -> SearchResult<MoreDictionaryResult> {
        let limit = self.config.dictionary_suggestions_limit;
        let terms: Vec<String> = words.iter().map(|s| s.word.clone()).collect();

        let exact_words = self.dict.search_by_prefixes(&terms, false, terms.len())?;
        let mut completions = Vec::with_capacity(terms.len());
        for term in terms {
            self.cancel.checkpoint()?;
            completions.push(self.dict.search_by_prefixes(&[term], true, limit)?);
        }
        Ok(MoreDictionaryResult {
            exact_words,
            completions,
        })
    }

    /// Complete each of `heads` with the expansion of the keystrokes `rest`.
    /// The results inherit the head's weight and learn time.
    pub fn tokenize_rest_of_word(
        &self,
        rest: &str,
        heads: &[Suggestion],
        limit: usize,
    ) -> SearchResult<Vec<Suggestion>> {
        let tail = self.tokenizer().tokenize(rest, MatchFilter::Exact, true)?;
        let expander = self.expander();

        let mut out = Vec::new();
        for head in heads {
            self.cancel.checkpoint()?;
            let mut tokens = Vec::with_capacity(tail.len() + 1);
            tokens.push(Token::Char {
                text: self.lang.remove_last_virama(&head.word).to_string(),
                position: 0,
            });
            tokens.extend(tail.iter().cloned());

            let mut expanded = expander.expand_within(&tokens, false, true, limit, self.cancel)?;
            sort_suggestions(&mut expanded);
            expanded.truncate(limit);
            out.extend(expanded.into_iter().map(|mut s| {
                s.weight += head.weight;
                s.learned_on = head.learned_on;
                s
            }));
        }
        Ok(out)
    }

    /// Token-driven dictionary search for `word`.
    pub fn dictionary_suggestions(
        &self,
        word: &str,
        tokens: &[Token],
    ) -> SearchResult<DictionarySuggestions> {
        let exact_tokens;
        let tokens: &[Token] = if self.config.dictionary_match_exact {
            exact_tokens = retain_exact(tokens);
            &exact_tokens
        } else {
            tokens
        };

        let found = self.get_from_dictionary(tokens)?;
        let mut out = DictionarySuggestions::default();
        if found.matches.is_empty() {
            return Ok(out);
        }

        if found.exact_match {
            let more = self.get_more_from_dictionary(&found.matches)?;
            out.exact_matches = found
                .matches
                .into_iter()
                .filter(|m| !more.exact_words.iter().any(|e| e.word == m.word))
                .collect();
            out.exact_words = more.exact_words;
            out.suggestions = more.completions.into_iter().flatten().collect();
        } else if let Some(position) = found.longest_match_position {
            let rest = &word[position + 1..];
            out.suggestions = self.tokenize_rest_of_word(
                rest,
                &found.matches,
                self.config.dictionary_suggestions_limit,
            )?;
        }
        Ok(out)
    }

    /// Pattern-driven dictionary search for `word`.
    pub fn pattern_dictionary_suggestions(&self, word: &str) -> SearchResult<PatternSuggestions> {
        let limit = self.config.pattern_dictionary_suggestions_limit;
        let matches = self.dict.patterns_matching(word, limit)?;

        let mut out = PatternSuggestions::default();
        let mut partials = Vec::new();
        for m in matches {
            if m.length < word.len() {
                let mut suggestion = m.suggestion;
                suggestion.weight += m.length as i32 * PATTERN_LENGTH_BOOST;
                for partializer in self.partializers {
                    partializer(&mut suggestion);
                }
                partials.push((suggestion, m.length));
            } else if m.length == word.len() {
                out.exact_words.push(m.suggestion);
            } else {
                out.suggestions.push(m.suggestion);
            }
        }

        let per_match_limit = if !partials.is_empty() && limit > partials.len() {
            limit / partials.len()
        } else {
            limit
        };
        for (head, length) in partials {
            if out.suggestions.len() >= limit {
                break;
            }
            let rest = &word[length..];
            let filled =
                self.tokenize_rest_of_word(rest, std::slice::from_ref(&head), per_match_limit)?;
            out.suggestions.extend(filled);
        }
        out.suggestions.truncate(limit);
        Ok(out)
    }

    /// EXACT-only expansion, best first, at most `limit`.
    pub fn greedy(&self, tokens: &[Token], limit: usize) -> SearchResult<Vec<Suggestion>> {
        let exact = retain_exact(tokens);
        let mut out = self
            .expander()
            .expand_within(&exact, true, false, limit, self.cancel)?;
        sort_suggestions(&mut out);
        Ok(out)
    }

    /// Full expansion, best first, at most `limit`.
    pub fn tokenizer_suggestions(
        &self,
        tokens: &[Token],
        limit: usize,
    ) -> SearchResult<Vec<Suggestion>> {
        let mut out = self
            .expander()
            .expand_within(tokens, false, false, limit, self.cancel)?;
        sort_suggestions(&mut out);
        Ok(out)
    }
}

/// The searches a request fans out to. `coordinate` in the engine only talks
/// to this trait.
pub(crate) trait SearchSources: Sync {
    fn cancel(&self) -> &CancellationToken;
    fn config(&self) -> &Config;
    fn search_dictionary(&self, word: &str, tokens: &[Token])
        -> SearchResult<DictionarySuggestions>;
    fn search_pattern_dictionary(&self, word: &str) -> SearchResult<PatternSuggestions>;
    fn search_greedy(&self, tokens: &[Token], limit: usize) -> SearchResult<Vec<Suggestion>>;
    fn search_tokenizer(&self, tokens: &[Token], limit: usize) -> SearchResult<Vec<Suggestion>>;
}

impl SearchSources for Searcher<'_> {
    fn cancel(&self) -> &CancellationToken {
        self.cancel
    }

    fn config(&self) -> &Config {
        self.config
    }

    fn search_dictionary(
        &self,
        word: &str,
        tokens: &[Token],
    ) -> SearchResult<DictionarySuggestions> {
        self.dictionary_suggestions(word, tokens)
    }

    fn search_pattern_dictionary(&self, word: &str) -> SearchResult<PatternSuggestions> {
        self.pattern_dictionary_suggestions(word)
    }

    fn search_greedy(&self, tokens: &[Token], limit: usize) -> SearchResult<Vec<Suggestion>> {
        self.greedy(tokens, limit)
    }

    fn search_tokenizer(&self, tokens: &[Token], limit: usize) -> SearchResult<Vec<Suggestion>> {
        self.tokenizer_suggestions(tokens, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        table: RuleTable,
        dict: Dictionary,
        lang: LangRules,
        config: Config,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            let (dir, table) = testutil::rule_table();
            let dict = Dictionary::open(dir.path().join("ml.learnings")).unwrap();
            Self {
                _dir: dir,
                table,
                dict,
                lang: testutil::lang(),
                config: Config::default(),
                cancel: CancellationToken::new(),
            }
        }

        fn searcher<'a>(&'a self, partializers: &'a [WordPartializer]) -> Searcher<'a> {
            Searcher {
                table: &self.table,
                dict: &self.dict,
                lang: &self.lang,
                config: &self.config,
                partializers,
                cancel: &self.cancel,
            }
        }

        fn tokens(&self, word: &str) -> Vec<Token> {
            Tokenizer::new(&self.table, &self.lang)
                .tokenize(word, MatchFilter::All, false)
                .unwrap()
        }

        fn learn(&self, words: &[(&str, i32)]) {
            let path: Vec<(String, i32)> =
                words.iter().map(|(w, c)| (w.to_string(), *c)).collect();
            self.dict.learn_path(&path).unwrap();
        }
    }

    #[test]
    fn walk_reaches_last_token_for_learned_word() {
        let fx = Fixture::new();
        fx.learn(&[("മ", 26), ("മല", 27), ("മലയാ", 28), ("മലയാള", 29), ("മലയാളം", 30)]);

        let result = fx
            .searcher(&[])
            .get_from_dictionary(&fx.tokens("malayalam"))
            .ok()
            .unwrap();
        assert!(result.exact_match);
        assert_eq!(result.longest_match_position, Some(8));
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].word, "മലയാളം");
        assert_eq!(result.matches[0].weight, 30);
    }

    #[test]
    fn walk_stops_at_furthest_hit() {
        let fx = Fixture::new();
        fx.learn(&[("മ", 29), ("മല", 30)]);

        let result = fx
            .searcher(&[])
            .get_from_dictionary(&fx.tokens("malayil"))
            .ok()
            .unwrap();
        assert!(!result.exact_match);
        assert_eq!(result.longest_match_position, Some(3));
        assert_eq!(result.matches[0].word, "മല");
    }

    #[test]
    fn partial_match_completes_the_tail() {
        let fx = Fixture::new();
        fx.learn(&[("മ", 29), ("മല", 30)]);

        let out = fx
            .searcher(&[])
            .dictionary_suggestions("malayil", &fx.tokens("malayil"))
            .ok()
            .unwrap();
        assert!(out.exact_words.is_empty());
        assert_eq!(out.suggestions[0].word, "മലയിൽ");
        assert!(out.suggestions[0].is_learned());
    }

    #[test]
    fn exact_walk_collects_completions() {
        let fx = Fixture::new();
        fx.learn(&[("മ", 29), ("മല", 30)]);
        fx.learn(&[("മലയാളം", 30)]);

        let out = fx
            .searcher(&[])
            .dictionary_suggestions("mala", &fx.tokens("mala"))
            .ok()
            .unwrap();
        assert_eq!(out.exact_words.len(), 1);
        assert_eq!(out.exact_words[0].word, "മല");
        assert!(out.exact_matches.is_empty());
        assert_eq!(out.suggestions[0].word, "മലയാളം");
    }

    #[test]
    fn pattern_partial_uses_partializer_and_boost() {
        let fx = Fixture::new();
        fx.dict
            .train_path("mal", &[("മൽ".to_string(), 30)])
            .unwrap();
        let to_base: WordPartializer = Arc::new(|s: &mut Suggestion| {
            if let Some(stem) = s.word.strip_suffix('ൽ') {
                s.word = format!("{stem}ല");
            }
        });
        let partializers = [to_base];

        let out = fx
            .searcher(&partializers)
            .pattern_dictionary_suggestions("malaa")
            .ok()
            .unwrap();
        assert!(out.exact_words.is_empty());
        assert_eq!(out.suggestions[0].word, "മലാ");
        // confidence + 3 * 50 + tail expansion
        assert!(out.suggestions[0].weight > 30 + 150);
    }

    #[test]
    fn pattern_exact_and_over_matches() {
        let fx = Fixture::new();
        fx.dict.train_path("ma", &[("മ".to_string(), 30)]).unwrap();
        fx.dict.train_path("mala", &[("മല".to_string(), 30)]).unwrap();

        let out = fx
            .searcher(&[])
            .pattern_dictionary_suggestions("ma")
            .ok()
            .unwrap();
        assert_eq!(out.exact_words[0].word, "മ");
        assert_eq!(out.suggestions[0].word, "മല");
    }

    #[test]
    fn cancelled_walk_stops() {
        let fx = Fixture::new();
        fx.cancel.cancel();
        let tokens = fx.tokens("mala");
        assert!(fx.searcher(&[]).get_from_dictionary(&tokens).is_err());
        assert!(fx.searcher(&[]).greedy(&tokens, 10).is_err());
        assert!(fx.searcher(&[]).tokenizer_suggestions(&tokens, 10).is_err());
    }
}
