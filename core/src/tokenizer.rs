// core/src/tokenizer.rs
//
// Longest-match tokenizer over the rule table.
//
// The scan grows a candidate sequence one character at a time. When the grown
// sequence stops matching, the previous (one shorter) sequence is emitted and
// the character that broke the match is examined again as the start of the
// next sequence. A character that matches nothing on its own passes through.

use crate::error::{Result, VarnamError};
use crate::lang::LangRules;
use crate::rule_table::RuleTable;
use crate::symbol::{AcceptCondition, MatchFilter, MatchType, Symbol, SymbolKind, Token};

/// One step of the scan.
enum Span<'w> {
    Matched {
        text: &'w str,
        symbols: Vec<Symbol>,
        end: usize,
    },
    Unmatched {
        ch: char,
        start: usize,
    },
}

pub struct Tokenizer<'a> {
    table: &'a RuleTable,
    lang: &'a LangRules,
}

impl<'a> Tokenizer<'a> {
    pub fn new(table: &'a RuleTable, lang: &'a LangRules) -> Self {
        Self { table, lang }
    }

    /// Tokenize keystrokes. `partial` marks the input as the tail of a word, so
    /// rules that only apply at the start of a word are not considered.
    pub fn tokenize(&self, word: &str, filter: MatchFilter, partial: bool) -> Result<Vec<Token>> {
        let spans = scan(word, |seq| {
            let mut symbols = self.table.lookup_pattern(seq, filter)?;
            if partial {
                symbols.retain(|s| s.accept_condition != AcceptCondition::StartsWith);
            }
            Ok(symbols)
        })?;

        let mut tokens = Vec::with_capacity(spans.len());
        for span in spans {
            match span {
                Span::Matched { text, symbols, end }
                    if symbols[0].kind == SymbolKind::Number && !self.lang.indic_digits =>
                {
                    let base = end + 1 - text.len();
                    for (offset, ch) in text.char_indices() {
                        tokens.push(Token::Char {
                            text: ch.to_string(),
                            position: base + offset + ch.len_utf8() - 1,
                        });
                    }
                }
                Span::Matched { text, symbols, end } => tokens.push(Token::Symbol {
                    symbols,
                    pattern: text.to_string(),
                    position: end,
                }),
                Span::Unmatched { ch, start } => {
                    let position = start + ch.len_utf8() - 1;
                    if self.lang.is_script_char(ch) {
                        let text = ch.to_string();
                        tokens.push(Token::Symbol {
                            symbols: vec![Symbol::literal(&text)],
                            pattern: text,
                            position,
                        });
                    } else {
                        tokens.push(Token::Char {
                            text: ch.to_string(),
                            position,
                        });
                    }
                }
            }
        }
        Ok(tokens)
    }

    /// Tokenize rendered script text by rule values.
    pub fn tokenize_script(&self, word: &str) -> Result<Vec<Token>> {
        let spans = scan(word, |seq| self.table.lookup_value(seq))?;
        Ok(spans
            .into_iter()
            .map(|span| match span {
                Span::Matched { text, symbols, end } => Token::Symbol {
                    symbols,
                    pattern: text.to_string(),
                    position: end,
                },
                Span::Unmatched { ch, start } => Token::Char {
                    text: ch.to_string(),
                    position: start + ch.len_utf8() - 1,
                },
            })
            .collect())
    }

    /// Split a script word into its smallest rule-table units.
    ///
    /// Fails when any character is not produced by some rule.
    pub fn split_into_conjuncts(&self, word: &str) -> Result<Vec<String>> {
        scan(word, |seq| self.table.lookup_value(seq))?
            .into_iter()
            .map(|span| match span {
                Span::Matched { text, .. } => Ok(text.to_string()),
                Span::Unmatched { .. } => Err(VarnamError::Decomposition {
                    word: word.to_string(),
                }),
            })
            .collect()
    }
}

/// Keep only EXACT rules in every token, falling back to the best rule when a
/// token has none.
pub fn retain_exact(tokens: &[Token]) -> Vec<Token> {
    tokens
        .iter()
        .map(|token| match token {
            Token::Symbol {
                symbols,
                pattern,
                position,
            } => {
                let exact: Vec<Symbol> = symbols
                    .iter()
                    .filter(|s| s.match_type == MatchType::Exact)
                    .cloned()
                    .collect();
                let symbols = if exact.is_empty() {
                    symbols.iter().take(1).cloned().collect()
                } else {
                    exact
                };
                Token::Symbol {
                    symbols,
                    pattern: pattern.clone(),
                    position: *position,
                }
            }
            other => other.clone(),
        })
        .collect()
}

fn scan<'w, F>(word: &'w str, mut lookup: F) -> Result<Vec<Span<'w>>>
where
    F: FnMut(&str) -> Result<Vec<Symbol>>,
{
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut previous: Vec<Symbol> = Vec::new();

    while i < chars.len() {
        let from = chars[start].0;
        let to = chars[i].0 + chars[i].1.len_utf8();
        let matches = lookup(&word[from..to])?;

        if matches.is_empty() {
            if i == start {
                spans.push(Span::Unmatched {
                    ch: chars[i].1,
                    start: from,
                });
                i += 1;
            } else {
                // backtrack: emit the previous sequence, rescan from chars[i]
                let prev_to = chars[i].0;
                spans.push(Span::Matched {
                    text: &word[from..prev_to],
                    symbols: std::mem::take(&mut previous),
                    end: prev_to - 1,
                });
            }
            start = i;
        } else if i + 1 == chars.len() {
            spans.push(Span::Matched {
                text: &word[from..to],
                symbols: matches,
                end: to - 1,
            });
            i += 1;
            start = i;
        } else {
            previous = matches;
            i += 1;
        }
    }
    Ok(spans)
}
