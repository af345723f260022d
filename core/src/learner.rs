//! Dictionary learning.
//!
//! Learning a word writes every conjunct prefix of it, so that the
//! token-driven dictionary walk can follow the word one token at a time. The
//! full word is seeded at `MIN_LEARNT_CONFIDENCE` and each shorter prefix one
//! below the next, so complete words outrank their own prefixes.
//!
//! Public API:
//! - `Learner::learn` / `train` / `unlearn`
//! - `Learner::learn_many`, `learn_from_reader`, `train_from_reader` for batches
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::dictionary::Dictionary;
use crate::engine::WordSanitizer;
use crate::error::{Result, VarnamError};
use crate::symbol::MIN_LEARNT_CONFIDENCE;
use crate::tokenizer::Tokenizer;
use crate::utils;

/// One word of a batch, with an optional starting confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnEntry {
    pub word: String,
    pub confidence: Option<i32>,
}

impl LearnEntry {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            confidence: None,
        }
    }
}

/// Counts reported by batch learning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnStatus {
    pub total: usize,
    pub failed: usize,
}

pub struct Learner<'a> {
    tokenizer: Tokenizer<'a>,
    dict: &'a Dictionary,
    sanitizers: &'a [WordSanitizer],
}

impl<'a> Learner<'a> {
    pub fn new(
        tokenizer: Tokenizer<'a>,
        dict: &'a Dictionary,
        sanitizers: &'a [WordSanitizer],
    ) -> Self {
        Self {
            tokenizer,
            dict,
            sanitizers,
        }
    }

    /// Generic cleanup followed by the scheme's sanitizers.
    pub fn sanitize(&self, word: &str) -> String {
        let mut word = utils::sanitize_word(word);
        for sanitizer in self.sanitizers {
            word = sanitizer(&word);
        }
        word
    }

    /// Prefixes to write for `word`, each with the confidence it gets when new.
    pub fn learning_path(&self, word: &str, confidence: i32) -> Result<Vec<(String, i32)>> {
        let conjuncts = self.tokenizer.split_into_conjuncts(word)?;
        if conjuncts.is_empty() {
            return Err(VarnamError::Decomposition {
                word: word.to_string(),
            });
        }

        let last = conjuncts.len() - 1;
        let mut prefix = String::new();
        Ok(conjuncts
            .iter()
            .enumerate()
            .map(|(k, conjunct)| {
                prefix.push_str(conjunct);
                (prefix.clone(), confidence - (last - k) as i32)
            })
            .collect())
    }

    pub fn learn(&self, word: &str) -> Result<()> {
        self.learn_with_confidence(word, MIN_LEARNT_CONFIDENCE)
    }

    pub fn learn_with_confidence(&self, word: &str, confidence: i32) -> Result<()> {
        let word = self.sanitize(word);
        let path = self.learning_path(&word, confidence)?;
        self.dict.learn_path(&path)?;
        tracing::debug!(word = %word, prefixes = path.len(), "learned");
        Ok(())
    }

    /// Learn `word` and associate it with the keystrokes `pattern`.
    pub fn train(&self, pattern: &str, word: &str) -> Result<()> {
        let pattern = pattern.trim();
        let word = self.sanitize(word);
        let path = self.learning_path(&word, MIN_LEARNT_CONFIDENCE)?;
        self.dict.train_path(pattern, &path)?;
        tracing::debug!(pattern, word = %word, "trained");
        Ok(())
    }

    /// Forget `word`. Text that is not a word of the scheme is taken as a
    /// pattern, and its associations are removed instead.
    pub fn unlearn(&self, word: &str) -> Result<()> {
        let word = self.sanitize(word);
        let removed = match self.tokenizer.split_into_conjuncts(&word) {
            Ok(_) => self.dict.remove_word(&word)?,
            Err(VarnamError::Decomposition { .. }) => self.dict.remove_pattern(&word)? > 0,
            Err(e) => return Err(e),
        };
        if removed {
            tracing::debug!(word = %word, "unlearned");
            Ok(())
        } else {
            Err(VarnamError::NothingToUnlearn(word))
        }
    }

    /// Learn a batch in one transaction. Words that cannot be decomposed are
    /// counted as failed and skipped.
    pub fn learn_many(&self, entries: &[LearnEntry]) -> Result<LearnStatus> {
        let mut status = LearnStatus::default();
        let mut paths = Vec::with_capacity(entries.len());
        for entry in entries {
            status.total += 1;
            let word = self.sanitize(&entry.word);
            let confidence = entry.confidence.unwrap_or(MIN_LEARNT_CONFIDENCE);
            match self.learning_path(&word, confidence) {
                Ok(path) => paths.push(path),
                Err(VarnamError::Decomposition { .. }) => {
                    tracing::warn!(word = %word, "skipping word outside the scheme");
                    status.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        self.dict.learn_paths(&paths)?;
        Ok(status)
    }

    /// Learn lines of `word` or `word confidence`.
    pub fn learn_from_reader<R: BufRead>(&self, reader: R) -> Result<LearnStatus> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            entries.push(LearnEntry {
                word: word.to_string(),
                confidence: fields.next().and_then(|c| c.parse().ok()),
            });
        }
        self.learn_many(&entries)
    }

    /// Train lines of `pattern word`.
    pub fn train_from_reader<R: BufRead>(&self, reader: R) -> Result<LearnStatus> {
        let mut status = LearnStatus::default();
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let (Some(pattern), Some(word)) = (fields.next(), fields.next()) else {
                continue;
            };
            status.total += 1;
            match self.train(pattern, word) {
                Ok(()) => {}
                Err(VarnamError::Decomposition { .. }) => status.failed += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(status)
    }
}
