//! Learned-word dictionary backed by `redb`.
//!
//! Tables:
//! - `words`: id → bincode `WordEntry` (word, confidence, learned_on)
//! - `word_index`: word → id, also serves prefix scans
//! - `patterns_content`: (pattern, word id) → learned flag
//! - `metadata`: key → value
//!
//! Reads run on their own read transactions and never wait for writers.
//! Writers are serialized through a gate that gives up after the statement
//! timeout (`STATEMENT_TIMEOUT` unless changed), so a stuck writer surfaces as `VarnamError::Timeout`
//! instead of blocking the caller forever.
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ahash::AHashSet;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VarnamError};
use crate::symbol::Suggestion;

const WORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("words");
const WORD_INDEX: TableDefinition<&str, u64> = TableDefinition::new("word_index");
const PATTERNS: TableDefinition<(&str, u64), bool> = TableDefinition::new("patterns_content");
const METADATA: TableDefinition<&str, &str> = TableDefinition::new("metadata");

const SCHEMA_VERSION: &str = "1";

/// Upper bound on how long a single write may wait for the store.
pub const STATEMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A persisted dictionary row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    pub id: u64,
    pub word: String,
    pub confidence: i32,
    pub learned_on: u64,
}

impl WordEntry {
    pub fn to_suggestion(&self) -> Suggestion {
        Suggestion {
            word: self.word.clone(),
            weight: self.confidence,
            learned_on: self.learned_on,
        }
    }
}

/// A dictionary word reached through a pattern association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub suggestion: Suggestion,
    /// Byte length of the associated pattern.
    pub length: usize,
}

/// Portable dump of everything learned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learnings {
    pub words: Vec<LearnedWord>,
    pub patterns: Vec<LearnedPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedWord {
    pub word: String,
    pub confidence: i32,
    pub learned_on: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub pattern: String,
    pub word: String,
}

/// Words to write along one learning path, with the confidence each gets when
/// it is new. Existing rows are bumped by one instead.
pub type LearningPath = [(String, i32)];

pub struct Dictionary {
    db: Database,
    path: PathBuf,
    write_gate: Mutex<()>,
    statement_timeout: Duration,
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary").field("path", &self.path).finish()
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Dictionary {
    /// Open the dictionary at `path`, creating it if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let dict = Self {
            db: Database::create(path)?,
            path: path.to_path_buf(),
            write_gate: Mutex::new(()),
            statement_timeout: STATEMENT_TIMEOUT,
        };

        dict.write(|txn| {
            txn.open_table(WORDS)?;
            txn.open_table(WORD_INDEX)?;
            txn.open_table(PATTERNS)?;
            let mut meta = txn.open_table(METADATA)?;
            if meta.get("schema-version")?.is_none() {
                meta.insert("schema-version", SCHEMA_VERSION)?;
            }
            Ok(())
        })?;
        Ok(dict)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How long a write waits for the store before failing with `Timeout`.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    fn gate(&self) -> Result<MutexGuard<'_, ()>> {
        let deadline = Instant::now() + self.statement_timeout;
        loop {
            match self.write_gate.try_lock() {
                Ok(guard) => return Ok(guard),
                // nothing lives behind the gate
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(VarnamError::Timeout(self.statement_timeout));
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            }
        }
    }

    /// Run `f` in a write transaction, committing only if it succeeds.
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<T> {
        let _gate = self.gate()?;
        let txn = self.db.begin_write()?;
        let value = f(&txn)?;
        txn.commit()?;
        Ok(value)
    }

    // ========== Searches ==========

    /// Dictionary words equal to any of `terms` or, with `wildcard`, strictly
    /// longer words starting with any of them. Highest confidence first.
    pub fn search_by_prefixes(
        &self,
        terms: &[String],
        wildcard: bool,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(WORD_INDEX)?;
        let words = txn.open_table(WORDS)?;

        let mut seen = AHashSet::new();
        let mut ids = Vec::new();
        for term in terms {
            if wildcard {
                for item in index.range(term.as_str()..)? {
                    let (key, id) = item?;
                    let key = key.value();
                    if !key.starts_with(term.as_str()) {
                        break;
                    }
                    if key.len() > term.len() && seen.insert(id.value()) {
                        ids.push(id.value());
                    }
                }
            } else if let Some(id) = index.get(term.as_str())? {
                if seen.insert(id.value()) {
                    ids.push(id.value());
                }
            }
        }

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = load_entry(&words, id)? {
                found.push(entry.to_suggestion());
            }
        }
        found.sort_by(|a, b| b.weight.cmp(&a.weight));
        found.truncate(limit);
        Ok(found)
    }

    pub fn word_entry(&self, word: &str) -> Result<Option<WordEntry>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(WORD_INDEX)?;
        let Some(id) = index.get(word)?.map(|g| g.value()) else {
            return Ok(None);
        };
        let words = txn.open_table(WORDS)?;
        load_entry(&words, id)
    }

    /// Words associated with a pattern that is a prefix of `input`, or that
    /// extends `input`. Longest pattern first, at most `limit`.
    pub fn patterns_matching(&self, input: &str, limit: usize) -> Result<Vec<PatternMatch>> {
        let txn = self.db.begin_read()?;
        let patterns = txn.open_table(PATTERNS)?;
        let words = txn.open_table(WORDS)?;

        let mut hits: Vec<(usize, u64)> = Vec::new();
        let boundaries = input
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect::<Vec<_>>();
        for end in boundaries {
            let prefix = &input[..end];
            for item in patterns.range((prefix, 0u64)..=(prefix, u64::MAX))? {
                let (key, _) = item?;
                hits.push((end, key.value().1));
            }
        }
        for item in patterns.range((input, 0u64)..)? {
            let (key, _) = item?;
            let (pattern, id) = key.value();
            if !pattern.starts_with(input) {
                break;
            }
            if pattern.len() > input.len() {
                hits.push((pattern.len(), id));
            }
        }

        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.truncate(limit);

        let mut out = Vec::with_capacity(hits.len());
        for (length, id) in hits {
            if let Some(entry) = load_entry(&words, id)? {
                out.push(PatternMatch {
                    suggestion: entry.to_suggestion(),
                    length,
                });
            }
        }
        Ok(out)
    }

    /// Most recently learned words, newest first.
    pub fn recently_learned(&self, offset: usize, limit: usize) -> Result<Vec<Suggestion>> {
        let mut entries = self.entries()?;
        entries.retain(|e| e.learned_on != 0);
        entries.sort_by(|a, b| b.learned_on.cmp(&a.learned_on).then(b.id.cmp(&a.id)));
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.to_suggestion())
            .collect())
    }

    /// Every word row, in id order.
    pub fn entries(&self) -> Result<Vec<WordEntry>> {
        let txn = self.db.begin_read()?;
        let words = txn.open_table(WORDS)?;
        let mut out = Vec::new();
        for item in words.iter()? {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(bytes.value())?);
        }
        Ok(out)
    }

    /// Patterns associated with `word`.
    pub fn patterns_for(&self, word: &str) -> Result<Vec<String>> {
        let Some(entry) = self.word_entry(word)? else {
            return Ok(Vec::new());
        };
        let txn = self.db.begin_read()?;
        let patterns = txn.open_table(PATTERNS)?;
        let mut out = Vec::new();
        for item in patterns.iter()? {
            let (key, _) = item?;
            let (pattern, id) = key.value();
            if id == entry.id {
                out.push(pattern.to_string());
            }
        }
        Ok(out)
    }

    // ========== Writes ==========

    /// Write one learning path in a single transaction. Returns the id of the
    /// last word on the path.
    pub fn learn_path(&self, path: &LearningPath) -> Result<u64> {
        let now = now_secs();
        self.write(|txn| apply_path(txn, path, now))
    }

    /// Write several learning paths in a single transaction.
    pub fn learn_paths(&self, paths: &[Vec<(String, i32)>]) -> Result<()> {
        let now = now_secs();
        self.write(|txn| {
            for path in paths {
                apply_path(txn, path, now)?;
            }
            Ok(())
        })
    }

    /// Learn `path` and associate `pattern` with its last word. An existing
    /// association is left as is.
    pub fn train_path(&self, pattern: &str, path: &LearningPath) -> Result<u64> {
        let now = now_secs();
        self.write(|txn| {
            let id = apply_path(txn, path, now)?;
            let mut patterns = txn.open_table(PATTERNS)?;
            if patterns.get((pattern, id))?.is_none() {
                patterns.insert((pattern, id), true)?;
            }
            Ok(id)
        })
    }

    /// Remove `word` and its pattern associations. Other rows are untouched.
    pub fn remove_word(&self, word: &str) -> Result<bool> {
        self.write(|txn| {
            let mut index = txn.open_table(WORD_INDEX)?;
            let Some(id) = index.remove(word)?.map(|g| g.value()) else {
                return Ok(false);
            };
            txn.open_table(WORDS)?.remove(id)?;

            let mut patterns = txn.open_table(PATTERNS)?;
            let mut orphaned = Vec::new();
            for item in patterns.iter()? {
                let (key, _) = item?;
                let (pattern, word_id) = key.value();
                if word_id == id {
                    orphaned.push(pattern.to_string());
                }
            }
            for pattern in &orphaned {
                patterns.remove((pattern.as_str(), id))?;
            }
            Ok(true)
        })
    }

    /// Remove every association of `pattern`. Returns how many were removed.
    pub fn remove_pattern(&self, pattern: &str) -> Result<usize> {
        self.write(|txn| {
            let mut patterns = txn.open_table(PATTERNS)?;
            let mut ids = Vec::new();
            for item in patterns.range((pattern, 0u64)..=(pattern, u64::MAX))? {
                let (key, _) = item?;
                ids.push(key.value().1);
            }
            for id in &ids {
                patterns.remove((pattern, *id))?;
            }
            Ok(ids.len())
        })
    }

    // ========== Export / Import ==========

    pub fn export(&self) -> Result<Learnings> {
        let entries = self.entries()?;
        let txn = self.db.begin_read()?;
        let patterns = txn.open_table(PATTERNS)?;

        let by_id: ahash::AHashMap<u64, &str> =
            entries.iter().map(|e| (e.id, e.word.as_str())).collect();
        let mut learned_patterns = Vec::new();
        for item in patterns.iter()? {
            let (key, _) = item?;
            let (pattern, id) = key.value();
            if let Some(word) = by_id.get(&id) {
                learned_patterns.push(LearnedPattern {
                    pattern: pattern.to_string(),
                    word: word.to_string(),
                });
            }
        }

        Ok(Learnings {
            words: entries
                .iter()
                .map(|e| LearnedWord {
                    word: e.word.clone(),
                    confidence: e.confidence,
                    learned_on: e.learned_on,
                })
                .collect(),
            patterns: learned_patterns,
        })
    }

    /// Merge `learnings` into the store. Words already present keep their rows.
    pub fn import(&self, learnings: &Learnings) -> Result<()> {
        self.write(|txn| {
            let mut words = txn.open_table(WORDS)?;
            let mut index = txn.open_table(WORD_INDEX)?;
            let mut patterns = txn.open_table(PATTERNS)?;
            let mut next_id = next_word_id(&words)?;

            for learned in &learnings.words {
                if index.get(learned.word.as_str())?.is_some() {
                    continue;
                }
                let entry = WordEntry {
                    id: next_id,
                    word: learned.word.clone(),
                    confidence: learned.confidence,
                    learned_on: learned.learned_on,
                };
                next_id += 1;
                index.insert(entry.word.as_str(), entry.id)?;
                words.insert(entry.id, bincode::serialize(&entry)?.as_slice())?;
            }

            for learned in &learnings.patterns {
                let Some(id) = index.get(learned.word.as_str())?.map(|g| g.value()) else {
                    continue;
                };
                if patterns.get((learned.pattern.as_str(), id))?.is_none() {
                    patterns.insert((learned.pattern.as_str(), id), true)?;
                }
            }
            Ok(())
        })
    }
}

fn load_entry(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Option<WordEntry>> {
    match table.get(id)? {
        Some(bytes) => Ok(Some(bincode::deserialize(bytes.value())?)),
        None => Ok(None),
    }
}

fn next_word_id(words: &impl ReadableTable<u64, &'static [u8]>) -> Result<u64> {
    let last = words.iter()?.next_back().transpose()?;
    Ok(last.map(|(k, _)| k.value() + 1).unwrap_or(1))
}

fn apply_path(txn: &WriteTransaction, path: &LearningPath, now: u64) -> Result<u64> {
    let mut words = txn.open_table(WORDS)?;
    let mut index = txn.open_table(WORD_INDEX)?;
    let mut next_id = next_word_id(&words)?;

    let mut last_id = 0;
    for (word, confidence) in path {
        let existing = index.get(word.as_str())?.map(|g| g.value());
        let entry = match existing {
            Some(id) => match load_entry(&words, id)? {
                Some(mut entry) => {
                    entry.confidence += 1;
                    entry.learned_on = now;
                    entry
                }
                None => WordEntry {
                    id,
                    word: word.clone(),
                    confidence: *confidence,
                    learned_on: now,
                },
            },
            None => {
                let id = next_id;
                next_id += 1;
                index.insert(word.as_str(), id)?;
                WordEntry {
                    id,
                    word: word.clone(),
                    confidence: *confidence,
                    learned_on: now,
                }
            }
        };
        words.insert(entry.id, bincode::serialize(&entry)?.as_slice())?;
        last_id = entry.id;
    }
    Ok(last_id)
}
