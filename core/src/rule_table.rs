//! Read-only transliteration rule table backed by `redb`.
//!
//! Layout:
//! - `symbols`: id → bincode encoded `Symbol`
//! - `symbols_by_pattern`: pattern → ids (multimap)
//! - `symbols_by_value`: value1 / value2 → ids (multimap)
//! - `metadata`: scheme details
//!
//! Rule tables are produced once (see `RuleTable::create`) and then only read.
//! Lookups by pattern are the tokenizer's hot path and go through a small LRU
//! cache.
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
    TableError,
};
use serde::{Deserialize, Serialize};

use crate::cancel::{CancellationToken, SearchResult};
use crate::error::{Result, VarnamError};
use crate::symbol::{
    AcceptCondition, MatchFilter, MatchType, Symbol, SymbolKind, MAX_SYMBOL_LENGTH,
};

const SYMBOLS: TableDefinition<u32, &[u8]> = TableDefinition::new("symbols");
const PATTERN_INDEX: MultimapTableDefinition<&str, u32> =
    MultimapTableDefinition::new("symbols_by_pattern");
const VALUE_INDEX: MultimapTableDefinition<&str, u32> =
    MultimapTableDefinition::new("symbols_by_value");
const METADATA: TableDefinition<&str, &str> = TableDefinition::new("metadata");

const LOOKUP_CACHE_SIZE: usize = 1024;
const SEARCH_CHECK_INTERVAL: usize = 64;

/// Scheme information stored alongside the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeDetails {
    pub identifier: String,
    pub lang_code: String,
    pub display_name: String,
    pub author: String,
    pub compiled_date: String,
    pub is_stable: bool,
}

impl SchemeDetails {
    fn entries(&self) -> [(&'static str, String); 6] {
        [
            ("scheme-id", self.identifier.clone()),
            ("scheme-language-code", self.lang_code.clone()),
            ("scheme-display-name", self.display_name.clone()),
            ("scheme-author", self.author.clone()),
            ("scheme-compiled-date", self.compiled_date.clone()),
            ("scheme-stable", if self.is_stable { "1" } else { "0" }.to_string()),
        ]
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "scheme-id" => self.identifier = value.to_string(),
            "scheme-language-code" => self.lang_code = value.to_string(),
            "scheme-display-name" => self.display_name = value.to_string(),
            "scheme-author" => self.author = value.to_string(),
            "scheme-compiled-date" => self.compiled_date = value.to_string(),
            "scheme-stable" => self.is_stable = value == "1",
            _ => {}
        }
    }
}

/// String criterion for `SymbolQuery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFilter {
    Equals(String),
    /// SQL style pattern: `%` matches any run, `_` exactly one character.
    Like(String),
}

impl TextFilter {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextFilter::Equals(expected) => expected == text,
            TextFilter::Like(pattern) => like_match(pattern, text),
        }
    }
}

/// Criteria for `RuleTable::search`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolQuery {
    pub id: Option<u32>,
    pub kind: Option<SymbolKind>,
    pub match_type: Option<MatchType>,
    pub pattern: Option<TextFilter>,
    pub value1: Option<TextFilter>,
    pub value2: Option<TextFilter>,
    pub value3: Option<TextFilter>,
    pub tag: Option<TextFilter>,
    pub weight: Option<i32>,
    pub priority: Option<i32>,
    pub accept_condition: Option<AcceptCondition>,
    pub flags: Option<i32>,
}

impl SymbolQuery {
    pub fn matches(&self, symbol: &Symbol) -> bool {
        fn text(filter: &Option<TextFilter>, value: &str) -> bool {
            filter.as_ref().map_or(true, |f| f.matches(value))
        }
        fn exact<T: PartialEq>(filter: &Option<T>, value: &T) -> bool {
            filter.as_ref().map_or(true, |f| f == value)
        }

        exact(&self.id, &symbol.id)
            && exact(&self.kind, &symbol.kind)
            && exact(&self.match_type, &symbol.match_type)
            && text(&self.pattern, &symbol.pattern)
            && text(&self.value1, &symbol.value1)
            && text(&self.value2, &symbol.value2)
            && text(&self.value3, &symbol.value3)
            && text(&self.tag, &symbol.tag)
            && exact(&self.weight, &symbol.weight)
            && exact(&self.priority, &symbol.priority)
            && exact(&self.accept_condition, &symbol.accept_condition)
            && exact(&self.flags, &symbol.flags)
    }
}

fn like_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

type LookupCache = Mutex<LruCache<(String, MatchFilter), Vec<Symbol>>>;

pub struct RuleTable {
    db: Database,
    path: PathBuf,
    details: SchemeDetails,
    pattern_cache: LookupCache,
}

impl std::fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleTable")
            .field("path", &self.path)
            .field("details", &self.details)
            .finish()
    }
}

impl RuleTable {
    /// Open an existing rule table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(VarnamError::NotFound(path.to_path_buf()));
        }
        let db = Database::open(path)?;

        let mut details = SchemeDetails::default();
        {
            let txn = db.begin_read()?;
            let meta = txn.open_table(METADATA).map_err(missing_table)?;
            for item in meta.iter()? {
                let (k, v) = item?;
                details.set(k.value(), v.value());
            }
            // fail early on a file without rules
            txn.open_table(SYMBOLS).map_err(missing_table)?;
        }

        Ok(Self::from_parts(db, path.to_path_buf(), details))
    }

    /// Write a rule table at `path`, replacing any existing file.
    ///
    /// Symbol ids are assigned in slice order starting from 1, so the order of
    /// `symbols` is the tie-break among otherwise equal rules.
    pub fn create<P: AsRef<Path>>(
        path: P,
        details: &SchemeDetails,
        symbols: &[Symbol],
    ) -> Result<Self> {
        let path = path.as_ref();
        for symbol in symbols {
            validate(symbol)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(SYMBOLS)?;
            let mut by_pattern = txn.open_multimap_table(PATTERN_INDEX)?;
            let mut by_value = txn.open_multimap_table(VALUE_INDEX)?;
            let mut meta = txn.open_table(METADATA)?;

            for (index, symbol) in symbols.iter().enumerate() {
                let mut symbol = symbol.clone();
                symbol.id = index as u32 + 1;
                let bytes = bincode::serialize(&symbol)?;
                table.insert(symbol.id, bytes.as_slice())?;
                by_pattern.insert(symbol.pattern.as_str(), symbol.id)?;
                by_value.insert(symbol.value1.as_str(), symbol.id)?;
                if !symbol.value2.is_empty() && symbol.value2 != symbol.value1 {
                    by_value.insert(symbol.value2.as_str(), symbol.id)?;
                }
            }
            for (key, value) in details.entries() {
                meta.insert(key, value.as_str())?;
            }
        }
        txn.commit()?;

        tracing::debug!(path = %path.display(), symbols = symbols.len(), "rule table written");
        Ok(Self::from_parts(db, path.to_path_buf(), details.clone()))
    }

    fn from_parts(db: Database, path: PathBuf, details: SchemeDetails) -> Self {
        let capacity = NonZeroUsize::new(LOOKUP_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            db,
            path,
            details,
            pattern_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn details(&self) -> &SchemeDetails {
        &self.details
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rules whose pattern is exactly `pattern`, best first. Rules with negative
    /// priority are never returned.
    pub fn lookup_pattern(&self, pattern: &str, filter: MatchFilter) -> Result<Vec<Symbol>> {
        let key = (pattern.to_string(), filter);
        if let Ok(mut cache) = self.pattern_cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let symbols = self.lookup_index(PATTERN_INDEX, pattern, filter)?;
        if let Ok(mut cache) = self.pattern_cache.lock() {
            cache.put(key, symbols.clone());
        }
        Ok(symbols)
    }

    /// Rules rendering to `value` through value1 or value2, best first.
    pub fn lookup_value(&self, value: &str) -> Result<Vec<Symbol>> {
        self.lookup_index(VALUE_INDEX, value, MatchFilter::All)
    }

    fn lookup_index(
        &self,
        index: MultimapTableDefinition<'static, &'static str, u32>,
        key: &str,
        filter: MatchFilter,
    ) -> Result<Vec<Symbol>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_multimap_table(index)?;
        let table = txn.open_table(SYMBOLS)?;

        let mut out = Vec::new();
        for id in index.get(key)? {
            let id = id?.value();
            if let Some(bytes) = table.get(id)? {
                let symbol: Symbol = bincode::deserialize(bytes.value())?;
                if symbol.priority >= 0 && filter.admits(symbol.match_type) {
                    out.push(symbol);
                }
            }
        }
        out.sort_by(Symbol::lookup_order);
        Ok(out)
    }

    /// Rendered virama of the scheme (the value of pattern `~`), empty if undefined.
    pub fn virama(&self) -> Result<String> {
        Ok(self
            .lookup_pattern("~", MatchFilter::All)?
            .into_iter()
            .find(|s| s.kind == SymbolKind::Virama)
            .map(|s| s.value1)
            .unwrap_or_default())
    }

    /// Full scan filtered by `query`, in id order.
    pub(crate) fn search(
        &self,
        query: &SymbolQuery,
        cancel: &CancellationToken,
    ) -> SearchResult<Vec<Symbol>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SYMBOLS)?;

        let mut out = Vec::new();
        for (n, item) in table.iter()?.enumerate() {
            if n % SEARCH_CHECK_INTERVAL == 0 {
                cancel.checkpoint()?;
            }
            let (_, bytes) = item?;
            let symbol: Symbol = bincode::deserialize(bytes.value())?;
            if query.matches(&symbol) {
                out.push(symbol);
            }
        }
        Ok(out)
    }
}

fn validate(symbol: &Symbol) -> Result<()> {
    if symbol.pattern.is_empty() {
        return Err(VarnamError::InvalidRuleTable(format!(
            "empty pattern for value {:?}",
            symbol.value1
        )));
    }
    let fields = [
        &symbol.pattern,
        &symbol.value1,
        &symbol.value2,
        &symbol.value3,
        &symbol.tag,
    ];
    if let Some(long) = fields
        .iter()
        .find(|f| f.chars().count() > MAX_SYMBOL_LENGTH)
    {
        return Err(VarnamError::InvalidRuleTable(format!(
            "{long:?} exceeds {MAX_SYMBOL_LENGTH} characters"
        )));
    }
    Ok(())
}

fn missing_table(e: TableError) -> VarnamError {
    match e {
        TableError::TableDoesNotExist(name) => {
            VarnamError::InvalidRuleTable(format!("missing table {name}"))
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind::*;
    use crate::symbol::Symbol;

    fn sample() -> Vec<Symbol> {
        vec![
            Symbol::new(Consonant, "la", "ല"),
            Symbol::new(Consonant, "la", "ള").possibility(1),
            Symbol::new(ConsonantVowel, "la", "ലാ").possibility(1),
            Symbol::new(Consonant, "La", "ള"),
            Symbol::new(Virama, "~", "\u{0D4D}"),
            Symbol::new(Other, "x", "hidden").with_priority(-1),
        ]
    }

    fn details() -> SchemeDetails {
        SchemeDetails {
            identifier: "ml-test".into(),
            lang_code: "ml".into(),
            display_name: "Malayalam".into(),
            author: "tests".into(),
            compiled_date: "2024-01-01".into(),
            is_stable: true,
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuleTable::open(dir.path().join("nope.vst")).unwrap_err();
        assert!(matches!(err, VarnamError::NotFound(_)));
    }

    #[test]
    fn pattern_lookup_orders_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let table = RuleTable::create(dir.path().join("t.vst"), &details(), &sample()).unwrap();

        let all = table.lookup_pattern("la", MatchFilter::All).unwrap();
        let values: Vec<_> = all.iter().map(|s| s.value1.as_str()).collect();
        assert_eq!(values, vec!["ല", "ള", "ലാ"]);

        let exact = table.lookup_pattern("la", MatchFilter::Exact).unwrap();
        assert_eq!(exact.len(), 1);
        // second call is served from the cache
        assert_eq!(table.lookup_pattern("la", MatchFilter::Exact).unwrap(), exact);

        assert!(table.lookup_pattern("x", MatchFilter::All).unwrap().is_empty());
        assert!(table.lookup_pattern("l", MatchFilter::All).unwrap().is_empty());
    }

    #[test]
    fn reopen_keeps_rules_and_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.vst");
        drop(RuleTable::create(&path, &details(), &sample()).unwrap());

        let table = RuleTable::open(&path).unwrap();
        assert_eq!(table.details(), &details());
        assert_eq!(table.virama().unwrap(), "\u{0D4D}");
        let by_value = table.lookup_value("ള").unwrap();
        let patterns: Vec<_> = by_value.iter().map(|s| s.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["La", "la"]);
    }

    #[test]
    fn search_with_like_criteria() {
        let dir = tempfile::tempdir().unwrap();
        let table = RuleTable::create(dir.path().join("t.vst"), &details(), &sample()).unwrap();
        let query = SymbolQuery {
            value1: Some(TextFilter::Like("ള%".into())),
            ..Default::default()
        };
        let found = table.search(&query, &CancellationToken::new()).ok().unwrap();
        assert_eq!(found.len(), 2);

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(table.search(&SymbolQuery::default(), &cancelled).is_err());
    }

    #[test]
    fn oversized_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let long = "a".repeat(MAX_SYMBOL_LENGTH + 1);
        let err = RuleTable::create(
            dir.path().join("t.vst"),
            &details(),
            &[Symbol::new(Vowel, &long, "അ")],
        )
        .unwrap_err();
        assert!(matches!(err, VarnamError::InvalidRuleTable(_)));
    }

    #[test]
    fn like_wildcards() {
        assert!(like_match("%", ""));
        assert!(like_match("k%a", "kna"));
        assert!(like_match("k_a", "kha"));
        assert!(!like_match("k_a", "ka"));
        assert!(like_match("%la", "mala"));
        assert!(!like_match("la%", "mala"));
    }
}
