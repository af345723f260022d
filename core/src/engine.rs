// core/src/engine.rs
//
// Transliteration engine: owns one rule table and one learnings dictionary and
// coordinates the three searches of every request.
//
// A request tokenizes the input once, then runs the token-driven dictionary
// search, the pattern-driven dictionary search and the plain expansion on
// scoped worker threads. Each worker reports over its own channel; the
// coordinator polls those channels together with the request's cancellation
// token and merges the results.

use std::io::{BufRead, Read, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::cancel::{into_outcome, CancellationToken, Outcome, SearchError, SearchResult};
use crate::dictionary::{Dictionary, Learnings};
use crate::error::{Result, VarnamError};
use crate::expander::Expander;
use crate::lang::LangRules;
use crate::learner::{LearnEntry, LearnStatus, Learner};
use crate::rule_table::{RuleTable, SchemeDetails, SymbolQuery};
use crate::search::{DictionarySuggestions, PatternSuggestions, SearchSources, Searcher};
use crate::symbol::{
    dedup_suggestions, sort_suggestions, MatchFilter, Suggestion, Symbol, SymbolKind, Token,
};
use crate::tokenizer::Tokenizer;
use crate::Config;

/// Rewrites a word matched by a partial pattern before its tail is appended.
pub type WordPartializer = Arc<dyn Fn(&mut Suggestion) + Send + Sync>;

/// Scheme specific cleanup applied to every word before it is learned.
pub type WordSanitizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Greedy words shorter than this many characters lead the flattened list.
const SHORT_GREEDY_CHARS: usize = 3;

/// Search that failed while the rest of a request completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchSource {
    Dictionary,
    PatternDictionary,
}

/// Ranked candidates for one input word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransliterationResult {
    /// Learned words that match the whole input.
    pub exact_matches: Vec<Suggestion>,
    /// Completions of dictionary words reached through the token walk.
    pub dictionary_suggestions: Vec<Suggestion>,
    /// Words reached through learned keystroke patterns.
    pub pattern_dictionary_suggestions: Vec<Suggestion>,
    /// Full rule expansion, present when nothing matched exactly or when
    /// `Config::tokenizer_suggestions_always` is set.
    pub tokenizer_suggestions: Vec<Suggestion>,
    /// Expansion using only exact rules. Always present.
    pub greedy_tokenized: Vec<Suggestion>,
    /// Dictionary searches that failed for this request.
    pub failures: Vec<SearchSource>,
}

impl TransliterationResult {
    /// One list for display, without repeated words.
    ///
    /// Dictionary results are exact matches, then pattern and dictionary
    /// suggestions. A short greedy word goes first, ahead of the dictionary
    /// results. Otherwise the greedy words follow the best dictionary result.
    /// Tokenizer suggestions close the list.
    pub fn flatten(&self) -> Vec<Suggestion> {
        let dictionary = self
            .exact_matches
            .iter()
            .chain(&self.pattern_dictionary_suggestions)
            .chain(&self.dictionary_suggestions);

        let short_greedy = self
            .greedy_tokenized
            .first()
            .is_some_and(|s| s.word.chars().count() < SHORT_GREEDY_CHARS);

        let mut out: Vec<Suggestion> = Vec::new();
        if short_greedy {
            out.extend(self.greedy_tokenized.iter().cloned());
            out.extend(dictionary.cloned());
        } else {
            let mut dictionary = dictionary.cloned();
            out.extend(dictionary.next());
            out.extend(self.greedy_tokenized.iter().cloned());
            out.extend(dictionary);
        }
        out.extend(self.tokenizer_suggestions.iter().cloned());
        dedup_suggestions(&mut out);
        out
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Dispatched,
    Awaiting,
    Merging,
    Done,
    Cancelled,
}

impl RequestState {
    fn allows(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Dispatched, Awaiting)
                | (Awaiting, Merging)
                | (Merging, Done)
                | (Dispatched | Awaiting, Cancelled)
        )
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(self.allows(next), "{self:?} -> {next:?}");
        tracing::trace!(from = ?*self, to = ?next, "request state");
        *self = next;
    }
}

/// What the coordinator got from one worker.
enum Received<T> {
    Value(SearchResult<T>),
    Cancelled,
    /// The worker dropped its sender without reporting.
    Lost,
}

fn await_worker<T>(
    rx: &Receiver<SearchResult<T>>,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Received<T> {
    loop {
        if cancel.is_cancelled() {
            return Received::Cancelled;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            cancel.cancel();
            return Received::Cancelled;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(result) => return Received::Value(result),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Received::Lost,
        }
    }
}

/// Resolve an optional source. `None` means the request was cancelled.
fn settle<T: Default>(
    received: Received<T>,
    source: SearchSource,
    failures: &mut Vec<SearchSource>,
) -> Option<T> {
    match received {
        Received::Value(Ok(value)) => Some(value),
        Received::Value(Err(SearchError::Cancelled)) | Received::Cancelled => None,
        Received::Value(Err(SearchError::Failed(e))) => {
            tracing::warn!(?source, error = %e, "search failed, continuing without it");
            failures.push(source);
            Some(T::default())
        }
        Received::Lost => {
            tracing::warn!(?source, "search worker panicked, continuing without it");
            failures.push(source);
            Some(T::default())
        }
    }
}

fn ranked(mut suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
    sort_suggestions(&mut suggestions);
    dedup_suggestions(&mut suggestions);
    suggestions
}

fn merge(
    dict: DictionarySuggestions,
    pattern: PatternSuggestions,
    greedy: Vec<Suggestion>,
    expanded: Vec<Suggestion>,
    config: &Config,
) -> TransliterationResult {
    let mut exact = dict.exact_words;
    exact.extend(pattern.exact_words);
    for m in dict.exact_matches {
        if !exact.iter().any(|e| e.word == m.word) {
            exact.push(m);
        }
    }
    let exact_matches = ranked(exact);

    let tokenizer_suggestions =
        if exact_matches.is_empty() || config.tokenizer_suggestions_always {
            ranked(expanded)
        } else {
            Vec::new()
        };

    TransliterationResult {
        exact_matches,
        dictionary_suggestions: ranked(dict.suggestions),
        pattern_dictionary_suggestions: ranked(pattern.suggestions),
        tokenizer_suggestions,
        greedy_tokenized: ranked(greedy),
        failures: Vec::new(),
    }
}

struct Inner {
    table: RuleTable,
    dict: Dictionary,
    lang: LangRules,
    config: RwLock<Config>,
    partializers: RwLock<Vec<WordPartializer>>,
    sanitizers: RwLock<Vec<WordSanitizer>>,
    cache: Mutex<LruCache<String, TransliterationResult>>,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    /// Bumped on every cache clear. A result computed across a clear is
    /// not cached.
    cache_generation: AtomicU64,
}

/// Handle to a transliteration engine. Clones share the same stores.
#[derive(Clone)]
pub struct Varnam {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Varnam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Varnam")
            .field("table", &self.inner.table)
            .field("dict", &self.inner.dict)
            .finish()
    }
}

fn cache_capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

impl Varnam {
    /// Open the rule table at `rule_table` and the learnings at `dictionary`,
    /// creating the latter if needed.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(rule_table: P, dictionary: Q) -> Result<Self> {
        Self::open_with_config(rule_table, dictionary, Config::default())
    }

    pub fn open_with_config<P: AsRef<Path>, Q: AsRef<Path>>(
        rule_table: P,
        dictionary: Q,
        config: Config,
    ) -> Result<Self> {
        let table = RuleTable::open(rule_table)?;
        let dict = Dictionary::open(dictionary)?;
        let lang = LangRules::new(&table.details().lang_code, &table.virama()?);
        tracing::debug!(
            scheme = %table.details().identifier,
            lang = %lang.lang_code,
            "engine opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                cache: Mutex::new(LruCache::new(cache_capacity(config.max_cache_size))),
                table,
                dict,
                lang,
                config: RwLock::new(config),
                partializers: RwLock::new(Vec::new()),
                sanitizers: RwLock::new(Vec::new()),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn scheme_details(&self) -> &SchemeDetails {
        self.inner.table.details()
    }

    pub fn rule_table(&self) -> &RuleTable {
        &self.inner.table
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.inner.dict
    }

    /// Language rules as currently configured.
    pub fn lang_rules(&self) -> LangRules {
        let indic_digits = self.config().indic_digits;
        self.inner.lang.clone().with_indic_digits(indic_digits)
    }

    // ========== Transliteration ==========

    /// Transliterate `word` to completion.
    pub fn transliterate(&self, word: &str) -> Result<TransliterationResult> {
        match self.run(word, &CancellationToken::new(), None)? {
            Outcome::Completed(result) => Ok(result),
            // a fresh token is only cancelled by a deadline, and there is none
            Outcome::Cancelled => Ok(TransliterationResult::default()),
        }
    }

    /// Transliterate `word`, giving up when `cancel` fires.
    pub fn transliterate_with(
        &self,
        word: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome<TransliterationResult>> {
        self.run(word, cancel, None)
    }

    /// Transliterate `word`, giving up once `timeout` has elapsed.
    pub fn transliterate_with_timeout(
        &self,
        word: &str,
        timeout: Duration,
    ) -> Result<Outcome<TransliterationResult>> {
        self.run(word, &CancellationToken::new(), Some(Instant::now() + timeout))
    }

    /// Start transliterating `word` on a background thread.
    pub fn spawn_transliteration(&self, word: &str) -> TransliterationHandle {
        let cancel = CancellationToken::new();
        let engine = self.clone();
        let worker_cancel = cancel.clone();
        let word = word.to_string();
        let join = thread::spawn(move || engine.transliterate_with(&word, &worker_cancel));
        TransliterationHandle { cancel, join }
    }

    fn run(
        &self,
        word: &str,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Outcome<TransliterationResult>> {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if word.is_empty() {
            return Ok(Outcome::Completed(TransliterationResult::default()));
        }
        let generation = self.inner.cache_generation.load(Ordering::Acquire);
        if let Some(hit) = self.cached(word) {
            return Ok(Outcome::Completed(hit));
        }

        let started = Instant::now();
        let config = self.config();
        let partializers = self
            .inner
            .partializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let lang = self.inner.lang.clone().with_indic_digits(config.indic_digits);

        let tokens =
            Tokenizer::new(&self.inner.table, &lang).tokenize(word, MatchFilter::All, false)?;
        if config.debug {
            tracing::trace!(word, ?tokens, "tokenized");
        }

        let searcher = Searcher {
            table: &self.inner.table,
            dict: &self.inner.dict,
            lang: &lang,
            config: &config,
            partializers: &partializers,
            cancel,
        };

        let outcome = coordinate(&searcher, word, &tokens, deadline)?;
        if let Outcome::Completed(result) = &outcome {
            tracing::debug!(
                word,
                elapsed_us = started.elapsed().as_micros() as u64,
                exact = result.exact_matches.len(),
                dictionary = result.dictionary_suggestions.len(),
                pattern = result.pattern_dictionary_suggestions.len(),
                tokenizer = result.tokenizer_suggestions.len(),
                "transliterated"
            );
            if !result.is_degraded() {
                self.remember(word, result, generation);
            }
        } else {
            tracing::debug!(word, "transliteration cancelled");
        }
        Ok(outcome)
    }

    /// Script text back to keystrokes, best first.
    pub fn reverse_transliterate(&self, word: &str) -> Result<Vec<Suggestion>> {
        let lang = self.lang_rules();
        let tokens = Tokenizer::new(&self.inner.table, &lang).tokenize_script(word)?;

        let reversed: Vec<Token> = tokens
            .into_iter()
            .map(|token| match token {
                Token::Symbol {
                    symbols,
                    pattern,
                    position,
                } => Token::Symbol {
                    symbols: symbols.into_iter().map(pattern_as_value).collect(),
                    pattern,
                    position,
                },
                other => other,
            })
            .collect();

        let limit = self.config().tokenizer_suggestions_limit;
        let mut out = Expander::new(&lang).expand_limited(&reversed, false, false, limit);
        sort_suggestions(&mut out);
        dedup_suggestions(&mut out);
        Ok(out)
    }

    /// Rules matching `query`, in id order.
    pub fn search_rule_table(
        &self,
        query: &SymbolQuery,
        cancel: &CancellationToken,
    ) -> Result<Outcome<Vec<Symbol>>> {
        into_outcome(self.inner.table.search(query, cancel))
    }

    // ========== Learning ==========

    fn with_learner<T>(&self, f: impl FnOnce(&Learner<'_>) -> Result<T>) -> Result<T> {
        let lang = self.lang_rules();
        let sanitizers = self
            .inner
            .sanitizers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let learner = Learner::new(
            Tokenizer::new(&self.inner.table, &lang),
            &self.inner.dict,
            &sanitizers,
        );
        let out = f(&learner);
        if out.is_ok() {
            self.clear_cache();
        }
        out
    }

    pub fn learn(&self, word: &str) -> Result<()> {
        self.with_learner(|l| l.learn(word))
    }

    pub fn learn_with_confidence(&self, word: &str, confidence: i32) -> Result<()> {
        self.with_learner(|l| l.learn_with_confidence(word, confidence))
    }

    pub fn train(&self, pattern: &str, word: &str) -> Result<()> {
        self.with_learner(|l| l.train(pattern, word))
    }

    pub fn unlearn(&self, word: &str) -> Result<()> {
        self.with_learner(|l| l.unlearn(word))
    }

    pub fn learn_many(&self, entries: &[LearnEntry]) -> Result<LearnStatus> {
        self.with_learner(|l| l.learn_many(entries))
    }

    pub fn learn_from_reader<R: BufRead>(&self, reader: R) -> Result<LearnStatus> {
        self.with_learner(|l| l.learn_from_reader(reader))
    }

    pub fn train_from_reader<R: BufRead>(&self, reader: R) -> Result<LearnStatus> {
        self.with_learner(|l| l.train_from_reader(reader))
    }

    /// Write all learnings as JSON.
    pub fn export_learnings<W: Write>(&self, writer: W) -> Result<()> {
        let learnings = self.inner.dict.export()?;
        serde_json::to_writer_pretty(writer, &learnings)?;
        Ok(())
    }

    /// Merge learnings previously written by `export_learnings`.
    pub fn import_learnings<R: Read>(&self, reader: R) -> Result<()> {
        let learnings: Learnings = serde_json::from_reader(reader)?;
        self.inner.dict.import(&learnings)?;
        tracing::debug!(
            words = learnings.words.len(),
            patterns = learnings.patterns.len(),
            "imported learnings"
        );
        self.clear_cache();
        Ok(())
    }

    pub fn recently_learned(&self, offset: usize, limit: usize) -> Result<Vec<Suggestion>> {
        self.inner.dict.recently_learned(offset, limit)
    }

    /// Learned words that extend the script prefix `word`.
    pub fn suggestions(&self, word: &str) -> Result<Vec<Suggestion>> {
        let word = crate::utils::sanitize_word(word);
        let limit = self.config().dictionary_suggestions_limit;
        self.inner.dict.search_by_prefixes(&[word], true, limit)
    }

    // ========== Scheme Hooks ==========

    pub fn register_pattern_word_partializer(&self, partializer: WordPartializer) {
        self.inner
            .partializers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(partializer);
        self.clear_cache();
    }

    pub fn register_word_sanitizer(&self, sanitizer: WordSanitizer) {
        self.inner
            .sanitizers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sanitizer);
    }

    // ========== Configuration ==========

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_config(&self, config: Config) {
        self.update_config(|c| *c = config);
    }

    fn update_config(&self, f: impl FnOnce(&mut Config)) {
        let capacity = {
            let mut config = self
                .inner
                .config
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            f(&mut config);
            config.max_cache_size
        };
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(cache_capacity(capacity));
        self.clear_cache();
    }

    pub fn set_dictionary_suggestions_limit(&self, limit: usize) {
        self.update_config(|c| c.dictionary_suggestions_limit = limit);
    }

    pub fn set_pattern_dictionary_suggestions_limit(&self, limit: usize) {
        self.update_config(|c| c.pattern_dictionary_suggestions_limit = limit);
    }

    pub fn set_tokenizer_suggestions_limit(&self, limit: usize) {
        self.update_config(|c| c.tokenizer_suggestions_limit = limit);
    }

    pub fn set_tokenizer_suggestions_always(&self, always: bool) {
        self.update_config(|c| c.tokenizer_suggestions_always = always);
    }

    pub fn set_dictionary_match_exact(&self, exact: bool) {
        self.update_config(|c| c.dictionary_match_exact = exact);
    }

    pub fn set_indic_digits(&self, enabled: bool) {
        self.update_config(|c| c.indic_digits = enabled);
    }

    pub fn set_debug(&self, enabled: bool) {
        self.update_config(|c| c.debug = enabled);
    }

    // ========== Result Cache ==========

    fn cached(&self, word: &str) -> Option<TransliterationResult> {
        let hit = self
            .inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(word)
            .cloned();
        let counter = if hit.is_some() {
            &self.inner.cache_hits
        } else {
            &self.inner.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Cache `result` unless the cache was cleared since `generation` was read.
    fn remember(&self, word: &str, result: &TransliterationResult, generation: u64) {
        let mut cache = self
            .inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.cache_generation.load(Ordering::Acquire) == generation {
            cache.put(word.to_string(), result.clone());
        } else {
            tracing::trace!(word, "cache cleared during request, not caching");
        }
    }

    /// Returns (hits, misses).
    pub fn cache_stats(&self) -> (usize, usize) {
        (
            self.inner.cache_hits.load(Ordering::Relaxed),
            self.inner.cache_misses.load(Ordering::Relaxed),
        )
    }

    /// Hit rate as a percentage, `None` before the first lookup.
    pub fn cache_hit_rate(&self) -> Option<f32> {
        let (hits, misses) = self.cache_stats();
        let total = hits + misses;
        (total > 0).then(|| hits as f32 / total as f32 * 100.0)
    }

    pub fn cache_size(&self) -> usize {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop cached results and reset the statistics. Requests already in
    /// flight will not cache their results.
    pub fn clear_cache(&self) {
        let mut cache = self
            .inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache.clear();
        self.inner.cache_generation.fetch_add(1, Ordering::AcqRel);
        drop(cache);
        self.inner.cache_hits.store(0, Ordering::Relaxed);
        self.inner.cache_misses.store(0, Ordering::Relaxed);
    }
}

/// Swap a rule around so that expanding it renders its pattern.
fn pattern_as_value(mut symbol: Symbol) -> Symbol {
    symbol.value1 = std::mem::take(&mut symbol.pattern);
    symbol.pattern = symbol.value1.clone();
    symbol.value2.clear();
    symbol.tag.clear();
    if symbol.kind == SymbolKind::Virama {
        symbol.kind = SymbolKind::Other;
    }
    symbol
}

/// Run the three searches of one request and merge them.
///
/// Every search polls the request's cancellation token, so once the
/// coordinator gives up the scoped workers wind down at their next check.
fn coordinate<S: SearchSources>(
    sources: &S,
    word: &str,
    tokens: &[Token],
    deadline: Option<Instant>,
) -> Result<Outcome<TransliterationResult>> {
    let cancel = sources.cancel();
    let limit = sources.config().tokenizer_suggestions_limit;
    let mut state = RequestState::Dispatched;

    let (dict_tx, dict_rx) = mpsc::sync_channel(1);
    let (pattern_tx, pattern_rx) = mpsc::sync_channel(1);
    let (tokens_tx, tokens_rx) = mpsc::sync_channel(1);

    let (dict, pattern, expanded) = thread::scope(|s| {
        let workers = [
            s.spawn(move || {
                let _ = dict_tx.send(sources.search_dictionary(word, tokens));
            }),
            s.spawn(move || {
                let _ = pattern_tx.send(sources.search_pattern_dictionary(word));
            }),
            s.spawn(move || {
                let result = sources.search_greedy(tokens, limit.max(1)).and_then(|greedy| {
                    Ok((greedy, sources.search_tokenizer(tokens, limit)?))
                });
                let _ = tokens_tx.send(result);
            }),
        ];

        state.advance(RequestState::Awaiting);
        let received = (
            await_worker(&dict_rx, cancel, deadline),
            await_worker(&pattern_rx, cancel, deadline),
            await_worker(&tokens_rx, cancel, deadline),
        );
        for worker in workers {
            // a panic surfaces as a lost channel
            let _ = worker.join();
        }
        received
    });

    let mut failures = Vec::new();
    let dict = settle(dict, SearchSource::Dictionary, &mut failures);
    let pattern = settle(pattern, SearchSource::PatternDictionary, &mut failures);
    let expanded = match expanded {
        Received::Value(Ok(value)) => Some(value),
        Received::Value(Err(SearchError::Cancelled)) | Received::Cancelled => None,
        Received::Value(Err(SearchError::Failed(e))) => return Err(e),
        Received::Lost => return Err(VarnamError::TaskPanicked),
    };

    let (Some(dict), Some(pattern), Some((greedy, expanded))) = (dict, pattern, expanded) else {
        state.advance(RequestState::Cancelled);
        return Ok(Outcome::Cancelled);
    };

    state.advance(RequestState::Merging);
    let mut result = merge(dict, pattern, greedy, expanded, sources.config());
    result.failures = failures;
    state.advance(RequestState::Done);
    Ok(Outcome::Completed(result))
}

/// A transliteration running on its own thread.
pub struct TransliterationHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<Outcome<TransliterationResult>>>,
}

impl TransliterationHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the request completes or observes its cancellation.
    pub fn wait(self) -> Result<Outcome<TransliterationResult>> {
        self.join.join().map_err(|_| VarnamError::TaskPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_table::TextFilter;
    use crate::testutil;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc::Sender;
    use tempfile::TempDir;

    fn engine() -> (TempDir, Varnam) {
        let (dir, table) = testutil::rule_table();
        let path = table.path().to_path_buf();
        drop(table);
        let varnam = Varnam::open(&path, dir.path().join("ml.learnings")).unwrap();
        (dir, varnam)
    }

    fn words(list: &[Suggestion]) -> Vec<&str> {
        list.iter().map(|s| s.word.as_str()).collect()
    }

    fn suggestions(list: &[&str]) -> Vec<Suggestion> {
        list.iter().map(|w| Suggestion::new(*w, 10)).collect()
    }

    /// Partializer that blocks the first pattern search reaching it until
    /// something is sent on the returned sender.
    fn parking_partializer() -> (WordPartializer, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let parked = AtomicBool::new(false);
        let partializer: WordPartializer = Arc::new(move |_: &mut Suggestion| {
            if !parked.swap(true, Ordering::SeqCst) {
                let _ = entered_tx.lock().unwrap().send(());
                let _ = release_rx.lock().unwrap().recv();
            }
        });
        (partializer, entered_rx, release_tx)
    }

    /// Engine whose "mala" requests stop inside the pattern search.
    fn parked_engine() -> (TempDir, Varnam, Receiver<()>, Sender<()>) {
        let (dir, varnam) = engine();
        varnam.train("ma", "മ").unwrap();
        let (partializer, entered, release) = parking_partializer();
        varnam.register_pattern_word_partializer(partializer);
        (dir, varnam, entered, release)
    }

    /// Real searches, except the ones switched to fail.
    struct Faulty<'a> {
        inner: Searcher<'a>,
        dictionary: bool,
        pattern_panics: bool,
        tokenizer: bool,
    }

    impl SearchSources for Faulty<'_> {
        fn cancel(&self) -> &CancellationToken {
            self.inner.cancel
        }

        fn config(&self) -> &Config {
            self.inner.config
        }

        fn search_dictionary(
            &self,
            word: &str,
            tokens: &[Token],
        ) -> SearchResult<DictionarySuggestions> {
            if self.dictionary {
                return Err(VarnamError::Timeout(Duration::from_millis(1)).into());
            }
            self.inner.search_dictionary(word, tokens)
        }

        fn search_pattern_dictionary(&self, word: &str) -> SearchResult<PatternSuggestions> {
            if self.pattern_panics {
                panic!("pattern search blew up");
            }
            self.inner.search_pattern_dictionary(word)
        }

        fn search_greedy(&self, tokens: &[Token], limit: usize) -> SearchResult<Vec<Suggestion>> {
            self.inner.search_greedy(tokens, limit)
        }

        fn search_tokenizer(
            &self,
            tokens: &[Token],
            limit: usize,
        ) -> SearchResult<Vec<Suggestion>> {
            if self.tokenizer {
                return Err(VarnamError::TaskPanicked.into());
            }
            self.inner.search_tokenizer(tokens, limit)
        }
    }

    fn coordinate_faulty(
        varnam: &Varnam,
        word: &str,
        faults: (bool, bool, bool),
    ) -> Result<Outcome<TransliterationResult>> {
        let config = varnam.config();
        let lang = varnam.lang_rules();
        let cancel = CancellationToken::new();
        let tokens = Tokenizer::new(&varnam.inner.table, &lang)
            .tokenize(word, MatchFilter::All, false)
            .unwrap();
        let sources = Faulty {
            inner: Searcher {
                table: &varnam.inner.table,
                dict: &varnam.inner.dict,
                lang: &lang,
                config: &config,
                partializers: &[],
                cancel: &cancel,
            },
            dictionary: faults.0,
            pattern_panics: faults.1,
            tokenizer: faults.2,
        };
        coordinate(&sources, word, &tokens, None)
    }

    #[test]
    fn request_states() {
        use RequestState::*;
        assert!(Dispatched.allows(Awaiting));
        assert!(Awaiting.allows(Cancelled));
        assert!(!Merging.allows(Cancelled));
        assert!(!Done.allows(Awaiting));
    }

    #[test]
    fn missing_rule_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Varnam::open(dir.path().join("nope.vst"), dir.path().join("d")).unwrap_err();
        assert!(matches!(err, VarnamError::NotFound(_)));
    }

    #[test]
    fn unlearned_input_uses_rules_only() {
        let (_dir, varnam) = engine();
        let result = varnam.transliterate("mala").unwrap();
        assert!(result.exact_matches.is_empty());
        assert_eq!(words(&result.greedy_tokenized), vec!["മല"]);
        assert_eq!(
            words(&result.tokenizer_suggestions),
            vec!["മല", "മാല", "മള", "മലാ", "മളാ", "മാള", "മാലാ", "മാളാ"]
        );
        assert_eq!(result.flatten()[0].word, "മല");
    }

    #[test]
    fn learned_word_is_an_exact_match() {
        let (_dir, varnam) = engine();
        varnam.learn("മലയാളം").unwrap();
        let result = varnam.transliterate("malayalam").unwrap();
        assert_eq!(result.exact_matches[0].word, "മലയാളം");
        assert_eq!(result.exact_matches[0].weight, 30);

        varnam.learn("മലയാളം").unwrap();
        let result = varnam.transliterate("malayalam").unwrap();
        assert_eq!(result.exact_matches[0].weight, 31);
    }

    #[test]
    fn tokenizer_suggestions_only_on_demand() {
        let (_dir, varnam) = engine();
        varnam.learn("മല").unwrap();
        varnam.set_tokenizer_suggestions_always(false);
        let result = varnam.transliterate("mala").unwrap();
        assert_eq!(result.exact_matches[0].word, "മല");
        assert!(result.tokenizer_suggestions.is_empty());
        assert!(!result.greedy_tokenized.is_empty());
    }

    #[test]
    fn trained_pattern_completes_longer_input() {
        let (_dir, varnam) = engine();
        varnam.train("india", "ഇന്ത്യ").unwrap();

        let result = varnam.transliterate("india").unwrap();
        assert_eq!(result.exact_matches[0].word, "ഇന്ത്യ");

        let result = varnam.transliterate("indiayil").unwrap();
        assert_eq!(result.pattern_dictionary_suggestions[0].word, "ഇന്ത്യയിൽ");
    }

    #[test]
    fn cancelled_before_start() {
        let (_dir, varnam) = engine();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = varnam.transliterate_with("mala", &token).unwrap();
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_cancels() {
        let (_dir, varnam) = engine();
        let outcome = varnam
            .transliterate_with_timeout("mala", Duration::ZERO)
            .unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[test]
    fn spawned_request_completes() {
        let (_dir, varnam) = engine();
        let handle = varnam.spawn_transliteration("mala");
        let result = handle.wait().unwrap().completed().unwrap();
        assert_eq!(result.greedy_tokenized[0].word, "മല");
    }

    #[test]
    fn repeated_requests_hit_the_cache() {
        let (_dir, varnam) = engine();
        varnam.transliterate("mala").unwrap();
        varnam.transliterate("mala").unwrap();
        assert_eq!(varnam.cache_stats(), (1, 1));
        assert_eq!(varnam.cache_size(), 1);

        varnam.learn("മല").unwrap();
        assert_eq!(varnam.cache_size(), 0);
    }

    #[test]
    fn reverse_renders_patterns() {
        let (_dir, varnam) = engine();
        let out = varnam.reverse_transliterate("മല").unwrap();
        assert_eq!(out[0].word, "mala");

        let out = varnam.reverse_transliterate("മാ").unwrap();
        assert_eq!(words(&out), vec!["maa", "ma"]);
    }

    #[test]
    fn rule_table_search_with_like() {
        let (_dir, varnam) = engine();
        let query = SymbolQuery {
            pattern: Some(TextFilter::Like("l_".into())),
            kind: Some(SymbolKind::Consonant),
            ..Default::default()
        };
        let found = varnam
            .search_rule_table(&query, &CancellationToken::new())
            .unwrap()
            .completed()
            .unwrap();
        let values: Vec<_> = found.iter().map(|s| s.value1.as_str()).collect();
        assert_eq!(values, vec!["ല", "ള"]);

        let token = CancellationToken::new();
        token.cancel();
        assert!(varnam.search_rule_table(&query, &token).unwrap().is_cancelled());
    }

    #[test]
    fn learnings_move_between_engines() {
        let (_a, source) = engine();
        source.train("mala", "മല").unwrap();
        let mut json = Vec::new();
        source.export_learnings(&mut json).unwrap();

        let (_b, target) = engine();
        target.import_learnings(json.as_slice()).unwrap();
        let result = target.transliterate("mala").unwrap();
        assert_eq!(result.exact_matches[0].word, "മല");
        assert_eq!(target.recently_learned(0, 10).unwrap().len(), 2);
    }

    #[test]
    fn prefix_suggestions() {
        let (_dir, varnam) = engine();
        varnam.learn("മലയാളം").unwrap();
        let out = varnam.suggestions("മല").unwrap();
        assert_eq!(words(&out), vec!["മലയാളം", "മലയാള", "മലയാ"]);
    }

    #[test]
    fn sanitizers_apply_on_learn() {
        let (_dir, varnam) = engine();
        varnam.register_word_sanitizer(Arc::new(|w: &str| w.replace('ള', "ല")));
        varnam.learn("മള").unwrap();
        assert!(varnam.dictionary().word_entry("മല").unwrap().is_some());
    }

    #[test]
    fn flatten_puts_short_greedy_first() {
        let result = TransliterationResult {
            exact_matches: suggestions(&["മാ"]),
            dictionary_suggestions: suggestions(&["മല"]),
            tokenizer_suggestions: suggestions(&["മ", "മാ", "മ്"]),
            greedy_tokenized: suggestions(&["മ"]),
            ..Default::default()
        };
        assert_eq!(words(&result.flatten()), vec!["മ", "മാ", "മല", "മ്"]);
    }

    #[test]
    fn flatten_puts_long_greedy_second() {
        let result = TransliterationResult {
            exact_matches: suggestions(&["മലയാളം"]),
            pattern_dictionary_suggestions: suggestions(&["മലയാളി"]),
            dictionary_suggestions: suggestions(&["മലയാളത്തിൽ"]),
            tokenizer_suggestions: suggestions(&["മലയലം", "മാലയലം"]),
            greedy_tokenized: suggestions(&["മലയലം"]),
            ..Default::default()
        };
        assert_eq!(
            words(&result.flatten()),
            vec!["മലയാളം", "മലയലം", "മലയാളി", "മലയാളത്തിൽ", "മാലയലം"]
        );

        let rules_only = TransliterationResult {
            tokenizer_suggestions: suggestions(&["മലയലം", "മാലയലം"]),
            greedy_tokenized: suggestions(&["മലയലം"]),
            ..Default::default()
        };
        assert_eq!(words(&rules_only.flatten()), vec!["മലയലം", "മാലയലം"]);
    }

    #[test]
    fn result_from_before_a_clear_is_not_cached() {
        let (_dir, varnam) = engine();
        let generation = varnam.inner.cache_generation.load(Ordering::Acquire);
        let stale = varnam.transliterate("mala").unwrap();
        varnam.clear_cache();
        varnam.remember("mala", &stale, generation);
        assert_eq!(varnam.cache_size(), 0);
    }

    #[test]
    fn learn_during_request_is_not_hidden_by_cache() {
        let (_dir, varnam, entered, release) = parked_engine();
        let handle = varnam.spawn_transliteration("mala");
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        varnam.learn("മല").unwrap();
        release.send(()).unwrap();
        assert!(!handle.wait().unwrap().is_cancelled());
        assert_eq!(varnam.cache_size(), 0);

        let result = varnam.transliterate("mala").unwrap();
        assert_eq!(result.exact_matches[0].word, "മല");
    }

    #[test]
    fn cancel_while_searching() {
        let (_dir, varnam, entered, release) = parked_engine();
        let handle = varnam.spawn_transliteration("mala");
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        handle.cancel();
        let cancelled_at = Instant::now();
        release.send(()).unwrap();
        assert_eq!(handle.wait().unwrap(), Outcome::Cancelled);
        assert!(cancelled_at.elapsed() < Duration::from_secs(2));
        assert_eq!(varnam.cache_size(), 0);
    }

    #[test]
    fn long_input_honours_deadline() {
        let (_dir, varnam) = engine();
        let word = "la".repeat(200);
        let started = Instant::now();
        let outcome = varnam
            .transliterate_with_timeout(&word, Duration::from_millis(20))
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        if let Outcome::Completed(result) = outcome {
            assert!(result.tokenizer_suggestions.len() <= 10);
        }
    }

    #[test]
    fn failing_dictionary_degrades_request() {
        let (_dir, varnam) = engine();
        let result = coordinate_faulty(&varnam, "mala", (true, false, false))
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(result.failures, vec![SearchSource::Dictionary]);
        assert!(result.is_degraded());
        assert_eq!(words(&result.greedy_tokenized), vec!["മല"]);
        assert_eq!(result.tokenizer_suggestions.len(), 8);
    }

    #[test]
    fn panicking_pattern_search_degrades_request() {
        let (_dir, varnam) = engine();
        let result = coordinate_faulty(&varnam, "mala", (false, true, false))
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(result.failures, vec![SearchSource::PatternDictionary]);
        assert_eq!(words(&result.greedy_tokenized), vec!["മല"]);
    }

    #[test]
    fn failing_tokenizer_fails_request() {
        let (_dir, varnam) = engine();
        let err = coordinate_faulty(&varnam, "mala", (false, false, true)).unwrap_err();
        assert!(matches!(err, VarnamError::TaskPanicked));
    }
}
