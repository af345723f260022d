//! Malayalam engine
//!
//! A thin wrapper around `libvarnam_core::Varnam` that registers the
//! Malayalam word hooks. Everything else (tokenizing, dictionary search,
//! learning, caching) lives in core and is reached through `Deref`.

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use libvarnam_core::{Config, Result, Varnam};

use crate::{rules, scheme};

pub const RULE_TABLE_FILE: &str = "ml.vst";
pub const LEARNINGS_FILE: &str = "ml.learnings";

/// Public engine for libmalayalam. Clones share the same stores.
#[derive(Clone, Debug)]
pub struct Engine {
    inner: Varnam,
}

impl Engine {
    /// Wrap an already opened engine and register the Malayalam hooks on it.
    pub fn new(varnam: Varnam) -> Self {
        varnam.register_pattern_word_partializer(Arc::new(rules::partialize));
        varnam.register_word_sanitizer(Arc::new(rules::sanitize));
        Self { inner: varnam }
    }

    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(rule_table: P, learnings: Q) -> Result<Self> {
        Ok(Self::new(Varnam::open(rule_table, learnings)?))
    }

    pub fn open_with_config<P: AsRef<Path>, Q: AsRef<Path>>(
        rule_table: P,
        learnings: Q,
        config: Config,
    ) -> Result<Self> {
        Ok(Self::new(Varnam::open_with_config(rule_table, learnings, config)?))
    }

    /// Open the engine kept in `data_dir`.
    ///
    /// Expected layout:
    ///  - ml.vst        (rule table, written on first use)
    ///  - ml.learnings  (learned words and patterns)
    pub fn from_data_dir<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let rule_table = data_dir.join(RULE_TABLE_FILE);
        if !rule_table.is_file() {
            tracing::info!(path = %rule_table.display(), "no rule table, writing one");
            // release the write handle before the engine opens the file
            drop(scheme::write_rule_table(&rule_table)?);
        }

        let config_path = data_dir.join("config.toml");
        let config = match Config::load_toml(&config_path) {
            Ok(config) => config,
            Err(e) => {
                if config_path.exists() {
                    tracing::warn!(path = %config_path.display(), error = %e, "ignoring config");
                }
                Config::default()
            }
        };

        Self::open_with_config(rule_table, data_dir.join(LEARNINGS_FILE), config)
    }

    /// The core engine this wraps.
    pub fn varnam(&self) -> &Varnam {
        &self.inner
    }
}

impl Deref for Engine {
    type Target = Varnam;

    fn deref(&self) -> &Varnam {
        &self.inner
    }
}
