//! Lexicon entries and the stores that serve them by slot type.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Voice of a lexicon entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Playful,
    Witty,
    Dry,
    Wild,
    #[serde(other)]
    Other,
}

/// Article to prepend when an entry is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleRule {
    #[default]
    None,
    /// "a" or "an", decided by the first letter.
    A,
    An,
    The,
}

/// One fill candidate for a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default = "default_level")]
    pub spice: u8,
    #[serde(default = "default_level")]
    pub locality: u8,
    #[serde(default)]
    pub pluralizable: bool,
    #[serde(default)]
    pub needs_article: ArticleRule,
}

fn default_level() -> u8 {
    1
}

impl LexiconEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: BTreeSet::new(),
            tone: Tone::Neutral,
            spice: 1,
            locality: 1,
            pluralizable: false,
            needs_article: ArticleRule::None,
        }
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_spice(mut self, spice: u8) -> Self {
        self.spice = spice;
        self
    }

    pub fn with_locality(mut self, locality: u8) -> Self {
        self.locality = locality;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn pluralizable(mut self) -> Self {
        self.pluralizable = true;
        self
    }

    pub fn with_article(mut self, rule: ArticleRule) -> Self {
        self.needs_article = rule;
        self
    }
}

/// Read access to lexicon pools.
pub trait LexiconStore: Send + Sync {
    /// Entries for a slot type; empty when the type is unknown.
    fn get_entries(&self, slot_type: &str) -> &[LexiconEntry];
}

/// Lexicon held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLexicon {
    pools: HashMap<String, Vec<LexiconEntry>>,
}

impl InMemoryLexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool, replacing any existing one for the same slot type.
    pub fn with_pool(mut self, slot_type: impl Into<String>, entries: Vec<LexiconEntry>) -> Self {
        self.insert(slot_type, entries);
        self
    }

    pub fn insert(&mut self, slot_type: impl Into<String>, entries: Vec<LexiconEntry>) {
        self.pools.insert(slot_type.into(), entries);
    }

    pub fn slot_types(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Total entries across every pool.
    pub fn len(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LexiconStore for InMemoryLexicon {
    fn get_entries(&self, slot_type: &str) -> &[LexiconEntry] {
        self.pools
            .get(slot_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
