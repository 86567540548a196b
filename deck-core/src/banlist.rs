//! Content moderation hooks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Decides which blueprints and lexicon texts are off the table.
pub trait Banlist: Send + Sync {
    fn is_blueprint_banned(&self, blueprint_id: &str) -> bool;

    /// `text` is compared case-insensitively.
    fn is_lexicon_item_banned(&self, slot_type: &str, text: &str) -> bool;
}

/// A curator-maintained banlist. Updates return a new list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardLabBanlist {
    banned_blueprints: BTreeSet<String>,
    /// Stored as `slot_type::lowercased text`.
    banned_lexicon_items: BTreeSet<String>,
}

impl CardLabBanlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_banned_blueprint(&self, blueprint_id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.banned_blueprints.insert(blueprint_id.into());
        next
    }

    pub fn without_banned_blueprint(&self, blueprint_id: &str) -> Self {
        let mut next = self.clone();
        next.banned_blueprints.remove(blueprint_id);
        next
    }

    pub fn with_banned_lexicon_item(&self, slot_type: &str, text: &str) -> Self {
        let mut next = self.clone();
        next.banned_lexicon_items.insert(lexicon_key(slot_type, text));
        next
    }

    pub fn without_banned_lexicon_item(&self, slot_type: &str, text: &str) -> Self {
        let mut next = self.clone();
        next.banned_lexicon_items
            .remove(&lexicon_key(slot_type, text));
        next
    }

    pub fn is_empty(&self) -> bool {
        self.banned_blueprints.is_empty() && self.banned_lexicon_items.is_empty()
    }
}

fn lexicon_key(slot_type: &str, text: &str) -> String {
    format!("{}::{}", slot_type, text.trim().to_lowercase())
}

impl Banlist for CardLabBanlist {
    fn is_blueprint_banned(&self, blueprint_id: &str) -> bool {
        self.banned_blueprints.contains(blueprint_id)
    }

    fn is_lexicon_item_banned(&self, slot_type: &str, text: &str) -> bool {
        self.banned_lexicon_items
            .contains(&lexicon_key(slot_type, text))
    }
}
