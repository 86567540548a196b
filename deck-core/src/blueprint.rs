//! Card blueprints: templates made of literal text and typed slots.
//!
//! Blueprints are usually decoded from JSON content packs, but can also be
//! written inline with the brace syntax accepted by
//! [`Blueprint::from_template`]:
//!
//! ```text
//! Most likely to {action:sketchy_action} for {reward:tiny_reward|a_an}.
//! ```
//!
//! A slot reads `{name:slot_type|transform|...}`; `{slot_type}` alone uses
//! the slot type as the name.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BlueprintError {
    #[error("Unclosed slot starting at byte {0}")]
    UnclosedSlot(usize),
    #[error("Empty slot at byte {0}")]
    EmptySlot(usize),
    #[error("Unknown transform: {0}")]
    UnknownTransform(String),
    #[error("Blueprint {blueprint} declares slot {slot} twice")]
    DuplicateSlot { blueprint: String, slot: String },
}

/// Text transforms a slot may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Upper,
    Lower,
    Title,
    Plural,
    /// Force an a/an article even if the entry does not ask for one.
    AAn,
    /// Never reuse an entry for this slot within one card.
    Unique,
}

impl Transform {
    pub fn is_case(self) -> bool {
        matches!(self, Transform::Upper | Transform::Lower | Transform::Title)
    }
}

impl FromStr for Transform {
    type Err = BlueprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upper" => Ok(Transform::Upper),
            "lower" => Ok(Transform::Lower),
            "title" => Ok(Transform::Title),
            "plural" => Ok(Transform::Plural),
            "a_an" | "article" => Ok(Transform::AAn),
            "unique" => Ok(Transform::Unique),
            other => Err(BlueprintError::UnknownTransform(other.to_string())),
        }
    }
}

/// A named, typed hole in a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRef {
    pub name: String,
    pub slot_type: String,
    #[serde(default, alias = "mods")]
    pub transforms: Vec<Transform>,
}

impl SlotRef {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            transforms: Vec::new(),
        }
    }

    pub fn has(&self, transform: Transform) -> bool {
        self.transforms.contains(&transform)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    Text { value: String },
    Slot(SlotRef),
}

impl Segment {
    pub fn text(value: impl Into<String>) -> Self {
        Segment::Text {
            value: value.into(),
        }
    }

    /// Parse brace template syntax into segments.
    pub fn parse_template(template: &str) -> Result<Vec<Segment>, BlueprintError> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::text(&rest[..open]));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or(BlueprintError::UnclosedSlot(offset + open))?;
            let body = after[..close].trim();
            if body.is_empty() {
                return Err(BlueprintError::EmptySlot(offset + open));
            }

            let mut parts = body.split('|');
            let head = parts.next().unwrap_or_default();
            let (name, slot_type) = match head.split_once(':') {
                Some((name, slot_type)) => (name.trim(), slot_type.trim()),
                None => (head.trim(), head.trim()),
            };
            if name.is_empty() || slot_type.is_empty() {
                return Err(BlueprintError::EmptySlot(offset + open));
            }
            let transforms = parts
                .map(str::parse)
                .collect::<Result<Vec<Transform>, _>>()?;

            segments.push(Segment::Slot(SlotRef {
                name: name.to_string(),
                slot_type: slot_type.to_string(),
                transforms,
            }));

            let consumed = open + 1 + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::text(rest));
        }
        Ok(segments)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub max_words: usize,
    /// Every slot must draw a different entry.
    pub distinct_slots: bool,
    pub min_players: usize,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_words: 28,
            distinct_slots: false,
            min_players: 0,
        }
    }
}

/// Where an option value comes from: a filled slot, a lexicon pool, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionSource {
    pub from_slot: Option<String>,
    pub from_pool: Option<String>,
}

impl OptionSource {
    pub fn slot(name: impl Into<String>) -> Self {
        Self {
            from_slot: Some(name.into()),
            from_pool: None,
        }
    }

    pub fn pool(slot_type: impl Into<String>) -> Self {
        Self {
            from_slot: None,
            from_pool: Some(slot_type.into()),
        }
    }
}

fn default_forbidden_count() -> usize {
    3
}

/// Declares how a blueprint's answer options are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionProvider {
    PlayerVote,
    #[serde(rename = "AB")]
    Ab {
        #[serde(default)]
        options: Vec<OptionSource>,
    },
    Taboo {
        #[serde(default)]
        word: OptionSource,
        #[serde(default)]
        forbidden: OptionSource,
        #[serde(default = "default_forbidden_count")]
        count: usize,
    },
    Scatter {
        #[serde(default)]
        category: OptionSource,
        #[serde(default)]
        letter: OptionSource,
    },
    JudgePick,
    #[serde(rename = "RATING_1_10")]
    Rating,
    OverUnder,
    #[serde(alias = "None")]
    None,
}

impl OptionProvider {
    /// Slot names bound to the two sides of an A/B provider.
    pub fn ab_slots(&self) -> Option<(&str, &str)> {
        match self {
            OptionProvider::Ab { options } if options.len() >= 2 => Some((
                options[0].from_slot.as_deref()?,
                options[1].from_slot.as_deref()?,
            )),
            _ => None,
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_ceiling() -> u8 {
    3
}

fn default_spice() -> u8 {
    1
}

/// A card template for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: String,
    pub game: String,
    pub family: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Intensity of the template itself; requests below it skip the blueprint.
    #[serde(default = "default_spice")]
    pub spice: u8,
    /// Ceiling for the entries filled into its slots.
    #[serde(default = "default_ceiling")]
    pub spice_max: u8,
    #[serde(default = "default_ceiling")]
    pub locality_max: u8,
    #[serde(alias = "blueprint")]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub option_provider: Option<OptionProvider>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Blueprint {
    pub fn new(
        id: impl Into<String>,
        game: impl Into<String>,
        family: impl Into<String>,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            id: id.into(),
            game: game.into(),
            family: family.into(),
            weight: default_weight(),
            spice: default_spice(),
            spice_max: default_ceiling(),
            locality_max: default_ceiling(),
            segments,
            constraints: Constraints::default(),
            option_provider: None,
            tags: Vec::new(),
        }
    }

    /// Build a blueprint from brace template syntax.
    pub fn from_template(
        id: impl Into<String>,
        game: impl Into<String>,
        family: impl Into<String>,
        template: &str,
    ) -> Result<Self, BlueprintError> {
        let blueprint = Self::new(id, game, family, Segment::parse_template(template)?);
        blueprint.validate()?;
        Ok(blueprint)
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_spice(mut self, spice: u8) -> Self {
        self.spice = spice;
        self
    }

    pub fn with_spice_max(mut self, spice: u8) -> Self {
        self.spice_max = spice;
        self
    }

    pub fn with_locality_max(mut self, locality: u8) -> Self {
        self.locality_max = locality;
        self
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.constraints.max_words = max_words;
        self
    }

    pub fn with_distinct_slots(mut self) -> Self {
        self.constraints.distinct_slots = true;
        self
    }

    pub fn with_min_players(mut self, min_players: usize) -> Self {
        self.constraints.min_players = min_players;
        self
    }

    pub fn with_option_provider(mut self, provider: OptionProvider) -> Self {
        self.option_provider = Some(provider);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn slot_refs(&self) -> impl Iterator<Item = &SlotRef> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(slot) => Some(slot),
            Segment::Text { .. } => None,
        })
    }

    pub fn slot(&self, name: &str) -> Option<&SlotRef> {
        self.slot_refs().find(|s| s.name == name)
    }

    /// Reject blueprints whose slot names collide.
    pub fn validate(&self) -> Result<(), BlueprintError> {
        let mut seen = HashSet::new();
        for slot in self.slot_refs() {
            if !seen.insert(slot.name.as_str()) {
                return Err(BlueprintError::DuplicateSlot {
                    blueprint: self.id.clone(),
                    slot: slot.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text { value } => f.write_str(value)?,
                Segment::Slot(slot) if slot.name == slot.slot_type => {
                    write!(f, "{{{}}}", slot.slot_type)?
                }
                Segment::Slot(slot) => write!(f, "{{{}:{}}}", slot.name, slot.slot_type)?,
            }
        }
        Ok(())
    }
}

/// Read access to blueprints grouped by game.
pub trait BlueprintCatalog: Send + Sync {
    /// Blueprints for one game; empty when the game is unknown.
    fn get_blueprints(&self, game_id: &str) -> &[Blueprint];

    /// Every blueprint across all games.
    fn all_blueprints(&self) -> Vec<&Blueprint>;
}

/// Blueprints keyed by upper-cased game id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    by_game: HashMap<String, Vec<Blueprint>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, blueprint: Blueprint) {
        self.by_game
            .entry(blueprint.game.to_ascii_uppercase())
            .or_default()
            .push(blueprint);
    }

    pub fn with(mut self, blueprint: Blueprint) -> Self {
        self.insert(blueprint);
        self
    }

    pub fn len(&self) -> usize {
        self.by_game.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Blueprint> for InMemoryCatalog {
    fn from_iter<I: IntoIterator<Item = Blueprint>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for blueprint in iter {
            catalog.insert(blueprint);
        }
        catalog
    }
}

impl BlueprintCatalog for InMemoryCatalog {
    fn get_blueprints(&self, game_id: &str) -> &[Blueprint] {
        self.by_game
            .get(game_id)
            .or_else(|| self.by_game.get(&game_id.to_ascii_uppercase()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn all_blueprints(&self) -> Vec<&Blueprint> {
        let mut all: Vec<&Blueprint> = self.by_game.values().flatten().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
