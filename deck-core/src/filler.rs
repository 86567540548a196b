//! Slot filling: turn a blueprint into concrete text.
//!
//! For every slot the filler narrows the lexicon pool by spice, locality,
//! uniqueness and the banlist, prefers a tone bucket that suits the room,
//! draws an entry and shapes it (plural, case, article). The joined text
//! is tidied and checked against the blueprint's word limit.

use crate::banlist::Banlist;
use crate::blueprint::{Blueprint, Segment, SlotRef, Transform};
use crate::lexicon::{ArticleRule, LexiconEntry, LexiconStore, Tone};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Tone order for spicy or heated rooms.
pub const HIGH_HEAT_TONES: [Tone; 5] = [Tone::Wild, Tone::Witty, Tone::Dry, Tone::Playful, Tone::Neutral];

/// Tone order for tame rooms.
pub const LOW_HEAT_TONES: [Tone; 5] = [Tone::Playful, Tone::Neutral, Tone::Witty, Tone::Dry, Tone::Wild];

const ARTICLES: [&str; 4] = ["a", "an", "the", "some"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FillError {
    #[error("No usable lexicon entries for slot type {slot_type}")]
    EmptyPool { slot_type: String },
    #[error("Rendered {words} words, blueprint allows {max}")]
    WordLimit { words: usize, max: usize },
}

/// Request-side ceilings that shape a fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillContext {
    pub spice_max: u8,
    pub locality_max: u8,
    /// 0.0 is a quiet room, 1.0 is rowdy.
    pub room_heat: f64,
}

impl FillContext {
    pub fn new(spice_max: u8, locality_max: u8, room_heat: f64) -> Self {
        Self {
            spice_max,
            locality_max,
            room_heat,
        }
    }
}

/// The entry chosen for one slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotFill {
    pub name: String,
    pub slot_type: String,
    /// Raw lexicon text.
    pub value: String,
    /// Text after transforms, as it appears in the card.
    pub text: String,
    pub spice: u8,
    pub tone: Tone,
}

/// Slot fills in blueprint order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilledSlots(Vec<SlotFill>);

impl FilledSlots {
    pub fn new(fills: Vec<SlotFill>) -> Self {
        Self(fills)
    }

    pub fn get(&self, name: &str) -> Option<&SlotFill> {
        self.0.iter().find(|f| f.name == name)
    }

    /// Rendered text for a slot.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).map(|f| f.text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotFill> {
        self.0.iter()
    }

    pub fn slot_types(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.slot_type.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A filled blueprint before it has been gated.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCard {
    pub text: String,
    pub slots: FilledSlots,
}

pub struct SlotFiller<'a> {
    lexicon: &'a dyn LexiconStore,
    banlist: Option<&'a dyn Banlist>,
    tone_low: &'a [Tone],
    tone_high: &'a [Tone],
}

impl<'a> SlotFiller<'a> {
    pub fn new(lexicon: &'a dyn LexiconStore) -> Self {
        Self {
            lexicon,
            banlist: None,
            tone_low: &[],
            tone_high: &[],
        }
    }

    pub fn with_banlist(mut self, banlist: Option<&'a dyn Banlist>) -> Self {
        self.banlist = banlist;
        self
    }

    /// Empty slices keep the built-in orders.
    pub fn with_tone_preferences(mut self, low: &'a [Tone], high: &'a [Tone]) -> Self {
        self.tone_low = low;
        self.tone_high = high;
        self
    }

    /// Fill every slot of `blueprint` and render the card text.
    pub fn fill<R: Rng + ?Sized>(
        &self,
        blueprint: &Blueprint,
        ctx: &FillContext,
        rng: &mut R,
    ) -> Result<RenderedCard, FillError> {
        let spice_cap = blueprint.spice_max.min(ctx.spice_max);
        let locality_cap = blueprint.locality_max.min(ctx.locality_max);
        let want_spicy = spice_cap >= 3 || ctx.room_heat >= 0.7;

        let mut used: HashSet<String> = HashSet::new();
        let mut fills = Vec::new();
        let mut raw = String::new();

        for segment in &blueprint.segments {
            match segment {
                Segment::Text { value } => raw.push_str(value),
                Segment::Slot(slot) => {
                    let exclusive = blueprint.constraints.distinct_slots || slot.has(Transform::Unique);
                    let entry = self.pick_entry(
                        slot,
                        spice_cap,
                        locality_cap,
                        want_spicy,
                        exclusive.then_some(&used),
                        rng,
                    )?;
                    let text = render_entry(entry, slot);
                    used.insert(entry.text.trim().to_lowercase());
                    raw.push_str(&text);
                    fills.push(SlotFill {
                        name: slot.name.clone(),
                        slot_type: slot.slot_type.clone(),
                        value: entry.text.clone(),
                        text,
                        spice: entry.spice,
                        tone: entry.tone,
                    });
                }
            }
        }

        let text = clean_sentence(&raw);
        let words = word_count(&text);
        let max = blueprint.constraints.max_words;
        if words > max {
            return Err(FillError::WordLimit { words, max });
        }

        Ok(RenderedCard {
            text,
            slots: FilledSlots(fills),
        })
    }

    fn pick_entry<R: Rng + ?Sized>(
        &self,
        slot: &SlotRef,
        spice_cap: u8,
        locality_cap: u8,
        want_spicy: bool,
        used: Option<&HashSet<String>>,
        rng: &mut R,
    ) -> Result<&'a LexiconEntry, FillError> {
        let lexicon: &'a dyn LexiconStore = self.lexicon;
        let pool: Vec<&'a LexiconEntry> = lexicon
            .get_entries(&slot.slot_type)
            .iter()
            .filter(|e| e.spice <= spice_cap && e.locality <= locality_cap)
            .filter(|e| used.map_or(true, |u| !u.contains(&e.text.trim().to_lowercase())))
            .filter(|e| {
                self.banlist
                    .map_or(true, |b| !b.is_lexicon_item_banned(&slot.slot_type, &e.text))
            })
            .collect();

        let empty = || FillError::EmptyPool {
            slot_type: slot.slot_type.clone(),
        };
        if pool.is_empty() {
            return Err(empty());
        }

        for tone in self.tone_order(want_spicy) {
            let bucket: Vec<&'a LexiconEntry> =
                pool.iter().copied().filter(|e| e.tone == *tone).collect();
            if let Some(entry) = bucket.choose(rng) {
                return Ok(*entry);
            }
        }
        pool.choose(rng).copied().ok_or_else(empty)
    }

    fn tone_order(&self, want_spicy: bool) -> &[Tone] {
        match (want_spicy, self.tone_high.is_empty(), self.tone_low.is_empty()) {
            (true, false, _) => self.tone_high,
            (true, true, _) => &HIGH_HEAT_TONES,
            (false, _, false) => self.tone_low,
            (false, _, true) => &LOW_HEAT_TONES,
        }
    }
}

/// Apply a slot's transforms to an entry: plural, then case, then article.
pub fn render_entry(entry: &LexiconEntry, slot: &SlotRef) -> String {
    let mut text = entry.text.trim().to_string();
    if entry.pluralizable && slot.has(Transform::Plural) {
        text = pluralize(&text);
    }
    for transform in slot.transforms.iter().filter(|t| t.is_case()) {
        text = match transform {
            Transform::Upper => text.to_uppercase(),
            Transform::Lower => text.to_lowercase(),
            Transform::Title => title_case(&text),
            _ => text,
        };
    }
    let rule = match entry.needs_article {
        ArticleRule::None if slot.has(Transform::AAn) => ArticleRule::A,
        rule => rule,
    };
    apply_article(&text, rule)
}

/// English plural by suffix heuristics.
pub fn pluralize(text: &str) -> String {
    let lower = text.to_lowercase();
    if ["ch", "sh", "s", "x", "z"].iter().any(|s| lower.ends_with(s)) {
        return format!("{}es", text);
    }
    if lower.ends_with('y') {
        let before = lower.chars().rev().nth(1);
        if before.map_or(false, |c| c.is_alphabetic() && !is_vowel(c)) {
            return format!("{}ies", &text[..text.len() - 1]);
        }
    }
    format!("{}s", text)
}

/// Prefix an article unless the text already starts with one.
pub fn apply_article(text: &str, rule: ArticleRule) -> String {
    let first = text
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();
    if text.trim().is_empty() || ARTICLES.contains(&first.as_str()) {
        return text.to_string();
    }
    match rule {
        ArticleRule::None => text.to_string(),
        ArticleRule::A => {
            let starts_with_vowel = text
                .chars()
                .find(|c| c.is_alphanumeric())
                .map_or(false, is_vowel);
            let article = if starts_with_vowel { "an" } else { "a" };
            format!("{} {}", article, text)
        }
        ArticleRule::An => format!("an {}", text),
        ArticleRule::The => format!("the {}", text),
    }
}

pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Collapse whitespace and drop spaces in front of punctuation.
pub fn clean_sentence(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        if matches!(c, ',' | '.' | '!' | '?' | ';' | ':') && out.ends_with(' ') {
            out.pop();
        }
        out.push(c);
    }
    out.trim().to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banlist::CardLabBanlist;
    use crate::lexicon::InMemoryLexicon;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lexicon() -> InMemoryLexicon {
        InMemoryLexicon::new()
            .with_pool(
                "snack",
                vec![
                    LexiconEntry::new("nacho").pluralizable().with_tone(Tone::Playful),
                    LexiconEntry::new("ghost pepper").with_spice(3).with_tone(Tone::Wild),
                ],
            )
            .with_pool(
                "place",
                vec![
                    LexiconEntry::new("airport lounge").with_article(ArticleRule::A),
                    LexiconEntry::new("bus stop").with_article(ArticleRule::A),
                ],
            )
    }

    #[test]
    fn test_pluralize_rules() {
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("lunch"), "lunches");
        assert_eq!(pluralize("party"), "parties");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("cat"), "cats");
    }

    #[test]
    fn test_article_rules() {
        assert_eq!(apply_article("owl", ArticleRule::A), "an owl");
        assert_eq!(apply_article("\"egg\"", ArticleRule::A), "an \"egg\"");
        assert_eq!(apply_article("goat", ArticleRule::A), "a goat");
        assert_eq!(apply_article("hour", ArticleRule::An), "an hour");
        assert_eq!(apply_article("moon", ArticleRule::The), "the moon");
        assert_eq!(apply_article("The moon", ArticleRule::A), "The moon");
        assert_eq!(apply_article("some guy", ArticleRule::The), "some guy");
        assert_eq!(apply_article("", ArticleRule::A), "");
    }

    #[test]
    fn test_clean_sentence() {
        assert_eq!(clean_sentence("  Hello ,  world  .  "), "Hello, world.");
        assert_eq!(clean_sentence("Why ?"), "Why?");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("bIG night out"), "Big Night Out");
    }

    #[test]
    fn test_render_order_plural_case_article() {
        let entry = LexiconEntry::new("egg").pluralizable().with_article(ArticleRule::The);
        let mut slot = SlotRef::new("x", "food");
        slot.transforms = vec![Transform::Upper, Transform::Plural];
        assert_eq!(render_entry(&entry, &slot), "the EGGS");
    }

    #[test]
    fn test_plural_skipped_when_not_pluralizable() {
        let entry = LexiconEntry::new("sushi");
        let mut slot = SlotRef::new("x", "food");
        slot.transforms = vec![Transform::Plural];
        assert_eq!(render_entry(&entry, &slot), "sushi");
    }

    #[test]
    fn test_forced_article() {
        let entry = LexiconEntry::new("iguana");
        let mut slot = SlotRef::new("x", "pet");
        slot.transforms = vec![Transform::AAn];
        assert_eq!(render_entry(&entry, &slot), "an iguana");
    }

    #[test]
    fn test_fill_respects_spice_ceiling() {
        let lexicon = lexicon();
        let bp = Blueprint::from_template("bp", "G", "f", "I hid {snack|plural} at {place}.").unwrap();
        let filler = SlotFiller::new(&lexicon);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let card = filler.fill(&bp, &FillContext::new(1, 3, 0.9), &mut rng).unwrap();
            assert!(card.text.starts_with("I hid nachos at a"));
            assert!(card.text.ends_with('.'));
            assert_eq!(card.slots.get("snack").unwrap().spice, 1);
        }
    }

    #[test]
    fn test_fill_prefers_tone_bucket() {
        let lexicon = lexicon();
        let bp = Blueprint::from_template("bp", "G", "f", "Snack time: {snack}").unwrap();
        let filler = SlotFiller::new(&lexicon);
        let mut rng = StdRng::seed_from_u64(1);
        let card = filler.fill(&bp, &FillContext::new(3, 3, 0.9), &mut rng).unwrap();
        assert_eq!(card.slots.text("snack"), Some("ghost pepper"));
    }

    #[test]
    fn test_distinct_slots_exhaust_pool() {
        let lexicon = InMemoryLexicon::new().with_pool("thing", vec![LexiconEntry::new("spoon")]);
        let bp = Blueprint::from_template("bp", "G", "f", "{a:thing} versus {b:thing}")
            .unwrap()
            .with_distinct_slots();
        let filler = SlotFiller::new(&lexicon);
        let mut rng = StdRng::seed_from_u64(3);
        let err = filler.fill(&bp, &FillContext::new(3, 3, 0.5), &mut rng).unwrap_err();
        assert_eq!(
            err,
            FillError::EmptyPool {
                slot_type: "thing".to_string()
            }
        );
    }

    #[test]
    fn test_banned_items_are_skipped() {
        let lexicon = lexicon();
        let banlist = CardLabBanlist::new().with_banned_lexicon_item("place", "Bus Stop");
        let bp = Blueprint::from_template("bp", "G", "f", "Meet me at {place}").unwrap();
        let filler = SlotFiller::new(&lexicon).with_banlist(Some(&banlist));
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let card = filler.fill(&bp, &FillContext::new(3, 3, 0.2), &mut rng).unwrap();
            assert_eq!(card.text, "Meet me at an airport lounge");
        }
    }

    #[test]
    fn test_word_limit() {
        let lexicon = lexicon();
        let bp = Blueprint::from_template("bp", "G", "f", "one two three four {place}")
            .unwrap()
            .with_max_words(5);
        let filler = SlotFiller::new(&lexicon);
        let mut rng = StdRng::seed_from_u64(5);
        let err = filler.fill(&bp, &FillContext::new(3, 3, 0.2), &mut rng).unwrap_err();
        assert_eq!(err, FillError::WordLimit { words: 7, max: 5 });
    }

    proptest! {
        #[test]
        fn prop_clean_sentence_is_tidy(input in "[a-z ,.!?\t]{0,40}") {
            let cleaned = clean_sentence(&input);
            prop_assert!(!cleaned.contains("  "));
            prop_assert!(!cleaned.contains(" ,"));
            prop_assert!(!cleaned.contains(" ."));
            prop_assert_eq!(cleaned.trim(), cleaned.as_str());
        }

        #[test]
        fn prop_pluralize_ends_in_s(word in "[a-z]{1,12}") {
            prop_assert!(pluralize(&word).ends_with('s'));
        }
    }
}
