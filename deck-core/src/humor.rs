//! Heuristic humor scoring for rendered cards.
//!
//! Eight signals are scored in `[0, 1]` and blended into one overall score.
//! Slot types are bucketed into categories (taboo, innocent, relatable,
//! everyday, awkward). A content pack can redefine a category by declaring
//! a compatibility domain with the same name; otherwise the built-in lists
//! below apply.

use crate::blueprint::Blueprint;
use crate::compat::CompatibilityMatrix;
use crate::filler::{FilledSlots, SlotFill};
use crate::games;
use crate::lexicon::Tone;
use serde::{Deserialize, Serialize};

const ABSURDITY_WEIGHT: f64 = 0.20;
const SHOCK_WEIGHT: f64 = 0.15;
const RELATABLE_WEIGHT: f64 = 0.20;
const CRINGE_WEIGHT: f64 = 0.10;
const BENIGN_VIOLATION_WEIGHT: f64 = 0.15;
const SURPRISE_WEIGHT: f64 = 0.10;
const TIMING_WEIGHT: f64 = 0.05;
const SPECIFICITY_WEIGHT: f64 = 0.05;

const SOCIAL_GAMES: [&str; 4] = [
    games::ROAST_CONSENSUS,
    games::MAJORITY_REPORT,
    games::HOT_SEAT_IMPOSTER,
    games::TEXT_THREAD_TRAP,
];

/// Slot-type buckets the scorer reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Taboo,
    Innocent,
    Relatable,
    Everyday,
    Awkward,
}

impl Category {
    /// Domain name a content pack uses to override this category.
    pub fn domain_name(self) -> &'static str {
        match self {
            Category::Taboo => "taboo",
            Category::Innocent => "innocent",
            Category::Relatable => "relatable",
            Category::Everyday => "everyday",
            Category::Awkward => "awkward",
        }
    }

    fn defaults(self) -> &'static [&'static str] {
        match self {
            Category::Taboo => &[
                "sexual_innuendo",
                "bodily_functions",
                "taboo_topics",
                "vices_and_indulgences",
                "relationship_fails",
            ],
            Category::Innocent => &["dating_green_flags", "perks_plus", "categories", "letters"],
            Category::Relatable => &[
                "awkward_contexts",
                "selfish_behaviors",
                "relationship_fails",
                "internet_slang",
                "meme_references",
                "social_reason",
                "receipts",
            ],
            Category::Everyday => &[
                "awkward_contexts",
                "product_item",
                "meme_item",
                "vices_and_indulgences",
                "internet_slang",
            ],
            Category::Awkward => &["awkward_contexts", "relationship_fails", "selfish_behaviors"],
        }
    }
}

/// Per-signal scores plus the weighted blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumorScore {
    pub absurdity: f64,
    pub shock_value: f64,
    pub relatability: f64,
    pub cringe_factor: f64,
    pub benign_violation: f64,
    pub surprise: f64,
    pub timing: f64,
    pub specificity: f64,
    pub overall: f64,
}

impl HumorScore {
    #[allow(clippy::too_many_arguments)]
    pub fn blend(
        absurdity: f64,
        shock_value: f64,
        relatability: f64,
        cringe_factor: f64,
        benign_violation: f64,
        surprise: f64,
        timing: f64,
        specificity: f64,
    ) -> Self {
        let overall = absurdity * ABSURDITY_WEIGHT
            + shock_value * SHOCK_WEIGHT
            + relatability * RELATABLE_WEIGHT
            + cringe_factor * CRINGE_WEIGHT
            + benign_violation * BENIGN_VIOLATION_WEIGHT
            + surprise * SURPRISE_WEIGHT
            + timing * TIMING_WEIGHT
            + specificity * SPECIFICITY_WEIGHT;
        Self {
            absurdity,
            shock_value,
            relatability,
            cringe_factor,
            benign_violation,
            surprise,
            timing,
            specificity,
            overall: overall.clamp(0.0, 1.0),
        }
    }
}

pub struct HumorScorer<'a> {
    matrix: &'a CompatibilityMatrix,
}

impl<'a> HumorScorer<'a> {
    pub fn new(matrix: &'a CompatibilityMatrix) -> Self {
        Self { matrix }
    }

    pub fn score(&self, text: &str, blueprint: &Blueprint, slots: &FilledSlots) -> HumorScore {
        HumorScore::blend(
            self.absurdity(slots),
            self.shock_value(slots, blueprint),
            self.relatability(slots, blueprint),
            self.cringe_factor(slots),
            self.benign_violation(slots),
            surprise(text, slots),
            timing(text, slots),
            specificity(slots),
        )
    }

    pub fn in_category(&self, category: Category, slot_type: &str) -> bool {
        match self.matrix.domain(category.domain_name()) {
            Some(domain) => domain.contains(slot_type),
            None => category.defaults().contains(&slot_type),
        }
    }

    fn count(&self, slots: &FilledSlots, category: Category) -> usize {
        slots
            .iter()
            .filter(|s| self.in_category(category, &s.slot_type))
            .count()
    }

    fn any(&self, slots: &FilledSlots, category: Category) -> bool {
        self.count(slots, category) > 0
    }

    fn absurdity(&self, slots: &FilledSlots) -> f64 {
        if slots.len() < 2 {
            return 0.3;
        }
        let types = distinct_types(slots);
        let mut score: f64 = 0.0;
        for i in 0..types.len() {
            for j in (i + 1)..types.len() {
                let pair = self.matrix.score(types[i], types[j]);
                if pair < 0.2 {
                    score += 0.3;
                } else if pair > 0.8 {
                    score -= 0.1;
                }
            }
        }
        if self.any(slots, Category::Innocent) && self.any(slots, Category::Taboo) {
            score += 0.4;
        }
        score.clamp(0.0, 1.0)
    }

    fn shock_value(&self, slots: &FilledSlots, blueprint: &Blueprint) -> f64 {
        let mut score = self.count(slots, Category::Taboo) as f64 * 0.25;

        let mut spices: Vec<f64> = slots.iter().map(|s| s.spice as f64).collect();
        spices.sort_by(|a, b| b.total_cmp(a));
        let max_spice = spices.first().copied().unwrap_or(0.0);
        score += (max_spice / 5.0) * 0.4;

        let decayed: f64 = spices
            .iter()
            .skip(1)
            .enumerate()
            .map(|(i, s)| s * (-0.3 * i as f64).exp())
            .sum();
        score += decayed / (5.0 * slots.len().max(1) as f64) * 0.2;
        score += (blueprint.spice_max as f64 / 5.0) * 0.15;
        score.clamp(0.0, 1.0)
    }

    fn relatability(&self, slots: &FilledSlots, blueprint: &Blueprint) -> f64 {
        let mut score = self.count(slots, Category::Relatable) as f64 * 0.3;
        if SOCIAL_GAMES.contains(&blueprint.game.as_str()) {
            score += 0.3;
        }
        if self.any(slots, Category::Everyday) {
            score += 0.2;
        }
        if (2.0..=3.5).contains(&average_spice(slots)) {
            score += 0.2;
        }
        score.clamp(0.0, 1.0)
    }

    fn cringe_factor(&self, slots: &FilledSlots) -> f64 {
        let mut score = self.count(slots, Category::Awkward) as f64 * 0.4;
        let has = |t: &str| slots.iter().any(|s| s.slot_type == t);
        if has("sexual_innuendo") && has("bodily_functions") {
            score += 0.3;
        }
        score.clamp(0.0, 1.0)
    }

    fn benign_violation(&self, slots: &FilledSlots) -> f64 {
        if !self.any(slots, Category::Taboo) {
            return 0.2;
        }
        let playful = slots.iter().any(|s| is_playful(s.tone));
        let avg = average_spice(slots);
        let base: f64 = if !playful {
            0.3
        } else if (2.0..=4.0).contains(&avg) {
            0.9
        } else if avg < 2.0 {
            0.5
        } else {
            0.6
        };
        let bonus = if playful && self.any(slots, Category::Innocent) {
            0.1
        } else {
            0.0
        };
        (base + bonus).clamp(0.0, 1.0)
    }
}

fn is_playful(tone: Tone) -> bool {
    matches!(tone, Tone::Playful | Tone::Witty | Tone::Wild | Tone::Dry)
}

fn distinct_types(slots: &FilledSlots) -> Vec<&str> {
    let mut types: Vec<&str> = Vec::new();
    for t in slots.slot_types() {
        if !types.contains(&t) {
            types.push(t);
        }
    }
    types
}

fn average_spice(slots: &FilledSlots) -> f64 {
    if slots.is_empty() {
        return 0.0;
    }
    slots.iter().map(|s| s.spice as f64).sum::<f64>() / slots.len() as f64
}

fn surprise(text: &str, slots: &FilledSlots) -> f64 {
    let mut score: f64 = 0.5;
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let unexpected = words.windows(2).any(|w| {
        let (a, b) = (w[0], w[1]);
        a.chars().count() > 4
            && b.chars().count() > 4
            && !a.starts_with(prefix(b, 3))
            && !b.starts_with(prefix(a, 3))
    });
    if unexpected {
        score += 0.2;
    }
    if distinct_types(slots).len() >= 3 {
        score += 0.2;
    }
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    let has_capital = text
        .split_whitespace()
        .any(|w| w.chars().next().map_or(false, char::is_uppercase));
    if has_digit || has_capital {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

fn prefix(word: &str, n: usize) -> &str {
    match word.char_indices().nth(n) {
        Some((idx, _)) => &word[..idx],
        None => word,
    }
}

fn timing(text: &str, slots: &FilledSlots) -> f64 {
    if text.split_whitespace().count() < 5 {
        return 0.5;
    }
    let mut score: f64 = 0.5;
    if let Some(last) = slots.iter().last().filter(|s| !s.text.is_empty()) {
        score = match text.rfind(&last.text) {
            Some(pos) => {
                let relative = pos as f64 / text.len() as f64;
                if relative > 0.7 {
                    1.0
                } else if relative > 0.5 {
                    0.7
                } else {
                    0.3
                }
            }
            None => 0.3,
        };
    }
    if text.ends_with('!') || text.ends_with('?') {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

fn specificity(slots: &FilledSlots) -> f64 {
    if slots.is_empty() {
        return 0.5;
    }
    let total: f64 = slots.iter().map(slot_specificity).sum();
    total / slots.len() as f64
}

fn slot_specificity(slot: &SlotFill) -> f64 {
    let text = slot.text.as_str();
    let mut score: f64 = 0.5;
    let words = text.split_whitespace().count();
    if words > 3 {
        score += 0.2;
    } else if words > 1 {
        score += 0.1;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        score += 0.2;
    }
    if text.chars().next().map_or(false, char::is_uppercase) {
        score += 0.1;
    }
    if text.contains('\'') {
        score += 0.1;
    }
    if text.chars().count() > 30 {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(name: &str, slot_type: &str, text: &str, spice: u8, tone: Tone) -> SlotFill {
        SlotFill {
            name: name.to_string(),
            slot_type: slot_type.to_string(),
            value: text.to_string(),
            text: text.to_string(),
            spice,
            tone,
        }
    }

    fn blueprint(game: &str, spice_max: u8) -> Blueprint {
        Blueprint::from_template("bp", game, "f", "{a:x} {b:y}")
            .unwrap()
            .with_spice_max(spice_max)
    }

    #[test]
    fn test_blend_weights_sum_to_one() {
        let score = HumorScore::blend(1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!((score.overall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_slot_absurdity_floor() {
        let matrix = CompatibilityMatrix::new();
        let scorer = HumorScorer::new(&matrix);
        let slots = FilledSlots::new(vec![fill("a", "letters", "Q", 0, Tone::Neutral)]);
        assert_eq!(scorer.absurdity(&slots), 0.3);
    }

    #[test]
    fn test_innocent_taboo_mix_is_absurd() {
        let matrix = CompatibilityMatrix::new();
        let scorer = HumorScorer::new(&matrix);
        let slots = FilledSlots::new(vec![
            fill("a", "dating_green_flags", "remembers birthdays", 1, Tone::Playful),
            fill("b", "bodily_functions", "a surprise burp", 2, Tone::Playful),
        ]);
        assert!((scorer.absurdity(&slots) - 0.7).abs() < 1e-9);
        assert!((scorer.benign_violation(&slots) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_expected_pair_lowers_absurdity() {
        let matrix = CompatibilityMatrix::new().with_pair("food", "place", 0.9);
        let scorer = HumorScorer::new(&matrix);
        let slots = FilledSlots::new(vec![
            fill("a", "food", "tacos", 1, Tone::Neutral),
            fill("b", "place", "a food truck", 1, Tone::Neutral),
        ]);
        assert_eq!(scorer.absurdity(&slots), 0.0);
    }

    #[test]
    fn test_pack_domain_overrides_category() {
        let mut matrix = CompatibilityMatrix::new();
        matrix.set_domain("taboo", ["spicy_snack"]);
        let scorer = HumorScorer::new(&matrix);
        assert!(scorer.in_category(Category::Taboo, "spicy_snack"));
        assert!(!scorer.in_category(Category::Taboo, "sexual_innuendo"));
        assert!(scorer.in_category(Category::Innocent, "letters"));
    }

    #[test]
    fn test_social_game_is_relatable() {
        let matrix = CompatibilityMatrix::new();
        let scorer = HumorScorer::new(&matrix);
        let slots = FilledSlots::new(vec![fill("a", "awkward_contexts", "at a funeral", 2, Tone::Dry)]);
        let roast = scorer.relatability(&slots, &blueprint(games::ROAST_CONSENSUS, 3));
        let other = scorer.relatability(&slots, &blueprint(games::TABOO_TIMER, 3));
        assert!((roast - 1.0).abs() < 1e-9);
        assert!((other - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_timing_rewards_late_punchline() {
        let slots = FilledSlots::new(vec![fill("a", "x", "a waffle", 1, Tone::Neutral)]);
        let late = timing("Everyone at the reunion agreed the worst gift was a waffle!", &slots);
        let early = timing("a waffle is what nobody expected at the party", &slots);
        assert_eq!(late, 1.0);
        assert_eq!(early, 0.3);
        assert_eq!(timing("too short", &slots), 0.5);
    }

    #[test]
    fn test_specificity() {
        let slots = FilledSlots::new(vec![fill("a", "x", "Grandma's 3 cats", 1, Tone::Neutral)]);
        assert!((specificity(&slots) - 1.0).abs() < 1e-9);
        assert_eq!(specificity(&FilledSlots::default()), 0.5);
    }

    #[test]
    fn test_score_is_bounded() {
        let matrix = CompatibilityMatrix::new();
        let scorer = HumorScorer::new(&matrix);
        let slots = FilledSlots::new(vec![
            fill("a", "sexual_innuendo", "a suggestive eggplant", 3, Tone::Wild),
            fill("b", "bodily_functions", "a sneeze", 3, Tone::Playful),
            fill("c", "awkward_contexts", "during a job interview", 2, Tone::Dry),
        ]);
        let bp = blueprint(games::ROAST_CONSENSUS, 3);
        let score = scorer.score(
            "Most likely to bring a suggestive eggplant and a sneeze during a job interview.",
            &bp,
            &slots,
        );
        for value in [
            score.absurdity,
            score.shock_value,
            score.relatability,
            score.cringe_factor,
            score.benign_violation,
            score.surprise,
            score.timing,
            score.specificity,
            score.overall,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(score.overall > 0.35);
    }
}
