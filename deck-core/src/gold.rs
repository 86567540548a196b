//! Curated cards used when generation cannot produce one.

use crate::options::{players_or_default, GameOptions};
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Literal options a curated card may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoldOptions {
    PlayerVote,
    #[serde(rename = "AB")]
    Ab {
        #[serde(default, alias = "optionA")]
        option_a: Option<String>,
        #[serde(default, alias = "optionB")]
        option_b: Option<String>,
    },
}

fn default_level() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldCard {
    pub id: String,
    pub game: String,
    #[serde(default)]
    pub family: String,
    pub text: String,
    #[serde(default = "default_level")]
    pub spice: u8,
    #[serde(default = "default_level")]
    pub locality: u8,
    #[serde(default)]
    pub options: Option<GoldOptions>,
}

impl GoldCard {
    pub fn new(id: impl Into<String>, game: impl Into<String>, text: impl Into<String>) -> Self {
        let game = game.into().to_ascii_uppercase();
        Self {
            id: id.into(),
            family: format!("gold_{}", game.to_ascii_lowercase()),
            game,
            text: text.into(),
            spice: 1,
            locality: 1,
            options: None,
        }
    }

    pub fn with_spice(mut self, spice: u8) -> Self {
        self.spice = spice;
        self
    }

    pub fn with_options(mut self, options: GoldOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Options for this card, falling back to the game's defaults.
    pub fn game_options(&self, players: &[String]) -> GameOptions {
        match &self.options {
            Some(GoldOptions::PlayerVote) => GameOptions::PlayerVote {
                players: players_or_default(players),
            },
            Some(GoldOptions::Ab { option_a, option_b }) => {
                let a = option_a.clone().unwrap_or_else(|| "Option A".to_string());
                let b = option_b.clone().unwrap_or_else(|| "Option B".to_string());
                GameOptions::ab(a, b).unwrap_or_else(|_| GameOptions::default_for_game(&self.game, players))
            }
            None => GameOptions::default_for_game(&self.game, players),
        }
    }
}

/// Source of curated cards.
pub trait GoldBank: Send + Sync {
    /// A random card for the game at or below the spice ceiling.
    fn draw(&self, game_id: &str, spice_max: u8, rng: &mut dyn RngCore) -> Option<GoldCard>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticGoldBank {
    by_game: HashMap<String, Vec<GoldCard>>,
}

impl StaticGoldBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut card: GoldCard) {
        card.game = card.game.to_ascii_uppercase();
        if card.family.is_empty() {
            card.family = format!("gold_{}", card.game.to_ascii_lowercase());
        }
        self.by_game.entry(card.game.clone()).or_default().push(card);
    }

    pub fn with(mut self, card: GoldCard) -> Self {
        self.insert(card);
        self
    }

    pub fn cards_for(&self, game_id: &str) -> &[GoldCard] {
        self.by_game
            .get(&game_id.to_ascii_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_game.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<GoldCard> for StaticGoldBank {
    fn from_iter<I: IntoIterator<Item = GoldCard>>(iter: I) -> Self {
        let mut bank = StaticGoldBank::new();
        for card in iter {
            bank.insert(card);
        }
        bank
    }
}

impl GoldBank for StaticGoldBank {
    fn draw(&self, game_id: &str, spice_max: u8, rng: &mut dyn RngCore) -> Option<GoldCard> {
        let eligible: Vec<&GoldCard> = self
            .cards_for(game_id)
            .iter()
            .filter(|card| card.spice <= spice_max)
            .collect();
        eligible.choose(rng).map(|card| (*card).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bank() -> StaticGoldBank {
        [
            GoldCard::new("g1", "roast_consensus", "Who would win a staring contest with a cat?"),
            GoldCard::new("g2", games::ROAST_CONSENSUS, "Who has the most chaotic browser tabs?").with_spice(3),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_draw_respects_spice() {
        let bank = bank();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let card = bank.draw(games::ROAST_CONSENSUS, 1, &mut rng).unwrap();
            assert_eq!(card.id, "g1");
        }
        assert!(bank.draw(games::ROAST_CONSENSUS, 0, &mut rng).is_none());
    }

    #[test]
    fn test_draw_unknown_game() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(bank().draw(games::TABOO_TIMER, 3, &mut rng).is_none());
    }

    #[test]
    fn test_game_is_normalized() {
        let bank = bank();
        assert_eq!(bank.cards_for("Roast_Consensus").len(), 2);
        assert_eq!(bank.cards_for(games::ROAST_CONSENSUS)[0].family, "gold_roast_consensus");
    }

    #[test]
    fn test_literal_ab_options() {
        let card = GoldCard::new("p1", games::POISON_PITCH, "Pick one").with_options(GoldOptions::Ab {
            option_a: Some("Teleport".into()),
            option_b: None,
        });
        assert_eq!(
            card.game_options(&[]),
            GameOptions::Ab {
                option_a: "Teleport".into(),
                option_b: "Option B".into()
            }
        );
    }

    #[test]
    fn test_decode_card() {
        let card: GoldCard = serde_json::from_str(
            r#"{"id":"c1","game":"POISON_PITCH","text":"Pick","options":{"type":"AB","optionA":"x","optionB":"y"}}"#,
        )
        .unwrap();
        assert_eq!(card.spice, 1);
        assert!(matches!(card.options, Some(GoldOptions::Ab { .. })));
    }
}
