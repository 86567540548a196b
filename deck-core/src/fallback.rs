//! The degradation path that guarantees a card: generator, gold bank, then
//! a hardcoded safe card per interaction type.

use crate::games::{self, InteractionType};
use crate::generator::{CardSource, FilledCard, GenerationResult};
use crate::options::{players_or_default, GameOptions};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Game id recorded on safe cards drawn without a requested game.
pub const ANY_GAME: &str = "ANY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeStage {
    TryGenerator,
    TryGoldBank,
    SafeFallback,
}

impl CascadeStage {
    /// The stage after this one fails. `SafeFallback` cannot fail.
    pub fn next(self) -> Option<CascadeStage> {
        match self {
            CascadeStage::TryGenerator => Some(CascadeStage::TryGoldBank),
            CascadeStage::TryGoldBank => Some(CascadeStage::SafeFallback),
            CascadeStage::SafeFallback => None,
        }
    }
}

impl fmt::Display for CascadeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CascadeStage::TryGenerator => "generator",
            CascadeStage::TryGoldBank => "gold_bank",
            CascadeStage::SafeFallback => "safe_fallback",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafeCard {
    pub text: &'static str,
    pub options: GameOptions,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The literal card for an interaction type. Every type has one.
pub fn safe_card(interaction: InteractionType, players: &[String]) -> SafeCard {
    use InteractionType as I;
    let (text, options) = match interaction {
        I::ABChoice => (
            "Would you rather have unlimited coffee or unlimited pizza?",
            GameOptions::Ab {
                option_a: "Unlimited Coffee".into(),
                option_b: "Unlimited Pizza".into(),
            },
        ),
        I::VotePlayer => (
            "Who is most likely to survive a zombie apocalypse?",
            GameOptions::PlayerVote {
                players: players_or_default(players),
            },
        ),
        I::TrueFalse => (
            "I once convinced someone I could speak three languages (I can't).",
            GameOptions::TrueFalse,
        ),
        I::SmashPass => (
            "A partner who's always 10 minutes late but brings snacks.",
            GameOptions::SmashPass,
        ),
        I::TabooGuess => (
            "Get your team to guess this word without using forbidden terms!",
            GameOptions::Taboo {
                word: "Password".into(),
                forbidden: strings(&["computer", "login", "security"]),
            },
        ),
        I::JudgePick => (
            "Complete this: The worst superpower would be...",
            GameOptions::None,
        ),
        I::ReplyTone => (
            "Your ex texts: 'Hey, you up?' Pick your vibe:",
            GameOptions::ReplyTone {
                tones: strings(&["Petty", "Wholesome", "Chaotic", "Deadpan"]),
            },
        ),
        I::OddExplain => (
            "Which doesn't belong?",
            GameOptions::OddOneOut {
                items: strings(&["Dolphins", "Bats", "Penguins"]),
            },
        ),
        I::HideWords => (
            "Sneak these words into your story!",
            GameOptions::HiddenWords {
                words: strings(&["rubber duck", "midnight"]),
            },
        ),
        I::SalesPitch => (
            "Pitch this product with a straight face:",
            GameOptions::Product {
                name: "Edible socks".into(),
            },
        ),
        I::SpeedList => (
            "Name three things fast!",
            GameOptions::Scatter {
                category: "Animals".into(),
                letter: "S".into(),
            },
        ),
        I::MiniDuel => (
            "Rock-paper-scissors showdown! Best of three.",
            GameOptions::Challenge {
                prompt: "Duel!".into(),
            },
        ),
        I::TargetSelect => (
            "Pick someone to answer this: What's your secret talent?",
            GameOptions::PlayerSelect {
                players: players_or_default(players),
                target: None,
            },
        ),
        I::PredictVote => (
            "Predict what the room will choose: Tacos vs Pizza?",
            GameOptions::PredictVote {
                option_a: "Tacos".into(),
                option_b: "Pizza".into(),
            },
        ),
        I::None => (
            "Everyone: share your most embarrassing moment from this week!",
            GameOptions::None,
        ),
    };
    SafeCard { text, options }
}

/// Terminal stage of the cascade.
pub fn safe_result(game_id: Option<&str>, players: &[String], default_timer_secs: u32) -> GenerationResult {
    let interaction = game_id.map(games::interaction_for).unwrap_or_default();
    let game = game_id
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| ANY_GAME.to_string());
    let safe = safe_card(interaction, players);

    let mut metadata = BTreeMap::new();
    metadata.insert("fallback".to_string(), Value::Bool(true));
    metadata.insert(
        "interaction_type".to_string(),
        serde_json::to_value(interaction).unwrap_or(Value::Null),
    );

    GenerationResult {
        card: FilledCard {
            id: format!("safe_fallback_{}", interaction_name(interaction)),
            game: game.clone(),
            text: safe.text.to_string(),
            family: "safe_fallback".to_string(),
            spice: 1,
            locality: 1,
            metadata,
        },
        options: safe.options,
        timer_secs: games::timer_for(&game, default_timer_secs),
        interaction_type: interaction,
        source: CardSource::Safe,
    }
}

fn interaction_name(interaction: InteractionType) -> String {
    serde_json::to_value(interaction)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "NONE".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::GAME_REGISTRY;

    const ALL: [InteractionType; 15] = [
        InteractionType::None,
        InteractionType::VotePlayer,
        InteractionType::TrueFalse,
        InteractionType::ABChoice,
        InteractionType::JudgePick,
        InteractionType::SmashPass,
        InteractionType::TargetSelect,
        InteractionType::ReplyTone,
        InteractionType::TabooGuess,
        InteractionType::OddExplain,
        InteractionType::MiniDuel,
        InteractionType::HideWords,
        InteractionType::SalesPitch,
        InteractionType::SpeedList,
        InteractionType::PredictVote,
    ];

    #[test]
    fn test_every_safe_card_is_valid() {
        for interaction in ALL {
            let card = safe_card(interaction, &[]);
            assert!(!card.text.is_empty());
            assert!(!card.text.contains('{'));
            assert!(card.options.validate().is_ok(), "{:?}", interaction);
        }
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(CascadeStage::TryGenerator.next(), Some(CascadeStage::TryGoldBank));
        assert_eq!(CascadeStage::TryGoldBank.next(), Some(CascadeStage::SafeFallback));
        assert_eq!(CascadeStage::SafeFallback.next(), None);
    }

    #[test]
    fn test_safe_result_for_known_game() {
        let result = safe_result(Some("taboo_timer"), &[], 15);
        assert_eq!(result.source, CardSource::Safe);
        assert_eq!(result.card.id, "safe_fallback_TABOO_GUESS");
        assert_eq!(result.card.game, "TABOO_TIMER");
        assert_eq!(result.timer_secs, 8);
        assert!(matches!(result.options, GameOptions::Taboo { .. }));
    }

    #[test]
    fn test_safe_result_without_game() {
        let result = safe_result(None, &[], 12);
        assert_eq!(result.card.game, ANY_GAME);
        assert_eq!(result.timer_secs, 12);
        assert_eq!(result.interaction_type, InteractionType::None);
    }

    #[test]
    fn test_registry_games_all_have_safe_cards() {
        for id in GAME_REGISTRY.keys() {
            let result = safe_result(Some(*id), &["Ana".to_string()], 15);
            assert!(result.options.validate().is_ok());
        }
    }
}
