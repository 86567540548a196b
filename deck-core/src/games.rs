//! Registry of supported party games.
//!
//! Each game declares how players interact with a card and how long the
//! round timer runs. The generator attaches both to every result.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ROAST_CONSENSUS: &str = "ROAST_CONSENSUS";
pub const CONFESSION_OR_CAP: &str = "CONFESSION_OR_CAP";
pub const POISON_PITCH: &str = "POISON_PITCH";
pub const FILL_IN_FINISHER: &str = "FILL_IN_FINISHER";
pub const RED_FLAG_RALLY: &str = "RED_FLAG_RALLY";
pub const HOT_SEAT_IMPOSTER: &str = "HOT_SEAT_IMPOSTER";
pub const TEXT_THREAD_TRAP: &str = "TEXT_THREAD_TRAP";
pub const TABOO_TIMER: &str = "TABOO_TIMER";
pub const TITLE_FIGHT: &str = "TITLE_FIGHT";
pub const ALIBI_DROP: &str = "ALIBI_DROP";
pub const SCATTERBLAST: &str = "SCATTERBLAST";
pub const THE_UNIFYING_THEORY: &str = "THE_UNIFYING_THEORY";
pub const REALITY_CHECK: &str = "REALITY_CHECK";
pub const OVER_UNDER: &str = "OVER_UNDER";
pub const MAJORITY_REPORT: &str = "MAJORITY_REPORT";
pub const HYPE_OR_YIKE: &str = "HYPE_OR_YIKE";
pub const ODD_ONE_OUT: &str = "ODD_ONE_OUT";

/// How players respond to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    #[default]
    None,
    VotePlayer,
    TrueFalse,
    ABChoice,
    JudgePick,
    SmashPass,
    TargetSelect,
    ReplyTone,
    TabooGuess,
    OddExplain,
    MiniDuel,
    HideWords,
    SalesPitch,
    SpeedList,
    PredictVote,
}

/// Static facts about one game.
#[derive(Debug, Clone, Serialize)]
pub struct GameInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub interaction: InteractionType,
    pub timer_secs: u32,
    pub min_players: usize,
}

const fn game(
    id: &'static str,
    title: &'static str,
    interaction: InteractionType,
    timer_secs: u32,
) -> GameInfo {
    GameInfo {
        id,
        title,
        interaction,
        timer_secs,
        min_players: 3,
    }
}

lazy_static! {
    pub static ref GAME_REGISTRY: HashMap<&'static str, GameInfo> = {
        use InteractionType::*;
        [
            game(ROAST_CONSENSUS, "Roast Consensus", VotePlayer, 8),
            game(CONFESSION_OR_CAP, "Confession or Cap", TrueFalse, 6),
            game(POISON_PITCH, "Poison Pitch", ABChoice, 6),
            game(FILL_IN_FINISHER, "Fill-In Finisher", JudgePick, 4),
            game(RED_FLAG_RALLY, "Red Flag Rally", SmashPass, 6),
            game(HOT_SEAT_IMPOSTER, "Hot Seat Imposter", JudgePick, 6),
            game(TEXT_THREAD_TRAP, "Text Thread Trap", ReplyTone, 6),
            game(TABOO_TIMER, "Taboo Timer", TabooGuess, 8),
            game(ODD_ONE_OUT, "Odd One Out", OddExplain, 8),
            game(TITLE_FIGHT, "Title Fight", MiniDuel, 15),
            game(ALIBI_DROP, "Alibi Drop", HideWords, 3),
            game(HYPE_OR_YIKE, "Hype or Yike", SalesPitch, 15),
            game(SCATTERBLAST, "Scatterblast", SpeedList, 10),
            game(MAJORITY_REPORT, "Majority Report", PredictVote, 6),
            game(THE_UNIFYING_THEORY, "The Unifying Theory", JudgePick, 15),
            game(REALITY_CHECK, "Reality Check", TargetSelect, 10),
            game(OVER_UNDER, "Over/Under", ABChoice, 10),
        ]
        .into_iter()
        .map(|info| (info.id, info))
        .collect()
    };
}

/// Look up a game, ignoring ASCII case.
pub fn game_info(game_id: &str) -> Option<&'static GameInfo> {
    GAME_REGISTRY.get(game_id).or_else(|| {
        let upper = game_id.to_ascii_uppercase();
        GAME_REGISTRY.get(upper.as_str())
    })
}

/// Interaction type for a game; unknown games get `None`.
pub fn interaction_for(game_id: &str) -> InteractionType {
    game_info(game_id)
        .map(|g| g.interaction)
        .unwrap_or_default()
}

/// Round timer for a game, or `default_secs` when unknown.
pub fn timer_for(game_id: &str, default_secs: u32) -> u32 {
    game_info(game_id)
        .map(|g| g.timer_secs)
        .unwrap_or(default_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let info = game_info(ROAST_CONSENSUS).unwrap();
        assert_eq!(info.interaction, InteractionType::VotePlayer);
        assert_eq!(info.timer_secs, 8);
        assert_eq!(info.min_players, 3);
    }

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(interaction_for("taboo_timer"), InteractionType::TabooGuess);
    }

    #[test]
    fn test_unknown_game_defaults() {
        assert_eq!(interaction_for("CHARADES"), InteractionType::None);
        assert_eq!(timer_for("CHARADES", 15), 15);
        assert_eq!(timer_for(ALIBI_DROP, 15), 3);
    }

    #[test]
    fn test_interaction_serializes_screaming() {
        let json = serde_json::to_string(&InteractionType::ABChoice).unwrap();
        assert_eq!(json, "\"A_B_CHOICE\"");
    }
}
