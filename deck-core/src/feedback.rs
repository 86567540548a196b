//! Player ratings and their mapping onto bandit rewards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the room reacted to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Lol,
    Meh,
    Trash,
}

impl Rating {
    /// Reward in `[0, 1]` fed to the selector.
    pub fn reward(self) -> f64 {
        match self {
            Rating::Lol => 1.0,
            Rating::Meh => 0.35,
            Rating::Trash => 0.0,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Rating::Lol => "lol",
            Rating::Meh => "meh",
            Rating::Trash => "trash",
        };
        f.write_str(label)
    }
}

/// Bucket a reward back into a rating.
pub fn rating_from_reward(reward: f64) -> Rating {
    if reward >= 0.7 {
        Rating::Lol
    } else if reward >= 0.2 {
        Rating::Meh
    } else {
        Rating::Trash
    }
}

/// Mean reward for tallied votes; neutral 0.5 with no votes.
pub fn reward_from_counts(lol: u32, meh: u32, trash: u32) -> f64 {
    let total = lol + meh + trash;
    if total == 0 {
        return 0.5;
    }
    (lol as f64 * Rating::Lol.reward()
        + meh as f64 * Rating::Meh.reward()
        + trash as f64 * Rating::Trash.reward())
        / total as f64
}

/// Mean reward of a batch of ratings; neutral 0.5 when empty.
pub fn aggregate_reward(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.5;
    }
    ratings.iter().map(|r| r.reward()).sum::<f64>() / ratings.len() as f64
}
