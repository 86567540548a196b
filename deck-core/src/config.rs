//! Tunable knobs for generation, learning, and the engine.
//!
//! Every threshold the pipeline consults lives here so a deployment can
//! retune without touching the algorithms. Defaults are the values the
//! shipped content was calibrated against.

use crate::games;
use crate::lexicon::Tone;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Absolute floor applied to any configured minimum word count.
pub const MIN_WORD_FLOOR: usize = 4;

/// Rules consulted by the generator and the quality gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorRules {
    /// Blueprints tried per request when no per-game budget is set.
    pub max_attempts: usize,

    /// Per-game attempt budgets, keyed by game id.
    pub attempts_by_game: HashMap<String, usize>,

    /// Hard ceiling on any attempt budget.
    pub attempt_cap: Option<usize>,

    /// Highest tolerated share of repeated words.
    pub max_repetition_ratio: f64,

    /// Minimum word count (never below [`MIN_WORD_FLOOR`]).
    pub min_word_count: usize,

    /// Maximum word count; a blueprint may tighten it further.
    pub max_word_count: usize,

    /// Fraction below `max_repetition_ratio` where `repetition:high` fires.
    pub soft_repetition_margin: f64,

    /// Fraction below the word limit where `wordcount:over` fires.
    pub near_word_limit_margin: f64,

    /// Tone buckets tried first for tame rooms.
    pub tone_preference_low: Vec<Tone>,

    /// Tone buckets tried first for spicy or heated rooms.
    pub tone_preference_high: Vec<Tone>,

    /// Run the humor scorer as the last gate stage.
    pub enable_humor_scoring: bool,

    /// Minimum overall humor score.
    pub humor_threshold: f64,

    /// Accepted texts remembered per (session, game).
    pub recent_cards_capacity: usize,

    /// Games whose A/B options must come from different slot types.
    pub contrast_games: Vec<String>,
}

impl Default for GeneratorRules {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempts_by_game: HashMap::new(),
            attempt_cap: None,
            max_repetition_ratio: 0.4,
            min_word_count: 5,
            max_word_count: 30,
            soft_repetition_margin: 0.2,
            near_word_limit_margin: 0.1,
            tone_preference_low: Vec::new(),
            tone_preference_high: Vec::new(),
            enable_humor_scoring: true,
            humor_threshold: 0.35,
            recent_cards_capacity: 200,
            contrast_games: vec![
                games::POISON_PITCH.to_string(),
                games::RED_FLAG_RALLY.to_string(),
            ],
        }
    }
}

impl GeneratorRules {
    /// How many blueprints to try for a game.
    pub fn attempt_budget(&self, game_id: &str) -> usize {
        let base = self
            .attempts_by_game
            .get(game_id)
            .copied()
            .filter(|n| *n > 0)
            .unwrap_or(self.max_attempts);
        match self.attempt_cap {
            Some(cap) => base.min(cap),
            None => base,
        }
    }

    /// Effective minimum word count.
    pub fn min_words(&self) -> usize {
        self.min_word_count.max(MIN_WORD_FLOOR)
    }

    /// Effective maximum word count for a blueprint.
    pub fn word_limit(&self, blueprint_max: usize) -> usize {
        self.max_word_count.min(blueprint_max)
    }

    pub fn soft_repetition_threshold(&self) -> f64 {
        self.max_repetition_ratio * (1.0 - self.soft_repetition_margin)
    }

    pub fn near_word_limit(&self, limit: usize) -> f64 {
        limit as f64 * (1.0 - self.near_word_limit_margin)
    }

    pub fn is_contrast_game(&self, game_id: &str) -> bool {
        self.contrast_games.iter().any(|g| g.eq_ignore_ascii_case(game_id))
    }

    /// Set the default attempt budget.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set a per-game attempt budget.
    pub fn with_game_attempts(mut self, game_id: impl Into<String>, attempts: usize) -> Self {
        self.attempts_by_game.insert(game_id.into(), attempts);
        self
    }

    /// Cap every attempt budget.
    pub fn with_attempt_cap(mut self, cap: usize) -> Self {
        self.attempt_cap = Some(cap);
        self
    }

    /// Toggle the humor stage.
    pub fn with_humor_scoring(mut self, enabled: bool) -> Self {
        self.enable_humor_scoring = enabled;
        self
    }

    /// Set the humor acceptance threshold.
    pub fn with_humor_threshold(mut self, threshold: f64) -> Self {
        self.humor_threshold = threshold;
        self
    }

    /// Override both tone preference orders.
    pub fn with_tone_preferences(mut self, low: Vec<Tone>, high: Vec<Tone>) -> Self {
        self.tone_preference_low = low;
        self.tone_preference_high = high;
        self
    }
}

/// Exploration rate as a function of completed rounds.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpsilonSchedule {
    Constant {
        value: f64,
    },
    LinearDecay {
        start: f64,
        end: f64,
        decay_rounds: u32,
    },
    #[serde(skip)]
    Custom(Arc<dyn Fn(u32) -> f64 + Send + Sync>),
}

impl EpsilonSchedule {
    /// Epsilon after `round` picks, clamped to `[0, 1]`.
    pub fn at(&self, round: u32) -> f64 {
        let raw = match self {
            EpsilonSchedule::Constant { value } => *value,
            EpsilonSchedule::LinearDecay {
                start,
                end,
                decay_rounds,
            } => {
                if *decay_rounds == 0 || round >= *decay_rounds {
                    *end
                } else {
                    let t = round as f64 / *decay_rounds as f64;
                    start + (end - start) * t
                }
            }
            EpsilonSchedule::Custom(f) => f(round),
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }

    pub fn custom(f: impl Fn(u32) -> f64 + Send + Sync + 'static) -> Self {
        EpsilonSchedule::Custom(Arc::new(f))
    }
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        EpsilonSchedule::LinearDecay {
            start: 0.30,
            end: 0.10,
            decay_rounds: 15,
        }
    }
}

impl fmt::Debug for EpsilonSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpsilonSchedule::Constant { value } => {
                f.debug_struct("Constant").field("value", value).finish()
            }
            EpsilonSchedule::LinearDecay {
                start,
                end,
                decay_rounds,
            } => f
                .debug_struct("LinearDecay")
                .field("start", start)
                .field("end", end)
                .field("decay_rounds", decay_rounds)
                .finish(),
            EpsilonSchedule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Parameters for the Thompson-sampling selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Learning rate applied to each reward.
    pub gain: f64,
    pub epsilon: EpsilonSchedule,
    /// Picks that count as "recent" for the id penalty.
    pub history_horizon: usize,
    /// Picks that count as "recent" for the game penalty.
    pub game_history_horizon: usize,
    /// Share of the ranked pool eligible when exploring.
    pub top_fraction: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            epsilon: EpsilonSchedule::default(),
            history_horizon: 10,
            game_history_horizon: 5,
            top_fraction: 0.25,
        }
    }
}

impl LearningConfig {
    /// Slower learner for rooms with noisy feedback.
    pub fn gentle() -> Self {
        Self {
            gain: 0.4,
            ..Self::default()
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_epsilon(mut self, epsilon: EpsilonSchedule) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Which path the first cascade stage takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Walk blueprints in descending prior mean.
    #[default]
    PriorityOrder,
    /// Let the Thompson selector pick one template at a time.
    Thompson,
}

/// Top-level configuration for a [`ContentEngine`](crate::engine::ContentEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rules: GeneratorRules,
    pub learning: LearningConfig,
    /// Seed for every random draw; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Skip generation entirely and serve curated cards.
    pub safe_mode_gold_only: bool,
    pub selection: SelectionMode,
    /// Bandit picks tried before giving up on the template path.
    pub selector_retries: usize,
    /// Deadline for a single paraphrase call.
    pub completion_timeout: Duration,
    /// Timer used when a game has no registry entry.
    pub default_timer_secs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: GeneratorRules::default(),
            learning: LearningConfig::default(),
            seed: None,
            safe_mode_gold_only: false,
            selection: SelectionMode::default(),
            selector_retries: 4,
            completion_timeout: Duration::from_secs(3),
            default_timer_secs: 15,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed all randomness for reproducible sessions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_rules(mut self, rules: GeneratorRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_learning(mut self, learning: LearningConfig) -> Self {
        self.learning = learning;
        self
    }

    /// Serve only curated and safe cards.
    pub fn with_safe_mode(mut self, gold_only: bool) -> Self {
        self.safe_mode_gold_only = gold_only;
        self
    }

    pub fn with_selection(mut self, selection: SelectionMode) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_selector_retries(mut self, retries: usize) -> Self {
        self.selector_retries = retries;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }
}
