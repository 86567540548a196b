//! Thompson-sampling template selection.
//!
//! Every template id owns a Beta(alpha, beta) posterior over "the room
//! liked it". A pick draws one sample per eligible candidate, adds small
//! bonuses (novelty, tag affinity) and penalties (recently shown id, family
//! or game), then either takes the best score or, with probability epsilon,
//! explores uniformly among the top slice of the ranking.
//!
//! Beta draws are built from two Gamma draws (Marsaglia-Tsang), with the
//! usual `Gamma(k + 1) * U^(1/k)` boost for shapes below one.

use crate::blueprint::Blueprint;
use crate::config::LearningConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Floor applied to seeded alpha/beta values.
pub const MIN_PRIOR: f64 = 1e-3;

const ID_PENALTY: f64 = 0.5;
const FAMILY_PENALTY: f64 = 0.4;
const GAME_PENALTY: f64 = 0.3;
const AFFINITY_SCALE: f64 = 0.4;

// ============================================================================
// Sampling
// ============================================================================

/// Posterior parameters for one template.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorStats {
    pub alpha: f64,
    pub beta: f64,
}

impl PriorStats {
    /// Beta(1, 1).
    pub fn uniform() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Same parameters, floored at [`MIN_PRIOR`].
    pub fn clamped(self) -> Self {
        Self {
            alpha: floor_prior(self.alpha),
            beta: floor_prior(self.beta),
        }
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let sum = self.alpha + self.beta;
        (self.alpha * self.beta) / (sum.powi(2) * (sum + 1.0))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        sample_beta(self.alpha, self.beta, rng)
    }
}

impl Default for PriorStats {
    fn default() -> Self {
        Self::uniform()
    }
}

fn floor_prior(value: f64) -> f64 {
    if value.is_nan() {
        MIN_PRIOR
    } else {
        value.max(MIN_PRIOR)
    }
}

/// Draw from Beta(alpha, beta). The result is strictly inside `(0, 1)`.
pub fn sample_beta<R: Rng + ?Sized>(alpha: f64, beta: f64, rng: &mut R) -> f64 {
    let x = sample_gamma(alpha, rng);
    let y = sample_gamma(beta, rng);
    let total = x + y;
    if !(total > 0.0) || !total.is_finite() {
        return 0.5;
    }
    (x / total).clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON)
}

/// Draw from Gamma(shape, 1) using Marsaglia-Tsang.
pub fn sample_gamma<R: Rng + ?Sized>(shape: f64, rng: &mut R) -> f64 {
    if !(shape > 0.0) {
        return 0.0;
    }
    if shape < 1.0 {
        let u = open_unit(rng);
        return sample_gamma(shape + 1.0, rng) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let (x, v) = loop {
            let x = standard_normal(rng);
            let v = 1.0 + c * x;
            if v > 0.0 {
                break (x, v * v * v);
            }
        };
        let u = open_unit(rng);
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Standard normal draw via the polar method.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u = 2.0 * rng.gen::<f64>() - 1.0;
        let v = 2.0 * rng.gen::<f64>() - 1.0;
        let s = u * u + v * v;
        if s > 0.0 && s < 1.0 {
            return u * (-2.0 * s.ln() / s).sqrt();
        }
    }
}

fn open_unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.gen();
        if u > 0.0 {
            return u;
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Something the selector can pick.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub game: String,
    pub family: String,
    /// Lowest request spice ceiling the candidate can be shown under.
    pub spice: u8,
    pub weight: f64,
    pub tags: Vec<String>,
    pub min_players: usize,
}

impl From<&Blueprint> for Candidate {
    fn from(blueprint: &Blueprint) -> Self {
        Self {
            id: blueprint.id.clone(),
            game: blueprint.game.clone(),
            family: blueprint.family.clone(),
            spice: blueprint.spice,
            weight: blueprint.weight,
            tags: blueprint.tags.clone(),
            min_players: blueprint.constraints.min_players,
        }
    }
}

/// The room as the selector sees it for one pick.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub players: Vec<String>,
    pub active_player: Option<String>,
    pub room_heat: f64,
    pub spice_max: u8,
    pub wanted_game: Option<String>,
    pub recent_families: Vec<String>,
    pub avoid_ids: HashSet<String>,
    /// Per-tag preference, roughly in `[-1, 1]`.
    pub tag_affinity: HashMap<String, f64>,
}

impl SelectionContext {
    pub fn new(spice_max: u8) -> Self {
        Self {
            spice_max,
            room_heat: 0.5,
            ..Self::default()
        }
    }

    pub fn for_game(mut self, game_id: impl Into<String>) -> Self {
        self.wanted_game = Some(game_id.into());
        self
    }

    pub fn with_players(mut self, players: Vec<String>) -> Self {
        self.players = players;
        self
    }

    pub fn with_room_heat(mut self, heat: f64) -> Self {
        self.room_heat = heat;
        self
    }

    pub fn avoiding(mut self, id: impl Into<String>) -> Self {
        self.avoid_ids.insert(id.into());
        self
    }

    pub fn with_recent_family(mut self, family: impl Into<String>) -> Self {
        self.recent_families.push(family.into());
        self
    }

    pub fn with_tag_affinity(mut self, tag: impl Into<String>, affinity: f64) -> Self {
        self.tag_affinity.insert(tag.into(), affinity);
        self
    }

    fn admits(&self, candidate: &Candidate) -> bool {
        let game_ok = self
            .wanted_game
            .as_deref()
            .map_or(true, |g| g.eq_ignore_ascii_case(&candidate.game));
        game_ok
            && candidate.spice <= self.spice_max
            && self.players.len() >= candidate.min_players
            && !self.avoid_ids.contains(&candidate.id)
    }
}

/// A pick the selector has made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    pub id: String,
    pub game: String,
}

/// Read-only access to learned posterior means.
pub trait PriorLookup {
    /// Mean for an id that has a recorded posterior.
    fn prior_mean(&self, id: &str) -> Option<f64>;
}

impl PriorLookup for HashMap<String, PriorStats> {
    fn prior_mean(&self, id: &str) -> Option<f64> {
        self.get(id).map(PriorStats::mean)
    }
}

/// Thompson-sampling selector with recency-aware diversity penalties.
#[derive(Debug)]
pub struct ContextualSelector {
    priors: HashMap<String, PriorStats>,
    rounds: u32,
    history: VecDeque<Exposure>,
    config: LearningConfig,
    rng: StdRng,
}

impl ContextualSelector {
    pub fn new(config: LearningConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            priors: HashMap::new(),
            rounds: 0,
            history: VecDeque::new(),
            config,
            rng,
        }
    }

    /// Load priors, flooring every parameter at [`MIN_PRIOR`].
    pub fn seed(&mut self, priors: &HashMap<String, PriorStats>) {
        for (id, stats) in priors {
            self.priors.insert(id.clone(), stats.clamped());
        }
    }

    /// Pick one candidate, or `None` when nothing is eligible.
    pub fn pick<'c>(&mut self, ctx: &SelectionContext, pool: &'c [Candidate]) -> Option<&'c Candidate> {
        let eligible: Vec<&'c Candidate> = pool.iter().filter(|c| ctx.admits(c)).collect();
        if eligible.is_empty() {
            return None;
        }

        let recent_ids: HashSet<&str> = self
            .history
            .iter()
            .rev()
            .take(self.config.history_horizon)
            .map(|e| e.id.as_str())
            .collect();
        let recent_games: HashSet<String> = self
            .history
            .iter()
            .rev()
            .take(self.config.game_history_horizon)
            .map(|e| e.game.to_ascii_uppercase())
            .collect();

        let mut scored: Vec<(&'c Candidate, f64)> = Vec::with_capacity(eligible.len());
        for candidate in eligible {
            let sample = self.prior(&candidate.id).sample(&mut self.rng);
            let novelty = 0.1 + (candidate.weight - 1.0) * 0.1;
            let affinity = tag_affinity(ctx, candidate);

            let mut diversity = 0.0;
            if recent_ids.contains(candidate.id.as_str()) {
                diversity += ID_PENALTY;
            }
            if ctx.recent_families.iter().any(|f| f == &candidate.family) {
                diversity += FAMILY_PENALTY;
            }
            if recent_games.contains(&candidate.game.to_ascii_uppercase()) {
                diversity += GAME_PENALTY;
            }

            scored.push((candidate, sample + novelty + affinity - diversity));
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let epsilon = self.config.epsilon.at(self.rounds);
        let explored = self.rng.gen::<f64>() < epsilon;
        let chosen = if explored {
            let k = ((scored.len() as f64 * self.config.top_fraction).floor() as usize).max(1);
            scored[..k.min(scored.len())].choose(&mut self.rng).copied()
        } else {
            let best = scored[0].1;
            let tied: Vec<(&'c Candidate, f64)> = scored
                .iter()
                .copied()
                .filter(|(_, s)| (s - best).abs() < 1e-12)
                .collect();
            tied.choose(&mut self.rng).copied()
        };

        let (candidate, score) = chosen?;
        debug!(id = %candidate.id, score, explored, epsilon, "bandit pick");

        self.rounds = self.rounds.saturating_add(1);
        self.history.push_back(Exposure {
            id: candidate.id.clone(),
            game: candidate.game.clone(),
        });
        let keep = self
            .config
            .history_horizon
            .max(self.config.game_history_horizon)
            .max(1);
        while self.history.len() > keep {
            self.history.pop_front();
        }

        Some(candidate)
    }

    /// Fold a reward in `[0, 1]` into an id's posterior.
    pub fn update(&mut self, id: &str, reward: f64) {
        let gain = self.config.gain;
        let stats = self.priors.entry(id.to_string()).or_default();
        stats.alpha += reward * gain;
        stats.beta += (1.0 - reward) * gain;
    }

    /// Posterior for an id; unseen ids report Beta(1, 1).
    pub fn prior(&self, id: &str) -> PriorStats {
        self.priors.get(id).copied().unwrap_or_default()
    }

    pub fn alpha(&self, id: &str) -> f64 {
        self.prior(id).alpha
    }

    pub fn beta(&self, id: &str) -> f64 {
        self.prior(id).beta
    }

    pub fn priors(&self) -> &HashMap<String, PriorStats> {
        &self.priors
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn history(&self) -> impl Iterator<Item = &Exposure> {
        self.history.iter()
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }
}

impl PriorLookup for ContextualSelector {
    fn prior_mean(&self, id: &str) -> Option<f64> {
        self.priors.get(id).map(PriorStats::mean)
    }
}

fn tag_affinity(ctx: &SelectionContext, candidate: &Candidate) -> f64 {
    if candidate.tags.is_empty() || ctx.tag_affinity.is_empty() {
        return 0.0;
    }
    let total: f64 = candidate
        .tags
        .iter()
        .map(|t| ctx.tag_affinity.get(t).copied().unwrap_or(0.0))
        .sum();
    AFFINITY_SCALE * total / candidate.tags.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EpsilonSchedule;
    use proptest::prelude::*;

    fn candidate(id: &str, game: &str, family: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            game: game.to_string(),
            family: family.to_string(),
            spice: 1,
            weight: 1.0,
            tags: Vec::new(),
            min_players: 0,
        }
    }

    fn greedy() -> LearningConfig {
        LearningConfig::default().with_epsilon(EpsilonSchedule::Constant { value: 0.0 })
    }

    #[test]
    fn test_beta_sample_in_open_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        for (a, b) in [(1.0, 1.0), (0.5, 0.5), (0.001, 5.0), (50.0, 0.01), (3.0, 7.0)] {
            for _ in 0..2000 {
                let x = sample_beta(a, b, &mut rng);
                assert!(x > 0.0 && x < 1.0, "Beta({}, {}) gave {}", a, b, x);
            }
        }
    }

    #[test]
    fn test_beta_sample_mean_tracks_posterior() {
        let mut rng = StdRng::seed_from_u64(9);
        let stats = PriorStats::new(8.0, 2.0);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| stats.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 0.8).abs() < 0.02, "mean was {}", mean);
    }

    #[test]
    fn test_gamma_mean() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 20_000;
        for shape in [0.5, 2.0, 6.0] {
            let mean: f64 = (0..n).map(|_| sample_gamma(shape, &mut rng)).sum::<f64>() / n as f64;
            assert!((mean - shape).abs() < shape * 0.05 + 0.02, "shape {} mean {}", shape, mean);
        }
    }

    #[test]
    fn test_update_moves_mean() {
        let mut selector = ContextualSelector::new(LearningConfig::default(), Some(1));
        let before = selector.prior("t").mean();
        selector.update("t", 1.0);
        assert!(selector.prior("t").mean() > before);
        selector.update("u", 0.0);
        assert!(selector.prior("u").mean() < before);
    }

    #[test]
    fn test_repeated_failures_only_grow_beta() {
        let mut selector = ContextualSelector::new(LearningConfig::gentle(), Some(1));
        for _ in 0..5 {
            selector.update("tmpl_1", 0.0);
        }
        assert_eq!(selector.alpha("tmpl_1"), 1.0);
        assert!((selector.beta("tmpl_1") - (1.0 + 5.0 * 0.4)).abs() < 1e-12);
    }

    #[test]
    fn test_seed_floors_priors() {
        let mut selector = ContextualSelector::new(LearningConfig::default(), Some(1));
        let mut priors = HashMap::new();
        priors.insert("x".to_string(), PriorStats::new(0.0, -3.0));
        selector.seed(&priors);
        assert_eq!(selector.prior("x"), PriorStats::new(MIN_PRIOR, MIN_PRIOR));
        assert_eq!(selector.prior_mean("x"), Some(0.5));
        assert_eq!(selector.prior_mean("never"), None);
    }

    #[test]
    fn test_spicy_blueprint_excluded_under_low_ceiling() {
        let mild = Blueprint::from_template("mild", "G", "f", "Who would {x:chore} first?").unwrap();
        let hot = Blueprint::from_template("hot", "G", "f", "Who would {x:chore} at a funeral?")
            .unwrap()
            .with_spice(3);
        let pool: Vec<Candidate> = [&mild, &hot].into_iter().map(Candidate::from).collect();
        assert_eq!(pool[1].spice, 3);

        let mut selector = ContextualSelector::new(LearningConfig::default(), Some(8));
        let tame = SelectionContext::new(1);
        for _ in 0..30 {
            assert_eq!(selector.pick(&tame, &pool).map(|c| c.id.as_str()), Some("mild"));
        }
        let spicy = SelectionContext::new(3);
        let picked: HashSet<&str> = (0..60)
            .filter_map(|_| selector.pick(&spicy, &pool).map(|c| c.id.as_str()))
            .collect();
        assert!(picked.contains("hot"));
    }

    #[test]
    fn test_pick_filters_pool() {
        let mut selector = ContextualSelector::new(greedy(), Some(5));
        let mut spicy = candidate("spicy", "G", "f");
        spicy.spice = 3;
        let mut crowd = candidate("crowd", "G", "f");
        crowd.min_players = 6;
        let pool = vec![
            spicy,
            crowd,
            candidate("other_game", "H", "f"),
            candidate("avoided", "G", "f"),
            candidate("ok", "g", "f"),
        ];
        let ctx = SelectionContext::new(2)
            .for_game("G")
            .with_players(vec!["a".into(), "b".into(), "c".into()])
            .avoiding("avoided");
        for _ in 0..10 {
            assert_eq!(selector.pick(&ctx, &pool).map(|c| c.id.as_str()), Some("ok"));
        }
        assert_eq!(selector.rounds(), 10);
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let mut selector = ContextualSelector::new(greedy(), Some(5));
        assert!(selector.pick(&SelectionContext::new(3), &[]).is_none());
        assert_eq!(selector.rounds(), 0);
    }

    #[test]
    fn test_recent_pick_is_penalized() {
        let config = LearningConfig {
            history_horizon: 1,
            ..greedy()
        };
        let mut selector = ContextualSelector::new(config, Some(11));
        let pool = vec![candidate("a", "G", "f1"), candidate("b", "G", "f2")];
        let ctx = SelectionContext::new(3);
        let mut previous = selector.pick(&ctx, &pool).map(|c| c.id.clone());
        let mut switches = 0;
        for _ in 0..40 {
            let next = selector.pick(&ctx, &pool).map(|c| c.id.clone());
            if next != previous {
                switches += 1;
            }
            previous = next;
        }
        assert!(switches >= 15, "only {} switches", switches);
    }

    #[test]
    fn test_affinity_steers_pick() {
        let mut selector = ContextualSelector::new(greedy(), Some(2));
        let mut liked = candidate("liked", "G", "f");
        liked.tags = vec!["pets".into()];
        let mut disliked = candidate("disliked", "G", "f");
        disliked.tags = vec!["taxes".into()];
        let pool = vec![liked, disliked];
        let ctx = SelectionContext::new(3)
            .with_tag_affinity("pets", 1.0)
            .with_tag_affinity("taxes", -1.0);
        let liked_picks = (0..100)
            .filter(|_| selector.pick(&ctx, &pool).map(|c| c.id.as_str()) == Some("liked"))
            .count();
        assert!(liked_picks > 50, "liked picked {} times", liked_picks);
    }

    proptest! {
        #[test]
        fn prop_beta_in_unit_interval(alpha in 0.001f64..100.0, beta in 0.001f64..100.0, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..50 {
                let x = sample_beta(alpha, beta, &mut rng);
                prop_assert!(x > 0.0 && x < 1.0);
            }
        }
    }
}
