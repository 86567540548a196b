//! Blueprint-driven card generation.
//!
//! [`CardGenerator::generate`] orders a game's blueprints by learned prior
//! mean, then tries a bounded number of them: fill, drop session
//! duplicates, run the quality gate. The first card that clears the gate
//! wins. Running out of attempts returns `None` and the caller moves on to
//! the gold bank.

use crate::banlist::Banlist;
use crate::bandit::{PriorLookup, SelectionContext};
use crate::blueprint::{Blueprint, BlueprintCatalog};
use crate::compat::CompatibilityModel;
use crate::config::GeneratorRules;
use crate::filler::{FillContext, FillError, SlotFiller};
use crate::games::{self, InteractionType};
use crate::gate::{QualityGate, Rejection};
use crate::gold::GoldCard;
use crate::lexicon::LexiconStore;
use crate::options::{GameOptions, OptionInputs, OptionsCompiler};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// Cards and requests
// ============================================================================

/// An accepted card, ready to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledCard {
    pub id: String,
    pub game: String,
    pub text: String,
    pub family: String,
    pub spice: u8,
    pub locality: u8,
    /// Slot values and types, gate diagnostics, humor sub-scores.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FilledCard {
    /// Value originally drawn for a slot, before transforms.
    pub fn slot_value(&self, name: &str) -> Option<&str> {
        self.metadata.get("slots")?.get(name)?.as_str()
    }

    pub fn slot_type(&self, name: &str) -> Option<&str> {
        self.metadata.get("slot_types")?.get(name)?.as_str()
    }
}

impl From<&GoldCard> for FilledCard {
    fn from(card: &GoldCard) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("gold".to_string(), Value::Bool(true));
        Self {
            id: card.id.clone(),
            game: card.game.clone(),
            text: card.text.clone(),
            family: card.family.clone(),
            spice: card.spice,
            locality: card.locality,
            metadata,
        }
    }
}

/// Where a result came from in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSource {
    Generated,
    Bandit,
    Gold,
    Safe,
}

/// One card draw.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub session_id: String,
    pub game_id: Option<String>,
    pub players: Vec<String>,
    pub active_player: Option<String>,
    pub spice_max: u8,
    pub locality_max: u8,
    pub room_heat: f64,
    pub recent_families: Vec<String>,
    pub avoid_ids: HashSet<String>,
    pub tag_affinity: HashMap<String, f64>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            game_id: None,
            players: Vec::new(),
            active_player: None,
            spice_max: 3,
            locality_max: 3,
            room_heat: 0.6,
            recent_families: Vec::new(),
            avoid_ids: HashSet::new(),
            tag_affinity: HashMap::new(),
        }
    }
}

impl GenerationRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn for_game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn with_players<I, S>(mut self, players: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.players = players.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_active_player(mut self, player: impl Into<String>) -> Self {
        self.active_player = Some(player.into());
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

    pub fn with_room_heat(mut self, heat: f64) -> Self {
        self.room_heat = heat.clamp(0.0, 1.0);
        self
    }

    pub fn with_recent_family(mut self, family: impl Into<String>) -> Self {
        self.recent_families.push(family.into());
        self
    }

    pub fn avoiding(mut self, id: impl Into<String>) -> Self {
        self.avoid_ids.insert(id.into());
        self
    }

    pub fn with_tag_affinity(mut self, tag: impl Into<String>, affinity: f64) -> Self {
        self.tag_affinity.insert(tag.into(), affinity);
        self
    }

    pub fn fill_context(&self) -> FillContext {
        FillContext::new(self.spice_max, self.locality_max, self.room_heat)
    }

    /// The selector's view of this request.
    pub fn selection_context(&self) -> SelectionContext {
        SelectionContext {
            players: self.players.clone(),
            active_player: self.active_player.clone(),
            room_heat: self.room_heat,
            spice_max: self.spice_max,
            wanted_game: self.game_id.clone(),
            recent_families: self.recent_families.clone(),
            avoid_ids: self.avoid_ids.clone(),
            tag_affinity: self.tag_affinity.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub card: FilledCard,
    pub options: GameOptions,
    pub timer_secs: u32,
    pub interaction_type: InteractionType,
    pub source: CardSource,
}

// ============================================================================
// Session duplicate tracking
// ============================================================================

/// Recently shown texts per (session, game), oldest evicted first.
#[derive(Debug, Clone)]
pub struct RecentCards {
    capacity: usize,
    by_key: HashMap<(String, String), VecDeque<String>>,
}

impl RecentCards {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            by_key: HashMap::new(),
        }
    }

    pub fn contains(&self, session_id: &str, game_id: &str, text: &str) -> bool {
        self.by_key
            .get(&(session_id.to_string(), game_id.to_string()))
            .map_or(false, |texts| texts.iter().any(|t| t == text))
    }

    pub fn record(&mut self, session_id: &str, game_id: &str, text: impl Into<String>) {
        let texts = self
            .by_key
            .entry((session_id.to_string(), game_id.to_string()))
            .or_default();
        if texts.len() >= self.capacity {
            texts.pop_front();
        }
        texts.push_back(text.into());
    }

    pub fn len(&self, session_id: &str, game_id: &str) -> usize {
        self.by_key
            .get(&(session_id.to_string(), game_id.to_string()))
            .map_or(0, VecDeque::len)
    }

    /// Forget everything recorded for a session.
    pub fn clear_session(&mut self, session_id: &str) {
        self.by_key.retain(|(session, _), _| session != session_id);
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Why a single blueprint attempt produced nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Fill(#[from] FillError),
    #[error("text already shown this session")]
    Duplicate,
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

pub struct CardGenerator {
    catalog: Arc<dyn BlueprintCatalog>,
    lexicon: Arc<dyn LexiconStore>,
    model: CompatibilityModel,
    rules: GeneratorRules,
    banlist: Option<Arc<dyn Banlist>>,
    recent: Mutex<RecentCards>,
    default_timer_secs: u32,
}

impl CardGenerator {
    pub fn new(
        catalog: Arc<dyn BlueprintCatalog>,
        lexicon: Arc<dyn LexiconStore>,
        model: CompatibilityModel,
        rules: GeneratorRules,
    ) -> Self {
        let recent = RecentCards::new(rules.recent_cards_capacity);
        Self {
            catalog,
            lexicon,
            model,
            rules,
            banlist: None,
            recent: Mutex::new(recent),
            default_timer_secs: 15,
        }
    }

    pub fn with_banlist(mut self, banlist: Arc<dyn Banlist>) -> Self {
        self.banlist = Some(banlist);
        self
    }

    pub fn with_compatibility(mut self, model: CompatibilityModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_default_timer(mut self, secs: u32) -> Self {
        self.default_timer_secs = secs;
        self
    }

    pub fn rules(&self) -> &GeneratorRules {
        &self.rules
    }

    pub fn catalog(&self) -> &dyn BlueprintCatalog {
        self.catalog.as_ref()
    }

    pub fn lexicon(&self) -> &dyn LexiconStore {
        self.lexicon.as_ref()
    }

    pub fn model(&self) -> &CompatibilityModel {
        &self.model
    }

    pub fn default_timer_secs(&self) -> u32 {
        self.default_timer_secs
    }

    /// Blueprints that are not banned, fit the player count and are no
    /// spicier than the request allows.
    pub fn eligible<'b>(
        &self,
        blueprints: impl IntoIterator<Item = &'b Blueprint>,
        request: &GenerationRequest,
    ) -> Vec<&'b Blueprint> {
        blueprints
            .into_iter()
            .filter(|bp| {
                self.banlist
                    .as_ref()
                    .map_or(true, |b| !b.is_blueprint_banned(&bp.id))
            })
            .filter(|bp| bp.constraints.min_players <= request.players.len())
            .filter(|bp| bp.spice <= request.spice_max)
            .collect()
    }

    /// Try the game's blueprints in prior order. `None` means the caller
    /// should fall back.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        request: &GenerationRequest,
        priors: &dyn PriorLookup,
        rng: &mut R,
    ) -> Option<GenerationResult> {
        let game_id = request.game_id.as_deref()?;
        let eligible = self.eligible(self.catalog.get_blueprints(game_id), request);
        if eligible.is_empty() {
            debug!(game = %game_id, "no eligible blueprints");
            return None;
        }

        let ordered = self.order_candidates(game_id, eligible, priors, rng);
        let budget = self.rules.attempt_budget(game_id).min(ordered.len());
        for blueprint in ordered.into_iter().take(budget) {
            match self.attempt(blueprint, request, rng) {
                Ok(result) => return Some(result),
                Err(reason) => {
                    debug!(game = %game_id, blueprint = %blueprint.id, reason = %reason, "candidate discarded")
                }
            }
        }
        debug!(game = %game_id, budget, "attempt budget exhausted");
        None
    }

    /// Descending prior mean (static weight when unseen). Large pools get
    /// their head shuffled for exploration.
    fn order_candidates<'b, R: Rng + ?Sized>(
        &self,
        game_id: &str,
        mut candidates: Vec<&'b Blueprint>,
        priors: &dyn PriorLookup,
        rng: &mut R,
    ) -> Vec<&'b Blueprint> {
        let rank = |bp: &Blueprint| priors.prior_mean(&bp.id).unwrap_or(bp.weight);
        candidates.sort_by(|a, b| rank(b).total_cmp(&rank(a)));
        if candidates.len() > self.rules.max_attempts {
            let window = (self.rules.attempt_budget(game_id) * 2).min(candidates.len());
            candidates[..window].shuffle(rng);
        }
        candidates
    }

    /// Fill, dedupe and gate one blueprint.
    pub(crate) fn attempt<R: Rng + ?Sized>(
        &self,
        blueprint: &Blueprint,
        request: &GenerationRequest,
        rng: &mut R,
    ) -> Result<GenerationResult, AttemptError> {
        let filler = SlotFiller::new(self.lexicon.as_ref())
            .with_banlist(self.banlist.as_deref())
            .with_tone_preferences(&self.rules.tone_preference_low, &self.rules.tone_preference_high);
        let rendered = filler.fill(blueprint, &request.fill_context(), rng)?;

        let verdict = {
            let mut recent = self.recent();
            if recent.contains(&request.session_id, &blueprint.game, &rendered.text) {
                return Err(AttemptError::Duplicate);
            }
            let verdict = QualityGate::new(&self.rules, &self.model).evaluate(&rendered.text, blueprint, &rendered.slots);
            if let Some(rejection) = &verdict.rejection {
                return Err(rejection.clone().into());
            }
            recent.record(&request.session_id, &blueprint.game, rendered.text.clone());
            verdict
        };

        let mut metadata = BTreeMap::new();
        let slots: serde_json::Map<String, Value> = rendered
            .slots
            .iter()
            .map(|s| (s.name.clone(), Value::String(s.value.clone())))
            .collect();
        let slot_types: serde_json::Map<String, Value> = rendered
            .slots
            .iter()
            .map(|s| (s.name.clone(), Value::String(s.slot_type.clone())))
            .collect();
        metadata.insert("slots".to_string(), Value::Object(slots));
        metadata.insert("slot_types".to_string(), Value::Object(slot_types));
        metadata.insert("features".to_string(), json!(verdict.features));
        metadata.insert("pair_score".to_string(), json!(verdict.pair_score));
        if let Some(humor) = &verdict.humor {
            metadata.insert("humor".to_string(), json!(humor));
        }

        let options = OptionsCompiler::new(self.lexicon.as_ref()).compile(
            blueprint,
            &rendered.slots,
            OptionInputs::new(&request.players, &request.session_id)
                .with_ceilings(request.spice_max, request.locality_max)
                .with_banlist(self.banlist.as_deref()),
            rng,
        );

        let card = FilledCard {
            id: blueprint.id.clone(),
            game: blueprint.game.clone(),
            text: rendered.text,
            family: blueprint.family.clone(),
            spice: blueprint.spice_max.min(request.spice_max),
            locality: blueprint.locality_max.min(request.locality_max),
            metadata,
        };

        Ok(GenerationResult {
            timer_secs: games::timer_for(&card.game, self.default_timer_secs),
            interaction_type: games::interaction_for(&card.game),
            card,
            options,
            source: CardSource::Generated,
        })
    }

    /// Forget a session's shown texts.
    pub fn end_session(&self, session_id: &str) {
        self.recent().clear_session(session_id);
    }

    /// Admit a rewritten text for a card that already passed the gate.
    /// The rewrite must clear the text checks again and must not repeat
    /// anything shown this session; on success it is recorded as shown.
    pub fn accept_rewrite(
        &self,
        card: &FilledCard,
        session_id: &str,
        text: &str,
        max_words: usize,
    ) -> Result<(), AttemptError> {
        QualityGate::new(&self.rules, &self.model).check_text(text, max_words)?;
        let mut recent = self.recent();
        if recent.contains(session_id, &card.game, text) {
            return Err(AttemptError::Duplicate);
        }
        recent.record(session_id, &card.game, text);
        Ok(())
    }

    fn recent(&self) -> MutexGuard<'_, RecentCards> {
        self.recent.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banlist::CardLabBanlist;
    use crate::blueprint::{InMemoryCatalog, OptionProvider, OptionSource};
    use crate::compat::CompatibilityMatrix;
    use crate::lexicon::{InMemoryLexicon, LexiconEntry};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lexicon() -> InMemoryLexicon {
        let entries = |items: &[&str]| items.iter().map(|t| LexiconEntry::new(*t)).collect::<Vec<_>>();
        InMemoryLexicon::new()
            .with_pool("chore", entries(&["fold laundry", "wash dishes", "walk the dog", "mow the lawn"]))
            .with_pool("perk", entries(&["free tacos forever", "a personal chef"]))
            .with_pool("curse", entries(&["hiccups every hour", "socks that are always damp"]))
    }

    fn rules() -> GeneratorRules {
        GeneratorRules::default().with_humor_scoring(false)
    }

    fn generator(catalog: InMemoryCatalog) -> CardGenerator {
        CardGenerator::new(
            Arc::new(catalog),
            Arc::new(lexicon()),
            CompatibilityModel::new(CompatibilityMatrix::new()),
            rules(),
        )
    }

    fn roast(id: &str) -> Blueprint {
        Blueprint::from_template(
            id,
            games::ROAST_CONSENSUS,
            "roast",
            "Who here would secretly refuse to {c:chore} for a whole year?",
        )
        .unwrap()
    }

    #[test]
    fn test_generates_card_with_metadata() {
        let generator = generator(InMemoryCatalog::new().with(roast("r1")));
        let request = GenerationRequest::new("s1")
            .for_game(games::ROAST_CONSENSUS)
            .with_players(["Alice", "Bob"]);
        let mut rng = StdRng::seed_from_u64(3);
        let result = generator.generate(&request, &HashMap::new(), &mut rng).unwrap();

        assert_eq!(result.source, CardSource::Generated);
        assert_eq!(result.card.id, "r1");
        assert_eq!(result.timer_secs, 8);
        assert_eq!(result.interaction_type, InteractionType::VotePlayer);
        assert!(!result.card.text.contains('{'));
        assert_eq!(result.card.slot_type("c"), Some("chore"));
        assert!(result.card.slot_value("c").is_some());
        assert_eq!(
            result.options,
            GameOptions::PlayerVote {
                players: vec!["Alice".into(), "Bob".into()]
            }
        );
    }

    #[test]
    fn test_no_game_means_fallback() {
        let generator = generator(InMemoryCatalog::new().with(roast("r1")));
        let mut rng = StdRng::seed_from_u64(3);
        assert!(generator
            .generate(&GenerationRequest::new("s1"), &HashMap::new(), &mut rng)
            .is_none());
    }

    #[test]
    fn test_session_duplicates_are_suppressed() {
        let generator = generator(InMemoryCatalog::new().with(roast("r1")));
        let request = GenerationRequest::new("s1").for_game(games::ROAST_CONSENSUS);
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = HashSet::new();
        while let Some(result) = generator.generate(&request, &HashMap::new(), &mut rng) {
            assert!(seen.insert(result.card.text), "duplicate text returned");
        }
        assert!(seen.len() <= 4);

        // another session is unaffected
        let other = GenerationRequest::new("s2").for_game(games::ROAST_CONSENSUS);
        assert!(generator.generate(&other, &HashMap::new(), &mut rng).is_some());
    }

    #[test]
    fn test_banned_and_min_player_blueprints_skipped() {
        let catalog = InMemoryCatalog::new()
            .with(roast("banned"))
            .with(roast("crowd").with_min_players(6));
        let generator = generator(catalog).with_banlist(Arc::new(CardLabBanlist::new().with_banned_blueprint("banned")));
        let request = GenerationRequest::new("s1")
            .for_game(games::ROAST_CONSENSUS)
            .with_players(["A", "B", "C"]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generator.generate(&request, &HashMap::new(), &mut rng).is_none());
    }

    #[test]
    fn test_prior_order_prefers_higher_mean() {
        let catalog = InMemoryCatalog::new().with(roast("low")).with(roast("high"));
        let generator = generator(catalog);
        let mut priors = HashMap::new();
        priors.insert("low".to_string(), crate::bandit::PriorStats::new(1.0, 9.0));
        priors.insert("high".to_string(), crate::bandit::PriorStats::new(9.0, 1.0));
        let request = GenerationRequest::new("s1").for_game(games::ROAST_CONSENSUS);
        let mut rng = StdRng::seed_from_u64(5);
        let result = generator.generate(&request, &priors, &mut rng).unwrap();
        assert_eq!(result.card.id, "high");
    }

    #[test]
    fn test_ab_options_are_distinct() {
        let bp = Blueprint::from_template(
            "pp1",
            games::POISON_PITCH,
            "pitch",
            "Would you rather have {a:perk} but also suffer {b:curse} every single day?",
        )
        .unwrap()
        .with_option_provider(OptionProvider::Ab {
            options: vec![OptionSource::slot("a"), OptionSource::slot("b")],
        });
        let generator = generator(InMemoryCatalog::new().with(bp));
        let request = GenerationRequest::new("s1").for_game(games::POISON_PITCH);
        let mut rng = StdRng::seed_from_u64(8);
        let result = generator.generate(&request, &HashMap::new(), &mut rng).unwrap();
        match result.options {
            GameOptions::Ab { option_a, option_b } => {
                assert!(!option_a.trim().is_empty() && !option_b.trim().is_empty());
                assert_ne!(option_a.to_lowercase(), option_b.to_lowercase());
            }
            other => panic!("expected A/B, got {:?}", other),
        }
    }

    #[test]
    fn test_recent_cards_evicts_oldest() {
        let mut recent = RecentCards::new(2);
        recent.record("s", "g", "one");
        recent.record("s", "g", "two");
        recent.record("s", "g", "three");
        assert!(!recent.contains("s", "g", "one"));
        assert!(recent.contains("s", "g", "three"));
        assert_eq!(recent.len("s", "g"), 2);
        recent.clear_session("s");
        assert_eq!(recent.len("s", "g"), 0);
    }
}
