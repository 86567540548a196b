//! The content engine: one explicitly constructed context that owns the
//! generator, the learned priors and the randomness for a deck.
//!
//! [`ContentEngine::next`] walks the fallback cascade and always returns a
//! card. [`ContentEngine::record_outcome`] feeds player reactions back into
//! the priors, in the order they are received.

use crate::augment::{Augmentor, ParaphrasePlan, ParaphraseValidator, TextCompletion};
use crate::bandit::{Candidate, ContextualSelector, PriorStats};
use crate::banlist::Banlist;
use crate::blueprint::{Blueprint, BlueprintCatalog};
use crate::compat::CompatibilityModel;
use crate::config::{EngineConfig, SelectionMode};
use crate::fallback::{safe_result, CascadeStage};
use crate::feedback::Rating;
use crate::games;
use crate::generator::{CardGenerator, CardSource, FilledCard, GenerationRequest, GenerationResult};
use crate::gold::GoldBank;
use crate::lexicon::LexiconStore;
use crate::persist::{ContentPack, PersistError, PriorStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub struct ContentEngine {
    config: EngineConfig,
    generator: CardGenerator,
    gold: Option<Arc<dyn GoldBank>>,
    selector: Mutex<ContextualSelector>,
    rng: Mutex<StdRng>,
    augmentor: Option<Augmentor>,
    prior_store: Option<Arc<dyn PriorStore>>,
}

impl ContentEngine {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn BlueprintCatalog>,
        lexicon: Arc<dyn LexiconStore>,
    ) -> Self {
        let generator = CardGenerator::new(
            catalog,
            lexicon,
            CompatibilityModel::default(),
            config.rules.clone(),
        )
        .with_default_timer(config.default_timer_secs);
        let selector = ContextualSelector::new(config.learning.clone(), config.seed);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            generator,
            gold: None,
            selector: Mutex::new(selector),
            rng: Mutex::new(rng),
            augmentor: None,
            prior_store: None,
        }
    }

    /// Build an engine from a decoded content pack. The pack's rules
    /// replace `config.rules`, and its priors seed the selector.
    pub fn from_pack(config: EngineConfig, pack: &ContentPack) -> Result<Self, PersistError> {
        let config = config.with_rules(pack.rules.clone());
        let engine = Self::new(config, Arc::new(pack.catalog()?), Arc::new(pack.lexicon()))
            .with_compatibility(pack.compatibility()?)
            .with_gold_bank(Arc::new(pack.gold_bank()))
            .with_banlist(Arc::new(pack.banlist.clone()));
        engine.seed_priors(&pack.priors);
        Ok(engine)
    }

    pub fn with_compatibility(mut self, model: CompatibilityModel) -> Self {
        self.generator = self.generator.with_compatibility(model);
        self
    }

    pub fn with_gold_bank(mut self, gold: Arc<dyn GoldBank>) -> Self {
        self.gold = Some(gold);
        self
    }

    pub fn with_banlist(mut self, banlist: Arc<dyn Banlist>) -> Self {
        self.generator = self.generator.with_banlist(banlist);
        self
    }

    /// Paraphrase generated cards through `completer` in [`next_async`](Self::next_async).
    pub fn with_augmentor(mut self, completer: Arc<dyn TextCompletion>) -> Self {
        let validator = ParaphraseValidator::new(self.generator.model().banned.clone());
        self.augmentor = Some(Augmentor::new(completer, validator).with_timeout(self.config.completion_timeout));
        self
    }

    /// Seed the selector from `store` and persist every later update to it.
    pub fn with_prior_store(mut self, store: Arc<dyn PriorStore>) -> Self {
        self.seed_priors(&store.load_priors());
        self.prior_store = Some(store);
        self
    }

    pub fn seed_priors(&self, priors: &HashMap<String, PriorStats>) {
        self.selector().seed(priors);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generator(&self) -> &CardGenerator {
        &self.generator
    }

    /// Next card for `request`. Never fails: generation degrades to the
    /// gold bank and then to a safe card.
    pub fn next(&self, request: &GenerationRequest) -> GenerationResult {
        let mut stage = if self.config.safe_mode_gold_only {
            CascadeStage::TryGoldBank
        } else {
            CascadeStage::TryGenerator
        };

        loop {
            let outcome = match stage {
                CascadeStage::TryGenerator => self.try_generator(request),
                CascadeStage::TryGoldBank => self.try_gold(request),
                CascadeStage::SafeFallback => Some(safe_result(
                    request.game_id.as_deref(),
                    &request.players,
                    self.config.default_timer_secs,
                )),
            };
            if let Some(result) = outcome {
                debug!(
                    session = %request.session_id,
                    card = %result.card.id,
                    source = ?result.source,
                    "card ready"
                );
                return result;
            }
            match stage.next() {
                Some(next) => {
                    info!(
                        session = %request.session_id,
                        game = ?request.game_id,
                        from = %stage,
                        to = %next,
                        "falling back"
                    );
                    stage = next;
                }
                None => {
                    return safe_result(
                        request.game_id.as_deref(),
                        &request.players,
                        self.config.default_timer_secs,
                    )
                }
            }
        }
    }

    /// [`next`](Self::next), then an optional paraphrase of generated cards.
    pub async fn next_async(&self, request: &GenerationRequest) -> GenerationResult {
        let mut result = self.next(request);
        let Some(augmentor) = &self.augmentor else {
            return result;
        };
        if !matches!(result.source, CardSource::Generated | CardSource::Bandit) {
            return result;
        }

        let blueprint = self.blueprint_for(&result.card);
        let rules = self.generator.rules();
        let max_words = rules.word_limit(blueprint.map_or(rules.max_word_count, |bp| bp.constraints.max_words));
        let tags = blueprint.map(|bp| bp.tags.clone()).unwrap_or_default();
        let plan = ParaphrasePlan::new(max_words, result.card.spice).with_tags(tags);
        let seed: u64 = self.rng().gen();
        let rewritten = augmentor.maybe_paraphrase(&result.card, &plan, seed).await;
        if rewritten.text == result.card.text {
            return result;
        }

        match self
            .generator
            .accept_rewrite(&result.card, &request.session_id, &rewritten.text, max_words)
        {
            Ok(()) => result.card = rewritten,
            Err(err) => debug!(card = %result.card.id, error = %err, "paraphrase rejected, keeping original"),
        }
        result
    }

    /// Fold a reward for a shown card into its prior. Rewards are clamped
    /// to `[0, 1]`; unknown ids start from Beta(1, 1).
    pub fn record_outcome(&self, id: &str, reward: f64) {
        if reward.is_nan() {
            warn!(card = %id, "ignoring NaN reward");
            return;
        }
        let reward = reward.clamp(0.0, 1.0);
        let stats = {
            let mut selector = self.selector();
            selector.update(id, reward);
            selector.prior(id)
        };
        debug!(card = %id, reward, alpha = stats.alpha, beta = stats.beta, "outcome recorded");
        if let Some(store) = &self.prior_store {
            store.persist(id, stats);
        }
    }

    pub fn record_rating(&self, id: &str, rating: Rating) {
        self.record_outcome(id, rating.reward());
    }

    pub fn prior(&self, id: &str) -> PriorStats {
        self.selector().prior(id)
    }

    pub fn priors(&self) -> HashMap<String, PriorStats> {
        self.selector().priors().clone()
    }

    /// Drop a session's duplicate-suppression history.
    pub fn end_session(&self, session_id: &str) {
        self.generator.end_session(session_id);
    }

    fn try_generator(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        match self.config.selection {
            SelectionMode::PriorityOrder => {
                let selector = self.selector();
                let mut rng = self.rng();
                self.generator.generate(request, &*selector, &mut *rng)
            }
            SelectionMode::Thompson => self.try_bandit(request),
        }
    }

    /// Let the selector pick templates, gating each, until one is accepted
    /// or the retries run out.
    fn try_bandit(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        let catalog = self.generator.catalog();
        let pool: Vec<&Blueprint> = match request.game_id.as_deref() {
            Some(game) => catalog.get_blueprints(game).iter().collect(),
            None => catalog.all_blueprints(),
        };
        let eligible = self.generator.eligible(pool, request);
        let candidates: Vec<Candidate> = eligible.iter().map(|bp| Candidate::from(*bp)).collect();
        let mut ctx = request.selection_context();

        let mut selector = self.selector();
        let mut rng = self.rng();
        for _ in 0..self.config.selector_retries.max(1) {
            let id = selector.pick(&ctx, &candidates)?.id.clone();
            let blueprint = eligible.iter().find(|bp| bp.id == id)?;
            match self.generator.attempt(blueprint, request, &mut *rng) {
                Ok(mut result) => {
                    result.source = CardSource::Bandit;
                    return Some(result);
                }
                Err(reason) => {
                    debug!(blueprint = %id, reason = %reason, "bandit pick discarded");
                    ctx.avoid_ids.insert(id);
                }
            }
        }
        None
    }

    fn try_gold(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        let game_id = request.game_id.as_deref()?;
        let bank = self.gold.as_ref()?;
        let card = {
            let mut rng = self.rng();
            bank.draw(game_id, request.spice_max, &mut *rng)?
        };
        Some(GenerationResult {
            options: card.game_options(&request.players),
            timer_secs: games::timer_for(&card.game, self.config.default_timer_secs),
            interaction_type: games::interaction_for(&card.game),
            card: FilledCard::from(&card),
            source: CardSource::Gold,
        })
    }

    fn blueprint_for(&self, card: &FilledCard) -> Option<&Blueprint> {
        self.generator
            .catalog()
            .get_blueprints(&card.game)
            .iter()
            .find(|bp| bp.id == card.id)
    }

    // Lock order: selector before rng.
    fn selector(&self) -> MutexGuard<'_, ContextualSelector> {
        self.selector.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }
}
