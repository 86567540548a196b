//! Testing utilities for the content engine.
//!
//! This module provides:
//! - `MockCompleter` for deterministic paraphrase tests without a model
//! - fixture content (lexicon, catalog, gold bank, compatibility)
//! - `TestHarness` for scripted play sessions
//! - assertion helpers for generated cards

use crate::augment::{CompletionConfig, CompletionError, TextCompletion};
use crate::blueprint::{Blueprint, InMemoryCatalog, OptionProvider, OptionSource};
use crate::compat::{BannedContent, CompatibilityMatrix, CompatibilityModel};
use crate::config::{EngineConfig, GeneratorRules};
use crate::engine::ContentEngine;
use crate::feedback::Rating;
use crate::games;
use crate::generator::{GenerationRequest, GenerationResult};
use crate::gold::{GoldCard, GoldOptions, StaticGoldBank};
use crate::lexicon::{InMemoryLexicon, LexiconEntry, Tone};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A completion service that replays scripted responses.
pub struct MockCompleter {
    responses: Mutex<VecDeque<String>>,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockCompleter {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            delay: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextCompletion for MockCompleter {
    async fn complete(
        &self,
        _system: &str,
        _user: &str,
        _config: &CompletionConfig,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(CompletionError::Unavailable("mock failure".to_string()));
        }
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or(CompletionError::Empty)
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn pool(items: &[(&str, Tone)]) -> Vec<LexiconEntry> {
    items
        .iter()
        .map(|(text, tone)| LexiconEntry::new(*text).with_tone(*tone).with_spice(1))
        .collect()
}

/// Small lexicon covering every slot type in [`fixture_catalog`].
pub fn fixture_lexicon() -> InMemoryLexicon {
    use Tone::*;
    InMemoryLexicon::new()
        .with_pool(
            "chore",
            pool(&[
                ("fold laundry", Playful),
                ("wash the dishes", Neutral),
                ("walk the dog", Playful),
                ("mow the lawn", Dry),
                ("clean the fridge", Witty),
                ("vacuum the stairs", Neutral),
            ]),
        )
        .with_pool(
            "place",
            pool(&[
                ("the airport", Neutral),
                ("a haunted IKEA", Wild),
                ("the dentist", Dry),
                ("a silent retreat", Witty),
                ("the group gym class", Playful),
                ("a wedding buffet", Playful),
            ]),
        )
        .with_pool(
            "snack",
            pool(&[
                ("cold pizza", Neutral),
                ("gas station sushi", Wild),
                ("a bag of pretzels", Playful),
                ("spicy nachos", Witty),
                ("leftover birthday cake", Playful),
                ("a single grape", Dry),
            ]),
        )
        .with_pool(
            "habit",
            pool(&[
                ("humming loudly", Playful),
                ("replying with one emoji", Dry),
                ("narrating their own life", Witty),
                ("collecting hotel pens", Neutral),
                ("cracking knuckles", Neutral),
                ("double texting", Wild),
            ]),
        )
        .with_pool(
            "perk",
            pool(&[
                ("free flights forever", Playful),
                ("a personal chef", Neutral),
                ("perfect hair daily", Witty),
                ("unlimited naps", Playful),
            ]),
        )
        .with_pool(
            "curse",
            pool(&[
                ("hiccups every hour", Playful),
                ("permanently damp socks", Dry),
                ("a squeaky chair", Neutral),
                ("slow wifi", Witty),
            ]),
        )
        .with_pool("secret_word", pool(&[("umbrella", Neutral), ("volcano", Neutral), ("pancake", Neutral)]))
        .with_pool(
            "taboo_forbidden",
            pool(&[
                ("rain", Neutral),
                ("wet", Neutral),
                ("cover", Neutral),
                ("lava", Neutral),
                ("mountain", Neutral),
                ("syrup", Neutral),
            ]),
        )
}

const ROAST_TEMPLATES: [(&str, &str, &str); 10] = [
    ("roast_chore", "chores", "Who is most likely to {c:chore} while on a video call?"),
    ("roast_place", "places", "Who would get lost inside {p:place} for a full day?"),
    ("roast_snack", "snacks", "Who would trade their phone for {s:snack} without thinking?"),
    ("roast_habit", "habits", "Who has the worst habit of {h:habit} in public?"),
    ("roast_dodge", "dodges", "Who would {c:chore} at {p:place} just to avoid texting back?"),
    ("roast_smuggle", "smuggling", "Who would smuggle {s:snack} into {p:place} and get caught?"),
    ("roast_trade", "trades", "Who would rather keep {h:habit} than {c:chore} ever again?"),
    ("roast_fame", "fame", "Who would become famous for {h:habit} at {p:place}?"),
    ("roast_excuse", "excuses", "Who would blame {s:snack} for missing the group chat?"),
    ("roast_weekend", "weekends", "Who would plan a whole weekend around {s:snack} and {p:place}?"),
];

/// Ten roast blueprints plus poison pitch and taboo cards.
pub fn fixture_catalog() -> InMemoryCatalog {
    let mut blueprints: Vec<Blueprint> = ROAST_TEMPLATES
        .iter()
        .filter_map(|(id, family, template)| {
            Blueprint::from_template(*id, games::ROAST_CONSENSUS, *family, template)
                .ok()
                .map(|bp| bp.with_option_provider(OptionProvider::PlayerVote).with_tag(*family))
        })
        .collect();

    let ab = || OptionProvider::Ab {
        options: vec![OptionSource::slot("a"), OptionSource::slot("b")],
    };
    let pitches = [
        ("pitch_life", "Would you rather get {a:perk} but also {b:curse} for life?"),
        ("pitch_pick", "Pick one: {a:perk} or never escape {b:curse} again?"),
    ];
    blueprints.extend(pitches.iter().filter_map(|(id, template)| {
        Blueprint::from_template(*id, games::POISON_PITCH, "pitch", template)
            .ok()
            .map(|bp| bp.with_option_provider(ab()))
    }));

    blueprints.extend(
        Blueprint::from_template(
            "taboo_basic",
            games::TABOO_TIMER,
            "taboo",
            "Describe the secret word to your team without saying the forbidden words!",
        )
        .ok(),
    );

    blueprints.into_iter().collect()
}

pub fn fixture_gold_bank() -> StaticGoldBank {
    [
        GoldCard::new("gold_roast_1", games::ROAST_CONSENSUS, "Who would survive longest without their phone?")
            .with_options(GoldOptions::PlayerVote),
        GoldCard::new("gold_pitch_1", games::POISON_PITCH, "Lava floor forever or ice ceiling forever?")
            .with_options(GoldOptions::Ab {
                option_a: Some("Lava floor".to_string()),
                option_b: Some("Ice ceiling".to_string()),
            }),
        GoldCard::new("gold_taboo_1", games::TABOO_TIMER, "Describe this word without the obvious clues!"),
    ]
    .into_iter()
    .collect()
}

pub fn fixture_compatibility() -> CompatibilityModel {
    let matrix = CompatibilityMatrix::new()
        .with_pair("perk", "curse", 0.3)
        .with_pair("snack", "place", 0.2);
    let banned = BannedContent::new(["heck"], ["cursed phrase"]).unwrap_or_default();
    CompatibilityModel::new(matrix).with_banned(banned)
}

/// Engine config used by fixtures: seeded, humor scoring off.
pub fn fixture_config(seed: u64) -> EngineConfig {
    EngineConfig::new()
        .with_seed(seed)
        .with_rules(GeneratorRules::default().with_humor_scoring(false))
}

/// A fully wired engine over the fixture content.
pub fn fixture_engine(seed: u64) -> ContentEngine {
    fixture_engine_with(fixture_config(seed))
}

pub fn fixture_engine_with(config: EngineConfig) -> ContentEngine {
    ContentEngine::new(config, Arc::new(fixture_catalog()), Arc::new(fixture_lexicon()))
        .with_compatibility(fixture_compatibility())
        .with_gold_bank(Arc::new(fixture_gold_bank()))
}

// ============================================================================
// Harness
// ============================================================================

/// Drives one session against an engine.
pub struct TestHarness {
    engine: ContentEngine,
    session_id: String,
    players: Vec<String>,
    spice_max: u8,
    history: Vec<GenerationResult>,
}

impl TestHarness {
    pub fn new(seed: u64) -> Self {
        Self::with_engine(fixture_engine(seed))
    }

    pub fn with_engine(engine: ContentEngine) -> Self {
        Self {
            engine,
            session_id: "test-session".to_string(),
            players: vec!["Alice".to_string(), "Bob".to_string(), "Cam".to_string()],
            spice_max: 2,
            history: Vec::new(),
        }
    }

    pub fn with_players(mut self, players: &[&str]) -> Self {
        self.players = players.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn request(&self, game_id: &str) -> GenerationRequest {
        GenerationRequest::new(self.session_id.clone())
            .for_game(game_id)
            .with_players(self.players.clone())
            .with_spice_max(self.spice_max)
    }

    /// Draw a card for `game_id` and keep it in the history.
    pub fn draw(&mut self, game_id: &str) -> &GenerationResult {
        let result = self.engine.next(&self.request(game_id));
        let index = self.history.len();
        self.history.push(result);
        &self.history[index]
    }

    /// Rate the most recent card. Returns false when nothing was drawn.
    pub fn rate_last(&self, rating: Rating) -> bool {
        match self.history.last() {
            Some(last) => {
                self.engine.record_rating(&last.card.id, rating);
                true
            }
            None => false,
        }
    }

    pub fn history(&self) -> &[GenerationResult] {
        &self.history
    }

    pub fn engine(&self) -> &ContentEngine {
        &self.engine
    }
}

/// Assert a card has no leftover slot markers.
pub fn assert_no_placeholders(result: &GenerationResult) {
    assert!(
        !result.card.text.contains('{') && !result.card.text.contains('}'),
        "unresolved placeholder in {:?}",
        result.card.text
    );
}

/// Assert a result's options satisfy their variant invariants.
pub fn assert_options_valid(result: &GenerationResult) {
    if let Err(err) = result.options.validate() {
        panic!("invalid options {:?}: {}", result.options, err);
    }
}
