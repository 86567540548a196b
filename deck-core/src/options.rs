//! Answer options attached to every card.
//!
//! [`GameOptions`] is a closed set of interaction payloads. Constructors
//! validate their fields, so a value built through them is always
//! presentable. [`OptionsCompiler`] derives options from a blueprint's
//! provider, or from per-game defaults when the blueprint declares none.

use crate::banlist::Banlist;
use crate::blueprint::{Blueprint, OptionProvider, OptionSource};
use crate::filler::FilledSlots;
use crate::games;
use crate::lexicon::{LexiconEntry, LexiconStore};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Reply tones offered when no `reply_tones` pool exists.
pub const REPLY_TONES: [&str; 6] = ["Deadpan", "Wholesome", "Chaotic", "Petty", "Feral", "Thirsty"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    #[error("{0} must not be empty")]
    EmptyList(&'static str),
    #[error("choices must differ, both were {0:?}")]
    IdenticalChoices(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameOptions {
    Ab { option_a: String, option_b: String },
    Taboo { word: String, forbidden: Vec<String> },
    Scatter { category: String, letter: String },
    PlayerVote { players: Vec<String> },
    TrueFalse,
    TextInput { prompt: String },
    SmashPass,
    PlayerSelect { players: Vec<String>, target: Option<String> },
    ReplyTone { tones: Vec<String> },
    OddOneOut { items: Vec<String> },
    Challenge { prompt: String },
    HiddenWords { words: Vec<String> },
    Product { name: String },
    PredictVote { option_a: String, option_b: String },
    None,
}

fn require(field: &'static str, value: &str) -> Result<(), OptionsError> {
    if value.trim().is_empty() {
        Err(OptionsError::BlankField(field))
    } else {
        Ok(())
    }
}

fn require_list(field: &'static str, values: &[String]) -> Result<(), OptionsError> {
    if values.is_empty() {
        return Err(OptionsError::EmptyList(field));
    }
    values.iter().try_for_each(|v| require(field, v))
}

fn require_distinct(a: &str, b: &str) -> Result<(), OptionsError> {
    if a.trim().to_lowercase() == b.trim().to_lowercase() {
        Err(OptionsError::IdenticalChoices(a.trim().to_string()))
    } else {
        Ok(())
    }
}

impl GameOptions {
    pub fn ab(option_a: impl Into<String>, option_b: impl Into<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::Ab {
            option_a: option_a.into(),
            option_b: option_b.into(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn predict_vote(
        option_a: impl Into<String>,
        option_b: impl Into<String>,
    ) -> Result<Self, OptionsError> {
        let options = GameOptions::PredictVote {
            option_a: option_a.into(),
            option_b: option_b.into(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn taboo(word: impl Into<String>, forbidden: Vec<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::Taboo {
            word: word.into(),
            forbidden,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn scatter(category: impl Into<String>, letter: impl Into<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::Scatter {
            category: category.into(),
            letter: letter.into(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn player_vote(players: Vec<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::PlayerVote { players };
        options.validate()?;
        Ok(options)
    }

    pub fn player_select(players: Vec<String>, target: Option<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::PlayerSelect { players, target };
        options.validate()?;
        Ok(options)
    }

    pub fn reply_tone(tones: Vec<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::ReplyTone { tones };
        options.validate()?;
        Ok(options)
    }

    pub fn odd_one_out(items: Vec<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::OddOneOut { items };
        options.validate()?;
        Ok(options)
    }

    pub fn hidden_words(words: Vec<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::HiddenWords { words };
        options.validate()?;
        Ok(options)
    }

    pub fn challenge(prompt: impl Into<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::Challenge {
            prompt: prompt.into(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn text_input(prompt: impl Into<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::TextInput {
            prompt: prompt.into(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn product(name: impl Into<String>) -> Result<Self, OptionsError> {
        let options = GameOptions::Product { name: name.into() };
        options.validate()?;
        Ok(options)
    }

    /// Check the invariants every variant carries.
    pub fn validate(&self) -> Result<(), OptionsError> {
        match self {
            GameOptions::Ab { option_a, option_b }
            | GameOptions::PredictVote { option_a, option_b } => {
                require("option_a", option_a)?;
                require("option_b", option_b)?;
                require_distinct(option_a, option_b)
            }
            GameOptions::Taboo { word, forbidden } => {
                require("word", word)?;
                require_list("forbidden", forbidden)
            }
            GameOptions::Scatter { category, letter } => {
                require("category", category)?;
                require("letter", letter)
            }
            GameOptions::PlayerVote { players } | GameOptions::PlayerSelect { players, .. } => {
                require_list("players", players)
            }
            GameOptions::ReplyTone { tones } => require_list("tones", tones),
            GameOptions::OddOneOut { items } => require_list("items", items),
            GameOptions::HiddenWords { words } => require_list("words", words),
            GameOptions::Challenge { prompt } | GameOptions::TextInput { prompt } => {
                require("prompt", prompt)
            }
            GameOptions::Product { name } => require("name", name),
            GameOptions::TrueFalse | GameOptions::SmashPass | GameOptions::None => Ok(()),
        }
    }

    /// Known-good options for a game that need no slot data.
    pub fn default_for_game(game_id: &str, players: &[String]) -> GameOptions {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match game_id.to_ascii_uppercase().as_str() {
            games::ROAST_CONSENSUS => GameOptions::PlayerVote {
                players: players_or_default(players),
            },
            games::CONFESSION_OR_CAP => GameOptions::TrueFalse,
            games::POISON_PITCH => GameOptions::Ab {
                option_a: "Option A".into(),
                option_b: "Option B".into(),
            },
            games::OVER_UNDER => GameOptions::Ab {
                option_a: "Over".into(),
                option_b: "Under".into(),
            },
            games::MAJORITY_REPORT => GameOptions::PredictVote {
                option_a: "Yes".into(),
                option_b: "No".into(),
            },
            games::RED_FLAG_RALLY => GameOptions::SmashPass,
            games::TEXT_THREAD_TRAP => GameOptions::ReplyTone {
                tones: strings(&REPLY_TONES),
            },
            games::FILL_IN_FINISHER => GameOptions::Challenge {
                prompt: "Fill in the blanks".into(),
            },
            games::HOT_SEAT_IMPOSTER | games::THE_UNIFYING_THEORY | games::TITLE_FIGHT => {
                GameOptions::Challenge {
                    prompt: "Freestyle challenge".into(),
                }
            }
            games::REALITY_CHECK => GameOptions::PlayerSelect {
                players: players_or_default(players),
                target: None,
            },
            games::TABOO_TIMER => GameOptions::Taboo {
                word: "password".into(),
                forbidden: strings(&["secret", "login", "type"]),
            },
            games::SCATTERBLAST => GameOptions::Scatter {
                category: "Animals".into(),
                letter: "A".into(),
            },
            games::ALIBI_DROP => GameOptions::HiddenWords {
                words: strings(&["pineapple", "lighthouse", "spreadsheet"]),
            },
            games::HYPE_OR_YIKE => GameOptions::Product {
                name: "Mystery product".into(),
            },
            games::ODD_ONE_OUT => GameOptions::OddOneOut {
                items: strings(&["A", "B", "C"]),
            },
            _ => GameOptions::None,
        }
    }
}

/// Listed players, or three generic seats when nobody is listed.
pub fn players_or_default(players: &[String]) -> Vec<String> {
    if players.iter().any(|p| !p.trim().is_empty()) {
        players
            .iter()
            .filter(|p| !p.trim().is_empty())
            .cloned()
            .collect()
    } else {
        (1..=3).map(|i| format!("Player {}", i)).collect()
    }
}

/// Who is playing and what the room allows, as the compiler needs it.
#[derive(Clone, Copy)]
pub struct OptionInputs<'r> {
    pub players: &'r [String],
    pub session_id: &'r str,
    /// Lexicon draws above these ceilings are skipped.
    pub spice_max: u8,
    pub locality_max: u8,
    pub banlist: Option<&'r dyn Banlist>,
}

impl<'r> OptionInputs<'r> {
    pub fn new(players: &'r [String], session_id: &'r str) -> Self {
        Self {
            players,
            session_id,
            spice_max: u8::MAX,
            locality_max: u8::MAX,
            banlist: None,
        }
    }

    pub fn with_ceilings(mut self, spice_max: u8, locality_max: u8) -> Self {
        self.spice_max = spice_max;
        self.locality_max = locality_max;
        self
    }

    pub fn with_banlist(mut self, banlist: Option<&'r dyn Banlist>) -> Self {
        self.banlist = banlist;
        self
    }

    fn admits(&self, slot_type: &str, entry: &LexiconEntry) -> bool {
        entry.spice <= self.spice_max
            && entry.locality <= self.locality_max
            && self
                .banlist
                .map_or(true, |b| !b.is_lexicon_item_banned(slot_type, &entry.text))
    }
}

pub struct OptionsCompiler<'a> {
    lexicon: &'a dyn LexiconStore,
}

impl<'a> OptionsCompiler<'a> {
    pub fn new(lexicon: &'a dyn LexiconStore) -> Self {
        Self { lexicon }
    }

    /// Build options for a filled blueprint. Never fails: invalid results
    /// are replaced by the game's defaults.
    pub fn compile<R: Rng + ?Sized>(
        &self,
        blueprint: &Blueprint,
        slots: &FilledSlots,
        inputs: OptionInputs<'_>,
        rng: &mut R,
    ) -> GameOptions {
        let compiled = match &blueprint.option_provider {
            Some(provider) => self.from_provider(provider, &blueprint.game, slots, inputs, rng),
            None => self.compile_for_game(&blueprint.game, slots, inputs, rng),
        };
        compiled.unwrap_or_else(|err| {
            debug!(blueprint = %blueprint.id, error = %err, "options fell back to game defaults");
            GameOptions::default_for_game(&blueprint.game, inputs.players)
        })
    }

    fn from_provider<R: Rng + ?Sized>(
        &self,
        provider: &OptionProvider,
        game_id: &str,
        slots: &FilledSlots,
        inputs: OptionInputs<'_>,
        rng: &mut R,
    ) -> Result<GameOptions, OptionsError> {
        match provider {
            OptionProvider::PlayerVote => GameOptions::player_vote(players_or_default(inputs.players)),
            OptionProvider::Ab { options } => {
                let none = OptionSource::default();
                let source_a = options.first().unwrap_or(&none);
                let source_b = options.get(1).unwrap_or(&none);
                let a = self
                    .resolve(source_a, slots, inputs, rng)
                    .unwrap_or_else(|| "Option A".to_string());
                let b = self
                    .resolve(source_b, slots, inputs, rng)
                    .unwrap_or_else(|| "Option B".to_string());
                // Only pool-drawn values may be redrawn; slot values are
                // printed on the card.
                let b_on_card = source_b
                    .from_slot
                    .as_deref()
                    .and_then(|name| slots.text(name))
                    .is_some();
                let redraw_pool = if b_on_card { None } else { source_b.from_pool.as_deref() };
                let (a, b) = self.distinct_pair(a, b, redraw_pool, inputs, rng);
                GameOptions::ab(a, b)
            }
            OptionProvider::Taboo {
                word,
                forbidden,
                count,
            } => {
                let word = match self.resolve(word, slots, inputs, rng) {
                    Some(word) => word,
                    None => self.taboo_word(slots, inputs, rng),
                };
                let forbidden = match (&forbidden.from_pool, &forbidden.from_slot) {
                    (Some(pool), _) => self.draw_many(pool, *count, &word, inputs, rng),
                    (None, Some(slot)) => slots.text(slot).map(|t| vec![t.to_string()]).unwrap_or_default(),
                    (None, None) => Vec::new(),
                };
                let forbidden = if forbidden.is_empty() {
                    self.taboo_forbidden(slots, &word, inputs, rng)
                } else {
                    forbidden
                };
                GameOptions::taboo(word, forbidden)
            }
            OptionProvider::Scatter { category, letter } => {
                let category = self
                    .resolve(category, slots, inputs, rng)
                    .unwrap_or_else(|| self.scatter_category(slots, inputs, rng));
                let letter = self
                    .resolve(letter, slots, inputs, rng)
                    .unwrap_or_else(|| self.scatter_letter(slots, inputs, rng));
                GameOptions::scatter(category, letter)
            }
            OptionProvider::JudgePick
            | OptionProvider::Rating
            | OptionProvider::OverUnder
            | OptionProvider::None => self.compile_for_game(game_id, slots, inputs, rng),
        }
    }

    /// Options for a game whose blueprint declares no provider.
    pub fn compile_for_game<R: Rng + ?Sized>(
        &self,
        game_id: &str,
        slots: &FilledSlots,
        inputs: OptionInputs<'_>,
        rng: &mut R,
    ) -> Result<GameOptions, OptionsError> {
        let texts: Vec<String> = slots.iter().map(|s| s.text.clone()).collect();
        let nth = |i: usize| texts.get(i).cloned();

        match game_id.to_ascii_uppercase().as_str() {
            games::ROAST_CONSENSUS => GameOptions::player_vote(players_or_default(inputs.players)),
            games::POISON_PITCH => GameOptions::ab(
                nth(0).unwrap_or_else(|| "Option A".to_string()),
                nth(1).unwrap_or_else(|| "Option B".to_string()),
            ),
            games::MAJORITY_REPORT => {
                let a = slots.text("a").map(str::to_string).or_else(|| nth(0));
                let b = slots.text("b").map(str::to_string).or_else(|| nth(1));
                GameOptions::predict_vote(
                    a.unwrap_or_else(|| "Yes".to_string()),
                    b.unwrap_or_else(|| "No".to_string()),
                )
            }
            games::TEXT_THREAD_TRAP => {
                let tones: Vec<String> = self
                    .allowed("reply_tones", inputs)
                    .into_iter()
                    .map(|e| e.text.clone())
                    .collect();
                if tones.is_empty() {
                    GameOptions::reply_tone(REPLY_TONES.iter().map(|t| t.to_string()).collect())
                } else {
                    GameOptions::reply_tone(tones)
                }
            }
            games::ODD_ONE_OUT => {
                let named: Vec<String> = ["i1", "i2", "i3"]
                    .iter()
                    .filter_map(|n| slots.text(n).map(str::to_string))
                    .collect();
                let items = if named.is_empty() {
                    texts.iter().take(3).cloned().collect()
                } else {
                    named
                };
                GameOptions::odd_one_out(items)
            }
            games::ALIBI_DROP => GameOptions::hidden_words(texts.clone()),
            games::HYPE_OR_YIKE => GameOptions::product(nth(0).unwrap_or_else(|| "Mystery product".to_string())),
            games::CONFESSION_OR_CAP => Ok(GameOptions::TrueFalse),
            games::RED_FLAG_RALLY => Ok(GameOptions::SmashPass),
            games::TABOO_TIMER => {
                let word = self.taboo_word(slots, inputs, rng);
                let forbidden = self.taboo_forbidden(slots, &word, inputs, rng);
                GameOptions::taboo(word, forbidden)
            }
            games::SCATTERBLAST => GameOptions::scatter(
                self.scatter_category(slots, inputs, rng),
                self.scatter_letter(slots, inputs, rng),
            ),
            games::TITLE_FIGHT => GameOptions::challenge("Pick the winner"),
            games::HOT_SEAT_IMPOSTER => GameOptions::challenge("Answer as the target"),
            games::FILL_IN_FINISHER => GameOptions::challenge("Fill in the blanks"),
            games::THE_UNIFYING_THEORY => GameOptions::challenge("Explain what connects them"),
            games::REALITY_CHECK => GameOptions::player_select(players_or_default(inputs.players), None),
            games::OVER_UNDER => GameOptions::ab("Over", "Under"),
            _ => Ok(GameOptions::None),
        }
    }

    /// Entries of `pool` within the request's ceilings and not banned.
    fn allowed(&self, pool: &str, inputs: OptionInputs<'_>) -> Vec<&'a LexiconEntry> {
        self.lexicon
            .get_entries(pool)
            .iter()
            .filter(|e| inputs.admits(pool, e))
            .collect()
    }

    fn draw_one<R: Rng + ?Sized>(&self, pool: &str, inputs: OptionInputs<'_>, rng: &mut R) -> Option<String> {
        self.allowed(pool, inputs).choose(rng).map(|e| e.text.clone())
    }

    fn resolve<R: Rng + ?Sized>(
        &self,
        source: &OptionSource,
        slots: &FilledSlots,
        inputs: OptionInputs<'_>,
        rng: &mut R,
    ) -> Option<String> {
        if let Some(name) = &source.from_slot {
            if let Some(text) = slots.text(name).filter(|t| !t.trim().is_empty()) {
                return Some(text.to_string());
            }
            if name.starts_with("tone") {
                return Some(session_tone(inputs.session_id, name).to_string());
            }
        }
        self.draw_one(source.from_pool.as_deref()?, inputs, rng)
    }

    /// Redraw `b` once from `redraw_pool` when it collides with `a`.
    fn distinct_pair<R: Rng + ?Sized>(
        &self,
        a: String,
        b: String,
        redraw_pool: Option<&str>,
        inputs: OptionInputs<'_>,
        rng: &mut R,
    ) -> (String, String) {
        if !overlaps(&a, &b) {
            return (a, b);
        }
        let redraw = redraw_pool.and_then(|pool| {
            let alternatives: Vec<&str> = self
                .allowed(pool, inputs)
                .into_iter()
                .map(|e| e.text.as_str())
                .filter(|t| !overlaps(&a, t))
                .collect();
            alternatives.choose(rng).map(|t| t.to_string())
        });
        (a, redraw.unwrap_or(b))
    }

    fn draw_many<R: Rng + ?Sized>(
        &self,
        pool: &str,
        count: usize,
        exclude: &str,
        inputs: OptionInputs<'_>,
        rng: &mut R,
    ) -> Vec<String> {
        let candidates: Vec<&str> = self
            .allowed(pool, inputs)
            .into_iter()
            .map(|e| e.text.as_str())
            .filter(|t| !t.eq_ignore_ascii_case(exclude))
            .collect();
        candidates
            .choose_multiple(rng, count.max(1))
            .map(|t| t.to_string())
            .collect()
    }

    fn taboo_word<R: Rng + ?Sized>(&self, slots: &FilledSlots, inputs: OptionInputs<'_>, rng: &mut R) -> String {
        ["word", "secret", "secret_word"]
            .iter()
            .find_map(|n| slots.text(n).filter(|t| !t.trim().is_empty()))
            .map(str::to_string)
            .or_else(|| self.draw_one("secret_word", inputs, rng))
            .unwrap_or_else(|| "password".to_string())
    }

    fn taboo_forbidden<R: Rng + ?Sized>(
        &self,
        slots: &FilledSlots,
        word: &str,
        inputs: OptionInputs<'_>,
        rng: &mut R,
    ) -> Vec<String> {
        let named: Vec<String> = ["f1", "f2", "f3"]
            .iter()
            .filter_map(|n| slots.text(n).map(str::to_string))
            .collect();
        if !named.is_empty() {
            return named;
        }
        let drawn = self.draw_many("taboo_forbidden", 3, word, inputs, rng);
        if drawn.is_empty() {
            vec!["secret".to_string(), "hidden".to_string(), "word".to_string()]
        } else {
            drawn
        }
    }

    fn scatter_category<R: Rng + ?Sized>(&self, slots: &FilledSlots, inputs: OptionInputs<'_>, rng: &mut R) -> String {
        slots
            .text("category")
            .map(str::to_string)
            .or_else(|| self.draw_one("categories", inputs, rng))
            .unwrap_or_else(|| "Animals".to_string())
    }

    fn scatter_letter<R: Rng + ?Sized>(&self, slots: &FilledSlots, inputs: OptionInputs<'_>, rng: &mut R) -> String {
        slots
            .text("letter")
            .map(str::to_string)
            .or_else(|| self.draw_one("letters", inputs, rng))
            .unwrap_or_else(|| "A".to_string())
    }
}

/// Games whose A/B options are read from the first two filled slots when
/// the blueprint does not name them.
pub fn slot_backed_ab_game(game_id: &str) -> bool {
    [games::POISON_PITCH, games::MAJORITY_REPORT]
        .iter()
        .any(|g| g.eq_ignore_ascii_case(game_id))
}

/// True when two option texts are equal or one contains the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    a.is_empty() || b.is_empty() || a.contains(&b) || b.contains(&a)
}

/// Stable tone for a session and slot name.
pub fn session_tone(session_id: &str, slot_name: &str) -> &'static str {
    // FNV-1a, stable across runs and platforms
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in session_id.bytes().chain(slot_name.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    REPLY_TONES[(hash % REPLY_TONES.len() as u64) as usize]
}
