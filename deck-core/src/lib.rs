//! Prompt card generation for party games.
//!
//! This crate provides:
//! - Template blueprints filled from tone/spice-aware lexicon pools
//! - A quality gate with compatibility, banned-content and humor checks
//! - Thompson-sampled template selection that learns from player ratings
//! - A fallback cascade (generator, gold bank, safe card) that always yields a card
//! - Optional paraphrasing through a text-completion service
//!
//! # Quick Start
//!
//! ```ignore
//! use deck_core::{ContentEngine, ContentPack, EngineConfig, GenerationRequest, Rating};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pack = ContentPack::load_json("assets/demo_pack.json").await?;
//!     let engine = ContentEngine::from_pack(EngineConfig::new(), &pack)?;
//!
//!     let request = GenerationRequest::new("living-room")
//!         .for_game("ROAST_CONSENSUS")
//!         .with_players(["Alice", "Bob", "Cam"]);
//!     let result = engine.next(&request);
//!     println!("{}", result.card.text);
//!
//!     engine.record_rating(&result.card.id, Rating::Lol);
//!     Ok(())
//! }
//! ```

pub mod augment;
pub mod bandit;
pub mod banlist;
pub mod blueprint;
pub mod buffer;
pub mod compat;
pub mod config;
pub mod engine;
pub mod fallback;
pub mod feedback;
pub mod filler;
pub mod games;
pub mod gate;
pub mod generator;
pub mod gold;
pub mod humor;
pub mod lexicon;
pub mod options;
pub mod persist;
pub mod testing;

// Primary public API
pub use augment::{Augmentor, CompletionConfig, CompletionError, TextCompletion};
pub use bandit::{ContextualSelector, PriorStats, SelectionContext};
pub use banlist::{Banlist, CardLabBanlist};
pub use blueprint::{Blueprint, BlueprintCatalog, InMemoryCatalog};
pub use buffer::{BufferStats, CardBuffer};
pub use config::{EngineConfig, EpsilonSchedule, GeneratorRules, LearningConfig, SelectionMode};
pub use engine::ContentEngine;
pub use feedback::Rating;
pub use games::InteractionType;
pub use generator::{CardSource, FilledCard, GenerationRequest, GenerationResult};
pub use gold::{GoldBank, GoldCard, StaticGoldBank};
pub use lexicon::{InMemoryLexicon, LexiconEntry, LexiconStore, Tone};
pub use options::GameOptions;
pub use persist::{ContentPack, JsonPriorStore, PersistError, PriorStore};
pub use testing::{MockCompleter, TestHarness};
