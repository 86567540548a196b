//! Optional paraphrasing of accepted cards through a text-completion
//! service.
//!
//! The service is untrusted: every call runs under a timeout, and any
//! error, timeout or unacceptable output leaves the card unchanged.

use crate::compat::BannedContent;
use crate::filler::word_count;
use crate::generator::FilledCard;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(3);

const SYSTEM_PROMPT: &str =
    "You rewrite party game prompts safely. Respect constraints and stay SFW for spice<=1.";

/// Sampling settings passed to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub seed: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 64,
            temperature: 0.5,
            top_p: 0.9,
            seed: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion returned no text")]
    Empty,
}

/// A text-completion backend, typically an LLM.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        config: &CompletionConfig,
    ) -> Result<String, CompletionError>;

    /// Identifier folded into cache keys.
    fn model_id(&self) -> &str {
        "default"
    }
}

/// Cleans and screens completion output.
#[derive(Debug, Clone, Default)]
pub struct ParaphraseValidator {
    banned: BannedContent,
}

impl ParaphraseValidator {
    pub fn new(banned: BannedContent) -> Self {
        Self { banned }
    }

    /// Collapse whitespace and strip surrounding quotes.
    pub fn sanitize(&self, raw: &str) -> String {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}' | '`'))
            .trim()
            .to_string()
    }

    pub fn accepts(&self, text: &str, max_words: usize, spice: u8) -> bool {
        if text.is_empty() || text.contains('{') || text.contains('}') {
            return false;
        }
        if word_count(text) > max_words {
            return false;
        }
        spice > 1 || !self.banned.contains_banned(text)
    }
}

/// What a paraphrase may do to one card.
#[derive(Debug, Clone, PartialEq)]
pub struct ParaphrasePlan {
    pub allow: bool,
    pub max_words: usize,
    pub spice: u8,
    pub tags: Vec<String>,
}

impl ParaphrasePlan {
    pub fn new(max_words: usize, spice: u8) -> Self {
        Self {
            allow: true,
            max_words,
            spice,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

pub struct Augmentor {
    completer: Arc<dyn TextCompletion>,
    validator: ParaphraseValidator,
    timeout: Duration,
    cache: Mutex<HashMap<String, String>>,
}

impl Augmentor {
    pub fn new(completer: Arc<dyn TextCompletion>, validator: ParaphraseValidator) -> Self {
        Self {
            completer,
            validator,
            timeout: DEFAULT_COMPLETION_TIMEOUT,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Paraphrase `card`, or return it unchanged when the plan forbids it
    /// or the service misbehaves.
    pub async fn maybe_paraphrase(&self, card: &FilledCard, plan: &ParaphrasePlan, seed: u64) -> FilledCard {
        if !plan.allow {
            return card.clone();
        }

        let key = self.cache_key(card, plan, seed);
        if let Some(text) = self.cache.lock().await.get(&key) {
            return paraphrased(card, text.clone());
        }

        let user = format!(
            "Rewrite to be punchy, same meaning, at most {} words.\n\
             Style: social, high-contrast. Keep player names if present.\n\
             Text: \"{}\"\n\
             Return only the rewritten line.",
            plan.max_words, card.text
        );
        let config = CompletionConfig {
            max_tokens: plan.max_words * 2,
            temperature: if plan.spice >= 3 { 0.8 } else { 0.5 },
            top_p: 0.9,
            seed,
        };

        let raw = match tokio::time::timeout(self.timeout, self.completer.complete(SYSTEM_PROMPT, &user, &config)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                warn!(card = %card.id, error = %err, "paraphrase failed");
                return card.clone();
            }
            Err(_) => {
                warn!(card = %card.id, timeout = ?self.timeout, "paraphrase timed out");
                return card.clone();
            }
        };

        let cleaned = self.validator.sanitize(&raw);
        if !self.validator.accepts(&cleaned, plan.max_words, plan.spice) {
            debug!(card = %card.id, "paraphrase rejected");
            return card.clone();
        }
        self.cache.lock().await.insert(key, cleaned.clone());
        paraphrased(card, cleaned)
    }

    fn cache_key(&self, card: &FilledCard, plan: &ParaphrasePlan, seed: u64) -> String {
        let mut hasher = DefaultHasher::new();
        card.text.hash(&mut hasher);
        plan.tags.hash(&mut hasher);
        format!(
            "paraphrase:{}:{}:{:x}:{}",
            self.completer.model_id(),
            card.id,
            hasher.finish(),
            seed
        )
    }
}

fn paraphrased(card: &FilledCard, text: String) -> FilledCard {
    let mut out = card.clone();
    out.metadata
        .insert("original_text".to_string(), Value::String(card.text.clone()));
    out.metadata.insert("paraphrased".to_string(), Value::Bool(true));
    out.text = text;
    out
}
