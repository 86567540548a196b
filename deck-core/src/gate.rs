//! The quality gate every rendered card passes before it is shown.
//!
//! Checks run cheapest first and stop at the first failure:
//! word count, leftover placeholders, repetition, banned content, the
//! logistic model, slot-pair compatibility, A/B option sanity, humor.

use crate::blueprint::{Blueprint, OptionProvider};
use crate::compat::CompatibilityModel;
use crate::config::GeneratorRules;
use crate::filler::{word_count, FilledSlots, SlotFill};
use crate::humor::{HumorScore, HumorScorer};
use crate::options;
use std::collections::HashMap;
use thiserror::Error;

/// Why a candidate was turned away.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("word count {words} outside {min}..={max}")]
    WordCount { words: usize, min: usize, max: usize },
    #[error("unfilled placeholder in text")]
    Placeholder,
    #[error("repetition ratio {ratio:.2} above {max:.2}")]
    Repetition { ratio: f64, max: f64 },
    #[error("banned token: {0}")]
    BannedToken(String),
    #[error("banned phrase: {0}")]
    BannedPhrase(String),
    #[error("logistic score {probability:.3} below {threshold:.3}")]
    LogisticModel { probability: f64, threshold: f64 },
    #[error("pair score {0:.2} below zero")]
    PairScore(f64),
    #[error("A/B options overlap: {0}")]
    IdenticalOptions(String),
    #[error("A/B options share slot type {0}")]
    SameOptionType(String),
    #[error("humor score {score:.2} below {threshold:.2}")]
    Humor { score: f64, threshold: f64 },
}

impl Rejection {
    /// Short stable label for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::WordCount { .. } => "word_count",
            Rejection::Placeholder => "placeholder",
            Rejection::Repetition { .. } => "repetition",
            Rejection::BannedToken(_) => "banned_token",
            Rejection::BannedPhrase(_) => "banned_phrase",
            Rejection::LogisticModel { .. } => "logistic",
            Rejection::PairScore(_) => "pair_score",
            Rejection::IdenticalOptions(_) => "identical_options",
            Rejection::SameOptionType(_) => "same_option_type",
            Rejection::Humor { .. } => "humor",
        }
    }
}

/// Outcome of [`QualityGate::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    /// Diagnostic features, also fed to the logistic model.
    pub features: Vec<String>,
    pub pair_score: f64,
    pub humor: Option<HumorScore>,
    pub rejection: Option<Rejection>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.rejection.is_none()
    }

    fn reject(mut self, reason: Rejection) -> Self {
        self.rejection = Some(reason);
        self
    }
}

pub struct QualityGate<'a> {
    rules: &'a GeneratorRules,
    model: &'a CompatibilityModel,
}

impl<'a> QualityGate<'a> {
    pub fn new(rules: &'a GeneratorRules, model: &'a CompatibilityModel) -> Self {
        Self { rules, model }
    }

    pub fn evaluate(&self, text: &str, blueprint: &Blueprint, slots: &FilledSlots) -> GateVerdict {
        let mut verdict = GateVerdict {
            features: Vec::new(),
            pair_score: 0.0,
            humor: None,
            rejection: None,
        };

        let max = self.rules.word_limit(blueprint.constraints.max_words);
        if let Err(reason) = self.check_text(text, max) {
            return verdict.reject(reason);
        }
        let words = word_count(text);
        let ratio = repetition_ratio(text);

        let slot_types = slots.slot_types();
        verdict.features.push(format!("blueprint:{}", blueprint.id));
        verdict
            .features
            .extend(slot_types.iter().map(|t| format!("slot:{}", t)));
        if ratio > self.rules.soft_repetition_threshold() {
            verdict.features.push("repetition:high".to_string());
        }
        if words as f64 > self.rules.near_word_limit(max) {
            verdict.features.push("wordcount:over".to_string());
        }
        if let Some(logistic) = &self.model.logistic {
            let probability = logistic.probability(&verdict.features);
            if probability < logistic.threshold {
                return verdict.reject(Rejection::LogisticModel {
                    probability,
                    threshold: logistic.threshold,
                });
            }
        }

        verdict.pair_score = self.model.matrix.aggregate(&slot_types);
        if verdict.pair_score < 0.0 {
            let score = verdict.pair_score;
            return verdict.reject(Rejection::PairScore(score));
        }

        if let Some(reason) = self.check_ab_options(blueprint, slots) {
            return verdict.reject(reason);
        }

        if self.rules.enable_humor_scoring {
            let humor = HumorScorer::new(&self.model.matrix).score(text, blueprint, slots);
            verdict.humor = Some(humor);
            if humor.overall < self.rules.humor_threshold {
                return verdict.reject(Rejection::Humor {
                    score: humor.overall,
                    threshold: self.rules.humor_threshold,
                });
            }
        }

        verdict
    }

    /// Checks that depend only on the text: word bounds, placeholders,
    /// repetition and banned content. Rewrites of accepted cards go
    /// through these again.
    pub fn check_text(&self, text: &str, max_words: usize) -> Result<(), Rejection> {
        let words = word_count(text);
        let min = self.rules.min_words();
        if words < min || words > max_words {
            return Err(Rejection::WordCount {
                words,
                min,
                max: max_words,
            });
        }

        if text.contains('{') || text.contains('}') {
            return Err(Rejection::Placeholder);
        }

        let ratio = repetition_ratio(text);
        if ratio > self.rules.max_repetition_ratio {
            return Err(Rejection::Repetition {
                ratio,
                max: self.rules.max_repetition_ratio,
            });
        }

        if let Some(token) = self.model.banned.banned_token(text) {
            return Err(Rejection::BannedToken(token.to_string()));
        }
        if let Some(phrase) = self.model.banned.banned_phrase(text) {
            return Err(Rejection::BannedPhrase(phrase.to_string()));
        }
        Ok(())
    }

    /// The two slots that become A/B options, if the card has any.
    fn ab_pair<'s>(&self, blueprint: &Blueprint, slots: &'s FilledSlots) -> Option<(&'s SlotFill, &'s SlotFill)> {
        match &blueprint.option_provider {
            Some(provider @ OptionProvider::Ab { .. }) => {
                let (a, b) = provider.ab_slots()?;
                Some((slots.get(a)?, slots.get(b)?))
            }
            Some(OptionProvider::JudgePick)
            | Some(OptionProvider::Rating)
            | Some(OptionProvider::OverUnder)
            | Some(OptionProvider::None)
            | None
                if options::slot_backed_ab_game(&blueprint.game) =>
            {
                if let (Some(a), Some(b)) = (slots.get("a"), slots.get("b")) {
                    return Some((a, b));
                }
                let mut iter = slots.iter();
                Some((iter.next()?, iter.next()?))
            }
            _ => None,
        }
    }

    fn check_ab_options(&self, blueprint: &Blueprint, slots: &FilledSlots) -> Option<Rejection> {
        let (a, b) = self.ab_pair(blueprint, slots)?;
        if options::overlaps(&a.text, &b.text) {
            return Some(Rejection::IdenticalOptions(a.text.clone()));
        }
        if self.rules.is_contrast_game(&blueprint.game) && a.slot_type == b.slot_type {
            return Some(Rejection::SameOptionType(a.slot_type.clone()));
        }
        None
    }
}

/// Share of the text taken by its most frequent word.
pub fn repetition_ratio(text: &str) -> f64 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0;
    for word in text.split_whitespace() {
        *counts.entry(word.to_lowercase()).or_insert(0) += 1;
        total += 1;
    }
    match counts.values().max() {
        Some(top) if total > 0 => *top as f64 / total as f64,
        _ => 0.0,
    }
}
