//! Slot-type compatibility, banned content, and the logistic acceptance model.
//!
//! These artifacts are only read by the quality gate and the humor scorer.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Score given to a pair listed as forbidden.
pub const FORBIDDEN_PAIR_PENALTY: f64 = -10.0;

/// Directed compatibility scores between slot types.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityMatrix {
    pairwise: HashMap<String, HashMap<String, f64>>,
    forbidden: HashSet<(String, String)>,
    domains: HashMap<String, HashSet<String>>,
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the score for `from` followed by `to`.
    pub fn set(&mut self, from: impl Into<String>, to: impl Into<String>, score: f64) {
        self.pairwise
            .entry(from.into())
            .or_default()
            .insert(to.into(), score);
    }

    pub fn with_pair(mut self, from: &str, to: &str, score: f64) -> Self {
        self.set(from, to, score);
        self
    }

    /// Forbid two slot types from sharing a card, in either order.
    pub fn forbid(&mut self, a: impl Into<String>, b: impl Into<String>) {
        let (a, b) = (a.into(), b.into());
        self.forbidden.insert((b.clone(), a.clone()));
        self.forbidden.insert((a, b));
    }

    /// Register the slot types belonging to a named domain.
    pub fn set_domain<I, S>(&mut self, domain: impl Into<String>, slot_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains
            .insert(domain.into(), slot_types.into_iter().map(Into::into).collect());
    }

    pub fn domain(&self, domain: &str) -> Option<&HashSet<String>> {
        self.domains.get(domain)
    }

    pub fn is_forbidden(&self, a: &str, b: &str) -> bool {
        self.forbidden.contains(&(a.to_string(), b.to_string()))
    }

    /// Directed score, zero when unlisted.
    pub fn score(&self, from: &str, to: &str) -> f64 {
        self.pairwise
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(0.0)
    }

    /// Forward plus backward score for an unordered pair.
    pub fn pair(&self, a: &str, b: &str) -> f64 {
        if self.is_forbidden(a, b) {
            return FORBIDDEN_PAIR_PENALTY;
        }
        self.score(a, b) + self.score(b, a)
    }

    /// Sum of pair scores over all slot pairs with different types.
    pub fn aggregate(&self, slot_types: &[&str]) -> f64 {
        let mut total = 0.0;
        for i in 0..slot_types.len() {
            for j in (i + 1)..slot_types.len() {
                if slot_types[i] == slot_types[j] {
                    continue;
                }
                total += self.pair(slot_types[i], slot_types[j]);
            }
        }
        total
    }
}

/// Words and phrases no card may contain.
#[derive(Debug, Clone, Default)]
pub struct BannedContent {
    tokens: Vec<(String, Regex)>,
    phrases: Vec<String>,
}

impl BannedContent {
    /// Tokens match on word boundaries; phrases match as substrings. Both ignore case.
    pub fn new<T, P>(tokens: T, phrases: P) -> Result<Self, regex::Error>
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .filter(|t| !t.as_ref().trim().is_empty())
            .map(|t| {
                let token = t.as_ref().trim().to_string();
                let pattern = format!(r"\b{}\b", regex::escape(&token));
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (token, re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(Self { tokens, phrases })
    }

    pub fn banned_token(&self, text: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(token, _)| token.as_str())
    }

    pub fn banned_phrase(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.phrases
            .iter()
            .find(|p| lower.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn contains_banned(&self, text: &str) -> bool {
        self.banned_token(text).is_some() || self.banned_phrase(text).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.phrases.is_empty()
    }
}

/// Logistic acceptance model over string features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    /// Feature weights; the `bias` key is the intercept.
    #[serde(alias = "features")]
    pub weights: HashMap<String, f64>,
    pub threshold: f64,
}

impl LogisticModel {
    pub fn new(threshold: f64) -> Self {
        Self {
            weights: HashMap::new(),
            threshold,
        }
    }

    pub fn with_weight(mut self, feature: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(feature.into(), weight);
        self
    }

    pub fn probability<S: AsRef<str>>(&self, features: &[S]) -> f64 {
        let bias = self.weights.get("bias").copied().unwrap_or(0.0);
        let sum: f64 = features
            .iter()
            .filter_map(|f| self.weights.get(f.as_ref()))
            .sum();
        sigmoid(bias + sum)
    }

    pub fn accepts<S: AsRef<str>>(&self, features: &[S]) -> bool {
        self.probability(features) >= self.threshold
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Everything the gate needs besides the rules.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityModel {
    pub matrix: CompatibilityMatrix,
    pub banned: BannedContent,
    pub logistic: Option<LogisticModel>,
}

impl CompatibilityModel {
    pub fn new(matrix: CompatibilityMatrix) -> Self {
        Self {
            matrix,
            ..Self::default()
        }
    }

    pub fn with_banned(mut self, banned: BannedContent) -> Self {
        self.banned = banned;
        self
    }

    pub fn with_logistic(mut self, model: LogisticModel) -> Self {
        self.logistic = Some(model);
        self
    }
}
