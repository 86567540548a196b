//! Prior snapshots and content pack decoding.
//!
//! Learned priors are saved as a versioned JSON snapshot. A content pack is
//! one JSON document holding everything the engine loads up front:
//! blueprints, lexicons, pairings, banned content, the logistic model,
//! rules, seed priors and gold cards.

use crate::banlist::CardLabBanlist;
use crate::bandit::PriorStats;
use crate::blueprint::{Blueprint, BlueprintError, InMemoryCatalog};
use crate::compat::{BannedContent, CompatibilityMatrix, CompatibilityModel, LogisticModel};
use crate::config::GeneratorRules;
use crate::gold::{GoldCard, StaticGoldBank};
use crate::lexicon::{InMemoryLexicon, LexiconEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Invalid blueprint: {0}")]
    Blueprint(#[from] BlueprintError),

    #[error("Invalid banned token pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Current prior snapshot version.
pub const PRIORS_VERSION: u32 = 1;

/// Current content pack version.
pub const PACK_VERSION: u32 = 1;

// ============================================================================
// Priors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPriors {
    pub version: u32,
    /// Seconds since the Unix epoch.
    pub saved_at: String,
    pub priors: HashMap<String, PriorStats>,
}

impl SavedPriors {
    pub fn new(priors: HashMap<String, PriorStats>) -> Self {
        Self {
            version: PRIORS_VERSION,
            saved_at: unix_now(),
            priors,
        }
    }

    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;
        if saved.version != PRIORS_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: PRIORS_VERSION,
                found: saved.version,
            });
        }
        Ok(saved)
    }
}

fn unix_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}

/// Where learned priors live between sessions.
pub trait PriorStore: Send + Sync {
    fn load_priors(&self) -> HashMap<String, PriorStats>;

    /// Record new parameters for one id. May complete after returning.
    fn persist(&self, id: &str, stats: PriorStats);
}

/// Priors kept only in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPriorStore {
    priors: Arc<Mutex<HashMap<String, PriorStats>>>,
}

impl MemoryPriorStore {
    pub fn new(priors: HashMap<String, PriorStats>) -> Self {
        Self {
            priors: Arc::new(Mutex::new(priors)),
        }
    }
}

impl PriorStore for MemoryPriorStore {
    fn load_priors(&self) -> HashMap<String, PriorStats> {
        self.priors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn persist(&self, id: &str, stats: PriorStats) {
        self.priors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), stats);
    }
}

/// Priors mirrored to a JSON snapshot on disk.
///
/// `persist` updates the in-memory copy at once and, inside a tokio
/// runtime, schedules a background [`flush`](Self::flush). Outside a
/// runtime the write waits for the next explicit flush.
#[derive(Debug, Clone)]
pub struct JsonPriorStore {
    path: PathBuf,
    snapshot: Arc<Mutex<HashMap<String, PriorStats>>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonPriorStore {
    /// Open a store, reading the snapshot when the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let priors = if fs::try_exists(&path).await? {
            SavedPriors::load_json(&path).await?.priors
        } else {
            debug!(path = %path.display(), "no prior snapshot yet");
            HashMap::new()
        };
        Ok(Self {
            path,
            snapshot: Arc::new(Mutex::new(priors)),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current snapshot to disk.
    pub async fn flush(&self) -> Result<(), PersistError> {
        let _guard = self.write_lock.lock().await;
        let saved = SavedPriors::new(self.load_priors());
        let tmp = self.path.with_extension("json.tmp");
        saved.save_json(&tmp).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn snapshot(&self) -> std::sync::MutexGuard<'_, HashMap<String, PriorStats>> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PriorStore for JsonPriorStore {
    fn load_priors(&self) -> HashMap<String, PriorStats> {
        self.snapshot().clone()
    }

    fn persist(&self, id: &str, stats: PriorStats) {
        self.snapshot().insert(id.to_string(), stats);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.clone();
            handle.spawn(async move {
                if let Err(err) = store.flush().await {
                    warn!(path = %store.path.display(), error = %err, "failed to persist priors");
                }
            });
        }
    }
}

// ============================================================================
// Content packs
// ============================================================================

/// Slot-type pairings as stored in a pack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pairings {
    /// `from -> to -> score`.
    pub scores: HashMap<String, HashMap<String, f64>>,
    pub forbidden: Vec<(String, String)>,
    pub domains: HashMap<String, Vec<String>>,
}

impl Pairings {
    pub fn to_matrix(&self) -> CompatibilityMatrix {
        let mut matrix = CompatibilityMatrix::new();
        for (from, row) in &self.scores {
            for (to, score) in row {
                matrix.set(from.clone(), to.clone(), *score);
            }
        }
        for (a, b) in &self.forbidden {
            matrix.forbid(a.clone(), b.clone());
        }
        for (domain, slot_types) in &self.domains {
            matrix.set_domain(domain.clone(), slot_types.iter().cloned());
        }
        matrix
    }
}

fn default_pack_version() -> u32 {
    PACK_VERSION
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPack {
    #[serde(default = "default_pack_version")]
    pub version: u32,
    pub blueprints: Vec<Blueprint>,
    /// Slot type to entries.
    pub lexicons: HashMap<String, Vec<LexiconEntry>>,
    pub pairings: Pairings,
    pub banned_tokens: Vec<String>,
    pub banned_phrases: Vec<String>,
    pub logistic: Option<LogisticModel>,
    pub rules: GeneratorRules,
    pub priors: HashMap<String, PriorStats>,
    pub gold: Vec<GoldCard>,
    pub banlist: CardLabBanlist,
}

impl ContentPack {
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let pack: Self = serde_json::from_str(content)?;
        if pack.version != PACK_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: PACK_VERSION,
                found: pack.version,
            });
        }
        Ok(pack)
    }

    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    pub fn lexicon(&self) -> InMemoryLexicon {
        self.lexicons
            .iter()
            .fold(InMemoryLexicon::new(), |lexicon, (slot_type, entries)| {
                lexicon.with_pool(slot_type.clone(), entries.clone())
            })
    }

    /// Every blueprint, validated.
    pub fn catalog(&self) -> Result<InMemoryCatalog, PersistError> {
        for blueprint in &self.blueprints {
            blueprint.validate()?;
        }
        Ok(self.blueprints.iter().cloned().collect())
    }

    pub fn compatibility(&self) -> Result<CompatibilityModel, PersistError> {
        let banned = BannedContent::new(&self.banned_tokens, &self.banned_phrases)?;
        let model = CompatibilityModel::new(self.pairings.to_matrix()).with_banned(banned);
        Ok(match &self.logistic {
            Some(logistic) => model.with_logistic(logistic.clone()),
            None => model,
        })
    }

    pub fn gold_bank(&self) -> StaticGoldBank {
        self.gold.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PACK: &str = r#"{
        "version": 1,
        "blueprints": [
            {
                "id": "roast_1",
                "game": "ROAST_CONSENSUS",
                "family": "roast",
                "blueprint": [
                    {"type": "text", "value": "Who would "},
                    {"type": "slot", "name": "act", "slot_type": "chore"},
                    {"type": "text", "value": " at midnight?"}
                ]
            }
        ],
        "lexicons": {"chore": [{"text": "fold laundry"}]},
        "pairings": {"scores": {"chore": {"place": 0.5}}, "forbidden": [["chore", "crime"]]},
        "banned_tokens": ["heck"],
        "rules": {"max_attempts": 5},
        "priors": {"roast_1": {"alpha": 3.0, "beta": 1.0}},
        "gold": [{"id": "g1", "game": "ROAST_CONSENSUS", "text": "Who snores loudest?"}]
    }"#;

    #[test]
    fn test_decode_pack() {
        let pack = ContentPack::from_json(PACK).unwrap();
        assert_eq!(pack.rules.max_attempts, 5);
        assert_eq!(pack.rules.min_word_count, GeneratorRules::default().min_word_count);
        assert_eq!(pack.catalog().unwrap().len(), 1);
        assert_eq!(pack.lexicon().len(), 1);
        assert_eq!(pack.gold_bank().len(), 1);

        let model = pack.compatibility().unwrap();
        assert!(model.banned.contains_banned("what the HECK"));
        assert_eq!(model.matrix.pair("chore", "place"), 0.5);
        assert!(model.matrix.is_forbidden("crime", "chore"));
        assert_eq!(pack.priors["roast_1"].alpha, 3.0);
    }

    #[test]
    fn test_pack_version_mismatch() {
        let err = ContentPack::from_json(r#"{"version": 9}"#).unwrap_err();
        assert!(matches!(err, PersistError::VersionMismatch { expected: 1, found: 9 }));
    }

    #[tokio::test]
    async fn test_saved_priors_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("priors.json");
        let mut priors = HashMap::new();
        priors.insert("a".to_string(), PriorStats::new(2.0, 5.0));
        SavedPriors::new(priors.clone()).save_json(&path).await.unwrap();

        let loaded = SavedPriors::load_json(&path).await.unwrap();
        assert_eq!(loaded.version, PRIORS_VERSION);
        assert_eq!(loaded.priors, priors);
    }

    #[tokio::test]
    async fn test_json_store_flush_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("priors.json");

        let store = JsonPriorStore::open(&path).await.unwrap();
        assert!(store.load_priors().is_empty());
        store.persist("bp", PriorStats::new(4.0, 2.0));
        store.flush().await.unwrap();

        let reopened = JsonPriorStore::open(&path).await.unwrap();
        assert_eq!(reopened.load_priors()["bp"], PriorStats::new(4.0, 2.0));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryPriorStore::default();
        store.persist("x", PriorStats::new(1.5, 1.0));
        assert_eq!(store.load_priors()["x"].alpha, 1.5);
    }
}
