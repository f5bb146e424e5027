//! Durable storage for the knowledge snapshot.
//!
//! One fixed versioned key addresses the whole snapshot. The on-disk form is
//! a single pretty-printed JSON document: assignments as key→name pairs and
//! exclusions as key→name-list pairs.

use crate::error::Result;
use crate::types::{IdentityKey, Name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Serialized form of the knowledge base
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    #[serde(default)]
    pub assignment: BTreeMap<IdentityKey, Name>,

    #[serde(default)]
    pub excluded: BTreeMap<IdentityKey, BTreeSet<Name>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl KnowledgeSnapshot {
    /// Same knowledge, ignoring when it was saved
    pub fn same_knowledge(&self, other: &KnowledgeSnapshot) -> bool {
        self.assignment == other.assignment && self.excluded == other.excluded
    }
}

/// Persistence backend for the knowledge base
pub trait KnowledgeStore: Send {
    /// `Ok(None)` when nothing has been stored under the key yet
    fn load(&self) -> Result<Option<KnowledgeSnapshot>>;

    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<()>;

    /// Remove the stored record entirely
    fn clear(&self) -> Result<()>;

    /// Human-readable location, for logs and the CLI
    fn describe(&self) -> String;
}

/// Snapshot stored as `<data_dir>/<key>.json`
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl AsRef<Path>, key: &str) -> Self {
        let path = data_dir.as_ref().join(format!("{}.json", key));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KnowledgeStore for JsonFileStore {
    fn load(&self) -> Result<Option<KnowledgeSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;

        // Write-then-rename so a crash never leaves a truncated snapshot
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process store holding the raw serialized text.
///
/// Clones share the same slot, so a test can keep one handle and hand the
/// other to a knowledge base.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from arbitrary stored text, valid or not
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|s| s.clone())
    }
}

impl KnowledgeStore for MemoryStore {
    fn load(&self) -> Result<Option<KnowledgeSnapshot>> {
        match self.raw() {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(raw);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
