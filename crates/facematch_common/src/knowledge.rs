//! Knowledge base: confirmed identities and known-wrong names.
//!
//! Holds two maps keyed by [`IdentityKey`]:
//!
//! - `assignment`: the confirmed name for a key
//! - `excluded`: names proven wrong for a key
//!
//! Two invariants hold after every [`KnowledgeBase::record_outcome`]:
//!
//! - a name is assigned to at most one key
//! - a name assigned to one key is excluded for every other tracked key
//!
//! The base grows monotonically. The only removals are [`KnowledgeBase::reset`]
//! and dropping a stale assignment when its name is confirmed for another key.

use crate::store::{KnowledgeSnapshot, KnowledgeStore};
use crate::types::{IdentityKey, Name};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// What a single [`KnowledgeBase::record_outcome`] changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnOutcome {
    /// The key had no confirmed name before
    pub new_person: bool,
    /// Previous name when the key was reassigned to a different one
    pub corrected_from: Option<Name>,
    /// Another key that held this name and lost it
    pub displaced_key: Option<IdentityKey>,
    /// Exclusions added for the recorded key
    pub exclusions_added: usize,
    /// Exclusions added to other keys by propagation
    pub propagated: usize,
}

/// The learned mapping between image identities and names
pub struct KnowledgeBase {
    pub(crate) assignment: HashMap<IdentityKey, Name>,
    /// Reverse index of `assignment`
    pub(crate) claimed: HashMap<Name, IdentityKey>,
    pub(crate) excluded: HashMap<IdentityKey, BTreeSet<Name>>,
    store: Option<Box<dyn KnowledgeStore>>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("people", &self.assignment.len())
            .field("tracked", &self.tracked_len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl KnowledgeBase {
    /// Empty, in-memory only
    pub fn new() -> Self {
        Self {
            assignment: HashMap::new(),
            claimed: HashMap::new(),
            excluded: HashMap::new(),
            store: None,
        }
    }

    /// Restore from `store`, starting empty when it is absent or unreadable
    pub fn open(store: Box<dyn KnowledgeStore>) -> Self {
        let mut kb = match store.load() {
            Ok(Some(snapshot)) => Self::from_snapshot(snapshot),
            Ok(None) => {
                debug!("No stored knowledge at {}", store.describe());
                Self::new()
            }
            Err(e) => {
                warn!(
                    "Stored knowledge at {} is unreadable, starting empty: {}",
                    store.describe(),
                    e
                );
                Self::new()
            }
        };
        info!(
            "Knowledge loaded: {} people, {} negative associations",
            kb.people(),
            kb.total_negatives()
        );
        kb.store = Some(store);
        kb
    }

    /// Rebuild from a snapshot.
    ///
    /// Snapshots written by older builds may assign one name to several
    /// keys; the lexicographically first key keeps it.
    pub fn from_snapshot(snapshot: KnowledgeSnapshot) -> Self {
        let mut kb = Self::new();
        for (key, name) in snapshot.assignment {
            if let Some(holder) = kb.claimed.get(&name) {
                warn!(
                    "Stored name '{}' assigned to both {} and {}; keeping {}",
                    name, holder, key, holder
                );
                continue;
            }
            kb.claimed.insert(name.clone(), key.clone());
            kb.assignment.insert(key, name);
        }
        for (key, names) in snapshot.excluded {
            kb.excluded.insert(key, names);
        }
        kb
    }

    pub fn snapshot(&self) -> KnowledgeSnapshot {
        KnowledgeSnapshot {
            assignment: self
                .assignment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            excluded: self
                .excluded
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            saved_at: Some(Utc::now()),
        }
    }

    /// Confirmed name for `key`
    pub fn lookup(&self, key: &IdentityKey) -> Option<&Name> {
        self.assignment.get(key)
    }

    /// Names proven wrong for `key`
    pub fn exclusions_for(&self, key: &IdentityKey) -> BTreeSet<Name> {
        self.excluded.get(key).cloned().unwrap_or_default()
    }

    /// Whether `name` is the confirmed name of any key
    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed.contains_key(name)
    }

    /// Every name currently assigned to some key
    pub fn claimed_names(&self) -> HashSet<&Name> {
        self.claimed.keys().collect()
    }

    /// Key currently holding `name`
    pub fn holder_of(&self, name: &str) -> Option<&IdentityKey> {
        self.claimed.get(name)
    }

    /// Key appears in either map
    pub fn is_tracked(&self, key: &IdentityKey) -> bool {
        self.assignment.contains_key(key) || self.excluded.contains_key(key)
    }

    pub fn tracked_len(&self) -> usize {
        self.tracked_keys().len()
    }

    pub(crate) fn tracked_keys(&self) -> HashSet<IdentityKey> {
        self.assignment
            .keys()
            .chain(self.excluded.keys())
            .cloned()
            .collect()
    }

    /// Number of confirmed people
    pub fn people(&self) -> usize {
        self.assignment.len()
    }

    /// Sum of all exclusion set sizes
    pub fn total_negatives(&self) -> usize {
        self.excluded.values().map(BTreeSet::len).sum()
    }

    pub fn average_negatives(&self) -> f64 {
        self.total_negatives() as f64 / self.people().max(1) as f64
    }

    /// Assignments sorted by key
    pub fn assignments(&self) -> Vec<(IdentityKey, Name)> {
        let mut pairs: Vec<_> = self
            .assignment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Learn from a revealed answer.
    ///
    /// `presented` is every name that was on offer this round; all of them
    /// except `confirmed` become exclusions for `key`. Recording the same
    /// outcome twice leaves the base unchanged after the first call.
    pub fn record_outcome(
        &mut self,
        key: &IdentityKey,
        presented: &[Name],
        confirmed: &str,
    ) -> LearnOutcome {
        let previous = self.assignment.get(key).cloned();
        let corrected_from = previous.clone().filter(|p| p != confirmed);

        if let Some(old) = &corrected_from {
            warn!(
                "Reinforcement conflict for {}: was '{}', now '{}'",
                key, old, confirmed
            );
            if self.claimed.get(old) == Some(key) {
                self.claimed.remove(old);
            }
        }

        let displaced_key = match self.claimed.get(confirmed) {
            Some(holder) if holder != key => {
                let holder = holder.clone();
                warn!(
                    "'{}' confirmed for {} but was assigned to {}; dropping the old assignment",
                    confirmed, key, holder
                );
                self.assignment.remove(&holder);
                self.claimed.remove(confirmed);
                Some(holder)
            }
            _ => None,
        };

        // A first-seen key inherits every name already claimed elsewhere
        if !self.is_tracked(key) {
            let inherited: BTreeSet<Name> = self.claimed.keys().cloned().collect();
            if !inherited.is_empty() {
                debug!("Seeding {} with {} claimed names", key, inherited.len());
            }
            self.excluded.insert(key.clone(), inherited);
        }

        self.assignment.insert(key.clone(), confirmed.to_string());
        self.claimed.insert(confirmed.to_string(), key.clone());

        let exclusions = self.excluded.entry(key.clone()).or_default();
        let before = exclusions.len();
        for name in presented {
            if name != confirmed {
                exclusions.insert(name.clone());
            }
        }
        let exclusions_added = exclusions.len() - before;

        let propagated = self.propagate(confirmed, key);

        if previous.is_none() {
            info!("New person learned: {} -> {}", confirmed, key);
        } else if corrected_from.is_none() {
            debug!("Reinforced: {} (already known)", confirmed);
        }

        self.persist();

        LearnOutcome {
            new_person: previous.is_none(),
            corrected_from,
            displaced_key,
            exclusions_added,
            propagated,
        }
    }

    /// Forget everything, including the stored record
    pub fn reset(&mut self) {
        self.assignment.clear();
        self.claimed.clear();
        self.excluded.clear();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!("Failed to clear stored knowledge: {}", e);
            }
        }
        info!("Knowledge base cleared");
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.snapshot()) {
            warn!("Failed to persist knowledge to {}: {}", store.describe(), e);
        }
    }
}
