//! Session counters and report views.
//!
//! Counters are observational only; nothing in the policy reads them.

use crate::knowledge::KnowledgeBase;
use crate::types::{IdentityKey, Mode, Name};
use serde::{Deserialize, Serialize};

/// Per-session counters, reset on every mode switch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub rounds: u64,
    pub attempts: u64,
    pub correct: u64,
    pub new_people: u64,
    pub timeouts: u64,
    /// Rounds where every candidate had been eliminated
    pub anomalies: u64,
}

impl SessionStats {
    /// Percentage of attempts answered correctly, `None` before the first attempt
    pub fn accuracy(&self) -> Option<f64> {
        if self.attempts == 0 {
            None
        } else {
            Some(self.correct as f64 / self.attempts as f64 * 100.0)
        }
    }
}

/// Answer to `stats()` on the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub people: usize,
    pub negatives: usize,
    pub average_negatives: f64,
    /// Percent, `None` before the first attempt
    pub accuracy: Option<f64>,
    pub session: SessionStats,
}

impl StatsReport {
    pub fn new(kb: &KnowledgeBase, session: &SessionStats) -> Self {
        Self {
            people: kb.people(),
            negatives: kb.total_negatives(),
            average_negatives: kb.average_negatives(),
            accuracy: session.accuracy(),
            session: session.clone(),
        }
    }

    pub fn accuracy_label(&self) -> String {
        format_accuracy(self.accuracy)
    }
}

/// Answer to `progress()` on the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub people: usize,
    /// Name guessed by the round still awaiting its outcome
    pub pending_guess: Option<Name>,
    /// Most recent assignments learned this session, oldest first
    pub recent: Vec<(IdentityKey, Name)>,
}

/// Answer to `debug()` on the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugReport {
    pub mode: Mode,
    pub state: String,
    pub hash_cache_size: usize,
    pub recent_hashes: Vec<(String, IdentityKey)>,
    pub current_source: Option<String>,
    pub pending: bool,
    pub push_notifications: bool,
}

pub fn format_accuracy(accuracy: Option<f64>) -> String {
    match accuracy {
        Some(pct) => format!("{:.1}%", pct),
        None => "N/A".to_string(),
    }
}
