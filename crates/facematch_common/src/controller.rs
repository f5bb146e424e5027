//! Round controller: one presentation-guess-outcome cycle at a time.
//!
//! ```text
//! IDLE -> DETECTED -> HASHING -> AWAITING_GUESS -> SUBMITTED -> AWAITING_OUTCOME
//!                                                                 |-> LEARNED -> IDLE
//!                                                                 '-> TIMEOUT -> IDLE
//! ```
//!
//! At most one round is in flight. While a pending-learning record exists,
//! a newly presented image is deferred until the record is learned from or
//! times out. The controller is driven by [`crate::session::Session`] but
//! every step is a plain async method, so tests can drive it directly.

use crate::config::{Config, ReportConfig};
use crate::error::Result;
use crate::hasher::IdentityHasher;
use crate::host::{Host, ImageLoader};
use crate::knowledge::{KnowledgeBase, LearnOutcome};
use crate::policy::GuessPolicy;
use crate::stats::{format_accuracy, DebugReport, ProgressReport, SessionStats, StatsReport};
use crate::store::JsonFileStore;
use crate::types::{Guess, GuessMethod, IdentityKey, Mode, Name};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    Detected,
    Hashing,
    AwaitingGuess,
    Submitted,
    AwaitingOutcome,
    Learned,
    TimedOut,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundState::Idle => "IDLE",
            RoundState::Detected => "DETECTED",
            RoundState::Hashing => "HASHING",
            RoundState::AwaitingGuess => "AWAITING_GUESS",
            RoundState::Submitted => "SUBMITTED",
            RoundState::AwaitingOutcome => "AWAITING_OUTCOME",
            RoundState::Learned => "LEARNED",
            RoundState::TimedOut => "TIMEOUT",
        }
    }
}

/// What a submitted round is waiting to learn
#[derive(Debug, Clone)]
pub struct PendingLearning {
    pub key: IdentityKey,
    pub candidates: Vec<Name>,
    pub guess: Guess,
    pub submitted_at: Instant,
}

/// Result of a single controller step
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    /// Nothing new to do
    Idle,
    /// A new image is up but the previous round is still pending
    Deferred,
    /// A new image is up but no open candidates are visible yet
    NoCandidates,
    /// Guess submitted; the round now waits for the revealed answer
    Submitted { key: IdentityKey, guess: Guess },
    /// Known answer submitted with no outcome wait
    Answered { key: IdentityKey, name: Name },
    /// The surface refused the submission
    SubmitFailed,
    /// Pending round, answer not revealed yet
    Waiting,
    Learned {
        key: IdentityKey,
        confirmed: Name,
        correct: bool,
        outcome: LearnOutcome,
    },
    /// Pending round discarded without learning
    TimedOut { key: IdentityKey },
}

impl RoundEvent {
    /// The pending round is gone and a new one may start
    pub fn clears_round(&self) -> bool {
        matches!(self, RoundEvent::Learned { .. } | RoundEvent::TimedOut { .. })
    }

    /// The image on display was seen but not answered; only a retry will
    /// pick it up again
    pub fn needs_retry(&self) -> bool {
        matches!(self, RoundEvent::NoCandidates | RoundEvent::SubmitFailed)
    }
}

pub struct RoundController {
    kb: KnowledgeBase,
    hasher: IdentityHasher,
    policy: GuessPolicy,
    stats: SessionStats,
    mode: Mode,
    state: RoundState,
    pending: Option<PendingLearning>,
    last_source: Option<String>,
    recent: VecDeque<(IdentityKey, Name)>,
    outcome_timeout: Duration,
    report: ReportConfig,
}

impl RoundController {
    pub fn new(
        kb: KnowledgeBase,
        hasher: IdentityHasher,
        policy: GuessPolicy,
        config: &Config,
    ) -> Self {
        Self {
            kb,
            hasher,
            policy,
            stats: SessionStats::default(),
            mode: config.mode,
            state: RoundState::Idle,
            pending: None,
            last_source: None,
            recent: VecDeque::with_capacity(RECENT_LIMIT),
            outcome_timeout: config.timing.outcome_timeout(),
            report: config.report.clone(),
        }
    }

    /// Controller over the on-disk store named by `config`
    pub fn from_config(config: &Config, loader: Arc<dyn ImageLoader>) -> Result<Self> {
        let store = JsonFileStore::new(config.store.resolved_data_dir(), &config.store.key);
        let kb = KnowledgeBase::open(Box::new(store));
        let hasher = IdentityHasher::new(&config.hasher, loader)?;
        let policy = GuessPolicy::new(config.policy.seed);
        Ok(Self::new(kb, hasher, policy, config))
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn hasher(&self) -> &IdentityHasher {
        &self.hasher
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingLearning> {
        self.pending.as_ref()
    }

    pub fn session_stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Switch mode: discard any pending round and start fresh counters
    pub fn set_mode(&mut self, mode: Mode) {
        info!("Switching to {} mode", mode);
        self.cancel();
        self.mode = mode;
        self.stats = SessionStats::default();
    }

    /// Drop the pending round, if any, without learning from it
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("Discarding pending round for {}", pending.key);
        }
        self.transition(RoundState::Idle);
    }

    /// Wipe learned knowledge, the hash cache and session counters
    pub fn reset_knowledge(&mut self) {
        self.kb.reset();
        self.hasher.clear_cache();
        self.stats = SessionStats::default();
        self.pending = None;
        self.last_source = None;
        self.recent.clear();
        self.transition(RoundState::Idle);
        info!("All data cleared (including hash cache)");
    }

    /// Learning-mode step: start a round if a new image is on display
    pub async fn poll_presentation(&mut self, host: &Host) -> RoundEvent {
        self.detect(host, false).await
    }

    /// Guessing-mode step: react to a presentation change, answering known
    /// images immediately
    pub async fn on_presentation_changed(&mut self, host: &Host) -> RoundEvent {
        self.detect(host, true).await
    }

    async fn detect(&mut self, host: &Host, answer_known_now: bool) -> RoundEvent {
        let Some(locator) = host.presentation.current_image_source().await else {
            return RoundEvent::Idle;
        };
        if self.last_source.as_deref() == Some(locator.as_str()) {
            return RoundEvent::Idle;
        }
        if self.pending.is_some() {
            trace!("New image deferred until the pending round clears");
            return RoundEvent::Deferred;
        }

        self.transition(RoundState::Detected);
        self.transition(RoundState::Hashing);
        let key = self.hasher.hash(&locator).await;

        let open = host.open_candidates().await;
        if open.is_empty() {
            self.transition(RoundState::Idle);
            return RoundEvent::NoCandidates;
        }

        self.transition(RoundState::AwaitingGuess);
        let names: Vec<Name> = open.iter().map(|c| c.name.clone()).collect();
        let Some(guess) = self.policy.choose(&key, &names, &self.kb) else {
            self.transition(RoundState::Idle);
            return RoundEvent::NoCandidates;
        };
        let Some(candidate) = open.iter().find(|c| c.name == guess.name) else {
            self.transition(RoundState::Idle);
            return RoundEvent::NoCandidates;
        };

        if let Err(e) = host.candidates.submit(candidate).await {
            warn!("Submitting '{}' failed: {}", guess.name, e);
            self.transition(RoundState::Idle);
            return RoundEvent::SubmitFailed;
        }
        // Only a submitted image counts as processed; failures retry
        self.last_source = Some(locator);
        self.transition(RoundState::Submitted);

        self.stats.rounds += 1;
        self.stats.attempts += 1;
        if guess.method == GuessMethod::Random {
            self.stats.anomalies += 1;
        }

        if answer_known_now && guess.method == GuessMethod::Known {
            self.stats.correct += 1;
            self.transition(RoundState::Idle);
            self.report_guessing_progress();
            return RoundEvent::Answered {
                key,
                name: guess.name,
            };
        }

        info!(
            "Round {}: hash {} | options [{}] | clicking {} ({})",
            self.stats.rounds,
            key,
            names.join(", "),
            guess.name,
            guess.method
        );
        self.pending = Some(PendingLearning {
            key: key.clone(),
            candidates: names,
            guess: guess.clone(),
            submitted_at: Instant::now(),
        });
        self.transition(RoundState::AwaitingOutcome);
        RoundEvent::Submitted { key, guess }
    }

    /// Check whether the pending round's answer has been revealed
    pub async fn check_outcome(&mut self, host: &Host) -> RoundEvent {
        let Some(pending) = &self.pending else {
            return RoundEvent::Idle;
        };

        if let Some(confirmed) = host.outcome.confirmed_name().await {
            return self.learn(confirmed);
        }

        if pending.submitted_at.elapsed() >= self.outcome_timeout {
            let key = pending.key.clone();
            warn!(
                "No outcome for {} after {:?}; discarding the round",
                key, self.outcome_timeout
            );
            self.pending = None;
            self.stats.timeouts += 1;
            self.transition(RoundState::TimedOut);
            self.transition(RoundState::Idle);
            return RoundEvent::TimedOut { key };
        }

        RoundEvent::Waiting
    }

    fn learn(&mut self, confirmed: Name) -> RoundEvent {
        let Some(pending) = self.pending.take() else {
            return RoundEvent::Idle;
        };
        let correct = pending.guess.name == confirmed;
        if correct {
            self.stats.correct += 1;
        }
        info!(
            "Result: {} | answer was {}",
            if correct { "CORRECT" } else { "WRONG" },
            confirmed
        );

        let outcome = self
            .kb
            .record_outcome(&pending.key, &pending.candidates, &confirmed);
        if outcome.new_person {
            self.stats.new_people += 1;
            if self.recent.len() == RECENT_LIMIT {
                self.recent.pop_front();
            }
            self.recent.push_back((pending.key.clone(), confirmed.clone()));
            info!("Database now has {} people", self.kb.people());
        }
        debug!(
            "Added {} negative associations, {} by propagation",
            outcome.exclusions_added, outcome.propagated
        );
        info!(
            "Learning progress: {} people | session: {} new | accuracy {}",
            self.kb.people(),
            self.stats.new_people,
            format_accuracy(self.stats.accuracy())
        );
        self.report_learning_detail();

        self.transition(RoundState::Learned);
        self.transition(RoundState::Idle);
        RoundEvent::Learned {
            key: pending.key,
            confirmed,
            correct,
            outcome,
        }
    }

    fn report_learning_detail(&self) {
        let every = self.report.detail_every;
        if every == 0 || self.stats.rounds % every != 0 {
            return;
        }
        info!(
            "Detailed progress (round {}): {} people | {} new this session | accuracy {} | {} negatives ({:.1} per person)",
            self.stats.rounds,
            self.kb.people(),
            self.stats.new_people,
            format_accuracy(self.stats.accuracy()),
            self.kb.total_negatives(),
            self.kb.average_negatives()
        );
    }

    fn report_guessing_progress(&self) {
        let every = self.report.guessing_every;
        if every == 0 || self.stats.rounds % every != 0 {
            return;
        }
        info!(
            "GUESSING | round {} | accuracy {} | database {} people",
            self.stats.rounds,
            format_accuracy(self.stats.accuracy()),
            self.kb.people()
        );
    }

    fn transition(&mut self, next: RoundState) {
        if self.state != next {
            trace!("{} -> {}", self.state.as_str(), next.as_str());
            self.state = next;
        }
    }

    pub fn stats_report(&self) -> StatsReport {
        StatsReport::new(&self.kb, &self.stats)
    }

    pub fn progress_report(&self) -> ProgressReport {
        ProgressReport {
            people: self.kb.people(),
            pending_guess: self.pending.as_ref().map(|p| p.guess.name.clone()),
            recent: self.recent.iter().cloned().collect(),
        }
    }

    pub fn debug_report(&self, push_notifications: bool) -> DebugReport {
        DebugReport {
            mode: self.mode,
            state: self.state.as_str().to_string(),
            hash_cache_size: self.hasher.cache_len(),
            recent_hashes: self.hasher.recent_entries(RECENT_LIMIT),
            current_source: self.last_source.clone(),
            pending: self.pending.is_some(),
            push_notifications,
        }
    }
}
