//! Guess policy: pick an answer from the round's candidates.
//!
//! Decision order, first match wins:
//!
//! 1. `KNOWN`  - the key's confirmed name is on offer
//! 2. `SMART`  - uniform pick among candidates not excluded for the key and
//!    not assigned to any other key
//! 3. `RANDOM` - everything was eliminated; uniform pick from all candidates
//!
//! This is a greedy heuristic. It never backtracks over earlier eliminations
//! and accepts that `RANDOM` guesses may be wrong.

use crate::knowledge::KnowledgeBase;
use crate::types::{Guess, GuessMethod, IdentityKey, Name};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Owns the random source used for `SMART` and `RANDOM` picks
#[derive(Debug)]
pub struct GuessPolicy {
    rng: StdRng,
}

impl GuessPolicy {
    /// Seeded from the given value, or from OS entropy when `None`
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn choose(
        &mut self,
        key: &IdentityKey,
        candidates: &[Name],
        kb: &KnowledgeBase,
    ) -> Option<Guess> {
        choose_with(&mut self.rng, key, candidates, kb)
    }
}

/// Pick a guess using `rng`. `None` only when `candidates` is empty.
pub fn choose_with<R: Rng + ?Sized>(
    rng: &mut R,
    key: &IdentityKey,
    candidates: &[Name],
    kb: &KnowledgeBase,
) -> Option<Guess> {
    if candidates.is_empty() {
        return None;
    }

    if let Some(known) = kb.lookup(key) {
        if candidates.contains(known) {
            return Some(Guess {
                name: known.clone(),
                method: GuessMethod::Known,
            });
        }
        debug!("Known name '{}' for {} is not on offer", known, key);
    }

    let negatives = kb.exclusions_for(key);
    if !negatives.is_empty() {
        debug!("Known wrong for {}: {:?}", key, negatives);
    }

    let remaining: Vec<&Name> = candidates
        .iter()
        .filter(|name| {
            if negatives.contains(*name) {
                return false;
            }
            if kb.is_claimed(name) {
                debug!("{} already assigned to another image", name);
                return false;
            }
            true
        })
        .collect();

    if let Some(pick) = remaining.choose(&mut *rng) {
        debug!("Smart guess from {} remaining options", remaining.len());
        return Some(Guess {
            name: (*pick).clone(),
            method: GuessMethod::Smart,
        });
    }

    warn!(
        "All {} candidates eliminated for {}; falling back to a random guess",
        candidates.len(),
        key
    );
    candidates.choose(rng).map(|pick| Guess {
        name: pick.clone(),
        method: GuessMethod::Random,
    })
}
