//! Facematch: learn to match face pictures to names in a multiple-choice quiz.
//!
//! Every presented picture is reduced to an [`IdentityKey`]. A persistent
//! [`KnowledgeBase`] keeps confirmed key-to-name assignments (a partial
//! bijection) and per-key sets of names known to be wrong. Each revealed
//! answer is learned from, and its name is eliminated for every other key.
//!
//! The engine is host-agnostic: the page is reached only through the traits
//! in [`host`], and [`sim::SimulatedQuiz`] provides an in-process quiz.

pub mod config;
pub mod controller;
pub mod error;
pub mod hasher;
pub mod host;
pub mod knowledge;
pub mod policy;
pub mod propagate;
pub mod session;
pub mod sim;
pub mod stats;
pub mod store;
pub mod types;

pub use config::Config;
pub use controller::{RoundController, RoundEvent, RoundState};
pub use error::{FaceMatchError, Result};
pub use hasher::IdentityHasher;
pub use host::{CandidateSurface, Host, ImageLoader, OutcomeSurface, PresentationSource};
pub use knowledge::{KnowledgeBase, LearnOutcome};
pub use policy::GuessPolicy;
pub use session::Session;
pub use sim::{LocatorStyle, SimConfig, SimReport, SimulatedQuiz};
pub use stats::{DebugReport, ProgressReport, SessionStats, StatsReport};
pub use store::{JsonFileStore, KnowledgeSnapshot, KnowledgeStore, MemoryStore};
pub use types::{Candidate, Guess, GuessMethod, IdentityKey, Mode, Name};
