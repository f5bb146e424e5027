//! Simulated quiz page.
//!
//! Implements every host surface plus [`ImageLoader`], so a full session can
//! run without a browser. Each person has one fixed picture; every round shows
//! one person with a shuffled set of options and reveals the answer after the
//! first submission, unless the round is configured to stall.

use crate::error::{FaceMatchError, Result};
use crate::hasher::MAX_GRID_SIZE;
use crate::host::{CandidateSurface, ImageLoader, OutcomeSurface, PresentationSource};
use crate::types::{Candidate, Name};
use async_trait::async_trait;
use image::{ImageBuffer, ImageOutputFormat, Rgba};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How the quiz addresses its pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStyle {
    /// `.../questions/<person>/picture`, hashed without loading
    #[default]
    Structural,
    /// A fresh URL per round; only the picture content identifies the person
    Content,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub people: usize,
    /// Options per round, the right answer included
    pub options: usize,
    /// Every n-th round never reveals its answer, 0 for never
    pub stall_every: u64,
    pub style: LocatorStyle,
    /// Must match the hasher grid for content-style keys to line up
    pub grid: u32,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            people: 20,
            options: 4,
            stall_every: 0,
            style: LocatorStyle::Structural,
            grid: 6,
            seed: None,
        }
    }
}

/// What the page saw over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimReport {
    pub rounds_presented: u64,
    pub submissions: u64,
    pub correct: u64,
    pub wrong: u64,
    pub stalled: u64,
}

impl SimReport {
    pub fn accuracy(&self) -> Option<f64> {
        if self.submissions == 0 {
            None
        } else {
            Some(self.correct as f64 / self.submissions as f64 * 100.0)
        }
    }
}

struct Round {
    person: usize,
    options: Vec<usize>,
    answered: Vec<bool>,
    revealed: bool,
    stalled: bool,
    locator: String,
}

struct QuizState {
    rng: StdRng,
    round: Option<Round>,
    /// Content-style locator to person
    pictures: HashMap<String, usize>,
    report: SimReport,
}

pub struct SimulatedQuiz {
    roster: Vec<Name>,
    config: SimConfig,
    state: Mutex<QuizState>,
    changes: watch::Sender<Option<String>>,
    answered: Notify,
}

impl SimulatedQuiz {
    pub fn new(config: SimConfig) -> Self {
        let people = config.people.max(1);
        let roster = (1..=people).map(|i| format!("Person {:03}", i)).collect();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (changes, _) = watch::channel(None);
        Self {
            roster,
            config: SimConfig {
                people,
                options: config.options.clamp(1, people),
                grid: config.grid.clamp(2, MAX_GRID_SIZE),
                ..config
            },
            state: Mutex::new(QuizState {
                rng,
                round: None,
                pictures: HashMap::new(),
                report: SimReport::default(),
            }),
            changes,
            answered: Notify::new(),
        }
    }

    pub fn roster(&self) -> &[Name] {
        &self.roster
    }

    /// Show the next picture. Never repeats the previous person, since an
    /// unchanged locator reads as no new round.
    pub fn advance(&self) -> String {
        let mut state = self.lock();
        let previous = state.round.as_ref().map(|r| r.person);
        let people = self.roster.len();

        let person = loop {
            let pick = state.rng.gen_range(0..people);
            if people == 1 || Some(pick) != previous {
                break pick;
            }
        };

        let mut others: Vec<usize> = (0..people).filter(|&p| p != person).collect();
        others.shuffle(&mut state.rng);
        let mut options: Vec<usize> = others.into_iter().take(self.config.options - 1).collect();
        options.push(person);
        options.shuffle(&mut state.rng);

        state.report.rounds_presented += 1;
        let number = state.report.rounds_presented;
        let stalled = self.config.stall_every > 0 && number % self.config.stall_every == 0;
        if stalled {
            state.report.stalled += 1;
        }

        let locator = match self.config.style {
            LocatorStyle::Structural => {
                format!("https://quiz.example/questions/{}/picture", person + 1)
            }
            LocatorStyle::Content => {
                let locator = format!("https://quiz.example/faces/{}.png", number);
                state.pictures.insert(locator.clone(), person);
                locator
            }
        };
        debug!(
            "Round {}: showing {}{}",
            number,
            self.roster[person],
            if stalled { " (stalled)" } else { "" }
        );

        state.round = Some(Round {
            person,
            answered: vec![false; options.len()],
            options,
            revealed: false,
            stalled,
            locator: locator.clone(),
        });
        drop(state);

        self.changes.send_replace(Some(locator.clone()));
        locator
    }

    /// Take the picture down
    pub fn clear(&self) {
        self.lock().round = None;
        self.changes.send_replace(None);
    }

    pub fn report(&self) -> SimReport {
        self.lock().report.clone()
    }

    /// Name of the person currently shown
    pub fn current_person(&self) -> Option<Name> {
        let state = self.lock();
        state.round.as_ref().map(|r| self.roster[r.person].clone())
    }

    /// Drive the page for `rounds` rounds.
    ///
    /// Each round waits up to `max_wait` for a submission, then stays up for
    /// `linger` so the revealed answer can be read before the next picture.
    pub fn run_page(
        self: Arc<Self>,
        rounds: u64,
        linger: Duration,
        max_wait: Duration,
    ) -> JoinHandle<SimReport> {
        tokio::spawn(async move {
            for _ in 0..rounds {
                self.advance();
                if tokio::time::timeout(max_wait, self.answered.notified())
                    .await
                    .is_err()
                {
                    debug!("No submission within {:?}; moving on", max_wait);
                }
                tokio::time::sleep(linger).await;
            }
            self.clear();
            let report = self.report();
            info!(
                "Quiz finished: {} rounds, {} submissions, {} correct",
                report.rounds_presented, report.submissions, report.correct
            );
            report
        })
    }

    /// Grayscale picture for `person`: the index fills the first four cells,
    /// the rest is a fixed ramp
    fn picture(&self, person: usize) -> Result<Vec<u8>> {
        let grid = self.config.grid;
        let id = person as u32;
        let image = ImageBuffer::from_fn(grid, grid, |x, y| {
            let cell = y * grid + x;
            let nibble = if cell < 4 {
                (id >> (4 * (3 - cell))) & 0xf
            } else {
                cell % 16
            };
            let shade = (nibble * 16 + 8) as u8;
            Rgba([shade, shade, shade, 255])
        });
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, QuizState> {
        // Counters stay usable even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PresentationSource for SimulatedQuiz {
    async fn current_image_source(&self) -> Option<String> {
        self.lock().round.as_ref().map(|r| r.locator.clone())
    }

    fn subscribe(&self) -> Option<watch::Receiver<Option<String>>> {
        Some(self.changes.subscribe())
    }
}

#[async_trait]
impl CandidateSurface for SimulatedQuiz {
    async fn current_candidates(&self) -> Vec<Candidate> {
        let state = self.lock();
        let Some(round) = &state.round else {
            return Vec::new();
        };
        round
            .options
            .iter()
            .zip(&round.answered)
            .enumerate()
            .map(|(index, (&person, &answered))| Candidate {
                index,
                name: self.roster[person].clone(),
                already_answered: answered,
            })
            .collect()
    }

    async fn submit(&self, candidate: &Candidate) -> Result<()> {
        let mut state = self.lock();
        let state = &mut *state;
        let round = state
            .round
            .as_mut()
            .ok_or_else(|| FaceMatchError::Host("no question on display".to_string()))?;

        let index = candidate.index;
        if index >= round.options.len() || round.answered[index] {
            return Err(FaceMatchError::Host(format!(
                "option {} is not open",
                index
            )));
        }
        if self.roster[round.options[index]] != candidate.name {
            return Err(FaceMatchError::Host(format!(
                "option {} is not '{}'",
                index, candidate.name
            )));
        }

        round.answered[index] = true;
        round.revealed = !round.stalled;
        state.report.submissions += 1;
        if round.options[index] == round.person {
            state.report.correct += 1;
        } else {
            state.report.wrong += 1;
        }
        self.answered.notify_one();
        Ok(())
    }
}

#[async_trait]
impl OutcomeSurface for SimulatedQuiz {
    async fn confirmed_name(&self) -> Option<Name> {
        let state = self.lock();
        let round = state.round.as_ref()?;
        round.revealed.then(|| self.roster[round.person].clone())
    }
}

#[async_trait]
impl ImageLoader for SimulatedQuiz {
    async fn load(&self, locator: &str) -> Result<Vec<u8>> {
        let person = self.lock().pictures.get(locator).copied();
        match person {
            Some(person) => self.picture(person),
            None => Err(FaceMatchError::ImageLoad(format!("404 for {}", locator))),
        }
    }
}
