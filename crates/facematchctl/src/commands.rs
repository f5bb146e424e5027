//! Subcommand implementations.

use crate::display;
use anyhow::{Context, Result};
use facematch_common::hasher::IdentityHasher;
use facematch_common::host::HttpImageLoader;
use facematch_common::sim::{LocatorStyle, SimConfig, SimReport, SimulatedQuiz};
use facematch_common::{
    Config, GuessPolicy, Host, JsonFileStore, KnowledgeBase, Mode, RoundController, Session,
    SessionStats, StatsReport,
};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Options for `facematchctl simulate`
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub mode: Mode,
    pub people: usize,
    pub options: usize,
    pub rounds: u64,
    pub seed: Option<u64>,
    pub stall_every: u64,
    pub style: LocatorStyle,
    pub linger_ms: u64,
    pub persist: bool,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            mode: Mode::Learning,
            people: 20,
            options: 4,
            rounds: 100,
            seed: None,
            stall_every: 0,
            style: LocatorStyle::Structural,
            linger_ms: 50,
            persist: false,
        }
    }
}

/// JSON report printed by `simulate`
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub mode: Mode,
    pub quiz: SimReport,
    /// Percent of submissions the quiz scored correct
    pub quiz_accuracy: Option<f64>,
    pub people_learned: usize,
    pub negatives: usize,
    pub session: SessionStats,
}

fn store_for(config: &Config) -> JsonFileStore {
    JsonFileStore::new(config.store.resolved_data_dir(), &config.store.key)
}

pub fn open_knowledge(config: &Config) -> KnowledgeBase {
    KnowledgeBase::open(Box::new(store_for(config)))
}

pub fn stats(config: &Config, json: bool) -> Result<()> {
    let kb = open_knowledge(config);
    let report = StatsReport::new(&kb, &SessionStats::default());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display::print_stats(&report, &store_for(config).path().display().to_string());
    }
    Ok(())
}

pub fn progress(config: &Config, limit: usize) -> Result<()> {
    let kb = open_knowledge(config);
    let assignments = kb.assignments();
    display::print_progress(kb.people(), &assignments[..assignments.len().min(limit)]);
    Ok(())
}

pub fn reset(config: &Config, yes: bool) -> Result<()> {
    let store = store_for(config);
    if !store.path().exists() {
        println!("Nothing stored at {}.", store.path().display());
        return Ok(());
    }

    let mut kb = open_knowledge(config);
    let prompt = if kb.tracked_len() == 0 {
        format!(
            "Delete the unreadable or empty snapshot at {}? [y/N]",
            store.path().display()
        )
    } else {
        format!(
            "Delete {} learned people and {} negative associations? [y/N]",
            kb.people(),
            kb.total_negatives()
        )
    };

    if !yes && !confirm(&prompt)? {
        println!("Cancelled. Nothing was deleted.");
        return Ok(());
    }

    kb.reset();
    println!("All data cleared.");
    Ok(())
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let answer = input.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

pub async fn simulate(config: &Config, args: &SimulateArgs) -> Result<()> {
    let summary = run_simulation(config, args).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Run a full session against a simulated quiz until every round was shown
pub async fn run_simulation(config: &Config, args: &SimulateArgs) -> Result<SimulationSummary> {
    let quiz = Arc::new(SimulatedQuiz::new(SimConfig {
        people: args.people,
        options: args.options,
        stall_every: args.stall_every,
        style: args.style,
        grid: config.hasher.grid_size,
        seed: args.seed,
    }));

    let kb = if args.persist {
        open_knowledge(config)
    } else {
        KnowledgeBase::new()
    };
    let hasher = IdentityHasher::new(&config.hasher, quiz.clone())
        .context("Invalid hasher configuration")?;
    let policy = GuessPolicy::new(args.seed.or(config.policy.seed));
    let mut session_config = config.clone();
    session_config.mode = args.mode;
    let controller = RoundController::new(kb, hasher, policy, &session_config);

    info!(
        "Simulating {} rounds: {} people, {} options, {} mode",
        args.rounds, args.people, args.options, args.mode
    );
    let session = Session::start(controller, Host::from_single(quiz.clone()), config.timing.clone());

    // A stalled round holds the bot until its outcome timeout
    let linger = Duration::from_millis(args.linger_ms).max(config.timing.outcome_check_interval() * 3);
    let max_wait = config.timing.outcome_timeout() + config.timing.poll_interval() * 5;
    let quiz_report = quiz
        .clone()
        .run_page(args.rounds, linger, max_wait)
        .await
        .context("Simulated quiz task failed")?;

    let controller = session.stop().await?;
    let stats = controller.stats_report();

    Ok(SimulationSummary {
        mode: args.mode,
        quiz_accuracy: quiz_report.accuracy(),
        quiz: quiz_report,
        people_learned: stats.people,
        negatives: stats.negatives,
        session: stats.session,
    })
}

pub async fn hash(config: &Config, locator: &str) -> Result<()> {
    let loader = HttpImageLoader::new(config.timing.image_load_timeout())?;
    let mut hasher = IdentityHasher::new(&config.hasher, Arc::new(loader))?;
    let (key, source) = hasher.hash_with_source(locator).await;

    let kb = open_knowledge(config);
    display::print_hash(locator, &key, source, kb.lookup(&key).map(String::as_str));
    Ok(())
}

pub fn config(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
