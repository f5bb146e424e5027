//! Facematch Control - CLI for the facematch knowledge base
//!
//! Inspects and resets the stored knowledge, and runs the bot against an
//! in-process simulated quiz.

use anyhow::Result;
use clap::{Parser, Subcommand};
use facematch_common::sim::LocatorStyle;
use facematch_common::{Config, Mode};
use facematchctl::commands::{self, SimulateArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facematchctl")]
#[command(about = "Facematch - learn faces, answer the quiz", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/facematch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show knowledge base statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show people learned so far
    Progress {
        /// How many assignments to list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Delete everything learned
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Run the bot against a simulated quiz and print a JSON report
    Simulate {
        /// learning or guessing
        #[arg(long, default_value = "learning")]
        mode: Mode,

        /// People in the quiz roster
        #[arg(long, default_value_t = 20)]
        people: usize,

        /// Options per question
        #[arg(long, default_value_t = 4)]
        options: usize,

        /// Questions to show
        #[arg(long, default_value_t = 100)]
        rounds: u64,

        /// Seed for both the quiz and the guess policy
        #[arg(long)]
        seed: Option<u64>,

        /// Every n-th question never reveals its answer
        #[arg(long, default_value_t = 0)]
        stall_every: u64,

        /// Identify pictures by image content instead of question id
        #[arg(long)]
        content: bool,

        /// Milliseconds each question stays up after it is answered
        #[arg(long, default_value_t = 50)]
        linger_ms: u64,

        /// Learn into the configured store instead of a throwaway base
        #[arg(long)]
        persist: bool,
    },

    /// Show the identity key for an image locator
    Hash {
        /// URL, file:// URL or path
        locator: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    match cli.command {
        Commands::Stats { json } => commands::stats(&config, json),
        Commands::Progress { limit } => commands::progress(&config, limit),
        Commands::Reset { yes } => commands::reset(&config, yes),
        Commands::Simulate {
            mode,
            people,
            options,
            rounds,
            seed,
            stall_every,
            content,
            linger_ms,
            persist,
        } => {
            let args = SimulateArgs {
                mode,
                people,
                options,
                rounds,
                seed,
                stall_every,
                style: if content {
                    LocatorStyle::Content
                } else {
                    LocatorStyle::Structural
                },
                linger_ms,
                persist,
            };
            commands::simulate(&config, &args).await
        }
        Commands::Hash { locator } => commands::hash(&config, &locator).await,
        Commands::Config => commands::config(&config),
    }
}
