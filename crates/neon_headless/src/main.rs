//! Headless Neon Collapse encounter runner.
//!
//! Runs encounters without a UI, either automatically or controlled via JSON
//! on stdin/stdout. Designed for AI agents, CI testing, and replay
//! verification.
//!
//! # Usage
//!
//! ```bash
//! # Auto-battle one scenario and print the combat log
//! cargo run -p neon_headless -- run --scenario alley_ambush --seed 3 --log
//!
//! # Run batch balance test
//! cargo run -p neon_headless -- batch --scenario corpo_raid --count 1000 --output results/
//!
//! # Interactive mode - read commands from stdin
//! cargo run -p neon_headless -- play
//!
//! # Verify a replay or check scenario files
//! cargo run -p neon_headless -- verify --replay results/run.bin
//! cargo run -p neon_headless -- validate crates/neon_headless/scenarios/*.ron
//! ```
//!
//! Logs go to stderr and honour `RUST_LOG`; stdout is reserved for JSON.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use neon_headless::{
    batch::{run_batch, BatchConfig, BatchResults},
    runner::{load_replay, run_scenario, HeadlessRunner, RunConfig},
    scenario::{Scenario, BUILTIN_SCENARIOS},
};

#[derive(Parser)]
#[command(name = "neon_headless")]
#[command(about = "Headless Neon Collapse encounter runner for AI testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Auto-battle a single encounter
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "alley_ambush")]
        scenario: String,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Round limit (defaults to the scenario's)
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Write a replay file
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Print the combat log to stderr
        #[arg(long)]
        log: bool,
    },

    /// Run a batch of encounters for balance testing
    Batch {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "alley_ambush")]
        scenario: String,

        /// Number of encounters to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel encounters (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Round limit (defaults to the scenario's)
        #[arg(long)]
        max_rounds: Option<u32>,
    },

    /// Drive an encounter over JSON lines on stdin/stdout
    Play {
        /// Scenario to load on startup
        #[arg(short, long)]
        scenario: Option<String>,

        /// Random seed for the startup scenario
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Verify that a replay reproduces its recorded state
    Verify {
        /// Replay file path
        #[arg(short, long)]
        replay: PathBuf,
    },

    /// Check scenario files (or built-in names) for errors
    Validate {
        /// Scenario files or built-in names; all built-ins when empty
        scenarios: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr (stdout is for protocol and JSON output)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            max_rounds,
            replay,
            log,
        } => cmd_run(&scenario, seed, max_rounds, replay, log),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
            max_rounds,
        } => cmd_batch(&scenario, count, parallel, output, seed, max_rounds),
        Commands::Play { scenario, seed } => cmd_play(scenario.as_deref(), seed),
        Commands::Verify { replay } => cmd_verify(replay),
        Commands::Validate { scenarios } => cmd_validate(scenarios),
    }
}

fn load_scenario(name: &str) -> Scenario {
    match Scenario::resolve(name) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("Failed to load scenario '{}': {}", name, e);
            std::process::exit(1);
        }
    }
}

/// Auto-battle one encounter
fn cmd_run(
    scenario: &str,
    seed: u64,
    max_rounds: Option<u32>,
    replay: Option<PathBuf>,
    print_log: bool,
) {
    let scenario = load_scenario(scenario);
    let config = RunConfig {
        seed,
        max_rounds,
        replay_path: replay,
    };

    let report = match run_scenario(&scenario, &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Run failed: {}", e);
            std::process::exit(1);
        }
    };

    if print_log {
        for line in &report.log {
            eprintln!("  {}", line);
        }
    }

    match serde_json::to_string_pretty(&report.metrics) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize metrics: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run a batch of encounters for balance testing
fn cmd_batch(
    scenario_name: &str,
    count: u32,
    parallel: u32,
    output: PathBuf,
    seed: u64,
    max_rounds: Option<u32>,
) {
    let scenario = load_scenario(scenario_name);

    tracing::info!(
        scenario = %scenario_name,
        count,
        parallel,
        seed,
        output = %output.display(),
        "Batch configuration"
    );

    let config = BatchConfig {
        scenario: scenario_name.to_string(),
        encounter_count: count,
        parallel_encounters: parallel,
        seed_start: seed,
        max_rounds,
    };
    let results = run_batch(&scenario, config);

    let results_path = BatchResults::default_path(&output);
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {}", e);
        std::process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE: {}", scenario.name());
    eprintln!("{}", "=".repeat(50));
    eprintln!("Encounters: {}", summary.total_encounters);
    if !results.errors.is_empty() {
        eprintln!("Failed: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!("\nOutcomes:");
    eprintln!("  Player wins: {:.1}%", summary.win_rate * 100.0);
    eprintln!("  Fled:        {:.1}%", summary.flee_rate * 100.0);
    eprintln!("  Enemy wins:  {}", summary.enemy_wins);
    eprintln!("  Unresolved:  {}", summary.unresolved);
    eprintln!(
        "  Rounds:      avg {:.1} (min {}, max {})",
        summary.avg_rounds, summary.min_rounds, summary.max_rounds
    );

    for error in results.errors.iter().take(10) {
        eprintln!(
            "  Encounter {} (seed {}): {}",
            error.encounter_index, error.seed, error.message
        );
    }

    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Interactive JSON-lines session
fn cmd_play(scenario: Option<&str>, seed: u64) {
    tracing::info!("Starting interactive session");

    let mut runner = match scenario {
        Some(name) => match HeadlessRunner::with_scenario(load_scenario(name), seed) {
            Ok(runner) => runner,
            Err(e) => {
                eprintln!("Failed to start scenario: {}", e);
                std::process::exit(1);
            }
        },
        None => HeadlessRunner::new(),
    };

    let stdin = io::stdin();
    if let Err(e) = runner.run(stdin.lock(), io::stdout().lock()) {
        eprintln!("Session ended with I/O error: {}", e);
        std::process::exit(1);
    }
}

/// Verify a replay
fn cmd_verify(path: PathBuf) {
    tracing::info!("Verifying replay: {}", path.display());

    let replay = match load_replay(&path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Loaded replay:");
    eprintln!("  Encounter: {}", replay.setup.name);
    eprintln!("  Seed: {}", replay.seed);
    eprintln!("  Intents: {}", replay.intent_count());
    eprintln!("  Rounds: {}", replay.rounds);

    match replay.verify() {
        Ok(encounter) => {
            eprintln!("PASS: Replay verification successful");
            eprintln!("  Hash: {:016x}", encounter.state_hash());
            if let Some(victor) = encounter.victor() {
                eprintln!("  Victor: {}", victor);
            }
        }
        Err(e) => {
            eprintln!("FAIL: {}", e);
            std::process::exit(1);
        }
    }
}

/// Check scenario files
fn cmd_validate(scenarios: Vec<String>) {
    let names = if scenarios.is_empty() {
        BUILTIN_SCENARIOS.iter().map(|s| (*s).to_string()).collect()
    } else {
        scenarios
    };

    let mut failures = 0;
    for name in &names {
        match Scenario::resolve(name).and_then(|s| s.validate().map(|()| s)) {
            Ok(scenario) => eprintln!(
                "OK    {} ({} vs {})",
                name,
                scenario.setup.player_team.len(),
                scenario.setup.enemy_team.len()
            ),
            Err(e) => {
                failures += 1;
                eprintln!("FAIL  {}: {}", name, e);
            }
        }
    }

    if failures > 0 {
        eprintln!("{} of {} scenarios failed validation", failures, names.len());
        std::process::exit(1);
    }
}
