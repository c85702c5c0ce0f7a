//! Batch encounter runner for balance testing.
//!
//! Runs the same scenario under many seeds in parallel using rayon. Each
//! encounter owns its RNG and stays single-threaded; only independent
//! encounters run side by side.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{BatchSummary, EncounterMetrics};
use crate::runner::{run_scenario, RunConfig};
use crate::scenario::Scenario;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name or path, for the record
    pub scenario: String,
    /// Number of encounters to run
    pub encounter_count: u32,
    /// Maximum parallel encounters (0 = use rayon default)
    pub parallel_encounters: u32,
    /// Starting seed; encounter `i` uses `seed_start + i`
    pub seed_start: u64,
    /// Round limit override
    pub max_rounds: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "alley_ambush".to_string(),
            encounter_count: 100,
            parallel_encounters: 0,
            seed_start: 0,
            max_rounds: None,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, encounter_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            encounter_count,
            ..Default::default()
        }
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set parallelism
    pub fn with_parallel(mut self, parallel: u32) -> Self {
        self.parallel_encounters = parallel;
        self
    }

    /// Set round limit
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual encounter metrics, in seed order
    pub encounters: Vec<EncounterMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }

    /// Default results file inside an output directory
    pub fn default_path(output_dir: &Path) -> PathBuf {
        output_dir.join("batch_results.json")
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Encounter index
    pub encounter_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Run a batch of encounters
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let completed = AtomicU32::new(0);

    info!(
        "Starting batch run: {} encounters of '{}'",
        config.encounter_count,
        scenario.name()
    );

    let run_one = |i: u32| {
        let seed = config.seed_start.wrapping_add(u64::from(i));
        let mut run = RunConfig::new(seed);
        run.max_rounds = config.max_rounds;

        let result = run_scenario(scenario, &run)
            .map(|report| report.metrics)
            .map_err(|e| {
                warn!("Encounter {} (seed {}) failed: {}", i, seed, e);
                BatchError {
                    encounter_index: i,
                    seed,
                    message: e.to_string(),
                }
            });

        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % 100 == 0 {
            debug!("Progress: {}/{}", done, config.encounter_count);
        }
        result
    };

    let results: Vec<Result<EncounterMetrics, BatchError>> = if config.parallel_encounters > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_encounters as usize)
            .build()
        {
            Ok(pool) => pool.install(|| (0..config.encounter_count).into_par_iter().map(run_one).collect()),
            Err(e) => {
                warn!("Failed to build thread pool ({}), using the global pool", e);
                (0..config.encounter_count).into_par_iter().map(run_one).collect()
            }
        }
    } else {
        (0..config.encounter_count).into_par_iter().map(run_one).collect()
    };

    let (encounters, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let encounters: Vec<EncounterMetrics> = encounters.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_encounters(&encounters);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} encounters in {:.1}s ({:.1} encounters/sec)",
        encounters.len(),
        duration_seconds,
        encounters.len() as f64 / duration_seconds.max(0.001)
    );

    BatchResults {
        config,
        encounters,
        summary,
        duration_seconds,
        errors,
    }
}

/// Verify determinism by running the same seed several times
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> bool {
    let hashes: Vec<Option<u64>> = (0..runs.max(1))
        .map(|_| {
            run_scenario(scenario, &RunConfig::new(seed))
                .ok()
                .map(|report| report.metrics.final_state_hash)
        })
        .collect();

    hashes[0].is_some() && hashes.iter().all(|h| *h == hashes[0])
}
