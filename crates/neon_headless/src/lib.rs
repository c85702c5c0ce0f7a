//! Headless encounter runner for AI testing and balance work.
//!
//! This crate runs Neon Collapse encounters without a UI. It can:
//!
//! - **Auto-battle**: let tactics play a scenario and report the outcome
//! - **Batch**: run thousands of seeds in parallel and summarize win rates
//! - **Play**: drive an encounter over JSON lines on stdin/stdout
//! - **Verify**: check that a recorded replay reproduces the same state
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands from the controller (load, move, attack, ...)
//! - **stdout**: Responses and encounter state (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! See [`protocol`] module for the full command/response reference.
//!
//! # Example
//!
//! ```bash
//! # Auto-battle a built-in scenario
//! cargo run -p neon_headless -- run --scenario alley_ambush --seed 7
//!
//! # Drive an encounter by hand
//! echo '{"cmd":"load","scenario":"alley_ambush"}' | cargo run -p neon_headless -- play
//!
//! # Verify a replay
//! cargo run -p neon_headless -- verify --replay replay.bin
//! ```

pub mod batch;
pub mod metrics;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use metrics::{BatchSummary, EncounterMetrics, MetricsCollector};
pub use protocol::{Command, Response};
pub use runner::{run_scenario, HeadlessRunner, RunConfig, RunError, RunReport};
pub use scenario::{Scenario, ScenarioError};
