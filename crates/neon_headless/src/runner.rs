//! Headless encounter runner.
//!
//! Two ways to play a scenario without a UI:
//!
//! - [`run_scenario`] lets the scenario's tactics fight it out and reports
//!   metrics, the combat log and a replay.
//! - [`HeadlessRunner`] is the interactive session behind `play`: it reads
//!   [`Command`]s as JSON lines and answers with [`Response`]s.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use neon_core::prelude::{CombatError, Combatant, Encounter, Replay, SeededRng};
use thiserror::Error;

use crate::metrics::{EncounterMetrics, MetricsCollector};
use crate::protocol::{Command, EncounterState, Response};
use crate::scenario::{Scenario, ScenarioError};

/// Error type for runs and replay files.
#[derive(Error, Debug)]
pub enum RunError {
    /// Scenario could not be loaded or built.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// Core rejected the encounter or replay.
    #[error(transparent)]
    Combat(#[from] CombatError),
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Settings for a single automated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// RNG seed.
    pub seed: u64,
    /// Round limit; `None` uses the scenario's.
    pub max_rounds: Option<u32>,
    /// Where to write a replay file, if anywhere.
    pub replay_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_rounds: None,
            replay_path: None,
        }
    }
}

impl RunConfig {
    /// Config for a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Override the scenario's round limit.
    #[must_use]
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// Write a replay when the run finishes.
    #[must_use]
    pub fn with_replay(mut self, path: impl Into<PathBuf>) -> Self {
        self.replay_path = Some(path.into());
        self
    }
}

/// Everything an automated run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Counters and outcome.
    pub metrics: EncounterMetrics,
    /// Full combat log.
    pub log: Vec<String>,
    /// Replay of the run.
    pub replay: Replay,
}

/// Play `scenario` to the end (or the round limit) with its tactics.
pub fn run_scenario(scenario: &Scenario, config: &RunConfig) -> Result<RunReport, RunError> {
    let max_rounds = config.max_rounds.unwrap_or(scenario.max_rounds);
    let mut encounter = scenario.build(config.seed)?;
    let mut collector = MetricsCollector::new(scenario.name(), config.seed);

    tracing::info!(
        scenario = scenario.name(),
        seed = config.seed,
        max_rounds,
        "Starting run"
    );

    while encounter.is_active() && encounter.turn_count() < max_rounds {
        let Some(team) = encounter.current_combatant().map(Combatant::team) else {
            break;
        };
        let tactic = if team.is_player_side() {
            &scenario.player_tactic
        } else {
            &scenario.enemy_tactic
        };
        match encounter.run_ai_turn(tactic) {
            Ok(outcomes) => collector.record_all(team, &outcomes),
            Err(error) => {
                tracing::warn!(%error, "Run stopped early");
                break;
            }
        }
    }

    let replay = Replay::capture(&scenario.setup, config.seed, &encounter);
    if let Some(path) = &config.replay_path {
        save_replay(&replay, path)?;
    }

    let metrics = collector.finish(&encounter);
    tracing::info!(
        victor = ?metrics.victor,
        rounds = metrics.rounds,
        hash = format!("{:016x}", metrics.final_state_hash),
        "Run finished"
    );

    Ok(RunReport {
        metrics,
        log: encounter.log().entries().to_vec(),
        replay,
    })
}

/// Write a replay to disk (bincode).
pub fn save_replay(replay: &Replay, path: &Path) -> Result<(), RunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, replay.to_bytes()?)?;
    tracing::info!(path = %path.display(), intents = replay.intent_count(), "Saved replay");
    Ok(())
}

/// Read a replay from disk.
pub fn load_replay(path: &Path) -> Result<Replay, RunError> {
    let bytes = std::fs::read(path)?;
    Ok(Replay::from_bytes(&bytes)?)
}

/// A loaded scenario in an interactive session.
struct Session {
    scenario: Scenario,
    seed: u64,
    encounter: Encounter<SeededRng>,
}

/// Interactive JSON-lines session.
#[derive(Default)]
pub struct HeadlessRunner {
    session: Option<Session>,
    finished: bool,
}

impl HeadlessRunner {
    /// Create a runner with nothing loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner with a scenario already loaded.
    pub fn with_scenario(scenario: Scenario, seed: u64) -> Result<Self, RunError> {
        let encounter = scenario.build(seed)?;
        Ok(Self {
            session: Some(Session {
                scenario,
                seed,
                encounter,
            }),
            finished: false,
        })
    }

    /// Whether `quit` was received.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The loaded encounter, if any.
    #[must_use]
    pub fn encounter(&self) -> Option<&Encounter<SeededRng>> {
        self.session.as_ref().map(|s| &s.encounter)
    }

    /// Read commands from `input` until `quit` or end of input, writing one
    /// response per line to `output`.
    pub fn run<I: BufRead, O: Write>(&mut self, input: I, mut output: O) -> io::Result<()> {
        write!(output, "{}", Response::ready().to_json_line())?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let responses = match Command::from_json(line) {
                Ok(cmd) => self.handle(&cmd),
                Err(e) => vec![Response::error(format!("Parse error: {e}"), None)],
            };
            for response in responses {
                write!(output, "{}", response.to_json_line())?;
            }
            output.flush()?;

            if self.finished {
                break;
            }
        }
        Ok(())
    }

    /// Handle one command.
    pub fn handle(&mut self, cmd: &Command) -> Vec<Response> {
        tracing::debug!(cmd = cmd.name(), "Handling command");
        match cmd {
            Command::Quit => {
                self.finished = true;
                vec![Response::Bye]
            }
            Command::Load { scenario, seed } => self.load(scenario, *seed),
            Command::Query => match &self.session {
                Some(session) => vec![Response::State(session.state())],
                None => vec![not_loaded(cmd)],
            },
            Command::Hash => match &self.session {
                Some(session) => vec![Response::StateHash {
                    round: session.encounter.turn_count(),
                    hash: session.encounter.state_hash(),
                }],
                None => vec![not_loaded(cmd)],
            },
            Command::SaveReplay { path } => match &self.session {
                Some(session) => {
                    let replay =
                        Replay::capture(&session.scenario.setup, session.seed, &session.encounter);
                    match save_replay(&replay, Path::new(path)) {
                        Ok(()) => vec![Response::ack(cmd.name())],
                        Err(e) => vec![Response::error(e.to_string(), Some(cmd.name()))],
                    }
                }
                None => vec![not_loaded(cmd)],
            },
            Command::Ai { turns } => self.ai_turns(cmd, *turns),
            _ => self.act(cmd),
        }
    }

    fn load(&mut self, name: &str, seed: u64) -> Vec<Response> {
        let loaded = Scenario::resolve(name).and_then(|scenario| {
            let encounter = scenario.build(seed)?;
            Ok(Session {
                scenario,
                seed,
                encounter,
            })
        });
        match loaded {
            Ok(session) => {
                tracing::info!(scenario = session.scenario.name(), seed, "Scenario loaded");
                let mut responses = vec![Response::State(session.state())];
                responses.extend(session.game_over());
                self.session = Some(session);
                responses
            }
            Err(e) => vec![Response::error(e.to_string(), Some("load"))],
        }
    }

    fn act(&mut self, cmd: &Command) -> Vec<Response> {
        let Some(session) = self.session.as_mut() else {
            return vec![not_loaded(cmd)];
        };
        let Some(intent) = cmd.intent() else {
            return vec![Response::error("not an action", Some(cmd.name()))];
        };

        let cursor = session.encounter.log().len();
        match session.encounter.resolve(intent) {
            Ok(_) => session.resolved(cursor),
            Err(e) => {
                tracing::warn!(cmd = cmd.name(), error = %e, "Rejected intent");
                vec![Response::error(e.to_string(), Some(cmd.name()))]
            }
        }
    }

    fn ai_turns(&mut self, cmd: &Command, turns: u32) -> Vec<Response> {
        let Some(session) = self.session.as_mut() else {
            return vec![not_loaded(cmd)];
        };

        let cursor = session.encounter.log().len();
        for _ in 0..turns {
            let Some(team) = session.encounter.current_combatant().map(Combatant::team) else {
                break;
            };
            let tactic = if team.is_player_side() {
                session.scenario.player_tactic
            } else {
                session.scenario.enemy_tactic
            };
            if let Err(e) = session.encounter.run_ai_turn(&tactic) {
                return vec![Response::error(e.to_string(), Some(cmd.name()))];
            }
        }
        session.resolved(cursor)
    }
}

impl Session {
    fn state(&self) -> EncounterState {
        EncounterState::capture(self.scenario.name(), &self.encounter)
    }

    fn game_over(&self) -> Option<Response> {
        self.encounter.victor().map(|victor| Response::GameOver {
            victor,
            rounds: self.encounter.turn_count(),
        })
    }

    fn resolved(&self, cursor: usize) -> Vec<Response> {
        let mut responses = vec![Response::Resolved {
            events: self.encounter.log().since(cursor).to_vec(),
            state: self.state(),
        }];
        responses.extend(self.game_over());
        responses
    }
}

fn not_loaded(cmd: &Command) -> Response {
    Response::error("no scenario loaded", Some(cmd.name()))
}
