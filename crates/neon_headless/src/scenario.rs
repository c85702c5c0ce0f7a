//! Scenario loading and configuration.
//!
//! A scenario is an encounter setup plus the tactics that drive each side
//! and a round limit. Scenarios are written in RON; the ones shipped in
//! `scenarios/` are also compiled in and can be referred to by name.

use std::path::Path;

use neon_core::prelude::{CombatError, Encounter, EncounterSetup, SeededRng, TacticKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Parsed, but the encounter it describes cannot be built.
    #[error("Invalid scenario: {0}")]
    Invalid(#[from] CombatError),
}

const ALLEY_AMBUSH: &str = include_str!("../scenarios/alley_ambush.ron");
const CORPO_RAID: &str = include_str!("../scenarios/corpo_raid.ron");

/// Names accepted by [`Scenario::builtin`].
pub const BUILTIN_SCENARIOS: [&str; 2] = ["alley_ambush", "corpo_raid"];

fn default_max_rounds() -> u32 {
    100
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Tactic for the player team and its allies.
    #[serde(default)]
    pub player_tactic: TacticKind,
    /// Tactic for the enemy team.
    #[serde(default)]
    pub enemy_tactic: TacticKind,
    /// Round limit for automated runs.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// The encounter itself.
    pub setup: EncounterSetup,
}

impl Scenario {
    /// Wrap a setup with default tactics and round limit.
    #[must_use]
    pub fn new(setup: EncounterSetup) -> Self {
        Self {
            description: String::new(),
            player_tactic: TacticKind::default(),
            enemy_tactic: TacticKind::default(),
            max_rounds: default_max_rounds(),
            setup,
        }
    }

    /// Builder method to set both tactics.
    #[must_use]
    pub fn with_tactics(mut self, players: TacticKind, enemies: TacticKind) -> Self {
        self.player_tactic = players;
        self.enemy_tactic = enemies;
        self
    }

    /// Scenario name (the encounter setup's name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.setup.name
    }

    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario = Self::from_ron_str(&contents)?;
        tracing::debug!(path = %path.display(), name = scenario.name(), "Loaded scenario");
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// A scenario compiled into the binary, by name.
    ///
    /// Returns `None` for names not in [`BUILTIN_SCENARIOS`].
    pub fn builtin(name: &str) -> Option<Result<Self, ScenarioError>> {
        let source = match name {
            "alley_ambush" => ALLEY_AMBUSH,
            "corpo_raid" => CORPO_RAID,
            _ => return None,
        };
        Some(Self::from_ron_str(source))
    }

    /// Resolve a CLI argument: a built-in name first, otherwise a file path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => scenario,
            None => Self::load(name_or_path),
        }
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Check the setup and the round limit.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.setup.validate()?;
        if self.max_rounds == 0 {
            return Err(ScenarioError::Invalid(CombatError::InvalidState(format!(
                "scenario '{}' has a round limit of 0",
                self.name()
            ))));
        }
        Ok(())
    }

    /// Build a fresh encounter seeded with `seed`.
    pub fn build(&self, seed: u64) -> Result<Encounter<SeededRng>, ScenarioError> {
        Ok(self.setup.build(SeededRng::new(seed))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neon_core::prelude::{Cover, GridPos};

    #[test]
    fn test_builtins_parse_and_validate() {
        for name in BUILTIN_SCENARIOS {
            let scenario = Scenario::builtin(name)
                .expect("known name")
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            scenario
                .validate()
                .unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    #[test]
    fn test_alley_ambush() {
        let scenario = Scenario::resolve("alley_ambush").unwrap();
        assert_eq!(scenario.name(), "Alley Ambush");
        assert_eq!(scenario.setup.player_team.len(), 2);
        assert_eq!(scenario.setup.enemy_team.len(), 3);
        assert_eq!(
            scenario.player_tactic,
            TacticKind::Cautious {
                retreat_below_percent: 30
            }
        );
        assert_eq!(scenario.setup.grid.cover_at(GridPos::new(6, 6)), Cover::Full);
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(Scenario::builtin("night_city").is_none());
        assert!(matches!(
            Scenario::resolve("definitely/not/here.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_parse_from_ron_with_defaults() {
        let ron = r#"
            Scenario(
                setup: EncounterSetup(
                    name: "Test",
                    player_team: [
                        CombatantTemplate(name: "V", position: (x: 0, y: 0), max_hp: 100, weapon: Catalog("pistol")),
                    ],
                    enemy_team: [
                        CombatantTemplate(name: "Grunt", team: Enemy, position: (x: 5, y: 5), max_hp: 60, weapon: Catalog("knife")),
                    ],
                ),
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name(), "Test");
        assert_eq!(scenario.max_rounds, 100);
        assert_eq!(scenario.enemy_tactic, TacticKind::Aggressive);
        assert!(scenario.build(1).unwrap().is_active());
    }

    #[test]
    fn test_zero_round_limit_is_invalid() {
        let mut scenario = Scenario::resolve("alley_ambush").unwrap();
        scenario.max_rounds = 0;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Invalid(_))
        ));
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let scenario = Scenario::resolve("corpo_raid").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpo_raid.ron");
        std::fs::write(&path, scenario.to_ron_string().unwrap()).unwrap();
        assert_eq!(Scenario::load(&path).unwrap(), scenario);
    }
}
