//! Replays: enough to re-run an encounter bit for bit.
//!
//! A replay stores the encounter setup, the RNG seed and the stream of
//! intents that resolved successfully. Because the core is deterministic,
//! re-running the intents against a freshly built encounter must land on the
//! same [`Encounter::state_hash`].

use serde::{Deserialize, Serialize};

use crate::action::Intent;
use crate::data::EncounterSetup;
use crate::encounter::{Encounter, Victor};
use crate::error::{CombatError, Result};
use crate::rng::SeededRng;

/// Replay format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Seed of the [`SeededRng`] the encounter ran with.
    pub seed: u64,
    /// Setup the encounter was built from.
    pub setup: EncounterSetup,
    /// Intents in resolution order.
    pub intents: Vec<Intent>,
    /// Completed rounds at capture time.
    pub rounds: u32,
    /// Outcome at capture time, if the fight was over.
    pub victor: Option<Victor>,
    /// State hash at capture time.
    pub final_hash: u64,
}

impl Replay {
    /// Capture an encounter that was built from `setup` with
    /// `SeededRng::new(seed)`.
    #[must_use]
    pub fn capture(setup: &EncounterSetup, seed: u64, encounter: &Encounter<SeededRng>) -> Self {
        Self {
            version: REPLAY_VERSION,
            seed,
            setup: setup.clone(),
            intents: encounter.history().to_vec(),
            rounds: encounter.turn_count(),
            victor: encounter.victor(),
            final_hash: encounter.state_hash(),
        }
    }

    /// Number of recorded intents.
    #[must_use]
    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }

    /// Serialize with bincode.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| CombatError::InvalidState(format!("Failed to serialize replay: {e}")))
    }

    /// Deserialize from bincode, checking the format version.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a replay of this version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| CombatError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(CombatError::InvalidState(format!(
                "Replay version mismatch: expected {}, got {}",
                REPLAY_VERSION, replay.version
            )));
        }
        Ok(replay)
    }

    /// Rebuild the encounter and re-resolve every recorded intent.
    ///
    /// # Errors
    /// Returns an error if the setup no longer builds or a recorded intent is
    /// rejected.
    pub fn play(&self) -> Result<Encounter<SeededRng>> {
        let mut encounter = self.setup.build(SeededRng::new(self.seed))?;
        for (index, intent) in self.intents.iter().enumerate() {
            encounter.resolve(*intent).map_err(|e| {
                CombatError::InvalidState(format!("Replay intent {index} ({intent:?}) rejected: {e}"))
            })?;
        }
        Ok(encounter)
    }

    /// Play the replay and compare the final state hash.
    ///
    /// # Errors
    /// [`CombatError::ReplayDiverged`] on a hash mismatch, or any error from
    /// [`play`](Self::play).
    pub fn verify(&self) -> Result<Encounter<SeededRng>> {
        let encounter = self.play()?;
        let actual = encounter.state_hash();
        if actual != self.final_hash {
            return Err(CombatError::ReplayDiverged {
                expected: self.final_hash,
                actual,
            });
        }
        tracing::debug!(intents = self.intents.len(), hash = actual, "Replay verified");
        Ok(encounter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::HeuristicAi;
    use crate::combatant::Team;
    use crate::data::CombatantTemplate;
    use crate::grid::Grid;
    use crate::math::GridPos;
    use crate::weapon::catalog;

    fn setup() -> EncounterSetup {
        EncounterSetup {
            name: "Test yard".to_string(),
            grid: Grid::new(10, 10),
            player_team: vec![CombatantTemplate::new(
                "V",
                Team::Player,
                GridPos::new(0, 0),
                100,
                catalog::pistol(),
            )],
            enemy_team: vec![CombatantTemplate::new(
                "Gang Grunt",
                Team::Enemy,
                GridPos::new(9, 9),
                60,
                catalog::assault_rifle(),
            )],
        }
    }

    fn played(seed: u64) -> (EncounterSetup, Encounter<SeededRng>) {
        let setup = setup();
        let mut encounter = setup.build(SeededRng::new(seed)).expect("valid setup");
        encounter.auto_resolve(&HeuristicAi, &HeuristicAi, 100);
        (setup, encounter)
    }

    #[test]
    fn test_capture_and_verify() {
        let (setup, encounter) = played(42);
        let replay = Replay::capture(&setup, 42, &encounter);
        assert_eq!(replay.intent_count(), encounter.history().len());
        assert_eq!(replay.victor, encounter.victor());

        let replayed = replay.verify().expect("deterministic replay");
        assert_eq!(replayed.log().entries(), encounter.log().entries());
    }

    #[test]
    fn test_bytes_round_trip() {
        let (setup, encounter) = played(7);
        let replay = Replay::capture(&setup, 7, &encounter);
        let bytes = replay.to_bytes().expect("serializes");
        assert_eq!(Replay::from_bytes(&bytes).expect("deserializes"), replay);
    }

    #[test]
    fn test_tampered_hash_diverges() {
        let (setup, encounter) = played(1);
        let mut replay = Replay::capture(&setup, 1, &encounter);
        replay.final_hash ^= 1;
        assert!(matches!(
            replay.verify(),
            Err(CombatError::ReplayDiverged { .. })
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let (setup, encounter) = played(3);
        let mut replay = Replay::capture(&setup, 3, &encounter);
        replay.version = 99;
        let bytes = replay.to_bytes().expect("serializes");
        assert!(Replay::from_bytes(&bytes).is_err());
    }
}
