//! Error types for the combat core.
//!
//! These are the *fatal* errors: programming mistakes or corrupt inputs that
//! make an encounter impossible to run. Gameplay rejections (not enough AP,
//! target out of range, ...) are ordinary values, see
//! [`ActionError`](crate::action::ActionError).

use thiserror::Error;

use crate::combatant::CombatantId;

/// Result type alias using [`CombatError`].
pub type Result<T> = std::result::Result<T, CombatError>;

/// Top-level error type for combat core failures.
#[derive(Debug, Error)]
pub enum CombatError {
    /// An encounter was constructed with no combatants on either side.
    #[error("Cannot start an encounter with no combatants")]
    EmptyEncounter,

    /// Invalid combatant reference.
    #[error("Combatant not found: {0}")]
    UnknownCombatant(CombatantId),

    /// A template failed validation.
    #[error("Invalid template '{name}': {message}")]
    InvalidTemplate {
        /// Name of the offending template.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// Invalid encounter state (serialization, replay divergence).
    #[error("Invalid encounter state: {0}")]
    InvalidState(String),

    /// Replay produced a different final state than was recorded.
    #[error("Replay diverged: recorded hash {expected}, replayed hash {actual}")]
    ReplayDiverged {
        /// Hash recorded at capture time.
        expected: u64,
        /// Hash produced by re-running the replay.
        actual: u64,
    },
}
