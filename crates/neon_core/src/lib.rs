//! # Neon Core
//!
//! Deterministic turn-based tactical combat for Neon Collapse.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (every roll goes through an injected [`rng::CombatRng`])
//! - No floating-point math (damage uses fixed-point)
//!
//! This separation enables:
//! - Pinned-roll unit tests for every formula
//! - Headless balance runs
//! - Replay systems
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`combatant`] - Attributes, derived stats, damage and morale
//! - [`weapon`] - Weapon templates and the stock catalog
//! - [`turn`] - Initiative order and round counting
//! - [`encounter`] - The encounter state machine and action resolution
//! - [`escape`] - Retreat eligibility and odds
//! - [`ai`] - Tactics for computer-controlled combatants
//! - [`data`] - Serde templates for combatants and encounters
//! - [`replay`] - Record and verify encounters
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod ai;
pub mod combatant;
pub mod data;
pub mod encounter;
pub mod error;
pub mod escape;
pub mod grid;
pub mod item;
pub mod log;
pub mod math;
pub mod replay;
pub mod rng;
pub mod turn;
pub mod view;
pub mod weapon;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{ActionError, ActionOutcome, AttackReport, Intent};
    pub use crate::ai::{decide_intent, CautiousAi, HeuristicAi, Tactic, TacticKind};
    pub use crate::combatant::{Attributes, Combatant, CombatantId, Team};
    pub use crate::data::{CombatantTemplate, EncounterSetup, WeaponSpec};
    pub use crate::encounter::{Encounter, EncounterPhase, Victor};
    pub use crate::error::{CombatError, Result};
    pub use crate::escape::{EscapeMethod, EscapeReport};
    pub use crate::grid::{Cover, Grid};
    pub use crate::item::{ItemEffect, ItemKind, ItemStack};
    pub use crate::log::CombatLog;
    pub use crate::math::{Fixed, GridPos};
    pub use crate::replay::Replay;
    pub use crate::rng::{CombatRng, ScriptedRng, SeededRng};
    pub use crate::view::EncounterView;
    pub use crate::weapon::{catalog, WeaponClass, WeaponTemplate};
}
