//! Intents, action costs and the results of resolving them.
//!
//! An [`Intent`] is what a controller (player UI or AI) asks the current
//! combatant to do. The encounter validates it completely before touching
//! any state; a rejected intent comes back as an [`ActionError`] and leaves
//! the encounter unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combatant::CombatantId;
use crate::escape::{EscapeMethod, EscapeReport};
use crate::item::{ItemEffect, ItemKind};
use crate::math::GridPos;

/// AP cost of one move action.
pub const MOVE_COST: u32 = 1;

/// AP cost of a basic attack.
pub const ATTACK_COST: u32 = 2;

/// AP cost of using a consumable.
pub const USE_ITEM_COST: u32 = 1;

/// Ending the turn is free (remaining AP is forfeited).
pub const END_TURN_COST: u32 = 0;

/// Calling a retreat costs nothing; a failed attempt ends the turn instead.
pub const ESCAPE_COST: u32 = 0;

/// Something the acting combatant wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Move to a tile within movement range.
    Move {
        /// Destination tile.
        to: GridPos,
    },
    /// Basic attack with the equipped weapon.
    Attack {
        /// Who to shoot or stab.
        target: CombatantId,
    },
    /// Use a consumable on self or an adjacent teammate.
    UseItem {
        /// Item to consume.
        item: ItemKind,
        /// Recipient.
        target: CombatantId,
    },
    /// Forfeit remaining AP and pass to the next combatant.
    EndTurn,
    /// Try to get the party out of the fight.
    Escape {
        /// Solo run or sacrifice.
        method: EscapeMethod,
    },
}

impl Intent {
    /// AP this intent costs.
    #[must_use]
    pub const fn ap_cost(&self) -> u32 {
        match self {
            Intent::Move { .. } => MOVE_COST,
            Intent::Attack { .. } => ATTACK_COST,
            Intent::UseItem { .. } => USE_ITEM_COST,
            Intent::EndTurn => END_TURN_COST,
            Intent::Escape { .. } => ESCAPE_COST,
        }
    }
}

/// Recoverable rejection of an intent or escape attempt.
///
/// These are gameplay states, not bugs: the UI shows the message, the AI
/// picks something else, the encounter carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActionError {
    /// The action costs more AP than the actor has left.
    #[error("insufficient AP: need {required}, have {available}")]
    InsufficientAp {
        /// AP the action costs.
        required: u32,
        /// AP the actor has.
        available: u32,
    },

    /// Target is further away than the weapon reaches.
    #[error("target {0} is out of range")]
    OutOfRange(CombatantId),

    /// Target is dead, friendly, or otherwise not attackable.
    #[error("{0} is not a valid target")]
    InvalidTarget(CombatantId),

    /// Another living combatant stands on the destination.
    #[error("destination {0} is occupied")]
    DestinationOccupied(GridPos),

    /// Destination is off the grid.
    #[error("destination {0} is out of bounds")]
    OutOfBounds(GridPos),

    /// Destination is beyond movement range (or is the current tile).
    #[error("destination {0} is not reachable in one move")]
    TooFar(GridPos),

    /// Escape conditions are not met.
    #[error("escape is not available")]
    EscapeUnavailable,

    /// The encounter has already ended.
    #[error("combat is over")]
    CombatOver,

    /// The combatant is not the one whose turn it is (or cannot lead).
    #[error("{0} cannot act right now")]
    NotActing(CombatantId),

    /// The actor carries none of the requested item.
    #[error("no {} left", .0.display_name())]
    MissingItem(ItemKind),

    /// No combatant with this id exists in the encounter.
    #[error("unknown combatant {0}")]
    UnknownCombatant(CombatantId),
}

/// Full account of one attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackReport {
    /// Who attacked.
    pub attacker: CombatantId,
    /// Who was attacked.
    pub target: CombatantId,
    /// Hit chance the roll was made against.
    pub hit_chance: u32,
    /// Whether the attack connected.
    pub hit: bool,
    /// Damage dealt (0 on a miss).
    pub damage: u32,
    /// Whether the hit was critical.
    pub critical: bool,
    /// Morale the target lost.
    pub morale_loss: u32,
    /// Whether the target died.
    pub killed: bool,
}

/// Successful resolution of an [`Intent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The actor changed tiles.
    Moved {
        /// Who moved.
        actor: CombatantId,
        /// Start tile.
        from: GridPos,
        /// End tile.
        to: GridPos,
    },
    /// An attack was resolved (hit or miss).
    Attacked(AttackReport),
    /// A consumable was used.
    ItemUsed {
        /// Who used it.
        actor: CombatantId,
        /// Who received it.
        target: CombatantId,
        /// What was used.
        item: ItemKind,
        /// The effect as actually applied after clamping.
        applied: ItemEffect,
    },
    /// The turn passed.
    TurnEnded {
        /// Who ended their turn.
        actor: CombatantId,
        /// Who acts next (`None` once combat is over).
        next: Option<CombatantId>,
    },
    /// An escape was attempted. A failed roll is still an outcome, not an error.
    Escaped(EscapeReport),
}
