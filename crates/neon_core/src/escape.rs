//! Escape rules: when the party may retreat and how likely it is to work.
//!
//! The functions here are pure; the encounter applies the consequences.
//!
//! Eligibility (re-evaluated at every round boundary):
//! - at least [`ESCAPE_MIN_ROUNDS`] rounds completed, **and**
//! - the party is hurting: average HP below 50%, someone is down, or the
//!   living enemies outnumber the living party two to one.

use serde::{Deserialize, Serialize};

use crate::combatant::{Combatant, CombatantId, DamageTaken};
use crate::math::Fixed;

/// Rounds that must complete before any retreat.
pub const ESCAPE_MIN_ROUNDS: u32 = 3;

/// Solo escape base chance before the reflexes bonus.
pub const SOLO_BASE_CHANCE: u32 = 45;

/// Solo escape chance floor.
pub const SOLO_MIN_CHANCE: u32 = 5;

/// Solo escape chance ceiling.
pub const SOLO_MAX_CHANCE: u32 = 95;

/// Sacrifice escape chance, independent of stats.
pub const SACRIFICE_CHANCE: u32 = 93;

/// Percent of the leader's max HP lost on a failed solo escape.
pub const FAILED_ESCAPE_DAMAGE_PERCENT: u32 = 20;

/// Morale every survivor loses when the party flees.
pub const FLEE_MORALE_LOSS: u32 = 20;

/// How the party tries to get out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscapeMethod {
    /// The acting combatant leads a run for it.
    Solo,
    /// One member stays behind to cover the others.
    Sacrifice {
        /// Who stays behind. Dies whether or not the escape works.
        member: CombatantId,
    },
}

/// Account of an escape attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeReport {
    /// Method used.
    pub method: EscapeMethod,
    /// Acting combatant who called the retreat.
    pub leader: CombatantId,
    /// Success chance in percent.
    pub chance: u32,
    /// Percentile roll (success when `roll <= chance`).
    pub roll: u32,
    /// Whether the party got away.
    pub success: bool,
    /// Member left behind, for sacrifices.
    pub sacrificed: Option<CombatantId>,
    /// Damage the leader took on a failed solo attempt.
    pub leader_damage: Option<DamageTaken>,
    /// Everyone who left the fight.
    pub fled: Vec<CombatantId>,
}

/// `clamp(45 + reflexes x 2, 5, 95)`.
#[must_use]
pub fn solo_escape_chance(leader: &Combatant) -> u32 {
    (SOLO_BASE_CHANCE + u32::from(leader.attributes().reflexes) * 2)
        .clamp(SOLO_MIN_CHANCE, SOLO_MAX_CHANCE)
}

/// Damage the leader takes when a solo escape fails.
#[must_use]
pub fn failed_escape_damage(leader: &Combatant) -> u32 {
    let damage = u64::from(leader.max_hp()) * u64::from(FAILED_ESCAPE_DAMAGE_PERCENT) / 100;
    damage as u32
}

/// Whether the party may attempt an escape.
///
/// `party` is the whole player-side roster (dead included, they count as 0 HP
/// in the average); `enemies` is the whole enemy roster (only the living are
/// counted).
#[must_use]
pub fn is_escape_eligible<'a>(
    rounds_completed: u32,
    party: impl IntoIterator<Item = &'a Combatant>,
    enemies: impl IntoIterator<Item = &'a Combatant>,
) -> bool {
    if rounds_completed < ESCAPE_MIN_ROUNDS {
        return false;
    }

    let party: Vec<&Combatant> = party.into_iter().collect();
    if party.is_empty() {
        return false;
    }

    let living_party = party.iter().filter(|c| c.is_alive()).count();
    let living_enemies = enemies.into_iter().filter(|c| c.is_alive()).count();

    let total_fraction = party
        .iter()
        .fold(Fixed::ZERO, |acc, c| acc + c.hp_fraction());
    let average = total_fraction / Fixed::from_num(party.len());
    let badly_hurt = average < Fixed::from_num(0.5);

    let someone_down = living_party < party.len();
    let outnumbered = living_enemies >= 2 * living_party;

    badly_hurt || someone_down || outnumbered
}
