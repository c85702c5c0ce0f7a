//! Read-only snapshot of an encounter for decision making.
//!
//! Targeting and movement rules live here so the encounter (which enforces
//! them) and the AI (which plans with them) share one implementation.

use crate::combatant::{Combatant, CombatantId};
use crate::grid::Grid;
use crate::math::GridPos;

/// Borrowed view over an encounter's combatants and battlefield.
#[derive(Debug, Clone, Copy)]
pub struct EncounterView<'a> {
    combatants: &'a [Combatant],
    grid: &'a Grid,
    rounds_completed: u32,
    escape_available: bool,
}

impl<'a> EncounterView<'a> {
    /// Create a view. `combatants` must be indexed by [`CombatantId`].
    #[must_use]
    pub fn new(
        combatants: &'a [Combatant],
        grid: &'a Grid,
        rounds_completed: u32,
        escape_available: bool,
    ) -> Self {
        Self {
            combatants,
            grid,
            rounds_completed,
            escape_available,
        }
    }

    /// Look up a combatant.
    #[must_use]
    pub fn get(&self, id: CombatantId) -> Option<&'a Combatant> {
        self.combatants.get(id.0)
    }

    /// Every combatant, in arena order.
    #[must_use]
    pub fn combatants(&self) -> &'a [Combatant] {
        self.combatants
    }

    /// Battlefield.
    #[must_use]
    pub fn grid(&self) -> &'a Grid {
        self.grid
    }

    /// Completed rounds.
    #[must_use]
    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    /// Whether the party may currently retreat.
    #[must_use]
    pub fn escape_available(&self) -> bool {
        self.escape_available
    }

    /// Living combatant standing on `pos`, if any.
    #[must_use]
    pub fn occupant(&self, pos: GridPos) -> Option<&'a Combatant> {
        self.combatants
            .iter()
            .find(|c| c.is_alive() && c.position() == pos)
    }

    /// Living combatants hostile to `id`, in arena order.
    pub fn living_hostiles(&self, id: CombatantId) -> impl Iterator<Item = &'a Combatant> {
        let team = self.get(id).map(Combatant::team);
        self.combatants.iter().filter(move |c| {
            c.is_alive() && team.is_some_and(|t| t.is_hostile_to(c.team()))
        })
    }

    /// Targets `attacker` can hit right now: alive, hostile, within weapon
    /// range (Manhattan). Arena order.
    #[must_use]
    pub fn valid_targets(&self, attacker: CombatantId) -> Vec<CombatantId> {
        let Some(actor) = self.get(attacker) else {
            return Vec::new();
        };
        if !actor.is_alive() {
            return Vec::new();
        }
        let range = actor.weapon().range;
        self.living_hostiles(attacker)
            .filter(|c| actor.position().manhattan_distance(c.position()) <= range)
            .map(Combatant::id)
            .collect()
    }

    /// Tiles `mover` can reach with one move action: in bounds, free of
    /// living combatants, within movement range of the current tile.
    /// Row-major order.
    #[must_use]
    pub fn valid_moves(&self, mover: CombatantId) -> Vec<GridPos> {
        let Some(actor) = self.get(mover) else {
            return Vec::new();
        };
        if !actor.is_alive() {
            return Vec::new();
        }
        self.grid
            .tiles_within(actor.position(), actor.movement_range())
            .filter(|&pos| pos != actor.position() && self.occupant(pos).is_none())
            .collect()
    }

    /// Nearest living hostile; ties go to the first in arena order.
    #[must_use]
    pub fn nearest_hostile(&self, id: CombatantId) -> Option<&'a Combatant> {
        let origin = self.get(id)?.position();
        nearest(self.living_hostiles(id), origin)
    }

    /// Average HP fraction of the player side, as a percentage.
    #[must_use]
    pub fn party_hp_percent(&self) -> u32 {
        let party: Vec<&Combatant> = self
            .combatants
            .iter()
            .filter(|c| c.team().is_player_side())
            .collect();
        if party.is_empty() {
            return 0;
        }
        let total: u64 = party
            .iter()
            .map(|c| u64::from(c.hp()) * 100 / u64::from(c.max_hp()))
            .sum();
        (total / party.len() as u64) as u32
    }
}

/// First combatant with the smallest Manhattan distance to `origin`.
pub(crate) fn nearest<'a>(
    candidates: impl IntoIterator<Item = &'a Combatant>,
    origin: GridPos,
) -> Option<&'a Combatant> {
    let mut best: Option<(&Combatant, u32)> = None;
    for c in candidates {
        let d = origin.manhattan_distance(c.position());
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((c, d));
        }
    }
    best.map(|(c, _)| c)
}
