//! Decision making for computer-controlled combatants.
//!
//! A [`Tactic`] looks at a read-only [`EncounterView`] and returns the next
//! [`Intent`] for the acting combatant. Tactics keep no memory between calls:
//! the encounter asks again after every resolved action, so the decision
//! always reflects the latest HP, AP and positions.

use serde::{Deserialize, Serialize};

use crate::action::{Intent, ATTACK_COST, MOVE_COST};
use crate::combatant::CombatantId;
use crate::escape::EscapeMethod;
use crate::math::GridPos;
use crate::view::{nearest, EncounterView};

/// Strategy that picks the next action for a combatant.
pub trait Tactic {
    /// Decide what `actor` does next.
    fn decide(&self, actor: CombatantId, view: &EncounterView<'_>) -> Intent;
}

impl<T: Tactic + ?Sized> Tactic for &T {
    fn decide(&self, actor: CombatantId, view: &EncounterView<'_>) -> Intent {
        (**self).decide(actor, view)
    }
}

impl<T: Tactic + ?Sized> Tactic for Box<T> {
    fn decide(&self, actor: CombatantId, view: &EncounterView<'_>) -> Intent {
        (**self).decide(actor, view)
    }
}

/// The default enemy behaviour: shoot what you can reach, otherwise close in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeuristicAi;

impl Tactic for HeuristicAi {
    fn decide(&self, actor: CombatantId, view: &EncounterView<'_>) -> Intent {
        decide_intent(actor, view)
    }
}

/// Heuristic decision as a free function.
///
/// 1. A hostile in weapon range and at least 2 AP: attack the nearest one
///    (ties go to the first in arena order).
/// 2. At least 1 AP: move toward the nearest living hostile.
/// 3. Otherwise end the turn.
#[must_use]
pub fn decide_intent(actor: CombatantId, view: &EncounterView<'_>) -> Intent {
    let Some(me) = view.get(actor) else {
        return Intent::EndTurn;
    };
    if !me.is_alive() {
        return Intent::EndTurn;
    }

    if me.ap() >= ATTACK_COST {
        let in_range = view
            .valid_targets(actor)
            .into_iter()
            .filter_map(|id| view.get(id));
        if let Some(target) = nearest(in_range, me.position()) {
            return Intent::Attack {
                target: target.id(),
            };
        }
    }

    if me.ap() >= MOVE_COST {
        if let Some(to) = step_toward_nearest(actor, view) {
            return Intent::Move { to };
        }
    }

    Intent::EndTurn
}

/// Best single move toward the nearest living hostile.
///
/// Picks the reachable tile closest to that hostile, ties broken by the
/// lowest `(y, x)`. Returns `None` when no tile gets strictly closer.
#[must_use]
pub fn step_toward_nearest(actor: CombatantId, view: &EncounterView<'_>) -> Option<GridPos> {
    let me = view.get(actor)?;
    let goal = view.nearest_hostile(actor)?.position();
    let current = me.position().manhattan_distance(goal);

    let (best, distance) = view
        .valid_moves(actor)
        .into_iter()
        .map(|tile| (tile, tile.manhattan_distance(goal)))
        .min_by_key(|&(tile, distance)| (distance, tile.scan_key()))?;

    (distance < current).then_some(best)
}

/// Player-side behaviour that calls a solo retreat once the party is hurting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CautiousAi {
    /// Average party HP (percent) below which the actor tries to escape.
    pub retreat_below_percent: u32,
}

impl Default for CautiousAi {
    fn default() -> Self {
        Self {
            retreat_below_percent: 35,
        }
    }
}

impl Tactic for CautiousAi {
    fn decide(&self, actor: CombatantId, view: &EncounterView<'_>) -> Intent {
        let player_side = view
            .get(actor)
            .is_some_and(|c| c.is_alive() && c.team().is_player_side());
        if player_side
            && view.escape_available()
            && view.party_hp_percent() < self.retreat_below_percent
        {
            return Intent::Escape {
                method: EscapeMethod::Solo,
            };
        }
        decide_intent(actor, view)
    }
}

/// Serializable choice of tactic, for scenario files and CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TacticKind {
    /// [`HeuristicAi`].
    #[default]
    Aggressive,
    /// [`CautiousAi`] with the given retreat threshold.
    Cautious {
        /// Average party HP (percent) that triggers a retreat.
        retreat_below_percent: u32,
    },
    /// Never acts; ends every turn immediately.
    Passive,
}

impl Tactic for TacticKind {
    fn decide(&self, actor: CombatantId, view: &EncounterView<'_>) -> Intent {
        match *self {
            TacticKind::Aggressive => decide_intent(actor, view),
            TacticKind::Cautious {
                retreat_below_percent,
            } => CautiousAi {
                retreat_below_percent,
            }
            .decide(actor, view),
            TacticKind::Passive => Intent::EndTurn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{Attributes, Combatant, Team};
    use crate::grid::Grid;
    use crate::weapon::catalog;

    fn arena(mut combatants: Vec<Combatant>) -> Vec<Combatant> {
        for (i, c) in combatants.iter_mut().enumerate() {
            c.assign_id(CombatantId(i));
        }
        combatants
    }

    fn unit(name: &str, team: Team, x: i32, y: i32) -> Combatant {
        Combatant::new(name, team, Attributes::default(), 100, 0, catalog::pistol()).at(x, y)
    }

    #[test]
    fn test_attacks_nearest_in_range() {
        let roster = arena(vec![
            unit("Grunt", Team::Enemy, 5, 5),
            unit("Far", Team::Player, 5, 10),
            unit("Near", Team::Player, 5, 7),
        ]);
        let grid = Grid::new(12, 12);
        let view = EncounterView::new(&roster, &grid, 0, false);
        assert_eq!(
            decide_intent(CombatantId(0), &view),
            Intent::Attack {
                target: CombatantId(2)
            }
        );
    }

    #[test]
    fn test_distance_tie_goes_to_arena_order() {
        let roster = arena(vec![
            unit("Grunt", Team::Enemy, 5, 5),
            unit("Left", Team::Player, 3, 5),
            unit("Right", Team::Player, 7, 5),
        ]);
        let grid = Grid::new(12, 12);
        let view = EncounterView::new(&roster, &grid, 0, false);
        assert_eq!(
            decide_intent(CombatantId(0), &view),
            Intent::Attack {
                target: CombatantId(1)
            }
        );
    }

    #[test]
    fn test_moves_toward_out_of_range_hostile() {
        let mut grunt = Combatant::new(
            "Grunt",
            Team::Enemy,
            Attributes::default(),
            60,
            0,
            catalog::combat_knife(),
        )
        .at(0, 0);
        grunt.assign_id(CombatantId(0));
        let mut target = unit("V", Team::Player, 10, 0);
        target.assign_id(CombatantId(1));
        let roster = vec![grunt, target];
        let grid = Grid::new(12, 12);
        let view = EncounterView::new(&roster, &grid, 0, false);

        // Movement 5 from (0,0): the closest reachable tile to (10,0) is (5,0).
        assert_eq!(
            decide_intent(CombatantId(0), &view),
            Intent::Move {
                to: GridPos::new(5, 0)
            }
        );
    }

    #[test]
    fn test_one_ap_cannot_attack_so_it_moves() {
        let mut roster = arena(vec![
            unit("Grunt", Team::Enemy, 0, 0),
            unit("V", Team::Player, 0, 11),
        ]);
        roster[0].spend_ap(2).expect("fresh combatant has 3 AP");
        let grid = Grid::new(12, 12);
        let view = EncounterView::new(&roster, &grid, 0, false);
        assert!(matches!(
            decide_intent(CombatantId(0), &view),
            Intent::Move { .. }
        ));
    }

    #[test]
    fn test_ends_turn_without_ap() {
        let mut roster = arena(vec![
            unit("Grunt", Team::Enemy, 0, 0),
            unit("V", Team::Player, 0, 1),
        ]);
        roster[0].forfeit_ap();
        let grid = Grid::new(12, 12);
        let view = EncounterView::new(&roster, &grid, 0, false);
        assert_eq!(decide_intent(CombatantId(0), &view), Intent::EndTurn);
    }

    #[test]
    fn test_ignores_dead_hostiles() {
        let mut roster = arena(vec![
            unit("Grunt", Team::Enemy, 0, 0),
            unit("Corpse", Team::Player, 0, 1),
        ]);
        roster[1].kill();
        let grid = Grid::new(12, 12);
        let view = EncounterView::new(&roster, &grid, 0, false);
        assert_eq!(decide_intent(CombatantId(0), &view), Intent::EndTurn);
    }

    #[test]
    fn test_blocked_adjacent_does_not_shuffle() {
        // Knife wielder already adjacent but with 1 AP: no tile is closer.
        let mut roster = arena(vec![
            Combatant::new(
                "Grunt",
                Team::Enemy,
                Attributes::default(),
                60,
                0,
                catalog::combat_knife(),
            )
            .at(4, 4),
            unit("V", Team::Player, 4, 5),
        ]);
        roster[0].spend_ap(2).expect("fresh combatant has 3 AP");
        let grid = Grid::new(12, 12);
        let view = EncounterView::new(&roster, &grid, 0, false);
        assert_eq!(decide_intent(CombatantId(0), &view), Intent::EndTurn);
    }

    #[test]
    fn test_cautious_retreats_when_hurt() {
        let roster = arena(vec![
            unit("V", Team::Player, 0, 0).with_hp(20),
            unit("Grunt", Team::Enemy, 0, 1),
        ]);
        let grid = Grid::new(12, 12);
        let cautious = CautiousAi::default();

        let open = EncounterView::new(&roster, &grid, 3, true);
        assert_eq!(
            cautious.decide(CombatantId(0), &open),
            Intent::Escape {
                method: EscapeMethod::Solo
            }
        );

        let closed = EncounterView::new(&roster, &grid, 3, false);
        assert!(matches!(
            cautious.decide(CombatantId(0), &closed),
            Intent::Attack { .. }
        ));

        // Enemies never retreat.
        assert!(matches!(
            cautious.decide(CombatantId(1), &open),
            Intent::Attack { .. }
        ));
    }

    #[test]
    fn test_tactic_kind_parses_from_ron() {
        let kind: TacticKind = ron::from_str("Cautious(retreat_below_percent: 40)")
            .expect("valid RON");
        assert_eq!(
            kind,
            TacticKind::Cautious {
                retreat_below_percent: 40
            }
        );
        let passive: TacticKind = ron::from_str("Passive").expect("valid RON");
        let roster = arena(vec![unit("V", Team::Player, 0, 0)]);
        let grid = Grid::default();
        let view = EncounterView::new(&roster, &grid, 0, false);
        assert_eq!(passive.decide(CombatantId(0), &view), Intent::EndTurn);
    }
}
