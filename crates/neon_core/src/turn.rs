//! Initiative-ordered turn scheduling.
//!
//! The order is built once and never compacted: dead combatants keep their
//! slot and are skipped, so indices stay valid for the whole encounter.

use serde::{Deserialize, Serialize};

use crate::combatant::CombatantId;

/// Result of advancing the scheduler by one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnStep {
    /// Next living combatant, `None` if nobody is alive.
    pub next: Option<CombatantId>,
    /// Whether the index wrapped past the end of the order (a round ended).
    pub round_completed: bool,
}

/// Fixed turn order plus a cursor into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TurnScheduler {
    order: Vec<CombatantId>,
    index: usize,
    rounds: u32,
}

impl TurnScheduler {
    /// Build the order from `(id, initiative)` pairs.
    ///
    /// Sorted by initiative, highest first. The sort is stable: equal
    /// initiatives keep the order in which they were supplied.
    #[must_use]
    pub fn from_initiative(rolls: &[(CombatantId, i32)]) -> Self {
        let mut sorted = rolls.to_vec();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        Self {
            order: sorted.into_iter().map(|(id, _)| id).collect(),
            index: 0,
            rounds: 0,
        }
    }

    /// The full order, dead included.
    #[must_use]
    pub fn order(&self) -> &[CombatantId] {
        &self.order
    }

    /// Cursor into [`order`](Self::order).
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Completed rounds.
    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Combatant under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<CombatantId> {
        self.order.get(self.index).copied()
    }

    /// Move the cursor forward from its current slot (inclusive) to the first
    /// living combatant without counting a round. Used once at encounter start.
    pub fn settle(&mut self, is_alive: impl Fn(CombatantId) -> bool) -> Option<CombatantId> {
        let len = self.order.len();
        let start = self.index;
        let found = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| is_alive(self.order[i]))?;
        self.index = found;
        Some(self.order[found])
    }

    /// Advance to the next living combatant.
    ///
    /// Each time the cursor wraps back to slot 0 a round is counted, whether
    /// or not slot 0 is alive. A lone survivor gets consecutive turns.
    pub fn advance(&mut self, is_alive: impl Fn(CombatantId) -> bool) -> TurnStep {
        let len = self.order.len();
        let mut round_completed = false;

        for _ in 0..len {
            self.index = (self.index + 1) % len;
            if self.index == 0 {
                self.rounds += 1;
                round_completed = true;
            }
            let id = self.order[self.index];
            if is_alive(id) {
                return TurnStep {
                    next: Some(id),
                    round_completed,
                };
            }
        }

        TurnStep {
            next: None,
            round_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[usize]) -> Vec<CombatantId> {
        raw.iter().copied().map(CombatantId).collect()
    }

    #[test]
    fn test_order_descending_with_stable_ties() {
        let rolls = [
            (CombatantId(0), 12),
            (CombatantId(1), 17),
            (CombatantId(2), 12),
            (CombatantId(3), 20),
        ];
        let sched = TurnScheduler::from_initiative(&rolls);
        assert_eq!(sched.order(), ids(&[3, 1, 0, 2]).as_slice());
    }

    #[test]
    fn test_advance_wraps_and_counts_rounds() {
        let rolls = [(CombatantId(0), 3), (CombatantId(1), 2)];
        let mut sched = TurnScheduler::from_initiative(&rolls);
        let alive = |_: CombatantId| true;

        let step = sched.advance(alive);
        assert_eq!(step.next, Some(CombatantId(1)));
        assert!(!step.round_completed);

        let step = sched.advance(alive);
        assert_eq!(step.next, Some(CombatantId(0)));
        assert!(step.round_completed);
        assert_eq!(sched.rounds(), 1);
    }

    #[test]
    fn test_advance_skips_dead_without_compacting() {
        let rolls = [(CombatantId(0), 9), (CombatantId(1), 8), (CombatantId(2), 7)];
        let mut sched = TurnScheduler::from_initiative(&rolls);
        let alive = |id: CombatantId| id != CombatantId(1);

        let step = sched.advance(alive);
        assert_eq!(step.next, Some(CombatantId(2)));
        assert_eq!(sched.index(), 2);
        assert_eq!(sched.order().len(), 3);
    }

    #[test]
    fn test_wrap_counts_even_if_first_slot_dead() {
        let rolls = [(CombatantId(0), 9), (CombatantId(1), 8), (CombatantId(2), 7)];
        let mut sched = TurnScheduler::from_initiative(&rolls);
        sched.advance(|_| true);
        sched.advance(|_| true);
        let step = sched.advance(|id| id != CombatantId(0));
        assert_eq!(step.next, Some(CombatantId(1)));
        assert!(step.round_completed);
        assert_eq!(sched.rounds(), 1);
    }

    #[test]
    fn test_lone_survivor_acts_every_turn() {
        let rolls = [(CombatantId(0), 9), (CombatantId(1), 8)];
        let mut sched = TurnScheduler::from_initiative(&rolls);
        let only_zero = |id: CombatantId| id == CombatantId(0);
        let step = sched.advance(only_zero);
        assert_eq!(step.next, Some(CombatantId(0)));
        assert!(step.round_completed);
    }

    #[test]
    fn test_all_dead() {
        let rolls = [(CombatantId(0), 9), (CombatantId(1), 8)];
        let mut sched = TurnScheduler::from_initiative(&rolls);
        assert_eq!(sched.advance(|_| false).next, None);
    }

    #[test]
    fn test_settle_finds_first_living() {
        let rolls = [(CombatantId(0), 9), (CombatantId(1), 8)];
        let mut sched = TurnScheduler::from_initiative(&rolls);
        assert_eq!(
            sched.settle(|id| id == CombatantId(1)),
            Some(CombatantId(1))
        );
        assert_eq!(sched.rounds(), 0);
        assert_eq!(sched.index(), 1);
    }
}
