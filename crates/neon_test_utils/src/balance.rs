//! Balance testing utilities for headless encounters.
//!
//! Runs the same encounter setup under many seeds and tallies who won, so
//! weapon and attribute tuning can be checked against win-rate bands.

use neon_core::prelude::*;
use serde::{Deserialize, Serialize};

/// Result of a single simulated encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleResult {
    /// Seed the encounter ran with.
    pub seed: u64,
    /// The outcome (None if the round limit was hit).
    pub victor: Option<Victor>,
    /// Rounds completed.
    pub rounds: u32,
    /// Living player-side combatants at the end.
    pub party_survivors: u32,
    /// Living enemies at the end.
    pub enemy_survivors: u32,
}

impl BattleResult {
    /// Summarize a finished (or abandoned) encounter.
    #[must_use]
    pub fn from_encounter<R: CombatRng>(seed: u64, encounter: &Encounter<R>) -> Self {
        let survivors = |ids: &[CombatantId]| -> u32 {
            let alive = ids
                .iter()
                .filter_map(|id| encounter.combatant(*id))
                .filter(|c| c.is_alive())
                .count();
            u32::try_from(alive).unwrap_or(u32::MAX)
        };

        Self {
            seed,
            victor: encounter.victor(),
            rounds: encounter.turn_count(),
            party_survivors: survivors(encounter.player_team()),
            enemy_survivors: survivors(encounter.enemy_team()),
        }
    }
}

/// Statistics for a set of encounters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleStats {
    /// Total encounters run.
    pub total_battles: u32,
    /// Player victories.
    pub player_wins: u32,
    /// Enemy victories.
    pub enemy_wins: u32,
    /// Successful retreats.
    pub fled: u32,
    /// Encounters stopped by the round limit.
    pub unresolved: u32,
    /// Average rounds to resolution.
    pub avg_rounds: f64,
}

impl BattleStats {
    /// Tally a set of results.
    #[must_use]
    pub fn from_results(results: &[BattleResult]) -> Self {
        let mut stats = Self::default();
        let mut total_rounds = 0_u64;

        for result in results {
            stats.total_battles += 1;
            total_rounds += u64::from(result.rounds);
            match result.victor {
                Some(Victor::Player) => stats.player_wins += 1,
                Some(Victor::Enemy) => stats.enemy_wins += 1,
                Some(Victor::Fled) => stats.fled += 1,
                None => stats.unresolved += 1,
            }
        }

        if stats.total_battles > 0 {
            stats.avg_rounds = total_rounds as f64 / f64::from(stats.total_battles);
        }
        stats
    }

    /// Player win rate (0.0 to 1.0).
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        f64::from(self.player_wins) / f64::from(self.total_battles)
    }

    /// Share of encounters that ended in a retreat.
    #[must_use]
    pub fn flee_rate(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.0;
        }
        f64::from(self.fled) / f64::from(self.total_battles)
    }

    /// Check if the player win rate sits inside `[min_rate, max_rate]`.
    #[must_use]
    pub fn is_balanced(&self, min_rate: f64, max_rate: f64) -> bool {
        let rate = self.win_rate();
        rate >= min_rate && rate <= max_rate
    }
}

/// Run `setup` once per seed with the given tactics.
///
/// Seeds whose setup fails to build are skipped with a warning.
pub fn run_battles<P, E>(
    setup: &EncounterSetup,
    seeds: impl IntoIterator<Item = u64>,
    players: &P,
    enemies: &E,
    max_rounds: u32,
) -> Vec<BattleResult>
where
    P: Tactic + ?Sized,
    E: Tactic + ?Sized,
{
    seeds
        .into_iter()
        .filter_map(|seed| match setup.build(SeededRng::new(seed)) {
            Ok(mut encounter) => {
                encounter.auto_resolve(players, enemies, max_rounds);
                let result = BattleResult::from_encounter(seed, &encounter);
                tracing::debug!(seed, victor = ?result.victor, rounds = result.rounds, "Battle finished");
                Some(result)
            }
            Err(error) => {
                tracing::warn!(seed, %error, "Skipping unbuildable setup");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn result(victor: Option<Victor>, rounds: u32) -> BattleResult {
        BattleResult {
            seed: 0,
            victor,
            rounds,
            party_survivors: 0,
            enemy_survivors: 0,
        }
    }

    #[test]
    fn test_battle_stats_tally() {
        let stats = BattleStats::from_results(&[
            result(Some(Victor::Player), 4),
            result(Some(Victor::Player), 6),
            result(Some(Victor::Enemy), 5),
            result(Some(Victor::Fled), 3),
            result(None, 2),
        ]);

        assert_eq!(stats.total_battles, 5);
        assert_eq!(stats.player_wins, 2);
        assert_eq!(stats.enemy_wins, 1);
        assert_eq!(stats.fled, 1);
        assert_eq!(stats.unresolved, 1);
        assert!((stats.avg_rounds - 4.0).abs() < 0.001);
        assert!((stats.win_rate() - 0.4).abs() < 0.001);
        assert!((stats.flee_rate() - 0.2).abs() < 0.001);
        assert!(stats.is_balanced(0.35, 0.45));
        assert!(!stats.is_balanced(0.5, 0.6));
    }

    #[test]
    fn test_empty_stats() {
        let stats = BattleStats::from_results(&[]);
        assert_eq!(stats.total_battles, 0);
        assert!((stats.win_rate() - 0.5).abs() < f64::EPSILON);
        assert!(stats.flee_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_run_battles_resolves_skirmish() {
        let setup = fixtures::skirmish_setup();
        let results = run_battles(&setup, 0..20, &HeuristicAi, &HeuristicAi, 200);
        assert_eq!(results.len(), 20);

        for result in &results {
            match result.victor {
                Some(Victor::Player) => assert_eq!(result.enemy_survivors, 0),
                Some(Victor::Enemy) => assert_eq!(result.party_survivors, 0),
                Some(Victor::Fled) | None => {}
            }
        }

        let stats = BattleStats::from_results(&results);
        assert_eq!(stats.total_battles, 20);
        // Aggressive tactics on both sides never retreat.
        assert_eq!(stats.fled, 0);
    }

    #[test]
    fn test_run_battles_is_reproducible() {
        let setup = fixtures::skirmish_setup();
        let first = run_battles(&setup, [3, 9, 27], &HeuristicAi, &HeuristicAi, 100);
        let second = run_battles(&setup, [3, 9, 27], &HeuristicAi, &HeuristicAi, 100);
        assert_eq!(first, second);
    }
}
