//! Encounter metrics collection for balance analysis.
//!
//! [`MetricsCollector`] watches the outcomes an encounter produces and turns
//! them into per-side counters; [`BatchSummary`] aggregates many runs.

use neon_core::prelude::{ActionOutcome, CombatRng, CombatantId, Encounter, Team, Victor};
use serde::{Deserialize, Serialize};

/// Counters for one side of an encounter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideMetrics {
    /// Attacks made.
    pub attacks: u32,
    /// Attacks that connected.
    pub hits: u32,
    /// Critical hits.
    pub crits: u32,
    /// Total damage dealt.
    pub damage_dealt: u64,
    /// Kills scored.
    pub kills: u32,
    /// Move actions.
    pub moves: u32,
    /// Items used.
    pub items_used: u32,
    /// Combatants still standing at the end.
    pub survivors: u32,
}

impl SideMetrics {
    /// Hits over attacks (0 with no attacks).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.attacks == 0 {
            return 0.0;
        }
        self.hits as f64 / self.attacks as f64
    }
}

/// Complete metrics for a single encounter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Outcome (None = round limit).
    pub victor: Option<Victor>,
    /// Rounds completed.
    pub rounds: u32,
    /// Turns taken.
    pub turns: u32,
    /// Player team and allies.
    pub party: SideMetrics,
    /// Enemy team.
    pub enemies: SideMetrics,
    /// Escape attempts, successful or not.
    pub escape_attempts: u32,
    /// Final encounter state hash (for determinism validation).
    pub final_state_hash: u64,
}

/// Builds [`EncounterMetrics`] from the outcomes of an encounter.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: EncounterMetrics,
}

impl MetricsCollector {
    /// Start collecting for one run.
    #[must_use]
    pub fn new(scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            metrics: EncounterMetrics {
                scenario: scenario.into(),
                seed,
                ..Default::default()
            },
        }
    }

    /// Record one outcome. `team` is the acting combatant's team.
    pub fn record(&mut self, team: Team, outcome: &ActionOutcome) {
        let side = if team.is_player_side() {
            &mut self.metrics.party
        } else {
            &mut self.metrics.enemies
        };

        match outcome {
            ActionOutcome::Moved { .. } => side.moves += 1,
            ActionOutcome::Attacked(report) => {
                side.attacks += 1;
                if report.hit {
                    side.hits += 1;
                    side.damage_dealt += u64::from(report.damage);
                }
                if report.critical {
                    side.crits += 1;
                }
                if report.killed {
                    side.kills += 1;
                }
            }
            ActionOutcome::ItemUsed { .. } => side.items_used += 1,
            ActionOutcome::TurnEnded { .. } => self.metrics.turns += 1,
            ActionOutcome::Escaped(report) => {
                self.metrics.escape_attempts += 1;
                if !report.success {
                    self.metrics.turns += 1;
                }
            }
        }
    }

    /// Record a batch of outcomes from one actor.
    pub fn record_all<'a>(
        &mut self,
        team: Team,
        outcomes: impl IntoIterator<Item = &'a ActionOutcome>,
    ) {
        for outcome in outcomes {
            self.record(team, outcome);
        }
    }

    /// Finish with the final encounter state.
    #[must_use]
    pub fn finish<R: CombatRng>(mut self, encounter: &Encounter<R>) -> EncounterMetrics {
        let survivors = |ids: &[CombatantId]| {
            ids.iter()
                .filter_map(|id| encounter.combatant(*id))
                .filter(|c| c.is_alive())
                .count() as u32
        };
        self.metrics.party.survivors = survivors(encounter.player_team());
        self.metrics.enemies.survivors = survivors(encounter.enemy_team());
        self.metrics.victor = encounter.victor();
        self.metrics.rounds = encounter.turn_count();
        self.metrics.final_state_hash = encounter.state_hash();
        self.metrics
    }
}

/// Summary statistics across multiple encounters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total encounters run.
    pub total_encounters: u32,
    /// Player victories.
    pub player_wins: u32,
    /// Enemy victories.
    pub enemy_wins: u32,
    /// Successful retreats.
    pub fled: u32,
    /// Encounters that hit the round limit.
    pub unresolved: u32,
    /// Player win rate.
    pub win_rate: f64,
    /// Retreat rate.
    pub flee_rate: f64,
    /// Average rounds per encounter.
    pub avg_rounds: f64,
    /// Shortest encounter.
    pub min_rounds: u32,
    /// Longest encounter.
    pub max_rounds: u32,
    /// Average party damage per encounter.
    pub avg_party_damage: f64,
    /// Average enemy damage per encounter.
    pub avg_enemy_damage: f64,
    /// Party hit rate over all attacks.
    pub party_hit_rate: f64,
    /// Enemy hit rate over all attacks.
    pub enemy_hit_rate: f64,
    /// Average party survivors.
    pub avg_party_survivors: f64,
}

impl BatchSummary {
    /// Calculate summary from a list of encounter metrics.
    #[must_use]
    pub fn from_encounters(encounters: &[EncounterMetrics]) -> Self {
        if encounters.is_empty() {
            return Self::default();
        }

        let total = encounters.len() as f64;
        let mut summary = Self {
            total_encounters: encounters.len() as u32,
            min_rounds: u32::MAX,
            ..Default::default()
        };

        let mut rounds = 0_u64;
        let mut party_damage = 0_u64;
        let mut enemy_damage = 0_u64;
        let mut party = SideMetrics::default();
        let mut enemies = SideMetrics::default();
        let mut party_survivors = 0_u64;

        for fight in encounters {
            match fight.victor {
                Some(Victor::Player) => summary.player_wins += 1,
                Some(Victor::Enemy) => summary.enemy_wins += 1,
                Some(Victor::Fled) => summary.fled += 1,
                None => summary.unresolved += 1,
            }
            rounds += u64::from(fight.rounds);
            summary.min_rounds = summary.min_rounds.min(fight.rounds);
            summary.max_rounds = summary.max_rounds.max(fight.rounds);

            party_damage += fight.party.damage_dealt;
            enemy_damage += fight.enemies.damage_dealt;
            party.attacks += fight.party.attacks;
            party.hits += fight.party.hits;
            enemies.attacks += fight.enemies.attacks;
            enemies.hits += fight.enemies.hits;
            party_survivors += u64::from(fight.party.survivors);
        }

        summary.win_rate = f64::from(summary.player_wins) / total;
        summary.flee_rate = f64::from(summary.fled) / total;
        summary.avg_rounds = rounds as f64 / total;
        summary.avg_party_damage = party_damage as f64 / total;
        summary.avg_enemy_damage = enemy_damage as f64 / total;
        summary.party_hit_rate = party.hit_rate();
        summary.enemy_hit_rate = enemies.hit_rate();
        summary.avg_party_survivors = party_survivors as f64 / total;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neon_core::prelude::AttackReport;

    fn attack(hit: bool, damage: u32, critical: bool, killed: bool) -> ActionOutcome {
        ActionOutcome::Attacked(AttackReport {
            attacker: CombatantId(0),
            target: CombatantId(1),
            hit_chance: 70,
            hit,
            damage,
            critical,
            morale_loss: 0,
            killed,
        })
    }

    #[test]
    fn test_collector_counts_per_side() {
        let mut collector = MetricsCollector::new("Test", 9);
        collector.record_all(
            Team::Ally,
            &[
                attack(true, 30, false, false),
                attack(false, 0, false, false),
                ActionOutcome::TurnEnded {
                    actor: CombatantId(0),
                    next: Some(CombatantId(1)),
                },
            ],
        );
        collector.record(Team::Enemy, &attack(true, 50, true, true));

        let metrics = collector.metrics;
        assert_eq!(metrics.party.attacks, 2);
        assert_eq!(metrics.party.hits, 1);
        assert_eq!(metrics.party.damage_dealt, 30);
        assert!((metrics.party.hit_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(metrics.enemies.crits, 1);
        assert_eq!(metrics.enemies.kills, 1);
        assert_eq!(metrics.turns, 1);
    }

    #[test]
    fn test_summary_from_encounters() {
        let fight = |victor, rounds, damage| EncounterMetrics {
            victor,
            rounds,
            party: SideMetrics {
                attacks: 4,
                hits: 2,
                damage_dealt: damage,
                survivors: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let summary = BatchSummary::from_encounters(&[
            fight(Some(Victor::Player), 4, 100),
            fight(Some(Victor::Enemy), 6, 50),
            fight(Some(Victor::Fled), 3, 30),
            fight(None, 10, 20),
        ]);

        assert_eq!(summary.total_encounters, 4);
        assert_eq!(summary.player_wins, 1);
        assert_eq!(summary.enemy_wins, 1);
        assert_eq!(summary.fled, 1);
        assert_eq!(summary.unresolved, 1);
        assert!((summary.win_rate - 0.25).abs() < 0.001);
        assert!((summary.avg_rounds - 5.75).abs() < 0.001);
        assert_eq!(summary.min_rounds, 3);
        assert_eq!(summary.max_rounds, 10);
        assert!((summary.avg_party_damage - 50.0).abs() < 0.001);
        assert!((summary.party_hit_rate - 0.5).abs() < 0.001);
        assert!((summary.enemy_hit_rate).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_encounters(&[]);
        assert_eq!(summary.total_encounters, 0);
        assert_eq!(summary.min_rounds, 0);
    }
}
