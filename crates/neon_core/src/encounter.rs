//! The encounter state machine.
//!
//! An [`Encounter`] owns every combatant in an arena indexed by
//! [`CombatantId`], the initiative order, the battlefield and the injected
//! random source. Controllers feed it one [`Intent`] at a time through
//! [`Encounter::resolve`] (or the per-action convenience methods).
//!
//! Every action is validated completely before anything is mutated or any
//! roll is drawn, so a rejected intent leaves the encounter, and the RNG
//! stream, exactly as they were.
//!
//! ```text
//! Initializing -> Active -> PlayerVictory | EnemyVictory | Fled
//! ```
//!
//! Terminal phases are a latch: every mutating call afterwards fails with
//! [`ActionError::CombatOver`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::action::{
    ActionError, ActionOutcome, AttackReport, Intent, ATTACK_COST, MOVE_COST, USE_ITEM_COST,
};
use crate::ai::Tactic;
use crate::combatant::{Combatant, CombatantId, Team};
use crate::error::{CombatError, Result};
use crate::escape::{
    failed_escape_damage, is_escape_eligible, solo_escape_chance, EscapeMethod, EscapeReport,
    FLEE_MORALE_LOSS, SACRIFICE_CHANCE,
};
use crate::grid::Grid;
use crate::item::ItemKind;
use crate::log::CombatLog;
use crate::math::GridPos;
use crate::rng::{CombatRng, SeededRng};
use crate::turn::TurnScheduler;
use crate::view::EncounterView;

/// Reach of the UseItem intent in tiles.
pub const ITEM_REACH: u32 = 1;

/// Upper bound on actions a tactic may take in one turn before the turn is
/// forced to end.
pub const MAX_ACTIONS_PER_TURN: usize = 16;

/// Who won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Victor {
    /// Every enemy is dead.
    Player,
    /// Every player-side combatant is dead.
    Enemy,
    /// The party escaped.
    Fled,
}

impl std::fmt::Display for Victor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Victor::Player => "player",
            Victor::Enemy => "enemy",
            Victor::Fled => "fled",
        };
        f.write_str(label)
    }
}

/// Lifecycle of an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EncounterPhase {
    /// Rolling initiative.
    #[default]
    Initializing,
    /// Turns are being taken.
    Active,
    /// Terminal: the enemies are all dead.
    PlayerVictory,
    /// Terminal: the party is all dead.
    EnemyVictory,
    /// Terminal: the party escaped.
    Fled,
}

impl EncounterPhase {
    /// Whether no more actions will be accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            EncounterPhase::PlayerVictory | EncounterPhase::EnemyVictory | EncounterPhase::Fled
        )
    }

    /// Victor for terminal phases.
    #[must_use]
    pub const fn victor(self) -> Option<Victor> {
        match self {
            EncounterPhase::PlayerVictory => Some(Victor::Player),
            EncounterPhase::EnemyVictory => Some(Victor::Enemy),
            EncounterPhase::Fled => Some(Victor::Fled),
            EncounterPhase::Initializing | EncounterPhase::Active => None,
        }
    }
}

/// A single tactical fight.
#[derive(Debug)]
pub struct Encounter<R: CombatRng = SeededRng> {
    combatants: Vec<Combatant>,
    player_team: Vec<CombatantId>,
    enemy_team: Vec<CombatantId>,
    scheduler: TurnScheduler,
    grid: Grid,
    phase: EncounterPhase,
    escape_available: bool,
    log: CombatLog,
    rng: R,
    history: Vec<Intent>,
}

impl<R: CombatRng> Encounter<R> {
    /// Set up an encounter and roll initiative.
    ///
    /// Combatants are placed in the arena player team first, then enemies,
    /// each in the given order; that is also the tie-break order for equal
    /// initiative. The first combatant in turn order starts with full AP.
    ///
    /// # Errors
    ///
    /// [`CombatError::EmptyEncounter`] if both teams are empty, and
    /// [`CombatError::InvalidState`] if a team list carries the wrong team
    /// tag, a combatant stands off the grid, or two living combatants share
    /// a tile.
    pub fn new(
        players: Vec<Combatant>,
        enemies: Vec<Combatant>,
        grid: Grid,
        rng: R,
    ) -> Result<Self> {
        if players.is_empty() && enemies.is_empty() {
            return Err(CombatError::EmptyEncounter);
        }
        if let Some(c) = players.iter().find(|c| !c.team().is_player_side()) {
            return Err(CombatError::InvalidState(format!(
                "{} is on the player team but tagged {:?}",
                c.name(),
                c.team()
            )));
        }
        if let Some(c) = enemies.iter().find(|c| c.team() != Team::Enemy) {
            return Err(CombatError::InvalidState(format!(
                "{} is on the enemy team but tagged {:?}",
                c.name(),
                c.team()
            )));
        }

        let player_count = players.len();
        let mut combatants: Vec<Combatant> = players.into_iter().chain(enemies).collect();
        for (index, c) in combatants.iter_mut().enumerate() {
            c.assign_id(CombatantId(index));
        }
        check_placement(&combatants, &grid)?;

        let player_team = (0..player_count).map(CombatantId).collect();
        let enemy_team = (player_count..combatants.len()).map(CombatantId).collect();

        let mut encounter = Self {
            combatants,
            player_team,
            enemy_team,
            scheduler: TurnScheduler::default(),
            grid,
            phase: EncounterPhase::Initializing,
            escape_available: false,
            log: CombatLog::new(),
            rng,
            history: Vec::new(),
        };
        encounter.roll_initiative();
        encounter.start();
        Ok(encounter)
    }

    fn roll_initiative(&mut self) {
        let mut rolls = Vec::with_capacity(self.combatants.len());
        for c in &mut self.combatants {
            let initiative = c.roll_initiative(&mut self.rng);
            rolls.push((c.id(), initiative));
        }
        self.scheduler = TurnScheduler::from_initiative(&rolls);

        let order = self
            .scheduler
            .order()
            .iter()
            .filter_map(|&id| self.combatants.get(id.0))
            .map(|c| format!("{} ({})", c.name(), c.initiative().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(", ");
        self.log.record(format!("Turn order: {order}"));
    }

    fn start(&mut self) {
        self.phase = EncounterPhase::Active;
        tracing::info!(
            players = self.player_team.len(),
            enemies = self.enemy_team.len(),
            "Encounter started"
        );
        self.log.record("Combat begins");

        self.check_victory();
        if !self.is_active() {
            return;
        }

        let combatants = &self.combatants;
        if let Some(first) = self.scheduler.settle(|id| is_alive(combatants, id)) {
            self.activate(first);
        }
        self.refresh_escape();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Every combatant in arena order.
    #[must_use]
    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    /// Look up a combatant.
    #[must_use]
    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.get(id.0)
    }

    /// Player team roster (allies included).
    #[must_use]
    pub fn player_team(&self) -> &[CombatantId] {
        &self.player_team
    }

    /// Enemy roster.
    #[must_use]
    pub fn enemy_team(&self) -> &[CombatantId] {
        &self.enemy_team
    }

    /// Initiative order, dead included.
    #[must_use]
    pub fn turn_order(&self) -> &[CombatantId] {
        self.scheduler.order()
    }

    /// Index into [`turn_order`](Self::turn_order) of the acting combatant.
    #[must_use]
    pub fn current_turn_index(&self) -> usize {
        self.scheduler.index()
    }

    /// Completed rounds.
    #[must_use]
    pub fn turn_count(&self) -> u32 {
        self.scheduler.rounds()
    }

    /// Id of the combatant whose turn it is, `None` once combat is over.
    #[must_use]
    pub fn current_id(&self) -> Option<CombatantId> {
        if !self.is_active() {
            return None;
        }
        self.scheduler
            .current()
            .filter(|&id| is_alive(&self.combatants, id))
    }

    /// The combatant whose turn it is.
    #[must_use]
    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.current_id().and_then(|id| self.combatant(id))
    }

    /// Lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> EncounterPhase {
        self.phase
    }

    /// Whether actions are still accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == EncounterPhase::Active
    }

    /// Outcome, once the encounter is over.
    #[must_use]
    pub fn victor(&self) -> Option<Victor> {
        self.phase.victor()
    }

    /// Whether the party may retreat. Recomputed at round boundaries.
    #[must_use]
    pub fn escape_available(&self) -> bool {
        self.escape_available
    }

    /// The append-only combat log.
    #[must_use]
    pub fn log(&self) -> &CombatLog {
        &self.log
    }

    /// Battlefield.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Every intent that resolved successfully, in order.
    #[must_use]
    pub fn history(&self) -> &[Intent] {
        &self.history
    }

    /// Read-only view for tactics and UIs.
    #[must_use]
    pub fn view(&self) -> EncounterView<'_> {
        EncounterView::new(
            &self.combatants,
            &self.grid,
            self.scheduler.rounds(),
            self.escape_available,
        )
    }

    /// Targets `attacker` could attack right now.
    #[must_use]
    pub fn valid_targets(&self, attacker: CombatantId) -> Vec<CombatantId> {
        self.view().valid_targets(attacker)
    }

    /// Tiles `mover` could move to with one move action.
    #[must_use]
    pub fn valid_moves(&self, mover: CombatantId) -> Vec<GridPos> {
        self.view().valid_moves(mover)
    }

    /// The injected random source.
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Hash of the observable encounter state, for determinism checks.
    ///
    /// Covers combatants, turn order and cursor, grid, phase, escape flag and
    /// the log. The RNG is not hashed; its effect shows up in everything else.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.combatants.len().hash(&mut hasher);
        for c in &self.combatants {
            c.hash(&mut hasher);
        }
        self.player_team.hash(&mut hasher);
        self.enemy_team.hash(&mut hasher);
        self.scheduler.hash(&mut hasher);
        self.grid.hash(&mut hasher);
        self.phase.hash(&mut hasher);
        self.escape_available.hash(&mut hasher);
        self.log.hash(&mut hasher);
        hasher.finish()
    }

    /// Check the structural invariants of the encounter.
    ///
    /// # Errors
    ///
    /// [`CombatError::InvalidState`] describing the first violation found.
    pub fn verify_invariants(&self) -> Result<()> {
        for c in &self.combatants {
            if c.hp() > c.max_hp() {
                return Err(invalid(format!("{} has {} / {} HP", c.name(), c.hp(), c.max_hp())));
            }
            if c.is_alive() != (c.hp() > 0) {
                return Err(invalid(format!("{} alive flag out of sync", c.name())));
            }
            if c.ap() > c.max_ap() {
                return Err(invalid(format!("{} has {} AP", c.name(), c.ap())));
            }
            if c.morale() > crate::combatant::MAX_MORALE {
                return Err(invalid(format!("{} has {} morale", c.name(), c.morale())));
            }
        }
        if self.scheduler.order().len() != self.combatants.len() {
            return Err(invalid("turn order does not cover the arena".to_string()));
        }
        check_placement(&self.combatants, &self.grid)?;
        if self.is_active() && self.current_id().is_none() {
            return Err(invalid("active encounter without a living actor".to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Resolve one intent for the acting combatant.
    ///
    /// # Errors
    ///
    /// Any [`ActionError`]; the encounter is unchanged when one is returned.
    pub fn resolve(&mut self, intent: Intent) -> std::result::Result<ActionOutcome, ActionError> {
        match intent {
            Intent::Move { to } => {
                let actor = self.acting()?;
                self.move_to(to)
                    .map(|from| ActionOutcome::Moved { actor, from, to })
            }
            Intent::Attack { target } => self.attack(target).map(ActionOutcome::Attacked),
            Intent::UseItem { item, target } => {
                let actor = self.acting()?;
                self.use_item(item, target).map(|applied| ActionOutcome::ItemUsed {
                    actor,
                    target,
                    item,
                    applied,
                })
            }
            Intent::EndTurn => {
                let actor = self.acting()?;
                self.end_turn()
                    .map(|next| ActionOutcome::TurnEnded { actor, next })
            }
            Intent::Escape { method } => self.attempt_escape(method).map(ActionOutcome::Escaped),
        }
    }

    /// Move the acting combatant. Returns the tile it left.
    ///
    /// # Errors
    ///
    /// Insufficient AP, a destination off the grid, beyond movement range
    /// (or the current tile), or occupied by a living combatant.
    pub fn move_to(&mut self, to: GridPos) -> std::result::Result<GridPos, ActionError> {
        let actor = self.acting()?;
        let mover = self.get(actor)?;
        mover.check_ap(MOVE_COST)?;

        let from = mover.position();
        if !self.grid.in_bounds(to) {
            return Err(ActionError::OutOfBounds(to));
        }
        let distance = from.manhattan_distance(to);
        if distance == 0 || distance > mover.movement_range() {
            return Err(ActionError::TooFar(to));
        }
        if self.view().occupant(to).is_some() {
            return Err(ActionError::DestinationOccupied(to));
        }

        let mover = &mut self.combatants[actor.0];
        mover.spend_ap(MOVE_COST)?;
        mover.move_to(to);
        let entry = format!("{} moves to {to}", mover.name());
        self.log.record(entry);

        self.finish_action(Intent::Move { to });
        Ok(from)
    }

    /// Basic attack against `target` with the equipped weapon.
    ///
    /// Rolls in this order: hit, then (on a hit) variance and crit. A miss
    /// still spends the AP.
    ///
    /// # Errors
    ///
    /// Insufficient AP, an unknown, dead or friendly target, or a target
    /// beyond weapon range.
    pub fn attack(&mut self, target: CombatantId) -> std::result::Result<AttackReport, ActionError> {
        let actor = self.acting()?;
        let attacker = self.get(actor)?;
        attacker.check_ap(ATTACK_COST)?;

        let defender = self.get(target)?;
        if !defender.is_alive() || !attacker.team().is_hostile_to(defender.team()) {
            return Err(ActionError::InvalidTarget(target));
        }
        if attacker.position().manhattan_distance(defender.position()) > attacker.weapon().range {
            return Err(ActionError::OutOfRange(target));
        }

        let cover = self.grid.cover_at(defender.position());
        let hit_chance = attacker.hit_chance(defender, cover);
        self.combatants[actor.0].spend_ap(ATTACK_COST)?;

        let hit = self.rng.roll_percent() <= hit_chance;
        let mut report = AttackReport {
            attacker: actor,
            target,
            hit_chance,
            hit,
            damage: 0,
            critical: false,
            morale_loss: 0,
            killed: false,
        };

        let attacker_name = self.combatants[actor.0].name().to_string();
        let target_name = self.combatants[target.0].name().to_string();

        if hit {
            let roll = self.combatants[actor.0].calculate_damage(
                &self.combatants[target.0],
                cover,
                &mut self.rng,
            );
            let taken = self.combatants[target.0].take_damage(roll.amount);
            report.damage = roll.amount;
            report.critical = roll.critical;
            report.morale_loss = taken.morale_loss;
            report.killed = taken.killed;

            let crit = if roll.critical { " (critical hit)" } else { "" };
            self.log.record(format!(
                "{attacker_name} attacks {target_name} for {} damage{crit}",
                roll.amount
            ));
            if taken.killed {
                self.log.record(format!("{target_name} is down"));
            }
        } else {
            self.log
                .record(format!("{attacker_name} attacks {target_name} and misses"));
        }

        self.check_victory();
        self.finish_action(Intent::Attack { target });
        Ok(report)
    }

    /// Use a consumable on self or a living teammate within reach.
    /// Returns the effect as applied after clamping.
    ///
    /// # Errors
    ///
    /// Insufficient AP, no such item left, an unknown, dead or hostile
    /// target, or a target further than one tile away.
    pub fn use_item(
        &mut self,
        item: ItemKind,
        target: CombatantId,
    ) -> std::result::Result<crate::item::ItemEffect, ActionError> {
        let actor = self.acting()?;
        let user = self.get(actor)?;
        user.check_ap(USE_ITEM_COST)?;
        if user.item_count(item) == 0 {
            return Err(ActionError::MissingItem(item));
        }

        let recipient = self.get(target)?;
        if !recipient.is_alive() || user.team().is_hostile_to(recipient.team()) {
            return Err(ActionError::InvalidTarget(target));
        }
        if user.position().manhattan_distance(recipient.position()) > ITEM_REACH {
            return Err(ActionError::OutOfRange(target));
        }

        let user = &mut self.combatants[actor.0];
        user.spend_ap(USE_ITEM_COST)?;
        user.take_item(item)?;
        let user_name = user.name().to_string();

        let recipient = &mut self.combatants[target.0];
        let effect = item.effect(recipient.max_hp());
        let applied = recipient.apply_item_effect(effect);
        let entry = if actor == target {
            format!("{user_name} uses {} ({applied})", item.display_name())
        } else {
            format!(
                "{user_name} uses {} on {} ({applied})",
                item.display_name(),
                recipient.name()
            )
        };
        self.log.record(entry);

        self.finish_action(Intent::UseItem { item, target });
        Ok(applied)
    }

    /// End the acting combatant's turn, forfeiting its remaining AP.
    /// Returns who acts next.
    ///
    /// # Errors
    ///
    /// [`ActionError::CombatOver`] once the encounter has ended.
    pub fn end_turn(&mut self) -> std::result::Result<Option<CombatantId>, ActionError> {
        let actor = self.acting()?;
        let name = self.get(actor)?.name().to_string();
        self.log.record(format!("{name} ends turn"));
        self.pass_turn(actor);
        self.finish_action(Intent::EndTurn);
        Ok(self.current_id())
    }

    /// Try to get the party out, led by the acting combatant.
    ///
    /// A failed roll is still `Ok`: the report says what it cost, and the
    /// leader's turn is over.
    ///
    /// # Errors
    ///
    /// [`ActionError::EscapeUnavailable`] when the conditions are not met or
    /// nobody would be left to flee, [`ActionError::NotActing`] when the
    /// acting combatant is not on the player side, and
    /// [`ActionError::InvalidTarget`] for a dead or hostile sacrifice.
    pub fn attempt_escape(
        &mut self,
        method: EscapeMethod,
    ) -> std::result::Result<EscapeReport, ActionError> {
        let leader = self.acting()?;
        if !self.get(leader)?.team().is_player_side() {
            return Err(ActionError::NotActing(leader));
        }
        if !self.escape_available {
            return Err(ActionError::EscapeUnavailable);
        }

        let report = match method {
            EscapeMethod::Solo => self.solo_escape(leader),
            EscapeMethod::Sacrifice { member } => self.sacrifice_escape(leader, member)?,
        };

        if !report.success {
            self.check_victory();
            if self.is_active() {
                self.pass_turn(leader);
            }
        }
        self.finish_action(Intent::Escape { method });
        Ok(report)
    }

    fn solo_escape(&mut self, leader: CombatantId) -> EscapeReport {
        let runner = &self.combatants[leader.0];
        let chance = solo_escape_chance(runner);
        let damage = failed_escape_damage(runner);
        let name = runner.name().to_string();

        let roll = self.rng.roll_percent();
        let success = roll <= chance;
        let mut report = EscapeReport {
            method: EscapeMethod::Solo,
            leader,
            chance,
            roll,
            success,
            sacrificed: None,
            leader_damage: None,
            fled: Vec::new(),
        };

        if success {
            self.log.record(format!("{name} leads the retreat"));
            report.fled = self.flee(None);
        } else {
            let taken = self.combatants[leader.0].take_damage(damage);
            self.log.record(format!(
                "{name} fails to break away and takes {} damage",
                taken.hp_lost
            ));
            if taken.killed {
                self.log.record(format!("{name} is down"));
            }
            report.leader_damage = Some(taken);
        }
        report
    }

    fn sacrifice_escape(
        &mut self,
        leader: CombatantId,
        member: CombatantId,
    ) -> std::result::Result<EscapeReport, ActionError> {
        let rear_guard = self.get(member)?;
        if !rear_guard.is_alive() || !rear_guard.team().is_player_side() {
            return Err(ActionError::InvalidTarget(member));
        }
        let others_alive = self
            .player_team
            .iter()
            .any(|&id| id != member && is_alive(&self.combatants, id));
        if !others_alive {
            return Err(ActionError::EscapeUnavailable);
        }

        let name = rear_guard.name().to_string();
        self.combatants[member.0].kill();
        self.log
            .record(format!("{name} stays behind to cover the retreat"));

        let roll = self.rng.roll_percent();
        let success = roll <= SACRIFICE_CHANCE;
        let mut report = EscapeReport {
            method: EscapeMethod::Sacrifice { member },
            leader,
            chance: SACRIFICE_CHANCE,
            roll,
            success,
            sacrificed: Some(member),
            leader_damage: None,
            fled: Vec::new(),
        };

        if success {
            report.fled = self.flee(Some(member));
        } else {
            self.log
                .record(format!("The retreat collapses; {name} fell for nothing"));
        }
        Ok(report)
    }

    /// Pull every living player-side combatant out of the fight.
    fn flee(&mut self, left_behind: Option<CombatantId>) -> Vec<CombatantId> {
        let mut fled = Vec::new();
        for &id in &self.player_team {
            if Some(id) == left_behind {
                continue;
            }
            let c = &mut self.combatants[id.0];
            if c.is_alive() {
                c.adjust_morale(-(FLEE_MORALE_LOSS as i32));
                fled.push(id);
            }
        }
        self.phase = EncounterPhase::Fled;
        self.escape_available = false;
        self.log.record("The party escapes");
        tracing::info!(fled = fled.len(), "Encounter ended: party fled");
        fled
    }

    // ------------------------------------------------------------------
    // Automation
    // ------------------------------------------------------------------

    /// Let `tactic` play the acting combatant's whole turn.
    ///
    /// An intent the tactic gets wrong is logged at `warn` and the turn is
    /// ended in its place.
    ///
    /// # Errors
    ///
    /// [`ActionError::CombatOver`] if the encounter has already ended.
    pub fn run_ai_turn<T: Tactic + ?Sized>(
        &mut self,
        tactic: &T,
    ) -> std::result::Result<Vec<ActionOutcome>, ActionError> {
        let actor = self.acting()?;
        let mut outcomes = Vec::new();

        for _ in 0..MAX_ACTIONS_PER_TURN {
            let intent = tactic.decide(actor, &self.view());
            match self.resolve(intent) {
                Ok(outcome) => {
                    let turn_over = matches!(
                        outcome,
                        ActionOutcome::TurnEnded { .. } | ActionOutcome::Escaped(_)
                    );
                    outcomes.push(outcome);
                    if turn_over || !self.is_active() || self.current_id() != Some(actor) {
                        return Ok(outcomes);
                    }
                }
                Err(error) => {
                    tracing::warn!(%actor, ?intent, %error, "Tactic chose an invalid intent");
                    break;
                }
            }
        }

        if self.is_active() && self.current_id() == Some(actor) {
            let next = self.end_turn()?;
            outcomes.push(ActionOutcome::TurnEnded { actor, next });
        }
        Ok(outcomes)
    }

    /// Play turns until the encounter ends or `max_rounds` rounds complete.
    ///
    /// Player-side combatants use `players`, enemies use `enemies`.
    /// Returns the victor, or `None` if the round limit was hit first.
    pub fn auto_resolve<P, E>(&mut self, players: &P, enemies: &E, max_rounds: u32) -> Option<Victor>
    where
        P: Tactic + ?Sized,
        E: Tactic + ?Sized,
    {
        while self.is_active() && self.turn_count() < max_rounds {
            let Some(actor) = self.current_combatant() else {
                break;
            };
            let result = if actor.team().is_player_side() {
                self.run_ai_turn(players)
            } else {
                self.run_ai_turn(enemies)
            };
            if let Err(error) = result {
                tracing::warn!(%error, "Auto-resolve stopped");
                break;
            }
        }

        if let Some(victor) = self.victor() {
            tracing::info!(%victor, rounds = self.turn_count(), "Encounter resolved");
        }
        self.victor()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn acting(&self) -> std::result::Result<CombatantId, ActionError> {
        if !self.is_active() {
            return Err(ActionError::CombatOver);
        }
        self.current_id().ok_or(ActionError::CombatOver)
    }

    fn get(&self, id: CombatantId) -> std::result::Result<&Combatant, ActionError> {
        self.combatants
            .get(id.0)
            .ok_or(ActionError::UnknownCombatant(id))
    }

    fn activate(&mut self, id: CombatantId) {
        if let Some(c) = self.combatants.get_mut(id.0) {
            c.refill_ap();
            tracing::debug!(actor = %id, name = c.name(), "Turn start");
        }
    }

    /// Forfeit `actor`'s AP and move the cursor to the next living combatant.
    fn pass_turn(&mut self, actor: CombatantId) {
        if let Some(c) = self.combatants.get_mut(actor.0) {
            c.forfeit_ap();
        }

        let combatants = &self.combatants;
        let step = self.scheduler.advance(|id| is_alive(combatants, id));
        if step.round_completed {
            tracing::debug!(round = self.scheduler.rounds(), "Round complete");
            self.refresh_escape();
        }
        if let Some(next) = step.next {
            self.activate(next);
        }
    }

    fn refresh_escape(&mut self) {
        let was_available = self.escape_available;
        let party = self.player_team.iter().filter_map(|id| self.combatants.get(id.0));
        let enemies = self.enemy_team.iter().filter_map(|id| self.combatants.get(id.0));
        self.escape_available =
            self.is_active() && is_escape_eligible(self.scheduler.rounds(), party, enemies);
        if self.escape_available && !was_available {
            self.log.record("Escape is now possible");
        }
    }

    /// Enemy victory is checked first, so a mutual wipe is a defeat.
    fn check_victory(&mut self) {
        if !self.is_active() {
            return;
        }
        let combatants = &self.combatants;
        let players_down = self.player_team.iter().all(|&id| !is_alive(combatants, id));
        let enemies_down = self.enemy_team.iter().all(|&id| !is_alive(combatants, id));

        if players_down {
            self.phase = EncounterPhase::EnemyVictory;
            self.escape_available = false;
            self.log.record("Defeat: the party has fallen");
        } else if enemies_down {
            self.phase = EncounterPhase::PlayerVictory;
            self.escape_available = false;
            self.log.record("Victory: all enemies defeated");
        } else {
            return;
        }
        tracing::info!(phase = ?self.phase, rounds = self.scheduler.rounds(), "Encounter ended");
    }

    fn finish_action(&mut self, intent: Intent) {
        self.history.push(intent);

        if cfg!(feature = "debug-validation") {
            if let Err(error) = self.verify_invariants() {
                tracing::error!(%error, ?intent, "Encounter invariant violated");
            }
        }
    }
}

fn is_alive(combatants: &[Combatant], id: CombatantId) -> bool {
    combatants.get(id.0).is_some_and(Combatant::is_alive)
}

fn invalid(message: String) -> CombatError {
    CombatError::InvalidState(message)
}

fn check_placement(combatants: &[Combatant], grid: &Grid) -> Result<()> {
    let mut taken = std::collections::BTreeMap::new();
    for c in combatants.iter().filter(|c| c.is_alive()) {
        if !grid.in_bounds(c.position()) {
            return Err(invalid(format!(
                "{} stands off the grid at {}",
                c.name(),
                c.position()
            )));
        }
        if let Some(other) = taken.insert(c.position(), c.name()) {
            return Err(invalid(format!(
                "{} and {other} share tile {}",
                c.name(),
                c.position()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{Attributes, MAX_AP};
    use crate::rng::ScriptedRng;
    use crate::weapon::catalog;

    fn merc(name: &str, reflexes: u8, x: i32, y: i32) -> Combatant {
        Combatant::new(
            name,
            Team::Player,
            Attributes::new(5, reflexes, 5, 5, 5),
            100,
            0,
            catalog::pistol(),
        )
        .at(x, y)
    }

    fn grunt(name: &str, reflexes: u8, x: i32, y: i32) -> Combatant {
        Combatant::new(
            name,
            Team::Enemy,
            Attributes::new(5, reflexes, 5, 5, 5),
            60,
            0,
            catalog::pistol(),
        )
        .at(x, y)
    }

    /// One merc (acts first) against one grunt two tiles away.
    fn duel(extra_rolls: impl IntoIterator<Item = u32>) -> Encounter<ScriptedRng> {
        let mut rng = ScriptedRng::new([10, 1]);
        for roll in extra_rolls {
            rng.push(roll);
        }
        Encounter::new(
            vec![merc("V", 5, 0, 0)],
            vec![grunt("Gang Grunt", 5, 0, 2)],
            Grid::default(),
            rng,
        )
        .expect("valid encounter")
    }

    #[test]
    fn test_empty_encounter_is_fatal() {
        let result = Encounter::new(Vec::new(), Vec::new(), Grid::default(), ScriptedRng::default());
        assert!(matches!(result, Err(CombatError::EmptyEncounter)));
    }

    #[test]
    fn test_rejects_wrong_team_tag_and_overlap() {
        let result = Encounter::new(
            vec![grunt("Spy", 5, 0, 0)],
            Vec::new(),
            Grid::default(),
            ScriptedRng::new([1]),
        );
        assert!(matches!(result, Err(CombatError::InvalidState(_))));

        let result = Encounter::new(
            vec![merc("V", 5, 3, 3)],
            vec![grunt("Grunt", 5, 3, 3)],
            Grid::default(),
            ScriptedRng::new([1, 1]),
        );
        assert!(matches!(result, Err(CombatError::InvalidState(_))));
    }

    #[test]
    fn test_initiative_order_with_stable_ties() {
        let rng = ScriptedRng::new([3, 5, 3]);
        let enc = Encounter::new(
            vec![merc("A", 5, 0, 0), merc("B", 5, 1, 0)],
            vec![grunt("C", 5, 5, 5)],
            Grid::default(),
            rng,
        )
        .expect("valid encounter");
        // A=13, B=15, C=13: B first, then A before C by insertion order.
        assert_eq!(
            enc.turn_order(),
            &[CombatantId(1), CombatantId(0), CombatantId(2)]
        );
        assert_eq!(enc.current_id(), Some(CombatantId(1)));
        assert_eq!(enc.turn_count(), 0);
        assert!(enc.is_active());
        assert!(enc.log().entries()[0].starts_with("Turn order: B (15)"));
    }

    #[test]
    fn test_move_costs_one_ap_and_validates() {
        let mut enc = duel([]);
        assert_eq!(enc.move_to(GridPos::new(-1, 0)), Err(ActionError::OutOfBounds(GridPos::new(-1, 0))));
        assert_eq!(enc.move_to(GridPos::new(0, 2)), Err(ActionError::DestinationOccupied(GridPos::new(0, 2))));
        assert_eq!(enc.move_to(GridPos::new(6, 0)), Err(ActionError::TooFar(GridPos::new(6, 0))));
        assert_eq!(enc.move_to(GridPos::new(0, 0)), Err(ActionError::TooFar(GridPos::new(0, 0))));

        assert_eq!(enc.move_to(GridPos::new(5, 0)), Ok(GridPos::new(0, 0)));
        // Each move re-measures from the new tile.
        assert_eq!(enc.move_to(GridPos::new(10, 0)), Ok(GridPos::new(5, 0)));
        let v = enc.combatant(CombatantId(0)).expect("exists");
        assert_eq!(v.position(), GridPos::new(10, 0));
        assert_eq!(v.ap(), MAX_AP - 2);
        assert_eq!(enc.log().last(), Some("V moves to (10, 0)"));
    }

    #[test]
    fn test_attack_hit_logs_and_spends_ap() {
        // hit roll 1, variance 1.0, crit roll 100 (no crit)
        let mut enc = duel([1, 10_000, 100]);
        let report = enc.attack(CombatantId(1)).expect("legal attack");
        assert!(report.hit);
        assert!(!report.critical);
        // pistol 20 + reflexes 10 = 30 x morale 1.25 = 37.5
        assert_eq!(report.damage, 37);
        assert_eq!(enc.log().last(), Some("V attacks Gang Grunt for 37 damage"));
        assert_eq!(enc.combatant(CombatantId(1)).map(Combatant::hp), Some(23));
        assert_eq!(enc.combatant(CombatantId(0)).map(Combatant::ap), Some(1));

        assert_eq!(
            enc.attack(CombatantId(1)),
            Err(ActionError::InsufficientAp {
                required: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_miss_still_costs_ap() {
        let mut enc = duel([100]);
        let report = enc.attack(CombatantId(1)).expect("legal attack");
        assert!(!report.hit);
        assert_eq!(report.damage, 0);
        assert_eq!(enc.log().last(), Some("V attacks Gang Grunt and misses"));
        assert_eq!(enc.combatant(CombatantId(0)).map(Combatant::ap), Some(1));
    }

    #[test]
    fn test_attack_validation() {
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0), merc("Jackie", 5, 1, 0)],
            vec![grunt("Far", 5, 11, 11)],
            Grid::default(),
            ScriptedRng::new([10, 1, 1]),
        )
        .expect("valid encounter");
        assert_eq!(enc.attack(CombatantId(1)), Err(ActionError::InvalidTarget(CombatantId(1))));
        assert_eq!(enc.attack(CombatantId(2)), Err(ActionError::OutOfRange(CombatantId(2))));
        assert_eq!(enc.attack(CombatantId(9)), Err(ActionError::UnknownCombatant(CombatantId(9))));
        assert!(enc.valid_targets(CombatantId(0)).is_empty());
    }

    #[test]
    fn test_kill_ends_combat_and_latches() {
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0)],
            vec![grunt("Gang Grunt", 5, 0, 2).with_hp(5)],
            Grid::default(),
            ScriptedRng::new([10, 1, 1, 10_000, 100]),
        )
        .expect("valid encounter");
        let report = enc.attack(CombatantId(1)).expect("legal attack");
        assert!(report.killed);
        assert_eq!(enc.victor(), Some(Victor::Player));
        assert_eq!(enc.phase(), EncounterPhase::PlayerVictory);
        assert!(enc.log().iter().any(|e| e == "Gang Grunt is down"));
        assert_eq!(enc.log().last(), Some("Victory: all enemies defeated"));

        let hash = enc.state_hash();
        assert_eq!(enc.end_turn(), Err(ActionError::CombatOver));
        assert_eq!(enc.move_to(GridPos::new(1, 0)), Err(ActionError::CombatOver));
        assert_eq!(enc.state_hash(), hash);
        assert_eq!(enc.current_id(), None);
    }

    #[test]
    fn test_end_turn_forfeits_and_refills_next() {
        let mut enc = duel([]);
        enc.move_to(GridPos::new(1, 0)).expect("legal move");
        let next = enc.end_turn().expect("active");
        assert_eq!(next, Some(CombatantId(1)));
        assert_eq!(enc.combatant(CombatantId(0)).map(Combatant::ap), Some(0));
        assert_eq!(enc.combatant(CombatantId(1)).map(Combatant::ap), Some(MAX_AP));
        assert_eq!(enc.turn_count(), 0);

        enc.end_turn().expect("active");
        assert_eq!(enc.turn_count(), 1);
        assert_eq!(enc.combatant(CombatantId(0)).map(Combatant::ap), Some(MAX_AP));
    }

    #[test]
    fn test_enemy_cannot_lead_a_retreat() {
        let mut enc = duel([]);
        assert_eq!(enc.current_id(), Some(CombatantId(0)));
        enc.end_turn().expect("active");
        assert_eq!(enc.current_id(), Some(CombatantId(1)));
        assert_eq!(
            enc.attempt_escape(EscapeMethod::Solo),
            Err(ActionError::NotActing(CombatantId(1)))
        );
    }

    #[test]
    fn test_use_item() {
        let mut enc = Encounter::new(
            vec![
                merc("V", 5, 0, 0).with_hp(50).with_item(ItemKind::Stim, 1),
                merc("Jackie", 5, 3, 0).with_hp(40),
            ],
            vec![grunt("Gang Grunt", 5, 9, 9)],
            Grid::default(),
            ScriptedRng::new([10, 1, 1]),
        )
        .expect("valid encounter");

        assert_eq!(
            enc.use_item(ItemKind::Medkit, CombatantId(0)),
            Err(ActionError::MissingItem(ItemKind::Medkit))
        );
        assert_eq!(
            enc.use_item(ItemKind::Stim, CombatantId(1)),
            Err(ActionError::OutOfRange(CombatantId(1)))
        );
        assert_eq!(
            enc.use_item(ItemKind::Stim, CombatantId(2)),
            Err(ActionError::InvalidTarget(CombatantId(2)))
        );

        let applied = enc.use_item(ItemKind::Stim, CombatantId(0)).expect("legal");
        assert_eq!(applied, crate::item::ItemEffect::Heal(30));
        assert_eq!(enc.log().last(), Some("V uses Stim (+30 HP)"));
        let v = enc.combatant(CombatantId(0)).expect("exists");
        assert_eq!(v.hp(), 80);
        assert_eq!(v.ap(), MAX_AP - 1);
        assert_eq!(v.item_count(ItemKind::Stim), 0);
    }

    #[test]
    fn test_rejected_intent_leaves_state_untouched() {
        let mut enc = duel([]);
        let before = enc.state_hash();
        let history = enc.history().len();
        assert!(enc.resolve(Intent::Attack { target: CombatantId(0) }).is_err());
        assert!(enc.resolve(Intent::Move { to: GridPos::new(40, 40) }).is_err());
        assert_eq!(enc.state_hash(), before);
        assert_eq!(enc.history().len(), history);
    }

    #[test]
    fn test_resolve_records_history() {
        let mut enc = duel([]);
        let outcome = enc
            .resolve(Intent::Move { to: GridPos::new(1, 0) })
            .expect("legal move");
        assert_eq!(
            outcome,
            ActionOutcome::Moved {
                actor: CombatantId(0),
                from: GridPos::new(0, 0),
                to: GridPos::new(1, 0)
            }
        );
        let outcome = enc.resolve(Intent::EndTurn).expect("active");
        assert_eq!(
            outcome,
            ActionOutcome::TurnEnded {
                actor: CombatantId(0),
                next: Some(CombatantId(1))
            }
        );
        assert_eq!(enc.history().len(), 2);
    }

    #[test]
    fn test_escape_gated_on_rounds() {
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0).with_hp(20)],
            vec![grunt("Gang Grunt", 5, 9, 9)],
            Grid::default(),
            ScriptedRng::new([10, 1]),
        )
        .expect("valid encounter");

        for _ in 0..2 {
            enc.end_turn().expect("active");
            enc.end_turn().expect("active");
        }
        assert_eq!(enc.turn_count(), 2);
        assert!(!enc.escape_available());
        assert_eq!(
            enc.attempt_escape(EscapeMethod::Solo),
            Err(ActionError::EscapeUnavailable)
        );

        enc.end_turn().expect("active");
        enc.end_turn().expect("active");
        assert_eq!(enc.turn_count(), 3);
        assert!(enc.escape_available());
    }

    fn hurt_party_at_round_three(rolls: impl IntoIterator<Item = u32>) -> Encounter<ScriptedRng> {
        let mut rng = ScriptedRng::new([10, 10, 1]);
        for roll in rolls {
            rng.push(roll);
        }
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0).with_hp(30), merc("Jackie", 5, 1, 0).with_hp(30)],
            vec![grunt("Gang Grunt", 5, 9, 9)],
            Grid::default(),
            rng,
        )
        .expect("valid encounter");
        for _ in 0..9 {
            enc.end_turn().expect("active");
        }
        assert_eq!(enc.turn_count(), 3);
        assert_eq!(enc.current_id(), Some(CombatantId(0)));
        enc
    }

    #[test]
    fn test_solo_escape_success() {
        let mut enc = hurt_party_at_round_three([55]);
        let report = enc.attempt_escape(EscapeMethod::Solo).expect("eligible");
        assert!(report.success);
        assert_eq!(report.chance, 55);
        assert_eq!(report.fled, vec![CombatantId(0), CombatantId(1)]);
        assert_eq!(enc.victor(), Some(Victor::Fled));
        assert_eq!(enc.combatant(CombatantId(0)).map(Combatant::morale), Some(80));
        assert_eq!(enc.end_turn(), Err(ActionError::CombatOver));
    }

    #[test]
    fn test_solo_escape_failure_hurts_leader_and_ends_turn() {
        let mut enc = hurt_party_at_round_three([56]);
        let report = enc.attempt_escape(EscapeMethod::Solo).expect("eligible");
        assert!(!report.success);
        let taken = report.leader_damage.expect("failed solo deals damage");
        assert_eq!(taken.hp_lost, 20);
        assert!(enc.is_active());
        assert_eq!(enc.combatant(CombatantId(0)).map(Combatant::hp), Some(10));
        assert_eq!(enc.current_id(), Some(CombatantId(1)));
    }

    #[test]
    fn test_lethal_failed_escape_by_lone_leader_is_enemy_victory() {
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0).with_hp(15)],
            vec![grunt("Gang Grunt", 5, 9, 9)],
            Grid::default(),
            ScriptedRng::new([10, 1, 56]),
        )
        .expect("valid encounter");
        for _ in 0..6 {
            enc.end_turn().expect("active");
        }
        assert!(enc.escape_available());

        let report = enc.attempt_escape(EscapeMethod::Solo).expect("eligible");
        assert!(!report.success);
        assert!(report.leader_damage.is_some_and(|t| t.killed));
        assert_eq!(enc.victor(), Some(Victor::Enemy));
        assert_eq!(enc.current_id(), None);
        assert!(enc.verify_invariants().is_ok());
    }

    #[test]
    fn test_lethal_failed_escape_passes_turn_to_survivor() {
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0).with_hp(15), merc("Jackie", 5, 1, 0).with_hp(30)],
            vec![grunt("Gang Grunt", 5, 9, 9)],
            Grid::default(),
            ScriptedRng::new([10, 10, 1, 56]),
        )
        .expect("valid encounter");
        for _ in 0..9 {
            enc.end_turn().expect("active");
        }
        assert_eq!(enc.current_id(), Some(CombatantId(0)));

        let report = enc.attempt_escape(EscapeMethod::Solo).expect("eligible");
        assert!(report.leader_damage.is_some_and(|t| t.killed));
        assert!(enc.is_active());
        assert_eq!(enc.current_id(), Some(CombatantId(1)));
        assert!(enc.verify_invariants().is_ok());
    }

    #[test]
    fn test_sacrifice_escape() {
        let mut enc = hurt_party_at_round_three([93]);
        let report = enc
            .attempt_escape(EscapeMethod::Sacrifice {
                member: CombatantId(1),
            })
            .expect("eligible");
        assert!(report.success);
        assert_eq!(report.sacrificed, Some(CombatantId(1)));
        assert_eq!(report.fled, vec![CombatantId(0)]);
        assert!(!enc.combatant(CombatantId(1)).expect("exists").is_alive());
        assert_eq!(enc.victor(), Some(Victor::Fled));
    }

    #[test]
    fn test_failed_sacrifice_is_for_nothing() {
        let mut enc = hurt_party_at_round_three([94]);
        let report = enc
            .attempt_escape(EscapeMethod::Sacrifice {
                member: CombatantId(1),
            })
            .expect("eligible");
        assert!(!report.success);
        assert!(!enc.combatant(CombatantId(1)).expect("exists").is_alive());
        assert!(enc.is_active());
        assert!(enc.log().last().is_some_and(|e| e.contains("for nothing")));
    }

    #[test]
    fn test_sacrifice_needs_someone_to_save() {
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0).with_hp(10)],
            vec![grunt("A", 5, 9, 9), grunt("B", 5, 9, 8)],
            Grid::default(),
            ScriptedRng::new([10, 1, 1]),
        )
        .expect("valid encounter");
        for _ in 0..9 {
            enc.end_turn().expect("active");
        }
        assert!(enc.escape_available());
        assert_eq!(
            enc.attempt_escape(EscapeMethod::Sacrifice {
                member: CombatantId(0)
            }),
            Err(ActionError::EscapeUnavailable)
        );
        assert!(enc.combatant(CombatantId(0)).expect("exists").is_alive());
    }

    #[test]
    fn test_mutual_wipe_is_enemy_victory() {
        let mut enc = Encounter::new(
            vec![merc("V", 5, 0, 0)],
            vec![grunt("Gang Grunt", 5, 0, 2)],
            Grid::default(),
            ScriptedRng::new([10, 1]),
        )
        .expect("valid encounter");
        enc.combatants[0].kill();
        enc.combatants[1].kill();
        enc.check_victory();
        assert_eq!(enc.victor(), Some(Victor::Enemy));
    }

    #[test]
    fn test_one_sided_encounter_ends_immediately() {
        let enc = Encounter::new(
            vec![merc("V", 5, 0, 0)],
            Vec::new(),
            Grid::default(),
            ScriptedRng::new([1]),
        )
        .expect("non-empty");
        assert_eq!(enc.victor(), Some(Victor::Player));
    }

    #[test]
    fn test_auto_resolve_terminates() {
        let mut enc = Encounter::new(
            vec![merc("V", 7, 0, 0)],
            vec![grunt("Gang Grunt", 3, 11, 11)],
            Grid::default(),
            SeededRng::new(7),
        )
        .expect("valid encounter");
        let victor = enc.auto_resolve(&crate::ai::HeuristicAi, &crate::ai::HeuristicAi, 200);
        assert!(victor.is_some());
        assert!(enc.verify_invariants().is_ok());
    }
}
