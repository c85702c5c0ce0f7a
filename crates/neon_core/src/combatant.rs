//! Combatants: attributes, derived combat stats and self-applied damage.
//!
//! All derived values are recomputed from live state on every call. Morale
//! and HP change mid-fight, so nothing here is cached.
//!
//! # Damage pipeline
//!
//! ```text
//! base        = weapon.damage x variance(0.85..=1.15)
//! stat_bonus  = body x 3 (melee) | reflexes x 2 (ranged, tech)
//! pre_armor   = (base + stat_bonus) x crit_mult x morale_mod
//! eff_armor   = target.armor x (1 - armor_pen)
//! final       = floor(max(1, (pre_armor - eff_armor) x cover_factor))
//! ```

use serde::{Deserialize, Serialize};

use crate::action::ActionError;
use crate::grid::Cover;
use crate::item::{ItemEffect, ItemKind, ItemStack};
use crate::math::{Fixed, GridPos};
use crate::rng::CombatRng;
use crate::weapon::WeaponTemplate;

/// Action points every combatant gets at the start of its turn.
pub const MAX_AP: u32 = 3;

/// Morale ceiling (and starting value).
pub const MAX_MORALE: u32 = 100;

/// Dodge never exceeds this, whatever the reflexes.
pub const DODGE_CAP: u32 = 20;

/// Lowest possible hit chance.
pub const MIN_HIT_CHANCE: u32 = 5;

/// Highest possible hit chance.
pub const MAX_HIT_CHANCE: u32 = 95;

/// Minimum damage floor - every hit deals at least 1.
pub const MIN_DAMAGE: u32 = 1;

/// Base movement in tiles before the reflexes bonus.
pub const BASE_MOVEMENT: u32 = 4;

/// Morale lost when a single hit takes at least 30% of max HP.
pub const HEAVY_HIT_MORALE_LOSS: u32 = 20;

/// Morale lost when a single hit takes at least 15% of max HP.
pub const LIGHT_HIT_MORALE_LOSS: u32 = 10;

/// Largest max HP a template may declare.
pub const HP_LIMIT: u32 = 1_000_000;

/// Largest flat armor a template may declare.
pub const ARMOR_LIMIT: u32 = 1_000_000;

/// Stable handle to a combatant inside an encounter's arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CombatantId(pub usize);

impl std::fmt::Display for CombatantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Side tag of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Team {
    /// The player character.
    #[default]
    Player,
    /// Party member fighting with the player.
    Ally,
    /// Hostile.
    Enemy,
}

impl Team {
    /// Whether this tag belongs to the player side of the encounter.
    #[must_use]
    pub const fn is_player_side(self) -> bool {
        matches!(self, Team::Player | Team::Ally)
    }

    /// Whether `other` fights against this tag.
    #[must_use]
    pub const fn is_hostile_to(self, other: Team) -> bool {
        self.is_player_side() != other.is_player_side()
    }
}

/// Primary attributes on a 1-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attributes {
    /// Physical strength; melee damage.
    pub body: u8,
    /// Speed and aim; initiative, dodge, movement, ranged damage.
    pub reflexes: u8,
    /// Hacking aptitude.
    pub intelligence: u8,
    /// Gadgets and crafting.
    pub tech: u8,
    /// Composure; crit chance.
    pub cool: u8,
}

impl Attributes {
    /// Lowest attribute value.
    pub const MIN: u8 = 1;
    /// Highest attribute value.
    pub const MAX: u8 = 10;

    /// Create attributes, clamping every value into `1..=10`.
    #[must_use]
    pub fn new(body: u8, reflexes: u8, intelligence: u8, tech: u8, cool: u8) -> Self {
        Self {
            body,
            reflexes,
            intelligence,
            tech,
            cool,
        }
        .clamped()
    }

    /// Copy with every value clamped into `1..=10`.
    #[must_use]
    pub fn clamped(self) -> Self {
        let c = |v: u8| v.clamp(Self::MIN, Self::MAX);
        Self {
            body: c(self.body),
            reflexes: c(self.reflexes),
            intelligence: c(self.intelligence),
            tech: c(self.tech),
            cool: c(self.cool),
        }
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new(5, 5, 5, 5, 5)
    }
}

/// Outcome of a damage roll, before it is applied to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRoll {
    /// Final damage (at least [`MIN_DAMAGE`]).
    pub amount: u32,
    /// Whether the crit roll succeeded.
    pub critical: bool,
}

/// What a call to [`Combatant::take_damage`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageTaken {
    /// HP actually removed (clamped at the remaining HP).
    pub hp_lost: u32,
    /// Morale removed.
    pub morale_loss: u32,
    /// Whether this hit was the killing blow.
    pub killed: bool,
}

/// A fighter inside an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combatant {
    id: CombatantId,
    name: String,
    team: Team,
    position: GridPos,
    attributes: Attributes,
    hp: u32,
    max_hp: u32,
    armor: u32,
    ap: u32,
    max_ap: u32,
    morale: u32,
    alive: bool,
    weapon: WeaponTemplate,
    items: Vec<ItemStack>,
    initiative: Option<i32>,
}

impl Combatant {
    /// Create a combatant at full HP, full AP and full morale.
    ///
    /// A `max_hp` of 0 is raised to 1 so a fresh combatant is always alive.
    pub fn new(
        name: impl Into<String>,
        team: Team,
        attributes: Attributes,
        max_hp: u32,
        armor: u32,
        weapon: WeaponTemplate,
    ) -> Self {
        let max_hp = max_hp.max(1);
        Self {
            id: CombatantId::default(),
            name: name.into(),
            team,
            position: GridPos::default(),
            attributes: attributes.clamped(),
            hp: max_hp,
            max_hp,
            armor,
            ap: MAX_AP,
            max_ap: MAX_AP,
            morale: MAX_MORALE,
            alive: true,
            weapon,
            items: Vec::new(),
            initiative: None,
        }
    }

    /// Builder method to place the combatant on a tile.
    #[must_use]
    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.position = GridPos::new(x, y);
        self
    }

    /// Builder method to start below full health (clamped, keeps `alive` in sync).
    #[must_use]
    pub fn with_hp(mut self, hp: u32) -> Self {
        self.hp = hp.min(self.max_hp);
        self.alive = self.hp > 0;
        self
    }

    /// Builder method to start with different morale (clamped).
    #[must_use]
    pub fn with_morale(mut self, morale: u32) -> Self {
        self.morale = morale.min(MAX_MORALE);
        self
    }

    /// Builder method to add a stack of consumables.
    #[must_use]
    pub fn with_item(mut self, kind: ItemKind, count: u32) -> Self {
        self.add_items(kind, count);
        self
    }

    pub(crate) fn assign_id(&mut self, id: CombatantId) {
        self.id = id;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Arena handle.
    #[must_use]
    pub fn id(&self) -> CombatantId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Side tag.
    #[must_use]
    pub fn team(&self) -> Team {
        self.team
    }

    /// Current tile.
    #[must_use]
    pub fn position(&self) -> GridPos {
        self.position
    }

    /// Primary attributes.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    /// Current HP.
    #[must_use]
    pub fn hp(&self) -> u32 {
        self.hp
    }

    /// Maximum HP.
    #[must_use]
    pub fn max_hp(&self) -> u32 {
        self.max_hp
    }

    /// Flat armor.
    #[must_use]
    pub fn armor(&self) -> u32 {
        self.armor
    }

    /// AP left this turn.
    #[must_use]
    pub fn ap(&self) -> u32 {
        self.ap
    }

    /// AP at the start of a turn.
    #[must_use]
    pub fn max_ap(&self) -> u32 {
        self.max_ap
    }

    /// Morale, 0-100.
    #[must_use]
    pub fn morale(&self) -> u32 {
        self.morale
    }

    /// `hp > 0`.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Equipped weapon.
    #[must_use]
    pub fn weapon(&self) -> &WeaponTemplate {
        &self.weapon
    }

    /// Carried consumables.
    #[must_use]
    pub fn items(&self) -> &[ItemStack] {
        &self.items
    }

    /// How many of `kind` the combatant carries.
    #[must_use]
    pub fn item_count(&self, kind: ItemKind) -> u32 {
        self.items
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.count)
            .sum()
    }

    /// Initiative rolled at encounter start, if any.
    #[must_use]
    pub fn initiative(&self) -> Option<i32> {
        self.initiative
    }

    /// Current HP as a fraction of max HP.
    #[must_use]
    pub fn hp_fraction(&self) -> Fixed {
        // hp <= max_hp, so the quotient fits in 32 fractional bits plus one.
        let bits = (u64::from(self.hp) << 32) / u64::from(self.max_hp.max(1));
        Fixed::from_bits(bits as i64)
    }

    // ------------------------------------------------------------------
    // Derived stats
    // ------------------------------------------------------------------

    /// `(reflexes x 2) + d10`. Stored on the combatant; rolled once per encounter.
    pub fn roll_initiative(&mut self, rng: &mut impl CombatRng) -> i32 {
        let roll = rng.roll_d10() as i32;
        let initiative = i32::from(self.attributes.reflexes) * 2 + roll;
        self.initiative = Some(initiative);
        initiative
    }

    /// `min(20, reflexes x 3)`.
    #[must_use]
    pub fn dodge_chance(&self) -> u32 {
        (u32::from(self.attributes.reflexes) * 3).min(DODGE_CAP)
    }

    /// `cool x 2` percent.
    #[must_use]
    pub fn crit_chance(&self) -> u32 {
        u32::from(self.attributes.cool) * 2
    }

    /// `1.0 + (morale - 50) / 200`: 0.75 at morale 0, 1.25 at morale 100.
    #[must_use]
    pub fn morale_modifier(&self) -> Fixed {
        let offset = self.morale as i32 - 50;
        Fixed::ONE + Fixed::from_num(offset) / Fixed::from_num(200)
    }

    /// `4 + reflexes / 4` tiles per move action.
    #[must_use]
    pub fn movement_range(&self) -> u32 {
        BASE_MOVEMENT + u32::from(self.attributes.reflexes) / 4
    }

    /// Flat damage bonus from attributes for the equipped weapon.
    #[must_use]
    pub fn stat_bonus(&self) -> u32 {
        if self.weapon.is_melee() {
            u32::from(self.attributes.body) * 3
        } else {
            u32::from(self.attributes.reflexes) * 2
        }
    }

    /// Chance in percent to hit `target` standing in `cover`, clamped to 5-95.
    #[must_use]
    pub fn hit_chance(&self, target: &Combatant, cover: Cover) -> u32 {
        let penalty = if self.weapon.class.ignores_cover() {
            0
        } else {
            cover.hit_penalty()
        };
        let raw = i64::from(self.weapon.accuracy)
            - i64::from(target.dodge_chance())
            - i64::from(penalty);
        raw.clamp(i64::from(MIN_HIT_CHANCE), i64::from(MAX_HIT_CHANCE)) as u32
    }

    /// Roll damage against `target` in `cover`.
    ///
    /// Consumes two rolls in this order: variance, then crit.
    pub fn calculate_damage(
        &self,
        target: &Combatant,
        cover: Cover,
        rng: &mut impl CombatRng,
    ) -> DamageRoll {
        let variance = rng.roll_variance();
        let crit_roll = rng.roll_percent();
        let critical = crit_roll <= self.crit_chance();
        DamageRoll {
            amount: self.damage_against(target, cover, variance, critical),
            critical,
        }
    }

    /// The deterministic part of the damage pipeline, with variance and crit
    /// already decided.
    ///
    /// Every step saturates, so out-of-range weapon damage or armor can only
    /// push the result towards [`Fixed::MAX`] or down to [`MIN_DAMAGE`].
    #[must_use]
    pub fn damage_against(
        &self,
        target: &Combatant,
        cover: Cover,
        variance: Fixed,
        critical: bool,
    ) -> u32 {
        let base = Fixed::saturating_from_num(self.weapon.damage).saturating_mul(variance);
        let stat_bonus = Fixed::saturating_from_num(self.stat_bonus());
        let crit_mult = if critical {
            self.weapon.crit_factor()
        } else {
            Fixed::ONE
        };

        let pre_armor = base
            .saturating_add(stat_bonus)
            .saturating_mul(crit_mult)
            .saturating_mul(self.morale_modifier());
        let effective_armor = Fixed::saturating_from_num(target.armor)
            .saturating_mul(Fixed::ONE - self.weapon.penetration_fraction());
        let cover_factor = if self.weapon.class.ignores_cover() {
            Fixed::ONE
        } else {
            cover.damage_factor()
        };

        // Clamp before truncating so negative results never floor to 0.
        let raw = pre_armor
            .saturating_sub(effective_armor)
            .saturating_mul(cover_factor);
        raw.max(Fixed::from_num(MIN_DAMAGE)).floor().to_num::<u32>()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Apply `amount` damage.
    ///
    /// HP is clamped at 0 and `alive` follows immediately. The morale
    /// thresholds compare the *intended* `amount` against max HP, not the HP
    /// actually lost, so an overkill hit still shakes the target. A dead
    /// combatant is not affected.
    pub fn take_damage(&mut self, amount: u32) -> DamageTaken {
        if !self.alive {
            return DamageTaken::default();
        }

        let hp_lost = amount.min(self.hp);
        self.hp -= hp_lost;
        self.alive = self.hp > 0;

        let morale_loss = self.morale_loss_for(amount);
        self.adjust_morale(-(morale_loss as i32));

        DamageTaken {
            hp_lost,
            morale_loss,
            killed: !self.alive,
        }
    }

    /// Morale a hit of `amount` would cost, relative to this combatant's max HP.
    #[must_use]
    pub fn morale_loss_for(&self, amount: u32) -> u32 {
        let scaled = u64::from(amount) * 100;
        let max = u64::from(self.max_hp);
        if scaled >= max * 30 {
            HEAVY_HIT_MORALE_LOSS
        } else if scaled >= max * 15 {
            LIGHT_HIT_MORALE_LOSS
        } else {
            0
        }
    }

    /// Shift morale by `delta`, clamped to 0-100. Returns the applied change.
    pub fn adjust_morale(&mut self, delta: i32) -> i32 {
        let before = self.morale as i32;
        let after = (before + delta).clamp(0, MAX_MORALE as i32);
        self.morale = after as u32;
        after - before
    }

    /// Restore HP, clamped to max. The dead are not revived. Returns HP gained.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.alive {
            return 0;
        }
        let gained = amount.min(self.max_hp - self.hp);
        self.hp += gained;
        gained
    }

    /// Apply an item effect; returns the effect as actually applied.
    pub fn apply_item_effect(&mut self, effect: ItemEffect) -> ItemEffect {
        match effect {
            ItemEffect::Heal(amount) => ItemEffect::Heal(self.heal(amount)),
            ItemEffect::Morale(amount) => {
                let applied = self.adjust_morale(amount as i32);
                ItemEffect::Morale(applied.max(0) as u32)
            }
        }
    }

    /// Drop HP to 0 unconditionally (sacrifice).
    pub fn kill(&mut self) {
        self.hp = 0;
        self.alive = false;
    }

    /// Spend AP, or report how much is missing.
    pub fn spend_ap(&mut self, cost: u32) -> Result<(), ActionError> {
        self.check_ap(cost)?;
        self.ap -= cost;
        Ok(())
    }

    /// Check AP without spending it.
    pub fn check_ap(&self, cost: u32) -> Result<(), ActionError> {
        if cost > self.ap {
            return Err(ActionError::InsufficientAp {
                required: cost,
                available: self.ap,
            });
        }
        Ok(())
    }

    /// Refill AP at the start of a turn.
    pub fn refill_ap(&mut self) {
        self.ap = self.max_ap;
    }

    /// Drop remaining AP at the end of a turn (AP is never banked).
    pub fn forfeit_ap(&mut self) {
        self.ap = 0;
    }

    pub(crate) fn move_to(&mut self, to: GridPos) {
        self.position = to;
    }

    /// Add consumables, merging into an existing stack.
    pub fn add_items(&mut self, kind: ItemKind, count: u32) {
        if count == 0 {
            return;
        }
        match self.items.iter_mut().find(|s| s.kind == kind) {
            Some(stack) => stack.count = stack.count.saturating_add(count),
            None => self.items.push(ItemStack::new(kind, count)),
        }
    }

    /// Remove one item of `kind`.
    pub fn take_item(&mut self, kind: ItemKind) -> Result<(), ActionError> {
        let Some(index) = self
            .items
            .iter()
            .position(|s| s.kind == kind && s.count > 0)
        else {
            return Err(ActionError::MissingItem(kind));
        };
        self.items[index].count -= 1;
        if self.items[index].count == 0 {
            self.items.remove(index);
        }
        Ok(())
    }
}
