//! Consumables usable mid-fight through the UseItem intent.

use serde::{Deserialize, Serialize};

/// Kinds of consumable a combatant can carry into an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    /// Combat stim: flat heal.
    Stim,
    /// Synth-adrenaline: restores morale.
    MoraleBooster,
    /// Trauma kit: heals half of max HP.
    Medkit,
}

/// Flat HP restored by a stim.
pub const STIM_HEAL: u32 = 30;

/// Morale restored by a booster.
pub const MORALE_BOOST: u32 = 25;

/// Percent of max HP restored by a medkit.
pub const MEDKIT_HEAL_PERCENT: u32 = 50;

/// What using an item does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEffect {
    /// Restore hit points.
    Heal(u32),
    /// Restore morale.
    Morale(u32),
}

impl std::fmt::Display for ItemEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemEffect::Heal(hp) => write!(f, "+{hp} HP"),
            ItemEffect::Morale(morale) => write!(f, "+{morale} morale"),
        }
    }
}

impl ItemKind {
    /// Effect on a target with the given max HP.
    #[must_use]
    pub fn effect(self, target_max_hp: u32) -> ItemEffect {
        match self {
            ItemKind::Stim => ItemEffect::Heal(STIM_HEAL),
            ItemKind::MoraleBooster => ItemEffect::Morale(MORALE_BOOST),
            ItemKind::Medkit => {
                let heal = u64::from(target_max_hp) * u64::from(MEDKIT_HEAL_PERCENT) / 100;
                ItemEffect::Heal(heal as u32)
            }
        }
    }

    /// Display name used in the combat log.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            ItemKind::Stim => "Stim",
            ItemKind::MoraleBooster => "Morale Booster",
            ItemKind::Medkit => "Medkit",
        }
    }
}

/// A stack of identical consumables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item kind.
    pub kind: ItemKind,
    /// Uses left.
    pub count: u32,
}

impl ItemStack {
    /// Create a stack.
    #[must_use]
    pub const fn new(kind: ItemKind, count: u32) -> Self {
        Self { kind, count }
    }
}
