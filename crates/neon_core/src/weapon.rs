//! Weapon templates.
//!
//! A weapon is static data: the combatant carrying it reads damage,
//! accuracy, penetration and crit values from it when resolving an attack.
//! Percent-valued fields are stored as integers (the way data files write
//! them) and exposed to the formulas as fixed-point fractions.

use serde::{Deserialize, Serialize};

use crate::error::{CombatError, Result};
use crate::math::{percent, Fixed};

/// Largest base damage a weapon template may declare.
pub const DAMAGE_LIMIT: u32 = 100_000;

/// Largest crit multiplier (percent) a weapon template may declare.
pub const CRIT_MULTIPLIER_LIMIT: u32 = 1_000;

/// Broad weapon family, selects the stat bonus and cover interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WeaponClass {
    /// Blades, blunt weapons, fists. Scales with body.
    Melee,
    /// Firearms. Scales with reflexes, blocked by cover.
    #[default]
    Ranged,
    /// Tech weapons charge through walls: scale with reflexes, ignore cover.
    Tech,
}

impl WeaponClass {
    /// Whether cover penalties and cover damage reduction are skipped.
    #[must_use]
    pub const fn ignores_cover(self) -> bool {
        matches!(self, WeaponClass::Tech)
    }
}

impl std::fmt::Display for WeaponClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WeaponClass::Melee => "melee",
            WeaponClass::Ranged => "ranged",
            WeaponClass::Tech => "tech",
        };
        f.write_str(name)
    }
}

const fn default_crit_multiplier() -> u32 {
    150
}

const fn default_accuracy() -> u8 {
    75
}

const fn default_range() -> u32 {
    1
}

/// Immutable weapon data.
///
/// # Example RON
///
/// ```ron
/// WeaponTemplate(
///     name: "Katana",
///     damage: 35,
///     accuracy: 85,
///     range: 1,
///     armor_pen: 20,         // 0.20
///     crit_multiplier: 250,  // 2.5x
///     class: Melee,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeaponTemplate {
    /// Display name.
    pub name: String,
    /// Base damage before variance and bonuses.
    pub damage: u32,
    /// Base hit chance in percent (0-100).
    #[serde(default = "default_accuracy")]
    pub accuracy: u8,
    /// Reach in tiles (Manhattan).
    #[serde(default = "default_range")]
    pub range: u32,
    /// Armor penetration in percent (0-100).
    #[serde(default)]
    pub armor_pen: u8,
    /// Critical multiplier in percent (250 = 2.5x).
    #[serde(default = "default_crit_multiplier")]
    pub crit_multiplier: u32,
    /// Weapon family.
    #[serde(default)]
    pub class: WeaponClass,
}

impl WeaponTemplate {
    /// Create a weapon with default accuracy, reach 1, no penetration and a
    /// 1.5x crit multiplier.
    pub fn new(name: impl Into<String>, damage: u32, class: WeaponClass) -> Self {
        Self {
            name: name.into(),
            damage,
            accuracy: default_accuracy(),
            range: default_range(),
            armor_pen: 0,
            crit_multiplier: default_crit_multiplier(),
            class,
        }
    }

    /// Builder method to set accuracy (capped at 100).
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: u8) -> Self {
        self.accuracy = accuracy.min(100);
        self
    }

    /// Builder method to set range in tiles.
    #[must_use]
    pub fn with_range(mut self, range: u32) -> Self {
        self.range = range;
        self
    }

    /// Builder method to set armor penetration (capped at 100).
    #[must_use]
    pub fn with_penetration(mut self, penetration: u8) -> Self {
        self.armor_pen = penetration.min(100);
        self
    }

    /// Builder method to set the crit multiplier in percent.
    #[must_use]
    pub fn with_crit_multiplier(mut self, multiplier_percent: u32) -> Self {
        self.crit_multiplier = multiplier_percent;
        self
    }

    /// Armor penetration as a fraction (0.0 to 1.0).
    #[must_use]
    pub fn penetration_fraction(&self) -> Fixed {
        percent(u32::from(self.armor_pen.min(100)))
    }

    /// Crit multiplier as a fixed-point factor.
    #[must_use]
    pub fn crit_factor(&self) -> Fixed {
        percent(self.crit_multiplier)
    }

    /// Whether the weapon's damage scales with body instead of reflexes.
    #[must_use]
    pub fn is_melee(&self) -> bool {
        self.class == WeaponClass::Melee
    }

    /// Check that every field is inside its documented range.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(CombatError::InvalidTemplate {
                name: self.name.clone(),
                message: message.to_string(),
            })
        };
        if self.name.trim().is_empty() {
            return fail("weapon name is empty");
        }
        if self.damage == 0 {
            return fail("damage must be positive");
        }
        if self.damage > DAMAGE_LIMIT {
            return fail("damage exceeds 100000");
        }
        if self.accuracy > 100 {
            return fail("accuracy must be within 0-100");
        }
        if self.armor_pen > 100 {
            return fail("armor penetration must be within 0-100");
        }
        if self.range == 0 {
            return fail("range must be at least 1 tile");
        }
        if self.crit_multiplier < 100 {
            return fail("crit multiplier below 100% would weaken crits");
        }
        if self.crit_multiplier > CRIT_MULTIPLIER_LIMIT {
            return fail("crit multiplier exceeds 1000%");
        }
        Ok(())
    }
}

/// Standard Night City armory.
pub mod catalog {
    use super::{WeaponClass, WeaponTemplate};

    /// Mantis-grade katana. High crits, some penetration.
    #[must_use]
    pub fn katana() -> WeaponTemplate {
        WeaponTemplate::new("Katana", 35, WeaponClass::Melee)
            .with_accuracy(85)
            .with_range(1)
            .with_penetration(20)
            .with_crit_multiplier(250)
    }

    /// Cheap street blade.
    #[must_use]
    pub fn combat_knife() -> WeaponTemplate {
        WeaponTemplate::new("Combat Knife", 18, WeaponClass::Melee)
            .with_accuracy(90)
            .with_range(1)
            .with_crit_multiplier(200)
    }

    /// Reliable sidearm.
    #[must_use]
    pub fn pistol() -> WeaponTemplate {
        WeaponTemplate::new("Lexington Pistol", 20, WeaponClass::Ranged)
            .with_accuracy(80)
            .with_range(6)
            .with_crit_multiplier(150)
    }

    /// Gang-issue assault rifle.
    #[must_use]
    pub fn assault_rifle() -> WeaponTemplate {
        WeaponTemplate::new("Ajax Rifle", 28, WeaponClass::Ranged)
            .with_accuracy(70)
            .with_range(8)
            .with_penetration(10)
            .with_crit_multiplier(150)
    }

    /// Close-range shotgun.
    #[must_use]
    pub fn shotgun() -> WeaponTemplate {
        WeaponTemplate::new("Carnage Shotgun", 40, WeaponClass::Ranged)
            .with_accuracy(65)
            .with_range(3)
            .with_crit_multiplier(150)
    }

    /// Charged tech rifle; shoots through cover.
    #[must_use]
    pub fn tech_rifle() -> WeaponTemplate {
        WeaponTemplate::new("Nekomata Tech Rifle", 30, WeaponClass::Tech)
            .with_accuracy(75)
            .with_range(10)
            .with_penetration(40)
            .with_crit_multiplier(200)
    }

    /// Look up a catalog weapon by (case-insensitive) name or id.
    #[must_use]
    pub fn by_name(name: &str) -> Option<WeaponTemplate> {
        let key = name.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let weapon = match key.as_str() {
            "katana" => katana(),
            "combat_knife" | "knife" => combat_knife(),
            "lexington_pistol" | "pistol" => pistol(),
            "ajax_rifle" | "assault_rifle" => assault_rifle(),
            "carnage_shotgun" | "shotgun" => shotgun(),
            "nekomata_tech_rifle" | "tech_rifle" => tech_rifle(),
            _ => return None,
        };
        Some(weapon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penetration_fraction() {
        let katana = catalog::katana();
        assert_eq!(katana.penetration_fraction(), percent(20));
        assert_eq!(katana.crit_factor(), Fixed::from_num(2.5));
    }

    #[test]
    fn test_builder_caps() {
        let w = WeaponTemplate::new("Test", 10, WeaponClass::Ranged)
            .with_accuracy(150)
            .with_penetration(200);
        assert_eq!(w.accuracy, 100);
        assert_eq!(w.armor_pen, 100);
        assert_eq!(w.penetration_fraction(), Fixed::ONE);
    }

    #[test]
    fn test_only_tech_ignores_cover() {
        assert!(WeaponClass::Tech.ignores_cover());
        assert!(!WeaponClass::Ranged.ignores_cover());
        assert!(!WeaponClass::Melee.ignores_cover());
    }

    #[test]
    fn test_validate() {
        assert!(catalog::katana().validate().is_ok());

        let mut broken = catalog::pistol();
        broken.range = 0;
        assert!(broken.validate().is_err());

        let mut weak_crit = catalog::pistol();
        weak_crit.crit_multiplier = 50;
        assert!(weak_crit.validate().is_err());

        let mut wild_crit = catalog::pistol();
        wild_crit.crit_multiplier = CRIT_MULTIPLIER_LIMIT + 1;
        assert!(wild_crit.validate().is_err());

        let mut overpowered = catalog::pistol();
        overpowered.damage = DAMAGE_LIMIT;
        assert!(overpowered.validate().is_ok());
        overpowered.damage = DAMAGE_LIMIT + 1;
        assert!(overpowered.validate().is_err());
    }

    #[test]
    fn test_catalog_lookup() {
        assert_eq!(catalog::by_name("Katana"), Some(catalog::katana()));
        assert_eq!(catalog::by_name("tech-rifle"), Some(catalog::tech_rifle()));
        assert_eq!(catalog::by_name("railgun"), None);
    }

    #[test]
    fn test_ron_defaults() {
        let weapon: WeaponTemplate = ron::from_str(r#"(name: "Pipe", damage: 12, class: Melee)"#)
            .expect("valid weapon RON");
        assert_eq!(weapon.range, 1);
        assert_eq!(weapon.armor_pen, 0);
        assert_eq!(weapon.crit_multiplier, 150);
        assert_eq!(weapon.accuracy, 75);
    }
}
