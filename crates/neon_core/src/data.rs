//! Serde data templates for combatants and whole encounters.
//!
//! The core performs no IO: callers deserialize these (the headless runner
//! uses RON) and hand them over. Templates are validated before they are
//! turned into live [`Combatant`]s.

use serde::{Deserialize, Serialize};

use crate::combatant::{Attributes, Combatant, Team, ARMOR_LIMIT, HP_LIMIT, MAX_MORALE};
use crate::encounter::Encounter;
use crate::error::{CombatError, Result};
use crate::grid::Grid;
use crate::item::ItemStack;
use crate::math::GridPos;
use crate::rng::CombatRng;
use crate::weapon::{catalog, WeaponTemplate};

/// Weapon reference in a template: a catalog entry by name, or inline stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponSpec {
    /// Look up a weapon in [`catalog`].
    Catalog(String),
    /// Inline weapon definition.
    Custom(WeaponTemplate),
}

impl WeaponSpec {
    /// Resolve to a concrete template.
    ///
    /// # Errors
    ///
    /// [`CombatError::InvalidTemplate`] for unknown catalog names or invalid
    /// inline stats.
    pub fn resolve(&self) -> Result<WeaponTemplate> {
        let weapon = match self {
            WeaponSpec::Catalog(name) => {
                catalog::by_name(name).ok_or_else(|| CombatError::InvalidTemplate {
                    name: name.clone(),
                    message: "no such weapon in the catalog".to_string(),
                })?
            }
            WeaponSpec::Custom(weapon) => weapon.clone(),
        };
        weapon.validate()?;
        Ok(weapon)
    }
}

impl From<WeaponTemplate> for WeaponSpec {
    fn from(weapon: WeaponTemplate) -> Self {
        WeaponSpec::Custom(weapon)
    }
}

const fn default_attributes() -> Attributes {
    Attributes {
        body: 5,
        reflexes: 5,
        intelligence: 5,
        tech: 5,
        cool: 5,
    }
}

/// Everything needed to create one combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantTemplate {
    /// Display name.
    pub name: String,
    /// Side tag.
    #[serde(default)]
    pub team: Team,
    /// Starting tile.
    pub position: GridPos,
    /// Primary attributes.
    #[serde(default = "default_attributes")]
    pub attributes: Attributes,
    /// Maximum HP.
    pub max_hp: u32,
    /// Flat armor.
    #[serde(default)]
    pub armor: u32,
    /// Equipped weapon.
    pub weapon: WeaponSpec,
    /// Carried consumables.
    #[serde(default)]
    pub items: Vec<ItemStack>,
    /// Starting HP if below max.
    #[serde(default)]
    pub hp: Option<u32>,
    /// Starting morale if below 100.
    #[serde(default)]
    pub morale: Option<u32>,
}

impl CombatantTemplate {
    /// Template with default attributes, no armor and no items.
    pub fn new(
        name: impl Into<String>,
        team: Team,
        position: GridPos,
        max_hp: u32,
        weapon: impl Into<WeaponSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            team,
            position,
            attributes: default_attributes(),
            max_hp,
            armor: 0,
            weapon: weapon.into(),
            items: Vec::new(),
            hp: None,
            morale: None,
        }
    }

    /// Check ranges and resolve the weapon.
    ///
    /// # Errors
    ///
    /// [`CombatError::InvalidTemplate`] naming the first problem.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| CombatError::InvalidTemplate {
            name: self.name.clone(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(fail("name must not be empty".to_string()));
        }
        if self.max_hp == 0 {
            return Err(fail("max_hp must be positive".to_string()));
        }
        if self.max_hp > HP_LIMIT {
            return Err(fail(format!("max_hp {} exceeds {HP_LIMIT}", self.max_hp)));
        }
        if self.armor > ARMOR_LIMIT {
            return Err(fail(format!("armor {} exceeds {ARMOR_LIMIT}", self.armor)));
        }
        let a = self.attributes;
        for (label, value) in [
            ("body", a.body),
            ("reflexes", a.reflexes),
            ("intelligence", a.intelligence),
            ("tech", a.tech),
            ("cool", a.cool),
        ] {
            if !(Attributes::MIN..=Attributes::MAX).contains(&value) {
                return Err(fail(format!("{label} {value} outside 1-10")));
            }
        }
        if let Some(hp) = self.hp {
            if hp > self.max_hp {
                return Err(fail(format!("hp {hp} exceeds max_hp {}", self.max_hp)));
            }
        }
        if let Some(morale) = self.morale {
            if morale > MAX_MORALE {
                return Err(fail(format!("morale {morale} exceeds {MAX_MORALE}")));
            }
        }
        self.weapon.resolve()?;
        Ok(())
    }

    /// Validate and build a live combatant.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn build(&self) -> Result<Combatant> {
        self.validate()?;
        let mut combatant = Combatant::new(
            self.name.clone(),
            self.team,
            self.attributes,
            self.max_hp,
            self.armor,
            self.weapon.resolve()?,
        )
        .at(self.position.x, self.position.y);
        if let Some(hp) = self.hp {
            combatant = combatant.with_hp(hp);
        }
        if let Some(morale) = self.morale {
            combatant = combatant.with_morale(morale);
        }
        for stack in &self.items {
            combatant.add_items(stack.kind, stack.count);
        }
        Ok(combatant)
    }
}

/// A complete encounter: battlefield plus both rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterSetup {
    /// Human-readable name.
    pub name: String,
    /// Battlefield.
    #[serde(default)]
    pub grid: Grid,
    /// Player side (player and allies).
    pub player_team: Vec<CombatantTemplate>,
    /// Hostiles.
    pub enemy_team: Vec<CombatantTemplate>,
}

impl EncounterSetup {
    /// Validate every template plus the layout.
    ///
    /// # Errors
    ///
    /// [`CombatError::EmptyEncounter`] for empty rosters, otherwise
    /// [`CombatError::InvalidTemplate`] naming the offending combatant.
    pub fn validate(&self) -> Result<()> {
        if self.player_team.is_empty() && self.enemy_team.is_empty() {
            return Err(CombatError::EmptyEncounter);
        }

        let mut occupied = std::collections::BTreeMap::new();
        let rosters = self
            .player_team
            .iter()
            .map(|t| (t, true))
            .chain(self.enemy_team.iter().map(|t| (t, false)));
        for (template, player_side) in rosters {
            template.validate()?;
            let fail = |message: String| CombatError::InvalidTemplate {
                name: template.name.clone(),
                message,
            };
            if template.team.is_player_side() != player_side {
                return Err(fail(format!("team {:?} on the wrong roster", template.team)));
            }
            if !self.grid.in_bounds(template.position) {
                return Err(fail(format!("position {} is off the grid", template.position)));
            }
            if template.hp != Some(0) {
                if let Some(other) = occupied.insert(template.position, template.name.as_str()) {
                    return Err(fail(format!(
                        "shares tile {} with {other}",
                        template.position
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate and build the encounter with the given random source.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate) and [`Encounter::new`].
    pub fn build<R: CombatRng>(&self, rng: R) -> Result<Encounter<R>> {
        self.validate()?;
        let players = self
            .player_team
            .iter()
            .map(CombatantTemplate::build)
            .collect::<Result<Vec<_>>>()?;
        let enemies = self
            .enemy_team
            .iter()
            .map(CombatantTemplate::build)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(setup = %self.name, "Building encounter");
        Encounter::new(players, enemies, self.grid.clone(), rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemKind;
    use crate::rng::ScriptedRng;

    const SETUP: &str = r#"
        EncounterSetup(
            name: "Back alley",
            grid: Grid(width: 8, height: 8, cover: [((x: 4, y: 4), Half)]),
            player_team: [
                CombatantTemplate(
                    name: "V",
                    position: (x: 1, y: 1),
                    attributes: (body: 8, reflexes: 6, intelligence: 5, tech: 5, cool: 6),
                    max_hp: 100,
                    weapon: Catalog("katana"),
                    items: [(kind: Stim, count: 2)],
                ),
            ],
            enemy_team: [
                CombatantTemplate(
                    name: "Gang Grunt",
                    team: Enemy,
                    position: (x: 4, y: 4),
                    max_hp: 60,
                    armor: 5,
                    weapon: Custom((name: "Pipe Pistol", damage: 15, class: Ranged, range: 5)),
                ),
            ],
        )
    "#;

    #[test]
    fn test_setup_from_ron() {
        let setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        assert!(setup.validate().is_ok());

        let enc = setup
            .build(ScriptedRng::new([5, 5]))
            .expect("valid setup");
        let v = enc.combatant(crate::combatant::CombatantId(0)).expect("exists");
        assert_eq!(v.weapon().name, "Katana");
        assert_eq!(v.item_count(ItemKind::Stim), 2);
        assert_eq!(v.attributes().body, 8);
        let grunt = enc.combatant(crate::combatant::CombatantId(1)).expect("exists");
        assert_eq!(grunt.attributes(), Attributes::default());
        assert_eq!(grunt.weapon().accuracy, 75);
        assert_eq!(enc.grid().cover_at(GridPos::new(4, 4)), crate::grid::Cover::Half);
    }

    #[test]
    fn test_validation_failures() {
        let mut setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        setup.enemy_team[0].position = GridPos::new(1, 1);
        assert!(matches!(
            setup.validate(),
            Err(CombatError::InvalidTemplate { .. })
        ));

        let mut setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        setup.enemy_team[0].team = Team::Ally;
        assert!(setup.validate().is_err());

        let mut setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        setup.player_team[0].weapon = WeaponSpec::Catalog("railgun".to_string());
        assert!(setup.validate().is_err());

        let mut setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        setup.player_team[0].attributes.cool = 11;
        assert!(setup.validate().is_err());

        let mut setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        setup.enemy_team[0].armor = ARMOR_LIMIT + 1;
        assert!(setup.validate().is_err());

        let mut setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        setup.enemy_team[0].max_hp = HP_LIMIT + 1;
        assert!(setup.validate().is_err());

        let mut setup: EncounterSetup = ron::from_str(SETUP).expect("valid RON");
        setup.player_team[0].weapon = WeaponSpec::Custom(
            WeaponTemplate::new("Railgun", 3_000_000_000, crate::weapon::WeaponClass::Tech),
        );
        assert!(setup.validate().is_err());

        let empty = EncounterSetup {
            name: "Nobody".to_string(),
            grid: Grid::default(),
            player_team: Vec::new(),
            enemy_team: Vec::new(),
        };
        assert!(matches!(empty.validate(), Err(CombatError::EmptyEncounter)));
    }

    #[test]
    fn test_template_starting_state() {
        let mut template = CombatantTemplate::new(
            "Jackie",
            Team::Ally,
            GridPos::new(0, 0),
            120,
            catalog::shotgun(),
        );
        template.hp = Some(60);
        template.morale = Some(40);
        let jackie = template.build().expect("valid template");
        assert_eq!(jackie.hp(), 60);
        assert_eq!(jackie.morale(), 40);
        assert_eq!(jackie.team(), Team::Ally);

        template.hp = Some(121);
        assert!(template.build().is_err());
    }
}
