//! Test fixtures and helpers.
//!
//! Pre-built combatants, weapons and encounters for consistent testing.

use fixed::types::I32F32;
use neon_core::prelude::*;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real combat code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// The stock katana: 35 damage, 20% penetration, 2.5x crits.
#[must_use]
pub fn katana() -> WeaponTemplate {
    catalog::katana()
}

/// V: body 8, reflexes 6, cool 6, 100 HP, katana, standing at (0, 0).
#[must_use]
pub fn v() -> Combatant {
    Combatant::new(
        "V",
        Team::Player,
        Attributes::new(8, 6, 5, 5, 6),
        100,
        10,
        katana(),
    )
}

/// Jackie: a tough ally with a shotgun, standing at (1, 0).
#[must_use]
pub fn jackie() -> Combatant {
    Combatant::new(
        "Jackie",
        Team::Ally,
        Attributes::new(9, 4, 3, 4, 5),
        130,
        15,
        catalog::shotgun(),
    )
    .at(1, 0)
}

/// Gang Grunt: average attributes, 60 HP, armor 20, pistol, at (0, 1).
#[must_use]
pub fn gang_grunt() -> Combatant {
    Combatant::new(
        "Gang Grunt",
        Team::Enemy,
        Attributes::default(),
        60,
        20,
        catalog::pistol(),
    )
    .at(0, 1)
}

/// A target that never dodges much: reflexes 1, the given armor, 100 HP.
#[must_use]
pub fn dummy(armor: u32) -> Combatant {
    Combatant::new(
        "Training Dummy",
        Team::Enemy,
        Attributes::new(5, 1, 1, 1, 1),
        100,
        armor,
        catalog::combat_knife(),
    )
    .at(0, 1)
}

/// Scripted rolls, in consumption order.
#[must_use]
pub fn pinned(rolls: impl IntoIterator<Item = u32>) -> ScriptedRng {
    ScriptedRng::new(rolls)
}

/// V against one Gang Grunt on an open 12x12 grid.
///
/// # Panics
///
/// Panics if the fixture itself is invalid.
pub fn duel<R: CombatRng>(rng: R) -> Encounter<R> {
    Encounter::new(vec![v()], vec![gang_grunt()], Grid::default(), rng)
        .expect("duel fixture is a valid encounter")
}

/// Two mercs against three gangers with some cover, as RON.
pub const SKIRMISH_RON: &str = r#"
EncounterSetup(
    name: "Skirmish",
    grid: Grid(
        width: 12,
        height: 12,
        cover: [
            ((x: 3, y: 4), Half),
            ((x: 8, y: 7), Half),
            ((x: 6, y: 6), Full),
        ],
    ),
    player_team: [
        CombatantTemplate(
            name: "V",
            position: (x: 1, y: 1),
            attributes: (body: 8, reflexes: 6, intelligence: 5, tech: 5, cool: 6),
            max_hp: 100,
            armor: 10,
            weapon: Catalog("katana"),
            items: [(kind: Stim, count: 1)],
        ),
        CombatantTemplate(
            name: "Jackie",
            team: Ally,
            position: (x: 2, y: 1),
            attributes: (body: 9, reflexes: 4, intelligence: 3, tech: 4, cool: 5),
            max_hp: 130,
            armor: 15,
            weapon: Catalog("assault_rifle"),
        ),
    ],
    enemy_team: [
        CombatantTemplate(
            name: "Ganger 1",
            team: Enemy,
            position: (x: 9, y: 9),
            max_hp: 60,
            armor: 5,
            weapon: Catalog("pistol"),
        ),
        CombatantTemplate(
            name: "Ganger 2",
            team: Enemy,
            position: (x: 10, y: 8),
            max_hp: 60,
            armor: 5,
            weapon: Catalog("shotgun"),
        ),
        CombatantTemplate(
            name: "Ganger 3",
            team: Enemy,
            position: (x: 8, y: 10),
            max_hp: 50,
            weapon: Catalog("knife"),
        ),
    ],
)
"#;

/// [`SKIRMISH_RON`], parsed.
///
/// # Panics
///
/// Panics if the fixture does not parse.
#[must_use]
pub fn skirmish_setup() -> EncounterSetup {
    ron::from_str(SKIRMISH_RON).expect("skirmish fixture is valid RON")
}
