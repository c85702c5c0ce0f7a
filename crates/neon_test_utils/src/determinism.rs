//! Determinism testing utilities.
//!
//! Provides a harness for verifying that encounters produce identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays and balance runs are only meaningful if an encounter is 100%
//! reproducible from its setup and seed. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`neon_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The core only iterates arenas and ordered maps.
//!
//! - **System randomness**: Every roll goes through an injected
//!   [`CombatRng`]; real encounters use a seeded ChaCha generator.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual formulas with pinned rolls
//! 2. **Property tests**: Random inputs must still satisfy the invariants
//! 3. **Integration tests**: Full encounters are reproducible
//! 4. **Parallel tests**: Running N encounters in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use neon_core::prelude::*;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps taken per run.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic encounter).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Encounter is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Play one AI turn if the encounter is still running.
///
/// # Panics
///
/// Panics if the core rejects the turn of an active encounter.
fn step_turn<R: CombatRng>(encounter: &mut Encounter<R>) {
    if !encounter.is_active() {
        return;
    }
    if let Err(error) = encounter.run_ai_turn(&HeuristicAi) {
        panic!("AI turn rejected on an active encounter: {error}");
    }
}

/// Build the same setup twice with the same seed, play `turns` heuristic
/// turns, and compare final state hashes.
///
/// # Panics
///
/// Panics if the setup does not build.
pub fn verify_encounter_determinism(setup: &EncounterSetup, seed: u64, turns: u64) -> bool {
    verify_determinism(
        2,
        turns,
        || {
            setup
                .build(SeededRng::new(seed))
                .expect("setup builds an encounter")
        },
        step_turn::<SeededRng>,
        |encounter: &Encounter<SeededRng>| encounter.state_hash(),
    )
    .is_deterministic
}

/// Result of parallel encounter runs.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final state hash from each encounter.
    pub hashes: Vec<u64>,
    /// Turns each encounter ran.
    pub turns: u64,
    /// Number of encounters run.
    pub runs: usize,
}

impl ParallelRunResult {
    /// Check if all runs produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all runs matched.
    ///
    /// # Panics
    ///
    /// Panics if runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel encounters diverged!\n\
                 Runs: {}\n\
                 Turns: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.runs,
                self.turns,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run N copies of an encounter on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences.
///
/// # Panics
///
/// Panics if the setup does not build, or re-raises a panic from a worker.
pub fn run_parallel_encounters(
    setup: &EncounterSetup,
    seed: u64,
    runs: usize,
    turns: u64,
) -> ParallelRunResult {
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut encounter = setup
                        .build(SeededRng::new(seed))
                        .expect("setup builds an encounter");
                    for _ in 0..turns {
                        step_turn(&mut encounter);
                    }
                    encounter.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });

    ParallelRunResult {
        hashes,
        turns,
        runs,
    }
}

/// Compare two runs turn by turn, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs are deterministic, `Some(turn)` if they diverge at
/// that turn (0 means the freshly built encounters already differ).
///
/// # Panics
///
/// Panics if the setup does not build.
pub fn find_first_divergence(setup: &EncounterSetup, seed: u64, turns: u64) -> Option<u64> {
    let build = || {
        setup
            .build(SeededRng::new(seed))
            .expect("setup builds an encounter")
    };
    let mut first = build();
    let mut second = build();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for turn in 1..=turns {
        step_turn(&mut first);
        step_turn(&mut second);

        if first.state_hash() != second.state_hash() {
            return Some(turn);
        }
    }

    None
}

/// Auto-resolve an encounter, capture a replay, push it through bincode and
/// verify it reproduces the same final state.
pub fn verify_replay_determinism(setup: &EncounterSetup, seed: u64, max_rounds: u32) -> bool {
    let Ok(mut encounter) = setup.build(SeededRng::new(seed)) else {
        return false;
    };
    encounter.auto_resolve(&HeuristicAi, &HeuristicAi, max_rounds);

    let replay = Replay::capture(setup, seed, &encounter);
    let Ok(bytes) = replay.to_bytes() else {
        return false;
    };
    let Ok(restored) = Replay::from_bytes(&bytes) else {
        return false;
    };
    restored.verify().is_ok()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for combat testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the combat formulas and the encounter.
pub mod strategies {
    use neon_core::combatant::{ARMOR_LIMIT, HP_LIMIT};
    use neon_core::prelude::*;
    use neon_core::weapon::{CRIT_MULTIPLIER_LIMIT, DAMAGE_LIMIT};
    use proptest::prelude::*;

    /// Attribute value on the 1-10 scale.
    pub fn arb_attribute() -> impl Strategy<Value = u8> {
        1u8..=10u8
    }

    /// A full attribute block.
    pub fn arb_attributes() -> impl Strategy<Value = Attributes> {
        (
            arb_attribute(),
            arb_attribute(),
            arb_attribute(),
            arb_attribute(),
            arb_attribute(),
        )
            .prop_map(|(body, reflexes, intelligence, tech, cool)| {
                Attributes::new(body, reflexes, intelligence, tech, cool)
            })
    }

    /// Weapon class.
    pub fn arb_weapon_class() -> impl Strategy<Value = WeaponClass> {
        prop_oneof![
            Just(WeaponClass::Melee),
            Just(WeaponClass::Ranged),
            Just(WeaponClass::Tech),
        ]
    }

    /// Any valid weapon, up to the largest damage and crit multiplier a
    /// template may declare.
    pub fn arb_weapon() -> impl Strategy<Value = WeaponTemplate> {
        (
            prop_oneof![1u32..200u32, 200u32..=DAMAGE_LIMIT],
            0u8..=100u8,
            1u32..12u32,
            0u8..=100u8,
            prop_oneof![100u32..400u32, 400u32..=CRIT_MULTIPLIER_LIMIT],
            arb_weapon_class(),
        )
            .prop_map(|(damage, accuracy, range, pen, crit, class)| {
                WeaponTemplate::new("Arb", damage, class)
                    .with_accuracy(accuracy)
                    .with_range(range)
                    .with_penetration(pen)
                    .with_crit_multiplier(crit)
            })
    }

    /// Armor, up to the template limit plus values only builders can reach.
    pub fn arb_armor() -> impl Strategy<Value = u32> {
        prop_oneof![
            0u32..50u32,
            50u32..=ARMOR_LIMIT,
            ARMOR_LIMIT..=u32::MAX,
            Just(u32::MAX),
        ]
    }

    /// Max HP values, mostly small.
    pub fn arb_max_hp() -> impl Strategy<Value = u32> {
        prop_oneof![4 => 1u32..500u32, 1 => 500u32..=HP_LIMIT]
    }

    /// Damage amounts, including overkill up to `u32::MAX`.
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        prop_oneof![0u32..2_000u32, 2_000u32..=u32::MAX, Just(u32::MAX)]
    }

    /// Morale 0-100.
    pub fn arb_morale() -> impl Strategy<Value = u32> {
        0u32..=100u32
    }

    /// Cover level.
    pub fn arb_cover() -> impl Strategy<Value = Cover> {
        prop_oneof![Just(Cover::None), Just(Cover::Half), Just(Cover::Full)]
    }

    /// A combatant on `team` with arbitrary stats, not yet placed.
    pub fn arb_combatant(team: Team) -> impl Strategy<Value = Combatant> {
        (
            arb_attributes(),
            arb_max_hp(),
            arb_armor(),
            arb_weapon(),
            arb_morale(),
        )
            .prop_map(move |(attributes, max_hp, armor, weapon, morale)| {
                Combatant::new("Arb", team, attributes, max_hp, armor, weapon).with_morale(morale)
            })
    }

    /// RNG seeds.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }
}
