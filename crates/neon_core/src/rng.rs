//! Injectable random source for combat resolution.
//!
//! Every roll the combat core makes (initiative, hit, variance, crit,
//! escape) goes through [`CombatRng`]. Encounters own their generator, so a
//! seeded [`SeededRng`] makes a whole fight reproducible and a
//! [`ScriptedRng`] lets tests pin individual rolls.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::math::Fixed;

/// Lowest damage variance, in basis points (0.85).
pub const VARIANCE_MIN_BP: u32 = 8_500;

/// Highest damage variance, in basis points (1.15).
pub const VARIANCE_MAX_BP: u32 = 11_500;

const BASIS_POINTS: u32 = 10_000;

/// Source of the dice rolls used by combat formulas.
pub trait CombatRng {
    /// Uniform integer in `[low, high]`, both inclusive.
    fn roll_range(&mut self, low: u32, high: u32) -> u32;

    /// A ten-sided die, `1..=10`.
    fn roll_d10(&mut self) -> u32 {
        self.roll_range(1, 10)
    }

    /// A percentile roll, `1..=100`.
    fn roll_percent(&mut self) -> u32 {
        self.roll_range(1, 100)
    }

    /// Damage variance multiplier in `[0.85, 1.15]`.
    ///
    /// Drawn in basis points so that a roll of `10_000` is exactly `1.0`.
    fn roll_variance(&mut self) -> Fixed {
        Fixed::from_num(self.roll_range(VARIANCE_MIN_BP, VARIANCE_MAX_BP))
            / Fixed::from_num(BASIS_POINTS)
    }
}

impl<R: CombatRng + ?Sized> CombatRng for &mut R {
    fn roll_range(&mut self, low: u32, high: u32) -> u32 {
        (**self).roll_range(low, high)
    }
}

impl<R: CombatRng + ?Sized> CombatRng for Box<R> {
    fn roll_range(&mut self, low: u32, high: u32) -> u32 {
        (**self).roll_range(low, high)
    }
}

/// Seeded ChaCha generator; the default source for real encounters.
#[derive(Debug, Clone)]
pub struct SeededRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl SeededRng {
    /// Create a generator from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this generator was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl CombatRng for SeededRng {
    fn roll_range(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Replays a fixed list of rolls, in order.
///
/// Each scripted value is clamped into the requested range, so a test can
/// write `ScriptedRng::new([5, 100, 10_000])` without caring about the exact
/// bounds of each roll.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRng {
    rolls: VecDeque<u32>,
}

impl ScriptedRng {
    /// Create a scripted generator from a sequence of rolls.
    pub fn new(rolls: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
        }
    }

    /// Append a roll to the end of the script.
    pub fn push(&mut self, roll: u32) {
        self.rolls.push_back(roll);
    }

    /// Rolls not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl CombatRng for ScriptedRng {
    /// # Panics
    ///
    /// Panics when the script runs out: an unplanned roll in a pinned test
    /// is a test bug.
    fn roll_range(&mut self, low: u32, high: u32) -> u32 {
        match self.rolls.pop_front() {
            Some(roll) => roll.clamp(low, high.max(low)),
            None => panic!("ScriptedRng exhausted (requested a roll in {low}..={high})"),
        }
    }
}
