//! Seed sequencing: which seed the i-th trial runs on.

use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedOrder {
    /// `seed(i) = base + i` with 32-bit wraparound.
    #[default]
    Linear,
    /// `seed(i) = transform(base, i)`.
    Permuted,
}

/// Injective mapping from trial index to seed for a fixed base seed.
pub trait SeedTransform {
    fn transform(&self, base: u32, index: u64) -> u32;
}

/// Advances the generator's LCG `index` steps from `base` in O(log index).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LcgJump;

impl LcgJump {
    pub const MULTIPLIER: u32 = 0x41C6_4E6D;
    pub const INCREMENT: u32 = 0x3039;

    #[must_use]
    pub const fn step(seed: u32) -> u32 {
        seed.wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT)
    }
}

impl SeedTransform for LcgJump {
    fn transform(&self, base: u32, index: u64) -> u32 {
        let (mut acc_mult, mut acc_inc) = (1u32, 0u32);
        let (mut mult, mut inc) = (Self::MULTIPLIER, Self::INCREMENT);
        let mut steps = index;
        while steps > 0 {
            if steps & 1 == 1 {
                acc_mult = acc_mult.wrapping_mul(mult);
                acc_inc = acc_inc.wrapping_mul(mult).wrapping_add(inc);
            }
            inc = mult.wrapping_add(1).wrapping_mul(inc);
            mult = mult.wrapping_mul(mult);
            steps >>= 1;
        }
        acc_mult.wrapping_mul(base).wrapping_add(acc_inc)
    }
}

impl<F> SeedTransform for F
where
    F: Fn(u32, u64) -> u32,
{
    fn transform(&self, base: u32, index: u64) -> u32 {
        self(base, index)
    }
}

/// Deterministic seed list of a sweep. Every index is computed independently.
#[derive(Debug, Clone)]
pub struct SeedSequencer<T = LcgJump> {
    base: u32,
    trial_count: u64,
    order: SeedOrder,
    transform: T,
}

impl SeedSequencer<LcgJump> {
    /// Non-positive trial counts produce an empty sequence.
    #[must_use]
    pub fn new(base: u32, trial_count: i64, order: SeedOrder) -> Self {
        Self::with_transform(base, trial_count, order, LcgJump)
    }
}

impl<T: SeedTransform> SeedSequencer<T> {
    #[must_use]
    pub fn with_transform(base: u32, trial_count: i64, order: SeedOrder, transform: T) -> Self {
        Self {
            base,
            trial_count: u64::try_from(trial_count).unwrap_or(0),
            order,
            transform,
        }
    }

    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    #[must_use]
    pub const fn order(&self) -> SeedOrder {
        self.order
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.trial_count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.trial_count == 0
    }

    /// Seed for `index`, without bounds checking.
    #[must_use]
    pub fn seed_at(&self, index: u64) -> u32 {
        match self.order {
            // Truncation is the 32-bit wraparound.
            #[allow(clippy::cast_possible_truncation)]
            SeedOrder::Linear => self.base.wrapping_add(index as u32),
            SeedOrder::Permuted => self.transform.transform(self.base, index),
        }
    }

    #[must_use]
    pub fn get(&self, index: u64) -> Option<u32> {
        (index < self.trial_count).then(|| self.seed_at(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.trial_count).map(|i| self.seed_at(i))
    }

    /// Split the index space into at most `workers` contiguous, non-empty ranges.
    /// Never more ranges than there are trials.
    #[must_use]
    pub fn partition(&self, workers: usize) -> Vec<Range<u64>> {
        let workers = u64::try_from(workers)
            .unwrap_or(u64::MAX)
            .clamp(1, self.trial_count.max(1));
        let chunk = self.trial_count.div_ceil(workers).max(1);
        (0..workers)
            .map(|w| (w * chunk).min(self.trial_count)..((w + 1) * chunk).min(self.trial_count))
            .filter(|range| !range.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn linear_wraps_at_32_bits() {
        let seq = SeedSequencer::new(u32::MAX - 1, 4, SeedOrder::Linear);
        let seeds: Vec<u32> = seq.iter().collect();
        assert_eq!(seeds, vec![u32::MAX - 1, u32::MAX, 0, 1]);
    }

    #[test]
    fn linear_matches_modular_formula() {
        let base = 0x8000_0000u32;
        let seq = SeedSequencer::new(base, 1000, SeedOrder::Linear);
        for i in (0..1000u64).step_by(37) {
            let expected = ((u64::from(base) + i) % (1u64 << 32)) as u32;
            assert_eq!(seq.seed_at(i), expected);
        }
    }

    #[test]
    fn non_positive_counts_are_empty() {
        assert!(SeedSequencer::new(5, 0, SeedOrder::Linear).is_empty());
        assert_eq!(SeedSequencer::new(5, -3, SeedOrder::Permuted).iter().count(), 0);
        assert_eq!(SeedSequencer::new(5, -3, SeedOrder::Linear).get(0), None);
    }

    #[test]
    fn lcg_jump_matches_stepping() {
        let base = 0xDEAD_BEEF;
        let mut stepped = base;
        for i in 0..200u64 {
            assert_eq!(LcgJump.transform(base, i), stepped, "index {i}");
            stepped = LcgJump::step(stepped);
        }
    }

    #[test]
    fn permuted_order_is_injective_and_random_access() {
        let seq = SeedSequencer::new(0, 4096, SeedOrder::Permuted);
        let seeds: Vec<u32> = seq.iter().collect();
        let unique: HashSet<_> = seeds.iter().copied().collect();
        assert_eq!(unique.len(), seeds.len());
        assert_eq!(seq.seed_at(4000), seeds[4000]);
        assert_eq!(seq.seed_at(1), LcgJump::step(0));
    }

    #[test]
    fn custom_transform_closure() {
        let seq = SeedSequencer::with_transform(10, 3, SeedOrder::Permuted, |base: u32, i: u64| {
            base ^ (i as u32)
        });
        assert_eq!(seq.iter().collect::<Vec<_>>(), vec![10, 11, 8]);
    }

    #[test]
    fn partition_covers_indices_contiguously() {
        let seq = SeedSequencer::new(0, 10, SeedOrder::Linear);
        let ranges = seq.partition(3);
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert_eq!(seq.partition(32).len(), 10);
        assert_eq!(seq.partition(0), vec![0..10]);
        assert!(SeedSequencer::new(0, 0, SeedOrder::Linear).partition(4).is_empty());
    }

    #[test]
    fn partition_clamps_oversized_worker_counts() {
        let seq = SeedSequencer::new(0, 5, SeedOrder::Linear);
        let ranges = seq.partition(usize::MAX);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3, 3..4, 4..5]);
        let single = SeedSequencer::new(7, 1, SeedOrder::Permuted);
        assert_eq!(single.partition(100_000), vec![0..1]);
    }
}
