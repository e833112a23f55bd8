//! Lock-free playback progress
//!
//! The decode position is a fraction of the track in `[0, 1]`, stored as
//! fixed point in a single `AtomicU64` together with a seek generation:
//!
//! ```text
//!  63        48 47                                0
//! +------------+-----------------------------------+
//! | generation |  fraction (ONE = 1 << 46)          |
//! +------------+-----------------------------------+
//! ```
//!
//! The decode thread is the only writer of forward advances. Seeks and stops
//! reset the value from the control thread and bump the generation, so an
//! advance computed from a snapshot taken before the seek fails its
//! compare-exchange instead of overwriting the seek target.
//!
//! Advancing by whole samples re-quantizes to `(index + 1) / sample_count`
//! rather than adding `1 / sample_count`, so the position never drifts no
//! matter how many samples are played.

use std::sync::atomic::{AtomicU64, Ordering};

const FRACTION_BITS: u32 = 48;
const FRACTION_MASK: u64 = (1 << FRACTION_BITS) - 1;

/// Fixed-point representation of 1.0
const ONE: u64 = 1 << 46;

/// Consistent view of the counter at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    raw: u64,
}

impl ProgressSnapshot {
    /// Seek generation this snapshot belongs to
    pub fn generation(&self) -> u16 {
        (self.raw >> FRACTION_BITS) as u16
    }

    /// Position as a fraction of the track
    pub fn fraction(&self) -> f64 {
        self.fixed() as f64 / ONE as f64
    }

    /// Index of the next sample to decode, `floor(fraction * sample_count)`
    ///
    /// Values within a rounding step of a sample boundary resolve to that
    /// boundary, so `k / n` stored as fixed point always yields `k`.
    pub fn sample_index(&self, sample_count: u64) -> u64 {
        if sample_count == 0 {
            return 0;
        }
        let n = sample_count as u128;
        ((self.fixed() as u128 * n + n) / ONE as u128) as u64
    }

    fn fixed(&self) -> u64 {
        self.raw & FRACTION_MASK
    }
}

/// Fractional decode position shared between the decode and control threads
#[derive(Debug, Default)]
pub struct ProgressCounter {
    value: AtomicU64,
}

impl ProgressCounter {
    /// Create a counter at the start of the track
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of the current position and generation
    pub fn load(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            raw: self.value.load(Ordering::Acquire),
        }
    }

    /// Current position as a fraction of the track
    pub fn fraction(&self) -> f64 {
        self.load().fraction()
    }

    /// Index of the next sample to decode
    pub fn sample_index(&self, sample_count: u64) -> u64 {
        self.load().sample_index(sample_count)
    }

    /// Add a non-negative fraction, saturating at 1.0
    pub fn advance(&self, delta: f64) {
        let delta = to_fixed(delta);
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let fixed = ((current & FRACTION_MASK) + delta).min(ONE);
            let next = (current & !FRACTION_MASK) | fixed;
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Move one sample past `snapshot`, unless the counter changed since
    ///
    /// Returns `false` when a seek or stop happened after the snapshot was
    /// taken; the caller should re-read the position.
    pub fn advance_from(&self, snapshot: ProgressSnapshot, sample_count: u64) -> bool {
        let next_index = snapshot.sample_index(sample_count) + 1;
        let fixed = quantize(next_index, sample_count);
        let next = (snapshot.raw & !FRACTION_MASK) | fixed;
        self.value
            .compare_exchange(snapshot.raw, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Wrap back to the start for looping, keeping the generation
    ///
    /// Frames already queued before the wrap stay valid. Returns `false` if
    /// the counter changed since `snapshot`.
    pub fn wrap(&self, snapshot: ProgressSnapshot) -> bool {
        let next = snapshot.raw & !FRACTION_MASK;
        self.value
            .compare_exchange(snapshot.raw, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Jump to `fraction` and start a new generation
    ///
    /// Returns the new generation.
    pub fn reset(&self, fraction: f64) -> u16 {
        self.store_new_generation(to_fixed(fraction))
    }

    /// Jump to the start of sample `index` and start a new generation
    pub fn reset_to_sample(&self, index: u64, sample_count: u64) -> u16 {
        self.store_new_generation(quantize(index, sample_count))
    }

    fn store_new_generation(&self, fixed: u64) -> u16 {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let generation = ((current >> FRACTION_BITS) as u16).wrapping_add(1);
            let next = ((generation as u64) << FRACTION_BITS) | fixed;
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return generation,
                Err(actual) => current = actual,
            }
        }
    }
}

fn to_fixed(fraction: f64) -> u64 {
    if fraction.is_nan() || fraction <= 0.0 {
        0
    } else if fraction >= 1.0 {
        ONE
    } else {
        (fraction * ONE as f64).round() as u64
    }
}

/// Fixed-point value of `index / sample_count`, clamped to 1.0
fn quantize(index: u64, sample_count: u64) -> u64 {
    if sample_count == 0 || index >= sample_count {
        return ONE;
    }
    let n = sample_count as u128;
    ((index as u128 * ONE as u128 + n / 2) / n) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_starts_at_zero() {
        let counter = ProgressCounter::new();
        assert_eq!(counter.fraction(), 0.0);
        assert_eq!(counter.sample_index(10), 0);
        assert_eq!(counter.load().generation(), 0);
    }

    #[test]
    fn test_advance_saturates() {
        let counter = ProgressCounter::new();
        counter.advance(0.25);
        counter.advance(0.25);
        assert!((counter.fraction() - 0.5).abs() < 1e-12);

        counter.advance(2.0);
        assert_eq!(counter.fraction(), 1.0);
        assert_eq!(counter.sample_index(7), 7);
    }

    #[test]
    fn test_advance_from_walks_every_sample() {
        let counter = ProgressCounter::new();
        let n = 3;
        for expected in 0..n {
            let snapshot = counter.load();
            assert_eq!(snapshot.sample_index(n), expected);
            assert!(counter.advance_from(snapshot, n));
        }
        assert_eq!(counter.sample_index(n), n);
        assert_eq!(counter.fraction(), 1.0);
    }

    #[test]
    fn test_stale_advance_loses_to_seek() {
        let counter = ProgressCounter::new();
        let stale = counter.load();

        let generation = counter.reset_to_sample(5, 10);
        assert_eq!(generation, 1);

        assert!(!counter.advance_from(stale, 10));
        assert_eq!(counter.sample_index(10), 5);
    }

    #[test]
    fn test_seek_to_same_position_still_invalidates() {
        let counter = ProgressCounter::new();
        let before = counter.load();
        counter.reset(0.0);
        assert_ne!(counter.load(), before);
        assert!(!counter.wrap(before));
    }

    #[test]
    fn test_wrap_keeps_generation() {
        let counter = ProgressCounter::new();
        counter.reset(1.0);
        let snapshot = counter.load();
        assert!(counter.wrap(snapshot));
        assert_eq!(counter.sample_index(4), 0);
        assert_eq!(counter.load().generation(), snapshot.generation());
    }

    #[test]
    fn test_generation_wraps_around() {
        let counter = ProgressCounter::new();
        for _ in 0..=u16::MAX as u32 {
            counter.reset(0.5);
        }
        assert_eq!(counter.load().generation(), 0);
        assert!((counter.fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_reset_clamps_input() {
        let counter = ProgressCounter::new();
        counter.reset(-3.0);
        assert_eq!(counter.fraction(), 0.0);
        counter.reset(f64::NAN);
        assert_eq!(counter.fraction(), 0.0);
        counter.reset(4.0);
        assert_eq!(counter.fraction(), 1.0);
    }

    proptest! {
        #[test]
        fn prop_no_drift_over_long_tracks(n in 1u64..200_000, steps in 0u64..2_000) {
            let counter = ProgressCounter::new();
            let steps = steps.min(n);
            for _ in 0..steps {
                let snapshot = counter.load();
                prop_assert!(counter.advance_from(snapshot, n));
            }
            prop_assert_eq!(counter.sample_index(n), steps);
        }

        #[test]
        fn prop_sample_reset_roundtrips(n in 1u64..1_000_000, k in 0u64..1_000_000) {
            let k = k % n;
            let counter = ProgressCounter::new();
            counter.reset_to_sample(k, n);
            prop_assert_eq!(counter.sample_index(n), k);
        }
    }
}
