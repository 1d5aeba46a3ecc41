//! Seeded random number generation for deterministic simulation runs.
//!
//! The whole simulation draws from a single [`SeededRng`] whose state is one
//! `u64` stored on the world between ticks. Equal seeds therefore produce
//! equal tick histories, and a run can be resumed from any committed world
//! by reloading that integer.
//!
//! The generator is splitmix64, which passes the statistical bar for a game
//! economy and keeps the state trivially serializable. It implements
//! [`rand::RngCore`] so the `rand` / `rand_distr` toolkits (shuffles,
//! ranges, log-normal production variance) can draw from it directly.

use rand::rand_core::TryRng;
use serde::{Deserialize, Serialize};

/// Deterministic generator with a single-integer serializable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    /// Creates a generator from a seed.
    pub fn new(seed: u64) -> Self {
        SeededRng { state: seed }
    }

    /// Restores a generator from a previously saved state.
    pub fn from_state(state: u64) -> Self {
        SeededRng { state }
    }

    /// Returns the raw state for persistence on the world.
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Resets the generator to a fresh seed, discarding current state.
    pub fn reset(&mut self, seed: u64) {
        self.state = seed;
    }

    /// Advances the state and returns the next 64-bit draw (splitmix64).
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Returns the next 32-bit draw.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Returns a uniform draw in `[0, 1)`.
    pub fn next_float_unit(&mut self) -> f64 {
        // 53 mantissa bits give the full double-precision unit range.
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Returns a uniform draw in `[lo, hi)`.
    pub fn next_float_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_float_unit() * (hi - lo)
    }

    /// Returns a uniform index in `[0, len)`. Panics if `len` is zero.
    pub fn next_index(&mut self, len: usize) -> usize {
        assert!(len > 0, "next_index called with empty range");
        (self.next_u64() % len as u64) as usize
    }
}

impl TryRng for SeededRng {
    type Error = core::convert::Infallible;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        Ok(SeededRng::next_u32(self))
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        Ok(SeededRng::next_u64(self))
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Self::Error> {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&SeededRng::next_u64(self).to_le_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let bytes = SeededRng::next_u64(self).to_le_bytes();
            rem.copy_from_slice(&bytes[..rem.len()]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = SeededRng::new(1);
        let mut b = SeededRng::new(2);
        let draws_a: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn test_state_round_trip() {
        let mut a = SeededRng::new(7);
        a.next_u64();
        a.next_u64();
        let mut b = SeededRng::from_state(a.state());
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_float_unit_in_range() {
        let mut rng = SeededRng::new(99);
        for _ in 0..10_000 {
            let x = rng.next_float_unit();
            assert!((0.0..1.0).contains(&x), "out of unit range: {}", x);
        }
    }

    #[test]
    fn test_reset_restores_sequence() {
        let mut rng = SeededRng::new(5);
        let first: Vec<u64> = (0..4).map(|_| rng.next_u64()).collect();
        rng.reset(5);
        let second: Vec<u64> = (0..4).map(|_| rng.next_u64()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fill_bytes_deterministic() {
        let mut a = SeededRng::new(11);
        let mut b = SeededRng::new(11);
        let mut buf_a = [0u8; 13];
        let mut buf_b = [0u8; 13];
        use rand::Rng;
        a.fill_bytes(&mut buf_a);
        b.fill_bytes(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn test_rand_core_integration() {
        use rand::RngExt;
        let mut rng = SeededRng::new(3);
        let x: f64 = rng.random_range(0.0..1.0);
        assert!((0.0..1.0).contains(&x));
    }
}
