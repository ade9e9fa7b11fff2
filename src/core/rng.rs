//! Deterministic Random Number Generator
//!
//! Xorshift128+ family generator seeded through SplitMix64.
//! Given the same seed, produces an identical sequence on all platforms,
//! which makes every deal and turn order reproducible from its seed.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic PRNG using the Xorshift128+ family.
///
/// The table owns exactly one of these. Shuffles and turn orders are drawn
/// from it in request order, so a recorded seed plus the request log
/// reproduces a whole session.
///
/// # Example
///
/// ```
/// use castle::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Seed a generator. Weak or sequential seeds are spread by SplitMix64.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // All-zero state would be a fixed point
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Uniform integer in `[0, max)`; zero when `max` is zero.
    ///
    /// Draws above the largest multiple of `max` are redrawn, so there is
    /// no modulo bias.
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        let max = u64::from(max);
        let zone = u64::MAX - (u64::MAX % max);
        loop {
            let value = self.next_u64();
            if value < zone {
                return (value % max) as u32;
            }
        }
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }
}

#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a table seed from a table id and an entropy value.
///
/// Used when no seed is configured: the table id is a fresh UUID and the
/// entropy is the wall clock at startup. Logging the resulting seed is
/// enough to replay a session.
pub fn derive_table_seed(table_id: &[u8; 16], entropy: u128) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"CASTLE_TABLE_SEED_V1");
    hasher.update(table_id);
    hasher.update(entropy.to_le_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}
