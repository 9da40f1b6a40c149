//! Random session ID generation.

use std::fmt;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Characters session IDs are drawn from.
pub const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates fixed-length random IDs from its own random source.
pub struct IdGenerator {
    length: usize,
    rng: Mutex<StdRng>,
}

impl IdGenerator {
    /// Create a generator seeded from the operating system.
    pub fn new(length: usize) -> Self {
        Self {
            length,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a generator with a fixed seed, producing a repeatable sequence.
    pub fn with_seed(length: usize, seed: u64) -> Self {
        Self {
            length,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Length of the generated IDs.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Produce the next ID.
    pub fn generate(&self) -> String {
        let mut rng = self.rng.lock();
        (0..self.length)
            .map(|_| char::from(ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())]))
            .collect()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
