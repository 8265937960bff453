//! Random block colours. Seeded so a session (and every test) can be replayed.

use crate::board::{BlockColor, PALETTE_SIZE};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Supplies the colour of every block the grid creates.
pub trait ColorSource {
    fn next_color(&mut self) -> BlockColor;
}

/// Uniform colours from a ChaCha8 stream.
#[derive(Debug, Clone)]
pub struct SeededColors {
    rng: ChaCha8Rng,
    seed: u64,
}

impl SeededColors {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Fresh seed from the thread RNG.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl ColorSource for SeededColors {
    fn next_color(&mut self) -> BlockColor {
        BlockColor::new(self.rng.gen_range(0..PALETTE_SIZE))
    }
}
