//! Random instance generator.
//!
//! Rectangles are placed independently and uniformly; overlaps are expected
//! and are exactly what the selection problem has to resolve. Rectangle size
//! relative to the grid is controlled by a [`SizeBand`].

use std::cmp::max;

use anyhow::{bail, Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::artifact::{Instance, Rectangle};

/// Width/height band as divisors of the grid size.
///
/// Dimensions are drawn from `[max(1, grid / min_divisor), max(1, grid / max_divisor)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBand {
    /// Divisor giving the smallest dimension (larger divisor, smaller rectangles)
    pub min_divisor: u32,
    /// Divisor giving the largest dimension
    pub max_divisor: u32,
}

impl SizeBand {
    /// Small rectangles, 5-10% of the grid. Tends to favor guillotine separability.
    pub const SMALL: SizeBand = SizeBand {
        min_divisor: 20,
        max_divisor: 10,
    };

    /// Medium rectangles, 10-33% of the grid. Dense overlaps.
    pub const MEDIUM: SizeBand = SizeBand {
        min_divisor: 10,
        max_divisor: 3,
    };

    pub fn validate(&self) -> Result<()> {
        if self.min_divisor == 0 || self.max_divisor == 0 {
            bail!("Size band divisors must be at least 1, got {:?}", self);
        }
        if self.min_divisor < self.max_divisor {
            bail!(
                "Size band min_divisor ({}) must be >= max_divisor ({})",
                self.min_divisor,
                self.max_divisor
            );
        }
        Ok(())
    }

    /// Inclusive `(min, max)` dimension for a grid, clamped to `[1, grid_size]`.
    pub fn dimensions(&self, grid_size: u32) -> (u32, u32) {
        let grid_size = max(grid_size, 1);
        let lo = max(1, grid_size / self.min_divisor.max(1)).min(grid_size);
        let hi = max(1, grid_size / self.max_divisor.max(1)).min(grid_size);
        (lo.min(hi), hi.max(lo))
    }
}

impl Default for SizeBand {
    fn default() -> Self {
        Self::SMALL
    }
}

/// Generates random rectangle sets.
#[derive(Debug, Clone, Default)]
pub struct InstanceGenerator {
    size_band: SizeBand,
}

impl InstanceGenerator {
    pub fn new(size_band: SizeBand) -> Self {
        Self { size_band }
    }

    /// Generate `n` rectangles on a `grid_size` grid using `rng`.
    ///
    /// Zero arguments are clamped to 1 rather than rejected.
    pub fn generate<R: Rng>(&self, rng: &mut R, n: usize, grid_size: u32) -> Instance {
        let n = max(n, 1);
        let grid_size = max(grid_size, 1);
        let (min_dim, max_dim) = self.size_band.dimensions(grid_size);

        let rectangles = (0..n)
            .map(|_| {
                let w = rng.random_range(min_dim..=max_dim);
                let h = rng.random_range(min_dim..=max_dim);
                let x1 = rng.random_range(0..=grid_size.saturating_sub(w));
                let y1 = rng.random_range(0..=grid_size.saturating_sub(h));
                Rectangle {
                    x1,
                    y1,
                    x2: x1 + w,
                    y2: y1 + h,
                }
            })
            .collect();

        Instance::from_generated(grid_size, rectangles)
    }

    /// Generate one instance from a fixed seed.
    pub fn generate_seeded(&self, seed: u64, n: usize, grid_size: u32) -> Instance {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.generate(&mut rng, n, grid_size)
    }

    /// Seeded instance of `n` rectangles on an `n * grid_multiplier` grid.
    ///
    /// Unlike [`InstanceGenerator::generate`], zero arguments are rejected.
    pub fn generate_for_count(
        &self,
        seed: u64,
        n: usize,
        grid_multiplier: u32,
    ) -> Result<Instance> {
        if n == 0 {
            bail!("Rectangle count must be at least 1");
        }
        if grid_multiplier == 0 {
            bail!("grid_multiplier must be at least 1");
        }
        let grid_size = u32::try_from(n)
            .ok()
            .and_then(|n| n.checked_mul(grid_multiplier))
            .with_context(|| format!("Grid size {} x {} overflows", n, grid_multiplier))?;
        Ok(self.generate_seeded(seed, n, grid_size))
    }
}
