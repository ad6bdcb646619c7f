//! Rectangle-selection instances and their text protocol.
//!
//! Protocol (what solvers read on stdin):
//!
//! ```text
//! n
//! x1 y1 x2 y2
//! ...            (exactly n rectangle lines)
//! ```

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle on an integer grid, `(x1, y1)` to `(x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rectangle {
    /// Create a rectangle, rejecting zero or negative extents.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            bail!("Degenerate rectangle ({} {} {} {}): need x1 < x2 and y1 < y2", x1, y1, x2, y2);
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Whether the rectangle lies inside `[0, grid_size] x [0, grid_size]`.
    pub fn fits_within(&self, grid_size: u32) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2 && self.x2 <= grid_size && self.y2 <= grid_size
    }

    /// Interior overlap. Shared edges or corners do not count.
    pub fn overlaps(&self, other: &Rectangle) -> bool {
        self.x1.max(other.x1) < self.x2.min(other.x2)
            && self.y1.max(other.y1) < self.y2.min(other.y2)
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x1, self.y1, self.x2, self.y2)
    }
}

impl FromStr for Rectangle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 4 {
            bail!("Rectangle line has {} values, expected 4: '{}'", parts.len(), s.trim());
        }

        let mut coords = [0u32; 4];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .with_context(|| format!("Invalid coordinate '{}' in '{}'", part, s.trim()))?;
        }

        Rectangle::new(coords[0], coords[1], coords[2], coords[3])
    }
}

/// One problem instance: an ordered rectangle set on a square grid.
///
/// Rectangles may overlap each other. Order is preserved end to end so a
/// captured instance replays exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    grid_size: u32,
    rectangles: Vec<Rectangle>,
}

impl Instance {
    /// Build an instance, checking every rectangle fits the grid.
    pub fn new(grid_size: u32, rectangles: Vec<Rectangle>) -> Result<Self> {
        if grid_size == 0 {
            bail!("Grid size must be at least 1");
        }
        if let Some((i, rect)) = rectangles
            .iter()
            .enumerate()
            .find(|(_, r)| !r.fits_within(grid_size))
        {
            bail!("Rectangle {} ({}) does not fit a {}x{} grid", i, rect, grid_size, grid_size);
        }
        Ok(Self {
            grid_size,
            rectangles,
        })
    }

    /// Wrap rectangles that are in bounds by construction.
    pub(crate) fn from_generated(grid_size: u32, rectangles: Vec<Rectangle>) -> Self {
        debug_assert!(rectangles.iter().all(|r| r.fits_within(grid_size)));
        Self {
            grid_size,
            rectangles,
        }
    }

    /// Number of rectangles.
    pub fn n(&self) -> usize {
        self.rectangles.len()
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn rectangles(&self) -> &[Rectangle] {
        &self.rectangles
    }

    /// Count of overlapping rectangle pairs.
    pub fn overlap_count(&self) -> usize {
        self.rectangles
            .iter()
            .enumerate()
            .map(|(i, a)| self.rectangles[i + 1..].iter().filter(|b| a.overlaps(b)).count())
            .sum()
    }

    /// Serialize to the solver input protocol.
    pub fn to_protocol_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.rectangles.len())?;
        for rect in &self.rectangles {
            writeln!(f, "{}", rect)?;
        }
        Ok(())
    }
}

/// Parse the solver input protocol.
///
/// Blank lines are ignored. The protocol carries no grid size, so the parsed
/// instance uses the smallest grid containing every rectangle.
impl FromStr for Instance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().map(str::trim).filter(|line| !line.is_empty());

        let header = lines.next().context("Instance is empty: missing rectangle count")?;
        let n: usize = header
            .parse()
            .with_context(|| format!("First line must be the rectangle count, got '{}'", header))?;

        let rectangles = lines
            .map(|line| line.parse::<Rectangle>())
            .collect::<Result<Vec<_>>>()?;
        if rectangles.len() != n {
            bail!("Instance declares {} rectangles but lists {}", n, rectangles.len());
        }

        let grid_size = rectangles
            .iter()
            .map(|r| r.x2.max(r.y2))
            .max()
            .unwrap_or(1);
        Instance::new(grid_size, rectangles)
    }
}
