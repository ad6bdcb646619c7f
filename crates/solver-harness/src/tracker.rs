//! Worst-case capture: keeps the single hardest instance seen in a run.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ratio::Ratio;

/// The hardest instance captured so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstCase {
    pub ratio: f64,
    /// 1-based trial index the instance came from
    pub trial: usize,
    /// Instance in the same text protocol solvers read, so it can be replayed
    pub instance_text: String,
}

/// Tracks the instance with the highest finite ratio where both solvers succeeded.
///
/// The held ratio starts at 1.0, so only strictly suboptimal results are ever
/// captured. Unbounded ratios and failed invocations never qualify.
#[derive(Debug, Clone)]
pub struct WorstCaseTracker {
    held_ratio: f64,
    worst: Option<WorstCase>,
}

impl Default for WorstCaseTracker {
    fn default() -> Self {
        Self {
            held_ratio: 1.0,
            worst: None,
        }
    }
}

impl WorstCaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a trial's outcome. Returns true when it replaced the held worst case.
    pub fn consider(
        &mut self,
        ratio: Option<Ratio>,
        both_ok: bool,
        trial: usize,
        instance_text: &str,
    ) -> bool {
        let Some(Ratio::Finite(ratio)) = ratio else {
            return false;
        };
        if !both_ok || !ratio.is_finite() || ratio <= self.held_ratio {
            return false;
        }

        info!(
            trial = trial,
            ratio = format!("{:.4}", ratio),
            previous = format!("{:.4}", self.held_ratio),
            "New worst case captured"
        );
        self.held_ratio = ratio;
        self.worst = Some(WorstCase {
            ratio,
            trial,
            instance_text: instance_text.to_string(),
        });
        true
    }

    /// The currently held ratio (1.0 until something is captured).
    pub fn held_ratio(&self) -> f64 {
        self.held_ratio
    }

    pub fn worst(&self) -> Option<&WorstCase> {
        self.worst.as_ref()
    }

    pub fn into_worst(self) -> Option<WorstCase> {
        self.worst
    }
}
