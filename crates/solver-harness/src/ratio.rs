//! Approximation ratios: baseline score over candidate score.
//!
//! The baseline is assumed exact, so a well-formed ratio is at least 1.
//! Edge cases:
//! - either score absent: no ratio
//! - equal scores (including 0 and 0): exactly 1.0
//! - candidate 0, baseline positive: [`Ratio::Unbounded`], kept out of finite statistics
//! - below `1 - RATIO_EPSILON`: baseline/candidate inconsistency, flagged

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::invoker::InvocationResult;

/// Tolerance for comparing ratios against 1.0.
pub const RATIO_EPSILON: f64 = 1e-6;

/// A defined approximation ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ratio {
    Finite(f64),
    /// Candidate selected nothing while the baseline selected something
    Unbounded,
}

impl Ratio {
    /// The numeric value, if finite.
    pub fn finite(self) -> Option<f64> {
        match self {
            Ratio::Finite(r) => Some(r),
            Ratio::Unbounded => None,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Finite(r) => write!(f, "{:.4}", r),
            Ratio::Unbounded => f.write_str("inf"),
        }
    }
}

/// Classification of one baseline/candidate comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Candidate matched the baseline
    Optimal,
    /// Candidate strictly worse than the baseline
    Suboptimal,
    /// Both solvers selected nothing
    Trivial,
    /// Candidate selected nothing, baseline selected something
    Unbounded,
    /// Candidate beat the supposedly exact baseline
    Inconsistent,
    /// At least one solver failed
    Undefined,
}

impl Verdict {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Suboptimal => "suboptimal",
            Self::Trivial => "trivial",
            Self::Unbounded => "unbounded",
            Self::Inconsistent => "inconsistent",
            Self::Undefined => "undefined",
        }
    }

    /// Whether the candidate is strictly worse than the baseline.
    pub fn is_suboptimal(&self) -> bool {
        matches!(self, Self::Suboptimal | Self::Unbounded)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A ratio together with its verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub ratio: Option<Ratio>,
    pub verdict: Verdict,
}

impl Evaluation {
    /// The ratio when it is finite.
    pub fn finite_ratio(&self) -> Option<f64> {
        self.ratio.and_then(Ratio::finite)
    }
}

/// Ratio of two optional scores.
pub fn ratio_from_scores(baseline: Option<u64>, candidate: Option<u64>) -> Option<Ratio> {
    let (baseline, candidate) = (baseline?, candidate?);
    if baseline == candidate {
        Some(Ratio::Finite(1.0))
    } else if candidate == 0 {
        Some(Ratio::Unbounded)
    } else {
        Some(Ratio::Finite(baseline as f64 / candidate as f64))
    }
}

/// Ratio of two invocation results. Absent whenever either invocation failed.
pub fn evaluate(baseline: &InvocationResult, candidate: &InvocationResult) -> Option<Ratio> {
    ratio_from_scores(baseline.score, candidate.score)
}

/// Ratio plus verdict for two optional scores.
pub fn assess_scores(baseline: Option<u64>, candidate: Option<u64>) -> Evaluation {
    let ratio = ratio_from_scores(baseline, candidate);
    let verdict = match ratio {
        None => Verdict::Undefined,
        Some(Ratio::Unbounded) => Verdict::Unbounded,
        Some(Ratio::Finite(_)) if baseline == Some(0) && candidate == Some(0) => Verdict::Trivial,
        Some(Ratio::Finite(r)) if r < 1.0 - RATIO_EPSILON => Verdict::Inconsistent,
        Some(Ratio::Finite(r)) if r > 1.0 + RATIO_EPSILON => Verdict::Suboptimal,
        Some(Ratio::Finite(_)) => Verdict::Optimal,
    };
    Evaluation { ratio, verdict }
}

/// Ratio plus verdict for two invocation results.
pub fn assess(baseline: &InvocationResult, candidate: &InvocationResult) -> Evaluation {
    assess_scores(baseline.score, candidate.score)
}
