//! Running aggregates over a run: finite-ratio statistics per candidate and
//! failure counts per solver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::invoker::InvocationStatus;
use crate::ratio::{Evaluation, Verdict};

/// Aggregates for one candidate, updated once per trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningSummary {
    /// Candidate label
    pub label: String,
    /// Trials recorded so far
    pub trials: usize,
    /// Trials with a finite ratio (included in mean/min/max)
    pub finite_count: usize,
    /// Sum of finite ratios
    pub ratio_sum: f64,
    pub min_ratio: Option<f64>,
    pub max_ratio: Option<f64>,
    /// Strictly suboptimal trials, unbounded ones included
    pub suboptimal: usize,
    /// Candidate 0 while baseline positive
    pub unbounded: usize,
    /// Ratio below 1 beyond tolerance
    pub inconsistent: usize,
    /// Both solvers selected nothing (counted as ratio 1.0)
    pub trivial_ties: usize,
    /// At least one solver failed
    pub undefined: usize,
}

impl RunningSummary {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            trials: 0,
            finite_count: 0,
            ratio_sum: 0.0,
            min_ratio: None,
            max_ratio: None,
            suboptimal: 0,
            unbounded: 0,
            inconsistent: 0,
            trivial_ties: 0,
            undefined: 0,
        }
    }

    /// Fold one trial's evaluation into the summary.
    pub fn record(&mut self, evaluation: &Evaluation) {
        self.trials += 1;

        if let Some(ratio) = evaluation.finite_ratio() {
            self.finite_count += 1;
            self.ratio_sum += ratio;
            self.min_ratio = Some(self.min_ratio.map_or(ratio, |m| m.min(ratio)));
            self.max_ratio = Some(self.max_ratio.map_or(ratio, |m| m.max(ratio)));
        }

        match evaluation.verdict {
            Verdict::Optimal => {}
            Verdict::Suboptimal => self.suboptimal += 1,
            Verdict::Unbounded => {
                self.unbounded += 1;
                self.suboptimal += 1;
            }
            Verdict::Inconsistent => self.inconsistent += 1,
            Verdict::Trivial => self.trivial_ties += 1,
            Verdict::Undefined => self.undefined += 1,
        }
    }

    /// Mean of the finite ratios, if any.
    pub fn mean_ratio(&self) -> Option<f64> {
        (self.finite_count > 0).then(|| self.ratio_sum / self.finite_count as f64)
    }
}

/// Failure counts keyed by solver label, then by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    pub by_solver: BTreeMap<String, BTreeMap<InvocationStatus, usize>>,
}

impl FailureCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `status` for `label`. Successful invocations are ignored.
    pub fn record(&mut self, label: &str, status: InvocationStatus) {
        if !status.is_failure() {
            return;
        }
        *self
            .by_solver
            .entry(label.to_string())
            .or_default()
            .entry(status)
            .or_insert(0) += 1;
    }

    /// Failures of `status` across all solvers.
    pub fn total(&self, status: InvocationStatus) -> usize {
        self.by_solver
            .values()
            .filter_map(|counts| counts.get(&status))
            .sum()
    }

    /// Failures of any status for one solver.
    pub fn for_solver(&self, label: &str) -> usize {
        self.by_solver
            .get(label)
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.by_solver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratio::assess_scores;

    #[test]
    fn test_finite_aggregates() {
        let mut summary = RunningSummary::new("guillotine");
        for (b, c) in [(3, 3), (6, 5), (4, 2)] {
            summary.record(&assess_scores(Some(b), Some(c)));
        }

        assert_eq!(summary.trials, 3);
        assert_eq!(summary.finite_count, 3);
        assert_eq!(summary.min_ratio, Some(1.0));
        assert_eq!(summary.max_ratio, Some(2.0));
        assert!((summary.mean_ratio().unwrap() - (1.0 + 1.2 + 2.0) / 3.0).abs() < 1e-12);
        assert_eq!(summary.suboptimal, 2);
    }

    #[test]
    fn test_unbounded_excluded_from_finite_stats() {
        let mut summary = RunningSummary::new("local");
        summary.record(&assess_scores(Some(2), Some(2)));
        summary.record(&assess_scores(Some(5), Some(0)));

        assert_eq!(summary.finite_count, 1);
        assert_eq!(summary.max_ratio, Some(1.0));
        assert_eq!(summary.unbounded, 1);
        assert_eq!(summary.suboptimal, 1);
    }

    #[test]
    fn test_trivial_and_undefined_categories() {
        let mut summary = RunningSummary::new("local");
        summary.record(&assess_scores(Some(0), Some(0)));
        summary.record(&assess_scores(None, Some(4)));

        assert_eq!(summary.trivial_ties, 1);
        assert_eq!(summary.undefined, 1);
        assert_eq!(summary.finite_count, 1);
        assert_eq!(summary.mean_ratio(), Some(1.0));
    }

    #[test]
    fn test_inconsistent_ratio_stays_in_finite_stats() {
        let mut summary = RunningSummary::new("local");
        summary.record(&assess_scores(Some(4), Some(4)));
        summary.record(&assess_scores(Some(2), Some(3)));

        assert_eq!(summary.inconsistent, 1);
        assert_eq!(summary.suboptimal, 0);
        assert_eq!(summary.finite_count, 2);
        assert!((summary.min_ratio.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.max_ratio, Some(1.0));
        assert!(summary.mean_ratio().unwrap() < 1.0);
    }

    #[test]
    fn test_empty_summary_has_no_mean() {
        let summary = RunningSummary::new("x");
        assert_eq!(summary.mean_ratio(), None);
        assert_eq!(summary.min_ratio, None);
    }

    #[test]
    fn test_failure_counts() {
        let mut failures = FailureCounts::new();
        failures.record("ilp", InvocationStatus::Ok);
        assert!(failures.is_empty());

        failures.record("ilp", InvocationStatus::Timeout);
        failures.record("guillotine", InvocationStatus::Timeout);
        failures.record("guillotine", InvocationStatus::ParseError);

        assert_eq!(failures.total(InvocationStatus::Timeout), 2);
        assert_eq!(failures.total(InvocationStatus::Error), 0);
        assert_eq!(failures.for_solver("guillotine"), 2);
        assert_eq!(failures.for_solver("unknown"), 0);
    }

    #[test]
    fn test_failure_counts_serialize_with_status_keys() {
        let mut failures = FailureCounts::new();
        failures.record("ilp", InvocationStatus::ExecNotFound);
        let json = serde_json::to_string(&failures).unwrap();
        assert_eq!(json, r#"{"by_solver":{"ilp":{"exec_not_found":1}}}"#);
    }
}
