//! Configuration types for the harness.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Default wall-clock budget for a solver when none is given.
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// An external solver program taking part in a run.
///
/// Loaded from JSON at runtime or parsed from the CLI form
/// `LABEL=PROGRAM[@SECONDS]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSpec {
    /// Short name used for log columns, summaries and artifact names
    pub label: String,

    /// Executable path, or a bare name resolved through `PATH`
    pub program: PathBuf,

    /// Extra arguments passed on the command line
    #[serde(default)]
    pub args: Vec<String>,

    /// Hard wall-clock budget in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

impl SolverSpec {
    /// Create a spec with no extra arguments.
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>, timeout_secs: f64) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            timeout_secs,
        }
    }

    /// Append command-line arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The timeout as a `Duration`. Invalid budgets collapse to zero; call
    /// [`SolverSpec::validate`] first.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::ZERO)
    }

    /// Check that the label is usable as a column name and the timeout is positive.
    pub fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            bail!("Solver label must not be empty (program {})", self.program.display());
        }
        if !self
            .label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!(
                "Solver label '{}' may only contain ASCII letters, digits, '_' and '-'",
                self.label
            );
        }
        if self.program.as_os_str().is_empty() {
            bail!("Solver '{}' has an empty program path", self.label);
        }
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            bail!(
                "Solver '{}' timeout must be a positive number of seconds, got {}",
                self.label,
                self.timeout_secs
            );
        }
        Ok(())
    }
}

impl FromStr for SolverSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, rest) = s
            .split_once('=')
            .with_context(|| format!("Expected LABEL=PROGRAM[@SECONDS], got '{}'", s))?;

        // A trailing "@<number>" is the timeout; anything else stays part of the path.
        let (program, timeout_secs) = match rest.rsplit_once('@') {
            Some((program, secs)) => match secs.trim().parse::<f64>() {
                Ok(secs) => (program, secs),
                Err(_) => (rest, DEFAULT_TIMEOUT_SECS),
            },
            None => (rest, DEFAULT_TIMEOUT_SECS),
        };

        let spec = SolverSpec::new(label.trim(), program.trim(), timeout_secs);
        spec.validate()?;
        Ok(spec)
    }
}

impl fmt::Display for SolverSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}@{}", self.label, self.program.display(), self.timeout_secs)
    }
}

/// Validate a baseline plus candidates: every spec valid, at least one
/// candidate, and labels unique across the whole lineup.
pub fn validate_lineup(baseline: &SolverSpec, candidates: &[SolverSpec]) -> Result<()> {
    baseline.validate()?;
    if candidates.is_empty() {
        bail!("At least one candidate solver is required");
    }

    let mut seen = HashSet::new();
    seen.insert(baseline.label.as_str());
    for candidate in candidates {
        candidate.validate()?;
        if !seen.insert(candidate.label.as_str()) {
            bail!("Duplicate solver label '{}'", candidate.label);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_timeout() {
        let spec: SolverSpec = "ilp=./ilp@30".parse().unwrap();
        assert_eq!(spec.label, "ilp");
        assert_eq!(spec.program, PathBuf::from("./ilp"));
        assert_eq!(spec.timeout_secs, 30.0);
        assert!(spec.args.is_empty());
    }

    #[test]
    fn test_parse_without_timeout_uses_default() {
        let spec: SolverSpec = "guillotine=/opt/bin/guillotine".parse().unwrap();
        assert_eq!(spec.program, PathBuf::from("/opt/bin/guillotine"));
        assert_eq!(spec.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_parse_keeps_at_sign_in_path() {
        let spec: SolverSpec = "local=./builds@nightly/localsearch".parse().unwrap();
        assert_eq!(spec.program, PathBuf::from("./builds@nightly/localsearch"));
        assert_eq!(spec.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_parse_rejects_missing_label() {
        assert!("./ilp@30".parse::<SolverSpec>().is_err());
        assert!("=./ilp".parse::<SolverSpec>().is_err());
    }

    #[test]
    fn test_parse_rejects_bad_timeout() {
        assert!("ilp=./ilp@0".parse::<SolverSpec>().is_err());
        assert!("ilp=./ilp@-5".parse::<SolverSpec>().is_err());
    }

    #[test]
    fn test_label_charset() {
        assert!(SolverSpec::new("local search", "ls", 1.0).validate().is_err());
        assert!(SolverSpec::new("local,search", "ls", 1.0).validate().is_err());
        assert!(SolverSpec::new("local-search_2", "ls", 1.0).validate().is_ok());
    }

    #[test]
    fn test_timeout_duration() {
        let spec = SolverSpec::new("ilp", "ilp", 1.5);
        assert_eq!(spec.timeout(), Duration::from_millis(1500));

        let broken = SolverSpec::new("ilp", "ilp", f64::NAN);
        assert_eq!(broken.timeout(), Duration::ZERO);
    }

    #[test]
    fn test_lineup_requires_candidate() {
        let baseline = SolverSpec::new("ilp", "ilp", 30.0);
        assert!(validate_lineup(&baseline, &[]).is_err());
    }

    #[test]
    fn test_lineup_rejects_duplicate_labels() {
        let baseline = SolverSpec::new("ilp", "ilp", 30.0);
        let candidates = vec![
            SolverSpec::new("guillotine", "g", 60.0),
            SolverSpec::new("ilp", "other", 60.0),
        ];
        let err = validate_lineup(&baseline, &candidates).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let spec: SolverSpec =
            serde_json::from_str(r#"{"label": "ilp", "program": "./ilp"}"#).unwrap();
        assert_eq!(spec.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(spec.args.is_empty());
    }
}
