//! Experiment runner for rectangle-selection approximation experiments.
//!
//! Orchestrates the run lifecycle:
//! 1. Pick the rectangle count for each trial from the schedule
//! 2. Generate one instance per trial
//! 3. Run the baseline and every candidate on the identical instance text
//! 4. Evaluate ratios, append the log row, update summaries and worst cases
//! 5. Write worst-case artifacts and the optional JSON report

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::future::join_all;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use solver_harness::{validate_lineup, InvocationResult, SolverInvoker, SolverSpec};

use crate::artifact::Instance;
use crate::generator::{InstanceGenerator, SizeBand};
use crate::results::{worst_case_path, Recorder, RunReport, SolverRun, TrialRecord};

/// How the rectangle count evolves across trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Deterministic ramp from min to max over the run
    #[default]
    Linear,
    /// Independent uniform draw in `[min, max]` per trial
    Uniform,
}

impl Schedule {
    pub fn all() -> Vec<Self> {
        vec![Self::Linear, Self::Uniform]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Uniform => "uniform",
        }
    }

    /// Rectangle count for the 0-based trial `index` of `trials`.
    ///
    /// The linear ramp consumes no randomness.
    pub fn rectangle_count<R: Rng>(
        &self,
        index: usize,
        trials: usize,
        min: usize,
        max: usize,
        rng: &mut R,
    ) -> usize {
        match self {
            Self::Linear if trials > 1 => min + (max - min) * index / (trials - 1),
            Self::Linear => min,
            Self::Uniform => rng.random_range(min..=max),
        }
    }
}

impl FromStr for Schedule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" | "ramp" => Ok(Self::Linear),
            "uniform" | "random" => Ok(Self::Uniform),
            _ => bail!("Unknown schedule: {}. Valid: linear, uniform", s),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named starting configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Exact ILP against the guillotine-cut DP, small rectangles
    Guillotine,
    /// Exact ILP against local search, larger and denser rectangles
    LocalSearch,
}

impl Preset {
    pub fn all() -> Vec<Self> {
        vec![Self::Guillotine, Self::LocalSearch]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Guillotine => "guillotine",
            Self::LocalSearch => "local-search",
        }
    }

    /// The full configuration for this preset.
    pub fn config(self) -> ExperimentRunnerConfig {
        match self {
            Self::Guillotine => ExperimentRunnerConfig {
                trials: 100,
                min_rectangles: 20,
                max_rectangles: 70,
                grid_multiplier: 10,
                schedule: Schedule::Linear,
                size_band: SizeBand::SMALL,
                baseline: SolverSpec::new("ilp", default_executable("ilp"), 30.0),
                candidates: vec![SolverSpec::new(
                    "guillotine",
                    default_executable("guillotine"),
                    60.0,
                )],
                run_log: PathBuf::from("experiment_results.csv"),
                worst_case: PathBuf::from("worst_case.txt"),
                report: None,
                seed: Some(0),
                parallel_solvers: false,
            },
            Self::LocalSearch => ExperimentRunnerConfig {
                trials: 50,
                min_rectangles: 40,
                max_rectangles: 100,
                grid_multiplier: 2,
                schedule: Schedule::Uniform,
                size_band: SizeBand::MEDIUM,
                baseline: SolverSpec::new("ilp", default_executable("ilp"), 60.0),
                candidates: vec![SolverSpec::new(
                    "localsearch",
                    default_executable("localsearch"),
                    10.0,
                )],
                run_log: PathBuf::from("results_local_vs_ilp.csv"),
                worst_case: PathBuf::from("worst_case_local.txt"),
                report: None,
                seed: None,
                parallel_solvers: false,
            },
        }
    }
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guillotine" | "guill" => Ok(Self::Guillotine),
            "local-search" | "local_search" | "local" | "localsearch" => Ok(Self::LocalSearch),
            _ => bail!("Unknown preset: {}. Valid: guillotine, local-search", s),
        }
    }
}

/// Solver binaries are expected next to the working directory.
fn default_executable(name: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(format!("{}.exe", name))
    } else {
        PathBuf::from(format!("./{}", name))
    }
}

/// Configuration for the experiment runner. Built once, never mutated by the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRunnerConfig {
    /// Number of trials
    pub trials: usize,
    /// Smallest rectangle count
    pub min_rectangles: usize,
    /// Largest rectangle count
    pub max_rectangles: usize,
    /// grid_size = n * grid_multiplier
    pub grid_multiplier: u32,
    /// Rectangle-count schedule
    #[serde(default)]
    pub schedule: Schedule,
    /// Rectangle dimension band
    #[serde(default)]
    pub size_band: SizeBand,
    /// Exact solver every candidate is compared against
    pub baseline: SolverSpec,
    /// Approximate solvers, each compared independently
    pub candidates: Vec<SolverSpec>,
    /// CSV log, one row per trial
    pub run_log: PathBuf,
    /// Worst-case instance artifact
    pub worst_case: PathBuf,
    /// Optional JSON report with the final summary
    #[serde(default)]
    pub report: Option<PathBuf>,
    /// Fixed seed; None draws a fresh one (logged for reproduction)
    #[serde(default)]
    pub seed: Option<u64>,
    /// Run all solvers of a trial concurrently
    #[serde(default)]
    pub parallel_solvers: bool,
}

impl Default for ExperimentRunnerConfig {
    fn default() -> Self {
        Preset::Guillotine.config()
    }
}

impl ExperimentRunnerConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            bail!("trials must be at least 1");
        }
        if self.min_rectangles == 0 {
            bail!("min_rectangles must be at least 1");
        }
        if self.min_rectangles > self.max_rectangles {
            bail!(
                "min_rectangles ({}) must not exceed max_rectangles ({})",
                self.min_rectangles,
                self.max_rectangles
            );
        }
        if self.grid_multiplier == 0 {
            bail!("grid_multiplier must be at least 1");
        }
        u32::try_from(self.max_rectangles)
            .ok()
            .and_then(|n| n.checked_mul(self.grid_multiplier))
            .with_context(|| {
                format!(
                    "Grid size {} x {} overflows",
                    self.max_rectangles, self.grid_multiplier
                )
            })?;
        self.size_band.validate()?;
        validate_lineup(&self.baseline, &self.candidates)?;

        let outputs = self.output_files();
        for (i, (name, path)) in outputs.iter().enumerate() {
            if let Some((other, _)) = outputs[..i].iter().find(|(_, p)| p == path) {
                bail!("{} and {} would both write to {}", other, name, path.display());
            }
        }
        Ok(())
    }

    /// Every file a run writes, with a name for error messages.
    pub fn output_files(&self) -> Vec<(String, PathBuf)> {
        let multiple = self.candidates.len() > 1;
        let mut files = vec![("run_log".to_string(), self.run_log.clone())];
        if let Some(report) = &self.report {
            files.push(("report".to_string(), report.clone()));
        }
        files.extend(self.candidates.iter().map(|c| {
            (
                format!("worst case for {}", c.label),
                worst_case_path(&self.worst_case, &c.label, multiple),
            )
        }));
        files
    }

    /// Grid side length for `n` rectangles. Saturates; `validate` rules out overflow.
    pub fn grid_size(&self, n: usize) -> u32 {
        u32::try_from(n)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.grid_multiplier)
    }

    /// Candidate labels in configuration order.
    pub fn candidate_labels(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.label.as_str()).collect()
    }
}

/// Run the baseline and every candidate on the same input.
///
/// Returns the baseline result and the candidate results in configuration
/// order. With `parallel` all solvers run concurrently and are joined here.
pub async fn invoke_lineup(
    invoker: &SolverInvoker,
    baseline: &SolverSpec,
    candidates: &[SolverSpec],
    input: &str,
    parallel: bool,
) -> (InvocationResult, Vec<InvocationResult>) {
    if parallel {
        return futures::join!(
            invoker.invoke(baseline, input),
            join_all(candidates.iter().map(|spec| invoker.invoke(spec, input)))
        );
    }

    let baseline_result = invoker.invoke(baseline, input).await;
    let mut candidate_results = Vec::with_capacity(candidates.len());
    for spec in candidates {
        candidate_results.push(invoker.invoke(spec, input).await);
    }
    (baseline_result, candidate_results)
}

/// The experiment runner.
pub struct ExperimentRunner {
    config: ExperimentRunnerConfig,
    invoker: SolverInvoker,
    generator: InstanceGenerator,
}

impl ExperimentRunner {
    /// Create a new experiment runner.
    pub fn new(config: ExperimentRunnerConfig) -> Self {
        let generator = InstanceGenerator::new(config.size_band);
        Self {
            config,
            invoker: SolverInvoker::new(),
            generator,
        }
    }

    /// Replace the solver invoker (e.g. a shorter drain grace).
    pub fn with_invoker(mut self, invoker: SolverInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Run every trial, calling `on_trial` after each row is durably logged.
    ///
    /// Solver failures never abort the run; failing to write the log, a
    /// worst-case artifact or the report does.
    pub async fn run<F>(&self, mut on_trial: F) -> Result<RunReport>
    where
        F: FnMut(&TrialRecord, &Recorder),
    {
        let config = &self.config;
        config.validate()?;

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            run_id = %run_id,
            trials = config.trials,
            min_rectangles = config.min_rectangles,
            max_rectangles = config.max_rectangles,
            grid_multiplier = config.grid_multiplier,
            schedule = config.schedule.name(),
            seed = seed,
            baseline = %config.baseline.label,
            candidates = ?config.candidate_labels(),
            "Starting experiment"
        );

        let mut recorder = Recorder::create(config)?;

        for index in 0..config.trials {
            let trial = index + 1;
            let n = config.schedule.rectangle_count(
                index,
                config.trials,
                config.min_rectangles,
                config.max_rectangles,
                &mut rng,
            );
            let instance = self.generator.generate(&mut rng, n, config.grid_size(n));

            let record = self.run_trial(trial, &instance).await;
            recorder.record(&record)?;
            on_trial(&record, &recorder);

            info!(
                progress = format!("{}/{}", trial, config.trials),
                n = n,
                baseline_status = %record.baseline.result.status,
                candidate_statuses = ?record
                    .candidates
                    .iter()
                    .map(|c| c.result.status.name())
                    .collect::<Vec<_>>(),
                "Completed trial"
            );
            debug!(trial = trial, overlaps = instance.overlap_count(), "Instance overlap");
        }

        let outcome = recorder.finish()?;
        let report = RunReport::new(run_id, started_at, Utc::now(), seed, config.clone(), outcome);

        if let Some(path) = &config.report {
            report.save(path)?;
            info!(path = %path.display(), "Report written");
        }

        info!(
            run_id = %run_id,
            trials = report.trials,
            "Experiment complete"
        );
        Ok(report)
    }

    /// Run all configured solvers on one instance and evaluate the results.
    pub async fn run_trial(&self, trial: usize, instance: &Instance) -> TrialRecord {
        let text = instance.to_protocol_text();
        let (baseline, candidates) = invoke_lineup(
            &self.invoker,
            &self.config.baseline,
            &self.config.candidates,
            &text,
            self.config.parallel_solvers,
        )
        .await;

        let baseline = SolverRun {
            label: self.config.baseline.label.clone(),
            result: baseline,
        };
        let candidates = self
            .config
            .candidates
            .iter()
            .zip(candidates)
            .map(|(spec, result)| SolverRun {
                label: spec.label.clone(),
                result,
            })
            .collect();

        TrialRecord::assemble(trial, instance.n(), instance.grid_size(), text, baseline, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ExperimentRunnerConfig {
        ExperimentRunnerConfig {
            trials: 5,
            min_rectangles: 3,
            max_rectangles: 6,
            grid_multiplier: 4,
            schedule: Schedule::Linear,
            size_band: SizeBand::MEDIUM,
            baseline: SolverSpec::new("exact", "exact", 5.0),
            candidates: vec![SolverSpec::new("approx", "approx", 5.0)],
            run_log: PathBuf::from("log.csv"),
            worst_case: PathBuf::from("worst.txt"),
            report: None,
            seed: Some(1),
            parallel_solvers: false,
        }
    }

    #[test]
    fn test_linear_schedule_endpoints() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let counts: Vec<usize> = (0..5)
            .map(|i| Schedule::Linear.rectangle_count(i, 5, 20, 70, &mut rng))
            .collect();
        assert_eq!(counts, vec![20, 32, 45, 57, 70]);
    }

    #[test]
    fn test_linear_schedule_single_trial() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(Schedule::Linear.rectangle_count(0, 1, 20, 70, &mut rng), 20);
    }

    #[test]
    fn test_uniform_schedule_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for i in 0..200 {
            let n = Schedule::Uniform.rectangle_count(i, 200, 40, 100, &mut rng);
            assert!((40..=100).contains(&n));
        }
    }

    #[test]
    fn test_schedule_parsing() {
        assert_eq!("linear".parse::<Schedule>().unwrap(), Schedule::Linear);
        assert_eq!("RANDOM".parse::<Schedule>().unwrap(), Schedule::Uniform);
        assert!("zigzag".parse::<Schedule>().is_err());
        for schedule in Schedule::all() {
            assert_eq!(schedule.name().parse::<Schedule>().unwrap(), schedule);
        }
    }

    #[test]
    fn test_presets() {
        let guillotine = Preset::Guillotine.config();
        assert_eq!(guillotine.trials, 100);
        assert_eq!(guillotine.grid_multiplier, 10);
        assert_eq!(guillotine.schedule, Schedule::Linear);
        assert_eq!(guillotine.seed, Some(0));
        assert!(guillotine.validate().is_ok());

        let local = Preset::LocalSearch.config();
        assert_eq!((local.min_rectangles, local.max_rectangles), (40, 100));
        assert_eq!(local.schedule, Schedule::Uniform);
        assert_eq!(local.candidates[0].label, "localsearch");
        assert!(local.validate().is_ok());

        for preset in Preset::all() {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let mut config = test_config();
        config.min_rectangles = 10;
        config.max_rectangles = 5;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.trials = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.grid_multiplier = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.max_rectangles = usize::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_lineup() {
        let mut config = test_config();
        config.candidates.clear();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.candidates.push(SolverSpec::new("exact", "other", 1.0));
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.worst_case = config.run_log.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_report_over_other_outputs() {
        let mut config = test_config();
        config.report = Some(config.run_log.clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("run_log and report"));

        let mut config = test_config();
        config.report = Some(config.worst_case.clone());
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.report = Some(PathBuf::from("report.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_per_candidate_worst_case_collisions() {
        let mut config = test_config();
        config.candidates = vec![
            SolverSpec::new("a", "a", 5.0),
            SolverSpec::new("b", "b", 5.0),
        ];
        assert!(config.validate().is_ok());

        let mut clash = config.clone();
        clash.run_log = PathBuf::from("worst-a.txt");
        assert!(clash.validate().is_err());

        let mut clash = config.clone();
        clash.report = Some(PathBuf::from("worst-b.txt"));
        let err = clash.validate().unwrap_err();
        assert!(err.to_string().contains("worst case for b"));

        // With several candidates the base path itself is never written.
        let mut shared = config;
        shared.report = Some(PathBuf::from("worst.txt"));
        assert!(shared.validate().is_ok());
    }

    #[test]
    fn test_grid_size() {
        let config = test_config();
        assert_eq!(config.grid_size(5), 20);
    }

    #[test]
    fn test_config_json_roundtrip_with_defaults() {
        let json = r#"{
            "trials": 3,
            "min_rectangles": 2,
            "max_rectangles": 4,
            "grid_multiplier": 5,
            "baseline": {"label": "ilp", "program": "./ilp", "timeout_secs": 30},
            "candidates": [{"label": "g", "program": "./g", "args": ["--fast"]}],
            "run_log": "out.csv",
            "worst_case": "worst.txt"
        }"#;
        let config: ExperimentRunnerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.schedule, Schedule::Linear);
        assert_eq!(config.size_band, SizeBand::SMALL);
        assert_eq!(config.seed, None);
        assert!(!config.parallel_solvers);
        assert_eq!(config.candidates[0].args, vec!["--fast".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_invoke_lineup_reports_missing_programs() {
        let baseline = SolverSpec::new("exact", "/nonexistent/exact", 1.0);
        let candidates = vec![
            SolverSpec::new("a", "/nonexistent/a", 1.0),
            SolverSpec::new("b", "/nonexistent/b", 1.0),
        ];
        for parallel in [false, true] {
            let (base, cands) = invoke_lineup(
                &SolverInvoker::new(),
                &baseline,
                &candidates,
                "1\n0 0 1 1\n",
                parallel,
            )
            .await;
            assert_eq!(base.status, solver_harness::InvocationStatus::ExecNotFound);
            assert_eq!(cands.len(), 2);
            assert!(cands.iter().all(|r| r.score.is_none()));
        }
    }
}
