//! Results collection and output for rectangle-selection experiments.
//!
//! Three outputs per run:
//! - the CSV run log, one row per trial, flushed before the next trial starts
//! - one worst-case instance file per candidate (plain solver input text)
//! - an optional JSON report with the final summaries

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use solver_harness::{
    assess, Evaluation, FailureCounts, InvocationResult, RunningSummary, Verdict, WorstCase,
    WorstCaseTracker,
};

use crate::experiment::ExperimentRunnerConfig;

/// One solver's outcome on a trial.
#[derive(Debug, Clone)]
pub struct SolverRun {
    pub label: String,
    pub result: InvocationResult,
}

/// One candidate's outcome, evaluated against the baseline.
#[derive(Debug, Clone)]
pub struct CandidateRun {
    pub label: String,
    pub result: InvocationResult,
    pub evaluation: Evaluation,
}

impl CandidateRun {
    /// Both this candidate and the baseline completed with a score.
    pub fn both_ok(&self, baseline: &SolverRun) -> bool {
        self.result.is_ok() && baseline.result.is_ok()
    }
}

/// Everything observed in one trial.
#[derive(Debug, Clone)]
pub struct TrialRecord {
    /// 1-based trial index
    pub trial: usize,
    pub n_rectangles: usize,
    pub grid_size: u32,
    pub baseline: SolverRun,
    pub candidates: Vec<CandidateRun>,
    /// Exact text every solver received
    pub instance_text: String,
}

impl TrialRecord {
    /// Evaluate each candidate against the baseline.
    pub fn assemble(
        trial: usize,
        n_rectangles: usize,
        grid_size: u32,
        instance_text: String,
        baseline: SolverRun,
        candidates: Vec<SolverRun>,
    ) -> Self {
        let candidates = candidates
            .into_iter()
            .map(|run| CandidateRun {
                evaluation: assess(&baseline.result, &run.result),
                label: run.label,
                result: run.result,
            })
            .collect();

        Self {
            trial,
            n_rectangles,
            grid_size,
            baseline,
            candidates,
            instance_text,
        }
    }
}

/// Append-only CSV log of trials.
pub struct RunLog {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl RunLog {
    /// Create (or truncate) the log and write the header row.
    pub fn create(path: impl AsRef<Path>, baseline: &str, candidates: &[&str]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path)?;

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create run log {}", path.display()))?;
        writer
            .write_record(Self::header(baseline, candidates))
            .with_context(|| format!("Failed to write header to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush run log {}", path.display()))?;

        Ok(Self { writer, path })
    }

    /// Column names for a lineup.
    pub fn header(baseline: &str, candidates: &[&str]) -> Vec<String> {
        let mut header = vec![
            "trial".to_string(),
            "n_rectangles".to_string(),
            "grid_size".to_string(),
            format!("{}_score", baseline),
        ];
        header.extend(candidates.iter().map(|c| format!("{}_score", c)));
        header.extend(candidates.iter().map(|c| format!("{}_ratio", c)));
        header.extend(candidates.iter().map(|c| format!("{}_verdict", c)));
        header.push(format!("{}_time", baseline));
        header.extend(candidates.iter().map(|c| format!("{}_time", c)));
        header.push(format!("{}_status", baseline));
        header.extend(candidates.iter().map(|c| format!("{}_status", c)));
        header
    }

    /// Cells for one trial, in header order.
    ///
    /// Missing scores and undefined or unbounded ratios are empty cells; the
    /// verdict column says which.
    pub fn row(record: &TrialRecord) -> Vec<String> {
        let mut row = vec![
            record.trial.to_string(),
            record.n_rectangles.to_string(),
            record.grid_size.to_string(),
            score_cell(&record.baseline.result),
        ];
        row.extend(record.candidates.iter().map(|c| score_cell(&c.result)));
        row.extend(record.candidates.iter().map(|c| {
            c.evaluation
                .finite_ratio()
                .map(|r| format!("{:.6}", r))
                .unwrap_or_default()
        }));
        row.extend(
            record
                .candidates
                .iter()
                .map(|c| c.evaluation.verdict.name().to_string()),
        );
        row.push(time_cell(&record.baseline.result));
        row.extend(record.candidates.iter().map(|c| time_cell(&c.result)));
        row.push(record.baseline.result.status.name().to_string());
        row.extend(
            record
                .candidates
                .iter()
                .map(|c| c.result.status.name().to_string()),
        );
        row
    }

    /// Append one row and flush it to the file.
    pub fn append(&mut self, record: &TrialRecord) -> Result<()> {
        self.writer
            .write_record(Self::row(record))
            .with_context(|| {
                format!("Failed to write trial {} to {}", record.trial, self.path.display())
            })?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush run log {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn score_cell(result: &InvocationResult) -> String {
    result.score.map(|s| s.to_string()).unwrap_or_default()
}

fn time_cell(result: &InvocationResult) -> String {
    format!("{:.4}", result.elapsed_secs())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Artifact path for one candidate's worst case.
///
/// A single candidate writes to `base` itself; with several, each gets
/// `<stem>-<label>.<ext>` next to it.
pub fn worst_case_path(base: &Path, label: &str, multiple_candidates: bool) -> PathBuf {
    if !multiple_candidates {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "worst_case".to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, label, ext.to_string_lossy()),
        None => format!("{}-{}", stem, label),
    };
    base.with_file_name(file_name)
}

/// Write a captured instance so it can be fed straight back to a solver.
pub fn write_worst_case(path: &Path, worst: &WorstCase) -> Result<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, &worst.instance_text)
        .with_context(|| format!("Failed to write worst case to {}", path.display()))?;
    Ok(())
}

/// Worst case as it appears in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstCaseReport {
    pub ratio: f64,
    pub trial: usize,
    /// Where the instance text was written
    pub artifact: PathBuf,
}

/// Final state for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub summary: RunningSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_case: Option<WorstCaseReport>,
}

/// What a finished recorder hands back.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub trials: usize,
    pub candidates: Vec<CandidateReport>,
    pub failures: FailureCounts,
}

struct CandidateState {
    summary: RunningSummary,
    tracker: WorstCaseTracker,
    artifact: PathBuf,
}

/// Persists trials and keeps the running aggregates.
///
/// A row reaches the log before any aggregate sees the trial.
pub struct Recorder {
    log: RunLog,
    baseline: String,
    candidates: Vec<CandidateState>,
    failures: FailureCounts,
    trials: usize,
}

impl Recorder {
    /// Open the run log for `config`'s lineup.
    pub fn create(config: &ExperimentRunnerConfig) -> Result<Self> {
        let labels = config.candidate_labels();
        let log = RunLog::create(&config.run_log, &config.baseline.label, &labels)?;
        let multiple = labels.len() > 1;

        let candidates = labels
            .iter()
            .map(|label| CandidateState {
                summary: RunningSummary::new(*label),
                tracker: WorstCaseTracker::new(),
                artifact: worst_case_path(&config.worst_case, label, multiple),
            })
            .collect();

        info!(path = %log.path().display(), "Run log created");

        Ok(Self {
            log,
            baseline: config.baseline.label.clone(),
            candidates,
            failures: FailureCounts::new(),
            trials: 0,
        })
    }

    /// Log one trial, then fold it into the aggregates.
    pub fn record(&mut self, record: &TrialRecord) -> Result<()> {
        self.log.append(record)?;
        self.trials += 1;

        self.failures
            .record(&record.baseline.label, record.baseline.result.status);

        for (state, candidate) in self.candidates.iter_mut().zip(&record.candidates) {
            self.failures
                .record(&candidate.label, candidate.result.status);

            if candidate.evaluation.verdict == Verdict::Inconsistent {
                warn!(
                    trial = record.trial,
                    baseline = %self.baseline,
                    candidate = %candidate.label,
                    baseline_score = ?record.baseline.result.score,
                    candidate_score = ?candidate.result.score,
                    "Candidate beat the exact baseline; baseline may be wrong"
                );
            }

            state.summary.record(&candidate.evaluation);
            state.tracker.consider(
                candidate.evaluation.ratio,
                candidate.both_ok(&record.baseline),
                record.trial,
                &record.instance_text,
            );
        }
        Ok(())
    }

    /// Trials recorded so far.
    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn summaries(&self) -> impl Iterator<Item = &RunningSummary> {
        self.candidates.iter().map(|c| &c.summary)
    }

    pub fn failures(&self) -> &FailureCounts {
        &self.failures
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Write worst-case artifacts and hand back the final aggregates.
    pub fn finish(self) -> Result<RunOutcome> {
        let mut candidates = Vec::with_capacity(self.candidates.len());

        for state in self.candidates {
            let worst_case = match state.tracker.into_worst() {
                Some(worst) => {
                    write_worst_case(&state.artifact, &worst)?;
                    info!(
                        candidate = %state.summary.label,
                        ratio = format!("{:.4}", worst.ratio),
                        trial = worst.trial,
                        path = %state.artifact.display(),
                        "Worst case written"
                    );
                    Some(WorstCaseReport {
                        ratio: worst.ratio,
                        trial: worst.trial,
                        artifact: state.artifact,
                    })
                }
                None => {
                    info!(candidate = %state.summary.label, "No suboptimal instance found");
                    None
                }
            };
            candidates.push(CandidateReport {
                summary: state.summary,
                worst_case,
            });
        }

        Ok(RunOutcome {
            trials: self.trials,
            candidates,
            failures: self.failures,
        })
    }
}

/// Final summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Seed actually used, whether configured or drawn
    pub seed: u64,
    pub config: ExperimentRunnerConfig,
    pub trials: usize,
    pub candidates: Vec<CandidateReport>,
    pub failures: FailureCounts,
}

impl RunReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        seed: u64,
        config: ExperimentRunnerConfig,
        outcome: RunOutcome,
    ) -> Self {
        Self {
            run_id,
            started_at,
            ended_at,
            seed,
            config,
            trials: outcome.trials,
            candidates: outcome.candidates,
            failures: outcome.failures,
        }
    }

    /// Report for one candidate.
    pub fn candidate(&self, label: &str) -> Option<&CandidateReport> {
        self.candidates.iter().find(|c| c.summary.label == label)
    }

    /// Wall-clock duration of the run.
    pub fn duration_secs(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Save the report to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}

/// Console table header for a lineup.
pub fn format_table_header(baseline: &str, candidates: &[&str]) -> String {
    let mut line = format!("{:>5} | {:>4} | {:>14}", "Trial", "N", baseline);
    for candidate in candidates {
        line.push_str(&format!(" | {:>14} | {:>8}", candidate, "ratio"));
    }
    line.push_str(" | status");
    line
}

/// Console table row for one trial.
///
/// Suboptimal ratios are marked `*`, inconsistent ones `!`.
pub fn format_table_row(record: &TrialRecord) -> String {
    let mut line = format!(
        "{:>5} | {:>4} | {:>14}",
        record.trial,
        record.n_rectangles,
        format_result(&record.baseline.result)
    );
    for candidate in &record.candidates {
        line.push_str(&format!(
            " | {:>14} | {:>8}",
            format_result(&candidate.result),
            format_ratio(&candidate.evaluation)
        ));
    }

    let failures: Vec<String> = std::iter::once((&record.baseline.label, &record.baseline.result))
        .chain(record.candidates.iter().map(|c| (&c.label, &c.result)))
        .filter(|(_, result)| !result.is_ok())
        .map(|(label, result)| format!("{}={}", label, result.status))
        .collect();
    if failures.is_empty() {
        line.push_str(" | ok");
    } else {
        line.push_str(&format!(" | {}", failures.join(",")));
    }
    line
}

fn format_result(result: &InvocationResult) -> String {
    let score = result
        .score
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{} ({:.2}s)", score, result.elapsed_secs())
}

fn format_ratio(evaluation: &Evaluation) -> String {
    let Some(ratio) = evaluation.ratio else {
        return "-".to_string();
    };
    let marker = match evaluation.verdict {
        Verdict::Suboptimal | Verdict::Unbounded => "*",
        Verdict::Inconsistent => "!",
        _ => "",
    };
    format!("{}{}", ratio, marker)
}

/// Format an optional ratio statistic for display.
pub fn format_stat(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use solver_harness::{InvocationStatus, SolverSpec};

    use super::*;

    fn run(label: &str, score: Option<u64>) -> SolverRun {
        let result = match score {
            Some(s) => InvocationResult::ok(s, Duration::from_millis(1500), ""),
            None => InvocationResult::failed(InvocationStatus::Timeout, Duration::from_secs(2), ""),
        };
        SolverRun {
            label: label.to_string(),
            result,
        }
    }

    fn record(trial: usize, baseline: Option<u64>, candidate: Option<u64>) -> TrialRecord {
        TrialRecord::assemble(
            trial,
            3,
            30,
            format!("1\n0 0 {} 1\n", trial),
            run("ilp", baseline),
            vec![run("guillotine", candidate)],
        )
    }

    fn config_in(dir: &Path, candidates: &[&str]) -> ExperimentRunnerConfig {
        let mut config = ExperimentRunnerConfig::default();
        config.baseline = SolverSpec::new("ilp", "ilp", 1.0);
        config.candidates = candidates
            .iter()
            .map(|c| SolverSpec::new(*c, *c, 1.0))
            .collect();
        config.run_log = dir.join("runs").join("log.csv");
        config.worst_case = dir.join("worst.txt");
        config
    }

    #[test]
    fn test_header_shape() {
        let header = RunLog::header("ilp", &["a", "b"]);
        assert_eq!(
            header,
            vec![
                "trial", "n_rectangles", "grid_size", "ilp_score", "a_score", "b_score",
                "a_ratio", "b_ratio", "a_verdict", "b_verdict", "ilp_time", "a_time", "b_time",
                "ilp_status", "a_status", "b_status",
            ]
        );
    }

    #[test]
    fn test_row_cells() {
        let row = RunLog::row(&record(4, Some(6), Some(5)));
        assert_eq!(
            row,
            vec![
                "4",
                "3",
                "30",
                "6",
                "5",
                "1.200000",
                "suboptimal",
                "1.5000",
                "1.5000",
                "ok",
                "ok",
            ]
        );
    }

    #[test]
    fn test_row_failed_candidate_has_empty_cells() {
        let row = RunLog::row(&record(1, Some(6), None));
        assert_eq!(row[4], "");
        assert_eq!(row[5], "");
        assert_eq!(row[6], "undefined");
        assert_eq!(row[10], "timeout");
    }

    #[test]
    fn test_row_unbounded_ratio() {
        let row = RunLog::row(&record(1, Some(2), Some(0)));
        assert_eq!(row[5], "");
        assert_eq!(row[6], "unbounded");
    }

    #[test]
    fn test_worst_case_path() {
        let base = Path::new("out/worst_case.txt");
        assert_eq!(worst_case_path(base, "g", false), PathBuf::from("out/worst_case.txt"));
        assert_eq!(worst_case_path(base, "g", true), PathBuf::from("out/worst_case-g.txt"));
        assert_eq!(
            worst_case_path(Path::new("worst"), "local", true),
            PathBuf::from("worst-local")
        );
    }

    #[test]
    fn test_recorder_logs_and_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &["guillotine"]);
        let mut recorder = Recorder::create(&config).unwrap();

        recorder.record(&record(1, Some(3), Some(3))).unwrap();
        recorder.record(&record(2, Some(6), Some(5))).unwrap();
        recorder.record(&record(3, Some(4), None)).unwrap();
        assert_eq!(recorder.trials(), 3);

        let outcome = recorder.finish().unwrap();
        assert_eq!(outcome.failures.total(InvocationStatus::Timeout), 1);

        let candidate = &outcome.candidates[0];
        assert_eq!(candidate.summary.finite_count, 2);
        assert_eq!(candidate.summary.undefined, 1);

        let worst = candidate.worst_case.as_ref().unwrap();
        assert_eq!(worst.trial, 2);
        assert!((worst.ratio - 1.2).abs() < 1e-12);
        assert_eq!(std::fs::read_to_string(&worst.artifact).unwrap(), "1\n0 0 2 1\n");

        let log = std::fs::read_to_string(&config.run_log).unwrap();
        assert_eq!(log.lines().count(), 4);
    }

    #[test]
    fn test_recorder_counts_inconsistent_without_capturing_it() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &["guillotine"]);
        let mut recorder = Recorder::create(&config).unwrap();

        recorder.record(&record(1, Some(2), Some(3))).unwrap();
        let summary = recorder.summaries().next().unwrap();
        assert_eq!(summary.inconsistent, 1);
        assert_eq!(summary.finite_count, 1);
        assert!(summary.min_ratio.unwrap() < 1.0);

        let outcome = recorder.finish().unwrap();
        assert!(outcome.candidates[0].worst_case.is_none());
        assert!(!config.worst_case.exists());

        let log = std::fs::read_to_string(&config.run_log).unwrap();
        assert!(log.lines().nth(1).unwrap().contains(",0.666667,inconsistent,"));
    }

    #[test]
    fn test_recorder_without_suboptimal_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &["guillotine"]);
        let mut recorder = Recorder::create(&config).unwrap();
        recorder.record(&record(1, Some(3), Some(3))).unwrap();

        let outcome = recorder.finish().unwrap();
        assert!(outcome.candidates[0].worst_case.is_none());
        assert!(!config.worst_case.exists());
    }

    #[test]
    fn test_recorder_rows_are_flushed_per_trial() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &["guillotine"]);
        let mut recorder = Recorder::create(&config).unwrap();
        recorder.record(&record(1, Some(3), Some(3))).unwrap();

        let log = std::fs::read_to_string(recorder.log_path()).unwrap();
        assert!(log.lines().nth(1).unwrap().starts_with("1,3,30,3,3,1.000000,optimal"));
    }

    #[test]
    fn test_multiple_candidates_get_separate_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &["a", "b"]);
        let mut recorder = Recorder::create(&config).unwrap();

        let trial = TrialRecord::assemble(
            1,
            3,
            30,
            "1\n0 0 1 1\n".to_string(),
            run("ilp", Some(6)),
            vec![run("a", Some(3)), run("b", Some(6))],
        );
        recorder.record(&trial).unwrap();

        let outcome = recorder.finish().unwrap();
        let a = outcome.candidates[0].worst_case.as_ref().unwrap();
        assert_eq!(a.artifact, dir.path().join("worst-a.txt"));
        assert!(a.artifact.exists());
        assert!(outcome.candidates[1].worst_case.is_none());
    }

    #[test]
    fn test_report_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &["guillotine"]);
        let mut recorder = Recorder::create(&config).unwrap();
        recorder.record(&record(1, Some(6), Some(5))).unwrap();
        let outcome = recorder.finish().unwrap();

        let now = Utc::now();
        let report = RunReport::new(Uuid::new_v4(), now, now, 7, config, outcome);
        let path = dir.path().join("report.json");
        report.save(&path).unwrap();

        let loaded = RunReport::load(&path).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.candidates, report.candidates);
        assert!(loaded.candidate("guillotine").is_some());
        assert!(loaded.candidate("missing").is_none());
    }

    #[test]
    fn test_table_row_marks_failures_and_suboptimal() {
        let row = format_table_row(&record(2, Some(6), Some(5)));
        assert!(row.contains("1.2000*"));
        assert!(row.ends_with("| ok"));

        let row = format_table_row(&record(3, Some(6), None));
        assert!(row.contains("guillotine=timeout"));
    }

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(Some(1.23456)), "1.2346");
        assert_eq!(format_stat(None), "n/a");
    }
}
