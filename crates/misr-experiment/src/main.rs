//! Rectangle-selection experiment CLI.
//!
//! Commands:
//! - run: Run the trial loop against an exact baseline
//! - generate: Print one random instance in solver input format
//! - replay: Run solvers on a saved instance (e.g. a captured worst case)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use misr_experiment::artifact::Instance;
use misr_experiment::experiment::{
    invoke_lineup, ExperimentRunner, ExperimentRunnerConfig, Preset, Schedule,
};
use misr_experiment::generator::InstanceGenerator;
use misr_experiment::results::{
    format_stat, format_table_header, format_table_row, RunReport, SolverRun, TrialRecord,
};
use solver_harness::{validate_lineup, InvocationStatus, SolverInvoker, SolverSpec};

/// Insert a timestamp before the extension.
/// e.g., "results.csv" -> "results-20260108-010530.csv"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("results");
    let file_name = match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}-{}.{}", stem, timestamp, ext),
        None => format!("{}-{}", stem, timestamp),
    };
    path.with_file_name(file_name)
}

#[derive(Parser)]
#[command(name = "misr-experiment")]
#[command(version)]
#[command(about = "Approximation ratios for maximum non-overlapping rectangle selection")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the experiment loop
    Run(RunArgs),

    /// Generate and print one instance
    Generate {
        /// Number of rectangles
        #[arg(long, default_value = "20")]
        n: usize,

        /// Grid size multiplier (defaults to the preset's)
        #[arg(long)]
        grid_multiplier: Option<u32>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Preset supplying the size band
        #[arg(long, default_value = "guillotine")]
        preset: String,
    },

    /// Run solvers on a saved instance and print the ratios
    Replay {
        /// Instance file in solver input format
        #[arg(long)]
        instance: PathBuf,

        /// Exact solver, LABEL=PROGRAM[@SECONDS]
        #[arg(long)]
        baseline: SolverSpec,

        /// Candidate solver, LABEL=PROGRAM[@SECONDS] (repeatable)
        #[arg(long = "candidate", required = true)]
        candidates: Vec<SolverSpec>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Starting configuration
    #[arg(long, default_value = "guillotine")]
    preset: String,

    /// JSON configuration file (replaces the preset)
    #[arg(long, env = "MISR_CONFIG")]
    config: Option<PathBuf>,

    /// Number of trials
    #[arg(long)]
    trials: Option<usize>,

    /// Smallest rectangle count
    #[arg(long)]
    min_rectangles: Option<usize>,

    /// Largest rectangle count
    #[arg(long)]
    max_rectangles: Option<usize>,

    /// grid_size = n * multiplier
    #[arg(long)]
    grid_multiplier: Option<u32>,

    /// Rectangle-count schedule: linear, uniform
    #[arg(long)]
    schedule: Option<String>,

    /// Exact solver, LABEL=PROGRAM[@SECONDS]
    #[arg(long)]
    baseline: Option<SolverSpec>,

    /// Candidate solver, LABEL=PROGRAM[@SECONDS] (repeatable, replaces the configured list)
    #[arg(long = "candidate")]
    candidates: Vec<SolverSpec>,

    /// CSV run log
    #[arg(long)]
    run_log: Option<PathBuf>,

    /// Worst-case instance file
    #[arg(long)]
    worst_case: Option<PathBuf>,

    /// JSON report with the final summary
    #[arg(long)]
    report: Option<PathBuf>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Run all solvers of a trial concurrently
    #[arg(long)]
    parallel: bool,

    /// Append a timestamp to the run log and report file names
    #[arg(long)]
    timestamp: bool,
}

impl RunArgs {
    /// Preset or config file, then individual flag overrides.
    fn into_config(self) -> Result<ExperimentRunnerConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentRunnerConfig::load(path)?,
            None => self.preset.parse::<Preset>()?.config(),
        };

        if let Some(trials) = self.trials {
            config.trials = trials;
        }
        if let Some(min) = self.min_rectangles {
            config.min_rectangles = min;
        }
        if let Some(max) = self.max_rectangles {
            config.max_rectangles = max;
        }
        if let Some(multiplier) = self.grid_multiplier {
            config.grid_multiplier = multiplier;
        }
        if let Some(schedule) = &self.schedule {
            config.schedule = schedule.parse::<Schedule>()?;
        }
        if let Some(baseline) = self.baseline {
            config.baseline = baseline;
        }
        if !self.candidates.is_empty() {
            config.candidates = self.candidates;
        }
        if let Some(run_log) = self.run_log {
            config.run_log = run_log;
        }
        if let Some(worst_case) = self.worst_case {
            config.worst_case = worst_case;
        }
        if self.report.is_some() {
            config.report = self.report;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.parallel {
            config.parallel_solvers = true;
        }
        if self.timestamp {
            config.run_log = timestamped_path(&config.run_log);
            config.report = config.report.as_deref().map(timestamped_path);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the table and generated instances
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let config = args.into_config()?;
            run(config).await?;
        }

        Commands::Generate {
            n,
            grid_multiplier,
            seed,
            preset,
        } => {
            let preset = preset.parse::<Preset>()?.config();
            let multiplier = grid_multiplier.unwrap_or(preset.grid_multiplier);
            let seed = seed.unwrap_or_else(rand::random);

            let instance =
                InstanceGenerator::new(preset.size_band).generate_for_count(seed, n, multiplier)?;
            info!(n = n, grid_size = instance.grid_size(), seed = seed, "Generated instance");
            print!("{}", instance.to_protocol_text());
        }

        Commands::Replay {
            instance,
            baseline,
            candidates,
        } => {
            validate_lineup(&baseline, &candidates)?;
            replay(&instance, baseline, candidates).await?;
        }
    }

    Ok(())
}

async fn run(config: ExperimentRunnerConfig) -> Result<()> {
    let labels = config.candidate_labels();
    println!("{}", format_table_header(&config.baseline.label, &labels));

    let runner = ExperimentRunner::new(config.clone());
    let report = runner
        .run(|record, _| println!("{}", format_table_row(record)))
        .await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("\n=== Experiment Complete ===");
    println!("Run: {}", report.run_id);
    println!("Seed: {}", report.seed);
    println!("Trials: {}", report.trials);
    println!("Duration: {:.1}s", report.duration_secs());
    println!("Run log: {}", report.config.run_log.display());
    if let Some(path) = &report.config.report {
        println!("Report: {}", path.display());
    }

    for candidate in &report.candidates {
        let summary = &candidate.summary;
        println!("\n{} vs {}:", summary.label, report.config.baseline.label);
        println!("  Valid trials: {}/{}", summary.finite_count, summary.trials);
        println!("  Mean ratio: {}", format_stat(summary.mean_ratio()));
        println!("  Min ratio: {}", format_stat(summary.min_ratio));
        println!("  Max ratio: {}", format_stat(summary.max_ratio));
        println!(
            "  Suboptimal: {} ({} unbounded)",
            summary.suboptimal, summary.unbounded
        );
        if summary.trivial_ties > 0 {
            println!("  Trivial ties: {}", summary.trivial_ties);
        }
        if summary.inconsistent > 0 {
            println!("  Inconsistent (candidate beat baseline): {}", summary.inconsistent);
        }
        match &candidate.worst_case {
            Some(worst) => println!(
                "  Worst case: ratio {:.4} at trial {} -> {}",
                worst.ratio,
                worst.trial,
                worst.artifact.display()
            ),
            None => println!("  Worst case: none (no suboptimal instance)"),
        }
    }

    if !report.failures.is_empty() {
        println!("\nFailures:");
        for (label, counts) in &report.failures.by_solver {
            let counts: Vec<String> = counts
                .iter()
                .map(|(status, count)| format!("{}={}", status, count))
                .collect();
            println!("  {}: {}", label, counts.join(", "));
        }
        for status in InvocationStatus::ALL.iter().filter(|s| s.is_failure()) {
            let total = report.failures.total(*status);
            if total > 0 {
                println!("  total {}: {}", status, total);
            }
        }
    }
}

async fn replay(path: &Path, baseline: SolverSpec, candidates: Vec<SolverSpec>) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read instance {}", path.display()))?;
    let instance: Instance = text
        .parse()
        .with_context(|| format!("Invalid instance {}", path.display()))?;
    let text = instance.to_protocol_text();

    info!(
        path = %path.display(),
        n = instance.n(),
        overlaps = instance.overlap_count(),
        "Replaying instance"
    );

    let (baseline_result, candidate_results) =
        invoke_lineup(&SolverInvoker::new(), &baseline, &candidates, &text, false).await;

    let record = TrialRecord::assemble(
        1,
        instance.n(),
        instance.grid_size(),
        text,
        SolverRun {
            label: baseline.label.clone(),
            result: baseline_result,
        },
        candidates
            .iter()
            .zip(candidate_results)
            .map(|(spec, result)| SolverRun {
                label: spec.label.clone(),
                result,
            })
            .collect(),
    );

    let labels: Vec<&str> = candidates.iter().map(|c| c.label.as_str()).collect();
    println!("{}", format_table_header(&baseline.label, &labels));
    println!("{}", format_table_row(&record));
    for candidate in &record.candidates {
        println!("{}: {}", candidate.label, candidate.evaluation.verdict);
    }
    Ok(())
}
