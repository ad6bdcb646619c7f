//! Solver Harness: run opaque external solvers and compare them against an exact baseline.
//!
//! This crate is problem-agnostic. It knows how to:
//! - spawn a solver, feed it an instance on stdin and enforce a time budget
//! - extract a reported score from free-form output
//! - turn a baseline/candidate score pair into an approximation ratio
//! - keep running statistics and the hardest instance seen
//!
//! Instance generation and persistence live in the experiment crates.

pub mod config;
pub mod invoker;
pub mod ratio;
pub mod summary;
pub mod tracker;

pub use config::{validate_lineup, SolverSpec};
pub use invoker::{parse_score, InvocationResult, InvocationStatus, SolverInvoker};
pub use ratio::{assess, evaluate, Evaluation, Ratio, Verdict, RATIO_EPSILON};
pub use summary::{FailureCounts, RunningSummary};
pub use tracker::{WorstCase, WorstCaseTracker};
