//! Rectangle-selection experiment: measure how far approximate solvers for the
//! maximum non-overlapping rectangle selection problem fall from an exact one.
//!
//! This crate:
//! - Generates random rectangle instances with a configurable size band
//! - Feeds identical instance text to an exact baseline and each candidate
//! - Logs every trial to CSV as it completes
//! - Keeps the instance with the worst approximation ratio per candidate

pub mod artifact;
pub mod experiment;
pub mod generator;
pub mod results;

pub use artifact::{Instance, Rectangle};
pub use experiment::{ExperimentRunner, ExperimentRunnerConfig, Preset, Schedule};
pub use generator::{InstanceGenerator, SizeBand};
pub use results::{RunLog, RunReport, TrialRecord};
