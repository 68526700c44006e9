use std::time::Duration;
use thiserror::Error;

/// Invalid sweep parameters. The only fatal error in the taxonomy: it
/// aborts the run before any trial starts.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("sizes must contain at least one entry")]
    EmptySizes,

    #[error("sizes must be positive")]
    ZeroSize,

    #[error("repetitions must be at least 1")]
    ZeroRepetitions,
}

/// A workload failed to create one of its resources. Partially created
/// resources stay tracked in the trial's resource set for teardown.
#[derive(Error, Debug)]
#[error("failed to provision {unit}: {reason}")]
pub struct ProvisionError {
    pub unit: String,
    pub reason: String,
}

impl ProvisionError {
    pub fn new(unit: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            unit: unit.into(),
            reason: reason.to_string(),
        }
    }
}

/// Resources never reached their usable state within the readiness
/// budget. Kept distinct from [`ProvisionError`] because the remedy
/// differs: capacity or backend trouble rather than a bad request.
#[derive(Error, Debug)]
#[error("{pending} of {total} resources not ready after {timeout:?}{}", detail_suffix(.detail))]
pub struct ReadinessError {
    pub pending: usize,
    pub total: usize,
    pub timeout: Duration,
    /// Last error seen while polling for readiness, if the wait failed
    /// for a reason other than slow resources.
    pub detail: Option<String>,
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(reason) => format!(" (last poll error: {reason})"),
        None => String::new(),
    }
}

/// Cleanup left residue behind. Recorded as a diagnostic on the trial
/// outcome, never re-raised and never blocks the next trial or size.
#[derive(Error, Debug)]
#[error("{} resources left behind: {}", .residues.len(), .residues.join(", "))]
pub struct TeardownError {
    pub residues: Vec<String>,
}

/// The stage at which a trial failed. Teardown failures are carried
/// separately on the outcome so they never mask the trial result.
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("readiness wait failed: {0}")]
    Readiness(#[from] ReadinessError),
}

impl TrialError {
    pub fn stage(&self) -> &'static str {
        match self {
            TrialError::Provision(_) => "provision",
            TrialError::Readiness(_) => "readiness",
        }
    }
}
