use crate::{
    errors::{TeardownError, TrialError},
    timer::{self, Sample},
    workload::{TrialNamespace, Workload},
};
use std::time::Duration;
use tracing::{info, warn};

/// Result of one (size, repetition) trial. A teardown failure rides
/// along as a diagnostic and never replaces the trial result.
#[derive(Debug)]
pub struct TrialOutcome {
    pub namespace: TrialNamespace,
    pub result: Result<Sample, TrialError>,
    pub teardown_error: Option<TeardownError>,
}

impl TrialOutcome {
    pub fn sample(&self) -> Option<&Sample> {
        self.result.as_ref().ok()
    }
}

/// Runs a single trial: measured provision + readiness wait, then
/// unconditional teardown of whatever was built, full or partial.
pub async fn run_trial<W: Workload>(workload: &W, size: u32, timeout: Duration) -> TrialOutcome {
    let namespace = TrialNamespace::generate(workload.label());
    let mut resources = workload.new_resources(namespace.clone());

    let (result, sample) = timer::measure(async {
        workload.provision(size, &mut resources).await?;
        workload
            .await_ready(&resources, timeout)
            .await
            .map_err(TrialError::from)
    })
    .await;

    // teardown runs on every exit path and is not subject to the
    // readiness timeout; it must be attempted exhaustively
    let teardown_error = match workload.teardown(&mut resources).await {
        Ok(()) => None,
        Err(err) => {
            warn!(namespace = %namespace, "teardown left residue: {err}");
            Some(err)
        }
    };

    match &result {
        Ok(()) => info!(
            namespace = %namespace,
            "trial ok: wall {:.6}s user {:.6}s sys {:.6}s",
            sample.wall_s, sample.user_s, sample.sys_s
        ),
        Err(err) => warn!(namespace = %namespace, stage = err.stage(), "trial failed: {err}"),
    }

    TrialOutcome {
        namespace,
        result: result.map(|()| sample),
        teardown_error,
    }
}
