use std::{future::Future, time::Instant};
use tracing::warn;

/// One trial's measurement: wall clock plus the user/system CPU time the
/// measured unit of work consumed, in decimal seconds at microsecond
/// granularity. `degraded` marks a wall-only sample taken on a platform
/// without CPU accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub wall_s: f64,
    pub user_s: f64,
    pub sys_s: f64,
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy)]
struct CpuTimes {
    user: f64,
    sys: f64,
}

/// Runs `unit` as one measured unit of work.
///
/// Wall time comes from a monotonic clock read immediately around the
/// future (async blocks do nothing until first polled, so constructing
/// the unit beforehand costs nothing measurable). CPU time is the
/// rusage delta of this process plus its reaped children, which
/// captures provisioning work regardless of whether it happens
/// in-process (mount syscalls, file I/O) or in a child process tree
/// (kubectl). Trials run strictly sequentially, so the delta is
/// attributable to this unit alone.
///
/// A CPU-accounting failure never fails the trial: the sample degrades
/// to wall-only with a warning.
pub async fn measure<T, E>(unit: impl Future<Output = Result<T, E>>) -> (Result<T, E>, Sample) {
    measure_with(cpu_times, unit).await
}

/// Measurement with the CPU-accounting read injectable, so the degraded
/// path is reachable on platforms where `cpu_times` always succeeds.
async fn measure_with<T, E>(
    times: impl Fn() -> Option<CpuTimes>,
    unit: impl Future<Output = Result<T, E>>,
) -> (Result<T, E>, Sample) {
    let before = times();
    let start = Instant::now();
    let result = unit.await;
    let wall_s = start.elapsed().as_secs_f64();
    let after = times();

    let sample = match (before, after) {
        (Some(before), Some(after)) => Sample {
            wall_s,
            user_s: (after.user - before.user).max(0.0),
            sys_s: (after.sys - before.sys).max(0.0),
            degraded: false,
        },
        _ => {
            warn!("CPU accounting unavailable, recording a wall-only sample");
            Sample {
                wall_s,
                user_s: 0.0,
                sys_s: 0.0,
                degraded: true,
            }
        }
    };

    (result, sample)
}

#[cfg(unix)]
fn cpu_times() -> Option<CpuTimes> {
    use nix::sys::resource::{getrusage, UsageWho};

    let own = getrusage(UsageWho::RUSAGE_SELF).ok()?;
    let children = getrusage(UsageWho::RUSAGE_CHILDREN).ok()?;
    Some(CpuTimes {
        user: seconds(own.user_time()) + seconds(children.user_time()),
        sys: seconds(own.system_time()) + seconds(children.system_time()),
    })
}

#[cfg(unix)]
fn seconds(t: nix::sys::time::TimeVal) -> f64 {
    t.tv_sec() as f64 + t.tv_usec() as f64 / 1e6
}

#[cfg(not(unix))]
fn cpu_times() -> Option<CpuTimes> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wall_time_covers_the_whole_unit() {
        let (result, sample) = measure(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, std::convert::Infallible>(())
        })
        .await;

        assert!(result.is_ok());
        assert!(sample.wall_s >= 0.05);
        assert!(sample.user_s >= 0.0);
        assert!(sample.sys_s >= 0.0);
    }

    #[tokio::test]
    async fn unavailable_accounting_degrades_to_wall_only() {
        let (result, sample) = measure_with(
            || None,
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, std::convert::Infallible>(())
            },
        )
        .await;

        // a wall-only sample, never a failure
        assert!(result.is_ok());
        assert!(sample.degraded);
        assert!(sample.wall_s >= 0.01);
        assert_eq!(sample.user_s, 0.0);
        assert_eq!(sample.sys_s, 0.0);
    }

    #[tokio::test]
    async fn a_failing_unit_is_still_timed() {
        let (result, sample) = measure(async { Err::<(), &str>("boom") }).await;

        assert_eq!(result, Err("boom"));
        assert!(sample.wall_s >= 0.0);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn child_process_cpu_is_attributed_to_the_unit() -> anyhow::Result<()> {
        let (result, sample) = measure(async {
            // burn some user CPU in a child so the RUSAGE_CHILDREN delta
            // has something to show
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg("i=0; while [ $i -lt 200000 ]; do i=$((i+1)); done")
                .output()
                .await
        })
        .await;

        assert!(result?.status.success());
        assert!(!sample.degraded);
        assert!(sample.user_s + sample.sys_s > 0.0);
        Ok(())
    }
}
