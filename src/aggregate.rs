use crate::timer::Sample;

/// Per-size averages over the successful trials. `trials` and `samples`
/// keep the success count visible next to the means.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeSummary {
    pub size: u32,
    pub avg_wall_s: f64,
    pub avg_user_s: f64,
    pub avg_sys_s: f64,
    pub sys_fraction: f64,
    pub samples: usize,
    pub trials: usize,
}

/// Arithmetic mean of each timing field across the successful samples.
/// A size with zero successes reduces to an all-zero row; the sweep
/// still emits it to keep sizes and output rows positionally aligned.
/// No outlier handling: a pathological trial is supposed to be visible
/// in the mean, not hidden by the harness.
pub fn summarize(size: u32, trials: usize, samples: &[Sample]) -> SizeSummary {
    let avg_wall_s = mean(samples.iter().map(|s| s.wall_s));
    let avg_user_s = mean(samples.iter().map(|s| s.user_s));
    let avg_sys_s = mean(samples.iter().map(|s| s.sys_s));
    let sys_fraction = if avg_wall_s > 0.0 {
        avg_sys_s / avg_wall_s
    } else {
        0.0
    };

    SizeSummary {
        size,
        avg_wall_s,
        avg_user_s,
        avg_sys_s,
        sys_fraction,
        samples: samples.len(),
        trials,
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(wall_s: f64, user_s: f64, sys_s: f64) -> Sample {
        Sample {
            wall_s,
            user_s,
            sys_s,
            degraded: false,
        }
    }

    #[test]
    fn averages_the_three_timing_fields() {
        let samples = [sample(1.0, 0.1, 0.4), sample(2.0, 0.1, 0.6)];
        let summary = summarize(10, 2, &samples);

        assert_eq!(summary.size, 10);
        assert!((summary.avg_wall_s - 1.5).abs() < 1e-9);
        assert!((summary.avg_user_s - 0.1).abs() < 1e-9);
        assert!((summary.avg_sys_s - 0.5).abs() < 1e-9);
        assert!((summary.sys_fraction - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.trials, 2);
    }

    #[test]
    fn zero_successes_reduce_to_a_zero_row() {
        let summary = summarize(50, 5, &[]);

        assert_eq!(summary.avg_wall_s, 0.0);
        assert_eq!(summary.avg_user_s, 0.0);
        assert_eq!(summary.avg_sys_s, 0.0);
        assert_eq!(summary.sys_fraction, 0.0);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.trials, 5);
    }

    #[test]
    fn sys_fraction_is_guarded_against_zero_wall_time() {
        let summary = summarize(1, 1, &[sample(0.0, 0.0, 0.3)]);
        assert_eq!(summary.sys_fraction, 0.0);
    }

    #[test]
    fn parallel_child_work_may_exceed_wall_time() {
        // user + sys exceeding wall is legal for a subordinate task tree
        let summary = summarize(4, 1, &[sample(1.0, 0.9, 0.8)]);
        assert!(summary.avg_user_s + summary.avg_sys_s > summary.avg_wall_s);
        assert!(summary.sys_fraction >= 0.0);
    }
}
