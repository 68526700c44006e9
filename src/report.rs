use crate::aggregate::SizeSummary;
use anyhow::Context;
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

/// Sink for per-size summary rows. Emission is append-only and a row
/// must be durable before the sweep moves on, so an interrupted sweep
/// still leaves a usable partial record.
pub trait Reporter {
    fn emit(&mut self, summary: &SizeSummary) -> anyhow::Result<()>;
}

/// `;`-delimited record, one row per size, fixed field order and
/// 3-decimal precision. The size column is named per workload
/// (`num_mounts` / `size_mb` / `num_pvcs`).
pub struct CsvReporter {
    path: PathBuf,
    file: File,
}

impl CsvReporter {
    pub fn create(path: &Path, size_field: &str) -> anyhow::Result<Self> {
        let mut file = File::create(path)
            .context(format!("Failed to create output file {}", path.display()))?;
        writeln!(file, "{size_field};avg_wall_s;avg_user_s;avg_sys_s;sys_fraction")?;
        file.flush()?;
        file.sync_data()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Reporter for CsvReporter {
    fn emit(&mut self, summary: &SizeSummary) -> anyhow::Result<()> {
        writeln!(self.file, "{}", format_row(summary))?;
        self.file.flush()?;
        // fsync per row: a summary for size k must survive a crash
        // before size k+1 starts
        self.file.sync_data()?;
        Ok(())
    }
}

pub fn format_row(summary: &SizeSummary) -> String {
    format!(
        "{};{:.3};{:.3};{:.3};{:.3}",
        summary.size,
        summary.avg_wall_s,
        summary.avg_user_s,
        summary.avg_sys_s,
        summary.sys_fraction
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::summarize;
    use crate::timer::Sample;
    use std::fs;

    fn sample(wall_s: f64, user_s: f64, sys_s: f64) -> Sample {
        Sample {
            wall_s,
            user_s,
            sys_s,
            degraded: false,
        }
    }

    #[test]
    fn rows_render_with_fixed_precision() {
        let samples = [sample(1.0, 0.1, 0.4), sample(2.0, 0.1, 0.6)];
        let summary = summarize(10, 2, &samples);
        assert_eq!(format_row(&summary), "10;1.500;0.100;0.500;0.333");
    }

    #[test]
    fn writes_header_then_one_row_per_size() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.csv");

        let mut reporter = CsvReporter::create(&path, "num_mounts")?;
        reporter.emit(&summarize(10, 2, &[sample(1.0, 0.1, 0.4)]))?;
        reporter.emit(&summarize(50, 2, &[]))?;

        let contents = fs::read_to_string(&path)?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "num_mounts;avg_wall_s;avg_user_s;avg_sys_s;sys_fraction",
                "10;1.000;0.100;0.400;0.400",
                "50;0.000;0.000;0.000;0.000",
            ]
        );
        Ok(())
    }

    #[test]
    fn rows_are_durable_as_they_are_emitted() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.csv");

        let mut reporter = CsvReporter::create(&path, "num_pvcs")?;
        reporter.emit(&summarize(10, 1, &[sample(1.0, 0.1, 0.4)]))?;

        // read back while the reporter is still alive: the row must
        // already be on disk
        let contents = fs::read_to_string(&path)?;
        assert!(contents.ends_with("10;1.000;0.100;0.400;0.400\n"));
        drop(reporter);
        Ok(())
    }
}
