use crate::{
    aggregate::{self, SizeSummary},
    config::SweepConfig,
    report::Reporter,
    trial,
    workload::Workload,
};
use colored::*;
use itertools::Itertools;
use term_table::{row, row::Row, rows, table_cell::*, Table, TableStyle};
use tracing::error;

/// Drives the outer loop over sizes and repetitions. Trials run strictly
/// sequentially: concurrent trials would contend for the same kernel or
/// control-plane resources and corrupt the CPU-time attribution.
///
/// Per-trial failures are recorded and never unwind past this function;
/// only an invalid config aborts, before any trial runs.
pub async fn run_sweep<W: Workload>(
    workload: &W,
    config: &SweepConfig,
    reporter: &mut dyn Reporter,
) -> anyhow::Result<Vec<SizeSummary>> {
    config.validate()?;
    let timeout = config.readiness_timeout();
    let repetitions = config.repetitions;

    let mut summaries = vec![];

    // ---- for each size ----
    for &size in &config.sizes {
        let mut samples = vec![];
        let mut attempted = 0;

        if let Err(err) = workload.prepare(size).await {
            error!("failed to prepare {} {}: {err}", workload.size_field(), size);
            println!(
                "> {} - {} {} - {} {}",
                workload.label().green(),
                workload.size_field(),
                size,
                "prepare failed:".red(),
                err
            );
        } else {
            // for each repetition
            for repetition in 1..=repetitions {
                attempted += 1;
                println!(
                    "> {} - {} {} - trial {}/{}",
                    workload.label().green(),
                    workload.size_field(),
                    size,
                    repetition,
                    repetitions
                );

                let outcome = trial::run_trial(workload, size, timeout).await;

                match &outcome.result {
                    Ok(sample) => {
                        println!(
                            "  {} wall {:.6}s user {:.6}s sys {:.6}s",
                            "ok".green(),
                            sample.wall_s,
                            sample.user_s,
                            sample.sys_s
                        );
                        samples.push(sample.clone());
                    }
                    Err(err) => {
                        println!("  {} {}", "failed".red(), err);
                    }
                }
                if let Some(residue) = &outcome.teardown_error {
                    println!("  {} {}", "teardown".yellow(), residue);
                }
            }
        }

        // a failed prepare runs zero trials; the row must say so
        let summary = aggregate::summarize(size, attempted, &samples);
        // emit before moving to the next size so an interrupted sweep
        // keeps the rows it finished
        reporter.emit(&summary)?;
        summaries.push(summary);
    }
    // ---- end for ----

    print_summary_table(workload.size_field(), &summaries);

    Ok(summaries)
}

fn print_summary_table(size_field: &str, summaries: &[SizeSummary]) {
    println!("\n{}", " Summary ".reversed().green());

    let mut table_rows = rows![row![
        TableCell::builder(size_field.bold()).build(),
        TableCell::builder("Avg wall (s)".bold()).build(),
        TableCell::builder("Avg user (s)".bold()).build(),
        TableCell::builder("Avg sys (s)".bold()).build(),
        TableCell::builder("Sys fraction".bold()).build(),
        TableCell::builder("Ok/trials".bold()).build()
    ]];
    let data_rows = summaries
        .iter()
        .map(|summary| {
            row![
                TableCell::new(format!("{}", summary.size)),
                TableCell::new(format!("{:.3}", summary.avg_wall_s)),
                TableCell::new(format!("{:.3}", summary.avg_user_s)),
                TableCell::new(format!("{:.3}", summary.avg_sys_s)),
                TableCell::new(format!("{:.3}", summary.sys_fraction)),
                TableCell::new(format!("{}/{}", summary.samples, summary.trials))
            ]
        })
        .collect_vec();
    table_rows.extend(data_rows);

    let table = Table::builder()
        .rows(table_rows)
        .style(TableStyle::rounded())
        .build();

    println!("{}", table.render())
}
