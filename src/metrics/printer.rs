use prettytable::{row, Table};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, fs::File, io::Write, path::Path, rc::Rc};

use crate::metrics::collector::{EstimatorWrapper, MetricsCollector};
use crate::scenario::definition::PhaseTransition;

#[derive(Debug, Default, Deserialize, PartialEq)]
pub enum OutputFormat {
    #[default]
    JSON,
    PrettyTable,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct MetricsPrinterConfig {
    #[serde(default)]
    pub format: OutputFormat,
    pub output_file: std::path::PathBuf,
}

pub fn print_metrics(
    collector: Rc<RefCell<MetricsCollector>>,
    config: &MetricsPrinterConfig,
) -> std::io::Result<()> {
    let mut metrics_file = File::create(&config.output_file)?;
    match config.format {
        OutputFormat::PrettyTable => print_metrics_as_pretty_table(&collector.borrow(), &mut metrics_file),
        OutputFormat::JSON => print_metrics_as_json(&collector.borrow(), &mut metrics_file),
    }
}

pub fn print_metrics_as_pretty_table<W: Write>(
    metrics: &MetricsCollector,
    out: &mut W,
) -> std::io::Result<()> {
    let mut aggregated_table = Table::new();
    aggregated_table.add_row(row!["Metric", "Count"]);
    aggregated_table.add_row(row!["Pods scheduled", metrics.pods_scheduled]);
    aggregated_table.add_row(row!["Pods unschedulable", metrics.pods_unschedulable]);
    aggregated_table.add_row(row!["Pods removed", metrics.pods_removed]);
    aggregated_table.add_row(row!["Pods failed", metrics.pods_failed]);
    aggregated_table.add_row(row!["Node failures", metrics.node_failures]);
    aggregated_table.add_row(row!["Node evictions", metrics.node_evictions]);
    aggregated_table.add_row(row!["Jobs completed", metrics.jobs_completed]);
    aggregated_table.add_row(row!["Scenario runs started", metrics.scenario_runs_started]);
    aggregated_table.add_row(row!["Scenario runs completed", metrics.scenario_runs_completed]);
    aggregated_table.add_row(row!["Scenario runs cancelled", metrics.scenario_runs_cancelled]);
    aggregated_table.add_row(row!["Stale callbacks dropped", metrics.stale_callbacks_dropped]);

    let mut stats_table = Table::new();
    stats_table.add_row(row!["Metric", "Min", "Max", "Mean", "Variance"]);
    let reconcile = &metrics.reconcile_latency_stats;
    stats_table.add_row(row![
        "Reconcile latency",
        reconcile.min(),
        reconcile.max(),
        reconcile.mean(),
        reconcile.population_variance()
    ]);

    aggregated_table.print(out)?;
    stats_table.print(out)?;
    Ok(())
}

#[derive(Serialize)]
struct MetricsJSON {
    counters: Counters,
    timings: Timings,
}

#[derive(Serialize)]
struct Counters {
    pods_scheduled: u64,
    pods_unschedulable: u64,
    pods_removed: u64,
    pods_failed: u64,
    node_failures: u64,
    node_evictions: u64,
    jobs_completed: u64,
    scenario_runs_started: u64,
    scenario_runs_completed: u64,
    scenario_runs_cancelled: u64,
    stale_callbacks_dropped: u64,
}

#[derive(Serialize)]
struct Timings {
    reconcile_latency: TimingsStats,
}

#[derive(Serialize)]
struct TimingsStats {
    min: f64,
    max: f64,
    mean: f64,
    variance: f64,
}

impl From<&EstimatorWrapper> for TimingsStats {
    fn from(stats: &EstimatorWrapper) -> Self {
        Self {
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            variance: stats.population_variance(),
        }
    }
}

pub fn print_metrics_as_json<W: Write>(metrics: &MetricsCollector, out: &mut W) -> std::io::Result<()> {
    let metrics = MetricsJSON {
        counters: Counters {
            pods_scheduled: metrics.pods_scheduled,
            pods_unschedulable: metrics.pods_unschedulable,
            pods_removed: metrics.pods_removed,
            pods_failed: metrics.pods_failed,
            node_failures: metrics.node_failures,
            node_evictions: metrics.node_evictions,
            jobs_completed: metrics.jobs_completed,
            scenario_runs_started: metrics.scenario_runs_started,
            scenario_runs_completed: metrics.scenario_runs_completed,
            scenario_runs_cancelled: metrics.scenario_runs_cancelled,
            stale_callbacks_dropped: metrics.stale_callbacks_dropped,
        },
        timings: Timings {
            reconcile_latency: (&metrics.reconcile_latency_stats).into(),
        },
    };

    let serialized_json = serde_json::to_string_pretty(&metrics)?;
    out.write_all(serialized_json.as_bytes())
}

/// Writes the phase history as CSV with a header row.
pub fn write_timeline_csv(history: &[PhaseTransition], output_file: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(output_file)?;
    for transition in history.iter() {
        writer.serialize(transition)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{print_metrics_as_json, print_metrics_as_pretty_table};
    use crate::metrics::collector::MetricsCollector;

    #[test]
    fn test_json_output_contains_counters() {
        let mut metrics = MetricsCollector::new();
        metrics.pods_scheduled = 3;
        metrics.increment_reconcile_latency(0.5);

        let mut out: Vec<u8> = vec![];
        print_metrics_as_json(&metrics, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(3, value["counters"]["pods_scheduled"]);
        assert_eq!(0.5, value["timings"]["reconcile_latency"]["mean"]);
    }

    #[test]
    fn test_pretty_table_output() {
        let metrics = MetricsCollector::new();
        let mut out: Vec<u8> = vec![];
        print_metrics_as_pretty_table(&metrics, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Stale callbacks dropped"));
        assert!(text.contains("Reconcile latency"));
    }
}
