// Change-point detector: per-metric level shifts and regression verdicts
//
// For each metric the divisive search yields every significant boundary.
// Only the most recent boundary inside the lookback window decides the
// verdict; earlier ones are reported as history.

use crate::algorithm::{Algorithm, AlgorithmKind, Verdict};
use crate::change_point::config::ChangePointConfig;
use crate::change_point::search::{find_change_points, ChangePoint};
use crate::config::{Direction, MetricConfig, MetricsConfig, Options, TestSpec};
use crate::dataset::RunDataset;
use crate::error::Result;
use crate::table::{format_percent, format_timestamp, Align, TextTable};
use serde::Serialize;
use std::collections::BTreeMap;

/// A boundary with the segment means around it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangePointDetail {
    /// Index of the first run of the new segment
    pub index: usize,
    pub run_id: String,
    pub timestamp: i64,
    /// Mean of the segment ending at the boundary
    pub pre_mean: f64,
    /// Mean of the segment starting at the boundary
    pub post_mean: f64,
    /// `(post - pre) / |pre| * 100`, absent when `pre` is zero
    pub percent_change: Option<f64>,
    pub statistic: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

/// Change-point result for one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricChangeReport {
    pub metric: String,
    pub direction: Direction,
    pub verdict: Verdict,
    /// Most recent boundary inside the lookback window
    pub change_point: Option<ChangePointDetail>,
    /// Other accepted boundaries, oldest first; they do not affect the verdict
    pub history: Vec<ChangePointDetail>,
}

/// One run with the values of the analyzed metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub run_id: String,
    pub timestamp: i64,
    pub metrics: BTreeMap<String, f64>,
    /// Whether an actionable change point starts at this run
    pub is_change_point: bool,
}

/// Full change-point analysis of one test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangePointAnalysis {
    pub test: String,
    pub algorithm: AlgorithmKind,
    pub regressed: bool,
    pub metrics: Vec<MetricChangeReport>,
    pub runs: Vec<RunRow>,
}

/// E-divisive style change-point detector
#[derive(Debug, Clone)]
pub struct EDivisive {
    analysis: ChangePointAnalysis,
}

impl EDivisive {
    /// Run change-point detection over every configured metric
    ///
    /// # Errors
    /// `MalformedRunRecord` when a run lacks a metric or carries a non-numeric value.
    pub fn new(
        dataset: &RunDataset,
        test: &TestSpec,
        options: &Options,
        metrics: &MetricsConfig,
    ) -> Result<Self> {
        let series = metrics
            .iter()
            .map(|metric| dataset.series(&metric.name)?.require_complete(dataset))
            .collect::<Result<Vec<_>>>()?;

        let reports: Vec<MetricChangeReport> = metrics
            .iter()
            .zip(&series)
            .map(|(metric, values)| {
                analyze_metric(metric, values, dataset, &options.tuning.change_point)
            })
            .collect();

        let runs = dataset
            .runs()
            .iter()
            .enumerate()
            .map(|(i, run)| RunRow {
                run_id: run.run_id.clone(),
                timestamp: run.timestamp,
                metrics: metrics
                    .iter()
                    .zip(&series)
                    .map(|(metric, values)| (metric.name.clone(), values[i]))
                    .collect(),
                is_change_point: reports
                    .iter()
                    .any(|r| r.change_point.as_ref().is_some_and(|cp| cp.index == i)),
            })
            .collect();

        let regressed = reports.iter().any(|r| r.verdict == Verdict::Regression);
        if regressed {
            tracing::info!(test = %test.name, "change point regression detected");
        }

        Ok(Self {
            analysis: ChangePointAnalysis {
                test: test.name.clone(),
                algorithm: AlgorithmKind::ChangePoint,
                regressed,
                metrics: reports,
                runs,
            },
        })
    }

    pub fn analysis(&self) -> &ChangePointAnalysis {
        &self.analysis
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn analyze_metric(
    metric: &MetricConfig,
    values: &[f64],
    dataset: &RunDataset,
    config: &ChangePointConfig,
) -> MetricChangeReport {
    if values.len() < 2 {
        return MetricChangeReport {
            metric: metric.name.clone(),
            direction: metric.direction,
            verdict: Verdict::InsufficientData,
            change_point: None,
            history: Vec::new(),
        };
    }

    let points = find_change_points(values.to_vec(), config);
    tracing::debug!(
        metric = %metric.name,
        runs = values.len(),
        change_points = points.len(),
        "change point search finished"
    );

    let mut details: Vec<ChangePointDetail> = points
        .iter()
        .enumerate()
        .map(|(i, cp)| {
            let start = if i == 0 { 0 } else { points[i - 1].index };
            let end = points.get(i + 1).map_or(values.len(), |next| next.index);
            detail(cp, values, dataset, start, end)
        })
        .collect();

    let actionable = details
        .iter()
        .rposition(|d| dataset.in_window(d.index))
        .map(|pos| details.remove(pos));

    let verdict = match &actionable {
        Some(cp) => Verdict::classify(metric.direction, cp.post_mean - cp.pre_mean),
        None => Verdict::NoChange,
    };

    MetricChangeReport {
        metric: metric.name.clone(),
        direction: metric.direction,
        verdict,
        change_point: actionable,
        history: details,
    }
}

fn detail(
    cp: &ChangePoint,
    values: &[f64],
    dataset: &RunDataset,
    start: usize,
    end: usize,
) -> ChangePointDetail {
    let pre_mean = mean(&values[start..cp.index]);
    let post_mean = mean(&values[cp.index..end]);
    let percent_change = if pre_mean == 0.0 {
        None
    } else {
        Some((post_mean - pre_mean) / pre_mean.abs() * 100.0)
    };
    let run = &dataset.runs()[cp.index];

    ChangePointDetail {
        index: cp.index,
        run_id: run.run_id.clone(),
        timestamp: run.timestamp,
        pre_mean,
        post_mean,
        percent_change,
        statistic: cp.statistic,
        p_value: cp.p_value,
    }
}

impl Algorithm for EDivisive {
    fn test_name(&self) -> &str {
        &self.analysis.test
    }

    fn has_regression(&self) -> bool {
        self.analysis.regressed
    }

    fn output_json(&self) -> Result<(String, serde_json::Value)> {
        Ok((
            self.analysis.test.clone(),
            serde_json::to_value(&self.analysis)?,
        ))
    }

    fn output_text(&self) -> (String, String) {
        let analysis = &self.analysis;
        let mut headers = vec!["time".to_string(), "run_id".to_string()];
        headers.extend(analysis.metrics.iter().map(|m| m.metric.clone()));

        let mut table = TextTable::new(headers);
        for column in 2..analysis.metrics.len() + 2 {
            table = table.align(column, Align::Right);
        }

        for (i, run) in analysis.runs.iter().enumerate() {
            if run.is_change_point {
                let marker = |dots: bool| {
                    let mut row = vec![String::new(), String::new()];
                    row.extend(analysis.metrics.iter().map(|m| {
                        match m.change_point.as_ref().filter(|cp| cp.index == i) {
                            Some(_) if dots => "·········".to_string(),
                            Some(cp) => format_percent(cp.percent_change),
                            None => String::new(),
                        }
                    }));
                    row
                };
                table.add_row(marker(true));
                table.add_row(marker(false));
                table.add_row(marker(true));
            }

            let mut row = vec![format_timestamp(run.timestamp), run.run_id.clone()];
            row.extend(
                analysis
                    .metrics
                    .iter()
                    .map(|m| format!("{:.2}", run.metrics[&m.metric])),
            );
            table.add_row(row);
        }

        let mut output = table.render();
        output.push('\n');
        for report in &analysis.metrics {
            let direction = match report.direction {
                Direction::HigherIsBetter => "higher is better",
                Direction::LowerIsBetter => "lower is better",
            };
            match &report.change_point {
                Some(cp) => output.push_str(&format!(
                    "{} ({}): {} at {} ({:.2} -> {:.2}, {})\n",
                    report.metric,
                    direction,
                    report.verdict,
                    cp.run_id,
                    cp.pre_mean,
                    cp.post_mean,
                    format_percent(cp.percent_change)
                )),
                None => output.push_str(&format!(
                    "{} ({}): {}\n",
                    report.metric, direction, report.verdict
                )),
            }
        }

        (analysis.test.clone(), output)
    }
}
