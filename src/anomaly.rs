//! Windowed anomaly detection over run history
//!
//! Each run past the first `window` runs is compared with the trailing moving
//! average of the preceding runs. The per-metric percent deviations form a
//! vector that an [`IsolationForest`](crate::isolation_forest::IsolationForest)
//! scores; the score scales the weighted mean deviation into a composite
//! score, which is flagged when it exceeds the minimum anomaly percent
//! widened by the window's own variability.
//!
//! Window variability uses Trueno SIMD-accelerated statistics, as the
//! sliding-window baselines of live tracing did.

use crate::algorithm::{Algorithm, AlgorithmKind, Verdict};
use crate::config::{Direction, MetricsConfig, Options, TestSpec};
use crate::dataset::RunDataset;
use crate::error::{DetectionError, Result};
use crate::isolation_forest::score_samples;
use crate::table::{format_percent, format_timestamp, Align, TextTable};
use serde::Serialize;
use trueno::Vector;

/// Fewest runs for which a trailing baseline can exist
const MIN_RUNS: usize = 2;

/// Trailing baseline of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowBaseline {
    mean: f64,
    /// Coefficient of variation as a fraction (0 when undefined)
    cv: f64,
}

impl WindowBaseline {
    fn from_window(window: &[f64]) -> Self {
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        if mean == 0.0 {
            return Self { mean, cv: 0.0 };
        }

        let samples: Vec<f32> = window.iter().map(|&v| v as f32).collect();
        let stddev = Vector::from_slice(&samples).stddev().unwrap_or(0.0) as f64;
        Self {
            mean,
            cv: if stddev.is_finite() { stddev / mean.abs() } else { 0.0 },
        }
    }

    /// Percent deviation from the baseline mean; 0 when the mean is zero
    fn deviation_percent(&self, value: f64) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.mean.abs() * 100.0
        }
    }
}

/// Deviation of one metric for a flagged run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDeviation {
    pub metric: String,
    pub direction: Direction,
    pub value: f64,
    /// Trailing moving average the value is compared with
    pub baseline: f64,
    pub deviation_percent: f64,
    /// `weight * |deviation_percent|`
    pub contribution: f64,
}

/// A run flagged as anomalous
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedRun {
    pub index: usize,
    pub run_id: String,
    pub timestamp: i64,
    pub composite_score: f64,
    pub isolation_score: f64,
    /// Score the composite had to exceed
    pub threshold: f64,
    pub verdict: Verdict,
    /// Metrics ranked by contribution, largest first
    pub contributors: Vec<MetricDeviation>,
}

/// Full anomaly analysis of one test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyAnalysis {
    pub test: String,
    pub algorithm: AlgorithmKind,
    pub regressed: bool,
    pub window: usize,
    pub min_anomaly_percent: f64,
    pub total_runs: usize,
    /// Runs with a full trailing window
    pub scored_runs: usize,
    pub flagged: Vec<FlaggedRun>,
}

/// Per-run scoring input
struct ScoredRun {
    index: usize,
    deviations: Vec<MetricDeviation>,
    weighted_deviation: f64,
    worse_deviation: f64,
    cv: f64,
}

/// Isolation Forest combined with weighted moving-average deviation
#[derive(Debug, Clone)]
pub struct IsolationForestWeightedMean {
    analysis: AnomalyAnalysis,
}

impl IsolationForestWeightedMean {
    /// Score every run past the first window and flag the anomalous ones
    ///
    /// # Errors
    /// `InsufficientData` for fewer than two runs, `MalformedRunRecord` for
    /// missing or non-numeric metrics, `Config` for a zero window.
    pub fn new(
        dataset: &RunDataset,
        test: &TestSpec,
        options: &Options,
        metrics: &MetricsConfig,
    ) -> Result<Self> {
        if dataset.len() < MIN_RUNS {
            return Err(DetectionError::InsufficientData {
                test: test.name.clone(),
                required: MIN_RUNS,
                actual: dataset.len(),
            });
        }
        let window = options.anomaly_window;
        if window == 0 {
            return Err(DetectionError::Config(
                "anomaly_window must be >= 1".to_string(),
            ));
        }

        let series = metrics
            .iter()
            .map(|metric| dataset.series(&metric.name)?.require_complete(dataset))
            .collect::<Result<Vec<_>>>()?;

        let scored: Vec<ScoredRun> = (window..dataset.len())
            .map(|i| {
                let mut run = ScoredRun {
                    index: i,
                    deviations: Vec::with_capacity(metrics.len()),
                    weighted_deviation: 0.0,
                    worse_deviation: 0.0,
                    cv: 0.0,
                };
                for (metric, values) in metrics.iter().zip(&series) {
                    let baseline = WindowBaseline::from_window(&values[i - window..i]);
                    let deviation = baseline.deviation_percent(values[i]);
                    let contribution = metric.weight * deviation.abs();

                    run.weighted_deviation += contribution;
                    run.worse_deviation += metric.weight * deviation * metric.direction.worse_sign();
                    run.cv += metric.weight * baseline.cv;
                    run.deviations.push(MetricDeviation {
                        metric: metric.name.clone(),
                        direction: metric.direction,
                        value: values[i],
                        baseline: baseline.mean,
                        deviation_percent: deviation,
                        contribution,
                    });
                }
                run
            })
            .collect();

        let vectors: Vec<Vec<f64>> = scored
            .iter()
            .map(|run| run.deviations.iter().map(|d| d.deviation_percent).collect())
            .collect();
        let isolation_scores = score_samples(&vectors, &options.tuning.anomaly);

        let mut flagged = Vec::new();
        for (run, isolation_score) in scored.into_iter().zip(isolation_scores) {
            let composite_score = run.weighted_deviation * (0.5 + isolation_score);
            let threshold = options.min_anomaly_percent * (1.0 + run.cv);
            if composite_score <= threshold {
                continue;
            }

            let mut contributors: Vec<MetricDeviation> = run
                .deviations
                .into_iter()
                .filter(|d| d.contribution > 0.0)
                .collect();
            // Stable: equal contributions keep configuration order
            contributors.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));

            let record = &dataset.runs()[run.index];
            tracing::debug!(
                test = %test.name,
                run = %record.run_id,
                composite_score,
                threshold,
                "anomalous run"
            );

            flagged.push(FlaggedRun {
                index: run.index,
                run_id: record.run_id.clone(),
                timestamp: record.timestamp,
                composite_score,
                isolation_score,
                threshold,
                verdict: if run.worse_deviation > 0.0 {
                    Verdict::Regression
                } else {
                    Verdict::Improvement
                },
                contributors,
            });
        }

        let regressed = flagged.iter().any(|f| f.verdict == Verdict::Regression);
        if regressed {
            tracing::info!(test = %test.name, flagged = flagged.len(), "anomalous regression detected");
        }

        Ok(Self {
            analysis: AnomalyAnalysis {
                test: test.name.clone(),
                algorithm: AlgorithmKind::Anomaly,
                regressed,
                window,
                min_anomaly_percent: options.min_anomaly_percent,
                total_runs: dataset.len(),
                scored_runs: dataset.len().saturating_sub(window),
                flagged,
            },
        })
    }

    pub fn analysis(&self) -> &AnomalyAnalysis {
        &self.analysis
    }
}

impl Algorithm for IsolationForestWeightedMean {
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
        let mut output = format!(
            "Anomaly detection: window={} min_anomaly_percent={} runs={} scored={}\n\n",
            analysis.window, analysis.min_anomaly_percent, analysis.total_runs, analysis.scored_runs
        );

        if analysis.flagged.is_empty() {
            output.push_str("No anomalous runs detected\n");
            return (analysis.test.clone(), output);
        }

        let mut table = TextTable::new([
            "time",
            "run_id",
            "score",
            "isolation",
            "verdict",
            "metric",
            "value",
            "baseline",
            "deviation",
        ])
        .align(2, Align::Right)
        .align(3, Align::Right)
        .align(6, Align::Right)
        .align(7, Align::Right)
        .align(8, Align::Right);

        for run in &analysis.flagged {
            for (rank, contributor) in run.contributors.iter().enumerate() {
                let mut row = if rank == 0 {
                    vec![
                        format_timestamp(run.timestamp),
                        run.run_id.clone(),
                        format!("{:.2}", run.composite_score),
                        format!("{:.3}", run.isolation_score),
                        run.verdict.to_string(),
                    ]
                } else {
                    vec![String::new(); 5]
                };
                row.extend([
                    contributor.metric.clone(),
                    format!("{:.2}", contributor.value),
                    format!("{:.2}", contributor.baseline),
                    format_percent(Some(contributor.deviation_percent)),
                ]);
                table.add_row(row);
            }
        }

        output.push_str(&table.render());
        output.push_str(&format!(
            "\n{} of {} scored runs flagged\n",
            analysis.flagged.len(),
            analysis.scored_runs
        ));
        (analysis.test.clone(), output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricSpec;
    use crate::dataset::RunRecord;

    fn test_spec(metrics: &[(&str, Direction, Option<f64>)]) -> TestSpec {
        TestSpec {
            name: "node-density".to_string(),
            index: "ripsaw-kube-burner".to_string(),
            metrics: metrics
                .iter()
                .map(|(name, direction, weight)| MetricSpec {
                    name: name.to_string(),
                    direction: *direction,
                    weight: *weight,
                })
                .collect(),
        }
    }

    fn dataset(rows: &[Vec<(&str, f64)>]) -> RunDataset {
        let runs = rows
            .iter()
            .enumerate()
            .map(|(i, metrics)| {
                RunRecord::new(format!("run-{:02}", i + 1), 1_700_000_000 + i as i64 * 3600, metrics)
            })
            .collect();
        RunDataset::new(runs, None).unwrap()
    }

    fn single(values: &[f64]) -> RunDataset {
        let rows: Vec<Vec<(&str, f64)>> = values.iter().map(|v| vec![("duration", *v)]).collect();
        dataset(&rows)
    }

    fn options(window: usize, min_percent: f64) -> Options {
        let mut options = Options::new(AlgorithmKind::Anomaly);
        options.anomaly_window = window;
        options.min_anomaly_percent = min_percent;
        options
    }

    fn detect(test: &TestSpec, data: &RunDataset, options: &Options) -> IsolationForestWeightedMean {
        let metrics = MetricsConfig::from_test(test).unwrap();
        IsolationForestWeightedMean::new(data, test, options, &metrics).unwrap()
    }

    fn step_values() -> Vec<f64> {
        let mut values = vec![100.0; 15];
        values.extend(vec![150.0; 5]);
        values
    }

    #[test]
    fn test_window_baseline() {
        let baseline = WindowBaseline::from_window(&[100.0, 100.0, 100.0, 100.0, 150.0]);
        assert_eq!(baseline.mean, 110.0);
        // Population stddev 20 over mean 110
        assert!((baseline.cv - 20.0 / 110.0).abs() < 1e-4);
        assert!((baseline.deviation_percent(150.0) - 400.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_mean_window_is_not_a_deviation() {
        let baseline = WindowBaseline::from_window(&[0.0, 0.0, 0.0]);
        assert_eq!(baseline.cv, 0.0);
        assert_eq!(baseline.deviation_percent(25.0), 0.0);
    }

    /// A 100 -> 150 step flags the first three shifted runs
    ///
    /// Later shifted runs are compared with windows that already contain the
    /// new level: run-19 deviates 15.4% against a threshold near 23.8, and the
    /// composite can never exceed 1.5x the deviation.
    #[test]
    fn test_step_flags_first_shifted_runs() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&step_values()), &options(5, 20.0));
        let analysis = detector.analysis();

        assert_eq!(analysis.scored_runs, 15);
        let flagged: Vec<&str> = analysis.flagged.iter().map(|f| f.run_id.as_str()).collect();
        assert_eq!(flagged, vec!["run-16", "run-17", "run-18"]);
        assert!(analysis
            .flagged
            .iter()
            .all(|f| f.verdict == Verdict::Regression && f.composite_score > f.threshold));

        let first = &analysis.flagged[0];
        assert_eq!(first.index, 15);
        assert_eq!(first.contributors[0].baseline, 100.0);
        assert!((first.contributors[0].deviation_percent - 50.0).abs() < 1e-9);
        assert!((first.threshold - 20.0).abs() < 1e-6);

        // Windows of the later runs already hold shifted values
        assert_eq!(analysis.flagged[1].contributors[0].baseline, 110.0);
        assert_eq!(analysis.flagged[2].contributors[0].baseline, 120.0);
        assert!(detector.has_regression());
    }

    #[test]
    fn test_runs_before_window_never_flagged() {
        // Wild values inside the first window have no baseline
        let mut values = vec![1.0, 500.0, 3.0, 900.0, 2.0];
        values.extend(vec![100.0; 10]);
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&values), &options(5, 10.0));

        assert!(detector.analysis().flagged.iter().all(|f| f.index >= 5));
    }

    #[test]
    fn test_constant_series_has_no_anomalies() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&[100.0; 20]), &options(5, 0.0));

        assert!(detector.analysis().flagged.is_empty());
        assert!(!detector.has_regression());
    }

    #[test]
    fn test_drop_in_throughput_is_regression() {
        let mut values = vec![1000.0; 12];
        values.push(400.0);
        values.extend(vec![1000.0; 4]);
        let rows: Vec<Vec<(&str, f64)>> = values.iter().map(|v| vec![("throughput", *v)]).collect();

        let test = test_spec(&[("throughput", Direction::HigherIsBetter, None)]);
        let detector = detect(&test, &dataset(&rows), &options(5, 20.0));

        let flagged = &detector.analysis().flagged;
        let dip = flagged.iter().find(|f| f.index == 12).expect("dip flagged");
        assert_eq!(dip.verdict, Verdict::Regression);
        assert!((dip.contributors[0].deviation_percent + 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_drop_is_improvement() {
        let mut values = vec![100.0; 12];
        values.push(40.0);
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&values), &options(5, 20.0));

        let dip = &detector.analysis().flagged[0];
        assert_eq!(dip.index, 12);
        assert_eq!(dip.verdict, Verdict::Improvement);
        assert!(!detector.has_regression());
    }

    #[test]
    fn test_contributors_ranked_by_weighted_deviation() {
        let mut rows: Vec<Vec<(&str, f64)>> = (0..12)
            .map(|_| vec![("cpu", 50.0), ("latency", 10.0)])
            .collect();
        rows.push(vec![("cpu", 60.0), ("latency", 30.0)]);

        let test = test_spec(&[
            ("cpu", Direction::LowerIsBetter, Some(0.5)),
            ("latency", Direction::LowerIsBetter, Some(0.5)),
        ]);
        let detector = detect(&test, &dataset(&rows), &options(5, 10.0));

        let run = &detector.analysis().flagged[0];
        let names: Vec<&str> = run.contributors.iter().map(|c| c.metric.as_str()).collect();
        assert_eq!(names, vec!["latency", "cpu"]);
        // 0.5 * 200% and 0.5 * 20%
        assert!((run.contributors[0].contribution - 100.0).abs() < 1e-9);
        assert!((run.contributors[1].contribution - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_metric_ignored() {
        let mut rows: Vec<Vec<(&str, f64)>> = (0..12)
            .map(|_| vec![("cpu", 50.0), ("latency", 10.0)])
            .collect();
        rows.push(vec![("cpu", 50.0), ("latency", 100.0)]);

        let test = test_spec(&[
            ("cpu", Direction::LowerIsBetter, Some(1.0)),
            ("latency", Direction::LowerIsBetter, Some(0.0)),
        ]);
        let detector = detect(&test, &dataset(&rows), &options(5, 10.0));
        assert!(detector.analysis().flagged.is_empty());
    }

    #[test]
    fn test_single_run_is_insufficient() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let metrics = MetricsConfig::from_test(&test).unwrap();
        let result =
            IsolationForestWeightedMean::new(&single(&[1.0]), &test, &options(5, 10.0), &metrics);
        assert!(matches!(
            result,
            Err(DetectionError::InsufficientData { actual: 1, .. })
        ));
    }

    #[test]
    fn test_window_longer_than_history() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&[1.0, 50.0, 2.0]), &options(5, 10.0));
        assert_eq!(detector.analysis().scored_runs, 0);
        assert!(detector.analysis().flagged.is_empty());
    }

    #[test]
    fn test_same_seed_same_report() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let data = single(&[10.0, 11.0, 9.5, 10.2, 30.0, 10.1, 9.9, 10.4, 25.0, 10.0, 9.8]);
        let opts = options(3, 10.0);

        let a = detect(&test, &data, &opts).output_json().unwrap().1;
        let b = detect(&test, &data, &opts).output_json().unwrap().1;
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_text_output_lists_flagged_runs() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&step_values()), &options(5, 20.0));

        let (name, text) = detector.output_text();
        assert_eq!(name, "node-density");
        assert!(text.contains("run-16"));
        assert!(text.contains("+50.0%"));
        assert!(text.contains("regression"));
    }

    #[test]
    fn test_text_output_without_anomalies() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&[100.0; 10]), &options(5, 20.0));
        let (_, text) = detector.output_text();
        assert!(text.contains("No anomalous runs detected"));
    }

    #[test]
    fn test_json_output_shape() {
        let test = test_spec(&[("duration", Direction::LowerIsBetter, None)]);
        let detector = detect(&test, &single(&step_values()), &options(5, 20.0));
        let (_, json) = detector.output_json().unwrap();

        assert_eq!(json["algorithm"], "anomaly");
        assert_eq!(json["window"], 5);
        assert_eq!(json["flagged"][0]["run_id"], "run-16");
        assert_eq!(json["flagged"][0]["contributors"][0]["metric"], "duration");
    }
}
