//! Run records and per-metric series
//!
//! A [`RunDataset`] is the ordered table of benchmark runs fetched for one
//! test. Metric values are kept as raw JSON so that a missing or non-numeric
//! value is reported as a malformed record instead of being coerced.

use crate::error::{DetectionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One executed benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier (e.g. a job UUID)
    pub run_id: String,
    /// Run start time in Unix seconds
    pub timestamp: i64,
    /// Metric name → raw value
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl RunRecord {
    /// Create a run with numeric metrics
    pub fn new(run_id: impl Into<String>, timestamp: i64, metrics: &[(&str, f64)]) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp,
            metrics: metrics
                .iter()
                .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
                .collect(),
        }
    }

    /// Numeric value of a metric, `None` when the run does not carry it
    pub fn metric(&self, metric: &str) -> Result<Option<f64>> {
        let Some(raw) = self.metrics.get(metric) else {
            return Ok(None);
        };
        if raw.is_null() {
            return Ok(None);
        }

        match raw.as_f64() {
            Some(value) if value.is_finite() => Ok(Some(value)),
            Some(value) => Err(self.malformed(metric, format!("non-finite value {}", value))),
            None => Err(self.malformed(metric, format!("non-numeric value {}", raw))),
        }
    }

    fn malformed(&self, metric: &str, reason: String) -> DetectionError {
        DetectionError::MalformedRunRecord {
            test: None,
            run_id: self.run_id.clone(),
            metric: metric.to_string(),
            reason,
        }
    }
}

/// Ordered runs for a single test
#[derive(Debug, Clone)]
pub struct RunDataset {
    runs: Vec<RunRecord>,
    window_start: Option<i64>,
}

impl RunDataset {
    /// Build a dataset, sorting runs by timestamp
    ///
    /// # Errors
    /// Returns `MalformedRunRecord` if two runs share an identifier.
    pub fn new(mut runs: Vec<RunRecord>, window_start: Option<i64>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(runs.len());
        for run in &runs {
            if !seen.insert(run.run_id.as_str()) {
                return Err(DetectionError::MalformedRunRecord {
                    test: None,
                    run_id: run.run_id.clone(),
                    metric: String::new(),
                    reason: "duplicate run identifier".to_string(),
                });
            }
        }

        runs.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });

        Ok(Self { runs, window_start })
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Start of the lookback window the runs were fetched for
    pub fn window_start(&self) -> Option<i64> {
        self.window_start
    }

    /// Whether the run at `index` falls inside the lookback window
    pub fn in_window(&self, index: usize) -> bool {
        match (self.window_start, self.runs.get(index)) {
            (Some(start), Some(run)) => run.timestamp >= start,
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }

    /// Extract one metric aligned to run order
    pub fn series(&self, metric: &str) -> Result<MetricSeries> {
        let values = self
            .runs
            .iter()
            .map(|run| run.metric(metric))
            .collect::<Result<Vec<_>>>()?;

        Ok(MetricSeries {
            metric: metric.to_string(),
            values,
        })
    }
}

/// Values of one metric in run order; gaps are explicit
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub metric: String,
    pub values: Vec<Option<f64>>,
}

impl MetricSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Dense values, failing on the first run that lacks the metric
    pub fn require_complete(&self, dataset: &RunDataset) -> Result<Vec<f64>> {
        self.values
            .iter()
            .zip(dataset.runs())
            .map(|(value, run)| {
                value.ok_or_else(|| DetectionError::MalformedRunRecord {
                    test: None,
                    run_id: run.run_id.clone(),
                    metric: self.metric.clone(),
                    reason: "metric missing".to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(id: &str, ts: i64, value: serde_json::Value) -> RunRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert("duration".to_string(), value);
        RunRecord {
            run_id: id.to_string(),
            timestamp: ts,
            metrics,
        }
    }

    #[test]
    fn test_dataset_sorted_by_timestamp() {
        let dataset = RunDataset::new(
            vec![run("b", 20, json!(2.0)), run("a", 10, json!(1.0))],
            None,
        )
        .unwrap();

        let ids: Vec<_> = dataset.runs().iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_run_id_rejected() {
        let result = RunDataset::new(
            vec![run("a", 10, json!(1.0)), run("a", 20, json!(2.0))],
            None,
        );
        assert!(matches!(
            result,
            Err(DetectionError::MalformedRunRecord { .. })
        ));
    }

    #[test]
    fn test_series_keeps_gaps() {
        let mut missing = run("b", 20, json!(0.0));
        missing.metrics.clear();
        let dataset =
            RunDataset::new(vec![run("a", 10, json!(1.5)), missing], None).unwrap();

        let series = dataset.series("duration").unwrap();
        assert_eq!(series.values, vec![Some(1.5), None]);

        match series.require_complete(&dataset) {
            Err(DetectionError::MalformedRunRecord { run_id, metric, .. }) => {
                assert_eq!(run_id, "b");
                assert_eq!(metric, "duration");
            }
            other => panic!("Expected MalformedRunRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_value_is_malformed() {
        let dataset = RunDataset::new(vec![run("a", 10, json!("fast"))], None).unwrap();
        assert!(matches!(
            dataset.series("duration"),
            Err(DetectionError::MalformedRunRecord { .. })
        ));
    }

    #[test]
    fn test_in_window() {
        let dataset = RunDataset::new(
            vec![run("a", 10, json!(1.0)), run("b", 20, json!(1.0))],
            Some(15),
        )
        .unwrap();
        assert!(!dataset.in_window(0));
        assert!(dataset.in_window(1));
        assert!(!dataset.in_window(2));
    }

    #[test]
    fn test_run_record_from_json() {
        let record: RunRecord = serde_json::from_str(
            r#"{"run_id": "uuid-1", "timestamp": 1700000000, "metrics": {"p99": 12.5}}"#,
        )
        .unwrap();
        assert_eq!(record.metric("p99").unwrap(), Some(12.5));
        assert_eq!(record.metric("p50").unwrap(), None);
    }
}
