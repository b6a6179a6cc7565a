//! Test configuration and run options
//!
//! The TOML file lists the tests to evaluate and the detector tuning; the
//! [`Options`] bag carries the per-invocation choices (detection kind,
//! lookback, output format). Both are loaded once and never mutated.
//!
//! # Example
//! ```
//! use orion::config::OrionConfig;
//!
//! let config = OrionConfig::from_toml_str(r#"
//! [datasource]
//! location = "./runs"
//!
//! [[tests]]
//! name = "cluster-density"
//! index = "ripsaw-kube-burner"
//! [[tests.metrics]]
//! name = "podReadyLatency"
//! direction = "lower-is-better"
//! "#).unwrap();
//! assert_eq!(config.tests.len(), 1);
//! ```

use crate::algorithm::{AlgorithmKind, OutputFormat};
use crate::change_point::ChangePointConfig;
use crate::error::{DetectionError, Result};
use crate::isolation_forest::IsolationConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Tolerance for per-test metric weights summing to one
const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Which way a metric moves when performance gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Throughput-like metrics: a decrease is a regression
    HigherIsBetter,
    /// Latency-like metrics: an increase is a regression
    LowerIsBetter,
}

impl Direction {
    /// Sign of a change that makes the metric worse
    pub fn worse_sign(self) -> f64 {
        match self {
            Direction::HigherIsBetter => -1.0,
            Direction::LowerIsBetter => 1.0,
        }
    }

    /// Whether moving by `delta` is a change for the worse
    pub fn is_worse(self, delta: f64) -> bool {
        delta * self.worse_sign() > 0.0
    }
}

/// One metric tracked by a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub direction: Direction,
    /// Weight in the anomaly composite score (unweighted metrics share the rest)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// A named test backed by one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    /// Backing index identifier the runs are fetched from
    pub index: String,
    pub metrics: Vec<MetricSpec>,
}

/// Location of the backing store, passed explicitly to the dataset source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub location: PathBuf,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            location: PathBuf::from("."),
        }
    }
}

/// Tuning shared by every test of one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorTuning {
    pub change_point: ChangePointConfig,
    pub anomaly: IsolationConfig,
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrionConfig {
    #[serde(default)]
    pub datasource: DataSourceConfig,

    #[serde(default)]
    pub change_point: ChangePointConfig,

    #[serde(default)]
    pub anomaly: IsolationConfig,

    pub tests: Vec<TestSpec>,
}

impl OrionConfig {
    /// Load and validate a TOML configuration file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    /// Parse and validate TOML configuration text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: OrionConfig =
            toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    pub fn tuning(&self) -> DetectorTuning {
        DetectorTuning {
            change_point: self.change_point.clone(),
            anomaly: self.anomaly.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.tests.is_empty() {
            return Err("at least one test must be configured".to_string());
        }

        let mut names = HashSet::new();
        for test in &self.tests {
            if !names.insert(test.name.as_str()) {
                return Err(format!("duplicate test name '{}'", test.name));
            }
            if test.metrics.is_empty() {
                return Err(format!("test '{}' has no metrics", test.name));
            }
            let mut metrics = HashSet::new();
            for metric in &test.metrics {
                if !metrics.insert(metric.name.as_str()) {
                    return Err(format!(
                        "duplicate metric '{}' in test '{}'",
                        metric.name, test.name
                    ));
                }
            }
        }

        self.change_point.validate()?;
        self.anomaly.validate()?;
        Ok(())
    }
}

/// Resolved configuration of one metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricConfig {
    pub name: String,
    pub direction: Direction,
    pub weight: f64,
}

/// Per-test metric configuration with weights resolved to sum to one
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    metrics: Vec<MetricConfig>,
}

impl MetricsConfig {
    /// Resolve weights for a test
    ///
    /// Unweighted metrics share whatever mass the explicit weights leave,
    /// so a test with no weights gets a uniform split.
    pub fn from_test(test: &TestSpec) -> Result<Self> {
        let invalid = |msg: String| DetectionError::Config(format!("test '{}': {}", test.name, msg));

        if test.metrics.is_empty() {
            return Err(invalid("no metrics configured".to_string()));
        }

        let mut explicit = 0.0;
        let mut unweighted = 0usize;
        for metric in &test.metrics {
            match metric.weight {
                Some(w) if !w.is_finite() || w < 0.0 => {
                    return Err(invalid(format!(
                        "weight for '{}' must be a non-negative number, got {}",
                        metric.name, w
                    )));
                }
                Some(w) => explicit += w,
                None => unweighted += 1,
            }
        }

        let remaining = 1.0 - explicit;
        if unweighted == 0 && remaining.abs() > WEIGHT_TOLERANCE {
            return Err(invalid(format!("metric weights must sum to 1, got {}", explicit)));
        }
        if remaining < -WEIGHT_TOLERANCE {
            return Err(invalid(format!("metric weights exceed 1 ({})", explicit)));
        }

        let share = if unweighted > 0 {
            remaining.max(0.0) / unweighted as f64
        } else {
            0.0
        };

        Ok(Self {
            metrics: test
                .metrics
                .iter()
                .map(|m| MetricConfig {
                    name: m.name.clone(),
                    direction: m.direction,
                    weight: m.weight.unwrap_or(share),
                })
                .collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricConfig> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Per-invocation options
///
/// `kind` is a single required field, so "both detectors" or "neither" cannot
/// be expressed.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Trailing window in days; `None` considers every fetched run
    pub lookback_days: Option<u32>,
    pub kind: AlgorithmKind,
    /// Runs in the trailing moving average of the anomaly detector
    pub anomaly_window: usize,
    /// Minimum composite deviation (percent) for a run to be flagged
    pub min_anomaly_percent: f64,
    pub output_format: OutputFormat,
    /// Run anchoring the end of the comparison window
    pub uuid: Option<String>,
    /// Baseline runs to compare `uuid` against
    pub baseline: Vec<String>,
    pub tuning: DetectorTuning,
}

impl Options {
    pub const DEFAULT_ANOMALY_WINDOW: usize = 5;
    pub const DEFAULT_MIN_ANOMALY_PERCENT: f64 = 10.0;

    pub fn new(kind: AlgorithmKind) -> Self {
        Self {
            lookback_days: None,
            kind,
            anomaly_window: Self::DEFAULT_ANOMALY_WINDOW,
            min_anomaly_percent: Self::DEFAULT_MIN_ANOMALY_PERCENT,
            output_format: OutputFormat::Text,
            uuid: None,
            baseline: Vec::new(),
            tuning: DetectorTuning::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.anomaly_window == 0 {
            return Err(DetectionError::Config(
                "anomaly_window must be >= 1".to_string(),
            ));
        }
        if !self.min_anomaly_percent.is_finite() || self.min_anomaly_percent < 0.0 {
            return Err(DetectionError::Config(format!(
                "min_anomaly_percent must be non-negative, got {}",
                self.min_anomaly_percent
            )));
        }
        self.tuning
            .change_point
            .validate()
            .map_err(DetectionError::Config)?;
        self.tuning.anomaly.validate().map_err(DetectionError::Config)?;
        Ok(())
    }
}
