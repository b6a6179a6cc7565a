//! Detection algorithm abstraction
//!
//! Every detector runs its detection pass once, when it is constructed, and
//! then renders the stored result either as structured JSON or as a text
//! table. The set of detectors is closed: [`Detector`] has one variant per
//! detection theory and every dispatch over it is exhaustive.

mod factory;

pub use factory::AlgorithmFactory;

use crate::anomaly::IsolationForestWeightedMean;
use crate::change_point::EDivisive;
use crate::config::Direction;
use crate::error::{DetectionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detection theory requested for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmKind {
    /// E-divisive style change-point detection
    ChangePoint,
    /// Isolation forest combined with weighted moving-average deviation
    Anomaly,
}

impl FromStr for AlgorithmKind {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "change-point" | "changepoint" | "edivisive" | "hunter" => Ok(Self::ChangePoint),
            "anomaly" | "anomaly-detection" | "isolation-forest" => Ok(Self::Anomaly),
            _ => Err(DetectionError::InvalidAlgorithmKind(s.to_string())),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::ChangePoint => write!(f, "change-point"),
            AlgorithmKind::Anomaly => write!(f, "anomaly"),
        }
    }
}

/// Rendering of a detection result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured JSON
    Json,
    /// Human-readable table
    Text,
}

impl FromStr for OutputFormat {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            _ => Err(DetectionError::UnsupportedOutputFormat(s.to_string())),
        }
    }
}

/// A rendered result, structured or tabular
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Json(serde_json::Value),
    Text(String),
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Json(value) => {
                let text = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
                f.write_str(&text)
            }
            Rendered::Text(text) => f.write_str(text),
        }
    }
}

/// Verdict for a metric or a flagged run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Moved in the worse direction for the metric
    Regression,
    /// Moved in the better direction for the metric
    Improvement,
    NoChange,
    /// Too few runs to evaluate
    InsufficientData,
}

impl Verdict {
    /// Classify a signed change for a metric direction
    pub fn classify(direction: Direction, delta: f64) -> Self {
        if direction.is_worse(delta) {
            Verdict::Regression
        } else if delta != 0.0 {
            Verdict::Improvement
        } else {
            Verdict::NoChange
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Regression => "regression",
            Verdict::Improvement => "improvement",
            Verdict::NoChange => "no change",
            Verdict::InsufficientData => "insufficient data",
        };
        f.write_str(label)
    }
}

/// Common contract of the detectors
pub trait Algorithm {
    /// Name of the test the detector ran for
    fn test_name(&self) -> &str;

    /// Whether any metric (or flagged run) is a regression
    fn has_regression(&self) -> bool;

    /// Structured rendering: `(test name, data)`
    fn output_json(&self) -> Result<(String, serde_json::Value)>;

    /// Tabular rendering: `(test name, table)`
    fn output_text(&self) -> (String, String);

    /// Render in the requested format
    fn output(&self, format: OutputFormat) -> Result<(String, Rendered)> {
        match format {
            OutputFormat::Json => {
                let (name, value) = self.output_json()?;
                Ok((name, Rendered::Json(value)))
            }
            OutputFormat::Text => {
                let (name, table) = self.output_text();
                Ok((name, Rendered::Text(table)))
            }
        }
    }

    /// Render in a format given by name
    ///
    /// # Errors
    /// `UnsupportedOutputFormat` for anything but `json` or `text`.
    fn output_named(&self, format: &str) -> Result<(String, Rendered)> {
        self.output(format.parse()?)
    }
}

/// The detectors known to the factory
#[derive(Debug, Clone)]
pub enum Detector {
    ChangePoint(EDivisive),
    Anomaly(IsolationForestWeightedMean),
}

impl Detector {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Detector::ChangePoint(_) => AlgorithmKind::ChangePoint,
            Detector::Anomaly(_) => AlgorithmKind::Anomaly,
        }
    }
}

impl Algorithm for Detector {
    fn test_name(&self) -> &str {
        match self {
            Detector::ChangePoint(d) => d.test_name(),
            Detector::Anomaly(d) => d.test_name(),
        }
    }

    fn has_regression(&self) -> bool {
        match self {
            Detector::ChangePoint(d) => d.has_regression(),
            Detector::Anomaly(d) => d.has_regression(),
        }
    }

    fn output_json(&self) -> Result<(String, serde_json::Value)> {
        match self {
            Detector::ChangePoint(d) => d.output_json(),
            Detector::Anomaly(d) => d.output_json(),
        }
    }

    fn output_text(&self) -> (String, String) {
        match self {
            Detector::ChangePoint(d) => d.output_text(),
            Detector::Anomaly(d) => d.output_text(),
        }
    }
}
