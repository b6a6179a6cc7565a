//! Error types for regression detection
//!
//! Every failure surfaces to the caller and ends the whole batch. There is no
//! error that degrades into a "no regression" verdict.

use thiserror::Error;

/// Errors raised while loading runs, detecting, or rendering results
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid algorithm kind: {0:?} (expected change-point or anomaly)")]
    InvalidAlgorithmKind(String),

    #[error("Unsupported output format {0:?} (expected json or text)")]
    UnsupportedOutputFormat(String),

    #[error("Insufficient data for test {test}: need at least {required} runs, got {actual}")]
    InsufficientData {
        test: String,
        required: usize,
        actual: usize,
    },

    #[error("Empty dataset returned for test {test}")]
    EmptyDataset { test: String },

    #[error("Malformed run record {run_id} (metric {metric}){}: {reason}", in_test(.test))]
    MalformedRunRecord {
        /// Filled in once the record is attributed to a test
        test: Option<String>,
        run_id: String,
        metric: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to fetch runs for test {test}: {source:#}")]
    Fetch {
        test: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn in_test(test: &Option<String>) -> String {
    test.as_deref()
        .map(|name| format!(" in test {}", name))
        .unwrap_or_default()
}

impl DetectionError {
    /// Test the error is attributed to, if any
    pub fn test_name(&self) -> Option<&str> {
        match self {
            DetectionError::InsufficientData { test, .. }
            | DetectionError::EmptyDataset { test }
            | DetectionError::Fetch { test, .. } => Some(test),
            DetectionError::MalformedRunRecord { test, .. } => test.as_deref(),
            _ => None,
        }
    }

    /// Attribute a record-level error to the test being processed
    pub fn for_test(self, name: &str) -> Self {
        match self {
            DetectionError::MalformedRunRecord {
                test: None,
                run_id,
                metric,
                reason,
            } => DetectionError::MalformedRunRecord {
                test: Some(name.to_string()),
                run_id,
                metric,
                reason,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;
