//! Maps a detection kind to a detector instance

use super::{AlgorithmKind, Detector};
use crate::anomaly::IsolationForestWeightedMean;
use crate::change_point::EDivisive;
use crate::config::{MetricsConfig, Options, TestSpec};
use crate::dataset::RunDataset;
use crate::error::Result;

/// Chooses and constructs the detector for a test
///
/// Construction runs the detection pass, so errors from the data (missing
/// metrics, too few runs) surface here.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlgorithmFactory;

impl AlgorithmFactory {
    pub fn instantiate(
        &self,
        kind: AlgorithmKind,
        dataset: &RunDataset,
        test: &TestSpec,
        options: &Options,
        metrics: &MetricsConfig,
    ) -> Result<Detector> {
        tracing::debug!(test = %test.name, %kind, runs = dataset.len(), "instantiating detector");
        match kind {
            AlgorithmKind::ChangePoint => Ok(Detector::ChangePoint(EDivisive::new(
                dataset, test, options, metrics,
            )?)),
            AlgorithmKind::Anomaly => Ok(Detector::Anomaly(IsolationForestWeightedMean::new(
                dataset, test, options, metrics,
            )?)),
        }
    }

    /// Same as [`instantiate`](Self::instantiate) with the kind given by name
    ///
    /// # Errors
    /// `InvalidAlgorithmKind` when `kind` names no known detector.
    pub fn instantiate_named(
        &self,
        kind: &str,
        dataset: &RunDataset,
        test: &TestSpec,
        options: &Options,
        metrics: &MetricsConfig,
    ) -> Result<Detector> {
        self.instantiate(kind.parse()?, dataset, test, options, metrics)
    }
}
