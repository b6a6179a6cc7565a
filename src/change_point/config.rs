// Configuration for change-point significance testing
//
// The significance method is an explicit choice: an exact permutation test
// (default) or a fixed calibrated threshold on the divergence statistic.

use serde::{Deserialize, Serialize};

/// Largest accepted `min_segment_size`
pub const MAX_SEGMENT_SIZE: usize = 10_000;

fn default_permutations() -> usize {
    199
}

fn default_alpha() -> f64 {
    0.05
}

fn default_seed() -> u64 {
    42
}

fn default_statistic() -> f64 {
    12.0
}

/// How a candidate split is judged significant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum Significance {
    /// Compare the observed statistic against best-split statistics of
    /// shuffled copies of the segment
    ///
    /// p-value = (1 + #{shuffled >= observed}) / (1 + permutations)
    Permutation {
        #[serde(default = "default_permutations")]
        permutations: usize,
        /// Accept the split when p <= alpha
        #[serde(default = "default_alpha")]
        alpha: f64,
        /// Seed of the shuffling random source
        #[serde(default = "default_seed")]
        seed: u64,
    },

    /// Accept the split when the statistic exceeds a fixed value
    ///
    /// The statistic is `n * SSB / SST` of the best split, the squared
    /// standardized mean shift. Under no change its maximum over splits
    /// stays below 12 in roughly 99% of noise-only series of up to a few
    /// hundred runs.
    Threshold {
        #[serde(default = "default_statistic")]
        statistic: f64,
    },
}

impl Default for Significance {
    fn default() -> Self {
        Significance::Permutation {
            permutations: default_permutations(),
            alpha: default_alpha(),
            seed: default_seed(),
        }
    }
}

impl Significance {
    /// Seed of the random source (unused by the threshold method)
    pub fn seed(&self) -> u64 {
        match self {
            Significance::Permutation { seed, .. } => *seed,
            Significance::Threshold { .. } => default_seed(),
        }
    }
}

/// Configuration for change-point detection
///
/// # Example
/// ```
/// use orion::change_point::{ChangePointConfig, Significance};
///
/// let config = ChangePointConfig::default();
/// assert_eq!(config.min_segment_size, 3);
/// assert!(matches!(config.significance, Significance::Permutation { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangePointConfig {
    pub significance: Significance,

    /// Minimum number of runs on each side of a split
    ///
    /// Keeps the recursion from carving single noisy runs into their own
    /// segments. A shift in the last `min_segment_size - 1` runs is not
    /// reported until more runs arrive.
    pub min_segment_size: usize,
}

impl Default for ChangePointConfig {
    fn default() -> Self {
        Self {
            significance: Significance::default(),
            min_segment_size: 3,
        }
    }
}

impl ChangePointConfig {
    /// Threshold-based configuration with the calibrated default statistic
    pub fn threshold() -> Self {
        Self {
            significance: Significance::Threshold {
                statistic: default_statistic(),
            },
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_segment_size == 0 {
            return Err("change_point.min_segment_size must be >= 1".to_string());
        }
        if self.min_segment_size > MAX_SEGMENT_SIZE {
            return Err(format!(
                "change_point.min_segment_size must be <= {}, got {}",
                MAX_SEGMENT_SIZE, self.min_segment_size
            ));
        }

        match &self.significance {
            Significance::Permutation {
                permutations,
                alpha,
                ..
            } => {
                if *permutations == 0 {
                    return Err("change_point.permutations must be >= 1".to_string());
                }
                if !(*alpha > 0.0 && *alpha < 1.0) {
                    return Err(format!(
                        "change_point.alpha must be in (0, 1), got {}",
                        alpha
                    ));
                }
            }
            Significance::Threshold { statistic } => {
                if !(statistic.is_finite() && *statistic > 0.0) {
                    return Err(format!(
                        "change_point.statistic must be positive, got {}",
                        statistic
                    ));
                }
            }
        }

        Ok(())
    }
}
