//! Isolation Forest for outlier scoring of run deviation vectors
//!
//! Isolation Forest isolates anomalies by randomly partitioning the feature space.
//! Anomalies are easier to isolate (shorter paths in trees) compared to normal points.
//!
//! All randomness comes from a caller-supplied seeded [`StdRng`], so the same
//! samples and seed always produce the same scores.
//!
//! # References
//!
//! Liu, F. T., Ting, K. M., & Zhou, Z. H. (2008). Isolation forest.
//! In 2008 Eighth IEEE International Conference on Data Mining (pp. 413-422).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Score of a point the forest cannot tell apart from the rest
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Isolation Forest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Number of trees in the ensemble
    pub num_trees: usize,
    /// Sub-sampling size per tree (following original paper)
    pub subsample_size: usize,
    /// Seed for the random source
    pub seed: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            subsample_size: 256,
            seed: 42,
        }
    }
}

impl IsolationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.num_trees == 0 {
            return Err("anomaly.num_trees must be >= 1".to_string());
        }
        if self.subsample_size < 2 {
            return Err(format!(
                "anomaly.subsample_size must be >= 2, got {}",
                self.subsample_size
            ));
        }
        Ok(())
    }

    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

/// A node in an Isolation Tree
#[derive(Debug, Clone)]
enum IsolationNode {
    /// Internal node with split feature and threshold
    Internal {
        feature_idx: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    /// Leaf node with sample count (for path length calculation)
    Leaf { size: usize },
}

impl IsolationNode {
    /// Calculate path length from root to this node for a given sample
    fn path_length(&self, sample: &[f64], current_depth: usize) -> f64 {
        match self {
            IsolationNode::Internal {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if sample[*feature_idx] < *threshold {
                    left.path_length(sample, current_depth + 1)
                } else {
                    right.path_length(sample, current_depth + 1)
                }
            }
            IsolationNode::Leaf { size } => {
                // Add average path length for unresolved instances
                current_depth as f64 + average_path_length(*size)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over n samples
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    // Harmonic number approximation: H(n-1) ≈ ln(n-1) + γ
    const EULER_GAMMA: f64 = 0.5772156649;
    2.0 * (((n - 1) as f64).ln() + EULER_GAMMA) - 2.0 * (n - 1) as f64 / n as f64
}

/// Single Isolation Tree
#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn build(samples: &[&[f64]], max_depth: usize, rng: &mut StdRng) -> Self {
        IsolationTree {
            root: Self::build_node(samples, 0, max_depth, rng),
        }
    }

    fn build_node(
        samples: &[&[f64]],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> IsolationNode {
        if depth >= max_depth || samples.len() <= 1 {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        // All samples are identical - nothing left to isolate
        if samples.windows(2).all(|w| w[0] == w[1]) {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        // Only split on features that still vary, otherwise random picks of a
        // constant feature would end the branch early
        let num_features = samples[0].len();
        let varying: Vec<(usize, f64, f64)> = (0..num_features)
            .filter_map(|feature_idx| {
                let (min_val, max_val) = samples.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), sample| (lo.min(sample[feature_idx]), hi.max(sample[feature_idx])),
                );
                (max_val - min_val > f64::EPSILON).then_some((feature_idx, min_val, max_val))
            })
            .collect();

        let Some(&(feature_idx, min_val, max_val)) = varying.choose(rng) else {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        };

        let threshold = rng.gen_range(min_val..max_val);

        let (left_samples, right_samples): (Vec<&[f64]>, Vec<&[f64]>) = samples
            .iter()
            .copied()
            .partition(|sample| sample[feature_idx] < threshold);

        if left_samples.is_empty() || right_samples.is_empty() {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        let left = Box::new(Self::build_node(&left_samples, depth + 1, max_depth, rng));
        let right = Box::new(Self::build_node(&right_samples, depth + 1, max_depth, rng));

        IsolationNode::Internal {
            feature_idx,
            threshold,
            left,
            right,
        }
    }

    fn path_length(&self, sample: &[f64]) -> f64 {
        self.root.path_length(sample, 0)
    }
}

/// Isolation Forest - ensemble of Isolation Trees
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    num_trees: usize,
    subsample_size: usize,
    /// Sub-sample size actually used when fitting (bounded by sample count)
    fitted_size: usize,
}

impl IsolationForest {
    pub fn new(config: &IsolationConfig) -> Self {
        IsolationForest {
            trees: Vec::new(),
            num_trees: config.num_trees,
            subsample_size: config.subsample_size,
            fitted_size: 0,
        }
    }

    /// Fit the model on training data
    pub fn fit(&mut self, samples: &[Vec<f64>], rng: &mut StdRng) {
        self.trees.clear();
        self.fitted_size = self.subsample_size.min(samples.len());
        if self.fitted_size < 2 {
            return;
        }

        let max_depth = (self.fitted_size as f64).log2().ceil() as usize;
        let mut indices: Vec<usize> = (0..samples.len()).collect();

        for _ in 0..self.num_trees {
            indices.shuffle(rng);
            let subsamples: Vec<&[f64]> = indices[..self.fitted_size]
                .iter()
                .map(|&i| samples[i].as_slice())
                .collect();

            self.trees
                .push(IsolationTree::build(&subsamples, max_depth, rng));
        }
    }

    /// Anomaly score in [0, 1]; close to 1 is anomalous, 0.5 is normal
    ///
    /// An unfitted forest (fewer than two samples) scores every point 0.5.
    pub fn anomaly_score(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return NEUTRAL_SCORE;
        }

        let avg_path_length: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample))
            .sum::<f64>()
            / self.trees.len() as f64;

        // Normalize by expected path length
        let c = average_path_length(self.fitted_size);
        2_f64.powf(-avg_path_length / c)
    }
}

/// Fit a forest on `samples` and score each of them
pub fn score_samples(samples: &[Vec<f64>], config: &IsolationConfig) -> Vec<f64> {
    let mut rng = config.rng();
    let mut forest = IsolationForest::new(config);
    forest.fit(samples, &mut rng);
    samples.iter().map(|s| forest.anomaly_score(s)).collect()
}
