// Divisive change-point search
//
// Splits a series at the index maximizing the standardized mean shift, keeps
// the split if it is significant, and recurses on both halves. Pure function
// of the series and the configuration: the only randomness is a StdRng seeded
// from the configuration and consumed in a fixed order.

use crate::change_point::config::{ChangePointConfig, Significance};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Relative tolerance under which a segment counts as constant
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-9;

/// An accepted boundary: the new segment starts at `index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePoint {
    pub index: usize,
    /// Divergence statistic of the split within its parent segment
    pub statistic: f64,
    /// Permutation p-value (threshold method leaves this empty)
    pub p_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Split {
    index: usize,
    statistic: f64,
}

/// Best split of a segment by `n * SSB / SST`
///
/// `SSB = n1 * n2 / n * (mean_left - mean_right)^2` is the between-segment
/// sum of squares and `SST` the total sum of squares, so the statistic lies in
/// `[0, n]` and does not depend on the scale of the metric. Returns `None` for
/// constant segments or segments too short to split.
fn best_split(segment: &[f64], min_segment_size: usize) -> Option<Split> {
    let n = segment.len();
    if n < min_segment_size.saturating_mul(2) {
        return None;
    }

    let total: f64 = segment.iter().sum();
    let mean = total / n as f64;
    let sst: f64 = segment.iter().map(|x| (x - mean).powi(2)).sum();

    let scale = segment.iter().fold(0.0_f64, |acc, x| acc.max(x.abs())).max(1.0);
    if sst <= n as f64 * (ZERO_VARIANCE_TOLERANCE * scale).powi(2) {
        return None;
    }

    let mut best: Option<Split> = None;
    let mut left_sum: f64 = segment[..min_segment_size - 1].iter().sum();

    for j in min_segment_size..=n - min_segment_size {
        left_sum += segment[j - 1];
        let n1 = j as f64;
        let n2 = (n - j) as f64;
        let diff = left_sum / n1 - (total - left_sum) / n2;
        let ssb = n1 * n2 / n as f64 * diff * diff;
        let statistic = n as f64 * ssb / sst;

        if best.map_or(true, |b| statistic > b.statistic) {
            best = Some(Split {
                index: j,
                statistic,
            });
        }
    }

    best
}

fn permutation_p_value(
    segment: &[f64],
    observed: f64,
    min_segment_size: usize,
    permutations: usize,
    rng: &mut StdRng,
) -> f64 {
    let mut shuffled = segment.to_vec();
    let cutoff = observed * (1.0 - ZERO_VARIANCE_TOLERANCE);

    let mut extreme = 0usize;
    for _ in 0..permutations {
        shuffled.shuffle(rng);
        let statistic = best_split(&shuffled, min_segment_size).map_or(0.0, |s| s.statistic);
        if statistic >= cutoff {
            extreme += 1;
        }
    }

    (1 + extreme) as f64 / (1 + permutations) as f64
}

fn split_segment(
    segment: &[f64],
    offset: usize,
    config: &ChangePointConfig,
    rng: &mut StdRng,
    found: &mut Vec<ChangePoint>,
) {
    let Some(split) = best_split(segment, config.min_segment_size) else {
        return;
    };

    let p_value = match &config.significance {
        Significance::Threshold { statistic } => {
            if split.statistic <= *statistic {
                return;
            }
            None
        }
        Significance::Permutation {
            permutations,
            alpha,
            ..
        } => {
            let p = permutation_p_value(
                segment,
                split.statistic,
                config.min_segment_size,
                *permutations,
                rng,
            );
            if p > *alpha {
                return;
            }
            Some(p)
        }
    };

    found.push(ChangePoint {
        index: offset + split.index,
        statistic: split.statistic,
        p_value,
    });

    split_segment(&segment[..split.index], offset, config, rng, found);
    split_segment(
        &segment[split.index..],
        offset + split.index,
        config,
        rng,
        found,
    );
}

/// Find all significant change points of a series, sorted by index
///
/// # Example
/// ```
/// use orion::change_point::{find_change_points, ChangePointConfig};
///
/// let mut series = vec![100.0; 15];
/// series.extend(vec![150.0; 5]);
///
/// let points = find_change_points(series, &ChangePointConfig::default());
/// assert_eq!(points.len(), 1);
/// assert_eq!(points[0].index, 15);
/// ```
pub fn find_change_points(series: Vec<f64>, config: &ChangePointConfig) -> Vec<ChangePoint> {
    let mut rng = StdRng::seed_from_u64(config.significance.seed());
    let mut found = Vec::new();

    if config.min_segment_size > 0 {
        split_segment(&series, 0, config, &mut rng, &mut found);
    }

    found.sort_by_key(|cp| cp.index);
    found
}
