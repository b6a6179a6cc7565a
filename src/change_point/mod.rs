// Change-Point Detection over Benchmark Run History
//
// Detects sustained level shifts in metric series with divisive
// segmentation: split the series where the standardized mean shift is
// largest, keep the split when it is significant, recurse on both halves.
//
// Scientific Foundation:
// [1] Matteson, D. S., & James, N. A. (2014). A nonparametric approach for
//     multiple change point analysis of multivariate data. JASA, 109(505).
//     Divisive estimation with permutation-based significance.
//
// [2] Daly, D., Brown, W., Ingo, H., O'Leary, J., & Bradford, D. (2020).
//     The use of change point detection to identify software performance
//     regressions in a continuous integration system. ICPE.
//
// Significance is configuration, never a hard-coded constant: either an
// exact permutation test with a seeded random source, or a fixed threshold.

mod config;
mod detector;
mod search;

pub use config::{ChangePointConfig, Significance};
pub use detector::{
    ChangePointAnalysis, ChangePointDetail, EDivisive, MetricChangeReport, RunRow,
};
pub use search::{find_change_points, ChangePoint};
