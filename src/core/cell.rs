//! Per-cell elevation statistics.
//!
//! Each raster cell accumulates the z values observed inside it. The mean
//! and the spread are maintained incrementally (Welford), so a cell can be
//! updated point by point without keeping the samples around. The
//! `variance` field holds the running *sum of squared deviations*; it is
//! converted to a sample variance only on export via [`CellStats::sample_variance`].

use serde::{Deserialize, Serialize};

/// Elevation statistics for one raster cell.
///
/// A cell with `n_points == 0` is empty; all its other fields are zero and
/// carry no meaning. For a non-empty cell `z_min <= z_mean <= z_max` and
/// `variance >= 0` hold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CellStats {
    /// Number of observations folded into this cell.
    pub n_points: u32,
    /// Maximum observed z.
    pub z_max: f32,
    /// Minimum observed z.
    pub z_min: f32,
    /// Running mean of z.
    pub z_mean: f32,
    /// Running sum of squared deviations from the mean.
    pub variance: f32,
    /// Timestamp of the last modification, seconds since the model's time base.
    pub last_update: f32,
}

impl CellStats {
    /// An empty cell.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Has this cell received any observation?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_points == 0
    }

    /// Fold a single observation into the cell.
    ///
    /// Incremental mean and spread updates per Welford (Knuth TAOCP Vol. 2,
    /// section 4.2.2). `t` becomes the cell's `last_update`.
    pub fn fold_point(&mut self, z: f32, t: f32) {
        if self.n_points == 0 {
            self.n_points = 1;
            self.z_max = z;
            self.z_min = z;
            self.z_mean = z;
            self.variance = 0.0;
        } else {
            let n = self.n_points as f32;
            let mean = self.z_mean;
            self.n_points += 1;
            if z > self.z_max {
                self.z_max = z;
            }
            if z < self.z_min {
                self.z_min = z;
            }
            self.z_mean = (mean * n + z) / (n + 1.0);
            self.variance += (z - mean) * (z - self.z_mean);
        }
        self.last_update = t;
    }

    /// Merge another cell's statistics into this one.
    ///
    /// Uses the parallel combination for the sums of squared deviations:
    ///
    /// ```text
    /// V = Vd + Vs + delta^2 * Nd * Ns / (Nd + Ns)
    /// ```
    ///
    /// which makes folding two partial cells equivalent (up to float
    /// rounding) to folding all their points into one cell.
    pub fn fold_cell(&mut self, src: &CellStats) {
        if src.n_points == 0 {
            return;
        }
        if self.n_points == 0 {
            *self = *src;
            return;
        }
        let nd = self.n_points as f32;
        let ns = src.n_points as f32;
        let n = nd + ns;
        let delta = src.z_mean - self.z_mean;
        if src.z_max > self.z_max {
            self.z_max = src.z_max;
        }
        if src.z_min < self.z_min {
            self.z_min = src.z_min;
        }
        self.z_mean = (self.z_mean * nd + src.z_mean * ns) / n;
        self.variance += src.variance + delta * delta * nd * ns / n;
        self.n_points += src.n_points;
        self.last_update = self.last_update.max(src.last_update);
    }

    /// Sample variance of the observed z values.
    ///
    /// Converts the running sum of squared deviations into a sample
    /// variance. Cells with fewer than three observations report 0.
    #[inline]
    pub fn sample_variance(&self) -> f32 {
        if self.n_points > 2 {
            self.variance / (self.n_points - 1) as f32
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::seq::SliceRandom;

    fn fold_all(zs: &[f32]) -> CellStats {
        let mut cell = CellStats::new();
        for &z in zs {
            cell.fold_point(z, 0.0);
        }
        cell
    }

    /// Textbook two-pass sample variance for reference.
    fn textbook_variance(zs: &[f32]) -> f32 {
        let n = zs.len() as f32;
        let mean = zs.iter().sum::<f32>() / n;
        zs.iter().map(|z| (z - mean) * (z - mean)).sum::<f32>() / (n - 1.0)
    }

    #[test]
    fn test_empty_cell() {
        let cell = CellStats::new();
        assert!(cell.is_empty());
        assert_eq!(cell.n_points, 0);
        assert_eq!(cell.sample_variance(), 0.0);
    }

    #[test]
    fn test_fold_single_point() {
        let mut cell = CellStats::new();
        cell.fold_point(2.0, 1.5);

        assert_eq!(cell.n_points, 1);
        assert_eq!(cell.z_min, 2.0);
        assert_eq!(cell.z_max, 2.0);
        assert_eq!(cell.z_mean, 2.0);
        assert_eq!(cell.variance, 0.0);
        assert_eq!(cell.last_update, 1.5);
    }

    #[test]
    fn test_fold_three_points() {
        let cell = fold_all(&[1.0, 2.0, 3.0]);

        assert_eq!(cell.n_points, 3);
        assert_eq!(cell.z_min, 1.0);
        assert_eq!(cell.z_max, 3.0);
        assert_relative_eq!(cell.z_mean, 2.0, epsilon = 1e-6);
        assert_relative_eq!(cell.sample_variance(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_incremental_matches_textbook_variance() {
        let zs = [0.3, -1.2, 4.7, 2.2, 0.0, -0.8, 3.1, 1.9, 2.5, -2.4];
        let cell = fold_all(&zs);

        assert_relative_eq!(
            cell.variance / (cell.n_points - 1) as f32,
            textbook_variance(&zs),
            max_relative = 1e-5
        );
    }

    #[test]
    fn test_fold_order_does_not_matter() {
        let mut zs: Vec<f32> = (0..50).map(|i| (i as f32 * 0.37).sin() * 3.0).collect();
        let reference = fold_all(&zs);

        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            zs.shuffle(&mut rng);
            let cell = fold_all(&zs);
            assert_eq!(cell.n_points, reference.n_points);
            assert_eq!(cell.z_min, reference.z_min);
            assert_eq!(cell.z_max, reference.z_max);
            assert_relative_eq!(cell.z_mean, reference.z_mean, max_relative = 1e-5);
            assert_relative_eq!(cell.variance, reference.variance, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_invariants_hold_while_folding() {
        let mut cell = CellStats::new();
        for i in 0..100 {
            cell.fold_point(((i * 37) % 17) as f32 - 8.0, i as f32);
            assert!(cell.z_min <= cell.z_mean);
            assert!(cell.z_mean <= cell.z_max);
            assert!(cell.variance >= 0.0);
        }
    }

    #[test]
    fn test_fold_cell_into_empty_copies() {
        let src = fold_all(&[1.0, 2.0, 3.0]);
        let mut dst = CellStats::new();
        dst.fold_cell(&src);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_fold_empty_cell_is_noop() {
        let mut dst = fold_all(&[1.0, 2.0, 3.0]);
        let before = dst;
        dst.fold_cell(&CellStats::new());
        assert_eq!(dst, before);
    }

    #[test]
    fn test_fold_cell_matches_folding_points() {
        let left = [0.5, 1.5, -0.5, 2.0];
        let right = [3.0, 2.5, 4.0, 3.5, 2.8];

        let mut combined = fold_all(&left);
        combined.fold_cell(&fold_all(&right));

        let all: Vec<f32> = left.iter().chain(right.iter()).copied().collect();
        let reference = fold_all(&all);

        assert_eq!(combined.n_points, reference.n_points);
        assert_eq!(combined.z_min, reference.z_min);
        assert_eq!(combined.z_max, reference.z_max);
        assert_relative_eq!(combined.z_mean, reference.z_mean, max_relative = 1e-5);
        assert_relative_eq!(combined.variance, reference.variance, max_relative = 1e-5);
    }

    #[test]
    fn test_fold_cell_commutative() {
        let a = fold_all(&[1.0, 2.0, 5.0]);
        let b = fold_all(&[-1.0, 0.5, 3.0, 4.0]);

        let mut ab = a;
        ab.fold_cell(&b);
        let mut ba = b;
        ba.fold_cell(&a);

        assert_eq!(ab.n_points, ba.n_points);
        assert_eq!(ab.z_min, ba.z_min);
        assert_eq!(ab.z_max, ba.z_max);
        assert_relative_eq!(ab.z_mean, ba.z_mean, max_relative = 1e-5);
        assert_relative_eq!(ab.variance, ba.variance, max_relative = 1e-5);
    }

    #[test]
    fn test_fold_cell_associative() {
        let a = fold_all(&[1.0, 2.0]);
        let b = fold_all(&[5.0, 6.0, 7.0]);
        let c = fold_all(&[-3.0, -2.0, 0.0, 1.0]);

        let mut ab_c = a;
        ab_c.fold_cell(&b);
        ab_c.fold_cell(&c);

        let mut bc = b;
        bc.fold_cell(&c);
        let mut a_bc = a;
        a_bc.fold_cell(&bc);

        assert_eq!(ab_c.n_points, a_bc.n_points);
        assert_relative_eq!(ab_c.z_mean, a_bc.z_mean, max_relative = 1e-5);
        assert_relative_eq!(ab_c.variance, a_bc.variance, max_relative = 1e-5);
    }

    #[test]
    fn test_fold_cell_keeps_latest_timestamp() {
        let mut a = CellStats::new();
        a.fold_point(1.0, 10.0);
        let mut b = CellStats::new();
        b.fold_point(2.0, 20.0);

        a.fold_cell(&b);
        assert_eq!(a.last_update, 20.0);
    }

    #[test]
    fn test_sample_variance_needs_more_than_two_points() {
        assert_eq!(fold_all(&[1.0]).sample_variance(), 0.0);
        assert_eq!(fold_all(&[1.0, 5.0]).sample_variance(), 0.0);
        assert!(fold_all(&[1.0, 5.0, 3.0]).sample_variance() > 0.0);
    }
}
