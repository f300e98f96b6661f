//! Point cloud fusion.
//!
//! Two fusion paths share the cell arithmetic:
//!
//! - **Static**: every in-range point is folded straight into the terrain
//!   statistics. Good for mostly-static outdoor scenes.
//! - **Dynamic**: each cloud is first accumulated on its own, then cells
//!   are classified as flat or vertical by comparing their in-frame z
//!   variance against a threshold derived from the cloud-wide mean
//!   variance. Vertical cells shadow rather than replace the ground: the
//!   last flat statistics are parked aside and restored when the
//!   obstruction clears, so a pedestrian or a parked vehicle does not
//!   permanently corrupt the terrain.

use crate::core::{CellStats, PointCloud, TransformMatrix};
use crate::error::Result;

use super::{FusionMode, TerrainModel};

/// Convert running sums of squared deviations into sample variances, in
/// place, for every cell with more than two observations, and return the
/// mean of those variances (0 if there is no such cell).
fn variance_mean(cells: &mut [CellStats]) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for cell in cells.iter_mut() {
        if cell.n_points > 2 {
            cell.variance /= (cell.n_points - 1) as f32;
            sum += cell.variance as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

impl TerrainModel {
    /// Fuse a sensor-frame point cloud into the model.
    ///
    /// The points are transformed to the world (custom) frame **in
    /// place**; the caller's cloud is modified. The transform's
    /// translation is taken as the robot position and the window slides
    /// toward it first, so tile I/O can occur here. The configured
    /// [`FusionMode`] selects the fusion path.
    pub fn merge(&mut self, cloud: &mut PointCloud, transform: &TransformMatrix) -> Result<()> {
        cloud.transform(transform);
        let (robot_x, robot_y, _) = transform.translation();
        self.slide_to(robot_x, robot_y)?;
        match self.config.mode {
            FusionMode::Static => self.merge_world(cloud),
            FusionMode::Dynamic => self.dynamic_merge(cloud),
        }
        Ok(())
    }

    /// Fold a world-frame cloud straight into the terrain statistics.
    ///
    /// Points outside the window are skipped. No slide is performed.
    pub fn merge_world(&mut self, cloud: &PointCloud) {
        let t = self.reference_time();
        for point in cloud {
            if let Some(idx) = self.raster.index_custom(point.x as f64, point.y as f64) {
                self.cells[idx].fold_point(point.z, t);
            }
        }
        self.dirty = true;
    }

    /// Fuse a world-frame cloud with flat/vertical classification.
    ///
    /// The cloud is accumulated into a scratch grid first; a cell whose
    /// in-frame sample variance exceeds `variance_factor` times the mean
    /// over the cloud's well-observed cells is classified vertical.
    /// Transitions:
    ///
    /// - unobserved cell: adopt the frame's statistics and class;
    /// - same class as before: fold the frame in;
    /// - flat cell turns vertical: park the ground statistics aside and
    ///   let the frame's statistics take over;
    /// - vertical cell turns flat: restore the parked ground statistics
    ///   and fold the frame in.
    ///
    /// No slide is performed; callers slide first (or use [`Self::merge`]).
    pub fn dynamic_merge(&mut self, cloud: &PointCloud) {
        let t = self.reference_time();

        self.dynamic_cells.fill(CellStats::default());
        for point in cloud {
            if let Some(idx) = self.raster.index_custom(point.x as f64, point.y as f64) {
                self.dynamic_cells[idx].fold_point(point.z, t);
            }
        }

        let threshold = self.config.variance_factor * variance_mean(&mut self.dynamic_cells);

        for idx in 0..self.dynamic_cells.len() {
            let frame = self.dynamic_cells[idx];
            if frame.is_empty() {
                continue;
            }
            let is_vertical = frame.variance > threshold;

            if self.cells[idx].is_empty() {
                self.cells[idx] = frame;
                self.vertical[idx] = is_vertical;
            } else if self.vertical[idx] == is_vertical {
                self.cells[idx].fold_cell(&frame);
            } else if is_vertical {
                // flat -> vertical: the obstruction hides the ground
                self.ground_cells[idx] = self.cells[idx];
                self.cells[idx] = frame;
                self.vertical[idx] = true;
            } else {
                // vertical -> flat: the ground re-emerges
                self.cells[idx] = self.ground_cells[idx];
                self.cells[idx].fold_cell(&frame);
                self.vertical[idx] = false;
            }
            self.cells[idx].last_update = t;
        }
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Point3D;
    use crate::terrain::TerrainConfig;
    use approx::assert_relative_eq;

    fn small_model(variance_factor: f32) -> TerrainModel {
        let config = TerrainConfig {
            size_x: 30.0,
            size_y: 30.0,
            scale: 1.0,
            variance_factor,
            ..Default::default()
        };
        TerrainModel::new(config).unwrap()
    }

    /// Points landing in the cell at integer coordinates (cx, cy).
    fn cell_cloud(cx: usize, cy: usize, zs: &[f32]) -> PointCloud {
        let mut cloud = PointCloud::new();
        for &z in zs {
            cloud.push(Point3D::new(cx as f32 + 0.5, cy as f32 + 0.5, z));
        }
        cloud
    }

    #[test]
    fn test_single_point_lands_in_its_cell() {
        let mut model = small_model(3.0);
        model.merge_world(&PointCloud::from_points(&[Point3D::new(1.5, 1.5, 2.0)]));

        let idx = model.index_of(1.5, 1.5).unwrap();
        assert_eq!(idx, 31);
        let cell = model.cells()[idx];
        assert_eq!(cell.n_points, 1);
        assert_eq!(cell.z_min, 2.0);
        assert_eq!(cell.z_max, 2.0);
        assert_eq!(cell.z_mean, 2.0);
        assert_eq!(cell.variance, 0.0);
        assert_eq!(
            model.cells().iter().filter(|c| !c.is_empty()).count(),
            1
        );
    }

    #[test]
    fn test_out_of_range_points_are_skipped() {
        let mut model = small_model(3.0);
        model.merge_world(&PointCloud::from_points(&[
            Point3D::new(-5.0, 10.0, 1.0),
            Point3D::new(10.0, 35.0, 1.0),
        ]));
        assert!(model.cells().iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_merge_transforms_cloud_in_place() {
        let mut model = small_model(3.0);
        // robot at the window centre, so no slide happens
        let transform = TransformMatrix::from_translation(15.0, 15.0, 0.0);
        let mut cloud = PointCloud::from_points(&[Point3D::new(-10.0, -10.0, 1.5)]);

        model.merge(&mut cloud, &transform).unwrap();

        assert_eq!(cloud.points[0], Point3D::new(5.0, 5.0, 1.5));
        let idx = model.index_of(5.0, 5.0).unwrap();
        assert_eq!(model.cells()[idx].n_points, 1);
        assert_eq!(model.current(), (0, 0));
    }

    #[test]
    fn test_dynamic_flip_to_vertical_parks_ground() {
        let mut model = small_model(2.0);
        let idx = model.index_of(1.5, 1.5).unwrap();

        // ten flat observations of the ground
        let flat: Vec<f32> = (0..10).map(|i| (i as f32 - 4.5) * 0.002).collect();
        model.merge_world(&cell_cloud(1, 1, &flat));
        let ground = model.cells()[idx];
        assert!(!model.vertical()[idx]);

        // an obstacle: high spread around z = 5, plus calm filler cells
        // that keep the cloud-wide mean variance low
        let mut cloud = cell_cloud(1, 1, &[3.0, 3.0, 4.0, 4.0, 5.0, 5.0, 6.0, 6.0, 7.0, 7.0]);
        for (cx, cy) in [(5, 5), (6, 5), (7, 5)] {
            cloud.points.extend(cell_cloud(cx, cy, &[0.1, 0.1, 0.1, 0.1]).points);
        }
        model.dynamic_merge(&cloud);

        assert!(model.vertical()[idx]);
        assert_eq!(model.ground_cells()[idx].n_points, ground.n_points);
        assert_relative_eq!(model.ground_cells()[idx].z_mean, ground.z_mean);
        let cell = model.cells()[idx];
        assert_eq!(cell.n_points, 10);
        assert_relative_eq!(cell.z_mean, 5.0, epsilon = 1e-5);
        assert_eq!(cell.z_min, 3.0);
        assert_eq!(cell.z_max, 7.0);
    }

    #[test]
    fn test_dynamic_revert_restores_ground() {
        let mut model = small_model(2.0);
        let idx = model.index_of(1.5, 1.5).unwrap();

        let flat: Vec<f32> = (0..10).map(|i| (i as f32 - 4.5) * 0.002).collect();
        model.merge_world(&cell_cloud(1, 1, &flat));

        let mut cloud = cell_cloud(1, 1, &[3.0, 3.0, 4.0, 4.0, 5.0, 5.0, 6.0, 6.0, 7.0, 7.0]);
        for (cx, cy) in [(5, 5), (6, 5), (7, 5)] {
            cloud.points.extend(cell_cloud(cx, cy, &[0.1, 0.1, 0.1, 0.1]).points);
        }
        model.dynamic_merge(&cloud);
        assert!(model.vertical()[idx]);
        let parked = model.ground_cells()[idx];

        // the obstacle clears: five identical-z observations, zero spread
        let calm = cell_cloud(1, 1, &[0.5, 0.5, 0.5, 0.5, 0.5]);
        model.dynamic_merge(&calm);

        assert!(!model.vertical()[idx]);
        let mut expected = parked;
        let mut frame = CellStats::default();
        for _ in 0..5 {
            frame.fold_point(0.5, 0.0);
        }
        // the frame's spread is already in sample-variance units here
        frame.variance = frame.sample_variance();
        expected.fold_cell(&frame);

        let cell = model.cells()[idx];
        assert_eq!(cell.n_points, expected.n_points);
        assert_relative_eq!(cell.z_mean, expected.z_mean, epsilon = 1e-5);
        assert_eq!(cell.z_min, expected.z_min);
        assert_eq!(cell.z_max, expected.z_max);
    }

    #[test]
    fn test_dynamic_same_class_keeps_folding() {
        let mut model = small_model(3.0);
        let idx = model.index_of(2.5, 2.5).unwrap();

        model.dynamic_merge(&cell_cloud(2, 2, &[1.0, 1.0, 1.0]));
        assert!(!model.vertical()[idx]);
        assert_eq!(model.cells()[idx].n_points, 3);

        model.dynamic_merge(&cell_cloud(2, 2, &[1.0, 1.0]));
        assert!(!model.vertical()[idx]);
        assert_eq!(model.cells()[idx].n_points, 5);
    }

    #[test]
    fn test_variance_mean_converts_in_place() {
        let mut cells = vec![CellStats::default(); 4];
        for &z in &[1.0, 2.0, 3.0, 4.0] {
            cells[0].fold_point(z, 0.0);
        }
        for &z in &[5.0, 5.0, 5.0, 5.0] {
            cells[1].fold_point(z, 0.0);
        }
        // two points only: not part of the mean, left untouched
        cells[2].fold_point(0.0, 0.0);
        cells[2].fold_point(8.0, 0.0);
        let raw_two_point_spread = cells[2].variance;

        let mean = variance_mean(&mut cells);

        // cell 0: sum of squares 5.0 over n-1 = 3 -> 5/3
        assert_relative_eq!(cells[0].variance, 5.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(cells[1].variance, 0.0);
        assert_eq!(cells[2].variance, raw_two_point_spread);
        assert_relative_eq!(mean, 5.0 / 6.0, epsilon = 1e-5);
    }

    #[test]
    fn test_variance_mean_empty_grid_is_zero() {
        let mut cells = vec![CellStats::default(); 8];
        assert_eq!(variance_mean(&mut cells), 0.0);
    }
}
