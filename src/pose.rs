use crate::{nms::Suppress, point::Point, region::SourceRegion};
use bitvec::bitvec;

pub mod constants {
    /// Radius, in grid cells, of the window a root point must dominate.
    pub const LOCAL_MAXIMUM_RADIUS: usize = 1;
    /// Keypoints closer than this many pixels count as the same point.
    pub const NMS_THRESHOLD_RADIUS: f32 = 20.0;
    pub const NUM_REFINEMENT_STEPS: usize = 2;
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct Keypoint {
    pub name: String,
    pub x: f32,
    pub y: f32,
    /// 0-100, zero until the keypoint has been located.
    pub confidence: f32,
    pub color: u32,
}

impl Keypoint {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[inline]
    pub fn is_populated(&self) -> bool {
        self.confidence != 0.0
    }
}

/// A directed skeleton edge between two keypoint ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct KeypointLink {
    pub source: u32,
    pub destination: u32,
}

impl KeypointLink {
    pub fn new(source: u32, destination: u32) -> Self {
        Self {
            source,
            destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PoseEstimation {
    keypoints: Vec<Keypoint>,
    pub links: Vec<KeypointLink>,
    pub confidence: f32,
}

impl PoseEstimation {
    /// A pose with `num_parts` unpopulated keypoints.
    pub fn new(num_parts: usize, links: Vec<KeypointLink>) -> Self {
        Self {
            keypoints: vec![Keypoint::default(); num_parts],
            links,
            confidence: 0.0,
        }
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn keypoints_mut(&mut self) -> &mut [Keypoint] {
        &mut self.keypoints
    }

    pub fn num_parts(&self) -> usize {
        self.keypoints.len()
    }

    /// Map keypoints from source pixels to coordinates relative to `region`.
    ///
    /// Keypoints outside the region are clamped onto its border.
    pub fn transform_to_region(&mut self, region: &SourceRegion) {
        for keypoint in &mut self.keypoints {
            keypoint.x = region.relative_x(keypoint.x).clamp(0.0, 1.0);
            keypoint.y = region.relative_y(keypoint.y).clamp(0.0, 1.0);
        }
    }

    /// Number of keypoints lying within the NMS radius of their counterpart in `other`.
    pub fn overlapping_keypoints(&self, other: &Self) -> usize {
        let squared_radius = constants::NMS_THRESHOLD_RADIUS.powi(2);
        let mut mask = bitvec![0; self.keypoints.len()];
        self.keypoints
            .iter()
            .zip(&other.keypoints)
            .enumerate()
            .for_each(|(i, (a, b))| {
                mask.set(i, a.point().squared_distance(b.point()) <= squared_radius)
            });
        mask.count_ones()
    }
}

impl Suppress for PoseEstimation {
    fn overlaps(&self, other: &Self) -> bool {
        self.overlapping_keypoints(other) >= self.keypoints.len() / 2
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn pose_at(points: &[(f32, f32)], confidence: f32) -> PoseEstimation {
        let mut pose = PoseEstimation::new(points.len(), Vec::new());
        for (keypoint, &(x, y)) in pose.keypoints_mut().iter_mut().zip(points) {
            keypoint.x = x;
            keypoint.y = y;
            keypoint.confidence = 50.0;
        }
        pose.confidence = confidence;
        pose
    }

    mod overlap_tests {
        use super::*;

        #[test]
        fn radius_is_inclusive() {
            let a = pose_at(&[(0.0, 0.0), (100.0, 100.0)], 10.0);
            let b = pose_at(&[(20.0, 0.0), (300.0, 300.0)], 10.0);
            assert_eq!(a.overlapping_keypoints(&b), 1);
        }

        #[test]
        fn half_of_the_keypoints_is_enough() {
            let a = pose_at(&[(0.0, 0.0), (100.0, 100.0), (200.0, 200.0)], 10.0);
            let b = pose_at(&[(5.0, 5.0), (400.0, 100.0), (0.0, 200.0)], 10.0);
            // three keypoints, one overlapping, 3 / 2 == 1
            assert!(a.overlaps(&b));
        }

        #[test]
        fn distinct_poses() {
            let a = pose_at(&[(0.0, 0.0), (100.0, 100.0)], 10.0);
            let b = pose_at(&[(50.0, 0.0), (300.0, 300.0)], 10.0);
            assert!(!a.overlaps(&b));
        }
    }

    mod transform_tests {
        use super::*;

        #[test]
        fn relative_to_region() {
            let mut pose = pose_at(&[(110.0, 45.0)], 10.0);
            pose.transform_to_region(&SourceRegion::new(10, 20, 200, 100));
            assert_approx_eq!(pose.keypoints()[0].x, 0.5);
            assert_approx_eq!(pose.keypoints()[0].y, 0.25);
        }

        #[test]
        fn clamped_to_region() {
            let mut pose = pose_at(&[(0.0, 0.0), (500.0, 60.0)], 10.0);
            pose.transform_to_region(&SourceRegion::new(64, 20, 128, 256));
            let points = pose
                .keypoints()
                .iter()
                .map(|keypoint| (keypoint.x, keypoint.y))
                .collect::<Vec<_>>();
            assert_eq!(points[0], (0.0, 0.0));
            assert_eq!(points[1].0, 1.0);
            assert_approx_eq!(points[1].1, 40.0 / 256.0);
        }
    }
}
