use crate::{nms::Suppress, region::SourceRegion};
use std::cmp::Ordering;

/// Boxes of the same class with an intersection over union above this are duplicates.
pub const NMS_INTERSECTION_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BoxEntry {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    /// 0-100.
    pub confidence: f32,
    pub class_id: u32,
    pub name: String,
    pub color: u32,
}

impl BoxEntry {
    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Intersection over union of the two rectangles, zero when they are disjoint.
    pub fn intersection_score(&self, other: &Self) -> f32 {
        let width = self.right.min(other.right) - self.left.max(other.left);
        let height = self.bottom.min(other.bottom) - self.top.max(other.top);

        if width <= 0.0 || height <= 0.0 {
            return 0.0;
        }

        let intersection = width * height;
        let union = self.width() * self.height() + other.width() * other.height() - intersection;
        intersection / union
    }

    /// Map the box from source pixels to coordinates relative to `region`.
    pub fn transform_to_region(&mut self, region: &SourceRegion) {
        self.top = region.relative_y(self.top);
        self.left = region.relative_x(self.left);
        self.bottom = region.relative_y(self.bottom);
        self.right = region.relative_x(self.right);
    }

    /// Whether any edge lies past the far side of the region.
    pub fn exceeds_region(&self) -> bool {
        self.top > 1.0 || self.left > 1.0 || self.bottom > 1.0 || self.right > 1.0
    }

    /// Higher confidence orders first.
    pub fn compare(&self, other: &Self) -> Ordering {
        other
            .confidence
            .partial_cmp(&self.confidence)
            .unwrap_or(Ordering::Equal)
    }
}

impl Suppress for BoxEntry {
    fn overlaps(&self, other: &Self) -> bool {
        self.class_id == other.class_id
            && self.intersection_score(other) > NMS_INTERSECTION_THRESHOLD
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    pub(crate) fn entry(
        top: f32,
        left: f32,
        bottom: f32,
        right: f32,
        confidence: f32,
        class_id: u32,
    ) -> BoxEntry {
        BoxEntry {
            top,
            left,
            bottom,
            right,
            confidence,
            class_id,
            name: String::new(),
            color: 0,
        }
    }

    mod intersection_score_tests {
        use super::*;

        #[test]
        fn disjoint_boxes() {
            let a = entry(0.0, 0.0, 0.2, 0.2, 50.0, 0);
            let b = entry(0.5, 0.5, 0.7, 0.7, 50.0, 0);
            assert_eq!(a.intersection_score(&b), 0.0);
        }

        #[test]
        fn touching_boxes() {
            let a = entry(0.0, 0.0, 0.2, 0.2, 50.0, 0);
            let b = entry(0.0, 0.2, 0.2, 0.4, 50.0, 0);
            assert_eq!(a.intersection_score(&b), 0.0);
        }

        #[test]
        fn partial_overlap() {
            let a = entry(0.0, 0.0, 2.0, 2.0, 50.0, 0);
            let b = entry(1.0, 0.0, 3.0, 2.0, 50.0, 0);
            assert_approx_eq!(a.intersection_score(&b), 2.0 / 6.0);
        }

        #[test]
        fn identical_boxes() {
            let a = entry(0.1, 0.1, 0.4, 0.3, 50.0, 0);
            assert_approx_eq!(a.intersection_score(&a.clone()), 1.0);
        }
    }

    mod overlap_tests {
        use super::*;

        #[test]
        fn other_class_never_overlaps() {
            let a = entry(0.1, 0.1, 0.4, 0.3, 50.0, 0);
            let b = entry(0.1, 0.1, 0.4, 0.3, 50.0, 1);
            assert!(!a.overlaps(&b));
        }

        #[test]
        fn threshold_is_exclusive() {
            let a = entry(0.0, 0.0, 3.0, 1.0, 50.0, 2);
            let b = entry(1.0, 0.0, 4.0, 1.0, 50.0, 2);
            // intersection 2, union 4
            assert_approx_eq!(a.intersection_score(&b), 0.5);
            assert!(!a.overlaps(&b));
        }
    }

    mod transform_tests {
        use super::*;

        #[test]
        fn relative_to_region() {
            let mut a = entry(60.0, 20.0, 110.0, 120.0, 50.0, 0);
            a.transform_to_region(&SourceRegion::new(20, 10, 200, 100));
            assert_approx_eq!(a.top, 0.5);
            assert_approx_eq!(a.left, 0.0);
            assert_approx_eq!(a.bottom, 1.0);
            assert_approx_eq!(a.right, 0.5);
            assert!(!a.exceeds_region());
        }
    }
}
