/// Sub-rectangle of the source image that a set of tensors was computed from, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct SourceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SourceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering a whole image of the given resolution.
    pub fn full(resolution: Resolution) -> Self {
        Self::new(0, 0, resolution.width, resolution.height)
    }

    /// Whether the region has no area, so nothing can be expressed relative to it.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn relative_x(&self, x: f32) -> f32 {
        (x - self.x as f32) / self.width as f32
    }

    #[inline]
    pub fn relative_y(&self, y: f32) -> f32 {
        (y - self.y as f32) / self.height as f32
    }
}

/// Dimensions of the image the tensors were computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn relative_coordinates() {
        let region = SourceRegion::new(10, 20, 100, 50);
        assert_approx_eq!(region.relative_x(60.0), 0.5);
        assert_approx_eq!(region.relative_y(20.0), 0.0);
        assert_approx_eq!(region.relative_y(70.0), 1.0);
    }

    #[test]
    fn empty_region() {
        assert!(SourceRegion::new(10, 10, 0, 50).is_empty());
        assert!(SourceRegion::new(10, 10, 50, 0).is_empty());
        assert!(SourceRegion::default().is_empty());
        assert!(!SourceRegion::new(0, 0, 1, 1).is_empty());
    }

    #[test]
    fn full_region() {
        let region = SourceRegion::full(Resolution::new(640, 480));
        assert_eq!(region, SourceRegion::new(0, 0, 640, 480));
    }
}
