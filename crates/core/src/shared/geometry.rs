//! Image-space and view-space geometry, and the crop-to-fill mapping
//! between them.
//!
//! A displayed image is scaled until it covers the whole view, then
//! centered so the overflow is cropped evenly on both sides. Boxes and
//! contour points go through the same [`CropToFill`] transform so both
//! overlays line up with the displayed pixels.

use crate::shared::constants::FACE_BOX_SHIFT_RATIO;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with `left <= right` and `top <= bottom`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    /// Builds a box from two corners in any order.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }

    /// Moves the box down by a fraction of its own height.
    pub fn shifted_down(&self, ratio: f64) -> Self {
        self.translated(0.0, self.height() * ratio)
    }

    /// Applies the detector bias correction used before face boxes are drawn.
    pub fn bias_corrected(&self) -> Self {
        self.shifted_down(FACE_BOX_SHIFT_RATIO)
    }
}

/// Sizes of the hosting view and of the image displayed in it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportGeometry {
    pub view_width: f64,
    pub view_height: f64,
    pub image_width: f64,
    pub image_height: f64,
}

impl ViewportGeometry {
    pub fn new(view_width: f64, view_height: f64, image_width: f64, image_height: f64) -> Self {
        Self {
            view_width,
            view_height,
            image_width,
            image_height,
        }
    }

    /// False when any dimension is zero, negative or not finite.
    pub fn is_drawable(&self) -> bool {
        [
            self.view_width,
            self.view_height,
            self.image_width,
            self.image_height,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Precomputed crop-to-fill transform for one viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropToFill {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl CropToFill {
    /// Returns `None` for degenerate geometry; callers draw nothing.
    pub fn new(geometry: &ViewportGeometry) -> Option<Self> {
        if !geometry.is_drawable() {
            return None;
        }
        let scale = (geometry.view_width / geometry.image_width)
            .max(geometry.view_height / geometry.image_height);
        let scaled_w = geometry.image_width * scale;
        let scaled_h = geometry.image_height * scale;
        Some(Self {
            scale,
            offset_x: (geometry.view_width - scaled_w) / 2.0,
            offset_y: (geometry.view_height - scaled_h) / 2.0,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> (f64, f64) {
        (self.offset_x, self.offset_y)
    }

    pub fn map_point(&self, p: Point) -> Point {
        Point {
            x: p.x * self.scale + self.offset_x,
            y: p.y * self.scale + self.offset_y,
        }
    }

    pub fn map_box(&self, b: &BoundingBox) -> BoundingBox {
        let top_left = self.map_point(Point::new(b.left, b.top));
        let bottom_right = self.map_point(Point::new(b.right, b.bottom));
        BoundingBox {
            left: top_left.x,
            top: top_left.y,
            right: bottom_right.x,
            bottom: bottom_right.y,
        }
    }
}

pub fn map_point(geometry: &ViewportGeometry, p: Point) -> Option<Point> {
    CropToFill::new(geometry).map(|t| t.map_point(p))
}

pub fn map_box(geometry: &ViewportGeometry, b: &BoundingBox) -> Option<BoundingBox> {
    CropToFill::new(geometry).map(|t| t.map_box(b))
}

pub fn map_points(geometry: &ViewportGeometry, points: &[Point]) -> Option<Vec<Point>> {
    CropToFill::new(geometry).map(|t| points.iter().map(|p| t.map_point(*p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn portrait_phone() -> ViewportGeometry {
        ViewportGeometry::new(1080.0, 1920.0, 480.0, 640.0)
    }

    #[test]
    fn test_crop_to_fill_portrait_phone() {
        let t = CropToFill::new(&portrait_phone()).unwrap();
        // max(1080/480, 1920/640) = max(2.25, 3.0); height fills, width overflows.
        assert_relative_eq!(t.scale(), 3.0);
        let (ox, oy) = t.offset();
        assert_relative_eq!(ox, -180.0);
        assert_relative_eq!(oy, 0.0);

        let p = t.map_point(Point::new(100.0, 100.0));
        assert_relative_eq!(p.x, 120.0);
        assert_relative_eq!(p.y, 300.0);
    }

    #[test]
    fn test_wide_image_crops_horizontally() {
        // 200x100 view, 100x100 image: scale = max(2, 1) = 2, overflow 0 x 100
        let t = CropToFill::new(&ViewportGeometry::new(200.0, 100.0, 100.0, 100.0)).unwrap();
        assert_relative_eq!(t.scale(), 2.0);
        let (ox, oy) = t.offset();
        assert_relative_eq!(ox, 0.0);
        assert_relative_eq!(oy, -50.0);
    }

    #[test]
    fn test_box_and_point_mapping_agree() {
        let geometry = portrait_phone();
        let b = BoundingBox::new(10.0, 20.0, 110.0, 220.0);
        let mapped = map_box(&geometry, &b).unwrap();
        let tl = map_point(&geometry, Point::new(10.0, 20.0)).unwrap();
        let br = map_point(&geometry, Point::new(110.0, 220.0)).unwrap();
        assert_relative_eq!(mapped.left, tl.x);
        assert_relative_eq!(mapped.top, tl.y);
        assert_relative_eq!(mapped.right, br.x);
        assert_relative_eq!(mapped.bottom, br.y);
    }

    #[test]
    fn test_mapping_is_affine() {
        let t = CropToFill::new(&ViewportGeometry::new(720.0, 1280.0, 640.0, 480.0)).unwrap();
        let a = t.map_point(Point::new(0.0, 0.0));
        let b = t.map_point(Point::new(100.0, 50.0));
        let mid = t.map_point(Point::new(50.0, 25.0));
        assert_relative_eq!(mid.x, (a.x + b.x) / 2.0);
        assert_relative_eq!(mid.y, (a.y + b.y) / 2.0);
    }

    #[test]
    fn test_repeated_inputs_give_identical_outputs() {
        let geometry = portrait_phone();
        let p = Point::new(33.0, 77.0);
        assert_eq!(map_point(&geometry, p), map_point(&geometry, p));
    }

    #[rstest]
    #[case::zero_view_width(ViewportGeometry::new(0.0, 1920.0, 480.0, 640.0))]
    #[case::zero_view_height(ViewportGeometry::new(1080.0, 0.0, 480.0, 640.0))]
    #[case::zero_image_width(ViewportGeometry::new(1080.0, 1920.0, 0.0, 640.0))]
    #[case::zero_image_height(ViewportGeometry::new(1080.0, 1920.0, 480.0, 0.0))]
    #[case::negative_view(ViewportGeometry::new(-1.0, 1920.0, 480.0, 640.0))]
    #[case::nan_image(ViewportGeometry::new(1080.0, 1920.0, f64::NAN, 640.0))]
    fn test_degenerate_geometry_has_no_mapping(#[case] geometry: ViewportGeometry) {
        assert!(CropToFill::new(&geometry).is_none());
        assert!(map_point(&geometry, Point::new(1.0, 1.0)).is_none());
        assert!(map_box(&geometry, &BoundingBox::new(0.0, 0.0, 1.0, 1.0)).is_none());
        assert!(map_points(&geometry, &[Point::new(1.0, 1.0)]).is_none());
    }

    #[test]
    fn test_bounding_box_normalizes_corners() {
        let b = BoundingBox::new(50.0, 80.0, 10.0, 20.0);
        assert_eq!(b, BoundingBox::new(10.0, 20.0, 50.0, 80.0));
        assert!(b.left <= b.right && b.top <= b.bottom);
    }

    #[test]
    fn test_bias_correction_shifts_down_ten_percent_of_height() {
        let b = BoundingBox::new(10.0, 100.0, 60.0, 300.0);
        let shifted = b.bias_corrected();
        assert_relative_eq!(shifted.top, 120.0);
        assert_relative_eq!(shifted.bottom, 320.0);
        assert_relative_eq!(shifted.left, 10.0);
        assert_relative_eq!(shifted.height(), b.height());
    }

    #[test]
    fn test_map_points_preserves_order() {
        let geometry = portrait_phone();
        let mapped =
            map_points(&geometry, &[Point::new(0.0, 0.0), Point::new(100.0, 100.0)]).unwrap();
        assert_eq!(mapped.len(), 2);
        assert_relative_eq!(mapped[0].x, -180.0);
        assert_relative_eq!(mapped[0].y, 0.0);
        assert_relative_eq!(mapped[1].x, 120.0);
        assert_relative_eq!(mapped[1].y, 300.0);
    }
}
