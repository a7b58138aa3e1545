use crate::overlay::overlay_slot::OverlaySlot;
use crate::shared::geometry::{BoundingBox, CropToFill, Point, ViewportGeometry};

/// View-space render state composited over the displayed image.
///
/// Holds a single face box and a set of contour points. Publishers hand in
/// image-space geometry together with the size of the image it came from;
/// the state maps it into the hosting view with [`CropToFill`] so both
/// overlays line up with the cropped preview.
#[derive(Debug)]
pub struct OverlayState {
    view_width: f64,
    view_height: f64,
    bounding_box: OverlaySlot<BoundingBox>,
    contour_points: OverlaySlot<Vec<Point>>,
}

impl OverlayState {
    pub fn new(view_width: f64, view_height: f64) -> Self {
        Self {
            view_width,
            view_height,
            bounding_box: OverlaySlot::new(),
            contour_points: OverlaySlot::new(),
        }
    }

    pub fn view_size(&self) -> (f64, f64) {
        (self.view_width, self.view_height)
    }

    fn transform(&self, image_width: f64, image_height: f64) -> Option<CropToFill> {
        CropToFill::new(&ViewportGeometry::new(
            self.view_width,
            self.view_height,
            image_width,
            image_height,
        ))
    }

    /// Maps an image-space box into the view and shows it.
    ///
    /// Returns false without touching the slot when the geometry is
    /// degenerate.
    pub fn publish_box(&mut self, image_box: &BoundingBox, image_width: f64, image_height: f64) -> bool {
        let Some(transform) = self.transform(image_width, image_height) else {
            log::debug!("Skipping box overlay: degenerate geometry");
            return false;
        };
        self.bounding_box.set(transform.map_box(image_box));
        true
    }

    /// Maps image-space contour points into the view and shows them.
    ///
    /// An empty point set clears the slot.
    pub fn publish_points(&mut self, image_points: &[Point], image_width: f64, image_height: f64) -> bool {
        let Some(transform) = self.transform(image_width, image_height) else {
            log::debug!("Skipping contour overlay: degenerate geometry");
            return false;
        };
        if image_points.is_empty() {
            self.contour_points.clear();
        } else {
            let mapped = image_points.iter().map(|p| transform.map_point(*p)).collect();
            self.contour_points.set(mapped);
        }
        true
    }

    pub fn clear_box(&mut self) {
        self.bounding_box.clear();
    }

    pub fn clear_points(&mut self) {
        self.contour_points.clear();
    }

    pub fn clear_all(&mut self) {
        self.clear_box();
        self.clear_points();
    }

    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        self.bounding_box.get()
    }

    pub fn contour_points(&self) -> Option<&[Point]> {
        self.contour_points.get().map(|v| v.as_slice())
    }

    #[cfg(test)]
    pub(crate) fn box_slot(&self) -> &OverlaySlot<BoundingBox> {
        &self.bounding_box
    }

    #[cfg(test)]
    pub(crate) fn points_slot(&self) -> &OverlaySlot<Vec<Point>> {
        &self.contour_points
    }

    /// Total redraws requested by both slots.
    pub fn redraw_count(&self) -> usize {
        self.bounding_box.redraw_count() + self.contour_points.redraw_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn portrait_view() -> OverlayState {
        OverlayState::new(1080.0, 1920.0)
    }

    #[test]
    fn test_publish_box_maps_into_view_space() {
        let mut overlay = portrait_view();
        assert!(overlay.publish_box(&BoundingBox::new(100.0, 100.0, 200.0, 300.0), 480.0, 640.0));

        let b = overlay.bounding_box().unwrap();
        // Scale 3.0, with 180px of the scaled width cropped off each side.
        assert_relative_eq!(b.left, 120.0);
        assert_relative_eq!(b.top, 300.0);
        assert_relative_eq!(b.right, 420.0);
        assert_relative_eq!(b.bottom, 900.0);
    }

    #[test]
    fn test_publish_points_uses_same_transform_as_box() {
        let mut overlay = portrait_view();
        overlay.publish_box(&BoundingBox::new(100.0, 100.0, 200.0, 300.0), 480.0, 640.0);
        overlay.publish_points(&[Point::new(100.0, 100.0), Point::new(200.0, 300.0)], 480.0, 640.0);

        let b = *overlay.bounding_box().unwrap();
        let points = overlay.contour_points().unwrap();
        assert_eq!(points[0], Point::new(b.left, b.top));
        assert_eq!(points[1], Point::new(b.right, b.bottom));
    }

    #[rstest]
    #[case(0.0, 640.0)]
    #[case(480.0, 0.0)]
    #[case(-1.0, 640.0)]
    #[case(f64::NAN, 640.0)]
    fn test_degenerate_image_leaves_slots_untouched(#[case] w: f64, #[case] h: f64) {
        let mut overlay = portrait_view();
        overlay.publish_box(&BoundingBox::new(1.0, 1.0, 2.0, 2.0), 10.0, 10.0);
        let before = *overlay.bounding_box().unwrap();
        let redraws = overlay.redraw_count();

        assert!(!overlay.publish_box(&BoundingBox::new(5.0, 5.0, 6.0, 6.0), w, h));
        assert!(!overlay.publish_points(&[Point::new(1.0, 1.0)], w, h));

        assert_eq!(overlay.bounding_box(), Some(&before));
        assert!(overlay.contour_points().is_none());
        assert_eq!(overlay.redraw_count(), redraws);
    }

    #[test]
    fn test_zero_view_draws_nothing() {
        let mut overlay = OverlayState::new(0.0, 1920.0);
        assert!(!overlay.publish_box(&BoundingBox::new(1.0, 1.0, 2.0, 2.0), 480.0, 640.0));
        assert!(overlay.bounding_box().is_none());
    }

    #[test]
    fn test_empty_points_clear_slot() {
        let mut overlay = portrait_view();
        overlay.publish_points(&[Point::new(1.0, 1.0)], 480.0, 640.0);
        overlay.publish_points(&[], 480.0, 640.0);
        assert!(overlay.contour_points().is_none());
        assert_eq!(overlay.redraw_count(), 2);
    }

    #[test]
    fn test_clear_all_on_empty_state_does_not_redraw() {
        let mut overlay = portrait_view();
        overlay.clear_all();
        overlay.clear_all();
        assert_eq!(overlay.redraw_count(), 0);
    }

    #[test]
    fn test_slots_clear_independently() {
        let mut overlay = portrait_view();
        overlay.publish_box(&BoundingBox::new(1.0, 1.0, 2.0, 2.0), 480.0, 640.0);
        overlay.publish_points(&[Point::new(1.0, 1.0)], 480.0, 640.0);

        overlay.clear_points();

        assert!(overlay.bounding_box().is_some());
        assert!(overlay.contour_points().is_none());
        assert_eq!(overlay.box_slot().redraw_count(), 1);
        assert_eq!(overlay.points_slot().redraw_count(), 2);
    }

    #[test]
    fn test_view_matching_image_maps_identically() {
        let mut overlay = OverlayState::new(480.0, 640.0);
        overlay.publish_box(&BoundingBox::new(10.0, 20.0, 30.0, 40.0), 480.0, 640.0);
        assert_eq!(overlay.bounding_box(), Some(&BoundingBox::new(10.0, 20.0, 30.0, 40.0)));
        assert_eq!(overlay.view_size(), (480.0, 640.0));
    }
}
