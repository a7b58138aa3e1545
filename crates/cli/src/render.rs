use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use facelens_core::overlay::overlay_state::OverlayState;
use facelens_core::shared::constants::{BOX_STROKE_WIDTH, CONTOUR_DOT_RADIUS};
use facelens_core::shared::frame::Frame;
use facelens_core::shared::geometry::{BoundingBox, CropToFill, Point, ViewportGeometry};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const DOT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Renders what the view shows: the image scaled to fill the view and
/// center-cropped, with the overlay drawn on top in view pixels.
///
/// Returns `None` when the view or image has no area.
pub fn compose(image: &Frame, overlay: &OverlayState) -> Option<RgbImage> {
    let (view_w, view_h) = overlay.view_size();
    let transform = CropToFill::new(&ViewportGeometry::new(
        view_w,
        view_h,
        f64::from(image.width()),
        f64::from(image.height()),
    ))?;
    let source = RgbImage::from_raw(image.width(), image.height(), image.data().to_vec())?;

    let scaled_w = ((f64::from(image.width()) * transform.scale()).round() as u32).max(1);
    let scaled_h = ((f64::from(image.height()) * transform.scale()).round() as u32).max(1);
    let scaled = imageops::resize(&source, scaled_w, scaled_h, FilterType::Triangle);

    let (offset_x, offset_y) = transform.offset();
    let crop_x = ((-offset_x).round().max(0.0) as u32).min(scaled_w - 1);
    let crop_y = ((-offset_y).round().max(0.0) as u32).min(scaled_h - 1);
    let crop_w = (view_w.round() as u32).clamp(1, scaled_w - crop_x);
    let crop_h = (view_h.round() as u32).clamp(1, scaled_h - crop_y);
    let mut canvas = imageops::crop_imm(&scaled, crop_x, crop_y, crop_w, crop_h).to_image();

    if let Some(b) = overlay.bounding_box() {
        draw_box(&mut canvas, b, BOX_STROKE_WIDTH, BOX_COLOR);
    }
    for p in overlay.contour_points().unwrap_or_default() {
        draw_dot(&mut canvas, *p, CONTOUR_DOT_RADIUS, DOT_COLOR);
    }
    Some(canvas)
}

/// Outline drawn inward from the box edges, clipped to the canvas.
fn draw_box(canvas: &mut RgbImage, b: &BoundingBox, stroke: u32, color: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    let (max_x, max_y) = (i64::from(w) - 1, i64::from(h) - 1);
    let left = b.left.round() as i64;
    let top = b.top.round() as i64;
    let right = b.right.round() as i64;
    let bottom = b.bottom.round() as i64;

    for t in 0..i64::from(stroke) {
        let (x0, y0, x1, y1) = (left + t, top + t, right - t, bottom - t);
        if x0 > x1 || y0 > y1 {
            break;
        }
        for x in x0.max(0)..=x1.min(max_x) {
            put(canvas, x, y0, color);
            put(canvas, x, y1, color);
        }
        for y in y0.max(0)..=y1.min(max_y) {
            put(canvas, x0, y, color);
            put(canvas, x1, y, color);
        }
    }
}

fn draw_dot(canvas: &mut RgbImage, center: Point, radius: u32, color: Rgb<u8>) {
    let r = i64::from(radius);
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(canvas, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    if x >= 0 && y >= 0 && x < i64::from(w) && y < i64::from(h) {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}
