//! Page deskew: estimate the text skew of a scanned page and rotate it level.
//!
//! ## Algorithm
//!
//! 1. Binarise with Otsu's threshold. Ink (pixels at or below the level)
//!    becomes foreground 255, paper becomes 0.
//! 2. Remove speckle with non-local-means ([`super::denoise`]).
//! 3. Take the minimum-area rectangle around every foreground pixel
//!    (`imageproc::geometry::min_area_rect`) and read its orientation, normalised to `[-90°, 0°)`.
//! 4. Map that to a correction angle: `θ < -45° → -(90° + θ)`, else `-θ`.
//! 5. Rotate the *original* grayscale page about its centre by the
//!    correction with bicubic interpolation, replicating edge pixels into
//!    the exposed corners.
//!
//! Angles are in degrees; positive rotates counter-clockwise as seen on
//! screen. A page with no ink has a skew of exactly 0 and is returned as is.

use super::denoise::{non_local_means, NlMeansParams};
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use tracing::debug;

/// Rotations smaller than this are skipped.
const MIN_ROTATION_DEG: f64 = 1e-3;

/// Deskew a grayscale page. Output has the same dimensions as the input.
pub fn deskew(gray: &GrayImage) -> GrayImage {
    let angle = estimate_skew(gray);
    debug!("Deskew: correction {:.2}°", angle);
    rotate_replicate(gray, angle)
}

/// Correction angle in degrees that makes the text of `gray` horizontal.
pub fn estimate_skew(gray: &GrayImage) -> f64 {
    let mask = non_local_means(&binarize_ink(gray), &NlMeansParams::default());
    let points = foreground_outline(&mask);
    let Some(theta) = min_area_rect_angle(&points) else {
        return 0.0;
    };
    if theta < -45.0 {
        -(90.0 + theta)
    } else {
        -theta
    }
}

/// Otsu binarisation with ink as foreground.
///
/// A flat image has no ink at all.
pub(crate) fn binarize_ink(gray: &GrayImage) -> GrayImage {
    let raw = gray.as_raw();
    let flat = raw.first().is_none_or(|first| raw.iter().all(|p| p == first));
    if flat {
        return GrayImage::new(gray.width(), gray.height());
    }
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Leftmost and rightmost foreground pixel of every row.
///
/// The convex hull of these is the hull of the whole foreground set.
fn foreground_outline(mask: &GrayImage) -> Vec<Point<i32>> {
    let mut points = Vec::new();
    for (y, row) in mask.rows().enumerate() {
        let mut first = None;
        let mut last = None;
        for (x, p) in row.enumerate() {
            if p[0] > 0 {
                first.get_or_insert(x);
                last = Some(x);
            }
        }
        if let (Some(a), Some(b)) = (first, last) {
            points.push(Point::new(a as i32, y as i32));
            if b != a {
                points.push(Point::new(b as i32, y as i32));
            }
        }
    }
    points
}

/// Orientation of the minimum-area rectangle enclosing `points`, in
/// `[-90°, 0°)` measured with the y axis pointing up. `None` when empty.
///
/// The angle is read off the longer side of the rectangle; its corners are
/// snapped to whole pixels, so the short side is too coarse to measure.
fn min_area_rect_angle(points: &[Point<i32>]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let corners = min_area_rect(points);
    let side = |a: Point<i32>, b: Point<i32>| ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let top = side(corners[0], corners[1]);
    let right = side(corners[1], corners[2]);
    let edge = if top.0.hypot(top.1) >= right.0.hypot(right.1) {
        top
    } else {
        right
    };

    let beta = (-edge.1).atan2(edge.0).to_degrees();
    Some(beta.rem_euclid(90.0) - 90.0)
}

/// Rotate `gray` about its centre by `degrees` (counter-clockwise on screen).
///
/// Bicubic interpolation; samples outside the image take the nearest edge
/// pixel.
pub fn rotate_replicate(gray: &GrayImage, degrees: f64) -> GrayImage {
    if degrees.abs() < MIN_ROTATION_DEG {
        return gray.clone();
    }

    let (w, h) = gray.dimensions();
    let cx = (w / 2) as f64;
    let cy = (h / 2) as f64;
    let (sin, cos) = degrees.to_radians().sin_cos();

    GrayImage::from_fn(w, h, |xo, yo| {
        let dx = xo as f64 - cx;
        let dy = yo as f64 - cy;
        let sx = cx + dx * cos - dy * sin;
        let sy = cy + dx * sin + dy * cos;
        Luma([sample_bicubic(gray, sx, sy)])
    })
}

fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.75;
    let t = t.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

fn sample_bicubic(img: &GrayImage, x: f64, y: f64) -> u8 {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let mut acc = 0.0;
    for m in -1..=2i64 {
        let wy = cubic_weight(fy - m as f64);
        let py = (y0 as i64 + m).clamp(0, h - 1) as u32;
        for n in -1..=2i64 {
            let wx = cubic_weight(fx - n as f64);
            let px = (x0 as i64 + n).clamp(0, w - 1) as u32;
            acc += wx * wy * img.get_pixel(px, py)[0] as f64;
        }
    }
    acc.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White 200×120 page with a 3 px dark stroke from (20, 60) to (180, 74).
    fn descending_stroke() -> GrayImage {
        let mut img = GrayImage::from_pixel(200, 120, Luma([255]));
        for x in 20..=180u32 {
            let yc = 60.0 + (x - 20) as f64 * 14.0 / 160.0;
            let yc = yc.round() as u32;
            for y in yc - 1..=yc + 1 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        img
    }

    fn horizontal_bars() -> GrayImage {
        let mut img = GrayImage::from_pixel(160, 100, Luma([255]));
        for bar_y in [20u32, 45, 70] {
            for y in bar_y..bar_y + 4 {
                for x in 15..145 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }

    #[test]
    fn blank_page_has_no_skew() {
        let img = GrayImage::from_pixel(64, 48, Luma([255]));
        assert_eq!(estimate_skew(&img), 0.0);
        assert_eq!(deskew(&img), img);
    }

    #[test]
    fn horizontal_text_is_left_alone() {
        let img = horizontal_bars();
        let angle = estimate_skew(&img);
        assert!(angle.abs() < 1.0, "angle = {angle}");
        let again = estimate_skew(&deskew(&img));
        assert!(again.abs() < 1.0, "angle after deskew = {again}");
    }

    #[test]
    fn descending_stroke_is_rotated_back() {
        let img = descending_stroke();
        let angle = estimate_skew(&img);
        let expected = (14.0f64 / 160.0).atan().to_degrees();
        assert!((angle - expected).abs() < 1.0, "angle = {angle}, expected ≈ {expected}");

        let fixed = deskew(&img);
        assert_eq!(fixed.dimensions(), img.dimensions());
        let residual = estimate_skew(&fixed);
        assert!(residual.abs() < 1.0, "residual = {residual}");
    }

    #[test]
    fn rising_stroke_gets_negative_correction() {
        let img = image::imageops::flip_vertical(&descending_stroke());
        let angle = estimate_skew(&img);
        assert!(angle < -4.0 && angle > -6.0, "angle = {angle}");
    }

    #[test]
    fn rotation_replicates_edges() {
        let img = GrayImage::from_pixel(50, 40, Luma([180]));
        let rotated = rotate_replicate(&img, 30.0);
        assert!(rotated.pixels().all(|p| p[0] == 180));
    }

    #[test]
    fn binarize_marks_ink_as_foreground() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([240]));
        img.put_pixel(4, 4, Luma([10]));
        let mask = binarize_ink(&img);
        assert_eq!(mask.get_pixel(4, 4)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn rect_angle_of_axis_aligned_block() {
        let pts = [
            Point::new(10, 10),
            Point::new(90, 10),
            Point::new(90, 30),
            Point::new(10, 30),
            Point::new(50, 20),
        ];
        let theta = min_area_rect_angle(&pts).unwrap();
        assert!((-90.0..0.0).contains(&theta), "theta = {theta}");
        // Either side of an axis-aligned rectangle reads as level text.
        assert!(theta < -89.0 || theta > -1.0, "theta = {theta}");
        assert_eq!(min_area_rect_angle(&[]), None);
    }

    #[test]
    fn single_point_has_no_skew() {
        assert_eq!(min_area_rect_angle(&[Point::new(4, 4)]), Some(-90.0));
    }
}
