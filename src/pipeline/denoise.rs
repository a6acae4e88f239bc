//! Non-local-means denoising for grayscale page scans.
//!
//! Each output pixel is a weighted mean of the pixels in a search window
//! around it; a neighbour's weight is `exp(-d / h²)` where `d` is the mean
//! squared difference between the two surrounding patches. Isolated scan
//! speckle has no similar patch nearby and gets averaged away, while strokes
//! repeat along their own length and survive.
//!
//! The patch distance for one search offset is computed for the whole image
//! at once through an integral image of squared differences, so the cost is
//! `O(pixels × search window)` independent of the patch size.

use image::GrayImage;

/// Filter parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlMeansParams {
    /// Filter strength. Larger values remove more noise and more detail.
    pub h: f32,
    /// Patch half-size: patches are `(2r + 1)²` pixels.
    pub patch_radius: u32,
    /// Search half-size: neighbours are taken from a `(2s + 1)²` window.
    pub search_radius: u32,
}

impl Default for NlMeansParams {
    fn default() -> Self {
        Self {
            h: 30.0,
            patch_radius: 3,
            search_radius: 5,
        }
    }
}

/// Denoise `image`. Borders are handled by replicating edge pixels.
pub fn non_local_means(image: &GrayImage, params: &NlMeansParams) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || params.h <= 0.0 {
        return image.clone();
    }

    let (wu, hu) = (w as usize, h as usize);
    let src = image.as_raw();
    let r = params.patch_radius as i64;
    let s = params.search_radius as i64;
    let inv_h2 = 1.0 / (params.h * params.h);
    let stride = wu + 1;

    let mut weight_sum = vec![0f32; wu * hu];
    let mut value_sum = vec![0f32; wu * hu];
    let mut sq_diff = vec![0u32; wu * hu];
    let mut integral = vec![0u64; stride * (hu + 1)];

    let clamp = |v: i64, hi: usize| v.clamp(0, hi as i64 - 1) as usize;

    for dy in -s..=s {
        for dx in -s..=s {
            for y in 0..hu {
                let qy = clamp(y as i64 + dy, hu);
                for x in 0..wu {
                    let qx = clamp(x as i64 + dx, wu);
                    let d = src[y * wu + x] as i32 - src[qy * wu + qx] as i32;
                    sq_diff[y * wu + x] = (d * d) as u32;
                }
            }

            for y in 0..hu {
                let mut row = 0u64;
                for x in 0..wu {
                    row += sq_diff[y * wu + x] as u64;
                    integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
                }
            }

            for y in 0..hu {
                let y0 = clamp(y as i64 - r, hu);
                let y1 = clamp(y as i64 + r, hu);
                let qy = clamp(y as i64 + dy, hu);
                for x in 0..wu {
                    let x0 = clamp(x as i64 - r, wu);
                    let x1 = clamp(x as i64 + r, wu);
                    let sum = (integral[(y1 + 1) * stride + x1 + 1] + integral[y0 * stride + x0])
                        - (integral[y0 * stride + x1 + 1] + integral[(y1 + 1) * stride + x0]);
                    let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f32;
                    let weight = (-(sum as f32 / count) * inv_h2).exp();

                    let qx = clamp(x as i64 + dx, wu);
                    let idx = y * wu + x;
                    weight_sum[idx] += weight;
                    value_sum[idx] += weight * src[qy * wu + qx] as f32;
                }
            }
        }
    }

    // The zero offset always contributes weight 1, so the divisor is ≥ 1.
    let out: Vec<u8> = value_sum
        .iter()
        .zip(&weight_sum)
        .map(|(v, w)| (v / w).round().clamp(0.0, 255.0) as u8)
        .collect();

    GrayImage::from_raw(w, h, out).unwrap_or_else(|| image.clone())
}
