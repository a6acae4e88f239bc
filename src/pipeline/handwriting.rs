//! Synthetic handwriting: one page of text → one "handwritten" page image.
//!
//! ## Render order
//!
//! 1. Canvas: solid paper colour, or the template image resized to the canvas
//! 2. Paper texture: per-pixel, per-channel Gaussian noise (σ = `texture_sigma`)
//! 3. Text: word-wrapped lines drawn in ink from the top-left margin
//! 4. Ink bleed: Gaussian blur over the whole page (σ = `blur_radius`)
//! 5. Scan grain: a second noise pass (σ = `noise_strength`)
//!
//! Texture goes on before the ink so the grain sits under the strokes; the
//! final grain goes on after the blur so it stays sharp.
//!
//! ## Two scales
//!
//! Glyphs are drawn at `font_size × glyph_scale` (60 px by default) while the
//! cursor advances by `font_size + line_gap` (60 px). With other settings the
//! lines can overlap or spread apart; text is never shrunk to fit, and lines
//! past the bottom edge are dropped.

use super::typeface::Typeface;
use crate::config::{Background, RenderStyle, PLAIN_LIGHT_RGB};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::Path;
use tracing::{debug, warn};

/// Renders page texts with one fixed [`RenderStyle`].
///
/// Construction resolves the typeface and decodes the template once; every
/// [`render`](Self::render) call reuses them. Noise comes from an internal
/// RNG, seeded from [`RenderStyle::seed`] when set.
pub struct HandwritingRenderer {
    style: RenderStyle,
    typeface: Typeface,
    template: Option<RgbImage>,
    rng: StdRng,
}

impl HandwritingRenderer {
    pub fn new(style: RenderStyle) -> Self {
        let typeface = Typeface::load(&style.typeface);
        let template = match &style.background {
            Background::Template(path) => load_template(path, style.canvas_width, style.canvas_height),
            _ => None,
        };
        let rng = match style.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            style,
            typeface,
            template,
            rng,
        }
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// True when the requested typeface could not be loaded (or none was).
    pub fn uses_builtin_typeface(&self) -> bool {
        self.typeface.is_builtin()
    }

    /// Render `text` onto a fresh page.
    ///
    /// The result is always exactly `canvas_width × canvas_height`.
    pub fn render(&mut self, text: &str) -> RgbImage {
        let style = &self.style;
        let mut canvas = match &self.template {
            Some(template) => template.clone(),
            None => {
                let paper = style
                    .background
                    .solid_color()
                    .unwrap_or(Rgb(PLAIN_LIGHT_RGB));
                RgbImage::from_pixel(style.canvas_width, style.canvas_height, paper)
            }
        };

        add_gaussian_noise(&mut canvas, style.texture_sigma, &mut self.rng);

        let ink = Rgb(style.ink);
        let glyph_px = style.glyph_px();
        let advance = style.line_advance() as i64;
        let bottom = style.canvas_height as i64;
        let x = style.margin_left as i32;
        let mut y = style.margin_top as i64;
        let mut drawn = 0usize;

        for line in layout_lines(text, style.wrap_chars) {
            if y >= bottom {
                break;
            }
            if !line.trim().is_empty() {
                self.typeface
                    .draw_line(&mut canvas, x, y as i32, glyph_px, ink, &line);
                drawn += 1;
            }
            y += advance;
        }
        debug!("Drew {} lines", drawn);

        if style.blur_radius > 0.0 {
            canvas = gaussian_blur_f32(&canvas, style.blur_radius);
        }
        add_gaussian_noise(&mut canvas, style.noise_strength, &mut self.rng);

        canvas
    }
}

fn load_template(path: &Path, width: u32, height: u32) -> Option<RgbImage> {
    match image::open(path) {
        Ok(img) => Some(imageops::resize(
            &img.to_rgb8(),
            width,
            height,
            FilterType::Lanczos3,
        )),
        Err(e) => {
            warn!(
                "Template background {} unusable ({}), using plain light paper",
                path.display(),
                e
            );
            None
        }
    }
}

/// Add zero-mean Gaussian noise to every channel of every pixel, clamped.
fn add_gaussian_noise(img: &mut RgbImage, sigma: f32, rng: &mut StdRng) {
    if sigma <= 0.0 {
        return;
    }
    let Ok(normal) = Normal::new(0.0f32, sigma) else {
        return;
    };
    for v in img.iter_mut() {
        let n: f32 = normal.sample(rng);
        *v = (*v as f32 + n).round().clamp(0.0, 255.0) as u8;
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// Split `text` on line breaks and wrap every line to `width` characters.
///
/// An empty input line yields one empty output line, so blank lines keep
/// their vertical space.
pub fn layout_lines(text: &str, width: usize) -> Vec<String> {
    text.split('\n')
        .flat_map(|line| wrap_line(line.trim_end_matches('\r'), width))
        .collect()
}

/// Greedy word wrap by character count.
///
/// Whitespace inside a line is kept as written; the whitespace run where a
/// line is broken is dropped. Words longer than `width` are split.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    if line.chars().count() <= width {
        return vec![line.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for token in runs(line) {
        let token_len = token.chars().count();
        let is_space = token.starts_with(char::is_whitespace);

        if current_len + token_len <= width {
            current.push_str(token);
            current_len += token_len;
            continue;
        }

        if is_space {
            if current_len > 0 {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            continue;
        }

        if current_len > 0 {
            out.push(current.trim_end().to_string());
            current.clear();
        }
        let mut chars: Vec<char> = token.chars().collect();
        while chars.len() > width {
            out.push(chars.drain(..width).collect());
        }
        current_len = chars.len();
        current = chars.into_iter().collect();
    }

    if current_len > 0 || out.is_empty() {
        out.push(current);
    }
    out
}

/// Maximal runs of whitespace and of non-whitespace, in order.
fn runs(line: &str) -> impl Iterator<Item = &str> {
    let mut rest = line;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let space = first.is_whitespace();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace() != space)
            .map_or(rest.len(), |(i, _)| i);
        let (run, tail) = rest.split_at(end);
        rest = tail;
        Some(run)
    })
}
