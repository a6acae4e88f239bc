//! PDF rasterisation: render every page to a `DynamicImage`.
//!
//! ## Why a trait?
//!
//! The rest of the pipeline only needs "path in, ordered bitmaps out". The
//! [`Rasterizer`] trait is that boundary: [`PdfiumRasterizer`] is the real
//! backend, tests plug in an in-memory one and never need a pdfium binary.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! [`rasterize_document`] moves the whole document onto the blocking pool
//! so Tokio worker threads keep serving the remote extraction calls.

use crate::error::Pdf2HandError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const POINTS_PER_INCH: f32 = 72.0;

/// Rasterisation settings for one document.
#[derive(Debug, Clone)]
pub struct RasterOptions {
    pub dpi: u32,
    /// Cap on either output dimension, in pixels.
    pub max_pixels: u32,
    pub password: Option<String>,
}

/// Backend that turns a PDF into one bitmap per page, in page order.
///
/// Implementations are blocking; callers go through [`rasterize_document`].
pub trait Rasterizer: Send + Sync + 'static {
    /// Render every page of `path`.
    fn rasterize(&self, path: &Path, options: &RasterOptions)
        -> Result<Vec<DynamicImage>, Pdf2HandError>;

    /// Number of pages in `path`. The default renders at 72 DPI and counts.
    fn page_count(&self, path: &Path, password: Option<&str>) -> Result<usize, Pdf2HandError> {
        let options = RasterOptions {
            dpi: 72,
            max_pixels: 1024,
            password: password.map(str::to_string),
        };
        self.rasterize(path, &options).map(|pages| pages.len())
    }
}

/// Rasterise `path` on the blocking pool.
///
/// A document that opens but has no pages is rejected with
/// [`Pdf2HandError::EmptyDocument`]: there is nothing to extract.
pub async fn rasterize_document<R: Rasterizer + ?Sized>(
    rasterizer: Arc<R>,
    path: &Path,
    options: &RasterOptions,
) -> Result<Vec<DynamicImage>, Pdf2HandError> {
    let owned_path = path.to_path_buf();
    let opts = options.clone();

    let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&owned_path, &opts))
        .await
        .map_err(|e| Pdf2HandError::Internal(format!("Render task panicked: {}", e)))??;

    if pages.is_empty() {
        return Err(Pdf2HandError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }
    info!("Rasterised {} pages at {} DPI", pages.len(), options.dpi);
    Ok(pages)
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// [`Rasterizer`] backed by a dynamically loaded pdfium library.
///
/// Library discovery order:
/// 1. The explicit path given to [`PdfiumRasterizer::with_library`]
///    (a library file or the directory holding it).
/// 2. `PDFIUM_LIB_PATH`.
/// 3. The working directory, then the directory of the running executable.
/// 4. The system library search path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            lib_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, Pdf2HandError> {
        let explicit = self
            .lib_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        if let Some(path) = explicit {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path.clone()
            };
            debug!("Binding pdfium from {}", lib.display());
            let bindings = Pdfium::bind_to_library(&lib).map_err(|e| {
                Pdf2HandError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?;
            return Ok(Pdfium::new(bindings));
        }

        let mut candidates = vec![PathBuf::from(".")];
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir);
        }
        for dir in &candidates {
            let lib = Pdfium::pdfium_platform_library_name_at_path(dir);
            if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
                debug!("Bound pdfium from {}", dir.display());
                return Ok(Pdfium::new(bindings));
            }
        }

        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| Pdf2HandError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        path: &Path,
        options: &RasterOptions,
    ) -> Result<Vec<DynamicImage>, Pdf2HandError> {
        let pdfium = self.bind()?;
        let password = options.password.as_deref();

        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| map_load_error(path, password.is_some(), e))?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let (w, h) = target_dimensions(
                page.width().value,
                page.height().value,
                options.dpi,
                options.max_pixels,
            );
            let render_config = PdfRenderConfig::new()
                .set_target_width(w as i32)
                .set_maximum_height(h as i32);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Pdf2HandError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }

    fn page_count(&self, path: &Path, password: Option<&str>) -> Result<usize, Pdf2HandError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| map_load_error(path, password.is_some(), e))?;
        Ok(document.pages().len() as usize)
    }
}

fn map_load_error(path: &Path, had_password: bool, e: PdfiumError) -> Pdf2HandError {
    let err_str = format!("{:?}", e);
    if err_str.to_lowercase().contains("password") {
        if had_password {
            Pdf2HandError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2HandError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2HandError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

/// Pixel size for a page of `width_pt × height_pt` at `dpi`, with the longest
/// edge capped at `max_pixels` and the aspect ratio kept.
fn target_dimensions(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let w = (width_pt * scale).max(1.0);
    let h = (height_pt * scale).max(1.0);

    let longest = w.max(h);
    if longest > max_pixels as f32 {
        let ratio = max_pixels as f32 / longest;
        warn!(
            "Page {}x{} px exceeds the {} px cap, scaling down",
            w as u32, h as u32, max_pixels
        );
        (((w * ratio) as u32).max(1), ((h * ratio) as u32).max(1))
    } else {
        (w.round() as u32, h.round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Fixed(usize);

    impl Rasterizer for Fixed {
        fn rasterize(
            &self,
            _path: &Path,
            _options: &RasterOptions,
        ) -> Result<Vec<DynamicImage>, Pdf2HandError> {
            Ok((0..self.0)
                .map(|_| DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
                .collect())
        }
    }

    fn opts() -> RasterOptions {
        RasterOptions {
            dpi: 300,
            max_pixels: 4000,
            password: None,
        }
    }

    #[test]
    fn a4_at_300_dpi() {
        // A4 is 595 × 842 pt.
        assert_eq!(target_dimensions(595.0, 842.0, 300, 4000), (2479, 3508));
    }

    #[test]
    fn oversized_page_is_capped() {
        let (w, h) = target_dimensions(2384.0, 3370.0, 300, 4000);
        assert!((3999..=4000).contains(&h), "h = {h}");
        assert!(w < h);
    }

    #[tokio::test]
    async fn zero_pages_is_an_empty_document() {
        let err = rasterize_document(Arc::new(Fixed(0)), Path::new("x.pdf"), &opts())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2HandError::EmptyDocument { .. }));
    }

    #[tokio::test]
    async fn pages_come_back_in_order() {
        let pages = rasterize_document(Arc::new(Fixed(3)), Path::new("x.pdf"), &opts())
            .await
            .unwrap();
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn default_page_count_counts_rendered_pages() {
        assert_eq!(Fixed(5).page_count(Path::new("x.pdf"), None).unwrap(), 5);
    }
}
