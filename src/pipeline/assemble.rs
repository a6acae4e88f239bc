//! Rendered page images → one multi-page PDF.
//!
//! Each image fills its own page exactly. The page size is derived from the
//! pixel size and [`AssemblyOptions::resolution`]: a 1200×1600 canvas at
//! 100 DPI becomes a 12×16 inch (304.8×406.4 mm) page. Pixels are embedded
//! as-is, never resampled.

use crate::config::AssemblyOptions;
use crate::error::Pdf2HandError;
use crate::store::write_atomic;
use image::RgbImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use std::path::Path;
use tracing::{debug, info, warn};

const MM_PER_INCH: f32 = 25.4;

/// Physical page size, in millimetres, for a `width × height` pixel image.
pub fn page_size_mm(width: u32, height: u32, resolution: f32) -> (Mm, Mm) {
    (
        Mm(width as f32 / resolution * MM_PER_INCH),
        Mm(height as f32 / resolution * MM_PER_INCH),
    )
}

/// Build a PDF with one page per image, in order.
///
/// # Errors
///
/// [`Pdf2HandError::NothingToAssemble`] when `pages` is empty;
/// [`Pdf2HandError::InvalidConfig`] for a non-positive resolution.
pub fn assemble(pages: &[RgbImage], options: &AssemblyOptions) -> Result<Vec<u8>, Pdf2HandError> {
    if pages.is_empty() {
        return Err(Pdf2HandError::NothingToAssemble);
    }
    let resolution = options.resolution;
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(Pdf2HandError::InvalidConfig(format!(
            "Output resolution must be positive, got {resolution}"
        )));
    }

    let mut doc = PdfDocument::new(&options.title);
    let mut pdf_pages = Vec::with_capacity(pages.len());

    for (idx, page) in pages.iter().enumerate() {
        let (width, height) = page.dimensions();
        let raw = RawImage {
            pixels: RawImageData::U8(page.as_raw().clone()),
            width: width as usize,
            height: height as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let xobject_id = doc.add_image(&raw);

        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: None,
                scale_y: None,
                dpi: Some(resolution),
                rotate: None,
            },
        }];

        let (page_w, page_h) = page_size_mm(width, height, resolution);
        debug!(
            "Page {}: {}x{} px → {:.1}x{:.1} mm",
            idx + 1,
            width,
            height,
            page_w.0,
            page_h.0
        );
        pdf_pages.push(PdfPage::new(page_w, page_h, ops));
    }

    doc.with_pages(pdf_pages);

    // The writer's default image optimisation downscales large bitmaps.
    let save_options = PdfSaveOptions {
        image_optimization: None,
        ..Default::default()
    };
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let bytes = doc.save(&save_options, &mut warnings);
    if !warnings.is_empty() {
        warn!("PDF writer reported {} warnings", warnings.len());
    }
    info!("Assembled {} pages ({} bytes)", pages.len(), bytes.len());
    Ok(bytes)
}

/// [`assemble`] and write the result to `path`.
///
/// Nothing is written when assembly fails, so an existing file at `path`
/// survives an empty input.
pub fn assemble_to_file(
    pages: &[RgbImage],
    path: &Path,
    options: &AssemblyOptions,
) -> Result<(), Pdf2HandError> {
    let bytes = assemble(pages, options)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn page(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([250, 245, 230]))
    }

    fn page_count(bytes: &[u8]) -> usize {
        lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
    }

    /// `(Width, Height)` of every image XObject in the document.
    fn embedded_image_sizes(bytes: &[u8]) -> Vec<(i64, i64)> {
        let doc = lopdf::Document::load_mem(bytes).unwrap();
        doc.objects
            .values()
            .filter_map(|obj| obj.as_stream().ok())
            .filter(|stream| {
                stream
                    .dict
                    .get(b"Subtype")
                    .and_then(|s| s.as_name())
                    .is_ok_and(|name| name == b"Image")
            })
            .map(|stream| {
                let dim = |key: &[u8]| stream.dict.get(key).and_then(|v| v.as_i64()).unwrap();
                (dim(b"Width"), dim(b"Height"))
            })
            .collect()
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = assemble(&[], &AssemblyOptions::default()).unwrap_err();
        assert!(matches!(err, Pdf2HandError::NothingToAssemble));
    }

    #[test]
    fn one_page_per_image() {
        let pages = vec![page(120, 160), page(120, 160), page(120, 160)];
        let bytes = assemble(&pages, &AssemblyOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(page_count(&bytes), 3);
    }

    #[test]
    fn full_size_pages_are_embedded_unscaled() {
        // Busy content so the bitmap neither compresses to nothing nor
        // fits under the writer's default size budget.
        let busy = RgbImage::from_fn(1200, 1600, |x, y| {
            let v = ((x * 7 + y * 13) ^ (x * y)) as u8;
            Rgb([v, v.wrapping_add(85), v.wrapping_add(170)])
        });
        let bytes = assemble(&[busy], &AssemblyOptions::default()).unwrap();
        assert_eq!(embedded_image_sizes(&bytes), vec![(1200, 1600)]);
    }

    #[test]
    fn page_size_follows_resolution() {
        let (w, h) = page_size_mm(1200, 1600, 100.0);
        assert!((w.0 - 304.8).abs() < 0.01);
        assert!((h.0 - 406.4).abs() < 0.01);

        let (w, _) = page_size_mm(1200, 1600, 200.0);
        assert!((w.0 - 152.4).abs() < 0.01);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let options = AssemblyOptions {
            resolution: 0.0,
            ..Default::default()
        };
        let err = assemble(&[page(10, 10)], &options).unwrap_err();
        assert!(matches!(err, Pdf2HandError::InvalidConfig(_)));
    }

    #[test]
    fn failed_assembly_leaves_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"previous").unwrap();

        assert!(assemble_to_file(&[], &path, &AssemblyOptions::default()).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
    }

    #[test]
    fn writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.pdf");
        assemble_to_file(&[page(50, 50)], &path, &AssemblyOptions::default()).unwrap();
        assert_eq!(page_count(&std::fs::read(&path).unwrap()), 1);
    }
}
