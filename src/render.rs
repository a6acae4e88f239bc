//! Rendering: [`PageTextStore`] → handwritten PDF.
//!
//! Entries are rendered one by one, in page order. With
//! [`AssemblyOptions::skip_empty`] (the default) blank entries produce no
//! page, so a 2-entry store with texts `"Hello\nWorld"` and `""` yields a
//! 1-page document. A store where every entry is blank has nothing to
//! assemble and fails with [`Pdf2HandError::NothingToAssemble`] without
//! touching the output path.

use crate::config::{AssemblyOptions, RenderStyle};
use crate::error::Pdf2HandError;
use crate::pipeline::assemble::assemble;
use crate::pipeline::handwriting::HandwritingRenderer;
use crate::progress::Stage;
use crate::store::{write_atomic, PageTextStore};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counts from one rendering run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderStats {
    /// Pages written to the output document.
    pub rendered: usize,
    /// Blank entries left out.
    pub skipped: usize,
    /// Where the PDF was written, for the `_to_file` variant.
    pub output_path: Option<PathBuf>,
}

/// A rendered document held in memory.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub pdf: Vec<u8>,
    pub stats: RenderStats,
}

/// Render every page of `store` and assemble them into one PDF.
///
/// # Errors
///
/// - [`Pdf2HandError::NothingToAssemble`]: no entry produced a page
/// - [`Pdf2HandError::OutputWriteFailed`]: the page image directory could
///   not be created
pub fn render_store(
    store: &PageTextStore,
    style: &RenderStyle,
    options: &AssemblyOptions,
) -> Result<RenderedDocument, Pdf2HandError> {
    let start = Instant::now();
    let (pages, mut stats) = render_pages(store, style, options)?;
    let pdf = assemble(&pages, options)?;

    stats.rendered = pages.len();
    info!(
        "Rendered {} pages ({} skipped) in {:?}",
        stats.rendered,
        stats.skipped,
        start.elapsed()
    );
    Ok(RenderedDocument { pdf, stats })
}

/// [`render_store`], then write the PDF atomically to `output_path`.
pub fn render_store_to_file(
    store: &PageTextStore,
    output_path: impl AsRef<Path>,
    style: &RenderStyle,
    options: &AssemblyOptions,
) -> Result<RenderStats, Pdf2HandError> {
    let path = output_path.as_ref();
    let document = render_store(store, style, options)?;
    write_atomic(path, &document.pdf)?;

    let mut stats = document.stats;
    stats.output_path = Some(path.to_path_buf());
    Ok(stats)
}

fn render_pages(
    store: &PageTextStore,
    style: &RenderStyle,
    options: &AssemblyOptions,
) -> Result<(Vec<RgbImage>, RenderStats), Pdf2HandError> {
    if let Some(ref dir) = options.page_image_dir {
        std::fs::create_dir_all(dir).map_err(|e| Pdf2HandError::OutputWriteFailed {
            path: dir.clone(),
            source: e,
        })?;
    }

    let mut renderer = HandwritingRenderer::new(style.clone());
    if renderer.uses_builtin_typeface() {
        debug!("Rendering with the built-in bitmap typeface");
    }

    let total = store.len();
    let cb = options.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Render, total);
    }

    let mut pages = Vec::new();
    let mut stats = RenderStats::default();

    for (page, entry) in store.iter() {
        if options.skip_empty && entry.is_blank() {
            debug!("Page {}: empty, skipped", page);
            stats.skipped += 1;
            if let Some(cb) = cb {
                cb.on_page_skipped(Stage::Render, page, total);
            }
            continue;
        }

        if let Some(cb) = cb {
            cb.on_page_start(Stage::Render, page, total);
        }
        let image = renderer.render(&entry.text);

        if let Some(ref dir) = options.page_image_dir {
            let path = dir.join(format!("Page_{page}.png"));
            if let Err(e) = image.save(&path) {
                warn!("Page {}: could not save {}: {}", page, path.display(), e);
            }
        }

        if let Some(cb) = cb {
            cb.on_page_complete(Stage::Render, page, total, entry.text.chars().count());
        }
        pages.push(image);
    }

    if let Some(cb) = cb {
        cb.on_stage_complete(Stage::Render, total, pages.len());
    }
    Ok((pages, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quick_style() -> RenderStyle {
        RenderStyle::builder()
            .canvas(300, 400)
            .seed(11)
            .build()
            .unwrap()
    }

    fn page_count(bytes: &[u8]) -> usize {
        lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn blank_entries_are_skipped() {
        let store = PageTextStore::from_texts(["Hello\nWorld", "", "  \n "]);
        let doc = render_store(&store, &quick_style(), &AssemblyOptions::default()).unwrap();
        assert_eq!(doc.stats.rendered, 1);
        assert_eq!(doc.stats.skipped, 2);
        assert_eq!(page_count(&doc.pdf), 1);
    }

    #[test]
    fn blank_entries_kept_when_asked() {
        let store = PageTextStore::from_texts(["Hello", ""]);
        let options = AssemblyOptions {
            skip_empty: false,
            ..Default::default()
        };
        let doc = render_store(&store, &quick_style(), &options).unwrap();
        assert_eq!(page_count(&doc.pdf), 2);
    }

    #[test]
    fn all_blank_store_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let store = PageTextStore::from_texts(["", ""]);

        let err = render_store_to_file(&store, &out, &quick_style(), &AssemblyOptions::default())
            .unwrap_err();
        assert!(matches!(err, Pdf2HandError::NothingToAssemble));
        assert!(!out.exists());
    }

    #[test]
    fn page_images_named_by_source_page() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("pages");
        let options = AssemblyOptions {
            page_image_dir: Some(images.clone()),
            ..Default::default()
        };
        let store = PageTextStore::from_texts(["", "second"]);
        let stats = render_store_to_file(&store, dir.path().join("out.pdf"), &quick_style(), &options)
            .unwrap();

        assert_eq!(stats.rendered, 1);
        assert!(images.join("Page_2.png").exists());
        assert!(!images.join("Page_1.png").exists());
        assert_eq!(stats.output_path, Some(dir.path().join("out.pdf")));
    }
}
