//! Extraction: PDF → [`PageTextStore`].
//!
//! ## Flow
//!
//! ```text
//! extract(input, config)
//!   ├── Extractor::from_config   strategy chosen once; missing credentials fail here
//!   ├── input::resolve_input     path / URL / bytes → local %PDF file
//!   └── extract_document
//!         ├── rasterize_document  every page, in order (spawn_blocking)
//!         ├── for each page:      extractor.extract(page, image)
//!         │                       failure → placeholder entry, next page
//!         └── PageTextStore::from_outcomes
//! ```
//!
//! Pages are processed one at a time, in page order. A failed page never
//! stops the document: its entry records the error and extraction goes on.
//! Only document-level problems (unreadable input, pdfium missing, no
//! provider) return `Err`.

use crate::config::{ExtractionConfig, ExtractionStrategy};
use crate::error::{PageError, Pdf2HandError};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::rasterize::{rasterize_document, PdfiumRasterizer, RasterOptions, Rasterizer};
use crate::pipeline::remote::RemoteExtractor;
use crate::progress::Stage;
use crate::store::{ExtractionMethod, PageTextStore};
use image::{DynamicImage, ImageFormat};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[cfg(feature = "ocr")]
use crate::pipeline::ocr::LocalOcrExtractor;

/// One page bitmap in, plain text out.
///
/// Implemented by both extraction strategies; the driver never knows which
/// one it is talking to.
pub trait TextExtractor: Send + Sync {
    /// Label recorded on every store entry this extractor produces.
    fn method(&self) -> ExtractionMethod;

    /// Extract the text of page `page` (1-based).
    fn extract(
        &self,
        page: usize,
        image: &DynamicImage,
    ) -> impl Future<Output = Result<String, PageError>> + Send;
}

impl TextExtractor for RemoteExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Vlm
    }

    fn extract(
        &self,
        page: usize,
        image: &DynamicImage,
    ) -> impl Future<Output = Result<String, PageError>> + Send {
        self.extract_page(page, image)
    }
}

#[cfg(feature = "ocr")]
impl TextExtractor for LocalOcrExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn extract(
        &self,
        page: usize,
        image: &DynamicImage,
    ) -> impl Future<Output = Result<String, PageError>> + Send {
        self.extract_page(page, image)
    }
}

/// The extraction strategy selected by [`ExtractionConfig::strategy`].
#[derive(Clone)]
pub enum Extractor {
    Remote(RemoteExtractor),
    #[cfg(feature = "ocr")]
    Local(LocalOcrExtractor),
}

impl Extractor {
    /// Build the configured strategy.
    ///
    /// # Errors
    ///
    /// - [`Pdf2HandError::ProviderNotConfigured`]: remote strategy without
    ///   usable credentials
    /// - [`Pdf2HandError::OcrUnavailable`]: local strategy without models, or
    ///   a build without the `ocr` feature
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2HandError> {
        match config.strategy {
            ExtractionStrategy::Remote => RemoteExtractor::from_config(config).map(Extractor::Remote),
            #[cfg(feature = "ocr")]
            ExtractionStrategy::Local => LocalOcrExtractor::from_config(config).map(Extractor::Local),
            #[cfg(not(feature = "ocr"))]
            ExtractionStrategy::Local => Err(Pdf2HandError::OcrUnavailable(
                "built without the `ocr` feature; rebuild with `--features ocr` \
                 or use the remote strategy"
                    .to_string(),
            )),
        }
    }
}

impl TextExtractor for Extractor {
    fn method(&self) -> ExtractionMethod {
        match self {
            Extractor::Remote(r) => r.method(),
            #[cfg(feature = "ocr")]
            Extractor::Local(l) => l.method(),
        }
    }

    fn extract(
        &self,
        page: usize,
        image: &DynamicImage,
    ) -> impl Future<Output = Result<String, PageError>> + Send {
        async move {
            match self {
                Extractor::Remote(r) => r.extract_page(page, image).await,
                #[cfg(feature = "ocr")]
                Extractor::Local(l) => l.extract_page(page, image).await,
            }
        }
    }
}

/// Extract every page of the PDF at `path` with an explicit backend pair.
///
/// This is the driver behind [`extract`]; it is public so callers can plug
/// in their own [`Rasterizer`] or [`TextExtractor`].
pub async fn extract_document<R, E>(
    path: &Path,
    rasterizer: Arc<R>,
    extractor: &E,
    config: &ExtractionConfig,
) -> Result<PageTextStore, Pdf2HandError>
where
    R: Rasterizer + ?Sized,
    E: TextExtractor,
{
    let start = Instant::now();
    let options = RasterOptions {
        dpi: config.dpi,
        max_pixels: config.max_rendered_pixels,
        password: config.password.clone(),
    };
    let pages = rasterize_document(rasterizer, path, &options).await?;
    let total = pages.len();

    if let Some(ref dir) = config.artifact_dir {
        std::fs::create_dir_all(dir).map_err(|e| Pdf2HandError::OutputWriteFailed {
            path: dir.clone(),
            source: e,
        })?;
    }

    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Extract, total);
    }

    let mut outcomes = Vec::with_capacity(total);
    for (idx, image) in pages.iter().enumerate() {
        let page = idx + 1;

        if let Some(ref dir) = config.artifact_dir {
            let artifact = dir.join(format!("page_{page}.png"));
            if let Err(e) = image.save_with_format(&artifact, ImageFormat::Png) {
                warn!("Page {}: could not save {}: {}", page, artifact.display(), e);
            }
        }

        if let Some(cb) = cb {
            cb.on_page_start(Stage::Extract, page, total);
        }

        let outcome = extractor.extract(page, image).await;
        match &outcome {
            Ok(text) => {
                debug!("Page {}/{}: {} chars", page, total, text.chars().count());
                if let Some(cb) = cb {
                    cb.on_page_complete(Stage::Extract, page, total, text.chars().count());
                }
            }
            Err(e) => {
                warn!("Page {}/{}: {}; recording placeholder", page, total, e);
                if let Some(cb) = cb {
                    cb.on_page_error(Stage::Extract, page, total, &e.to_string());
                }
            }
        }
        outcomes.push(outcome);
    }

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    if let Some(cb) = cb {
        cb.on_stage_complete(Stage::Extract, total, succeeded);
    }
    info!(
        "Extracted {}/{} pages ({}) in {:?}",
        succeeded,
        total,
        extractor.method(),
        start.elapsed()
    );

    Ok(PageTextStore::from_outcomes(extractor.method(), outcomes))
}

/// Extract the text of every page of a PDF (local path or URL).
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2hand::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = extract("letter.pdf", &ExtractionConfig::default()).await?;
/// for (page, entry) in store.iter() {
///     println!("{page}: {}", entry.text);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<PageTextStore, Pdf2HandError> {
    let extractor = Extractor::from_config(config)?;
    let resolved = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    extract_resolved(&resolved, &extractor, config).await
}

/// Extract from PDF bytes held in memory (an uploaded file).
///
/// The bytes are spilled to a managed temp file that is removed on return.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<PageTextStore, Pdf2HandError> {
    let extractor = Extractor::from_config(config)?;
    let resolved = input::resolve_bytes(bytes)?;
    extract_resolved(&resolved, &extractor, config).await
}

/// [`extract`], then save the store to `store_path`.
///
/// An existing store at that path is replaced wholesale.
pub async fn extract_to_file(
    input: impl AsRef<str>,
    store_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<PageTextStore, Pdf2HandError> {
    let store = extract(input, config).await?;
    store.save(store_path.as_ref())?;
    info!("Page-text store written to {}", store_path.as_ref().display());
    Ok(store)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<PageTextStore, Pdf2HandError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2HandError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input, config))
}

async fn extract_resolved(
    resolved: &ResolvedInput,
    extractor: &Extractor,
    config: &ExtractionConfig,
) -> Result<PageTextStore, Pdf2HandError> {
    let rasterizer = match config.pdfium_lib_path {
        Some(ref lib) => PdfiumRasterizer::with_library(lib),
        None => PdfiumRasterizer::new(),
    };
    extract_document(resolved.path(), Arc::new(rasterizer), extractor, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Blank(usize);

    impl Rasterizer for Blank {
        fn rasterize(
            &self,
            _path: &Path,
            _options: &RasterOptions,
        ) -> Result<Vec<DynamicImage>, Pdf2HandError> {
            Ok((0..self.0)
                .map(|_| DynamicImage::ImageRgb8(RgbImage::new(8, 8)))
                .collect())
        }
    }

    /// Echoes the page number and counts calls.
    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    impl TextExtractor for Echo {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::Ocr
        }

        fn extract(
            &self,
            page: usize,
            _image: &DynamicImage,
        ) -> impl Future<Output = Result<String, PageError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(format!("page {page}")))
        }
    }

    #[tokio::test]
    async fn one_entry_per_page_in_order() {
        let echo = Echo::default();
        let store = extract_document(
            Path::new("doc.pdf"),
            Arc::new(Blank(4)),
            &echo,
            &ExtractionConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 4);
        for (page, entry) in store.iter() {
            assert_eq!(entry.text, format!("page {page}"));
            assert_eq!(entry.method, Some(ExtractionMethod::Ocr));
        }
    }

    #[tokio::test]
    async fn artifacts_are_saved_per_page() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifacts = dir.path().join("artifacts");
        let config = ExtractionConfig::builder()
            .artifact_dir(&artifacts)
            .build()
            .unwrap();

        extract_document(Path::new("doc.pdf"), Arc::new(Blank(2)), &Echo::default(), &config)
            .await
            .unwrap();

        assert!(artifacts.join("page_1.png").exists());
        assert!(artifacts.join("page_2.png").exists());
    }

    #[tokio::test]
    async fn empty_document_produces_no_store() {
        let err = extract_document(
            Path::new("doc.pdf"),
            Arc::new(Blank(0)),
            &Echo::default(),
            &ExtractionConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2HandError::EmptyDocument { .. }));
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn local_strategy_needs_ocr_feature() {
        let config = ExtractionConfig::builder()
            .strategy(ExtractionStrategy::Local)
            .build()
            .unwrap();
        let err = Extractor::from_config(&config).err().unwrap();
        assert!(matches!(err, Pdf2HandError::OcrUnavailable(_)));
    }
}
