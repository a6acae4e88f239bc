//! Local extraction: deskew the page, then read it with the `ocrs` engine.
//!
//! Only compiled with the `ocr` feature. The engine needs two model files,
//! `text-detection.rten` and `text-recognition.rten`, taken from the
//! configured model directory or `$XDG_CACHE_HOME/ocrs` (the directory the
//! `ocrs` CLI downloads them to). Models are loaded once per job; the
//! engine is shared by every page.
//!
//! Deskew and recognition are CPU-bound and run on the blocking pool.

use super::deskew::deskew;
use crate::config::ExtractionConfig;
use crate::error::{PageError, Pdf2HandError};
use image::{DynamicImage, ImageFormat};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// OCR text extractor with the deskew preprocessor in front.
#[derive(Clone)]
pub struct LocalOcrExtractor {
    engine: Arc<OcrEngine>,
    artifact_dir: Option<PathBuf>,
}

impl LocalOcrExtractor {
    /// Load the models named by `config` (or the default cache directory).
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2HandError> {
        let dir = config.ocr_model_dir.clone().unwrap_or_else(default_model_dir);
        let engine = load_engine(&dir)?;
        Ok(Self {
            engine: Arc::new(engine),
            artifact_dir: config.artifact_dir.clone(),
        })
    }

    /// Extract the text of one page. `page` is 1-based.
    ///
    /// When an artifact directory is configured the deskewed page is saved
    /// there as `preproc_<page>.png`.
    pub async fn extract_page(&self, page: usize, image: &DynamicImage) -> Result<String, PageError> {
        let engine = Arc::clone(&self.engine);
        let artifact_dir = self.artifact_dir.clone();
        let gray = image.to_luma8();

        tokio::task::spawn_blocking(move || {
            let deskewed = DynamicImage::ImageLuma8(deskew(&gray));

            if let Some(dir) = artifact_dir {
                let path = dir.join(format!("preproc_{page}.png"));
                if let Err(e) = deskewed.save_with_format(&path, ImageFormat::Png) {
                    warn!("Page {}: could not save {}: {}", page, path.display(), e);
                }
            }

            let rgb = deskewed.to_rgb8();
            let failed = |detail: String| PageError::OcrFailed { page, detail };

            let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
                .map_err(|e| failed(format!("image source: {e}")))?;
            let input = engine
                .prepare_input(source)
                .map_err(|e| failed(format!("preprocessing: {e}")))?;
            let text = engine
                .get_text(&input)
                .map_err(|e| failed(format!("recognition: {e}")))?;

            debug!("Page {}: OCR produced {} chars", page, text.len());
            Ok(text.trim().to_string())
        })
        .await
        .map_err(|e| PageError::OcrFailed {
            page,
            detail: format!("OCR task panicked: {e}"),
        })?
    }
}

fn load_engine(dir: &Path) -> Result<OcrEngine, Pdf2HandError> {
    let detection_path = dir.join(DETECTION_MODEL_FILENAME);
    let recognition_path = dir.join(RECOGNITION_MODEL_FILENAME);

    for path in [&detection_path, &recognition_path] {
        if !path.exists() {
            return Err(Pdf2HandError::OcrUnavailable(format!(
                "model not found at {}; run the `ocrs` CLI once to download models \
                 or pass --ocr-models <DIR>",
                path.display()
            )));
        }
    }

    info!("Loading OCR models from {}", dir.display());
    let load = |path: &Path| {
        Model::load_file(path).map_err(|e| {
            Pdf2HandError::OcrUnavailable(format!("failed to load {}: {}", path.display(), e))
        })
    };
    let detection_model = load(&detection_path)?;
    let recognition_model = load(&recognition_path)?;

    OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })
    .map_err(|e| Pdf2HandError::OcrUnavailable(format!("failed to initialise OCR engine: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_models_are_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ExtractionConfig::builder()
            .ocr_model_dir(dir.path())
            .build()
            .unwrap();
        let err = LocalOcrExtractor::from_config(&config).err().unwrap();
        assert!(matches!(err, Pdf2HandError::OcrUnavailable(ref m) if m.contains(DETECTION_MODEL_FILENAME)));
    }

    #[test]
    fn default_dir_ends_with_ocrs() {
        assert!(default_model_dir().ends_with("ocrs") || default_model_dir().ends_with("ocrs-models"));
    }
}
