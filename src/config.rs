//! Configuration types for extraction, rendering and assembly.
//!
//! Three values cover every knob of a job:
//!
//! * [`ExtractionConfig`]: how pages are rasterised and read (DPI, local
//!   OCR vs. remote vision model, retries, credentials).
//! * [`RenderStyle`]: how the handwritten page looks (background,
//!   typeface, glyph size, texture, blur, noise).
//! * [`AssemblyOptions`]: how rendered pages become a document (resolution,
//!   title, empty-page policy).
//!
//! Each is built once at startup and passed explicitly to the stage that
//! needs it, so two jobs in the same process never share mutable settings.

use crate::error::Pdf2HandError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ── Extraction ───────────────────────────────────────────────────────────

/// Which engine reads the text off each rasterised page.
///
/// The two strategies are interchangeable, never composed: one is picked
/// when the job is configured and every page goes through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    /// Deskew, then run the on-device OCR engine (`ocr` feature).
    Local,
    /// Send the raw page bitmap to a vision language model. (default)
    #[default]
    Remote,
}

/// Configuration for turning a PDF into a page-text store.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2hand::{ExtractionConfig, ExtractionStrategy};
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .strategy(ExtractionStrategy::Remote)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rasterisation DPI. Range: 72–400. Default: 300.
    ///
    /// Higher DPI gives the OCR engine sharper glyphs at the cost of runtime
    /// and memory; 200–300 is where extraction quality stops improving for
    /// ordinary body text.
    pub dpi: u32,

    /// Cap on either dimension of a rasterised page, in pixels. Default: 4000.
    ///
    /// Protects against oversized pages (posters, drawings) where a 300-DPI
    /// render would allocate hundreds of megabytes.
    pub max_rendered_pixels: u32,

    /// Extraction engine. Default: [`ExtractionStrategy::Remote`].
    pub strategy: ExtractionStrategy,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// When set, every rasterised page is saved here as `page_<n>.png`
    /// (and the local strategy adds `preproc_<n>.png`).
    pub artifact_dir: Option<PathBuf>,

    /// Explicit path to the pdfium shared library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// LLM model identifier for the remote strategy.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the remote call. Default: 0.1.
    ///
    /// Transcription wants the model to copy what it sees; anything much
    /// above zero invites paraphrasing.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts on a failed remote call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the remote strategy, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Replacement for the built-in extraction instruction.
    pub instruction: Option<String>,

    /// Directory holding `text-detection.rten` and `text-recognition.rten`
    /// for the local strategy. `None` uses the ocrs cache directory.
    pub ocr_model_dir: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            strategy: ExtractionStrategy::default(),
            password: None,
            artifact_dir: None,
            pdfium_lib_path: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            instruction: None,
            ocr_model_dir: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("strategy", &self.strategy)
            .field("artifact_dir", &self.artifact_dir)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("ocr_model_dir", &self.ocr_model_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    pub fn ocr_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.ocr_model_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2HandError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2HandError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2HandError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_retries > u8::MAX as u32 {
            return Err(Pdf2HandError::InvalidConfig(format!(
                "max_retries must be ≤ {}, got {}",
                u8::MAX,
                c.max_retries
            )));
        }
        Ok(self.config)
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Light, slightly yellow paper.
pub const PLAIN_LIGHT_RGB: [u8; 3] = [250, 245, 230];
/// Darker, aged cream paper.
pub const PLAIN_CREAM_RGB: [u8; 3] = [238, 224, 192];
/// Dark brown ink.
pub const DEFAULT_INK_RGB: [u8; 3] = [40, 30, 20];

/// Page background behind the handwriting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Background {
    /// Solid light paper colour. (default)
    #[default]
    PlainLight,
    /// Solid dark-cream paper colour.
    PlainCream,
    /// A scanned template (letterhead, ruled paper) resized to the canvas.
    Template(PathBuf),
}

impl Background {
    /// Solid fill for the plain variants; `None` for a template.
    pub fn solid_color(&self) -> Option<Rgb<u8>> {
        match self {
            Background::PlainLight => Some(Rgb(PLAIN_LIGHT_RGB)),
            Background::PlainCream => Some(Rgb(PLAIN_CREAM_RGB)),
            Background::Template(_) => None,
        }
    }
}

/// Where the handwriting typeface comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypefaceSource {
    /// The bitmap typeface compiled into the crate.
    #[default]
    Builtin,
    /// A TrueType / OpenType file on disk.
    File(PathBuf),
}

/// Visual parameters for one rendering run.
///
/// Not persisted with the page-text store: the same store can be rendered
/// again with a different style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderStyle {
    /// Canvas width in pixels. Default: 1200.
    pub canvas_width: u32,
    /// Canvas height in pixels. Default: 1600.
    pub canvas_height: u32,
    pub background: Background,
    pub typeface: TypefaceSource,
    /// Nominal font size in pixels. Default: 40.
    ///
    /// Glyphs are drawn at `font_size * glyph_scale` while each wrapped line
    /// advances the cursor by `font_size + line_gap`, so lines overlap
    /// slightly at the default scale.
    pub font_size: f32,
    /// Multiplier applied to `font_size` for the drawn glyphs. Default: 1.5.
    pub glyph_scale: f32,
    /// Extra vertical space after each line, in pixels. Default: 20.
    pub line_gap: u32,
    /// Left margin in pixels. Default: 100.
    pub margin_left: u32,
    /// Top margin in pixels. Default: 150.
    pub margin_top: u32,
    /// Word-wrap budget in characters per line. Default: 60.
    pub wrap_chars: usize,
    /// Standard deviation of the paper texture noise. Default: 8.
    pub texture_sigma: f32,
    /// Standard deviation of the scan grain added after blurring. Default: 5.
    pub noise_strength: f32,
    /// Gaussian blur sigma for ink bleed. Default: 0.6. Zero disables it.
    pub blur_radius: f32,
    pub ink: [u8; 3],
    /// Fixes the noise generator for reproducible output.
    pub seed: Option<u64>,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            canvas_width: 1200,
            canvas_height: 1600,
            background: Background::default(),
            typeface: TypefaceSource::default(),
            font_size: 40.0,
            glyph_scale: 1.5,
            line_gap: 20,
            margin_left: 100,
            margin_top: 150,
            wrap_chars: 60,
            texture_sigma: 8.0,
            noise_strength: 5.0,
            blur_radius: 0.6,
            ink: DEFAULT_INK_RGB,
            seed: None,
        }
    }
}

impl RenderStyle {
    /// Create a new builder for `RenderStyle`.
    pub fn builder() -> RenderStyleBuilder {
        RenderStyleBuilder {
            style: Self::default(),
        }
    }

    /// Pixel height the glyphs are drawn at.
    pub fn glyph_px(&self) -> f32 {
        self.font_size * self.glyph_scale
    }

    /// Vertical cursor advance per wrapped line.
    pub fn line_advance(&self) -> u32 {
        self.font_size.round() as u32 + self.line_gap
    }
}

/// Builder for [`RenderStyle`].
#[derive(Debug)]
pub struct RenderStyleBuilder {
    style: RenderStyle,
}

impl RenderStyleBuilder {
    pub fn canvas(mut self, width: u32, height: u32) -> Self {
        self.style.canvas_width = width;
        self.style.canvas_height = height;
        self
    }

    pub fn background(mut self, background: Background) -> Self {
        self.style.background = background;
        self
    }

    pub fn typeface(mut self, typeface: TypefaceSource) -> Self {
        self.style.typeface = typeface;
        self
    }

    pub fn font_size(mut self, px: f32) -> Self {
        self.style.font_size = px;
        self
    }

    pub fn glyph_scale(mut self, scale: f32) -> Self {
        self.style.glyph_scale = scale;
        self
    }

    pub fn line_gap(mut self, px: u32) -> Self {
        self.style.line_gap = px;
        self
    }

    pub fn margins(mut self, left: u32, top: u32) -> Self {
        self.style.margin_left = left;
        self.style.margin_top = top;
        self
    }

    pub fn wrap_chars(mut self, n: usize) -> Self {
        self.style.wrap_chars = n;
        self
    }

    pub fn texture_sigma(mut self, sigma: f32) -> Self {
        self.style.texture_sigma = sigma;
        self
    }

    pub fn noise_strength(mut self, sigma: f32) -> Self {
        self.style.noise_strength = sigma;
        self
    }

    pub fn blur_radius(mut self, sigma: f32) -> Self {
        self.style.blur_radius = sigma;
        self
    }

    pub fn ink(mut self, rgb: [u8; 3]) -> Self {
        self.style.ink = rgb;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.style.seed = Some(seed);
        self
    }

    /// Build the style, validating constraints.
    pub fn build(self) -> Result<RenderStyle, Pdf2HandError> {
        let s = &self.style;
        if s.canvas_width == 0 || s.canvas_height == 0 {
            return Err(Pdf2HandError::InvalidConfig(format!(
                "Canvas must be non-empty, got {}x{}",
                s.canvas_width, s.canvas_height
            )));
        }
        if !(s.font_size > 0.0) || !(s.glyph_scale > 0.0) {
            return Err(Pdf2HandError::InvalidConfig(format!(
                "Font size and glyph scale must be positive, got {} × {}",
                s.font_size, s.glyph_scale
            )));
        }
        if s.wrap_chars == 0 {
            return Err(Pdf2HandError::InvalidConfig(
                "Wrap width must be ≥ 1 character".into(),
            ));
        }
        for (name, v) in [
            ("texture sigma", s.texture_sigma),
            ("noise strength", s.noise_strength),
            ("blur radius", s.blur_radius),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(Pdf2HandError::InvalidConfig(format!(
                    "{name} must be a finite value ≥ 0, got {v}"
                )));
            }
        }
        Ok(self.style)
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// How rendered pages are turned into the final document.
#[derive(Clone)]
pub struct AssemblyOptions {
    /// Resolution written into the PDF, in DPI. Default: 100.
    ///
    /// Only the physical page size changes; the embedded pixels are the
    /// rendered canvas untouched.
    pub resolution: f32,
    /// PDF title metadata.
    pub title: String,
    /// Skip store entries whose text is empty or whitespace. Default: true.
    pub skip_empty: bool,
    /// When set, every rendered page is also saved here as `Page_<n>.png`.
    pub page_image_dir: Option<PathBuf>,
    /// Per-page progress events while rendering.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            resolution: 100.0,
            title: "Handwritten Document".to_string(),
            skip_empty: true,
            page_image_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssemblyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyOptions")
            .field("resolution", &self.resolution)
            .field("title", &self.title)
            .field("skip_empty", &self.skip_empty)
            .field("page_image_dir", &self.page_image_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}
