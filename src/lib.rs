//! # edgequake-pdf2hand
//!
//! Turn a typed PDF into a PDF that looks handwritten.
//!
//! The work is split in two halves with an editable file in between:
//!
//! 1. **Extract**: rasterise every page and pull its text out, either with a
//!    local OCR engine (after deskewing the page) or with a vision language
//!    model. The result is a [`PageTextStore`], saved as JSON.
//! 2. **Review**: a person fixes OCR mistakes in the store file.
//! 3. **Render**: draw each page's text onto synthetic paper (texture, ink,
//!    blur, grain) and assemble the pages into one PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file, URL or uploaded bytes
//!  ├─ 2. Rasterise  pdfium, one bitmap per page (spawn_blocking)
//!  ├─ 3. Extract    local: deskew → OCR   |   remote: PNG → VLM
//!  ├─ 4. Store      Page_1..Page_N JSON, human-editable
//!  ├─ 5. Render     paper → texture → text → blur → grain
//!  └─ 6. Assemble   one PDF page per non-empty entry
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2hand::{
//!     extract_to_file, render_store_to_file, AssemblyOptions, ExtractionConfig,
//!     PageTextStore, RenderStyle,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     extract_to_file("letter.pdf", "letter.json", &config).await?;
//!
//!     // … edit letter.json by hand …
//!
//!     let store = PageTextStore::load("letter.json")?;
//!     let stats = render_store_to_file(
//!         &store,
//!         "letter-handwritten.pdf",
//!         &RenderStyle::default(),
//!         &AssemblyOptions::default(),
//!     )?;
//!     eprintln!("{} pages rendered, {} blank skipped", stats.rendered, stats.skipped);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2hand` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `ocr`   | off     | Local OCR strategy backed by `ocrs` |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2hand = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AssemblyOptions, Background, ExtractionConfig, ExtractionConfigBuilder, ExtractionStrategy,
    RenderStyle, RenderStyleBuilder, TypefaceSource,
};
pub use error::{PageError, Pdf2HandError};
pub use extract::{
    extract, extract_document, extract_from_bytes, extract_sync, extract_to_file, Extractor,
    TextExtractor,
};
pub use job::Job;
pub use pipeline::handwriting::HandwritingRenderer;
pub use pipeline::rasterize::{PdfiumRasterizer, RasterOptions, Rasterizer};
pub use progress::{NoopProgressCallback, PageProgressCallback, ProgressCallback, Stage};
pub use render::{render_store, render_store_to_file, RenderStats, RenderedDocument};
pub use store::{ExtractionMethod, PageEntry, PageTextStore};
