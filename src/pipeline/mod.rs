//! Pipeline stages, one transformation per submodule.
//!
//! ## Data flow
//!
//! ```text
//!                        ┌─▶ deskew ─▶ ocr ──────────┐   (local)
//! input ──▶ rasterize ──┤                            ├──▶ store
//! (path/URL/bytes)       └─▶ encode ─▶ remote ─▶ postprocess (remote)
//!
//! store ──▶ handwriting ──▶ assemble
//! ```
//!
//! 1. [`input`]: resolve a path, URL or uploaded bytes to a local PDF
//! 2. [`rasterize`]: render every page; pdfium runs in `spawn_blocking`
//! 3. [`deskew`] + [`denoise`]: skew estimation and correction for the
//!    local strategy
//! 4. [`ocr`]: on-device recognition (`ocr` feature)
//! 5. [`encode`] + [`remote`] + [`postprocess`]: vision-model extraction
//!    with retry/backoff and text cleanup
//! 6. [`handwriting`] + [`typeface`]: synthetic handwritten page from one
//!    store entry
//! 7. [`assemble`]: rendered pages → one multi-page PDF

pub mod assemble;
pub mod denoise;
pub mod deskew;
pub mod encode;
pub mod handwriting;
pub mod input;
#[cfg(feature = "ocr")]
pub mod ocr;
pub mod postprocess;
pub mod rasterize;
pub mod remote;
pub mod typeface;
