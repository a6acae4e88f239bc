//! Error types for the edgequake-pdf2hand library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2HandError`] is **fatal**: the operation cannot proceed at all
//!   (bad input file, rasterisation backend missing, provider not
//!   configured, nothing to assemble). Returned as `Err(Pdf2HandError)` from
//!   the top-level `extract*` / `render*` functions.
//!
//! * [`PageError`] is **non-fatal**: a single page failed to extract
//!   (transient API error, OCR glitch) but every other page is fine. The
//!   extraction driver turns it into a visible placeholder in the
//!   [`crate::store::PageTextStore`] instead of aborting the document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2hand library.
///
/// Page-level failures use [`PageError`] and end up as placeholder entries
/// in the page-text store rather than being propagated here.
#[derive(Debug, Error)]
pub enum Pdf2HandError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input is not a usable file path, URL or upload.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened but contains no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF pages cannot be rasterised without pdfium. You can:\n\
  • Place libpdfium next to the binary or in the working directory.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium.\n\
  • Install pdfium system-wide (prebuilt binaries: github.com/bblanchon/pdfium-binaries).\n"
    )]
    PdfiumBindingFailed(String),

    /// The remote extraction provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The local OCR strategy cannot run (feature disabled or models missing).
    #[error("Local OCR is unavailable: {0}")]
    OcrUnavailable(String),

    // ── Page-text store errors ────────────────────────────────────────────
    /// The store file could not be read.
    #[error("Failed to read page-text store '{path}': {source}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file is not valid JSON of the expected shape.
    #[error("Page-text store '{path}' is malformed: {detail}")]
    StoreParse { path: PathBuf, detail: String },

    /// Store keys are not exactly `Page_1..Page_N`.
    #[error("Invalid page-text store: {0}")]
    StoreInvalid(String),

    /// An edit addressed a page that the store does not contain.
    #[error("Page {page} is not in the store (store has {total} pages)")]
    PageNotInStore { page: usize, total: usize },

    // ── Rendering / assembly errors ───────────────────────────────────────
    /// The assembler was handed an empty page sequence.
    #[error("No pages to assemble: every page was empty or skipped")]
    NothingToAssemble,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A job directory could not be created or opened.
    #[error("Job workspace error at '{path}': {detail}")]
    JobWorkspace { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Never returned from a document-level operation: the extraction driver
/// records it on the page's store entry and moves on to the next page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page image could not be encoded for the remote call.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// Remote extraction failed after retries.
    #[error("Page {page}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u8,
        detail: String,
    },

    /// Remote extraction timed out on every attempt.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The local OCR engine failed on this page.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::EncodeFailed { page, .. }
            | PageError::LlmFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::OcrFailed { page, .. } => *page,
        }
    }
}
