//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PageProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] (extraction)
//! or [`crate::config::AssemblyOptions::progress_callback`] (rendering) to
//! receive events as each page goes through a stage.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2hand::{ExtractionConfig, PageProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PageProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, stage: Stage, page_num: usize, total_pages: usize, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage}: page {page_num}/{total_pages} ({text_len} chars)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn PageProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Which pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extract => f.write_str("extract"),
            Stage::Render => f.write_str("render"),
        }
    }
}

/// Called by the extraction driver and the renderer as they process pages.
///
/// Pages are processed strictly in order, one at a time, so events for a
/// single stage never interleave. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait PageProgressCallback: Send + Sync {
    /// Called once before the first page of a stage.
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let _ = (stage, total_pages);
    }

    /// Called just before a page is extracted or rendered.
    fn on_page_start(&self, stage: Stage, page_num: usize, total_pages: usize) {
        let _ = (stage, page_num, total_pages);
    }

    /// Called when a page is done.
    ///
    /// `text_len` is the character count of the extracted (or rendered) text.
    fn on_page_complete(&self, stage: Stage, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (stage, page_num, total_pages, text_len);
    }

    /// Called when a page was skipped (rendering only: empty text).
    fn on_page_skipped(&self, stage: Stage, page_num: usize, total_pages: usize) {
        let _ = (stage, page_num, total_pages);
    }

    /// Called when a page failed and a placeholder was recorded instead.
    fn on_page_error(&self, stage: Stage, page_num: usize, total_pages: usize, error: &str) {
        let _ = (stage, page_num, total_pages, error);
    }

    /// Called once after every page of the stage has been attempted.
    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        let _ = (stage, total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in the config structs.
pub type ProgressCallback = Arc<dyn PageProgressCallback>;
