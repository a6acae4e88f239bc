//! The page-text store: extracted text per page, editable between
//! extraction and rendering.
//!
//! On disk it is a pretty-printed JSON object keyed `Page_1` … `Page_N` in
//! page order:
//!
//! ```json
//! {
//!   "Page_1": { "text": "Hello\nWorld", "method": "ocr" },
//!   "Page_2": { "text": "[Extraction failed: …]", "method": "vlm", "error": "…" }
//! }
//! ```
//!
//! Hand-edited files may use bare strings as values (`"Page_1": "Hello"`),
//! and bare numeric keys (`"1"`) are accepted on read. Keys must be exactly
//! `1..N` with no gaps; the store never gains or loses pages after it is
//! built, edits only replace text.

use crate::error::{PageError, Pdf2HandError};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

const KEY_PREFIX: &str = "Page_";

/// Which strategy produced a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Local OCR engine.
    Ocr,
    /// Remote vision language model.
    Vlm,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::Ocr => f.write_str("ocr"),
            ExtractionMethod::Vlm => f.write_str("vlm"),
        }
    }
}

/// One page of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ExtractionMethod>,
    /// Set when extraction failed; `text` then holds a visible placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageEntry {
    pub fn new(text: impl Into<String>, method: Option<ExtractionMethod>) -> Self {
        Self {
            text: text.into(),
            method,
            error: None,
        }
    }

    /// Placeholder entry for a page whose extraction failed.
    pub fn failed(err: &PageError, method: ExtractionMethod) -> Self {
        Self {
            text: format!("[Extraction failed: {err}]"),
            method: Some(method),
            error: Some(err.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Either shape a value may take in a store file.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Entry(PageEntry),
    Bare(String),
}

/// Ordered mapping from 1-based page number to [`PageEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageTextStore {
    entries: Vec<PageEntry>,
}

impl PageTextStore {
    /// Build a store from entries in page order (entry 0 is page 1).
    pub fn from_entries(entries: Vec<PageEntry>) -> Self {
        Self { entries }
    }

    /// Build a store from plain texts in page order.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_entries(texts.into_iter().map(|t| PageEntry::new(t, None)).collect())
    }

    /// Build a store from per-page extraction outcomes, in page order.
    ///
    /// Failed pages get a placeholder entry; the store always has one entry
    /// per outcome.
    pub fn from_outcomes<I>(method: ExtractionMethod, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<String, PageError>>,
    {
        let entries = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(text) => PageEntry::new(text, Some(method)),
                Err(e) => PageEntry::failed(&e, method),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, page: usize) -> Option<&PageEntry> {
        page.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn text(&self, page: usize) -> Option<&str> {
        self.get(page).map(|e| e.text.as_str())
    }

    /// Replace the text of an existing page. Clears any recorded error.
    pub fn set_text(&mut self, page: usize, text: impl Into<String>) -> Result<(), Pdf2HandError> {
        let total = self.entries.len();
        let entry = page
            .checked_sub(1)
            .and_then(|i| self.entries.get_mut(i))
            .ok_or(Pdf2HandError::PageNotInStore { page, total })?;
        entry.text = text.into();
        entry.error = None;
        Ok(())
    }

    /// `(page_number, entry)` pairs in page order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PageEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, e))
    }

    /// Pages whose extraction failed.
    pub fn failed_pages(&self) -> Vec<usize> {
        self.iter()
            .filter(|(_, e)| e.error.is_some())
            .map(|(n, _)| n)
            .collect()
    }

    /// Pages with non-whitespace text.
    pub fn non_empty_pages(&self) -> Vec<usize> {
        self.iter()
            .filter(|(_, e)| !e.is_blank())
            .map(|(n, _)| n)
            .collect()
    }

    // ── Serialisation ────────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, Pdf2HandError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Pdf2HandError::Internal(format!("store serialisation: {e}")))
    }

    /// Parse a store file's contents. `origin` names the source in errors.
    pub fn from_json(json: &str, origin: &Path) -> Result<Self, Pdf2HandError> {
        let raw: BTreeMap<String, RawEntry> =
            serde_json::from_str(json).map_err(|e| Pdf2HandError::StoreParse {
                path: origin.to_path_buf(),
                detail: e.to_string(),
            })?;

        let mut by_page = BTreeMap::new();
        for (key, value) in raw {
            let page = parse_key(&key)?;
            let entry = match value {
                RawEntry::Entry(e) => e,
                RawEntry::Bare(text) => PageEntry::new(text, None),
            };
            if by_page.insert(page, entry).is_some() {
                return Err(Pdf2HandError::StoreInvalid(format!(
                    "page {page} appears more than once"
                )));
            }
        }

        if by_page.is_empty() {
            return Err(Pdf2HandError::StoreInvalid("store has no pages".into()));
        }
        for (expected, page) in (1..).zip(by_page.keys()) {
            if *page != expected {
                return Err(Pdf2HandError::StoreInvalid(format!(
                    "expected {KEY_PREFIX}{expected}, found {KEY_PREFIX}{page}: pages must be numbered 1..N without gaps"
                )));
            }
        }

        Ok(Self::from_entries(by_page.into_values().collect()))
    }

    /// Write the store atomically (temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Pdf2HandError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        write_atomic(path, json.as_bytes())?;
        info!("Saved page-text store ({} pages) to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Pdf2HandError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Pdf2HandError::StoreRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let store = Self::from_json(&json, path)?;
        debug!("Loaded page-text store ({} pages) from {}", store.len(), path.display());
        Ok(store)
    }
}

impl Serialize for PageTextStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (page, entry) in self.iter() {
            map.serialize_entry(&format!("{KEY_PREFIX}{page}"), entry)?;
        }
        map.end()
    }
}

fn parse_key(key: &str) -> Result<usize, Pdf2HandError> {
    let digits = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
    digits
        .parse::<usize>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| Pdf2HandError::StoreInvalid(format!("unrecognised key '{key}'")))
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never sees a half-written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2HandError> {
    let write_err = |e| Pdf2HandError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)
}
