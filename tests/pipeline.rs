//! Pipeline-level tests: extraction driver → page-text store → renderer →
//! assembled PDF, with an in-memory rasterizer and scripted extractors in
//! place of pdfium and the OCR/VLM backends.

use edgequake_pdf2hand::{
    extract_document, render_store, render_store_to_file, AssemblyOptions, ExtractionConfig,
    ExtractionMethod, PageError, PageProgressCallback, PageTextStore, Pdf2HandError,
    RasterOptions, Rasterizer, RenderStyle, Stage, TextExtractor,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LLMResponse, LlmError};
use edgequake_pdf2hand::pipeline::remote::RemoteExtractor;
use image::{DynamicImage, RgbImage};
use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Produces `n` blank page bitmaps.
struct InMemoryPdf(usize);

impl Rasterizer for InMemoryPdf {
    fn rasterize(
        &self,
        _path: &Path,
        _options: &RasterOptions,
    ) -> Result<Vec<DynamicImage>, Pdf2HandError> {
        Ok((0..self.0)
            .map(|_| DynamicImage::ImageRgb8(RgbImage::new(16, 16)))
            .collect())
    }
}

/// Fails like a corrupt file would.
struct Unreadable;

impl Rasterizer for Unreadable {
    fn rasterize(
        &self,
        path: &Path,
        _options: &RasterOptions,
    ) -> Result<Vec<DynamicImage>, Pdf2HandError> {
        Err(Pdf2HandError::CorruptPdf {
            path: path.to_path_buf(),
            detail: "xref table missing".into(),
        })
    }
}

/// Returns a fixed outcome per page.
struct Scripted {
    method: ExtractionMethod,
    outcomes: Vec<Result<String, PageError>>,
}

impl Scripted {
    fn ocr(texts: &[&str]) -> Self {
        Self {
            method: ExtractionMethod::Ocr,
            outcomes: texts.iter().map(|t| Ok(t.to_string())).collect(),
        }
    }
}

impl TextExtractor for Scripted {
    fn method(&self) -> ExtractionMethod {
        self.method
    }

    fn extract(
        &self,
        page: usize,
        _image: &DynamicImage,
    ) -> impl Future<Output = Result<String, PageError>> + Send {
        std::future::ready(self.outcomes[page - 1].clone())
    }
}

/// Vision provider that answers chat calls from a fixed list, in order.
struct ReplayProvider {
    replies: Mutex<VecDeque<Result<&'static str, &'static str>>>,
    calls: AtomicUsize,
}

impl ReplayProvider {
    fn new(replies: Vec<Result<&'static str, &'static str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LLMProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    fn model(&self) -> &str {
        "replay-vision"
    }

    fn max_context_length(&self) -> usize {
        8192
    }

    async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
        self.chat(&[], None).await
    }

    async fn complete_with_options(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.chat(&[], None).await
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _options: Option<&CompletionOptions>,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(LLMResponse::new(text, "replay-vision")),
            Some(Err(detail)) => Err(LlmError::ApiError(detail.to_string())),
            None => Err(LlmError::ApiError("no reply scripted".into())),
        }
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl PageProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        self.0.lock().unwrap().push(format!("{stage}:start:{total}"));
    }
    fn on_page_complete(&self, stage: Stage, page: usize, _total: usize, _len: usize) {
        self.0.lock().unwrap().push(format!("{stage}:ok:{page}"));
    }
    fn on_page_skipped(&self, stage: Stage, page: usize, _total: usize) {
        self.0.lock().unwrap().push(format!("{stage}:skip:{page}"));
    }
    fn on_page_error(&self, stage: Stage, page: usize, _total: usize, _error: &str) {
        self.0.lock().unwrap().push(format!("{stage}:err:{page}"));
    }
    fn on_stage_complete(&self, stage: Stage, total: usize, ok: usize) {
        self.0.lock().unwrap().push(format!("{stage}:done:{ok}/{total}"));
    }
}

fn fast_style() -> RenderStyle {
    RenderStyle::builder().canvas(240, 320).seed(5).build().unwrap()
}

fn pdf_page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_pages_one_blank_gives_one_page_pdf() {
    let config = ExtractionConfig::default();
    let extractor = Scripted::ocr(&["Hello\nWorld", ""]);

    let store = extract_document(Path::new("in.pdf"), Arc::new(InMemoryPdf(2)), &extractor, &config)
        .await
        .unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.text(1), Some("Hello\nWorld"));
    assert_eq!(store.text(2), Some(""));

    let doc = render_store(&store, &fast_style(), &AssemblyOptions::default()).unwrap();
    assert_eq!(doc.stats.rendered, 1);
    assert_eq!(doc.stats.skipped, 1);
    assert_eq!(pdf_page_count(&doc.pdf), 1);
}

#[tokio::test]
async fn remote_failure_on_one_page_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("pages.json");

    let extractor = Scripted {
        method: ExtractionMethod::Vlm,
        outcomes: vec![
            Ok("first page".into()),
            Err(PageError::LlmFailed {
                page: 2,
                retries: 3,
                detail: "503 Service Unavailable".into(),
            }),
            Ok("third page".into()),
        ],
    };

    let store = extract_document(
        Path::new("in.pdf"),
        Arc::new(InMemoryPdf(3)),
        &extractor,
        &ExtractionConfig::default(),
    )
    .await
    .unwrap();
    store.save(&store_path).unwrap();

    let reloaded = PageTextStore::load(&store_path).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded.text(1), Some("first page"));
    assert_eq!(reloaded.text(3), Some("third page"));

    let failed = reloaded.get(2).unwrap();
    assert!(failed.text.starts_with("[Extraction failed"), "{}", failed.text);
    assert!(failed.error.as_deref().unwrap().contains("503"));
    assert_eq!(reloaded.failed_pages(), vec![2]);
}

#[tokio::test]
async fn vision_model_outage_on_one_page_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("pages.json");

    // Page 2 fails on the first call and both retries.
    let provider = ReplayProvider::new(vec![
        Ok("first page"),
        Err("503 Service Unavailable"),
        Err("503 Service Unavailable"),
        Err("503 Service Unavailable"),
        Ok("third page"),
    ]);
    let config = ExtractionConfig::builder()
        .max_retries(2)
        .retry_backoff_ms(1)
        .api_timeout_secs(1)
        .build()
        .unwrap();
    let extractor = RemoteExtractor::new(provider.clone(), &config);

    let store = extract_document(Path::new("in.pdf"), Arc::new(InMemoryPdf(3)), &extractor, &config)
        .await
        .unwrap();
    store.save(&store_path).unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 5);

    let reloaded = PageTextStore::load(&store_path).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded.text(1), Some("first page"));
    assert_eq!(reloaded.text(3), Some("third page"));
    assert_eq!(reloaded.failed_pages(), vec![2]);

    let failed = reloaded.get(2).unwrap();
    assert!(failed.text.starts_with("[Extraction failed"), "{}", failed.text);
    assert!(failed.error.as_deref().unwrap().contains("503"));
    assert_eq!(failed.method, Some(ExtractionMethod::Vlm));
}

#[tokio::test]
async fn unreadable_pdf_produces_no_store() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("pages.json");

    let result = extract_document(
        Path::new("broken.pdf"),
        Arc::new(Unreadable),
        &Scripted::ocr(&[]),
        &ExtractionConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(Pdf2HandError::CorruptPdf { .. })));
    assert!(!store_path.exists());
}

#[tokio::test]
async fn store_keys_are_one_to_n() {
    for n in [1usize, 2, 7] {
        let texts: Vec<String> = (1..=n).map(|i| format!("text {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let store = extract_document(
            Path::new("in.pdf"),
            Arc::new(InMemoryPdf(n)),
            &Scripted::ocr(&refs),
            &ExtractionConfig::default(),
        )
        .await
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        let expected: Vec<String> = (1..=n).map(|i| format!("Page_{i}")).collect();
        assert_eq!(keys.len(), n);
        for key in expected {
            assert!(json.get(&key).is_some(), "missing {key}");
        }
    }
}

#[tokio::test]
async fn edited_store_renders_edited_text() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("pages.json");
    let out = dir.path().join("out.pdf");

    let store = extract_document(
        Path::new("in.pdf"),
        Arc::new(InMemoryPdf(2)),
        &Scripted::ocr(&["", "draft"]),
        &ExtractionConfig::default(),
    )
    .await
    .unwrap();
    store.save(&store_path).unwrap();

    let mut edited = PageTextStore::load(&store_path).unwrap();
    edited.set_text(1, "now filled in").unwrap();
    assert!(edited.set_text(3, "no such page").is_err());
    edited.save(&store_path).unwrap();

    let stats = render_store_to_file(
        &PageTextStore::load(&store_path).unwrap(),
        &out,
        &fast_style(),
        &AssemblyOptions::default(),
    )
    .unwrap();
    assert_eq!(stats.rendered, 2);
    assert_eq!(pdf_page_count(&std::fs::read(&out).unwrap()), 2);
}

#[tokio::test]
async fn progress_events_cover_both_stages() {
    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let extractor = Scripted {
        method: ExtractionMethod::Vlm,
        outcomes: vec![
            Ok("a".into()),
            Err(PageError::Timeout { page: 2, secs: 60 }),
            Ok(String::new()),
        ],
    };

    let store = extract_document(Path::new("in.pdf"), Arc::new(InMemoryPdf(3)), &extractor, &config)
        .await
        .unwrap();

    let options = AssemblyOptions {
        progress_callback: Some(recorder.clone() as Arc<dyn PageProgressCallback>),
        ..Default::default()
    };
    render_store(&store, &fast_style(), &options).unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            "extract:start:3",
            "extract:ok:1",
            "extract:err:2",
            "extract:ok:3",
            "extract:done:2/3",
            "render:start:3",
            "render:ok:1",
            "render:ok:2",
            "render:skip:3",
            "render:done:2/3",
        ]
    );
}
