//! CLI binary for edgequake-pdf2hand.
//!
//! A thin shim over the library crate: each subcommand maps its flags to
//! `ExtractionConfig` / `RenderStyle` / `AssemblyOptions` and reports the
//! outcome.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use edgequake_pdf2hand::pipeline::typeface::{find_font, list_fonts};
use edgequake_pdf2hand::{
    extract_to_file, render_store_to_file, AssemblyOptions, Background, ExtractionConfig,
    ExtractionStrategy, Job, PageProgressCallback, PageTextStore, ProgressCallback, RenderStats,
    RenderStyle, Stage, TypefaceSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar per stage plus a log line per page.
struct CliProgressCallback {
    bar: Mutex<ProgressBar>,
    page_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar: Mutex::new(bar),
            page_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn bar(&self) -> MutexGuard<'_, ProgressBar> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

fn stage_prefix(stage: Stage) -> &'static str {
    match stage {
        Stage::Extract => "Extracting",
        Stage::Render => "Rendering",
    }
}

impl PageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total_pages as u64);
        bar.set_style(style);
        bar.set_prefix(stage_prefix(stage));
        bar.enable_steady_tick(Duration::from_millis(80));

        let mut slot = self.bar();
        slot.finish_and_clear();
        *slot = bar;
        slot.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{} {total_pages} pages…", stage_prefix(stage)))
        ));
        self.errors.store(0, Ordering::SeqCst);
    }

    fn on_page_start(&self, _stage: Stage, page_num: usize, _total: usize) {
        *self.page_started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.bar().set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, _stage: Stage, page_num: usize, total: usize, text_len: usize) {
        let secs = self.page_elapsed();
        let bar = self.bar();
        bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        bar.inc(1);
    }

    fn on_page_skipped(&self, _stage: Stage, page_num: usize, total: usize) {
        let bar = self.bar();
        bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            dim("–"),
            page_num,
            total,
            dim("empty, skipped")
        ));
        bar.inc(1);
    }

    fn on_page_error(&self, _stage: Stage, page_num: usize, total: usize, error: &str) {
        let secs = self.page_elapsed();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        let bar = self.bar();
        bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        self.bar().finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let verb = match stage {
            Stage::Extract => "extracted",
            Stage::Render => "rendered",
        };

        if failed == 0 {
            eprintln!(
                "{} {}/{} pages {verb}",
                green("✔"),
                bold(&success_count.to_string()),
                total_pages
            );
        } else {
            eprintln!(
                "{} {}/{} pages {verb}  ({} failed, placeholders recorded)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract text with a vision model, review it, then render
  pdf2hand extract letter.pdf -o letter.json
  pdf2hand edit letter.json --page 2 --text "Dear Sam,"
  pdf2hand render letter.json -o letter-handwritten.pdf

  # Everything at once, local OCR, cream paper
  pdf2hand run letter.pdf --strategy local --background plain-cream -o out.pdf

  # Isolated job directory (store, page images and output under <root>/<uuid>/)
  pdf2hand run https://example.com/letter.pdf --workspace jobs/

  # Letterhead template and a font from ./fonts
  pdf2hand render letter.json --background template --template letterhead.png --font Caveat

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDF2HAND_*              Every flag can also be set through PDF2HAND_<FLAG>

LOCAL OCR:
  Build with `--features ocr`. Models text-detection.rten and
  text-recognition.rten are read from --ocr-models or ~/.cache/ocrs.
"#;

/// Turn typed PDFs into handwritten-looking PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2hand",
    version,
    about = "Turn typed PDF documents into handwritten-looking PDFs",
    long_about = "Extract the text of a PDF (local OCR or a vision LLM) into an editable \
page-text file, then render every page as synthetic handwriting and assemble a new PDF.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2HAND_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2HAND_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PDF2HAND_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract page text into a page-text store (JSON).
    Extract {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Where to write the page-text store.
        #[arg(short, long, env = "PDF2HAND_STORE", default_value = "pages.json")]
        output: PathBuf,

        #[command(flatten)]
        extraction: ExtractArgs,
    },

    /// Replace the text of one page in a page-text store.
    Edit {
        /// Page-text store to edit in place.
        store: PathBuf,

        /// 1-based page number.
        #[arg(long)]
        page: usize,

        /// New text for the page.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Read the new text from this file.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Render a page-text store as a handwritten PDF.
    Render {
        /// Page-text store produced by `extract`.
        store: PathBuf,

        /// Output PDF.
        #[arg(short, long, env = "PDF2HAND_OUTPUT", default_value = "handwritten.pdf")]
        output: PathBuf,

        #[command(flatten)]
        style: StyleArgs,
    },

    /// Extract, then render, in one go.
    Run {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Output PDF. Default: handwritten.pdf, or the job's output with --workspace.
        #[arg(short, long, env = "PDF2HAND_OUTPUT")]
        output: Option<PathBuf>,

        /// Keep the page-text store here. Default: next to the output PDF.
        #[arg(long, env = "PDF2HAND_STORE")]
        store: Option<PathBuf>,

        /// Create an isolated job directory under this root for every artifact.
        #[arg(long, env = "PDF2HAND_WORKSPACE")]
        workspace: Option<PathBuf>,

        #[command(flatten)]
        extraction: ExtractArgs,

        #[command(flatten)]
        style: StyleArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Local,
    Remote,
}

impl From<StrategyArg> for ExtractionStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Local => ExtractionStrategy::Local,
            StrategyArg::Remote => ExtractionStrategy::Remote,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackgroundArg {
    PlainLight,
    PlainCream,
    Template,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Extraction strategy.
    #[arg(long, env = "PDF2HAND_STRATEGY", value_enum, default_value = "remote")]
    strategy: StrategyArg,

    /// Rasterisation DPI (72–400).
    #[arg(long, env = "PDF2HAND_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2HAND_PASSWORD")]
    password: Option<String>,

    /// Save page bitmaps (and deskewed images) here.
    #[arg(long, env = "PDF2HAND_ARTIFACTS")]
    artifacts: Option<PathBuf>,

    /// LLM model ID for the remote strategy.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Text file replacing the built-in extraction instruction.
    #[arg(long, env = "PDF2HAND_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2HAND_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature.
    #[arg(long, env = "PDF2HAND_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "PDF2HAND_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDF2HAND_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2HAND_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Directory holding the OCR models (local strategy).
    #[arg(long, env = "PDF2HAND_OCR_MODELS")]
    ocr_models: Option<PathBuf>,

    /// Path to the pdfium shared library (file or directory).
    #[arg(long)]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StyleArgs {
    /// Paper behind the handwriting.
    #[arg(long, env = "PDF2HAND_BACKGROUND", value_enum, default_value = "plain-light")]
    background: BackgroundArg,

    /// Template image for `--background template`.
    #[arg(long, env = "PDF2HAND_TEMPLATE")]
    template: Option<PathBuf>,

    /// Font file, or the name of a font in --font-dir. Default: built-in face.
    #[arg(long, env = "PDF2HAND_FONT")]
    font: Option<String>,

    /// Directory searched for named fonts.
    #[arg(long, env = "PDF2HAND_FONT_DIR", default_value = "fonts")]
    font_dir: PathBuf,

    /// Base font size in pixels.
    #[arg(long, env = "PDF2HAND_FONT_SIZE", default_value_t = 40.0)]
    font_size: f32,

    /// Scan grain strength (noise standard deviation).
    #[arg(long, env = "PDF2HAND_NOISE", default_value_t = 5.0)]
    noise: f32,

    /// Ink bleed blur radius. 0 disables it.
    #[arg(long, env = "PDF2HAND_BLUR", default_value_t = 0.6)]
    blur: f32,

    /// Seed the noise generator for reproducible output.
    #[arg(long, env = "PDF2HAND_SEED")]
    seed: Option<u64>,

    /// Output PDF resolution in DPI (page size only).
    #[arg(long, env = "PDF2HAND_RESOLUTION", default_value_t = 100.0)]
    resolution: f32,

    /// PDF title.
    #[arg(long, env = "PDF2HAND_TITLE", default_value = "Handwritten Document")]
    title: String,

    /// Render pages with empty text as blank paper instead of skipping them.
    #[arg(long, env = "PDF2HAND_KEEP_EMPTY")]
    keep_empty: bool,

    /// Also save every rendered page as Page_<n>.png here.
    #[arg(long, env = "PDF2HAND_PAGE_IMAGES")]
    page_images: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs; `edit` has no bar.
    let has_stages = !matches!(cli.command, Command::Edit { .. });
    let show_progress = !cli.quiet && !cli.no_progress && has_stages;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PageProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::Extract {
            ref input,
            ref output,
            ref extraction,
        } => {
            let config = build_extraction_config(extraction, progress).await?;
            let store = extract_to_file(input, output, &config)
                .await
                .context("Extraction failed")?;
            if !cli.quiet {
                report_store(&store, output);
            }
        }

        Command::Edit {
            ref store,
            page,
            ref text,
            ref file,
        } => {
            let new_text = match (text, file) {
                (Some(t), _) => t.clone(),
                (None, Some(f)) => tokio::fs::read_to_string(f)
                    .await
                    .with_context(|| format!("Failed to read {}", f.display()))?,
                (None, None) => bail!("Pass --text or --file"),
            };
            let mut pages = PageTextStore::load(store).context("Failed to load store")?;
            pages
                .set_text(page, new_text)
                .with_context(|| format!("Cannot edit {}", store.display()))?;
            pages.save(store).context("Failed to save store")?;
            if !cli.quiet {
                eprintln!("{} Page {page} updated in {}", green("✔"), bold(&store.display().to_string()));
            }
        }

        Command::Render {
            ref store,
            ref output,
            ref style,
        } => {
            let pages = PageTextStore::load(store).context("Failed to load store")?;
            let stats = render(pages, output.clone(), style, None, progress).await?;
            if !cli.quiet {
                report_render(&stats);
            }
        }

        Command::Run {
            ref input,
            ref output,
            ref store,
            ref workspace,
            ref extraction,
            ref style,
        } => {
            let job = match workspace {
                Some(root) => Some(Job::create(root).context("Failed to create job workspace")?),
                None => None,
            };

            let mut source = input.clone();
            let mut config = build_extraction_config(extraction, progress.clone()).await?;
            let mut page_images = None;
            if let Some(ref job) = job {
                if Path::new(input).is_file() {
                    let bytes = tokio::fs::read(input)
                        .await
                        .with_context(|| format!("Failed to read {input}"))?;
                    source = job
                        .import_source(&bytes)
                        .context("Failed to copy input into job")?
                        .to_string_lossy()
                        .into_owned();
                }
                if config.artifact_dir.is_none() {
                    config.artifact_dir = Some(job.artifacts_dir());
                }
                page_images = Some(job.pages_dir());
                if !cli.quiet {
                    eprintln!("{} Job {}", cyan("◆"), bold(&job.id().to_string()));
                }
            }

            let output = output
                .clone()
                .or_else(|| job.as_ref().map(Job::output_pdf))
                .unwrap_or_else(|| PathBuf::from("handwritten.pdf"));
            let store_path = store
                .clone()
                .or_else(|| job.as_ref().map(Job::store_path))
                .unwrap_or_else(|| output.with_extension("json"));

            let pages = extract_to_file(&source, &store_path, &config)
                .await
                .context("Extraction failed")?;
            if !cli.quiet {
                report_store(&pages, &store_path);
            }

            let stats = render(pages, output, style, page_images, progress).await?;
            if !cli.quiet {
                report_render(&stats);
            }
        }
    }

    Ok(())
}

/// Map extraction flags to `ExtractionConfig`.
async fn build_extraction_config(
    args: &ExtractArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .strategy(args.strategy.into())
        .dpi(args.dpi)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref password) = args.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = args.artifacts {
        builder = builder.artifact_dir(dir);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = args.instruction {
        let instruction = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(instruction);
    }
    if let Some(ref dir) = args.ocr_models {
        builder = builder.ocr_model_dir(dir);
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map style flags to `RenderStyle` and `AssemblyOptions`.
fn build_render_settings(
    args: &StyleArgs,
    page_images: Option<PathBuf>,
    progress: Option<ProgressCallback>,
) -> Result<(RenderStyle, AssemblyOptions)> {
    let background = match args.background {
        BackgroundArg::PlainLight => Background::PlainLight,
        BackgroundArg::PlainCream => Background::PlainCream,
        BackgroundArg::Template => match args.template {
            Some(ref path) => Background::Template(path.clone()),
            None => bail!("--background template needs --template <IMAGE>"),
        },
    };

    let mut builder = RenderStyle::builder()
        .background(background)
        .typeface(resolve_typeface(args.font.as_deref(), &args.font_dir))
        .font_size(args.font_size)
        .noise_strength(args.noise)
        .blur_radius(args.blur);
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let style = builder.build().context("Invalid style")?;

    let options = AssemblyOptions {
        resolution: args.resolution,
        title: args.title.clone(),
        skip_empty: !args.keep_empty,
        page_image_dir: args.page_images.clone().or(page_images),
        progress_callback: progress,
    };
    Ok((style, options))
}

/// A path to an existing file, else a name looked up in `font_dir`.
///
/// An unknown name is passed through as a path; the renderer then falls
/// back to the built-in face.
fn resolve_typeface(font: Option<&str>, font_dir: &Path) -> TypefaceSource {
    let Some(font) = font else {
        return TypefaceSource::Builtin;
    };
    if Path::new(font).is_file() {
        return TypefaceSource::File(PathBuf::from(font));
    }
    match find_font(font_dir, font) {
        Some(path) => TypefaceSource::File(path),
        None => {
            let available = list_fonts(font_dir);
            warn!(
                "Font '{}' not found in {} (available: {})",
                font,
                font_dir.display(),
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            );
            TypefaceSource::File(PathBuf::from(font))
        }
    }
}

async fn render(
    store: PageTextStore,
    output: PathBuf,
    args: &StyleArgs,
    page_images: Option<PathBuf>,
    progress: Option<ProgressCallback>,
) -> Result<RenderStats> {
    let (style, options) = build_render_settings(args, page_images, progress)?;
    tokio::task::spawn_blocking(move || render_store_to_file(&store, &output, &style, &options))
        .await
        .context("Render task panicked")?
        .context("Rendering failed")
}

fn report_store(store: &PageTextStore, path: &Path) {
    let failed = store.failed_pages();
    eprintln!(
        "{}  {} pages  →  {}",
        if failed.is_empty() { green("✔") } else { cyan("⚠") },
        store.len(),
        bold(&path.display().to_string()),
    );
    if !failed.is_empty() {
        let list: Vec<String> = failed.iter().map(usize::to_string).collect();
        eprintln!(
            "   {} {}",
            red("placeholders on pages"),
            list.join(", ")
        );
    }
}

fn report_render(stats: &RenderStats) {
    let target = stats
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    eprintln!(
        "{}  {} pages rendered  {}  →  {}",
        green("✔"),
        stats.rendered,
        dim(&format!("({} empty skipped)", stats.skipped)),
        bold(&target),
    );
}
