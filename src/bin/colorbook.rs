//! CLI binary for colorbook.
//!
//! A thin shim over the library crate: loads the photos, walks the wizard
//! non-interactively with the crop given on the command line, and writes the
//! finished pages (plus an optional print document) to the output directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use colorbook::export::{write_images, write_pages, write_print_document};
use colorbook::pipeline::crop::crop_image;
use colorbook::pipeline::input::load_input;
use colorbook::{
    resolve_service, ColoringConfig, Consent, ConversionProgressCallback, CropRect, CropRegion,
    Difficulty, PageSize, ProgressCallback, Style, Uploader, Wizard, WizardState,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

/// Live progress bar plus one log line per finished page. Pages finish out of
/// order when several are in flight.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Converting");
        bar.set_message("waiting for the model…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_position(0);
        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.reset_elapsed();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} photos…"))
        ));
    }

    fn on_image_start(&self, index: usize, _total: usize) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(index, Instant::now());
        }
        self.bar.set_message(format!("photo {}", index + 1));
    }

    fn on_image_complete(&self, index: usize, total: usize, bytes: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{:>6} KiB", bytes * 3 / 4 / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if success_count == total {
            eprintln!("{} {} pages converted", green("✔"), bold(&total.to_string()));
        } else {
            eprintln!(
                "{} batch failed ({} of {} pages errored), nothing was kept",
                red("✘"),
                self.errors.load(Ordering::SeqCst),
                total
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert three photos into letter-size outline pages
  colorbook --confirm-rights --accept-terms dog.jpg cat.jpg beach.png -o book/

  # Realistic style, more detail, rotate a sideways photo
  colorbook --style realistic --difficulty 4 --rotation 90 \
      --confirm-rights --accept-terms sideways.jpg -o book/

  # Explicit crop rectangle (x,y,width,height on the rotated photo)
  colorbook --crop 0,0,850,1100 --confirm-rights --accept-terms scan.png -o book/

  # Regenerate page 2 with guidance and write a print document
  colorbook --regenerate 2 --notes "thicker lines" --print \
      --confirm-rights --accept-terms a.jpg b.jpg c.jpg -o book/

  # Only crop; no conversion service needed
  colorbook --crop-only --zoom 1.5 photo.jpg -o crops/

DIFFICULTY LEVELS:
  1  Very Easy       minimal lines, very simple
  2  Easy            simple lines, few details
  3  Normal          moderate detail (default)
  4  Difficult       detailed lines
  5  Very Difficult  highly detailed, intricate lines

ENVIRONMENT VARIABLES:
  COLORBOOK_ENDPOINT   Base URL of a hosted /convert + /regenerate endpoint
  GEMINI_API_KEY       Google AI API key (GOOGLE_API_KEY also accepted)
  COLORBOOK_MODEL      Image model ID (default gemini-2.5-flash-image-preview)
  RUST_LOG             Log filter, overrides -v / -q
"#;

/// Turn photos into printable coloring-book pages.
#[derive(Parser, Debug)]
#[command(
    name = "colorbook",
    version,
    about = "Turn photos into printable coloring-book pages",
    long_about = "Crop photos (local files or URLs) to the page's aspect ratio, convert them \
into coloring-book line art with a generative image model, and write the pages plus an \
optional print-ready HTML document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Photo file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory to write pages into.
    #[arg(short, long, env = "COLORBOOK_OUTPUT", default_value = "coloring-book")]
    output: PathBuf,

    /// Drawing style.
    #[arg(long, env = "COLORBOOK_STYLE", value_enum, default_value = "outline")]
    style: StyleArg,

    /// Line density, 1 (very easy) to 5 (very difficult).
    #[arg(long, env = "COLORBOOK_DIFFICULTY", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(1..=5))]
    difficulty: u8,

    /// Page size the crop is fitted to.
    #[arg(long, env = "COLORBOOK_PAGE", value_enum, default_value = "letter")]
    page: PageArg,

    /// Rotation in degrees, clockwise, applied to every photo.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rotation: f64,

    /// Zoom into the centre of the page-shaped crop (1.0–3.0).
    #[arg(long, default_value_t = 1.0)]
    zoom: f64,

    /// Explicit crop rectangle X,Y,W,H on the rotated photo (overrides --zoom).
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropRect>,

    /// Base URL of a hosted conversion endpoint.
    #[arg(long, env = "COLORBOOK_ENDPOINT")]
    endpoint: Option<String>,

    /// Image model ID when calling the model directly.
    #[arg(long, env = "COLORBOOK_MODEL")]
    model: Option<String>,

    /// API key for direct model access.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum simultaneous conversion calls.
    #[arg(short, long, env = "COLORBOOK_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-call timeout in seconds.
    #[arg(long, env = "COLORBOOK_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Retries per photo on transient failures.
    #[arg(long, env = "COLORBOOK_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "COLORBOOK_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Path to a text file containing a custom base prompt.
    #[arg(long, env = "COLORBOOK_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Confirm you own, or have permission to use, these photos.
    #[arg(long)]
    confirm_rights: bool,

    /// Accept the terms of service.
    #[arg(long)]
    accept_terms: bool,

    /// Only crop the photos and write the crops; no conversion.
    #[arg(long)]
    crop_only: bool,

    /// Regenerate this page (1-based) after converting.
    #[arg(long)]
    regenerate: Option<usize>,

    /// Guidance for --regenerate, e.g. "thicker lines".
    #[arg(long, requires = "regenerate")]
    notes: Option<String>,

    /// Also write a print-ready HTML document.
    #[arg(long)]
    print: bool,

    /// Title of the print document.
    #[arg(long, default_value = "Coloring Book")]
    title: String,

    /// Print a JSON summary on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "COLORBOOK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "COLORBOOK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "COLORBOOK_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum StyleArg {
    Outline,
    Realistic,
}

impl From<StyleArg> for Style {
    fn from(v: StyleArg) -> Self {
        match v {
            StyleArg::Outline => Style::Outline,
            StyleArg::Realistic => Style::Realistic,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PageArg {
    Letter,
    A4,
}

impl From<PageArg> for PageSize {
    fn from(v: PageArg) -> Self {
        match v {
            PageArg::Letter => PageSize::LETTER,
            PageArg::A4 => PageSize::A4,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.crop_only;
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

    // ── Load photos ──────────────────────────────────────────────────────
    let mut files = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let loaded = load_input(input, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to load '{input}'"))?;
        files.push((loaded.name, loaded.bytes));
    }

    let region = CropRegion::default()
        .with_rotation(cli.rotation)
        .with_zoom(cli.zoom);

    // ── Crop-only mode ───────────────────────────────────────────────────
    if cli.crop_only {
        let page: PageSize = cli.page.clone().into();
        let written = crop_only(files, region, cli.crop, page, &cli.output)?;
        report(&cli, &written, None)?;
        return Ok(());
    }

    // ── Build config and service ─────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new_dynamic);
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback)).await?;
    let service = resolve_service(&config).context("No conversion service available")?;
    let mut wizard = Wizard::new(service, config.clone());

    // ── Walk the wizard ──────────────────────────────────────────────────
    wizard.add_files(files).context("Failed to add photos")?;
    wizard.start_cropping().context("None of the inputs is a usable photo")?;
    while let WizardState::Cropping(i) = wizard.state() {
        let name = wizard.current_image().map(|img| img.name.clone()).unwrap_or_default();
        let step = match cli.crop {
            Some(rect) => wizard.confirm_crop_rect(region.rotation, rect),
            None => wizard.confirm_crop(region),
        };
        step.with_context(|| format!("Failed to crop photo {} ('{}')", i + 1, name))?;
    }

    if wizard.state() == WizardState::AwaitingConsent {
        wizard
            .acknowledge(Consent {
                owns_rights: cli.confirm_rights,
                accepts_terms: cli.accept_terms,
            })
            .context("Pass --confirm-rights and --accept-terms to continue")?;
    }

    let converted = wizard.convert().await;
    if let Some(ref p) = progress {
        p.bar.finish_and_clear();
    }
    converted.context("Conversion failed")?;

    if let Some(page_num) = cli.regenerate {
        if page_num == 0 {
            bail!("Pages are 1-indexed, minimum is 1");
        }
        wizard
            .regenerate(page_num - 1, cli.notes.as_deref())
            .await
            .with_context(|| format!("Failed to regenerate page {page_num}"))?;
        if let Some(ref p) = progress {
            p.bar.finish_and_clear();
        }
    }

    // ── Export ───────────────────────────────────────────────────────────
    let written = write_pages(wizard.gallery(), &cli.output).context("Failed to write pages")?;
    let document = if cli.print {
        let path = cli.output.join("coloring-book.html");
        write_print_document(wizard.gallery(), &cli.title, config.page_size, &path)
            .context("Failed to write print document")?;
        Some(path)
    } else {
        None
    };

    report(&cli, &written, document.as_deref())
}

/// Crop every photo and write the crops, without touching a service.
fn crop_only(
    files: Vec<(String, Vec<u8>)>,
    region: CropRegion,
    rect: Option<CropRect>,
    page: PageSize,
    out: &Path,
) -> Result<Vec<PathBuf>> {
    let mut uploader = Uploader::new();
    for (name, bytes) in files {
        uploader
            .add(name.clone(), bytes)
            .with_context(|| format!("'{name}' is not a usable photo"))?;
    }

    let mut crops = Vec::with_capacity(uploader.len());
    for img in uploader.images() {
        let rect = rect.unwrap_or_else(|| region.to_pixel_rect(img.width, img.height, page.aspect()));
        let crop = crop_image(img.source_bytes(), region.rotation, rect)
            .with_context(|| format!("Failed to crop '{}'", img.name))?;
        crops.push(crop);
    }
    let refs: Vec<_> = crops.iter().collect();
    write_images(&refs, out, "crop").context("Failed to write crops")
}

fn report(cli: &Cli, pages: &[PathBuf], document: Option<&Path>) -> Result<()> {
    if cli.json {
        let summary = serde_json::json!({
            "pages": pages,
            "print_document": document,
            "style": Style::from(cli.style.clone()),
            "difficulty": cli.difficulty,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} files  →  {}",
            green("✔"),
            pages.len(),
            bold(&cli.output.display().to_string())
        );
        if let Some(doc) = document {
            eprintln!("   print document: {}", dim(&doc.display().to_string()));
        }
    }
    Ok(())
}

/// Map CLI args to `ColoringConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ColoringConfig> {
    let difficulty = Difficulty::from_level(cli.difficulty).context("Invalid --difficulty")?;

    let mut builder = ColoringConfig::builder()
        .concurrency(cli.concurrency)
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .style(cli.style.clone().into())
        .difficulty(difficulty)
        .page_size(cli.page.clone().into());

    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--crop X,Y,W,H`.
fn parse_crop(s: &str) -> Result<CropRect, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>().map_err(|_| format!("invalid number '{}'", p.trim())))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0 && *h > 0 => Ok(CropRect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err("width and height must be positive".to_string()),
        _ => Err(format!("expected X,Y,W,H, got '{s}'")),
    }
}
