//! Configuration types for photo-to-coloring-page conversion.
//!
//! All conversion behaviour is controlled through [`ColoringConfig`], built
//! via its [`ColoringConfigBuilder`]. The style and difficulty enums that
//! travel with every conversion request live here as well.

use crate::error::ColoringError;
use crate::pipeline::service::ColoringService;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default hosted image model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Reference photo shown next to the difficulty examples.
pub const ORIGINAL_EXAMPLE_ASSET: &str = "/examples/original.jpg";

/// Configuration for a coloring-book session.
///
/// Built via [`ColoringConfig::builder()`] or using
/// [`ColoringConfig::default()`].
///
/// # Example
/// ```rust
/// use colorbook::{ColoringConfig, Difficulty, Style};
///
/// let config = ColoringConfig::builder()
///     .concurrency(2)
///     .style(Style::Realistic)
///     .difficulty(Difficulty::Easy)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ColoringConfig {
    /// Maximum number of conversion calls in flight at once. Default: 4.
    ///
    /// Image generation is slow and rate-limited per key; a handful of
    /// parallel calls keeps a batch moving without tripping `429`s.
    pub concurrency: usize,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Retry attempts for transient failures. Default: 0.
    ///
    /// Failures surface to the user immediately unless this is raised.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Base URL of a hosted conversion endpoint exposing `/convert` and
    /// `/regenerate`. Takes precedence over a direct model API key.
    pub endpoint: Option<String>,

    /// API key for the hosted image model.
    pub api_key: Option<String>,

    /// Image model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Pre-constructed conversion service. Takes precedence over everything.
    pub service: Option<Arc<dyn ColoringService>>,

    /// Line-art style requested for every page. Default: [`Style::Outline`].
    pub style: Style,

    /// Level of detail requested for every page. Default: [`Difficulty::Normal`].
    pub difficulty: Difficulty,

    /// Physical page the crops are fitted to. Default: US Letter.
    pub page_size: PageSize,

    /// Whether the consent gate runs between cropping and conversion. Default: true.
    pub require_consent: bool,

    /// Custom base prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Optional per-image progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ColoringConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            api_timeout_secs: 120,
            max_retries: 0,
            retry_backoff_ms: 500,
            endpoint: None,
            api_key: None,
            model: None,
            service: None,
            style: Style::default(),
            difficulty: Difficulty::default(),
            page_size: PageSize::LETTER,
            require_consent: true,
            system_prompt: None,
            download_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ColoringConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColoringConfig")
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("service", &self.service.as_ref().map(|_| "<dyn ColoringService>"))
            .field("style", &self.style)
            .field("difficulty", &self.difficulty)
            .field("page_size", &self.page_size)
            .field("require_consent", &self.require_consent)
            .finish()
    }
}

impl ColoringConfig {
    /// Create a new builder for `ColoringConfig`.
    pub fn builder() -> ColoringConfigBuilder {
        ColoringConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ColoringConfig`].
pub struct ColoringConfigBuilder {
    config: ColoringConfig,
}

impl fmt::Debug for ColoringConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColoringConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ColoringConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
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

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn ColoringService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.config.style = style;
        self
    }

    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.config.difficulty = difficulty;
        self
    }

    pub fn page_size(mut self, page: PageSize) -> Self {
        self.config.page_size = page;
        self
    }

    pub fn require_consent(mut self, v: bool) -> Self {
        self.config.require_consent = v;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
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
    pub fn build(self) -> Result<ColoringConfig, ColoringError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ColoringError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ColoringError::InvalidConfig(
                "API timeout must be at least one second".into(),
            ));
        }
        if !(c.page_size.width_in > 0.0 && c.page_size.height_in > 0.0) {
            return Err(ColoringError::InvalidConfig(format!(
                "Page size must be positive, got {}x{} in",
                c.page_size.width_in, c.page_size.height_in
            )));
        }
        if let Some(ref url) = c.endpoint {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ColoringError::InvalidConfig(format!(
                    "Endpoint must be an HTTP/HTTPS URL, got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Artistic style of the generated page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Black line drawing on white, bold outlines, no shading. (default)
    #[default]
    Outline,
    /// Grayscale page that keeps photographic shading.
    Realistic,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Outline => "outline",
            Style::Realistic => "realistic",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested line density, from 1 (very easy) to 5 (very difficult).
///
/// Serialised as its integer level so the wire format stays `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
    VeryEasy,
    Easy,
    #[default]
    Normal,
    Difficult,
    VeryDifficult,
}

impl Difficulty {
    /// All levels in ascending order.
    pub const ALL: [Difficulty; 5] = [
        Difficulty::VeryEasy,
        Difficulty::Easy,
        Difficulty::Normal,
        Difficulty::Difficult,
        Difficulty::VeryDifficult,
    ];

    /// Parse an integer level in `1..=5`.
    pub fn from_level(level: u8) -> Result<Self, ColoringError> {
        match level {
            1 => Ok(Difficulty::VeryEasy),
            2 => Ok(Difficulty::Easy),
            3 => Ok(Difficulty::Normal),
            4 => Ok(Difficulty::Difficult),
            5 => Ok(Difficulty::VeryDifficult),
            other => Err(ColoringError::InvalidConfig(format!(
                "Difficulty must be 1–5, got {other}"
            ))),
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Difficulty::VeryEasy => 1,
            Difficulty::Easy => 2,
            Difficulty::Normal => 3,
            Difficulty::Difficult => 4,
            Difficulty::VeryDifficult => 5,
        }
    }

    /// Human-facing label for sliders and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::VeryEasy => "Very Easy",
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Difficult => "Difficult",
            Difficulty::VeryDifficult => "Very Difficult",
        }
    }

    /// The phrase the model is given to calibrate detail.
    pub fn prompt_description(&self) -> &'static str {
        match self {
            Difficulty::VeryEasy => "very easy (minimal lines, very simple)",
            Difficulty::Easy => "easy (simple with basic details)",
            Difficulty::Normal => "normal (moderately detailed)",
            Difficulty::Difficult => "difficult (highly detailed with intricate lines)",
            Difficulty::VeryDifficult => {
                "very difficult (as detailed as possible, capturing every fine line)"
            }
        }
    }

    /// Example page illustrating this level.
    pub fn example_asset(&self) -> &'static str {
        match self {
            Difficulty::VeryEasy => "/examples/very-easy.jpg",
            Difficulty::Easy => "/examples/easy.jpg",
            Difficulty::Normal => "/examples/normal.jpg",
            Difficulty::Difficult => "/examples/difficult.jpg",
            Difficulty::VeryDifficult => "/examples/very-difficult.jpg",
        }
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = ColoringError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Difficulty::from_level(level)
    }
}

impl From<Difficulty> for u8 {
    fn from(d: Difficulty) -> Self {
        d.level()
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical page the crop rectangle is fitted to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_in: f64,
    pub height_in: f64,
}

impl PageSize {
    /// US Letter, portrait.
    pub const LETTER: PageSize = PageSize {
        width_in: 8.5,
        height_in: 11.0,
    };

    /// ISO A4, portrait.
    pub const A4: PageSize = PageSize {
        width_in: 8.27,
        height_in: 11.69,
    };

    /// Width divided by height.
    pub fn aspect(&self) -> f64 {
        self.width_in / self.height_in
    }

    /// Pixel size of the page at `dpi`, rounded to whole pixels.
    pub fn pixels_at(&self, dpi: u32) -> (u32, u32) {
        (
            (self.width_in * dpi as f64).round() as u32,
            (self.height_in * dpi as f64).round() as u32,
        )
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::LETTER
    }
}
