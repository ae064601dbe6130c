//! Configuration types for markdown-to-spec-sheet conversion.
//!
//! Everything the pipeline can be tuned with lives in [`PipelineConfig`],
//! built via [`PipelineConfigBuilder`]. Page geometry and styling live in the
//! nested [`LayoutOptions`], which is plain serde data so a house style can be
//! kept in a JSON file and loaded by the CLI with `--layout`.
//!
//! The config is passed explicitly into every stage; no stage reads global
//! state.

use crate::error::SpecSheetError;
use crate::pipeline::classify::ClassifierBackend;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Category names the classifier is asked to use, in rendering order.
pub const DEFAULT_VOCABULARY: &[&str] = &[
    "Processor",
    "Memory",
    "Storage",
    "Display",
    "Graphics",
    "Power",
    "Wireless",
    "Operating System",
    "Warranty",
    "Upgrades",
];

/// Configuration for a batch conversion.
///
/// # Example
/// ```rust
/// use edgequake_specsheet::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(2)
///     .max_attempts(3)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of classifier calls allowed in flight at once. Default: 4.
    ///
    /// Rendering stays sequential whatever this is set to; only the
    /// network-bound classification step fans out.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed classifier backend. Takes precedence over every
    /// provider setting; tests use it to plug in deterministic stubs.
    pub backend: Option<Arc<dyn ClassifierBackend>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate per product. Default: 2048.
    pub max_tokens: usize,

    /// Total classifier attempts per product on transient failures. Default: 3.
    pub max_attempts: u32,

    /// Delay before the first retry, doubled for each further retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds; a timeout counts as a transient failure. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Category vocabulary offered to the model, in rendering order.
    pub vocabulary: Vec<String>,

    /// Name of the distinguished upgrade-options category. Default: "Upgrades".
    pub upgrade_category: String,

    /// Table parsing options.
    pub parse: ParseOptions,

    /// Page geometry and styling.
    pub layout: LayoutOptions,

    /// One PDF per product, or everything in one file.
    pub output_mode: OutputMode,

    /// Optional per-product progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            backend: None,
            temperature: 0.2,
            max_tokens: 2048,
            max_attempts: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            system_prompt: None,
            vocabulary: DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect(),
            upgrade_category: "Upgrades".to_string(),
            parse: ParseOptions::default(),
            layout: LayoutOptions::default(),
            output_mode: OutputMode::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ClassifierBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("vocabulary", &self.vocabulary)
            .field("upgrade_category", &self.upgrade_category)
            .field("parse", &self.parse)
            .field("layout", &self.layout)
            .field("output_mode", &self.output_mode)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Largest `max_attempts` the builder accepts.
pub const MAX_ATTEMPTS_LIMIT: u32 = 32;

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
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

    pub fn backend(mut self, backend: Arc<dyn ClassifierBackend>) -> Self {
        self.config.backend = Some(backend);
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

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
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

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn vocabulary<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.vocabulary = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn upgrade_category(mut self, name: impl Into<String>) -> Self {
        self.config.upgrade_category = name.into();
        self
    }

    pub fn sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.config.parse.sentinel = sentinel.into();
        self
    }

    pub fn layout(mut self, layout: LayoutOptions) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn repeat_header(mut self, v: bool) -> Self {
        self.config.layout.repeat_header = v;
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, SpecSheetError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(SpecSheetError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&c.max_attempts) {
            return Err(SpecSheetError::InvalidConfig(format!(
                "max_attempts must be within 1–{MAX_ATTEMPTS_LIMIT}, got {}",
                c.max_attempts
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(SpecSheetError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.parse.sentinel.trim().is_empty() {
            return Err(SpecSheetError::InvalidConfig(
                "Continuation sentinel must not be blank".into(),
            ));
        }
        if c.vocabulary.iter().any(|v| v.trim().is_empty()) {
            return Err(SpecSheetError::InvalidConfig(
                "Vocabulary entries must not be blank".into(),
            ));
        }
        c.layout.validate().map_err(SpecSheetError::InvalidConfig)?;
        Ok(self.config)
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// Options for [`crate::pipeline::parse::parse_table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// First-column marker meaning "same product as the row above".
    /// Compared trimmed and case-insensitively. Default: "NaN".
    pub sentinel: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            sentinel: "NaN".to_string(),
        }
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// How rendered products are grouped into PDF files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// `<safe product name>_spec.pdf` for every product (default).
    #[default]
    PerProduct,
    /// A single document holding every successful product, in input order.
    Combined { file_name: String },
}

impl OutputMode {
    pub fn combined() -> Self {
        OutputMode::Combined {
            file_name: "spec_sheets.pdf".to_string(),
        }
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// An sRGB colour, serialised as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);

    pub fn gray(level: u8) -> Self {
        Rgb(level, level, level)
    }

    /// Components scaled to the 0–1 range PDF operators expect.
    pub fn unit(self) -> (f32, f32, f32) {
        (
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        )
    }
}

/// Standard-14 font families with built-in metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    #[default]
    Helvetica,
    Courier,
}

/// Shaded header/footer bands drawn on every page, as in a letterhead
/// template. Content flows between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageFrame {
    pub header_height_mm: f32,
    pub footer_height_mm: f32,
    pub band_color: Rgb,
    pub rule_color: Rgb,
}

impl Default for PageFrame {
    fn default() -> Self {
        Self {
            header_height_mm: 70.0,
            footer_height_mm: 40.0,
            band_color: Rgb::gray(240),
            rule_color: Rgb::gray(200),
        }
    }
}

/// Page geometry and styling for the two-column template. Lengths in mm,
/// font sizes in points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub margin_top_mm: f32,
    pub margin_bottom_mm: f32,
    pub margin_left_mm: f32,
    pub margin_right_mm: f32,
    /// Share of the content width given to the label column.
    pub label_column_ratio: f32,
    pub cell_padding_mm: f32,
    pub line_height_mm: f32,
    pub section_spacing_mm: f32,
    pub font: FontFamily,
    pub title_font_size: f32,
    pub price_font_size: f32,
    pub section_font_size: f32,
    pub body_font_size: f32,
    /// Fill for rows 0, 2, 4, ... of a product.
    pub even_row_color: Rgb,
    /// Fill for rows 1, 3, 5, ... of a product.
    pub odd_row_color: Rgb,
    pub label_text_color: Rgb,
    pub value_text_color: Rgb,
    pub divider_color: Rgb,
    /// Print a compact "(continued)" header on continuation pages.
    pub repeat_header: bool,
    /// Leave rows with a blank value out of the table.
    pub skip_blank_values: bool,
    pub frame: Option<PageFrame>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            margin_top_mm: 20.0,
            margin_bottom_mm: 15.0,
            margin_left_mm: 20.0,
            margin_right_mm: 20.0,
            label_column_ratio: 0.3,
            cell_padding_mm: 1.5,
            line_height_mm: 5.0,
            section_spacing_mm: 4.0,
            font: FontFamily::Helvetica,
            title_font_size: 24.0,
            price_font_size: 20.0,
            section_font_size: 12.0,
            body_font_size: 10.0,
            even_row_color: Rgb::gray(230),
            odd_row_color: Rgb::gray(245),
            label_text_color: Rgb::gray(100),
            value_text_color: Rgb::BLACK,
            divider_color: Rgb::gray(160),
            repeat_header: false,
            skip_blank_values: true,
            frame: None,
        }
    }
}

impl LayoutOptions {
    pub fn content_width_mm(&self) -> f32 {
        self.page_width_mm - self.margin_left_mm - self.margin_right_mm
    }

    /// Top of the content area, measured from the top edge of the page.
    pub fn content_top_mm(&self) -> f32 {
        match &self.frame {
            Some(frame) => self.margin_top_mm.max(frame.header_height_mm + 5.0),
            None => self.margin_top_mm,
        }
    }

    /// Bottom of the content area, measured from the top edge of the page.
    pub fn content_bottom_mm(&self) -> f32 {
        let bottom = match &self.frame {
            Some(frame) => self.margin_bottom_mm.max(frame.footer_height_mm + 5.0),
            None => self.margin_bottom_mm,
        };
        self.page_height_mm - bottom
    }

    pub fn label_width_mm(&self) -> f32 {
        self.content_width_mm() * self.label_column_ratio
    }

    pub fn value_width_mm(&self) -> f32 {
        self.content_width_mm() - self.label_width_mm()
    }

    /// Check the geometry leaves room to draw.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_width_mm <= 0.0 || self.page_height_mm <= 0.0 {
            return Err("page size must be positive".into());
        }
        if self.content_width_mm() <= 10.0 {
            return Err(format!(
                "left/right margins leave {:.1}mm of width",
                self.content_width_mm()
            ));
        }
        let height = self.content_bottom_mm() - self.content_top_mm();
        if height <= self.line_height_mm * 2.0 {
            return Err(format!("margins and frame leave {height:.1}mm of height"));
        }
        if !(0.1..=0.9).contains(&self.label_column_ratio) {
            return Err(format!(
                "label_column_ratio must be within 0.1–0.9, got {}",
                self.label_column_ratio
            ));
        }
        if self.line_height_mm <= 0.0 || self.body_font_size <= 0.0 {
            return Err("line height and font sizes must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.parse.sentinel, "NaN");
        assert_eq!(config.vocabulary.len(), DEFAULT_VOCABULARY.len());
        assert_eq!(config.output_mode, OutputMode::PerProduct);
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = PipelineConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn runaway_attempts_rejected() {
        let err = PipelineConfig::builder().max_attempts(70).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
        assert!(PipelineConfig::builder()
            .max_attempts(MAX_ATTEMPTS_LIMIT)
            .build()
            .is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = PipelineConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("api_timeout_secs"));
    }

    #[test]
    fn blank_sentinel_rejected() {
        assert!(PipelineConfig::builder().sentinel("  ").build().is_err());
    }

    #[test]
    fn concurrency_floor_is_one() {
        let config = PipelineConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn frame_narrows_content_area() {
        let plain = LayoutOptions::default();
        let framed = LayoutOptions {
            frame: Some(PageFrame::default()),
            ..LayoutOptions::default()
        };
        assert_eq!(plain.content_top_mm(), 20.0);
        assert_eq!(framed.content_top_mm(), 75.0);
        assert_eq!(framed.content_bottom_mm(), 297.0 - 45.0);
    }

    #[test]
    fn bad_ratio_rejected() {
        let layout = LayoutOptions {
            label_column_ratio: 0.95,
            ..LayoutOptions::default()
        };
        assert!(PipelineConfig::builder().layout(layout).build().is_err());
    }

    #[test]
    fn layout_loads_from_partial_json() {
        let layout: LayoutOptions =
            serde_json::from_str(r#"{"repeat_header": true, "even_row_color": [200, 220, 255]}"#)
                .unwrap();
        assert!(layout.repeat_header);
        assert_eq!(layout.even_row_color, Rgb(200, 220, 255));
        assert_eq!(layout.page_width_mm, 210.0);
    }
}
