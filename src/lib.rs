//! # edgequake-specsheet
//!
//! Turn a markdown table of product configurations into printable,
//! one-product-per-sheet PDF specification documents.
//!
//! ## Why this crate?
//!
//! Configuration exports from spreadsheets are flat: one product row followed
//! by a run of loosely labelled continuation rows. Grouping those rows into
//! "Processor", "Memory", "Storage" by hand does not scale across a
//! catalogue, and keyword rules miss half the phrasing. This crate asks an
//! LLM to do the grouping, then checks its answer (every row accounted for,
//! categories mapped onto a fixed vocabulary) before laying the result out
//! as a clean two-column spec sheet.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Parse     pipe table → product blocks (continuation rows via sentinel)
//!  ├─ 2. Classify  concurrent LLM calls, retry/backoff, degrade on bad JSON
//!  ├─ 3. Build     sanitize, merge, upgrades last → ProductRecord
//!  ├─ 4. Layout    two-column table, word wrap, pagination
//!  └─ 5. Render    standard-14 fonts via pdf-writer → one PDF per product
//! ```
//!
//! A product that fails classification or layout is reported and skipped;
//! the rest of the batch still renders.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_specsheet::{convert_to_dir, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = PipelineConfig::default();
//!     let output = convert_to_dir("products.md", "out/", &config).await?;
//!     eprintln!(
//!         "{}/{} products rendered, {} failed",
//!         output.summary.done, output.summary.products, output.summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `specsheet` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-specsheet = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FontFamily, LayoutOptions, OutputMode, PageFrame, ParseOptions, PipelineConfig,
    PipelineConfigBuilder, Rgb, DEFAULT_VOCABULARY,
};
pub use convert::{convert_file, convert_to_dir, convert_to_dir_sync, inspect, run_batch};
pub use error::{
    BackendError, ClassifyError, ParseWarning, ParseWarningKind, ProductError, RenderError,
    SpecSheetError,
};
pub use model::{
    CategoryKind, Classification, ProductRecord, RawEntry, RawProductBlock, SpecItem,
    SpecificationCategory,
};
pub use output::{BatchOutput, BatchSummary, ProductReport, ProductState, RenderedPdf, Stage};
pub use pipeline::build::build_record;
pub use pipeline::classify::{ClassificationRequest, Classifier, ClassifierBackend, TokenUsage};
pub use pipeline::llm::LlmBackend;
pub use pipeline::parse::{parse_table, ParseOutput};
pub use pipeline::render::{render_product, SpecDocument};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
