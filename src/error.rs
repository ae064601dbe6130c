//! Error types for the edgequake-specsheet library.
//!
//! Errors are split by blast radius:
//!
//! * [`SpecSheetError`] is **fatal**: the run cannot proceed at all (input
//!   file unreadable, output directory not writable, no provider
//!   configured). Returned as `Err(SpecSheetError)` from the top-level
//!   `convert*` functions.
//!
//! * [`ProductError`] is **non-fatal**: one product failed (classifier gave
//!   up, layout could not place a row) while every other product is fine.
//!   Stored inside [`crate::output::ProductReport`] so the batch summary can
//!   list it next to the successes.
//!
//! * [`ParseWarning`]: a single table row was skipped. Never fails a
//!   product.
//!
//! Stage-internal errors ([`BackendError`], [`ClassifyError`],
//! [`RenderError`]) are folded into a [`ProductError`] by the orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-specsheet library.
#[derive(Debug, Error)]
pub enum SpecSheetError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// The input exists but could not be read (permissions, not UTF-8, ...).
    #[error("Failed to read markdown file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the output directory or write a PDF into it.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single product.
///
/// The product's PDF is simply absent; the rest of the batch carries on.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ProductError {
    /// The classifier backend kept failing until retries ran out.
    #[error("'{product}': classification failed after {attempts} attempt(s): {detail}")]
    ClassificationFailed {
        product: String,
        attempts: u32,
        detail: String,
    },

    /// Layout hit a shape it cannot place; partial pages were discarded.
    #[error("'{product}': rendering failed: {detail}")]
    RenderFailed { product: String, detail: String },
}

/// Failure reported by a [`crate::pipeline::classify::ClassifierBackend`].
///
/// The variant decides the retry policy: everything except
/// [`BackendError::Rejected`] is retried with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Network blip, 5xx, connection reset.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// HTTP 429 or provider-side quota pushback.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The call did not answer within the configured timeout.
    #[error("backend call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Authentication or request errors that retrying cannot fix.
    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Rejected(_))
    }
}

/// Classifier-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// The response did not match the expected JSON shape. Handled inside
    /// the classifier (strict retry, then degrade); never reaches callers of
    /// [`crate::pipeline::classify::Classifier::classify`].
    #[error("unparsable classifier response: {0}")]
    Schema(String),

    /// Retries exhausted or a non-retryable backend error.
    #[error("{detail}")]
    Fatal { attempts: u32, detail: String },
}

/// Layout failures for a single product.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// A product record without a name cannot be given a header band.
    #[error("product record has an empty name")]
    EmptyName,

    /// A single row does not fit even on a fresh page.
    #[error("row '{label}' needs {needed:.1}mm but a page only has {available:.1}mm of content area")]
    RowTooTall {
        label: String,
        needed: f32,
        available: f32,
    },

    /// The layout options leave no room for content.
    #[error("page geometry leaves no content area: {0}")]
    BadGeometry(String),
}

/// A skipped table row. Recorded, logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-based line number in the markdown input.
    pub line: usize,
    pub kind: ParseWarningKind,
    /// The offending row, verbatim.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseWarningKind {
    /// Fewer than two cells after splitting on `|`.
    MalformedRow { cells: usize },
    /// A continuation row before any product row.
    OrphanContinuation,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseWarningKind::MalformedRow { cells } => write!(
                f,
                "line {}: malformed row with {} cell(s), skipped: {}",
                self.line, cells, self.text
            ),
            ParseWarningKind::OrphanContinuation => write!(
                f,
                "line {}: continuation row before any product, skipped: {}",
                self.line, self.text
            ),
        }
    }
}
