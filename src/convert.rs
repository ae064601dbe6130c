//! Batch entry points: markdown table in, spec-sheet PDFs out.
//!
//! ## Flow
//!
//! ```text
//! markdown ──parse──▶ blocks ──classify (buffered, N at a time)──▶ in input order
//!                                                                   │
//!        ┌──────────────────────────────────────────────────────────┘
//!        ▼  sequential, one product at a time
//!   build record ──▶ render into document ──▶ report (Done | Failed{stage})
//! ```
//!
//! A product that fails at any stage is reported and skipped; it never
//! aborts the batch. Only run-level problems (unreadable input, unwritable
//! output directory, no provider) come back as `Err`.

use crate::config::{OutputMode, PipelineConfig};
use crate::error::{ClassifyError, ProductError, SpecSheetError};
use crate::model::{Classification, RawProductBlock};
use crate::output::{BatchOutput, BatchSummary, ProductReport, ProductState, RenderedPdf, Stage};
use crate::pipeline::build::build_record;
use crate::pipeline::classify::{Classifier, ClassifierBackend};
use crate::pipeline::llm::LlmBackend;
use crate::pipeline::parse::{parse_table, ParseOutput};
use crate::pipeline::render::{render_product, SpecDocument};
use crate::pipeline::sanitize::safe_file_stem;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Model used when a provider is named without one.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Title of a combined document.
const COMBINED_TITLE: &str = "Spec sheets";

/// Run the whole pipeline over a markdown document held in memory.
///
/// # Returns
/// `Ok(BatchOutput)` even when some products failed; check
/// `output.summary.failed`. PDFs are returned as bytes in
/// `output.documents`; nothing is written to disk.
///
/// # Errors
/// Only when no classifier backend can be set up.
pub async fn run_batch(markdown: &str, config: &PipelineConfig) -> Result<BatchOutput, SpecSheetError> {
    let start = Instant::now();
    let ParseOutput { blocks, warnings } = parse_table(markdown, &config.parse);
    for warning in &warnings {
        warn!("{}", warning);
    }
    info!(
        "Parsed {} product(s), {} warning(s)",
        blocks.len(),
        warnings.len()
    );

    let total = blocks.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }
    if blocks.is_empty() {
        let summary = BatchSummary {
            warnings: warnings.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            ..BatchSummary::default()
        };
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(0, 0);
        }
        return Ok(BatchOutput {
            warnings,
            summary,
            ..BatchOutput::default()
        });
    }

    let backend = resolve_backend(config).await?;
    let classifier = Classifier::new(Arc::clone(&backend), config);

    // ── Classify: concurrent, results kept in input order ────────────────
    let classified: Vec<Result<Classification, ClassifyError>> =
        stream::iter(blocks.iter().enumerate().map(|(i, block)| {
            let classifier = &classifier;
            let span = info_span!("product", index = i + 1, name = %block.name);
            async move {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_product_start(i + 1, total, &block.name);
                }
                info!("parsed: {} entries", block.entries.len());
                classifier.classify(block).await
            }
            .instrument(span)
        }))
        .buffered(config.concurrency.max(1))
        .collect()
        .await;

    // ── Build + render: sequential, in input order ───────────────────────
    let mut reports = Vec::with_capacity(total);
    let mut documents = Vec::new();
    let mut used_names = HashSet::new();
    let mut combined = match &config.output_mode {
        OutputMode::Combined { file_name } => Some((
            file_name.clone(),
            SpecDocument::new(COMBINED_TITLE),
            Vec::new(),
        )),
        OutputMode::PerProduct => None,
    };

    for (i, (block, outcome)) in blocks.iter().zip(classified).enumerate() {
        let span = info_span!("product", index = i + 1, name = %block.name);
        let _enter = span.enter();

        let mut report = ProductReport::new(i + 1, block);
        match outcome {
            Ok(classification) => {
                report.state = ProductState::Classified;
                report.attempts = classification.attempts;
                report.degraded = classification.degraded;
                report.discarded = classification.discarded.len();
                info!(
                    "classified: {} categories{}",
                    classification.categories.len(),
                    if classification.degraded { " (degraded)" } else { "" }
                );

                let target = match combined.as_mut() {
                    Some((_, document, products)) => Target::Combined(document, products),
                    None => Target::PerProduct,
                };
                if let Some(pdf) = build_and_render(block, &classification, config, target, &mut report) {
                    let file_name = unique_file_name(&pdf.file_name, &mut used_names);
                    report.file_name = Some(file_name.clone());
                    documents.push(RenderedPdf { file_name, ..pdf });
                }
            }
            Err(e) => {
                let attempts = match &e {
                    ClassifyError::Fatal { attempts, .. } => *attempts,
                    ClassifyError::Schema(_) => 0,
                };
                report.attempts = attempts;
                report.fail(
                    Stage::Classify,
                    ProductError::ClassificationFailed {
                        product: block.name.clone(),
                        attempts,
                        detail: e.to_string(),
                    },
                );
            }
        }

        match &report.state {
            ProductState::Failed { stage, reason } => {
                warn!("failed at {}: {}", stage, reason);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_product_error(i + 1, total, &block.name, reason);
                }
            }
            _ => {
                info!("done: {} page(s)", report.pages);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_product_complete(i + 1, total, &block.name, report.pages);
                }
            }
        }
        reports.push(report);
    }

    if let Some((file_name, document, products)) = combined {
        if document.is_empty() {
            warn!("No product rendered; combined file '{}' not produced", file_name);
        } else {
            for report in reports.iter_mut().filter(|r| r.state.is_done()) {
                report.file_name = Some(file_name.clone());
            }
            documents.push(RenderedPdf {
                file_name,
                products,
                pages: document.page_count(),
                bytes: document.finish(),
                path: None,
            });
        }
    }

    let usage = backend.token_usage();
    let done = reports.iter().filter(|r| r.state.is_done()).count();
    let summary = BatchSummary {
        products: total,
        done,
        failed: reports.iter().filter(|r| r.state.is_failed()).count(),
        degraded: reports.iter().filter(|r| r.degraded).count(),
        warnings: warnings.len(),
        files: documents.len(),
        pages: documents.iter().map(|d| d.pages).sum(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        duration_ms: start.elapsed().as_millis() as u64,
        failures: reports.iter().filter_map(|r| r.error.clone()).collect(),
    };

    info!(
        "Batch complete: {}/{} done, {} failed, {} warning(s), {} file(s), {}ms",
        summary.done,
        summary.products,
        summary.failed,
        summary.warnings,
        summary.files,
        summary.duration_ms
    );
    for failure in &summary.failures {
        info!("  failed: {}", failure);
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, done);
    }

    Ok(BatchOutput {
        reports,
        warnings,
        documents,
        summary,
    })
}

/// Read a markdown file and run the pipeline over it.
pub async fn convert_file(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, SpecSheetError> {
    let markdown = read_input(input_path.as_ref()).await?;
    run_batch(&markdown, config).await
}

/// Run the pipeline and write every PDF into `output_dir`.
///
/// The directory is created if needed. Each file is written atomically
/// (temp file + rename) so readers never see a half-written PDF.
pub async fn convert_to_dir(
    input_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, SpecSheetError> {
    let mut output = convert_file(input_path, config).await?;
    let dir = output_dir.as_ref();

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SpecSheetError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    for pdf in &mut output.documents {
        let path = dir.join(&pdf.file_name);
        write_atomic(&path, &pdf.bytes).await?;
        debug!("Wrote {} ({} bytes)", path.display(), pdf.bytes.len());
        pdf.path = Some(path);
    }
    info!(
        "Wrote {} file(s) to {}",
        output.documents.len(),
        dir.display()
    );

    Ok(output)
}

/// Synchronous wrapper around [`convert_to_dir`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_to_dir_sync(
    input_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, SpecSheetError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SpecSheetError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_to_dir(input_path, output_dir, config))
}

/// Parse only: what the pipeline would see, without calling any backend.
pub fn inspect(markdown: &str, config: &PipelineConfig) -> ParseOutput {
    parse_table(markdown, &config.parse)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Where a product's pages go.
enum Target<'a> {
    PerProduct,
    Combined(&'a mut SpecDocument, &'a mut Vec<String>),
}

/// Build the record and render it. Updates `report`; returns a finished
/// per-product PDF, or `None` in combined mode and on failure.
fn build_and_render(
    block: &RawProductBlock,
    classification: &Classification,
    config: &PipelineConfig,
    target: Target<'_>,
    report: &mut ProductReport,
) -> Option<RenderedPdf> {
    let record = build_record(block, classification);
    report.state = ProductState::Built;
    report.categories = record.categories.len();
    report.items = record.item_count();

    let render_failed = |report: &mut ProductReport, e: &dyn std::fmt::Display| {
        report.fail(
            Stage::Render,
            ProductError::RenderFailed {
                product: block.name.clone(),
                detail: e.to_string(),
            },
        );
    };

    match target {
        Target::Combined(document, products) => {
            match render_product(&record, &config.layout, document) {
                Ok(pages) => {
                    report.pages = pages;
                    report.state = ProductState::Rendered;
                    debug!("rendered: {} page(s) into combined document", pages);
                    products.push(record.name.clone());
                    report.state = ProductState::Done;
                }
                Err(e) => render_failed(report, &e),
            }
            None
        }
        Target::PerProduct => {
            let mut document = SpecDocument::new(record.name.clone());
            match render_product(&record, &config.layout, &mut document) {
                Ok(pages) => {
                    report.pages = pages;
                    report.state = ProductState::Rendered;
                    debug!("rendered: {} page(s)", pages);
                    let bytes = document.finish();
                    report.state = ProductState::Done;
                    Some(RenderedPdf {
                        file_name: format!("{}_spec.pdf", safe_file_stem(&record.name)),
                        products: vec![record.name],
                        pages,
                        bytes,
                        path: None,
                    })
                }
                Err(e) => {
                    render_failed(report, &e);
                    None
                }
            }
        }
    }
}

/// Suffix `_2`, `_3`, ... when two products map to the same file name.
fn unique_file_name(candidate: &str, used: &mut HashSet<String>) -> String {
    if used.insert(candidate.to_string()) {
        return candidate.to_string();
    }
    let stem = candidate.strip_suffix(".pdf").unwrap_or(candidate);
    let mut n = 2;
    loop {
        let name = format!("{stem}_{n}.pdf");
        if used.insert(name.clone()) {
            warn!("Duplicate file name '{}', writing '{}'", candidate, name);
            return name;
        }
        n += 1;
    }
}

async fn read_input(path: &Path) -> Result<String, SpecSheetError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(SpecSheetError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SpecSheetError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SpecSheetError> {
    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| SpecSheetError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| SpecSheetError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SpecSheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SpecSheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the classifier backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`), used as-is. Tests and
///    callers with their own classifier plug in here.
/// 2. **Pre-built provider** (`config.provider`), wrapped in [`LlmBackend`].
/// 3. **Named provider + model** (`config.provider_name`), created through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 4. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 5. **`OPENAI_API_KEY`** present: OpenAI with the configured model.
/// 6. **Full auto-detection** via [`ProviderFactory::from_env`].
pub async fn resolve_backend(config: &PipelineConfig) -> Result<Arc<dyn ClassifierBackend>, SpecSheetError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmBackend::new(provider, config)))
}

fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, SpecSheetError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SpecSheetError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
