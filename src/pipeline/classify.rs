//! Specification classifier: raw rows → categorised items.
//!
//! The model call sits behind [`ClassifierBackend`] so the policy around it
//! (retries, reformat, degrade, coverage) can be tested with deterministic
//! stubs. [`crate::pipeline::llm::LlmBackend`] is the production backend.
//!
//! ## Failure policy
//!
//! ```text
//! backend error ──retryable?──yes──▶ backoff (base · 2ⁿ) ──▶ retry, up to max_attempts
//!        │                                                     │ exhausted
//!        no ───────────────────────────────────────────────────┴──▶ ClassifyError::Fatal
//!
//! unparsable JSON ──▶ one strict retry ──still bad──▶ degrade: one "Unclassified" category
//! ```
//!
//! ## Coverage
//!
//! The model cites raw rows by number (`"source"`). Rows cited by no item
//! and not explicitly discarded land in an `Other` category, so the record
//! never has fewer items than the block had rows, minus logged discards.

use crate::config::PipelineConfig;
use crate::error::{BackendError, ClassifyError};
use crate::model::{
    CategoryKind, Classification, RawEntry, RawProductBlock, SpecItem, SpecificationCategory,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// What a backend is asked to classify.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub name: String,
    pub base_price: String,
    pub entries: Vec<RawEntry>,
    pub vocabulary: Vec<String>,
    /// Set on the reformat retry after an unparsable answer.
    pub strict: bool,
}

/// Token counts reported by backends that know them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Anything that can turn a [`ClassificationRequest`] into raw response text.
///
/// Implementations return the model's text verbatim; parsing and validation
/// are the classifier's job.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, BackendError>;

    /// Running token totals, for the batch summary.
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

type MemoKey = (String, String, Vec<RawEntry>);

/// Upper bound on a single backoff delay.
const MAX_BACKOFF_MS: u64 = 10 * 60 * 1000;

/// Applies the retry/degrade/coverage policy around a backend.
pub struct Classifier {
    backend: Arc<dyn ClassifierBackend>,
    max_attempts: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
    vocabulary: Vec<String>,
    upgrade_category: String,
    /// One cell per distinct block. Concurrent callers with the same key
    /// wait on the cell, so only the first reaches the backend.
    memo: Mutex<HashMap<MemoKey, Arc<OnceCell<Classification>>>>,
}

impl Classifier {
    pub fn new(backend: Arc<dyn ClassifierBackend>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            max_attempts: config.max_attempts.max(1),
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
            vocabulary: config.vocabulary.clone(),
            upgrade_category: config.upgrade_category.clone(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ClassifierBackend> {
        &self.backend
    }

    /// Classify one product block.
    ///
    /// Returns `Err` only when the backend could not be reached within the
    /// retry budget. Unusable answers degrade instead of failing.
    pub async fn classify(&self, block: &RawProductBlock) -> Result<Classification, ClassifyError> {
        let key: MemoKey = (
            block.name.clone(),
            block.base_price.clone(),
            block.entries.clone(),
        );
        let cell = self.memo_cell(key);
        if let Some(hit) = cell.get() {
            debug!("'{}': reusing classification of identical rows", block.name);
            return Ok(hit.clone());
        }
        // A failed call leaves the cell empty; the next caller retries.
        let classification = cell
            .get_or_try_init(|| self.classify_uncached(block))
            .await?;
        Ok(classification.clone())
    }

    async fn classify_uncached(&self, block: &RawProductBlock) -> Result<Classification, ClassifyError> {
        if block.entries.is_empty() {
            let empty = Classification {
                categories: Vec::new(),
                discarded: Vec::new(),
                degraded: false,
                attempts: 0,
            };
            return Ok(empty);
        }

        let mut request = ClassificationRequest {
            name: block.name.clone(),
            base_price: block.base_price.clone(),
            entries: block.entries.clone(),
            vocabulary: self.vocabulary.clone(),
            strict: false,
        };
        let mut attempts = 0u32;

        let raw = self.call_with_retry(&request, &mut attempts).await?;
        let mut classification = match parse_response(&raw) {
            Ok(response) => self.resolve(block, response),
            Err(ClassifyError::Schema(detail)) => {
                warn!(
                    "'{}': unparsable classifier response ({}), retrying in strict mode",
                    block.name, detail
                );
                request.strict = true;
                let raw = self.call_with_retry(&request, &mut attempts).await?;
                match parse_response(&raw) {
                    Ok(response) => self.resolve(block, response),
                    Err(e) => {
                        warn!(
                            "'{}': strict retry still unparsable ({}); all {} rows go to Unclassified",
                            block.name,
                            e,
                            block.entries.len()
                        );
                        degrade(block)
                    }
                }
            }
            Err(e) => return Err(e),
        };
        classification.attempts = attempts;

        info!(
            "'{}': classified into {} categories, {} items, {} discarded{} ({} call(s))",
            block.name,
            classification.categories.len(),
            classification.item_count(),
            classification.discarded.len(),
            if classification.degraded { ", degraded" } else { "" },
            attempts
        );

        Ok(classification)
    }

    /// Call the backend with exponential backoff on retryable errors.
    async fn call_with_retry(
        &self,
        request: &ClassificationRequest,
        attempts: &mut u32,
    ) -> Result<String, ClassifyError> {
        let mut last_err: Option<BackendError> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "'{}': retry {}/{} after {}ms",
                    request.name,
                    attempt,
                    self.max_attempts - 1,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            *attempts += 1;

            let call = self.backend.classify(request);
            let outcome = match timeout(Duration::from_secs(self.api_timeout_secs), call).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout {
                    secs: self.api_timeout_secs,
                }),
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => {
                    warn!("'{}': {}; not retrying", request.name, e);
                    return Err(ClassifyError::Fatal {
                        attempts: *attempts,
                        detail: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("'{}': attempt {} failed: {}", request.name, attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }

        Err(ClassifyError::Fatal {
            attempts: *attempts,
            detail: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Map model output onto categories, enforcing coverage of raw rows.
    fn resolve(&self, block: &RawProductBlock, response: ModelResponse) -> Classification {
        let entries = &block.entries;
        let mut covered = vec![false; entries.len()];
        let mut categories: Vec<SpecificationCategory> = Vec::new();

        for category in response.categories {
            let kind = self.kind_for(&category.name);
            let mut items = Vec::with_capacity(category.items.len());

            for item in category.items {
                let mut label = item.label.as_ref().map(value_text).unwrap_or_default();
                let mut value = item.value.as_ref().map(value_text).unwrap_or_default();
                let source = item
                    .source
                    .as_ref()
                    .and_then(|s| source_index(s, entries.len()))
                    .or_else(|| match_entry(entries, &covered, &label, &value));

                match source {
                    Some(idx) => {
                        covered[idx] = true;
                        if label.trim().is_empty() {
                            label = entries[idx].label.clone();
                        }
                        if value.trim().is_empty() {
                            value = entries[idx].value.clone();
                        }
                    }
                    None if label.trim().is_empty() && value.trim().is_empty() => continue,
                    None => {}
                }

                let price = item
                    .price
                    .as_ref()
                    .map(value_text)
                    .filter(|p| !p.trim().is_empty());
                items.push(SpecItem { label, value, price });
            }

            push_items(&mut categories, kind, items);
        }

        let mut discarded = Vec::new();
        for idx in response
            .discarded
            .iter()
            .filter_map(|s| source_index(s, entries.len()))
        {
            if covered[idx] {
                continue;
            }
            covered[idx] = true;
            info!(
                "'{}': row {} discarded as noise: {}: {}",
                block.name,
                idx + 1,
                entries[idx].label,
                entries[idx].value
            );
            discarded.push(entries[idx].clone());
        }

        let missed: Vec<SpecItem> = entries
            .iter()
            .zip(&covered)
            .filter(|(_, covered)| !**covered)
            .map(|(entry, _)| SpecItem::from(entry))
            .collect();
        if !missed.is_empty() {
            debug!(
                "'{}': {} row(s) not mentioned by the model, filed under Other",
                block.name,
                missed.len()
            );
            push_items(&mut categories, CategoryKind::Other, missed);
        }

        Classification {
            categories,
            discarded,
            degraded: false,
            attempts: 0,
        }
    }

    /// Map a model-supplied category name onto the tagged kinds.
    fn kind_for(&self, name: &str) -> CategoryKind {
        let name = name.trim();
        if name.is_empty() || same_name(name, "other") {
            return CategoryKind::Other;
        }
        if same_name(name, &self.upgrade_category)
            || same_name(name, "upgrades")
            || same_name(name, "upgrade options")
        {
            return CategoryKind::Upgrades;
        }
        match self.vocabulary.iter().find(|v| same_name(v, name)) {
            Some(canonical) => CategoryKind::Vocabulary(canonical.clone()),
            None => CategoryKind::Unrecognized(name.to_string()),
        }
    }

    fn memo_cell(&self, key: MemoKey) -> Arc<OnceCell<Classification>> {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(memo.entry(key).or_default())
    }
}

/// Delay before retry number `retry` (1-based): `base · 2^(retry-1)`,
/// saturating at [`MAX_BACKOFF_MS`].
fn backoff_ms(base: u64, retry: u32) -> u64 {
    if base == 0 {
        return 0;
    }
    2u64.checked_pow(retry.saturating_sub(1))
        .and_then(|m| base.checked_mul(m))
        .map_or(MAX_BACKOFF_MS, |d| d.min(MAX_BACKOFF_MS))
}

/// Every raw row in a single `Unclassified` category.
fn degrade(block: &RawProductBlock) -> Classification {
    Classification {
        categories: vec![SpecificationCategory::new(
            CategoryKind::Unclassified,
            block.entries.iter().map(SpecItem::from).collect(),
        )],
        discarded: Vec::new(),
        degraded: true,
        attempts: 0,
    }
}

fn push_items(categories: &mut Vec<SpecificationCategory>, kind: CategoryKind, items: Vec<SpecItem>) {
    if items.is_empty() {
        return;
    }
    match categories.iter_mut().find(|c| c.kind == kind) {
        Some(existing) => existing.items.extend(items),
        None => categories.push(SpecificationCategory::new(kind, items)),
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ModelResponse {
    categories: Vec<ModelCategory>,
    #[serde(default)]
    discarded: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ModelCategory {
    #[serde(alias = "category", alias = "title")]
    name: String,
    #[serde(default, alias = "specs")]
    items: Vec<ModelItem>,
}

#[derive(Debug, Deserialize)]
struct ModelItem {
    #[serde(default)]
    label: Option<Value>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    source: Option<Value>,
    #[serde(default)]
    price: Option<Value>,
}

/// Pull the JSON object out of a response and deserialize it.
///
/// Models wrap JSON in fences or prose often enough that the object is cut
/// from the first `{` to the last `}` before parsing.
fn parse_response(raw: &str) -> Result<ModelResponse, ClassifyError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => {
            return Err(ClassifyError::Schema(
                "no JSON object in response".to_string(),
            ))
        }
    };
    serde_json::from_str(json).map_err(|e| ClassifyError::Schema(e.to_string()))
}

/// 1-based row reference → 0-based index, if in range.
fn source_index(source: &Value, len: usize) -> Option<usize> {
    let n = match source {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    let n = usize::try_from(n).ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

/// Find an uncited row whose label and value match the item's text.
fn match_entry(entries: &[RawEntry], covered: &[bool], label: &str, value: &str) -> Option<usize> {
    let (label, value) = (normalize(label), normalize(value));
    entries
        .iter()
        .enumerate()
        .find(|(i, e)| !covered[*i] && normalize(&e.label) == label && normalize(&e.value) == value)
        .map(|(i, _)| i)
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn same_name(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
