//! Batch results: per-product reports, rendered PDFs and the run summary.

use crate::error::{ParseWarning, ProductError};
use crate::model::RawProductBlock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage, used to say where a product failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Classify,
    Build,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Parse => "parse",
            Stage::Classify => "classify",
            Stage::Build => "build",
            Stage::Render => "render",
        };
        f.write_str(s)
    }
}

/// Where a product is in `Parsed → Classified → Built → Rendered → Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProductState {
    Parsed,
    Classified,
    Built,
    Rendered,
    Done,
    Failed { stage: Stage, reason: String },
}

impl ProductState {
    pub fn is_done(&self) -> bool {
        matches!(self, ProductState::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProductState::Failed { .. })
    }
}

/// What happened to one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReport {
    /// 1-based position in the input table.
    pub index: usize,
    pub name: String,
    /// 1-based line of the product row in the markdown input.
    pub line: usize,
    pub state: ProductState,
    pub entries: usize,
    pub categories: usize,
    pub items: usize,
    pub discarded: usize,
    /// Classifier output was unusable; rows were filed as Unclassified.
    pub degraded: bool,
    /// Backend calls spent on this product (0 on a memo hit).
    pub attempts: u32,
    pub pages: usize,
    /// File holding this product's pages, once known.
    pub file_name: Option<String>,
    pub error: Option<ProductError>,
}

impl ProductReport {
    pub fn new(index: usize, block: &RawProductBlock) -> Self {
        Self {
            index,
            name: block.name.clone(),
            line: block.line,
            state: ProductState::Parsed,
            entries: block.entries.len(),
            categories: 0,
            items: 0,
            discarded: 0,
            degraded: false,
            attempts: 0,
            pages: 0,
            file_name: None,
            error: None,
        }
    }

    /// Mark the product failed at `stage`.
    pub fn fail(&mut self, stage: Stage, error: ProductError) {
        self.state = ProductState::Failed {
            stage,
            reason: error.to_string(),
        };
        self.error = Some(error);
    }
}

/// A finished PDF file image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPdf {
    pub file_name: String,
    /// Products whose pages are in this file, in order.
    pub products: Vec<String>,
    pub pages: usize,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Set once the file has been written to disk.
    pub path: Option<PathBuf>,
}

/// Counts for the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub products: usize,
    pub done: usize,
    pub failed: usize,
    pub degraded: usize,
    pub warnings: usize,
    pub files: usize,
    pub pages: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub failures: Vec<ProductError>,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutput {
    pub reports: Vec<ProductReport>,
    pub warnings: Vec<ParseWarning>,
    pub documents: Vec<RenderedPdf>,
    pub summary: BatchSummary,
}

impl BatchOutput {
    pub fn done(&self) -> impl Iterator<Item = &ProductReport> {
        self.reports.iter().filter(|r| r.state.is_done())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProductReport> {
        self.reports.iter().filter(|r| r.state.is_failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawEntry;

    #[test]
    fn fail_records_stage_and_reason() {
        let block = RawProductBlock {
            name: "Dell".into(),
            base_price: "$1".into(),
            entries: vec![RawEntry::new("CPU", "i7")],
            line: 3,
        };
        let mut report = ProductReport::new(1, &block);
        assert_eq!(report.state, ProductState::Parsed);
        assert_eq!(report.entries, 1);

        report.fail(
            Stage::Classify,
            ProductError::ClassificationFailed {
                product: "Dell".into(),
                attempts: 3,
                detail: "rate limited: 429".into(),
            },
        );
        assert!(report.state.is_failed());
        match &report.state {
            ProductState::Failed { stage, reason } => {
                assert_eq!(*stage, Stage::Classify);
                assert!(reason.contains("429"));
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn state_serialises_tagged() {
        let json = serde_json::to_string(&ProductState::Failed {
            stage: Stage::Render,
            reason: "too tall".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"failed","stage":"render","reason":"too tall"}"#);
    }
}
