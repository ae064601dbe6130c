//! Data that flows between pipeline stages.
//!
//! ```text
//! RawProductBlock ──classify──▶ Classification ──build──▶ ProductRecord ──render──▶ pages
//! ```
//!
//! Every value here is produced once by its stage and only read afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One `(label, value)` pair taken from a table row, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawEntry {
    pub label: String,
    pub value: String,
}

impl RawEntry {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A product row plus its continuation rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProductBlock {
    pub name: String,
    /// Currency-formatted as found in the table (`"$999.00"`); empty when the
    /// price cell was blank or the sentinel.
    pub base_price: String,
    pub entries: Vec<RawEntry>,
    /// 1-based line of the product row in the markdown input.
    pub line: usize,
}

/// What a category is, as far as the pipeline can tell.
///
/// The classifier may invent names outside the configured vocabulary; those
/// become [`CategoryKind::Unrecognized`] and are rendered like any other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CategoryKind {
    /// A vocabulary entry, with the vocabulary's casing.
    Vocabulary(String),
    /// Upgrade options; rendered last, after a divider.
    Upgrades,
    /// A name the model produced that is not in the vocabulary.
    Unrecognized(String),
    /// Raw entries the model did not mention.
    Other,
    /// Everything, when the model's output could not be used at all.
    Unclassified,
}

impl CategoryKind {
    pub fn display_name(&self) -> &str {
        match self {
            CategoryKind::Vocabulary(name) | CategoryKind::Unrecognized(name) => name,
            CategoryKind::Upgrades => "Upgrades",
            CategoryKind::Other => "Other",
            CategoryKind::Unclassified => "Unclassified",
        }
    }

    pub fn is_upgrades(&self) -> bool {
        matches!(self, CategoryKind::Upgrades)
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single labelled value inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecItem {
    pub label: String,
    pub value: String,
    /// Add-on price, only meaningful for upgrade options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

impl SpecItem {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            price: None,
        }
    }
}

impl From<&RawEntry> for SpecItem {
    fn from(entry: &RawEntry) -> Self {
        SpecItem::new(entry.label.clone(), entry.value.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificationCategory {
    pub kind: CategoryKind,
    pub items: Vec<SpecItem>,
}

impl SpecificationCategory {
    pub fn new(kind: CategoryKind, items: Vec<SpecItem>) -> Self {
        Self { kind, items }
    }
}

/// Classifier output for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub categories: Vec<SpecificationCategory>,
    /// Raw entries the model explicitly flagged as noise.
    pub discarded: Vec<RawEntry>,
    /// True when the response was unusable and every entry landed in
    /// [`CategoryKind::Unclassified`].
    pub degraded: bool,
    /// Backend calls made, including schema and transient retries.
    pub attempts: u32,
}

impl Classification {
    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }
}

/// The canonical, sanitized record the renderer consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub base_price: String,
    pub categories: Vec<SpecificationCategory>,
}

impl ProductRecord {
    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_kind_serialises_tagged() {
        let json = serde_json::to_string(&CategoryKind::Vocabulary("Memory".into())).unwrap();
        assert_eq!(json, r#"{"kind":"vocabulary","name":"Memory"}"#);
        let json = serde_json::to_string(&CategoryKind::Other).unwrap();
        assert_eq!(json, r#"{"kind":"other"}"#);
    }

    #[test]
    fn display_names() {
        assert_eq!(CategoryKind::Unrecognized("Ports".into()).to_string(), "Ports");
        assert_eq!(CategoryKind::Unclassified.to_string(), "Unclassified");
        assert!(CategoryKind::Upgrades.is_upgrades());
    }

    #[test]
    fn item_count_sums_categories() {
        let record = ProductRecord {
            name: "X".into(),
            base_price: String::new(),
            categories: vec![
                SpecificationCategory::new(CategoryKind::Other, vec![SpecItem::new("a", "1")]),
                SpecificationCategory::new(
                    CategoryKind::Unclassified,
                    vec![SpecItem::new("b", "2"), SpecItem::new("c", "3")],
                ),
            ],
        };
        assert_eq!(record.item_count(), 3);
    }
}
