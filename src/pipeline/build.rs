//! Document model builder: raw block + classification → [`ProductRecord`].
//!
//! Pure and deterministic: no I/O, no clocks, no hashing with random state.
//! Calling [`build_record`] twice with the same inputs yields equal records
//! that serialise to identical bytes.

use crate::model::{
    CategoryKind, Classification, ProductRecord, RawProductBlock, SpecItem, SpecificationCategory,
};
use crate::pipeline::sanitize::sanitize_text;

/// Merge a parsed block with its classification into the canonical record.
///
/// * Every string is passed through [`sanitize_text`].
/// * Categories that end up with the same kind (the model repeating a name
///   with different casing, say) are merged in first-seen order.
/// * Empty categories are dropped.
/// * The upgrade-options category moves after all standard categories.
pub fn build_record(block: &RawProductBlock, classification: &Classification) -> ProductRecord {
    let mut categories: Vec<SpecificationCategory> = Vec::new();

    for category in &classification.categories {
        let kind = sanitize_kind(&category.kind);
        let items: Vec<SpecItem> = category.items.iter().map(sanitize_item).collect();
        if items.is_empty() {
            continue;
        }
        match categories.iter_mut().find(|c| c.kind == kind) {
            Some(existing) => existing.items.extend(items),
            None => categories.push(SpecificationCategory::new(kind, items)),
        }
    }

    // Stable: standard categories keep their relative order.
    categories.sort_by_key(|c| c.kind.is_upgrades());

    ProductRecord {
        name: sanitize_text(&block.name),
        base_price: sanitize_text(&block.base_price),
        categories,
    }
}

fn sanitize_kind(kind: &CategoryKind) -> CategoryKind {
    match kind {
        CategoryKind::Vocabulary(name) => CategoryKind::Vocabulary(sanitize_text(name)),
        CategoryKind::Unrecognized(name) => {
            let name = sanitize_text(name);
            if name.is_empty() {
                CategoryKind::Other
            } else {
                CategoryKind::Unrecognized(name)
            }
        }
        other => other.clone(),
    }
}

fn sanitize_item(item: &SpecItem) -> SpecItem {
    SpecItem {
        label: sanitize_text(&item.label),
        value: sanitize_text(&item.value),
        price: item
            .price
            .as_deref()
            .map(sanitize_text)
            .filter(|p| !p.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawEntry;

    fn block() -> RawProductBlock {
        RawProductBlock {
            name: "Latitude™  5440".into(),
            base_price: " $999.00 ".into(),
            entries: vec![RawEntry::new("CPU", "i7"), RawEntry::new("RAM", "16GB")],
            line: 2,
        }
    }

    fn classification() -> Classification {
        Classification {
            categories: vec![
                SpecificationCategory::new(
                    CategoryKind::Upgrades,
                    vec![SpecItem {
                        label: "RAM".into(),
                        value: "32GB".into(),
                        price: Some("$150".into()),
                    }],
                ),
                SpecificationCategory::new(
                    CategoryKind::Vocabulary("Processor".into()),
                    vec![SpecItem::new("CPU", "Intel® Core™ i7")],
                ),
                SpecificationCategory::new(CategoryKind::Other, vec![]),
                SpecificationCategory::new(
                    CategoryKind::Vocabulary("Processor".into()),
                    vec![SpecItem::new("Cores", "10")],
                ),
            ],
            discarded: vec![],
            degraded: false,
            attempts: 1,
        }
    }

    #[test]
    fn sanitizes_and_orders() {
        let record = build_record(&block(), &classification());
        assert_eq!(record.name, "Latitude(TM) 5440");
        assert_eq!(record.base_price, "$999.00");

        let kinds: Vec<_> = record.categories.iter().map(|c| c.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![CategoryKind::Vocabulary("Processor".into()), CategoryKind::Upgrades]
        );
        assert_eq!(record.categories[0].items.len(), 2);
        assert_eq!(record.categories[0].items[0].value, "Intel(R) Core(TM) i7");
        assert_eq!(record.categories[1].items[0].price.as_deref(), Some("$150"));
    }

    #[test]
    fn build_is_idempotent() {
        let a = serde_json::to_vec(&build_record(&block(), &classification())).unwrap();
        let b = serde_json::to_vec(&build_record(&block(), &classification())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn blank_unrecognized_name_folds_into_other() {
        let c = Classification {
            categories: vec![SpecificationCategory::new(
                CategoryKind::Unrecognized("™".into()),
                vec![SpecItem::new("x", "y")],
            )],
            discarded: vec![],
            degraded: false,
            attempts: 1,
        };
        let record = build_record(&block(), &c);
        // "™" sanitizes to "(TM)", which is not blank.
        assert_eq!(
            record.categories[0].kind,
            CategoryKind::Unrecognized("(TM)".into())
        );

        let c = Classification {
            categories: vec![SpecificationCategory::new(
                CategoryKind::Unrecognized(" \u{00A0} ".into()),
                vec![SpecItem::new("x", "y")],
            )],
            ..c
        };
        assert_eq!(build_record(&block(), &c).categories[0].kind, CategoryKind::Other);
    }
}
