//! Prompts for LLM-based specification classification.
//!
//! All prompt text lives here so it can be inspected by unit tests and
//! changed without touching the retry or parsing logic in
//! [`crate::pipeline::classify`].
//!
//! Callers can override the system prompt via
//! [`crate::config::PipelineConfig::system_prompt`]; the user message built by
//! [`classification_user_prompt`] is always generated, because the response
//! parser depends on its numbering.

use crate::pipeline::classify::ClassificationRequest;

/// Default system prompt for classifying a product's raw specification rows.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a hardware catalogue editor. You receive the raw configuration rows of ONE product, exported from a spreadsheet, and organise them into specification categories.

Follow these rules precisely:

1. CATEGORIES
   - Prefer the category names from the vocabulary you are given, spelled exactly as given
   - Invent a new, short category name only when no vocabulary entry fits
   - Put add-on or optional items in the upgrade category, with their price if one is shown

2. ITEMS
   - Each item has a short "label" and a clear, readable "value"
   - Reference the raw row each item came from with its number in "source"
   - Keep every detail of the raw value; tidy capitalisation and spacing only

3. NOISE
   - Rows that are pure noise (empty, duplicated headers, "N/A") go in "discarded" by number
   - Never drop a row silently: every row number appears in an item "source" or in "discarded"

4. OUTPUT FORMAT
   - Output ONLY a JSON object, no commentary, no markdown fences
   - Schema:
     {"categories": [{"name": "Processor", "items": [{"label": "CPU", "value": "Intel Core i7-1355U", "source": 1}]}],
      "discarded": [3]}
   - Upgrade items may carry an extra "price" string"#;

/// Appended on the single reformat retry after an unparsable response.
pub const STRICT_REFORMAT_SUFFIX: &str = r#"

5. STRICT MODE
   Your previous answer could not be parsed. Reply with a single JSON object
   and nothing else: the first character must be "{" and the last "}".
   Use double quotes, no trailing commas, no comments."#;

/// Build the user message for one product.
pub fn classification_user_prompt(request: &ClassificationRequest, upgrade_category: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Product: {}\n", request.name));
    if request.base_price.is_empty() {
        prompt.push_str("Base price: N/A\n");
    } else {
        prompt.push_str(&format!("Base price: {}\n", request.base_price));
    }
    prompt.push_str(&format!(
        "Vocabulary: {}\nUpgrade category: {}\n\nRaw rows:\n",
        request.vocabulary.join(", "),
        upgrade_category
    ));
    for (i, entry) in request.entries.iter().enumerate() {
        prompt.push_str(&format!("{}. {}: {}\n", i + 1, entry.label, entry.value));
    }
    if request.entries.is_empty() {
        prompt.push_str("(none)\n");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawEntry;

    #[test]
    fn user_prompt_numbers_rows_from_one() {
        let request = ClassificationRequest {
            name: "Dell Latitude".into(),
            base_price: "$999.00".into(),
            entries: vec![RawEntry::new("CPU", "i7-1355U"), RawEntry::new("RAM", "16GB")],
            vocabulary: vec!["Processor".into(), "Memory".into()],
            strict: false,
        };
        let prompt = classification_user_prompt(&request, "Upgrades");
        assert!(prompt.contains("1. CPU: i7-1355U"));
        assert!(prompt.contains("2. RAM: 16GB"));
        assert!(prompt.contains("Vocabulary: Processor, Memory"));
        assert!(prompt.contains("Base price: $999.00"));
    }

    #[test]
    fn strict_suffix_demands_bare_json() {
        assert!(STRICT_REFORMAT_SUFFIX.contains("single JSON object"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("\"discarded\""));
    }
}
