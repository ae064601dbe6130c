//! Table parser: markdown pipe-table → per-product raw blocks.
//!
//! The input is a three-column table, `Product | Configurations | Price`,
//! exported from a spreadsheet. A product row names the product; the rows
//! below it carry the sentinel (`NaN` by default) in the first column and
//! belong to the same product:
//!
//! ```text
//! | 2024 Product  | Configurations | Price    |
//! |---------------|----------------|----------|
//! | Dell Latitude | Base           | $999.00  |
//! | NaN           | CPU            | i7-1355U |
//! | NaN           | 16GB DDR4      | NaN      |
//! ```
//!
//! Cell text is kept verbatim here. Sanitization happens exactly once, in
//! [`crate::pipeline::sanitize`], so nothing is escaped twice.

use crate::config::ParseOptions;
use crate::error::{ParseWarning, ParseWarningKind};
use crate::model::{RawEntry, RawProductBlock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Result of one parse pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutput {
    pub blocks: Vec<RawProductBlock>,
    pub warnings: Vec<ParseWarning>,
}

/// Label given to a non-base value found in a product row's configuration cell.
pub const CONFIGURATION_LABEL: &str = "Configuration";

/// Keyword hints used to label continuation rows that carry only a value.
/// First matching label wins.
const LABEL_HINTS: &[(&str, &[&str])] = &[
    ("Processor", &["processor", "intel", "amd", "core", "celeron", "xeon"]),
    ("Memory", &["memory", "gb:", "ram", "rdimm", "ddr"]),
    ("Storage", &["storage", "ssd", "hdd", "emmc", "hard drive", "nvme"]),
    ("Display", &["display", "screen", "lcd", "\"", "fhd", "hd", "monitor"]),
    ("Graphics", &["graphics", "gpu", "radeon", "nvidia", "intel® uhd"]),
    ("Power", &["adapter", "battery", "cell", "wh", "expresscharge"]),
    ("Wireless", &["wireless", "wi-fi", "bluetooth", "ax201", "ax211"]),
    ("Operating System", &["windows", "chrome"]),
    ("Warranty", &["warranty", "service", "support"]),
];

/// Label for a bare value, from [`LABEL_HINTS`], else `"Other"`.
pub fn infer_label(value: &str) -> &'static str {
    let lower = value.to_lowercase();
    LABEL_HINTS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(label, _)| *label)
        .unwrap_or("Other")
}

/// Parse the markdown table into product blocks, in source order.
///
/// Never fails: a file without table rows gives an empty output, and bad
/// rows are skipped with a [`ParseWarning`].
pub fn parse_table(markdown: &str, options: &ParseOptions) -> ParseOutput {
    let lines: Vec<(usize, &str)> = markdown
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .collect();

    let mut out = ParseOutput::default();
    let mut current: Option<RawProductBlock> = None;
    let mut seen_table_row = false;

    for (pos, &(line_no, line)) in lines.iter().enumerate() {
        if !line.starts_with('|') {
            continue;
        }
        if is_separator_row(line) {
            continue;
        }

        // Column-header row: the first table row in the file, or any row
        // sitting directly on top of a separator.
        let next_is_separator = lines
            .get(pos + 1)
            .map(|&(_, next)| next.starts_with('|') && is_separator_row(next))
            .unwrap_or(false);
        if !seen_table_row || next_is_separator {
            seen_table_row = true;
            debug!("line {}: skipping column-header row", line_no);
            continue;
        }

        let cells = split_cells(line);
        if cells.len() < 2 {
            let warning = ParseWarning {
                line: line_no,
                kind: ParseWarningKind::MalformedRow { cells: cells.len() },
                text: line.to_string(),
            };
            warn!("{}", warning);
            out.warnings.push(warning);
            continue;
        }

        if is_sentinel(cells[0], options) {
            match current.as_mut() {
                Some(block) => block.entries.push(continuation_entry(&cells, options)),
                None => {
                    let warning = ParseWarning {
                        line: line_no,
                        kind: ParseWarningKind::OrphanContinuation,
                        text: line.to_string(),
                    };
                    warn!("{}", warning);
                    out.warnings.push(warning);
                }
            }
            continue;
        }

        if let Some(done) = current.take() {
            out.blocks.push(done);
        }
        current = Some(product_row(line_no, &cells, options));
    }

    if let Some(done) = current.take() {
        out.blocks.push(done);
    }

    debug!(
        "Parsed {} product block(s), {} warning(s)",
        out.blocks.len(),
        out.warnings.len()
    );
    out
}

fn product_row(line: usize, cells: &[&str], options: &ParseOptions) -> RawProductBlock {
    let price = match cells.get(2) {
        Some(cell) if !is_blank_or_sentinel(cell, options) => cell.to_string(),
        Some(_) => String::new(),
        None => cells
            .iter()
            .skip(1)
            .find(|c| c.starts_with(['$', '€', '£']))
            .map(|c| c.to_string())
            .unwrap_or_default(),
    };

    let mut entries = Vec::new();
    let configuration = cells[1];
    if !is_base_marker(configuration, options) && !configuration.starts_with('$') {
        entries.push(RawEntry::new(CONFIGURATION_LABEL, configuration));
    }

    RawProductBlock {
        name: cells[0].to_string(),
        base_price: price,
        entries,
        line,
    }
}

fn continuation_entry(cells: &[&str], options: &ParseOptions) -> RawEntry {
    match cells.get(2) {
        Some(value) if !is_sentinel(value, options) => RawEntry::new(cells[1], *value),
        _ => RawEntry::new(infer_label(cells[1]), cells[1]),
    }
}

/// Split a pipe row into trimmed cells, dropping only the empty cells
/// produced by the leading and trailing pipes. A row of nothing but pipes
/// and blanks has no cells.
fn split_cells(line: &str) -> Vec<&str> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    let cells: Vec<&str> = inner.split('|').map(str::trim).collect();
    if cells.iter().all(|c| c.is_empty()) {
        Vec::new()
    } else {
        cells
    }
}

fn is_separator_row(line: &str) -> bool {
    line.contains('-') && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn is_sentinel(cell: &str, options: &ParseOptions) -> bool {
    cell.trim().eq_ignore_ascii_case(options.sentinel.trim())
}

fn is_blank_or_sentinel(cell: &str, options: &ParseOptions) -> bool {
    cell.is_empty() || is_sentinel(cell, options)
}

fn is_base_marker(cell: &str, options: &ParseOptions) -> bool {
    is_blank_or_sentinel(cell, options) || cell.to_lowercase().starts_with("base")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(md: &str) -> ParseOutput {
        parse_table(md, &ParseOptions::default())
    }

    const DELL: &str = "\
| 2024 Product | Configurations | Price |
| Dell Latitude | Base | $999.00 |
| NaN | CPU | i7-1355U |
| NaN | RAM | 16GB |
";

    #[test]
    fn dell_scenario() {
        let out = parse(DELL);
        assert_eq!(out.blocks.len(), 1);
        let block = &out.blocks[0];
        assert_eq!(block.name, "Dell Latitude");
        assert_eq!(block.base_price, "$999.00");
        assert_eq!(
            block.entries,
            vec![RawEntry::new("CPU", "i7-1355U"), RawEntry::new("RAM", "16GB")]
        );
        assert_eq!(block.line, 2);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn separator_rows_are_skipped() {
        let md = "\
| Product | Configurations | Price |
|:--------|----------------|------:|
| A | Base | $1 |
| NaN | CPU | x |
";
        let out = parse(md);
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].entries.len(), 1);
    }

    #[test]
    fn n_product_rows_give_n_blocks() {
        let md = "\
| Product | Configurations | Price |
|---|---|---|
| A | Base | $1 |
| NaN | CPU | a1 |
| B | Base | $2 |
| C | Base | $3 |
| NaN | CPU | c1 |
| NaN | RAM | c2 |
";
        let out = parse(md);
        let names: Vec<_> = out.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(out.blocks[0].entries.len(), 1);
        // B is followed straight away by C: a block with no entries.
        assert!(out.blocks[1].entries.is_empty());
        assert_eq!(out.blocks[2].entries.len(), 2);
    }

    #[test]
    fn no_table_gives_empty_output() {
        let out = parse("# Just a heading\n\nSome prose, no table.\n");
        assert!(out.blocks.is_empty());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn malformed_row_is_warned_and_skipped() {
        let md = "\
| Product | Configurations | Price |
| A | Base | $1 |
| only-one-cell |
| NaN | CPU | a1 |
";
        let out = parse(md);
        assert_eq!(out.blocks[0].entries, vec![RawEntry::new("CPU", "a1")]);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].line, 3);
        assert_eq!(
            out.warnings[0].kind,
            ParseWarningKind::MalformedRow { cells: 1 }
        );
    }

    #[test]
    fn orphan_continuation_is_warned() {
        let md = "\
| Product | Configurations | Price |
| NaN | CPU | lost |
| A | Base | $1 |
";
        let out = parse(md);
        assert_eq!(out.blocks.len(), 1);
        assert!(out.blocks[0].entries.is_empty());
        assert_eq!(out.warnings[0].kind, ParseWarningKind::OrphanContinuation);
    }

    #[test]
    fn blank_values_and_symbols_are_kept_verbatim() {
        let md = "\
| Product | Configurations | Price |
| Latitude™ 5440 | Base | $1,099.00 |
| NaN | Notes |  |
| NaN | OS | Windows® 11  Pro |
";
        let out = parse(md);
        let block = &out.blocks[0];
        assert_eq!(block.name, "Latitude™ 5440");
        assert_eq!(block.base_price, "$1,099.00");
        assert_eq!(block.entries[0], RawEntry::new("Notes", ""));
        assert_eq!(block.entries[1], RawEntry::new("OS", "Windows® 11  Pro"));
    }

    #[test]
    fn value_only_rows_get_a_hinted_label() {
        let md = "\
| Product | Configurations | Price |
| A | Base Configuration | $1 |
| NaN | 16 GB: 2 x 8 GB, DDR4 | NaN |
| NaN | 512 GB SSD |
| NaN | Carrying case | NaN |
";
        let out = parse(md);
        let labels: Vec<_> = out.blocks[0].entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["Memory", "Storage", "Other"]);
        assert_eq!(out.blocks[0].entries[1].value, "512 GB SSD");
    }

    #[test]
    fn non_base_configuration_becomes_an_entry() {
        let md = "\
| Product | Configurations | Price |
| Kiosk | Touch bundle | $499 |
";
        let out = parse(md);
        assert_eq!(
            out.blocks[0].entries,
            vec![RawEntry::new(CONFIGURATION_LABEL, "Touch bundle")]
        );
    }

    #[test]
    fn sentinel_is_configurable_and_case_insensitive() {
        let md = "\
| Product | Configurations | Price |
| A | Base | $1 |
| -- | CPU | x |
| nan | RAM | y |
";
        let dashes = ParseOptions {
            sentinel: "--".into(),
        };
        let out = parse_table(md, &dashes);
        // "nan" is a product row under the custom sentinel.
        assert_eq!(out.blocks.len(), 2);
        assert_eq!(out.blocks[0].entries.len(), 1);

        let out = parse(md);
        // Default sentinel matches "nan"; "--" starts a product whose
        // configuration cell is not a base marker.
        assert_eq!(out.blocks.len(), 2);
        assert_eq!(out.blocks[1].name, "--");
        assert_eq!(
            out.blocks[1].entries,
            vec![
                RawEntry::new(CONFIGURATION_LABEL, "CPU"),
                RawEntry::new("RAM", "y")
            ]
        );
    }

    #[test]
    fn sentinel_price_is_empty() {
        let md = "\
| Product | Configurations | Price |
| A | Base | NaN |
";
        assert_eq!(parse(md).blocks[0].base_price, "");
    }

    #[test]
    fn second_table_header_is_skipped() {
        let md = "\
| Product | Configurations | Price |
|---|---|---|
| A | Base | $1 |

| Product | Configurations | Price |
|---|---|---|
| B | Base | $2 |
";
        let names: Vec<_> = parse(md).blocks.into_iter().map(|b| b.name).collect();
        assert_eq!(names, ["A", "B"]);
    }

    #[test]
    fn infer_label_falls_back_to_other() {
        assert_eq!(infer_label("Intel Core i5-1345U"), "Processor");
        assert_eq!(infer_label("3 Years ProSupport"), "Warranty");
        assert_eq!(infer_label("Stylus"), "Other");
    }
}
