//! Text sanitization: make cell text safe for the standard PDF fonts.
//!
//! The renderer draws with the standard-14 Type1 fonts, which cover plain
//! ASCII reliably. Spreadsheet exports are full of `™`, `®`, curly quotes
//! and non-breaking spaces; left alone they come out as garbage glyphs.
//!
//! ## Rule Order
//!
//! 1. Replace known symbols with ASCII spellings (`™` → `(TM)`)
//! 2. Decompose accented letters and drop the combining marks (`é` → `e`)
//! 3. Replace anything still outside printable ASCII with a space
//! 4. Collapse whitespace runs and trim
//!
//! Symbols must be replaced before decomposition, or NFKD would turn `™`
//! into a bare `TM`.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Apply every sanitization rule, in order.
pub fn sanitize_text(input: &str) -> String {
    let s = replace_symbols(input);
    let s = strip_accents(&s);
    let s = replace_non_ascii(&s);
    collapse_whitespace(&s)
}

// ── Rule 1: Known symbols ────────────────────────────────────────────────────

const SYMBOLS: &[(char, &str)] = &[
    ('\u{2122}', "(TM)"),
    ('\u{00AE}', "(R)"),
    ('\u{00A9}', "(C)"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{2022}', "-"),
];

fn replace_symbols(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match SYMBOLS.iter().find(|(c, _)| *c == ch) {
            Some((_, replacement)) => out.push_str(replacement),
            None => out.push(ch),
        }
    }
    out
}

// ── Rule 2: Strip accents ────────────────────────────────────────────────────

fn strip_accents(input: &str) -> String {
    if input.is_ascii() {
        return input.to_string();
    }
    input.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

// ── Rule 3: Non-ASCII to space ───────────────────────────────────────────────

fn replace_non_ascii(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { ' ' })
        .collect()
}

// ── Rule 4: Whitespace ───────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

/// Reduce a product name to something safe as a file stem: alphanumerics,
/// space, `-` and `_` survive; everything else is dropped.
pub fn safe_file_stem(name: &str) -> String {
    let kept: String = sanitize_text(name)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let kept = kept.trim();
    if kept.is_empty() {
        "product".to_string()
    } else {
        kept.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trademarks_become_ascii() {
        assert_eq!(
            sanitize_text("Intel® Core™ i7 © 2024"),
            "Intel(R) Core(TM) i7 (C) 2024"
        );
    }

    #[test]
    fn quotes_and_dashes() {
        assert_eq!(
            sanitize_text("\u{201C}14\u{201D} FHD \u{2013} matte\u{2026}"),
            "\"14\" FHD - matte..."
        );
        assert_eq!(sanitize_text("a\u{2014}b"), "a--b");
    }

    #[test]
    fn accents_are_stripped() {
        assert_eq!(sanitize_text("Café écran"), "Cafe ecran");
    }

    #[test]
    fn other_non_ascii_becomes_space_and_collapses() {
        assert_eq!(sanitize_text("16GB\u{00A0}\u{00A0}DDR5 ✓ fast"), "16GB DDR5 fast");
        assert_eq!(sanitize_text("  line\nbreak\t tab  "), "line break tab");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_text("Latitude™  5440 – “Pro”");
        assert_eq!(sanitize_text(&once), once);
    }

    #[test]
    fn file_stem_strips_unsafe_characters() {
        assert_eq!(safe_file_stem("Dell Latitude 5440 / i7"), "Dell Latitude 5440  i7");
        assert_eq!(safe_file_stem("OptiPlex™ 7010"), "OptiPlexTM 7010");
        assert_eq!(safe_file_stem("///"), "product");
    }
}
