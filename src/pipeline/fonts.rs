//! Built-in font metrics and word wrapping.
//!
//! The renderer only uses the standard-14 Type1 fonts, so no font files are
//! embedded. Glyph advance widths for printable ASCII come from the Adobe
//! AFM files (units of 1/1000 em). Text reaching the renderer has been
//! sanitized to printable ASCII; anything else is measured as a wide glyph.

use crate::config::FontFamily;

/// Regular or bold face of a [`FontFamily`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

const MM_PER_PT: f32 = 25.4 / 72.0;

/// Width used for characters outside the tables.
const FALLBACK_WIDTH: u16 = 600;

/// Helvetica, codes 32..=126.
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 222, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    222, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,      // 'p'..'~'
];

/// Helvetica-Bold, codes 32..=126.
#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 278, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    278, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Courier is monospaced in both weights.
const COURIER_WIDTH: u16 = 600;

/// PostScript name of the standard-14 font for a family and weight.
pub fn base_font_name(family: FontFamily, weight: Weight) -> &'static str {
    match (family, weight) {
        (FontFamily::Helvetica, Weight::Regular) => "Helvetica",
        (FontFamily::Helvetica, Weight::Bold) => "Helvetica-Bold",
        (FontFamily::Courier, Weight::Regular) => "Courier",
        (FontFamily::Courier, Weight::Bold) => "Courier-Bold",
    }
}

/// Advance width of one character in 1/1000 em.
pub fn char_width(family: FontFamily, weight: Weight, ch: char) -> u16 {
    if family == FontFamily::Courier {
        return COURIER_WIDTH;
    }
    let table = match weight {
        Weight::Regular => &HELVETICA,
        Weight::Bold => &HELVETICA_BOLD,
    };
    match ch as u32 {
        code @ 32..=126 => table[(code - 32) as usize],
        _ => FALLBACK_WIDTH,
    }
}

/// Rendered width of `text` in millimetres at `size_pt`.
pub fn text_width_mm(text: &str, family: FontFamily, weight: Weight, size_pt: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| u32::from(char_width(family, weight, c)))
        .sum();
    units as f32 / 1000.0 * size_pt * MM_PER_PT
}

/// Greedy word wrap to `max_width_mm`.
///
/// Whitespace runs collapse to single spaces. A word wider than the column
/// on its own is broken between characters. Always returns at least one
/// line, which is empty for blank input.
pub fn wrap_text(
    text: &str,
    max_width_mm: f32,
    family: FontFamily,
    weight: Weight,
    size_pt: f32,
) -> Vec<String> {
    let width = |s: &str| text_width_mm(s, family, weight, size_pt);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if width(&candidate) <= max_width_mm {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if width(word) <= max_width_mm {
            current = word.to_string();
            continue;
        }

        // Hard-break an overlong word.
        for ch in word.chars() {
            current.push(ch);
            if width(&current) > max_width_mm && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(ch);
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: FontFamily = FontFamily::Helvetica;

    #[test]
    fn known_widths() {
        assert_eq!(char_width(H, Weight::Regular, ' '), 278);
        assert_eq!(char_width(H, Weight::Regular, 'W'), 944);
        assert_eq!(char_width(H, Weight::Bold, 'b'), 611);
        assert_eq!(char_width(H, Weight::Regular, '~'), 584);
        assert_eq!(char_width(FontFamily::Courier, Weight::Bold, 'i'), 600);
    }

    #[test]
    fn width_scales_with_size() {
        // "0" is 556 units: 5.56pt at 10pt, about 1.96mm.
        let w = text_width_mm("0", H, Weight::Regular, 10.0);
        assert!((w - 5.56 * MM_PER_PT).abs() < 1e-4);
        let w2 = text_width_mm("0", H, Weight::Regular, 20.0);
        assert!((w2 - 2.0 * w).abs() < 1e-4);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let text = "Intel Core i7-1355U processor with ten cores";
        let max = text_width_mm("Intel Core i7-1355U", H, Weight::Regular, 10.0) + 0.1;
        let lines = wrap_text(text, max, H, Weight::Regular, 10.0);
        assert_eq!(lines[0], "Intel Core i7-1355U");
        assert!(lines.len() >= 2);
        for line in &lines {
            assert!(text_width_mm(line, H, Weight::Regular, 10.0) <= max);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn overlong_word_breaks_by_character() {
        let word = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let max = text_width_mm("ABCDEFGH", H, Weight::Regular, 10.0);
        let lines = wrap_text(word, max, H, Weight::Regular, 10.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
        for line in &lines {
            assert!(text_width_mm(line, H, Weight::Regular, 10.0) <= max + 1e-4);
        }
    }

    #[test]
    fn blank_text_is_one_empty_line() {
        assert_eq!(wrap_text("   ", 50.0, H, Weight::Regular, 10.0), vec![String::new()]);
    }

    #[test]
    fn font_names() {
        assert_eq!(base_font_name(H, Weight::Bold), "Helvetica-Bold");
        assert_eq!(base_font_name(FontFamily::Courier, Weight::Regular), "Courier");
    }
}
