//! Page layout for the two-column spec sheet.
//!
//! Layout is pure geometry: a [`ProductRecord`] goes in, a list of
//! [`PageLayout`]s comes out. Nothing touches a PDF writer here, which keeps
//! pagination testable by inspecting the draw operations directly.
//!
//! Coordinates are millimetres measured from the **top-left** corner of the
//! page; [`crate::pipeline::render`] flips them into PDF user space.
//!
//! ## Page Structure
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Product Name                 $999.00 │  header (first page only)
//! │──────────────────────────────────────│
//! │ Processor                            │  section title
//! │ CPU      │ Intel Core i7-1355U       │  row, even colour
//! │ Cores    │ 10                        │  row, odd colour
//! │ ...                                  │
//! │──────────────────────────────────────│
//! │ UPGRADE OPTIONS                      │  always last
//! │ RAM      │ 32GB - $150               │
//! └──────────────────────────────────────┘
//! ```

use crate::config::{FontFamily, LayoutOptions, PageFrame, Rgb};
use crate::error::RenderError;
use crate::model::{ProductRecord, SpecItem};
use crate::pipeline::fonts::{text_width_mm, wrap_text, Weight};

const MM_PER_PT: f32 = 25.4 / 72.0;

/// Line height multiple for titles and section headings.
const HEADING_LEADING: f32 = 1.2;

/// Baseline offset inside a line box, as a share of the line height.
const BASELINE_RATIO: f32 = 0.75;

/// Gap between a wrapped product name and the price.
const NAME_PRICE_GAP_MM: f32 = 5.0;

pub const UPGRADE_SUBTITLE: &str = "UPGRADE OPTIONS";

/// One drawing primitive, in top-left millimetre coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Filled rectangle; `y` is the top edge.
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    /// A single line of text; `y` is the baseline.
    Text {
        x: f32,
        y: f32,
        text: String,
        weight: Weight,
        size: f32,
        color: Rgb,
    },
    /// Horizontal rule.
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        width: f32,
        color: Rgb,
    },
}

/// Everything drawn on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub width_mm: f32,
    pub height_mm: f32,
    pub font: FontFamily,
    pub ops: Vec<DrawOp>,
}

impl PageLayout {
    /// Text of every [`DrawOp::Text`] on the page, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// A row after wrapping, ready to place.
struct PreparedRow {
    label: String,
    label_lines: Vec<String>,
    value_lines: Vec<String>,
    height: f32,
}

/// Where the next element goes.
struct LayoutCursor<'a> {
    opts: &'a LayoutOptions,
    product: &'a str,
    pages: Vec<PageLayout>,
    y: f32,
    /// Row stripe parity, continuous across pages of one product.
    row_index: usize,
    /// Nothing but furniture has been placed on the current page yet.
    fresh: bool,
}

impl<'a> LayoutCursor<'a> {
    fn new(opts: &'a LayoutOptions, product: &'a str) -> Self {
        let mut cursor = Self {
            opts,
            product,
            pages: Vec::new(),
            y: opts.content_top_mm(),
            row_index: 0,
            fresh: true,
        };
        cursor.start_page(false);
        cursor
    }

    fn bottom(&self) -> f32 {
        self.opts.content_bottom_mm()
    }

    fn remaining(&self) -> f32 {
        self.bottom() - self.y
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn start_page(&mut self, continuation: bool) {
        let opts = self.opts;
        self.pages.push(PageLayout {
            width_mm: opts.page_width_mm,
            height_mm: opts.page_height_mm,
            font: opts.font,
            ops: Vec::new(),
        });
        if let Some(frame) = &opts.frame {
            self.draw_frame(frame);
        }
        self.y = opts.content_top_mm();
        if continuation && opts.repeat_header {
            let size = opts.section_font_size;
            let line_h = size * MM_PER_PT * HEADING_LEADING;
            self.push(DrawOp::Text {
                x: opts.margin_left_mm,
                y: self.y + line_h * BASELINE_RATIO,
                text: format!("{} (continued)", self.product),
                weight: Weight::Bold,
                size,
                color: Rgb::BLACK,
            });
            self.y += line_h + opts.section_spacing_mm;
        }
        self.fresh = true;
    }

    fn draw_frame(&mut self, frame: &PageFrame) {
        let opts = self.opts;
        let footer_top = opts.page_height_mm - frame.footer_height_mm;
        self.push(DrawOp::FillRect {
            x: 0.0,
            y: 0.0,
            width: opts.page_width_mm,
            height: frame.header_height_mm,
            color: frame.band_color,
        });
        self.push(DrawOp::FillRect {
            x: 0.0,
            y: footer_top,
            width: opts.page_width_mm,
            height: frame.footer_height_mm,
            color: frame.band_color,
        });
        for y in [frame.header_height_mm, footer_top] {
            self.push(DrawOp::Rule {
                x1: 0.0,
                x2: opts.page_width_mm,
                y,
                width: 0.5,
                color: frame.rule_color,
            });
        }
    }

    /// Height a fresh continuation page offers.
    fn fresh_page_capacity(&self) -> f32 {
        let opts = self.opts;
        let mut capacity = opts.content_bottom_mm() - opts.content_top_mm();
        if opts.repeat_header {
            capacity -= opts.section_font_size * MM_PER_PT * HEADING_LEADING + opts.section_spacing_mm;
        }
        capacity
    }

    /// Break to a new page unless `height` fits or the page is still empty.
    fn reserve(&mut self, height: f32) {
        if height > self.remaining() && !self.fresh {
            self.start_page(true);
        }
    }

    fn header(&mut self, name: &str, price: &str) -> Result<(), RenderError> {
        let opts = self.opts;
        let left = opts.margin_left_mm;
        let width = opts.content_width_mm();

        let price_width = if price.is_empty() {
            0.0
        } else {
            text_width_mm(price, opts.font, Weight::Bold, opts.price_font_size) + NAME_PRICE_GAP_MM
        };
        let title_line = opts.title_font_size * MM_PER_PT * HEADING_LEADING;
        let lines = wrap_text(
            name,
            (width - price_width).max(width * 0.5),
            opts.font,
            Weight::Bold,
            opts.title_font_size,
        );
        let height = lines.len() as f32 * title_line;
        if height > self.remaining() {
            return Err(RenderError::RowTooTall {
                label: name.to_string(),
                needed: height,
                available: self.remaining(),
            });
        }

        let top = self.y;
        for (i, line) in lines.into_iter().enumerate() {
            self.push(DrawOp::Text {
                x: left,
                y: top + (i as f32 + BASELINE_RATIO) * title_line,
                text: line,
                weight: Weight::Bold,
                size: opts.title_font_size,
                color: Rgb::BLACK,
            });
        }
        if !price.is_empty() {
            let w = text_width_mm(price, opts.font, Weight::Bold, opts.price_font_size);
            self.push(DrawOp::Text {
                x: left + width - w,
                y: top + BASELINE_RATIO * title_line,
                text: price.to_string(),
                weight: Weight::Bold,
                size: opts.price_font_size,
                color: Rgb::BLACK,
            });
        }

        self.y += height + opts.cell_padding_mm;
        self.push(DrawOp::Rule {
            x1: left,
            x2: left + width,
            y: self.y,
            width: 0.8,
            color: opts.divider_color,
        });
        self.y += opts.section_spacing_mm;
        self.fresh = false;
        Ok(())
    }

    fn section(&mut self, title: &str, rows: &[PreparedRow], upgrades: bool) {
        let opts = self.opts;
        let title_h = opts.section_font_size * MM_PER_PT * HEADING_LEADING + opts.cell_padding_mm;
        let first_row = rows.first().map(|r| r.height).unwrap_or(0.0);

        // Keep the divider and title with the first row. `layout_product`
        // has checked this block fits a fresh page.
        self.reserve(heading_height(opts, upgrades) + first_row);

        if upgrades {
            self.push(DrawOp::Rule {
                x1: opts.margin_left_mm,
                x2: opts.margin_left_mm + opts.content_width_mm(),
                y: self.y,
                width: 0.8,
                color: opts.divider_color,
            });
            self.y += opts.cell_padding_mm;
        }
        self.push(DrawOp::Text {
            x: opts.margin_left_mm,
            y: self.y + (title_h - opts.cell_padding_mm) * BASELINE_RATIO,
            text: title.to_string(),
            weight: Weight::Bold,
            size: opts.section_font_size,
            color: Rgb::BLACK,
        });
        self.y += title_h;
        self.fresh = false;

        // The first row was reserved together with the title.
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                self.reserve(row.height);
            }
            self.row(row);
        }
        self.y += opts.section_spacing_mm;
    }

    fn row(&mut self, row: &PreparedRow) {
        let opts = self.opts;
        let left = opts.margin_left_mm;
        let pad = opts.cell_padding_mm;
        let color = if self.row_index % 2 == 0 {
            opts.even_row_color
        } else {
            opts.odd_row_color
        };
        self.push(DrawOp::FillRect {
            x: left,
            y: self.y,
            width: opts.content_width_mm(),
            height: row.height,
            color,
        });

        let text_top = self.y + pad;
        let value_x = left + opts.label_width_mm() + pad;
        for (i, line) in row.label_lines.iter().enumerate() {
            self.text_line(left + pad, text_top, i, line, opts.label_text_color);
        }
        for (i, line) in row.value_lines.iter().enumerate() {
            self.text_line(value_x, text_top, i, line, opts.value_text_color);
        }

        self.y += row.height;
        self.row_index += 1;
        self.fresh = false;
    }

    fn text_line(&mut self, x: f32, top: f32, index: usize, line: &str, color: Rgb) {
        if line.is_empty() {
            return;
        }
        let opts = self.opts;
        self.push(DrawOp::Text {
            x,
            y: top + (index as f32 + BASELINE_RATIO) * opts.line_height_mm,
            text: line.to_string(),
            weight: Weight::Regular,
            size: opts.body_font_size,
            color,
        });
    }
}

/// Height of a section's divider (upgrades only) and title.
fn heading_height(opts: &LayoutOptions, upgrades: bool) -> f32 {
    let title_h = opts.section_font_size * MM_PER_PT * HEADING_LEADING + opts.cell_padding_mm;
    if upgrades {
        title_h + opts.cell_padding_mm
    } else {
        title_h
    }
}

/// Wrap one item into label and value lines.
fn prepare_row(item: &SpecItem, opts: &LayoutOptions) -> PreparedRow {
    let pad = opts.cell_padding_mm;
    let value = match &item.price {
        Some(price) if !item.value.trim().is_empty() => format!("{} - {}", item.value, price),
        Some(price) => price.clone(),
        None => item.value.clone(),
    };
    let label_lines = wrap_text(
        &item.label,
        opts.label_width_mm() - 2.0 * pad,
        opts.font,
        Weight::Regular,
        opts.body_font_size,
    );
    let value_lines = wrap_text(
        &value,
        opts.value_width_mm() - 2.0 * pad,
        opts.font,
        Weight::Regular,
        opts.body_font_size,
    );
    let lines = label_lines.len().max(value_lines.len());
    PreparedRow {
        label: item.label.clone(),
        height: lines as f32 * opts.line_height_mm + 2.0 * pad,
        label_lines,
        value_lines,
    }
}

/// Lay out one product. Fails without producing any page when the record
/// has no name, a single row is taller than a page, or a section's first row
/// cannot share a fresh page with the section title.
pub fn layout_product(record: &ProductRecord, opts: &LayoutOptions) -> Result<Vec<PageLayout>, RenderError> {
    opts.validate().map_err(RenderError::BadGeometry)?;
    let name = record.name.trim();
    if name.is_empty() {
        return Err(RenderError::EmptyName);
    }

    let mut cursor = LayoutCursor::new(opts, name);
    let capacity = cursor.fresh_page_capacity();

    let mut sections = Vec::with_capacity(record.categories.len());
    for category in &record.categories {
        let rows: Vec<PreparedRow> = category
            .items
            .iter()
            .filter(|item| {
                !(opts.skip_blank_values && item.value.trim().is_empty() && item.price.is_none())
            })
            .map(|item| prepare_row(item, opts))
            .collect();
        if rows.is_empty() {
            continue;
        }
        if let Some(tall) = rows.iter().find(|r| r.height > capacity) {
            return Err(RenderError::RowTooTall {
                label: tall.label.clone(),
                needed: tall.height,
                available: capacity,
            });
        }
        let heading = heading_height(opts, category.kind.is_upgrades());
        if heading + rows[0].height > capacity {
            return Err(RenderError::RowTooTall {
                label: rows[0].label.clone(),
                needed: heading + rows[0].height,
                available: capacity,
            });
        }
        sections.push((category.kind.clone(), rows));
    }

    cursor.header(name, record.base_price.trim())?;
    for (kind, rows) in &sections {
        if kind.is_upgrades() {
            cursor.section(UPGRADE_SUBTITLE, rows, true);
        } else {
            cursor.section(kind.display_name(), rows, false);
        }
    }

    Ok(cursor.pages)
}
