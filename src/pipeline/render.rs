//! PDF emission: laid-out pages → PDF bytes via `pdf-writer`.
//!
//! [`render_product`] lays a product out completely before touching the
//! document, so a product that fails layout leaves no partial pages behind.
//! [`SpecDocument::finish`] writes the accumulated pages as one PDF.
//!
//! Only the standard-14 Type1 fonts are referenced; nothing is embedded.
//! Content streams are left uncompressed.

use crate::config::{FontFamily, LayoutOptions};
use crate::error::RenderError;
use crate::model::ProductRecord;
use crate::pipeline::fonts::{base_font_name, Weight};
use crate::pipeline::layout::{layout_product, DrawOp, PageLayout};
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str, TextStr};
use tracing::debug;

const PT_PER_MM: f32 = 72.0 / 25.4;

const REGULAR_FONT: Name<'static> = Name(b"F1");
const BOLD_FONT: Name<'static> = Name(b"F2");

const PRODUCER: &str = concat!("edgequake-specsheet ", env!("CARGO_PKG_VERSION"));

/// Pages accumulated for one output PDF.
#[derive(Debug, Clone, Default)]
pub struct SpecDocument {
    title: Option<String>,
    pages: Vec<PageLayout>,
}

impl SpecDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            pages: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[PageLayout] {
        &self.pages
    }

    /// Serialise every page into a PDF file image.
    pub fn finish(&self) -> Vec<u8> {
        let mut pdf = Pdf::new();
        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let tree_id = alloc.bump();
        let info_id = alloc.bump();

        // One font object per face, shared by every page that uses it.
        let faces = [
            (FontFamily::Helvetica, Weight::Regular),
            (FontFamily::Helvetica, Weight::Bold),
            (FontFamily::Courier, Weight::Regular),
            (FontFamily::Courier, Weight::Bold),
        ];
        let font_ids: Vec<Ref> = faces.iter().map(|_| alloc.bump()).collect();
        let font_id = |family: FontFamily, weight: Weight| -> Ref {
            let idx = faces
                .iter()
                .position(|f| *f == (family, weight))
                .unwrap_or(0);
            font_ids[idx]
        };

        let page_ids: Vec<(Ref, Ref)> = self
            .pages
            .iter()
            .map(|_| (alloc.bump(), alloc.bump()))
            .collect();

        pdf.catalog(catalog_id).pages(tree_id);
        pdf.pages(tree_id)
            .kids(page_ids.iter().map(|(page, _)| *page))
            .count(page_ids.len() as i32);

        for ((family, weight), id) in faces.iter().zip(&font_ids) {
            pdf.type1_font(*id)
                .base_font(Name(base_font_name(*family, *weight).as_bytes()));
        }

        for (layout, (page_id, content_id)) in self.pages.iter().zip(&page_ids) {
            let mut page = pdf.page(*page_id);
            page.media_box(Rect::new(
                0.0,
                0.0,
                layout.width_mm * PT_PER_MM,
                layout.height_mm * PT_PER_MM,
            ));
            page.parent(tree_id);
            page.contents(*content_id);
            page.resources()
                .fonts()
                .pair(REGULAR_FONT, font_id(layout.font, Weight::Regular))
                .pair(BOLD_FONT, font_id(layout.font, Weight::Bold));
            page.finish();

            pdf.stream(*content_id, &page_content(layout));
        }

        let mut info = pdf.document_info(info_id);
        if let Some(title) = &self.title {
            info.title(TextStr(title.as_str()));
        }
        info.producer(TextStr(PRODUCER));
        info.finish();

        pdf.finish()
    }
}

/// Lay out `record` and append its pages to `document`.
///
/// Returns the number of pages added. On error the document is unchanged.
pub fn render_product(
    record: &ProductRecord,
    options: &LayoutOptions,
    document: &mut SpecDocument,
) -> Result<usize, RenderError> {
    let staged = layout_product(record, options)?;
    let added = staged.len();
    debug!("'{}': laid out {} page(s)", record.name, added);
    document.pages.extend(staged);
    Ok(added)
}

/// Encode one page's draw operations as a content stream.
fn page_content(layout: &PageLayout) -> Vec<u8> {
    let height = layout.height_mm;
    let mut content = Content::new();

    for op in &layout.ops {
        match op {
            DrawOp::FillRect {
                x,
                y,
                width,
                height: h,
                color,
            } => {
                let (r, g, b) = color.unit();
                content.save_state();
                content.set_fill_rgb(r, g, b);
                content.rect(
                    x * PT_PER_MM,
                    (height - y - h) * PT_PER_MM,
                    width * PT_PER_MM,
                    h * PT_PER_MM,
                );
                content.fill_nonzero();
                content.restore_state();
            }
            DrawOp::Rule {
                x1,
                x2,
                y,
                width,
                color,
            } => {
                let (r, g, b) = color.unit();
                let y = (height - y) * PT_PER_MM;
                content.save_state();
                content.set_stroke_rgb(r, g, b);
                content.set_line_width(width * PT_PER_MM);
                content.move_to(x1 * PT_PER_MM, y);
                content.line_to(x2 * PT_PER_MM, y);
                content.stroke();
                content.restore_state();
            }
            DrawOp::Text {
                x,
                y,
                text,
                weight,
                size,
                color,
            } => {
                let font = match weight {
                    Weight::Regular => REGULAR_FONT,
                    Weight::Bold => BOLD_FONT,
                };
                let (r, g, b) = color.unit();
                content.save_state();
                content.set_fill_rgb(r, g, b);
                content.begin_text();
                content.set_font(font, *size);
                content.next_line(x * PT_PER_MM, (height - y) * PT_PER_MM);
                content.show(Str(text.as_bytes()));
                content.end_text();
                content.restore_state();
            }
        }
    }

    content.finish()
}

#[cfg(test)]
mod tests {
    use super::{render_product, FontFamily, LayoutOptions, ProductRecord, SpecDocument};
    use crate::model::{CategoryKind, SpecItem, SpecificationCategory};

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    fn dell() -> ProductRecord {
        ProductRecord {
            name: "Dell Latitude".into(),
            base_price: "$999.00".into(),
            categories: vec![SpecificationCategory::new(
                CategoryKind::Vocabulary("Processor".into()),
                vec![SpecItem::new("CPU", "Intel Core i7-1355U")],
            )],
        }
    }

    #[test]
    fn dell_renders_one_page_pdf() {
        let mut doc = SpecDocument::new("Dell Latitude");
        let added = render_product(&dell(), &LayoutOptions::default(), &mut doc).unwrap();
        assert_eq!(added, 1);

        let bytes = doc.finish();
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(contains(&bytes, "(Dell Latitude)"));
        assert!(contains(&bytes, "($999.00)"));
        assert!(contains(&bytes, "/Helvetica-Bold"));
        assert!(contains(&bytes, "/Count 1"));
    }

    #[test]
    fn failed_product_leaves_document_untouched() {
        let mut doc = SpecDocument::new("batch");
        render_product(&dell(), &LayoutOptions::default(), &mut doc).unwrap();
        let before = doc.pages().to_vec();

        let mut tall = dell();
        tall.name = "Tall".into();
        tall.categories[0]
            .items
            .push(SpecItem::new("Notes", "word ".repeat(5000)));
        let err = render_product(&tall, &LayoutOptions::default(), &mut doc);
        assert!(err.is_err());
        assert_eq!(doc.pages(), before.as_slice());
    }

    #[test]
    fn courier_layout_references_courier() {
        let opts = LayoutOptions {
            font: FontFamily::Courier,
            ..LayoutOptions::default()
        };
        let mut doc = SpecDocument::new("x");
        render_product(&dell(), &opts, &mut doc).unwrap();
        let bytes = doc.finish();
        assert!(contains(&bytes, "/Courier-Bold"));
    }

    #[test]
    fn empty_document_still_serialises() {
        let doc = SpecDocument::default();
        let bytes = doc.finish();
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(contains(&bytes, "/Count 0"));
    }
}
