//! Test fixtures: small PDFs generated in-process with `lopdf`.

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Build a PDF with one page per `(width, height)` entry, in points.
///
/// Each page draws `Page N` in Helvetica so extracts can be matched back to
/// their source page by content. Fonts and resources are shared through the
/// page tree root and inherited by every page.
pub(crate) fn sample_pdf(pages: &[(f32, f32)]) -> Vec<u8> {
    build(pages, true)
}

/// Like [`sample_pdf`] but every page carries its own `Resources` and no
/// attributes are inherited.
pub(crate) fn sample_pdf_flat(pages: &[(f32, f32)]) -> Vec<u8> {
    build(pages, false)
}

/// Content stream bytes drawn on page `number` (one-based).
pub(crate) fn page_content(number: usize) -> Vec<u8> {
    format!("BT /F1 24 Tf 20 20 Td (Page {number}) Tj ET").into_bytes()
}

fn build(pages: &[(f32, f32)], inherit_resources: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for (i, &(w, h)) in pages.iter().enumerate() {
        let content_id = doc.add_object(Stream::new(dictionary! {}, page_content(i + 1)));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(w), Object::Real(h)],
            "Contents" => content_id,
        };
        if !inherit_resources {
            page.set("Resources", resources_id);
        }
        let page_id: ObjectId = doc.add_object(page);
        kids.push(page_id.into());
    }

    let mut tree = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
    };
    if inherit_resources {
        tree.set("Resources", resources_id);
    }
    doc.objects.insert(pages_id, Object::Dictionary(tree));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("in-memory save");
    out
}
