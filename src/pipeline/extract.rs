//! Page extraction: copy one page into a brand-new, standalone PDF.
//!
//! The copy walks the page's object graph and clones everything it reaches
//! (content streams, fonts, images, annotations) into a fresh document with a
//! one-page page tree. Three details keep the result self-contained:
//!
//! * Attributes a page may inherit from its ancestors (`Resources`,
//!   `MediaBox`, `CropBox`, `Rotate`) are looked up and written onto the page.
//! * References to other pages or page-tree nodes (link destinations, parent
//!   pointers) become `null`, so no foreign page is dragged along.
//! * Every source object is copied at most once; shared fonts stay shared and
//!   reference cycles terminate.

use crate::error::OutputError;
use crate::pipeline::source::SourceDocument;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Page attributes a page may inherit from its page-tree ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards the ancestor walk against malformed, cyclic page trees.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when neither the page nor any ancestor has a media box.
const FALLBACK_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// A serialized single-page PDF.
#[derive(Debug, Clone)]
pub struct SinglePageDocument {
    /// Zero-based index of the source page.
    pub page_index: usize,
    pub bytes: Vec<u8>,
}

/// Build a standalone PDF holding only page `page_index` of `source`.
pub fn extract_page(source: &SourceDocument, page_index: usize) -> Result<SinglePageDocument, OutputError> {
    let page_id = source.page_id(page_index)?;
    let src = source.document();
    let failed = |detail: String| OutputError::ExtractionFailed {
        page: page_index,
        detail,
    };

    let page = src
        .get_object(page_id)
        .map_err(|e| failed(format!("cannot read page object {page_id:?}: {e}")))?
        .as_dict()
        .map_err(|e| failed(format!("page object {page_id:?} is not a dictionary: {e}")))?;

    let mut out = Document::with_version(src.version.clone());
    let pages_id = out.new_object_id();
    let new_page_id = out.new_object_id();

    let mut copier = ObjectCopier {
        src,
        out: &mut out,
        ids: HashMap::new(),
    };
    // Registered up front so back-references (annotation /P) resolve to the copy.
    copier.ids.insert(page_id, new_page_id);

    let mut new_page = Dictionary::new();
    for (key, value) in page.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        new_page.set(key.clone(), copier.copy(value));
    }
    for key in INHERITABLE {
        if new_page.has(key) {
            continue;
        }
        if let Some(value) = inherited(src, page, key) {
            debug!(
                "Page {} inherits /{}",
                page_index,
                String::from_utf8_lossy(key)
            );
            new_page.set(key, copier.copy(value));
        }
    }
    if !new_page.has(b"MediaBox") {
        warn!("Page {} has no MediaBox; using US Letter", page_index);
        new_page.set(
            "MediaBox",
            FALLBACK_MEDIA_BOX.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
        );
    }
    new_page.set("Type", "Page");
    new_page.set("Parent", pages_id);

    let copied = copier.ids.len() - 1;
    out.objects.insert(new_page_id, Object::Dictionary(new_page));
    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(new_page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    out.save_to(&mut bytes)
        .map_err(|e| failed(format!("cannot serialise extracted page: {e}")))?;

    debug!(
        "Page {} extracted: {} objects copied, {} bytes",
        page_index,
        copied,
        bytes.len()
    );
    Ok(SinglePageDocument { page_index, bytes })
}

/// Find `key` on the nearest ancestor of `page` that defines it.
fn inherited<'a>(src: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = src.get_dictionary(parent_id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
    }
    None
}

/// Deep copy of objects from one document into another with an id map.
struct ObjectCopier<'a> {
    src: &'a Document,
    out: &'a mut Document,
    ids: HashMap<ObjectId, ObjectId>,
}

impl ObjectCopier<'_> {
    fn copy(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.copy_reference(*id),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dict(dict)),
            Object::Array(items) => Object::Array(items.iter().map(|item| self.copy(item)).collect()),
            Object::Stream(stream) => Object::Stream(self.copy_stream(stream)),
            other => other.clone(),
        }
    }

    fn copy_reference(&mut self, id: ObjectId) -> Object {
        if let Some(&mapped) = self.ids.get(&id) {
            return Object::Reference(mapped);
        }

        let target = match self.src.get_object(id) {
            Ok(object) => object,
            Err(e) => {
                warn!("Unresolvable reference {:?} replaced with null: {}", id, e);
                return Object::Null;
            }
        };
        if is_page_tree_node(target) {
            return Object::Null;
        }

        let new_id = self.out.new_object_id();
        self.ids.insert(id, new_id);
        let copied = self.copy(target);
        self.out.objects.insert(new_id, copied);
        Object::Reference(new_id)
    }

    fn copy_dict(&mut self, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.copy(value));
        }
        copy
    }

    fn copy_stream(&mut self, stream: &Stream) -> Stream {
        let mut dict = Dictionary::new();
        for (key, value) in stream.dict.iter() {
            // Recomputed from the content by `Stream::new`.
            if key.as_slice() == b"Length" {
                continue;
            }
            dict.set(key.clone(), self.copy(value));
        }
        let mut copy = Stream::new(dict, stream.content.clone());
        copy.allows_compression = stream.allows_compression;
        copy
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    matches!(object.type_name(), Ok(b"Page") | Ok(b"Pages"))
}
