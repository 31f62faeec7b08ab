//! CSS-like selector paths and snapshot identifiers.
//!
//! Paths are deterministic for a given DOM shape but are not guaranteed to
//! be unique, nor stable across DOM mutations or class changes.

use crate::dom::{Document, ElementId};

/// Builds a selector for `el`.
///
/// Returns `#id` when the element has an id. Otherwise emits one
/// `tag[.class...][:nth-of-type(n)]` step per level from the element up to,
/// but not including, `<body>`, joined with `" > "`. The `nth-of-type`
/// suffix is only added when earlier siblings share the tag.
pub fn build_selector(doc: &Document, el: ElementId) -> String {
    if let Some(id) = doc.element_id(el) {
        return format!("#{id}");
    }

    let body = doc.body();
    let mut steps = Vec::new();
    let mut current = Some(el);
    while let Some(node) = current {
        if node == body || !doc.contains(node) {
            break;
        }
        steps.push(selector_step(doc, node));
        current = doc.parent(node);
    }

    if steps.is_empty() {
        return doc.tag_name(el).to_string();
    }
    steps.reverse();
    steps.join(" > ")
}

fn selector_step(doc: &Document, el: ElementId) -> String {
    let mut step = doc.tag_name(el).to_string();
    for class in doc.class_list(el) {
        step.push('.');
        step.push_str(class);
    }
    let preceding = doc.preceding_siblings_of_type(el);
    if preceding > 0 {
        step.push_str(&format!(":nth-of-type({})", preceding + 1));
    }
    step
}

/// 32-bit signed rolling hash (`h = h * 31 + unit`) over UTF-16 code units.
pub fn hash_url(url: &str) -> i32 {
    url.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// `html_<hash(url)>_<now_iso>`. Not collision-free across URLs; the
/// timestamp disambiguates in practice.
pub fn build_snapshot_id(url: &str, now_iso: &str) -> String {
    format!("html_{}_{}", hash_url(url), now_iso)
}
