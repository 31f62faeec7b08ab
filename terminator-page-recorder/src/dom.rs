//! Minimal document model the recorder reads from.
//!
//! The page's real DOM is owned by the host; this arena mirrors the parts the
//! recorder needs: tree shape, attributes, text, form values and markup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PageRecorderError, Result};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Handle to an element inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum Child {
    Element(ElementId),
    Text(String),
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Child>,
    parent: Option<ElementId>,
    value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Document {
    elements: Vec<ElementData>,
    root: ElementId,
    head: ElementId,
    body: ElementId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an `html > head, body` skeleton.
    pub fn new() -> Self {
        let mut doc = Self {
            elements: Vec::new(),
            root: ElementId(0),
            head: ElementId(0),
            body: ElementId(0),
        };
        let root = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.link(root, head);
        doc.link(root, body);
        doc.root = root;
        doc.head = head;
        doc.body = body;
        doc
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn head(&self) -> ElementId {
        self.head
    }

    pub fn body(&self) -> ElementId {
        self.body
    }

    /// Creates a detached element. Tag names are stored lowercase.
    pub fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
            value: None,
        });
        id
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<()> {
        self.get(parent)?;
        self.get(child)?;
        if self.is_descendant_of(parent, child) {
            return Err(PageRecorderError::InvalidHierarchy(format!(
                "{child} cannot be appended to its own descendant {parent}"
            )));
        }
        if let Some(old_parent) = self.elements[child.0].parent {
            self.elements[old_parent.0]
                .children
                .retain(|c| !matches!(c, Child::Element(e) if *e == child));
        }
        self.link(parent, child);
        Ok(())
    }

    /// Creates `tag` with the given attributes and appends it to `parent`.
    pub fn append_element(
        &mut self,
        parent: ElementId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> Result<ElementId> {
        let el = self.create_element(tag);
        for (name, value) in attributes {
            self.set_attribute(el, name, value)?;
        }
        self.append_child(parent, el)?;
        Ok(el)
    }

    pub fn append_text(&mut self, parent: ElementId, text: &str) -> Result<()> {
        self.get_mut(parent)?
            .children
            .push(Child::Text(text.to_string()));
        Ok(())
    }

    pub fn set_attribute(&mut self, el: ElementId, name: &str, value: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let data = self.get_mut(el)?;
        match data.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => data.attributes.push((name, value.to_string())),
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, el: ElementId, name: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        self.get_mut(el)?.attributes.retain(|(n, _)| *n != name);
        Ok(())
    }

    /// Sets the live value of a form control.
    pub fn set_value(&mut self, el: ElementId, value: &str) -> Result<()> {
        self.get_mut(el)?.value = Some(value.to_string());
        Ok(())
    }

    pub fn contains(&self, el: ElementId) -> bool {
        el.0 < self.elements.len()
    }

    pub fn attribute(&self, el: ElementId, name: &str) -> Option<&str> {
        let data = self.elements.get(el.0)?;
        data.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, el: ElementId, name: &str) -> bool {
        self.attribute(el, name).is_some()
    }

    /// Lowercase tag name, empty for unknown handles.
    pub fn tag_name(&self, el: ElementId) -> &str {
        self.elements
            .get(el.0)
            .map(|d| d.tag.as_str())
            .unwrap_or_default()
    }

    /// Non-empty `id` attribute.
    pub fn element_id(&self, el: ElementId) -> Option<&str> {
        self.attribute(el, "id").filter(|id| !id.is_empty())
    }

    pub fn class_name(&self, el: ElementId) -> &str {
        self.attribute(el, "class").unwrap_or_default()
    }

    pub fn class_list(&self, el: ElementId) -> Vec<&str> {
        self.class_name(el).split_whitespace().collect()
    }

    pub fn parent(&self, el: ElementId) -> Option<ElementId> {
        self.elements.get(el.0).and_then(|d| d.parent)
    }

    pub fn children(&self, el: ElementId) -> Vec<ElementId> {
        self.elements
            .get(el.0)
            .map(|d| {
                d.children
                    .iter()
                    .filter_map(|c| match c {
                        Child::Element(e) => Some(*e),
                        Child::Text(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Strict ancestors of `el`, nearest first.
    pub fn ancestors(&self, el: ElementId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(el),
        }
    }

    /// Number of element siblings before `el` that share its tag.
    pub fn preceding_siblings_of_type(&self, el: ElementId) -> usize {
        let Some(parent) = self.parent(el) else {
            return 0;
        };
        let tag = self.tag_name(el);
        self.children(parent)
            .into_iter()
            .take_while(|sibling| *sibling != el)
            .filter(|sibling| self.tag_name(*sibling) == tag)
            .count()
    }

    /// Nearest inclusive ancestor with the given tag.
    pub fn closest(&self, el: ElementId, tag: &str) -> Option<ElementId> {
        if !self.contains(el) {
            return None;
        }
        std::iter::once(el)
            .chain(self.ancestors(el))
            .find(|candidate| self.tag_name(*candidate).eq_ignore_ascii_case(tag))
    }

    /// Inclusive: an element is a descendant of itself.
    pub fn is_descendant_of(&self, el: ElementId, ancestor: ElementId) -> bool {
        el == ancestor || self.ancestors(el).any(|a| a == ancestor)
    }

    /// Rendered text of the element and its descendants, trimmed.
    pub fn inner_text(&self, el: ElementId) -> String {
        let mut out = String::new();
        self.collect_text(el, &mut out);
        out.trim().to_string()
    }

    /// Live value of a form control, falling back to its `value` attribute.
    pub fn value(&self, el: ElementId) -> Option<&str> {
        let data = self.elements.get(el.0)?;
        data.value
            .as_deref()
            .or_else(|| self.attribute(el, "value"))
    }

    pub fn outer_html(&self, el: ElementId) -> String {
        let mut out = String::new();
        self.write_html(el, &mut out);
        out
    }

    /// Markup of the whole document.
    pub fn document_html(&self) -> String {
        self.outer_html(self.root)
    }

    fn link(&mut self, parent: ElementId, child: ElementId) {
        self.elements[child.0].parent = Some(parent);
        self.elements[parent.0].children.push(Child::Element(child));
    }

    fn get(&self, el: ElementId) -> Result<&ElementData> {
        self.elements
            .get(el.0)
            .ok_or_else(|| PageRecorderError::ElementNotFound(el.to_string()))
    }

    fn get_mut(&mut self, el: ElementId) -> Result<&mut ElementData> {
        self.elements
            .get_mut(el.0)
            .ok_or_else(|| PageRecorderError::ElementNotFound(el.to_string()))
    }

    fn collect_text(&self, el: ElementId, out: &mut String) {
        let Some(data) = self.elements.get(el.0) else {
            return;
        };
        for child in &data.children {
            match child {
                Child::Text(text) => out.push_str(text),
                Child::Element(e) => self.collect_text(*e, out),
            }
        }
    }

    fn write_html(&self, el: ElementId, out: &mut String) {
        let Some(data) = self.elements.get(el.0) else {
            return;
        };
        out.push('<');
        out.push_str(&data.tag);
        for (name, value) in &data.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value, true));
            out.push('"');
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&data.tag.as_str()) {
            return;
        }
        for child in &data.children {
            match child {
                Child::Text(text) => out.push_str(&escape(text, false)),
                Child::Element(e) => self.write_html(*e, out),
            }
        }
        out.push_str("</");
        out.push_str(&data.tag);
        out.push('>');
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<ElementId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ElementId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

fn escape(raw: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_markup() {
        let doc = Document::new();
        assert_eq!(
            doc.document_html(),
            "<html><head></head><body></body></html>"
        );
        assert_eq!(doc.parent(doc.body()), Some(doc.root()));
    }

    #[test]
    fn test_outer_html_escapes_and_void_elements() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc
            .append_element(body, "P", &[("title", "say \"hi\"")])
            .unwrap();
        doc.append_text(p, "a < b & c").unwrap();
        doc.append_element(p, "br", &[]).unwrap();

        assert_eq!(
            doc.outer_html(p),
            "<p title=\"say &quot;hi&quot;\">a &lt; b &amp; c<br></p>"
        );
    }

    #[test]
    fn test_append_child_rejects_cycles() {
        let mut doc = Document::new();
        let outer = doc.append_element(doc.body(), "div", &[]).unwrap();
        let inner = doc.append_element(outer, "div", &[]).unwrap();

        let err = doc.append_child(inner, outer).unwrap_err();
        assert!(matches!(err, PageRecorderError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_append_child_moves_element() {
        let mut doc = Document::new();
        let a = doc.append_element(doc.body(), "div", &[]).unwrap();
        let b = doc.append_element(doc.body(), "div", &[]).unwrap();
        let span = doc.append_element(a, "span", &[]).unwrap();

        doc.append_child(b, span).unwrap();
        assert!(doc.children(a).is_empty());
        assert_eq!(doc.children(b), vec![span]);
        assert_eq!(doc.parent(span), Some(b));
    }

    #[test]
    fn test_closest_is_inclusive() {
        let mut doc = Document::new();
        let a = doc
            .append_element(doc.body(), "a", &[("href", "/x")])
            .unwrap();
        let span = doc.append_element(a, "span", &[]).unwrap();

        assert_eq!(doc.closest(span, "a"), Some(a));
        assert_eq!(doc.closest(a, "A"), Some(a));
        assert_eq!(doc.closest(doc.body(), "a"), None);
    }

    #[test]
    fn test_value_prefers_live_value() {
        let mut doc = Document::new();
        let input = doc
            .append_element(doc.body(), "input", &[("value", "initial")])
            .unwrap();
        assert_eq!(doc.value(input), Some("initial"));
        doc.set_value(input, "typed").unwrap();
        assert_eq!(doc.value(input), Some("typed"));
    }
}
