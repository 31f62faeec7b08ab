use crate::dom::{Document, ElementId};

/// The `href` of the anchor enclosing `target`, when following it would
/// navigate. Empty and `javascript:` hrefs do not navigate.
pub fn anchor_href(doc: &Document, target: ElementId) -> Option<String> {
    let anchor = doc.closest(target, "a")?;
    let href = doc.attribute(anchor, "href")?.trim();
    if href.is_empty() || is_javascript_url(href) {
        return None;
    }
    Some(href.to_string())
}

fn is_javascript_url(href: &str) -> bool {
    href.get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
}

/// Resolves `href` against the page URL `base`.
///
/// Handles absolute, scheme-relative, root-relative, query-only,
/// fragment-only and path-relative forms. Dot segments are kept as written.
pub fn resolve_href(base: &str, href: &str) -> String {
    if has_scheme(href) {
        return href.to_string();
    }
    if !has_scheme(base) {
        return href.to_string();
    }
    let Some((scheme, rest)) = base.split_once("://") else {
        return href.to_string();
    };

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let origin = format!("{scheme}://{}", &rest[..authority_end]);
    let without_fragment = base.split('#').next().unwrap_or(base);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);

    if let Some(scheme_relative) = href.strip_prefix("//") {
        return format!("{scheme}://{scheme_relative}");
    }
    if href.starts_with('/') {
        return format!("{origin}{href}");
    }
    if href.is_empty() {
        return without_fragment.to_string();
    }
    if href.starts_with('#') {
        return format!("{without_fragment}{href}");
    }
    if href.starts_with('?') {
        return format!("{without_query}{href}");
    }

    let path = without_query.strip_prefix(origin.as_str()).unwrap_or("/");
    let directory = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    };
    format!("{origin}{directory}{href}")
}

fn has_scheme(href: &str) -> bool {
    let Some(colon) = href.find(':') else {
        return false;
    };
    let scheme = &href[..colon];
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
