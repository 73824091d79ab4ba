//! Tree helpers shared by the extractors.

use scraper::{ElementRef, Html};

/// Text nodes trimmed, empties dropped, joined with a single space.
pub fn text_joined(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text nodes trimmed and concatenated without a separator.
pub fn text_concat(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect::<String>()
}

pub fn is_named(element: ElementRef<'_>, name: &str) -> bool {
    element.value().name().eq_ignore_ascii_case(name)
}

/// Descendant elements with the given tag name, in document order.
pub fn descendants_named<'a>(
    element: ElementRef<'a>,
    name: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(move |candidate| is_named(*candidate, name))
}

/// Direct child elements with the given tag name.
pub fn children_named<'a>(element: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| is_named(*child, name))
        .collect()
}

/// Rows owned by a table, looking through `thead`/`tbody`/`tfoot` but not
/// into nested tables.
pub fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        if is_named(child, "tr") {
            rows.push(child);
        } else if is_named(child, "thead") || is_named(child, "tbody") || is_named(child, "tfoot")
        {
            rows.extend(children_named(child, "tr"));
        }
    }
    rows
}

/// First element with tag `name` that follows `anchor` in document order.
pub fn next_element_named<'a>(
    document: &'a Html,
    anchor: ElementRef<'a>,
    name: &str,
) -> Option<ElementRef<'a>> {
    let anchor_id = anchor.id();
    document
        .tree
        .root()
        .descendants()
        .skip_while(|node| node.id() != anchor_id)
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|candidate| is_named(*candidate, name))
}

/// Resolve an `href`/`src` value against a site base URL.
///
/// Protocol-relative values gain `https:`; site-relative values are joined to
/// `base_url`; anything else is returned unchanged.
pub fn absolute_url(base_url: &str, raw: &str) -> String {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if raw.starts_with('/') {
        return format!("{}{}", base_url.trim_end_matches('/'), raw);
    }
    raw.to_string()
}
