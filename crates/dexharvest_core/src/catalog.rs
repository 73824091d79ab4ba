use anyhow::{Result, bail};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use scraper::{ElementRef, Html};
use tracing::{debug, info};

use crate::html::{absolute_url, children_named, descendants_named, table_rows, text_concat};
use crate::model::{BaseEntity, IdRange};
use crate::rules::{CATALOG_RULES, CatalogRules};

/// Characters left unescaped when synthesizing a secondary-site page URL.
pub(crate) const PAGE_NAME_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Where catalog-relative links point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSites {
    pub primary_base_url: String,
    pub secondary_page_base: String,
}

/// Parse every qualifying listing table in `document` into base entities
/// whose id lies in `range`.
///
/// Tables are scanned independently and each scan stops at the first id past
/// `range.end`. Fails only when the document has no qualifying table at all.
pub fn parse_catalog(
    document: &str,
    range: IdRange,
    sites: &CatalogSites,
) -> Result<Vec<BaseEntity>> {
    parse_catalog_with_rules(document, range, sites, &CATALOG_RULES)
}

pub fn parse_catalog_with_rules(
    document: &str,
    range: IdRange,
    sites: &CatalogSites,
    rules: &CatalogRules,
) -> Result<Vec<BaseEntity>> {
    let html = Html::parse_document(document);
    let tables = descendants_named(html.root_element(), "table")
        .filter(|table| is_index_table(*table, rules))
        .collect::<Vec<_>>();
    if tables.is_empty() {
        bail!(
            "master document has no table headed by \"{}\"",
            rules.index_marker
        );
    }

    let mut entities = Vec::new();
    for (table_index, table) in tables.into_iter().enumerate() {
        let before = entities.len();
        scan_table(table, range, sites, rules, &mut entities);
        debug!(
            table = table_index,
            rows = entities.len() - before,
            "scanned catalog table"
        );
    }
    info!(
        entities = entities.len(),
        start = range.start,
        end = range.end,
        "parsed master catalog"
    );
    Ok(entities)
}

fn is_index_table(table: ElementRef<'_>, rules: &CatalogRules) -> bool {
    descendants_named(table, "th")
        .next()
        .map(|header| text_concat(header).contains(rules.index_marker))
        .unwrap_or(false)
}

fn scan_table(
    table: ElementRef<'_>,
    range: IdRange,
    sites: &CatalogSites,
    rules: &CatalogRules,
    output: &mut Vec<BaseEntity>,
) {
    for row in table_rows(table).into_iter().skip(rules.skipped_header_rows) {
        let cells = children_named(row, "td");
        // Short rows are footers and decorations; their digits are not ids.
        if cells.len() < rules.min_cells {
            debug!(cells = cells.len(), "skipping short catalog row");
            continue;
        }
        let Some(id) = cells.first().and_then(|cell| leading_id(*cell)) else {
            continue;
        };
        if id < range.start {
            continue;
        }
        if id > range.end {
            break;
        }
        match entity_from_row(id, row, &cells, sites, rules) {
            Some(entity) => output.push(entity),
            None => debug!(id, "skipping catalog row without image"),
        }
    }
}

/// Digits of the id cell, ignoring any prefix such as `#`.
fn leading_id(cell: ElementRef<'_>) -> Option<u32> {
    let digits = text_concat(cell)
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u32>().ok()
}

fn entity_from_row(
    id: u32,
    row: ElementRef<'_>,
    cells: &[ElementRef<'_>],
    sites: &CatalogSites,
    rules: &CatalogRules,
) -> Option<BaseEntity> {
    let image = descendants_named(row, "img").next()?;
    let image_url = absolute_url(&sites.primary_base_url, image.value().attr("src")?);

    let native_cell = cells[rules.native_name_cell];
    let native_name = text_concat(native_cell);
    let secondary_page_url = first_link(native_cell)
        .and_then(|anchor| anchor.value().attr(rules.cross_reference_attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| secondary_page_url(&sites.secondary_page_base, &native_name));

    let primary_page_url = first_link(cells[rules.page_link_cell])
        .and_then(|anchor| anchor.value().attr("href"))
        .map(|href| absolute_url(&sites.primary_base_url, href))
        .unwrap_or_default();

    Some(BaseEntity {
        id,
        canonical_name: text_concat(cells[rules.canonical_name_cell]),
        native_name,
        romanized_name: text_concat(cells[rules.romanized_name_cell]),
        published_name: text_concat(cells[rules.published_name_cell]),
        image_url,
        primary_page_url,
        secondary_page_url,
    })
}

fn first_link(cell: ElementRef<'_>) -> Option<ElementRef<'_>> {
    descendants_named(cell, "a").find(|anchor| anchor.value().attr("href").is_some())
}

/// Best-effort secondary page URL built from the native name.
pub fn secondary_page_url(page_base: &str, native_name: &str) -> String {
    format!(
        "{}{}",
        page_base,
        utf8_percent_encode(native_name, PAGE_NAME_ESCAPES)
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CatalogSites, parse_catalog, secondary_page_url};
    use crate::model::IdRange;

    pub(crate) fn sites() -> CatalogSites {
        CatalogSites {
            primary_base_url: "https://primary.example".to_string(),
            secondary_page_base: "https://secondary.example/wiki/".to_string(),
        }
    }

    pub(crate) fn catalog_row(id: u32, name: &str, kana: &str) -> String {
        format!(
            r#"<tr>
<td>#{id:04}</td>
<td><a href="/wiki/{name}_(Pok%C3%A9mon)"><img src="//img.example/{id}.png" alt="{name}"></a></td>
<td><a href="/wiki/{name}_(Pok%C3%A9mon)">{name}</a></td>
<td><a href="/wiki/{name}">{kana}</a></td>
<td>{name}ro</td>
<td>{name}</td>
</tr>"#
        )
    }

    pub(crate) fn catalog_table(ids: impl IntoIterator<Item = u32>) -> String {
        let rows = ids
            .into_iter()
            .map(|id| catalog_row(id, &format!("Mon{id}"), "フシギダネ"))
            .collect::<String>();
        format!(
            r#"<table>
<tr><th>Ndex</th><th>MS</th><th>English</th><th>Kana</th><th>Hepburn</th><th>Trademarked</th></tr>
<tr><td colspan="6">Generation I</td></tr>
{rows}
</table>"#
        )
    }

    #[test]
    fn parses_fields_from_fixed_cells() {
        let document = format!(
            "<html><body>{}</body></html>",
            catalog_table([1])
                .replace("Mon1ro", "Fushigidane")
                .replace(">Mon1</td>", ">Bulbasaur TM</td>")
        );
        let entities = parse_catalog(&document, IdRange::new(1, 1), &sites()).expect("parse");
        assert_eq!(entities.len(), 1);
        let entity = &entities[0];
        assert_eq!(entity.id, 1);
        assert_eq!(entity.canonical_name, "Mon1");
        assert_eq!(entity.native_name, "フシギダネ");
        assert_eq!(entity.romanized_name, "Fushigidane");
        assert_eq!(entity.published_name, "Bulbasaur TM");
        assert_eq!(entity.image_url, "https://img.example/1.png");
        assert_eq!(
            entity.primary_page_url,
            "https://primary.example/wiki/Mon1_(Pok%C3%A9mon)"
        );
        assert_eq!(
            entity.secondary_page_url,
            "https://secondary.example/wiki/%E3%83%95%E3%82%B7%E3%82%AE%E3%83%80%E3%83%8D"
        );
    }

    #[test]
    fn explicit_cross_reference_wins_over_synthesized_url() {
        let table = catalog_table([4]).replace(
            r#"<a href="/wiki/Mon4">"#,
            r#"<a href="/wiki/Mon4" data-url="https://secondary.example/wiki/Hitokage">"#,
        );
        let entities =
            parse_catalog(&table, IdRange::new(1, 10), &sites()).expect("parse");
        assert_eq!(
            entities[0].secondary_page_url,
            "https://secondary.example/wiki/Hitokage"
        );
    }

    #[test]
    fn every_entity_lies_within_the_requested_range() {
        let document = catalog_table(1..=30);
        let entities = parse_catalog(&document, IdRange::new(5, 12), &sites()).expect("parse");
        let ids = entities.iter().map(|entity| entity.id).collect::<Vec<_>>();
        assert_eq!(ids, (5..=12).collect::<Vec<_>>());
    }

    #[test]
    fn range_stop_is_per_table() {
        let document = format!("{}{}", catalog_table(1..=20), catalog_table(1..=10));
        let entities = parse_catalog(&document, IdRange::new(1, 10), &sites()).expect("parse");
        let ids = entities.iter().map(|entity| entity.id).collect::<Vec<_>>();
        let expected = (1..=10).chain(1..=10).collect::<Vec<_>>();
        assert_eq!(ids, expected);
    }

    #[test]
    fn early_stop_ignores_rows_after_first_out_of_range_id() {
        let document = catalog_table([1, 2, 15, 3]);
        let entities = parse_catalog(&document, IdRange::new(1, 10), &sites()).expect("parse");
        let ids = entities.iter().map(|entity| entity.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn malformed_rows_are_skipped_without_aborting() {
        let short_row = "<tr><td>#0002</td><td>only</td><td>three</td></tr>";
        let imageless_row = catalog_row(3, "Mon3", "カメ")
            .replace(r#"<img src="//img.example/3.png" alt="Mon3">"#, "");
        let decoration_row = r#"<tr><td colspan="6">Kanto</td></tr>"#;
        let table = catalog_table([1]).replace(
            "</table>",
            &format!(
                "{short_row}{imageless_row}{decoration_row}{}</table>",
                catalog_row(4, "Mon4", "ヒトカゲ")
            ),
        );
        let entities = parse_catalog(&table, IdRange::new(1, 10), &sites()).expect("parse");
        let ids = entities.iter().map(|entity| entity.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn short_rows_with_large_numbers_do_not_stop_the_table() {
        let footer = r#"<tr><td colspan="6">Data as of 2024</td></tr>"#;
        let table = catalog_table([1]).replace(
            "</table>",
            &format!("{footer}{}</table>", catalog_row(2, "Mon2", "フシギソウ")),
        );
        let entities = parse_catalog(&table, IdRange::new(1, 10), &sites()).expect("parse");
        let ids = entities.iter().map(|entity| entity.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn header_rows_are_skipped_even_with_digits() {
        let table = catalog_table([7]).replace(
            r#"<tr><td colspan="6">Generation I</td></tr>"#,
            "<tr><td>#0001 (header)</td><td></td><td></td><td></td><td></td>\
             <td><img src=\"x.png\"></td></tr>",
        );
        let entities = parse_catalog(&table, IdRange::new(1, 10), &sites()).expect("parse");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, 7);
    }

    #[test]
    fn tables_without_index_header_are_ignored() {
        let other = "<table><tr><th>Legend</th></tr><tr><td>1</td></tr></table>";
        let document = format!("{other}{}", catalog_table([1, 2]));
        let entities = parse_catalog(&document, IdRange::new(1, 10), &sites()).expect("parse");
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn missing_index_tables_is_an_error() {
        let error = parse_catalog(
            "<html><body><table><tr><th>Legend</th></tr></table></body></html>",
            IdRange::new(1, 10),
            &sites(),
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("Ndex"));
    }

    #[test]
    fn empty_range_yields_empty_list() {
        let entities =
            parse_catalog(&catalog_table(1..=5), IdRange::new(100, 120), &sites()).expect("parse");
        assert!(entities.is_empty());
    }

    #[test]
    fn synthesized_url_escapes_like_a_path_segment() {
        assert_eq!(
            secondary_page_url("https://secondary.example/wiki/", "Mr. ミーム"),
            "https://secondary.example/wiki/Mr.%20%E3%83%9F%E3%83%BC%E3%83%A0"
        );
    }
}
