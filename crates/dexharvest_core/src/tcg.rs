use std::collections::BTreeMap;
use std::sync::LazyLock;

use percent_encoding::utf8_percent_encode;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::catalog::PAGE_NAME_ESCAPES;
use crate::client::SourceClient;
use crate::html::{absolute_url, descendants_named, is_named, text_concat};
use crate::model::{BaseEntity, DegradeReason, Extraction};
use crate::rules::{TCG_RULES, TcgRules};
use crate::transport::Transport;

pub const TCG_TYPE_PAGE_CACHE_KEY: &str = "tcg_types_page.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcgTypeInfo {
    pub name: String,
    pub color: Option<String>,
    pub icon_url: Option<String>,
}

/// A base record, optionally carrying its game types, extended with its card type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcgTypedEntity {
    #[serde(flatten)]
    pub entity: BaseEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub tcg_type: Option<String>,
}

impl From<BaseEntity> for TcgTypedEntity {
    fn from(entity: BaseEntity) -> Self {
        Self {
            entity,
            types: None,
            tcg_type: None,
        }
    }
}

impl AsRef<BaseEntity> for TcgTypedEntity {
    fn as_ref(&self) -> &BaseEntity {
        &self.entity
    }
}

/// Name, colour and icon of every row in the card-type overview table.
pub fn extract_tcg_type_catalog(
    document: &str,
    base_url: &str,
) -> BTreeMap<String, TcgTypeInfo> {
    extract_tcg_type_catalog_with_rules(document, base_url, &TCG_RULES)
}

pub fn extract_tcg_type_catalog_with_rules(
    document: &str,
    base_url: &str,
    rules: &TcgRules,
) -> BTreeMap<String, TcgTypeInfo> {
    let html = Html::parse_document(document);
    let mut catalog = BTreeMap::new();
    let table = descendants_named(html.root_element(), "table").find(|table| {
        descendants_named(*table, "th")
            .any(|header| text_concat(header).contains(rules.table_marker))
    });
    let Some(table) = table else {
        return catalog;
    };

    for row in descendants_named(table, "tr") {
        let cells = row_cells(row);
        if cells.len() < rules.min_row_cells {
            continue;
        }
        let type_cell = cells[0];
        let name = text_concat(type_cell);
        if name.is_empty() || rules.header_labels.contains(&name.as_str()) {
            continue;
        }
        let color = type_cell.value().attr("style").and_then(background_hex);
        let icon_url = descendants_named(type_cell, "img")
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| absolute_url(base_url, src));
        catalog.insert(
            name.clone(),
            TcgTypeInfo {
                name,
                color,
                icon_url,
            },
        );
    }
    catalog
}

fn background_hex(style: &str) -> Option<String> {
    static BACKGROUND_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"background:\s*(#[0-9A-Fa-f]{6})").expect("valid regex")
    });
    BACKGROUND_RE
        .captures(style)
        .and_then(|captures| captures.get(1))
        .map(|color| color.as_str().to_string())
}

/// `td` and `th` cells anywhere under a row, in document order.
fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|cell| is_named(*cell, "td") || is_named(*cell, "th"))
        .collect()
}

/// Card type of an entity: the `alt` text of the first type icon in any table cell.
pub fn extract_entity_tcg_type(document: &str) -> Extraction<String> {
    extract_entity_tcg_type_with_rules(document, &TCG_RULES)
}

pub fn extract_entity_tcg_type_with_rules(
    document: &str,
    rules: &TcgRules,
) -> Extraction<String> {
    let html = Html::parse_document(document);
    for table in descendants_named(html.root_element(), "table") {
        for row in descendants_named(table, "tr") {
            for cell in row_cells(row) {
                let alt = descendants_named(cell, "img")
                    .filter_map(|img| img.value().attr("alt"))
                    .map(str::trim)
                    .find(|alt| !alt.is_empty() && rules.names_type(alt));
                if let Some(alt) = alt {
                    return Extraction::Found(alt.to_string());
                }
            }
        }
    }
    Extraction::Degraded(DegradeReason::IconMissing)
}

/// Card page of an entity, built from its canonical name.
pub fn tcg_page_url(primary_base_url: &str, canonical_name: &str) -> String {
    format!(
        "{}/wiki/{}_(TCG)",
        primary_base_url.trim_end_matches('/'),
        utf8_percent_encode(canonical_name, PAGE_NAME_ESCAPES)
    )
}

pub fn tcg_page_cache_key(entity: &BaseEntity) -> String {
    format!("tcg_{}.html", entity.canonical_name.to_lowercase())
}

pub fn fetch_tcg_type_catalog<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    url: &str,
    base_url: &str,
) -> anyhow::Result<BTreeMap<String, TcgTypeInfo>> {
    let document = client.fetch_document(TCG_TYPE_PAGE_CACHE_KEY, url)?;
    let catalog = extract_tcg_type_catalog(&document, base_url);
    info!(types = catalog.len(), "parsed card type catalog");
    Ok(catalog)
}

/// Set `tcg_type` on every record; unreadable pages leave it empty.
pub fn collect_tcg_types<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    records: Vec<TcgTypedEntity>,
    primary_base_url: &str,
) -> Vec<TcgTypedEntity> {
    let mut output = Vec::with_capacity(records.len());
    for mut record in records {
        let found = entity_tcg_type(client, &record.entity, primary_base_url);
        if let Some(reason) = found.reason() {
            warn!(
                id = record.entity.id,
                name = %record.entity.canonical_name,
                %reason,
                "no card type extracted"
            );
        }
        record.tcg_type = match found {
            Extraction::Found(tcg_type) => Some(tcg_type),
            Extraction::Degraded(_) => None,
        };
        output.push(record);
    }
    output
}

fn entity_tcg_type<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    entity: &BaseEntity,
    primary_base_url: &str,
) -> Extraction<String> {
    if entity.canonical_name.trim().is_empty() {
        return Extraction::Degraded(DegradeReason::EmptyInput);
    }
    let url = tcg_page_url(primary_base_url, &entity.canonical_name);
    match client.fetch_document(&tcg_page_cache_key(entity), &url) {
        Ok(document) => extract_entity_tcg_type(&document),
        Err(error) => Extraction::Degraded(DegradeReason::FetchFailed(format!("{error:#}"))),
    }
}

/// Number of records per card type, sorted by type name.
pub fn tcg_type_distribution(records: &[TcgTypedEntity]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for tcg_type in records.iter().filter_map(|record| record.tcg_type.as_ref()) {
        *counts.entry(tcg_type.clone()).or_insert(0) += 1;
    }
    counts
}
