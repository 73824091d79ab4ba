use std::collections::BTreeMap;

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::client::SourceClient;
use crate::html::{absolute_url, descendants_named, text_concat};
use crate::model::{BaseEntity, DegradeReason, Extraction};
use crate::rules::{TYPE_RULES, TypeRule, type_rule};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub color: String,
    pub icon_url: Option<String>,
}

/// A base record extended with its elemental types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedEntity {
    #[serde(flatten)]
    pub entity: BaseEntity,
    pub types: Vec<String>,
}

/// Colour and icon for every rule-table type found on the type overview page.
pub fn extract_type_catalog(document: &str, base_url: &str) -> BTreeMap<String, TypeInfo> {
    let html = Html::parse_document(document);
    let elements = html
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().attr("style").is_some())
        .collect::<Vec<_>>();

    let mut catalog = BTreeMap::new();
    for rule in TYPE_RULES {
        let found = elements
            .iter()
            .filter(|element| paints_background(**element, rule))
            .find(|element| links_to_type(**element, rule.name));
        if let Some(element) = found {
            let icon_url = descendants_named(*element, "img")
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| absolute_url(base_url, src));
            catalog.insert(
                rule.name.to_string(),
                TypeInfo {
                    name: rule.name.to_string(),
                    color: rule.color.to_string(),
                    icon_url,
                },
            );
        }
    }
    catalog
}

fn paints_background(element: ElementRef<'_>, rule: &TypeRule) -> bool {
    let Some(style) = element.value().attr("style") else {
        return false;
    };
    let style = style.to_ascii_lowercase();
    style
        .find("background")
        .map(|position| style[position..].contains(&rule.color.to_ascii_lowercase()))
        .unwrap_or(false)
}

fn links_to_type(element: ElementRef<'_>, name: &str) -> bool {
    let target = format!("/{name}_(type)");
    descendants_named(element, "a").any(|anchor| {
        anchor
            .value()
            .attr("href")
            .map(|href| href.contains(&target))
            .unwrap_or(false)
    })
}

/// Types listed in the infobox of an entity page, in page order.
pub fn extract_entity_types(document: &str) -> Extraction<Vec<String>> {
    let html = Html::parse_document(document);
    let infobox = descendants_named(html.root_element(), "table").find(|table| {
        let classes = table.value().classes().collect::<Vec<_>>();
        classes.contains(&"roundy") && classes.contains(&"infobox")
    });
    let Some(infobox) = infobox else {
        return Extraction::Degraded(DegradeReason::TableMissing);
    };

    let type_row = descendants_named(infobox, "tr").find(|row| {
        descendants_named(*row, "b")
            .next()
            .map(|bold| text_concat(bold).contains("Type"))
            .unwrap_or(false)
    });
    let Some(type_row) = type_row else {
        return Extraction::Degraded(DegradeReason::RowMissing);
    };

    let mut types: Vec<String> = Vec::new();
    for cell in descendants_named(type_row, "td") {
        let painted = cell
            .value()
            .attr("style")
            .map(|style| style.contains("background:"))
            .unwrap_or(false);
        if !painted {
            continue;
        }
        let Some(anchor) = descendants_named(cell, "a").next() else {
            continue;
        };
        let name = text_concat(anchor);
        if type_rule(&name).is_some() && !types.contains(&name) {
            types.push(name);
        }
    }
    Extraction::Found(types)
}

pub fn type_page_cache_key(entity: &BaseEntity) -> String {
    format!("pokemon_{}.html", entity.canonical_name.to_lowercase())
}

/// Fetch and parse the type overview page.
pub fn fetch_type_catalog<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    url: &str,
    base_url: &str,
) -> anyhow::Result<BTreeMap<String, TypeInfo>> {
    let document = client.fetch_document("types_page.html", url)?;
    let catalog = extract_type_catalog(&document, base_url);
    info!(types = catalog.len(), "parsed type catalog");
    Ok(catalog)
}

/// Attach types to every entity with a page link; pages that cannot be read
/// yield no types.
pub fn collect_entity_types<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    entities: &[BaseEntity],
) -> Vec<TypedEntity> {
    let mut output = Vec::with_capacity(entities.len());
    for entity in entities {
        if entity.primary_page_url.trim().is_empty() {
            warn!(id = entity.id, name = %entity.canonical_name, "no page link; skipped");
            continue;
        }
        let types = entity_types(client, entity);
        if let Some(reason) = types.reason() {
            warn!(id = entity.id, name = %entity.canonical_name, %reason, "no types extracted");
        }
        output.push(TypedEntity {
            entity: entity.clone(),
            types: types.unwrap_or_empty(),
        });
    }
    output
}

fn entity_types<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    entity: &BaseEntity,
) -> Extraction<Vec<String>> {
    match client.fetch_document(&type_page_cache_key(entity), &entity.primary_page_url) {
        Ok(document) => extract_entity_types(&document),
        Err(error) => Extraction::Degraded(DegradeReason::FetchFailed(format!("{error:#}"))),
    }
}

/// Number of entities per type, sorted by type name.
pub fn type_distribution(entities: &[TypedEntity]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entity in entities {
        for name in &entity.types {
            *counts.entry(name.clone()).or_insert(0) += 1;
        }
    }
    counts
}
