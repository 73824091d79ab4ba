use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::catalog::{CatalogSites, parse_catalog};
use crate::client::SourceClient;
use crate::config::HarvestConfig;
use crate::etymology::extract_etymology;
use crate::model::{BaseEntity, DegradeReason, Extraction, IdRange, OriginRecord};
use crate::origin::extract_origin;
use crate::transport::Transport;

pub const MASTER_LIST_CACHE_KEY: &str = "list.html";

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub range: IdRange,
    pub master_list_url: String,
    pub sites: CatalogSites,
}

impl HarvestOptions {
    pub fn from_config(config: &HarvestConfig, range: IdRange) -> Self {
        let sources = config.sources();
        Self {
            range,
            master_list_url: sources.master_list_url,
            sites: CatalogSites {
                primary_base_url: sources.primary_base_url,
                secondary_page_base: sources.secondary_page_base,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Origin,
    Etymology,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Origin => f.write_str("origin"),
            Self::Etymology => f.write_str("etymology"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedStep {
    pub id: u32,
    pub stage: Stage,
    pub reason: DegradeReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub entities: usize,
    pub described: usize,
    pub with_etymology: usize,
    pub degraded: Vec<DegradedStep>,
    pub request_count: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

#[derive(Debug, Clone)]
pub struct HarvestOutput {
    pub entities: Vec<BaseEntity>,
    pub origins: BTreeMap<u32, OriginRecord>,
    pub report: HarvestReport,
}

/// Fetch the master document and parse the requested id range out of it.
pub fn load_catalog<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    options: &HarvestOptions,
) -> Result<Vec<BaseEntity>> {
    let document = client
        .fetch_document(MASTER_LIST_CACHE_KEY, &options.master_list_url)
        .with_context(|| format!("failed to load master list {}", options.master_list_url))?;
    let mut entities = parse_catalog(&document, options.range, &options.sites)?;
    entities.retain(|entity| options.range.contains(entity.id));
    Ok(entities)
}

/// Full run: catalog once, then origin and etymology per entity.
///
/// Only an unreadable master document or one without listing tables fails
/// the run; everything per entity degrades to empty fields.
pub fn run_harvest<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    options: &HarvestOptions,
) -> Result<HarvestOutput> {
    let entities = load_catalog(client, options)?;
    info!(
        entities = entities.len(),
        start = options.range.start,
        end = options.range.end,
        "harvesting name origins"
    );
    let (origins, mut report) = harvest_origins(client, &entities);
    report.entities = entities.len();
    report.request_count = client.request_count();
    let stats = client.cache().stats();
    report.cache_hits = stats.hits;
    report.cache_misses = stats.misses;
    Ok(HarvestOutput {
        entities,
        origins,
        report,
    })
}

pub fn harvest_origins<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    entities: &[BaseEntity],
) -> (BTreeMap<u32, OriginRecord>, HarvestReport) {
    let mut origins = BTreeMap::new();
    let mut report = HarvestReport::default();
    for entity in entities {
        let page = page_identifier(&entity.primary_page_url);
        let description = extract_origin(client, &page);
        let elements = extract_etymology(client, &entity.secondary_page_url);

        if description.is_found() {
            report.described += 1;
        }
        if elements.is_found() {
            report.with_etymology += 1;
        }
        record_degraded(&mut report, entity, Stage::Origin, &description);
        record_degraded(&mut report, entity, Stage::Etymology, &elements);

        origins.insert(
            entity.id,
            OriginRecord {
                description: description.unwrap_or_empty(),
                etymology_elements: elements.unwrap_or_empty(),
            },
        );
    }
    (origins, report)
}

fn record_degraded<T>(
    report: &mut HarvestReport,
    entity: &BaseEntity,
    stage: Stage,
    extraction: &Extraction<T>,
) {
    let Some(reason) = extraction.reason() else {
        return;
    };
    if matches!(reason, DegradeReason::FetchFailed(_) | DegradeReason::QueryUnavailable) {
        warn!(id = entity.id, name = %entity.canonical_name, %stage, %reason, "degraded");
    } else {
        info!(id = entity.id, name = %entity.canonical_name, %stage, %reason, "nothing extracted");
    }
    report.degraded.push(DegradedStep {
        id: entity.id,
        stage,
        reason: reason.clone(),
    });
}

/// Page title for the query API: the URL's last path segment, unescaped.
pub fn page_identifier(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
