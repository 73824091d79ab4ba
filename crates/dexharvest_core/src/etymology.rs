use scraper::Html;
use tracing::warn;

use crate::cache::CacheStore;
use crate::client::SourceClient;
use crate::html::{children_named, descendants_named, next_element_named, text_concat};
use crate::model::{DegradeReason, Extraction};
use crate::rules::{ETYMOLOGY_RULES, EtymologyRules};
use crate::transport::Transport;

/// Native name followed by its etymological components, read from a
/// secondary-site page.
pub fn extract_etymology<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    url: &str,
) -> Extraction<Vec<String>> {
    let url = url.trim();
    if url.is_empty() {
        return Extraction::Degraded(DegradeReason::EmptyInput);
    }
    let key = etymology_cache_key(url);
    match client.fetch_document(&key, url) {
        Ok(document) => parse_etymology_document(&document),
        Err(error) => {
            warn!(page = last_segment(url), error = %error, "secondary page fetch failed");
            Extraction::Degraded(DegradeReason::FetchFailed(format!("{error:#}")))
        }
    }
}

pub fn etymology_cache_key(url: &str) -> String {
    format!("jp_{}.html", last_segment(url))
}

fn last_segment(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
}

pub fn parse_etymology_document(document: &str) -> Extraction<Vec<String>> {
    parse_etymology_with_rules(document, &ETYMOLOGY_RULES)
}

pub fn parse_etymology_with_rules(
    document: &str,
    rules: &EtymologyRules,
) -> Extraction<Vec<String>> {
    let html = Html::parse_document(document);
    let heading = html
        .root_element()
        .descendants()
        .filter_map(scraper::ElementRef::wrap)
        .find(|element| {
            rules
                .heading_tags
                .iter()
                .any(|tag| element.value().name().eq_ignore_ascii_case(tag))
                && element.text().collect::<String>().contains(rules.heading_phrase)
        });
    let Some(heading) = heading else {
        return Extraction::Degraded(DegradeReason::HeadingMissing);
    };

    let Some(table) = next_element_named(&html, heading, "table") else {
        return Extraction::Degraded(DegradeReason::TableMissing);
    };

    let row = descendants_named(table, "tr")
        .find(|row| descendants_named(*row, "td").count() >= rules.min_data_cells);
    let Some(row) = row else {
        return Extraction::Degraded(DegradeReason::RowMissing);
    };

    let cells = children_named(row, "td");
    if cells.len() < rules.min_row_cells {
        return Extraction::Degraded(DegradeReason::TooFewCells { found: cells.len() });
    }

    let name = text_concat(cells[rules.name_cell]);
    let etymology = text_concat(cells[rules.etymology_cell]);
    let mut elements = vec![name];
    elements.extend(split_etymology_with(&etymology, rules.delimiters));
    Extraction::Found(elements)
}

/// Split etymology text on the delimiter set, trimming and dropping empties.
pub fn split_etymology(text: &str) -> Vec<String> {
    split_etymology_with(text, ETYMOLOGY_RULES.delimiters)
}

fn split_etymology_with(text: &str, delimiters: &[char]) -> Vec<String> {
    text.split(|ch: char| delimiters.contains(&ch))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}
