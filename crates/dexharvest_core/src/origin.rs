use scraper::Html;
use serde_json::Value;

use crate::cache::CacheStore;
use crate::client::SourceClient;
use crate::html::{descendants_named, text_joined};
use crate::model::{DegradeReason, Extraction};
use crate::rules::{ORIGIN_RULES, OriginRules, contains_native_script};
use crate::transport::Transport;

/// Cleaned "name origin" description for a primary-site page.
pub fn extract_origin<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    page: &str,
) -> Extraction<String> {
    if page.trim().is_empty() {
        return Extraction::Degraded(DegradeReason::EmptyInput);
    }
    match origin_section_html(client, page) {
        Extraction::Found(html) => reduce_origin_html(&html),
        Extraction::Degraded(reason) => Extraction::Degraded(reason),
    }
}

fn origin_section_html<T: Transport, S: CacheStore>(
    client: &mut SourceClient<T, S>,
    page: &str,
) -> Extraction<String> {
    let sections_key = format!("idx_{page}.json");
    let Some(meta) = client
        .query(
            &[
                ("action", "parse".to_string()),
                ("page", page.to_string()),
                ("prop", "sections".to_string()),
            ],
            Some(sections_key.as_str()),
        )
        .into_value()
    else {
        return Extraction::Degraded(DegradeReason::QueryUnavailable);
    };

    let Some(index) = find_section_index(&meta, &ORIGIN_RULES) else {
        return Extraction::Degraded(DegradeReason::SectionMissing);
    };

    let section_key = format!("sec_{page}_{index}.json");
    let Some(section) = client
        .query(
            &[
                ("action", "parse".to_string()),
                ("page", page.to_string()),
                ("prop", "text".to_string()),
                ("section", index.clone()),
            ],
            Some(section_key.as_str()),
        )
        .into_value()
    else {
        return Extraction::Degraded(DegradeReason::QueryUnavailable);
    };

    match section_text(&section) {
        Some(html) => Extraction::Found(html),
        None => Extraction::Degraded(DegradeReason::QueryUnavailable),
    }
}

/// Index of the first section whose title starts with the origin prefix.
pub fn find_section_index(meta: &Value, rules: &OriginRules) -> Option<String> {
    let sections = meta
        .get("parse")
        .and_then(|parse| parse.get("sections"))
        .and_then(Value::as_array)?;
    sections
        .iter()
        .find(|section| {
            section
                .get("line")
                .and_then(Value::as_str)
                .map(|line| line.trim().to_lowercase().starts_with(rules.section_prefix))
                .unwrap_or(false)
        })
        .and_then(|section| section.get("index"))
        .and_then(|index| match index {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        })
}

/// Rendered HTML of a section response; accepts both response format versions.
fn section_text(section: &Value) -> Option<String> {
    let text = section.get("parse")?.get("text")?;
    match text {
        Value::String(html) => Some(html.clone()),
        Value::Object(map) => map.get("*").and_then(Value::as_str).map(ToString::to_string),
        _ => None,
    }
}

/// Reduce rendered section HTML to the kept paragraphs.
pub fn reduce_origin_html(html: &str) -> Extraction<String> {
    let document = Html::parse_fragment(html);
    let paragraphs = descendants_named(document.root_element(), "p")
        .map(text_joined)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();
    if paragraphs.is_empty() {
        return Extraction::Degraded(DegradeReason::NoParagraphs);
    }
    Extraction::Found(select_paragraphs(&paragraphs, &ORIGIN_RULES))
}

/// Keep native-script paragraphs when any exist, otherwise the leading ones.
pub fn select_paragraphs(paragraphs: &[String], rules: &OriginRules) -> String {
    let native = paragraphs
        .iter()
        .filter(|paragraph| contains_native_script(paragraph))
        .map(String::as_str)
        .collect::<Vec<_>>();
    let kept = if native.is_empty() {
        paragraphs
            .iter()
            .take(rules.fallback_paragraphs)
            .map(String::as_str)
            .collect::<Vec<_>>()
    } else {
        native
    };
    kept.join(rules.separator)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_origin, find_section_index, reduce_origin_html, select_paragraphs};
    use crate::cache::{ContentCache, MemoryCacheStore};
    use crate::client::SourceClient;
    use crate::client::tests::{MockTransport, no_wait};
    use crate::model::{DegradeReason, Extraction};
    use crate::rules::ORIGIN_RULES;

    fn paragraphs(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn fallback_keeps_first_two_plain_paragraphs() {
        let kept = select_paragraphs(&paragraphs(&["One.", "Two.", "Three."]), &ORIGIN_RULES);
        assert_eq!(kept, "One.  Two.");
    }

    #[test]
    fn fallback_keeps_single_plain_paragraph() {
        let kept = select_paragraphs(&paragraphs(&["Only."]), &ORIGIN_RULES);
        assert_eq!(kept, "Only.");
    }

    #[test]
    fn native_script_paragraphs_take_priority() {
        let kept = select_paragraphs(
            &paragraphs(&["English only.", "May come from 蝶 (chō)."]),
            &ORIGIN_RULES,
        );
        assert_eq!(kept, "May come from 蝶 (chō).");
    }

    #[test]
    fn reduce_drops_empty_paragraphs_and_joins_text_nodes() {
        let html = r#"<div class="mw-parser-output"><h2>Name origin</h2>
<p>Bulbasaur is a combination of <i>bulb</i> and <i>dinosaur</i>.</p>
<p>   </p>
<p>Fushigidane may be <b>不思議</b> (mysterious) and 種 (seed).</p></div>"#;
        assert_eq!(
            reduce_origin_html(html),
            Extraction::Found("Fushigidane may be 不思議 (mysterious) and 種 (seed).".to_string())
        );
        assert_eq!(
            reduce_origin_html("<ul><li>no paragraphs</li></ul>"),
            Extraction::Degraded(DegradeReason::NoParagraphs)
        );
    }

    #[test]
    fn section_lookup_is_case_insensitive_prefix() {
        let meta = json!({"parse": {"sections": [
            {"line": "Biology", "index": "1"},
            {"line": "Name Origin and trivia", "index": "7"},
            {"line": "Name origin", "index": "9"}
        ]}});
        assert_eq!(find_section_index(&meta, &ORIGIN_RULES).as_deref(), Some("7"));
        let none = json!({"parse": {"sections": [{"line": "In other languages", "index": "4"}]}});
        assert!(find_section_index(&none, &ORIGIN_RULES).is_none());
    }

    #[test]
    fn extract_origin_walks_sections_then_text() {
        let transport = MockTransport::with_queries(vec![
            Ok(json!({"parse": {"sections": [{"line": "Name origin", "index": "5"}]}}).to_string()),
            Ok(
                json!({"parse": {"text": "<p>From ivy.</p><p>Second.</p><p>Third.</p>"}})
                    .to_string(),
            ),
        ]);
        let mut client =
            SourceClient::new(transport, ContentCache::new(MemoryCacheStore::new()), no_wait());
        let description = extract_origin(&mut client, "Ivysaur (Pokémon)");
        assert_eq!(description, Extraction::Found("From ivy.  Second.".to_string()));
        assert!(client.cache().store().len() == 2);

        let again = extract_origin(&mut client, "Ivysaur (Pokémon)");
        assert_eq!(again, description);
        assert_eq!(client.transport().query_calls, 2);
    }

    #[test]
    fn extract_origin_degrades_on_missing_section_or_error() {
        let transport = MockTransport::with_queries(vec![
            Ok(json!({"parse": {"sections": [{"line": "Trivia", "index": "2"}]}}).to_string()),
            Ok(json!({"error": {"code": "missingtitle", "info": "gone"}}).to_string()),
        ]);
        let mut client =
            SourceClient::new(transport, ContentCache::new(MemoryCacheStore::new()), no_wait());
        assert_eq!(
            extract_origin(&mut client, "Trivia only"),
            Extraction::Degraded(DegradeReason::SectionMissing)
        );
        assert_eq!(
            extract_origin(&mut client, "Missing page"),
            Extraction::Degraded(DegradeReason::QueryUnavailable)
        );
        assert_eq!(
            extract_origin(&mut client, "  "),
            Extraction::Degraded(DegradeReason::EmptyInput)
        );
    }
}
