use std::fmt;

use serde::{Deserialize, Serialize};

/// Inclusive id bounds requested for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: u32,
    pub end: u32,
}

impl IdRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, id: u32) -> bool {
        (self.start..=self.end).contains(&id)
    }

    /// File-name tag such as `0001_0012`.
    pub fn tag(&self) -> String {
        format!("{:04}_{:04}", self.start, self.end)
    }
}

/// One row of the master catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntity {
    #[serde(rename = "ndex")]
    pub id: u32,
    #[serde(rename = "english")]
    pub canonical_name: String,
    #[serde(rename = "kanaName")]
    pub native_name: String,
    #[serde(rename = "hepburnName")]
    pub romanized_name: String,
    #[serde(rename = "publishedName")]
    pub published_name: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "link")]
    pub primary_page_url: String,
    #[serde(rename = "jpPage")]
    pub secondary_page_url: String,
}

impl AsRef<BaseEntity> for BaseEntity {
    fn as_ref(&self) -> &BaseEntity {
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRecord {
    #[serde(rename = "nameOriginDescription")]
    pub description: String,
    #[serde(rename = "nameOriginElements")]
    pub etymology_elements: Vec<String>,
}

/// Why a sub-extraction produced nothing for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    EmptyInput,
    FetchFailed(String),
    QueryUnavailable,
    SectionMissing,
    HeadingMissing,
    TableMissing,
    RowMissing,
    TooFewCells { found: usize },
    NoParagraphs,
    IconMissing,
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => f.write_str("empty input"),
            Self::FetchFailed(detail) => write!(f, "fetch failed: {detail}"),
            Self::QueryUnavailable => f.write_str("query returned nothing"),
            Self::SectionMissing => f.write_str("section not found"),
            Self::HeadingMissing => f.write_str("heading not found"),
            Self::TableMissing => f.write_str("table not found"),
            Self::RowMissing => f.write_str("no data row"),
            Self::TooFewCells { found } => write!(f, "row has only {found} cells"),
            Self::NoParagraphs => f.write_str("no paragraphs"),
            Self::IconMissing => f.write_str("no type icon"),
        }
    }
}

/// Outcome of one per-entity extraction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction<T> {
    Found(T),
    Degraded(DegradeReason),
}

impl<T> Extraction<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn reason(&self) -> Option<&DegradeReason> {
        match self {
            Self::Found(_) => None,
            Self::Degraded(reason) => Some(reason),
        }
    }
}

impl<T: Default> Extraction<T> {
    /// Collapse to the value, or the empty value when degraded.
    pub fn unwrap_or_empty(self) -> T {
        match self {
            Self::Found(value) => value,
            Self::Degraded(_) => T::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BaseEntity, DegradeReason, Extraction, IdRange, OriginRecord};

    #[test]
    fn id_range_is_inclusive_and_tags_zero_padded() {
        let range = IdRange::new(1, 12);
        assert!(range.contains(1));
        assert!(range.contains(12));
        assert!(!range.contains(13));
        assert_eq!(range.tag(), "0001_0012");
        assert_eq!(IdRange::new(152, 1025).tag(), "0152_1025");
    }

    #[test]
    fn base_entity_uses_legacy_json_keys() {
        let entity = BaseEntity {
            id: 1,
            canonical_name: "Bulbasaur".to_string(),
            native_name: "フシギダネ".to_string(),
            romanized_name: "Fushigidane".to_string(),
            published_name: "Fushigidane".to_string(),
            image_url: "https://img.example/1.png".to_string(),
            primary_page_url: "https://primary.example/wiki/Bulbasaur".to_string(),
            secondary_page_url: "https://secondary.example/wiki/x".to_string(),
        };
        let value = serde_json::to_value(&entity).expect("serialize");
        assert_eq!(value["ndex"], 1);
        assert_eq!(value["kanaName"], "フシギダネ");
        assert_eq!(value["hepburnName"], "Fushigidane");
        assert_eq!(value["link"], "https://primary.example/wiki/Bulbasaur");
        assert_eq!(value["jpPage"], "https://secondary.example/wiki/x");

        let back: BaseEntity = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, entity);
    }

    #[test]
    fn origin_record_uses_legacy_json_keys() {
        let record = OriginRecord {
            description: "From bulb.".to_string(),
            etymology_elements: vec!["フシギダネ".to_string()],
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["nameOriginDescription"], "From bulb.");
        assert_eq!(value["nameOriginElements"][0], "フシギダネ");
    }

    #[test]
    fn degraded_extraction_collapses_to_empty() {
        let degraded: Extraction<Vec<String>> = Extraction::Degraded(DegradeReason::TableMissing);
        assert!(!degraded.is_found());
        assert_eq!(degraded.reason(), Some(&DegradeReason::TableMissing));
        assert!(degraded.unwrap_or_empty().is_empty());

        let found = Extraction::Found("text".to_string());
        assert!(found.reason().is_none());
        assert_eq!(found.unwrap_or_empty(), "text");
    }

    #[test]
    fn degrade_reason_renders_detail() {
        assert_eq!(
            DegradeReason::TooFewCells { found: 3 }.to_string(),
            "row has only 3 cells"
        );
        assert_eq!(
            DegradeReason::FetchFailed("timeout".to_string()).to_string(),
            "fetch failed: timeout"
        );
    }
}
