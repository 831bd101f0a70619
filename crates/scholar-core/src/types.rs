use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScholarError};

// =============================================================================
// Enums
// =============================================================================

/// Faculty classification used for optional result filtering.
///
/// The wire names match the listing pages the corpus is crawled from.
/// An empty string means the record was never classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Regular (core) faculty.
    #[serde(alias = "regular")]
    Faculty,
    /// Adjunct faculty.
    Adjunct,
    /// International adjunct faculty.
    #[serde(alias = "international-adjunct")]
    InternationalAdjunct,
    /// Distinguished professors.
    Distinguished,
    /// Professors of practice.
    Practice,
    /// No classification recorded.
    #[serde(rename = "")]
    Unclassified,
}

impl Category {
    /// Every category a caller may filter on.
    pub const FILTERABLE: [Category; 5] = [
        Category::Faculty,
        Category::Adjunct,
        Category::InternationalAdjunct,
        Category::Distinguished,
        Category::Practice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Faculty => "faculty",
            Category::Adjunct => "adjunct",
            Category::InternationalAdjunct => "international_adjunct",
            Category::Distinguished => "distinguished",
            Category::Practice => "practice",
            Category::Unclassified => "",
        }
    }

    /// Parse an optional caller-supplied filter.
    ///
    /// Absent or blank input means "no filter". Only the canonical names in
    /// [`Category::FILTERABLE`] are accepted, case-sensitively. Legacy
    /// spellings such as `regular` are folded into the canonical value when
    /// a store is read, so they are never a filter value themselves.
    pub fn parse_filter(raw: Option<&str>) -> Result<Option<Category>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Category::FILTERABLE
                .iter()
                .copied()
                .find(|category| category.as_str() == value)
                .map(Some)
                .ok_or_else(|| {
                    ScholarError::InvalidQuery(format!(
                        "Unknown category '{}'. Must be one of: {}",
                        value,
                        Category::FILTERABLE
                            .iter()
                            .map(Category::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                }),
        }
    }
}

impl FromStr for Category {
    type Err = ScholarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "faculty" | "regular" => Ok(Category::Faculty),
            "adjunct" => Ok(Category::Adjunct),
            "international_adjunct" | "international-adjunct" => {
                Ok(Category::InternationalAdjunct)
            }
            "distinguished" => Ok(Category::Distinguished),
            "practice" => Ok(Category::Practice),
            "" => Ok(Category::Unclassified),
            other => Err(ScholarError::InvalidQuery(format!(
                "Unknown category '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Records
// =============================================================================

/// Opaque, stable record identifier.
///
/// Upstream tools emit either integers or strings; both are accepted and
/// kept as their decimal/string form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawRecordId")]
pub struct RecordId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRecordId {
    Int(i64),
    Str(String),
}

impl From<RawRecordId> for RecordId {
    fn from(raw: RawRecordId) -> Self {
        match raw {
            RawRecordId::Int(n) => RecordId(n.to_string()),
            RawRecordId::Str(s) => RecordId(s),
        }
    }
}

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-row metadata of the vector store.
///
/// `text` is the exact normalized text that produced the row's embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub id: RecordId,
    pub name: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_link: Option<String>,
    pub text: String,
}

/// A single ranked recommendation as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: RecordId,
    pub name: String,
    pub category: Category,
    /// Cosine similarity rounded to 4 decimal places.
    pub similarity_score: f64,
    pub email: Option<String>,
    pub profile_link: Option<String>,
    pub matched_text: String,
}

/// Identity and shape of a loaded vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Fresh for every load; two loads of the same files get different values.
    pub generation: Uuid,
    pub size: usize,
    pub dimension: usize,
    pub loaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&Category::InternationalAdjunct).unwrap();
        assert_eq!(json, "\"international_adjunct\"");

        let unclassified: Category = serde_json::from_str("\"\"").unwrap();
        assert_eq!(unclassified, Category::Unclassified);

        let regular: Category = serde_json::from_str("\"regular\"").unwrap();
        assert_eq!(regular, Category::Faculty);
    }

    #[test]
    fn test_category_unknown_is_rejected() {
        assert!(serde_json::from_str::<Category>("\"visiting\"").is_err());
        assert!("Adjunct".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_round_trips_through_as_str() {
        for category in Category::FILTERABLE {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(Category::parse_filter(None).unwrap(), None);
        assert_eq!(Category::parse_filter(Some("  ")).unwrap(), None);
        assert_eq!(
            Category::parse_filter(Some("adjunct")).unwrap(),
            Some(Category::Adjunct)
        );
        let err = Category::parse_filter(Some("ADJUNCT")).unwrap_err();
        assert!(matches!(err, ScholarError::InvalidQuery(_)));
        assert!(err.to_string().contains("distinguished"));
    }

    #[test]
    fn test_parse_filter_rejects_legacy_spellings() {
        assert!(Category::parse_filter(Some("regular")).is_err());
        assert!(Category::parse_filter(Some("international-adjunct")).is_err());
        // Still read from stored records.
        assert_eq!("regular".parse::<Category>().unwrap(), Category::Faculty);
    }

    #[test]
    fn test_record_id_accepts_int_and_string() {
        let from_int: RecordId = serde_json::from_str("42").unwrap();
        let from_str: RecordId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(from_int, from_str);
        assert_eq!(from_int.as_str(), "42");
        assert_eq!(serde_json::to_string(&from_int).unwrap(), "\"42\"");
    }

    #[test]
    fn test_record_metadata_optional_fields() {
        let json = r#"{"id": 7, "name": "A. Turing", "category": "distinguished", "text": "computability"}"#;
        let meta: RecordMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id, RecordId::from(7));
        assert_eq!(meta.category, Category::Distinguished);
        assert!(meta.email.is_none());
        assert!(meta.profile_link.is_none());

        let out = serde_json::to_value(&meta).unwrap();
        assert!(out.get("email").is_none());
    }
}
