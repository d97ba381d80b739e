use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedBookSource {
    /// Imported from a metadata provider
    Api,
    #[default]
    Manual,
}

/// A book in the series the user does not own yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedBook {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    #[serde(default)]
    pub source: ExpectedBookSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Live books whose `seriesId` is this id
    #[serde(default)]
    pub book_count: i64,
    #[serde(default)]
    pub expected_books: Vec<ExpectedBook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update of a series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub expected_books: Option<Vec<ExpectedBook>>,
}
