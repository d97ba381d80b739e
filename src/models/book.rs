use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reading interval. `None` dates mean "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadInterval {
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// A book document as stored remotely (and in the local cache)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Reading history, oldest first. `None` on documents not yet migrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reads: Option<Vec<ReadInterval>>,
    // Legacy single-interval fields, removed by migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for adding a book
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub series_position: Option<f64>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reads: Vec<ReadInterval>,
}

/// Partial update of a book. Outer `None` leaves a field untouched;
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<Option<String>>,
    pub genres: Option<Vec<String>>,
    pub series_id: Option<Option<String>>,
    pub series_position: Option<Option<f64>>,
    pub rating: Option<Option<u8>>,
    pub cover_image_url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

/// Genre ids in first-seen order, without duplicates or blanks
pub fn dedupe_ids(ids: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !seen.iter().any(|s: &String| s == id) {
            seen.push(id.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_legacy_document_without_reads() {
        let book: Book = serde_json::from_value(json!({
            "id": "b1",
            "title": "Emma",
            "author": "Jane Austen",
            "startedAt": "2020-01-01T00:00:00Z",
            "status": "reading"
        }))
        .unwrap();
        assert!(book.reads.is_none());
        assert!(book.started_at.is_some());
        assert!(book.genres.is_empty());
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let ids = vec!["g1".into(), "g2".into(), " g1 ".into(), "".into()];
        assert_eq!(dedupe_ids(&ids), vec!["g1".to_string(), "g2".to_string()]);
    }
}
