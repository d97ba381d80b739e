use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Colors offered for genres, in assignment order
pub const GENRE_PALETTE: [&str; 20] = [
    "#ef4444", "#f97316", "#f59e0b", "#eab308", "#84cc16", "#22c55e", "#10b981", "#14b8a6",
    "#06b6d4", "#0ea5e9", "#3b82f6", "#6366f1", "#8b5cf6", "#a855f7", "#d946ef", "#ec4899",
    "#f43f5e", "#78716c", "#64748b", "#0f766e",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Canonical form used for uniqueness
    #[serde(default)]
    pub normalized_name: String,
    #[serde(default)]
    pub color: String,
    /// Live books whose genre list contains this id
    #[serde(default)]
    pub book_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update of a genre
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenrePatch {
    pub name: Option<String>,
    pub color: Option<String>,
}
