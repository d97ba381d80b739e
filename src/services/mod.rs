//! Services Layer
//!
//! Business operations over the remote document store and the local cache.
//! Every operation takes an explicit [`AppContext`](crate::infrastructure::AppContext).

pub mod book_service;
pub mod count_service;
pub mod duplicate_service;
pub mod export_service;
pub mod genre_service;
pub mod gravatar_service;
pub mod metadata_service;
pub mod recommendation_service;
mod records;
pub mod series_service;
pub mod uniqueness;
pub mod wishlist_service;

// Re-export for convenience
pub use book_service::*;
pub use count_service::{CountKind, GenreDelta, RecalcReport, recalculate_counts};
pub use duplicate_service::{
    DuplicateCheck, DuplicateMatch, DuplicateOverride, MatchType, WishlistDuplicateCheck,
    check_duplicate_book, check_duplicate_wishlist,
};
pub use export_service::{export_csv, export_json};
pub use genre_service::{create_genre, delete_genre, list_genres, merge_genres, update_genre};
pub use gravatar_service::GravatarClient;
pub use metadata_service::{GenreSuggestion, lookup_with_timeout, suggest_genres};
pub use recommendation_service::{AuthorGroup, get_recommendations, group_by_author};
pub use records::Listing;
pub use series_service::{
    create_series, delete_series, list_series, merge_series, missing_expected_books, update_series,
};
pub use wishlist_service::*;
