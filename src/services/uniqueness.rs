//! Cross-record uniqueness rules for genres
//!
//! Checks run against a list of genres the caller has just read from the
//! remote store. The store itself enforces nothing, so two writers racing
//! between that read and their write can still both succeed.

use crate::domain::{DomainError, UniquenessConflict};
use crate::models::{GENRE_PALETTE, Genre};
use crate::utils::{is_valid_hex_color, normalize_genre_name};

fn others<'a>(existing: &'a [Genre], exclude_id: Option<&'a str>) -> impl Iterator<Item = &'a Genre> {
    existing
        .iter()
        .filter(move |genre| exclude_id != Some(genre.id.as_str()))
}

/// Normalized form of `name`, if no other genre already uses it
pub fn ensure_unique_name(
    name: &str,
    existing: &[Genre],
    exclude_id: Option<&str>,
) -> Result<String, DomainError> {
    let normalized = normalize_genre_name(name);
    if normalized.is_empty() {
        return Err(DomainError::field("name", "Genre name is required"));
    }

    // Older documents may predate `normalizedName`
    let taken = others(existing, exclude_id).any(|genre| {
        let theirs = if genre.normalized_name.is_empty() {
            normalize_genre_name(&genre.name)
        } else {
            genre.normalized_name.clone()
        };
        theirs == normalized
    });

    if taken {
        return Err(DomainError::Uniqueness(UniquenessConflict::Name(
            name.trim().to_string(),
        )));
    }
    Ok(normalized)
}

/// Lower-cased `color`, if it is a valid hex color no other genre uses
pub fn ensure_color_available(
    color: &str,
    existing: &[Genre],
    exclude_id: Option<&str>,
) -> Result<String, DomainError> {
    let color = color.trim();
    if !is_valid_hex_color(color) {
        return Err(DomainError::field(
            "color",
            "Color must be # followed by six hex digits",
        ));
    }

    let color = color.to_ascii_lowercase();
    if others(existing, exclude_id).any(|genre| genre.color.eq_ignore_ascii_case(&color)) {
        return Err(DomainError::Uniqueness(UniquenessConflict::Color(color)));
    }
    Ok(color)
}

/// First palette color no genre uses; the first palette entry once all are
/// taken
pub fn next_available_color(existing: &[Genre]) -> &'static str {
    GENRE_PALETTE
        .iter()
        .find(|candidate| {
            !existing
                .iter()
                .any(|genre| genre.color.eq_ignore_ascii_case(candidate))
        })
        .copied()
        .unwrap_or(GENRE_PALETTE[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genre(id: &str, name: &str, color: &str) -> Genre {
        Genre {
            id: id.to_string(),
            name: name.to_string(),
            normalized_name: normalize_genre_name(name),
            color: color.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_case_and_whitespace_variants() {
        let existing = vec![genre("g1", "Fiction", "#ef4444")];
        for candidate in ["fiction", "  FICTION ", "Fiction"] {
            assert!(matches!(
                ensure_unique_name(candidate, &existing, None),
                Err(DomainError::Uniqueness(UniquenessConflict::Name(_)))
            ));
        }
        assert_eq!(
            ensure_unique_name("Science  Fiction", &existing, None).unwrap(),
            "science fiction"
        );
    }

    #[test]
    fn renaming_a_genre_to_itself_is_allowed() {
        let existing = vec![genre("g1", "Fiction", "#ef4444")];
        assert!(ensure_unique_name("FICTION", &existing, Some("g1")).is_ok());
    }

    #[test]
    fn legacy_genres_without_normalized_name_still_collide() {
        let mut legacy = genre("g1", "Sci Fi", "#ef4444");
        legacy.normalized_name.clear();
        assert!(ensure_unique_name("sci   fi", &[legacy], None).is_err());
    }

    #[test]
    fn blank_name_is_a_validation_error() {
        assert!(matches!(
            ensure_unique_name("   ", &[], None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn color_collisions_are_case_insensitive() {
        let existing = vec![genre("g1", "Fiction", "#EF4444")];
        assert!(matches!(
            ensure_color_available("#ef4444", &existing, None),
            Err(DomainError::Uniqueness(UniquenessConflict::Color(_)))
        ));
        assert!(ensure_color_available("#EF4444", &existing, Some("g1")).is_ok());
        assert_eq!(
            ensure_color_available("#ABCDEF", &existing, None).unwrap(),
            "#abcdef"
        );
        assert!(matches!(
            ensure_color_available("red", &existing, None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn auto_color_skips_used_palette_entries() {
        let existing = vec![
            genre("g1", "A", GENRE_PALETTE[0]),
            genre("g2", "B", &GENRE_PALETTE[1].to_uppercase()),
        ];
        assert_eq!(next_available_color(&existing), GENRE_PALETTE[2]);
    }

    #[test]
    fn auto_color_reuses_first_entry_when_palette_is_exhausted() {
        let existing: Vec<Genre> = GENRE_PALETTE
            .iter()
            .enumerate()
            .map(|(i, color)| genre(&format!("g{i}"), &format!("G{i}"), color))
            .collect();
        assert_eq!(next_available_color(&existing), GENRE_PALETTE[0]);
    }
}
