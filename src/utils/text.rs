//! Text normalization used for search, grouping and uniqueness checks

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::domain::DomainError;

/// Lower-case, strip diacritics, unify apostrophes and collapse whitespace.
///
/// `"L’Étranger"` and `"l'etranger"` normalize to the same string.
pub fn normalize_text(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };

    let folded: String = value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' | '`' | '\u{00B4}' => '\'',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();

    collapse_whitespace(&folded)
}

/// Canonical genre name: lower-cased, trimmed, inner whitespace collapsed.
pub fn normalize_genre_name(name: &str) -> String {
    collapse_whitespace(&name.to_lowercase())
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `#` followed by exactly six hex digits
pub fn is_valid_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Strip separators from an ISBN and check its length.
///
/// Blank input is "no ISBN"; anything else must be 10 characters (digits with
/// an optional trailing `X`) or 13 digits.
pub fn clean_isbn(raw: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.is_empty() {
        return Ok(None);
    }

    let valid = match cleaned.len() {
        13 => cleaned.chars().all(|c| c.is_ascii_digit()),
        10 => cleaned
            .char_indices()
            .all(|(i, c)| c.is_ascii_digit() || (i == 9 && c == 'X')),
        _ => false,
    };

    if valid {
        Ok(Some(cleaned))
    } else {
        Err(DomainError::field("isbn", "ISBN must have 10 or 13 digits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_folds_case_accents_and_quotes() {
        assert_eq!(normalize_text(Some("L’Étranger")), "l'etranger");
        assert_eq!(normalize_text(Some("Gabriel García Márquez")), "gabriel garcia marquez");
        assert_eq!(normalize_text(Some("Don`t  Panic ")), "don't panic");
    }

    #[test]
    fn normalize_text_of_nothing_is_empty() {
        assert_eq!(normalize_text(None), "");
        assert_eq!(normalize_text(Some("   ")), "");
    }

    #[test]
    fn genre_names_compare_case_and_whitespace_insensitively() {
        assert_eq!(normalize_genre_name("  Sci Fi "), normalize_genre_name("SCI   FI"));
        assert_eq!(normalize_genre_name("Sci\tFi"), "sci fi");
        assert_ne!(normalize_genre_name("Fiction"), normalize_genre_name("Science Fiction"));
    }

    #[test]
    fn normalize_genre_name_is_idempotent() {
        for name in ["  Historical   Fiction", "POETRY", "", "a  b c"] {
            let once = normalize_genre_name(name);
            assert_eq!(normalize_genre_name(&once), once);
        }
    }

    #[test]
    fn hex_colors_must_be_six_digits() {
        assert!(is_valid_hex_color("#A1b2C3"));
        assert!(!is_valid_hex_color("#abc"));
        assert!(!is_valid_hex_color("a1b2c3"));
        assert!(!is_valid_hex_color("#a1b2c3; background:url(x)"));
        assert!(!is_valid_hex_color("#ggggggg"));
    }

    #[test]
    fn isbn_cleanup() {
        assert_eq!(
            clean_isbn(Some("978-0-14-312755-0")).unwrap(),
            Some("9780143127550".to_string())
        );
        assert_eq!(clean_isbn(Some("0-8044-2957-x")).unwrap(), Some("080442957X".to_string()));
        assert_eq!(clean_isbn(Some("  ")).unwrap(), None);
        assert!(clean_isbn(Some("12345")).is_err());
        assert!(clean_isbn(Some("X804429570")).is_err());
    }
}
