pub mod text;

pub use text::{clean_isbn, is_valid_hex_color, normalize_genre_name, normalize_text};
