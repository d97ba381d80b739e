pub mod avatar;
pub mod book;
pub mod document;
pub mod genre;
pub mod recommendation;
pub mod series;
pub mod wishlist;

pub use avatar::GravatarProbe;
pub use book::{Book, BookPatch, NewBook, ReadInterval};
pub use genre::{Genre, GenrePatch, GENRE_PALETTE};
pub use recommendation::Recommendation;
pub use series::{ExpectedBook, ExpectedBookSource, Series, SeriesPatch};
pub use wishlist::{AddedFrom, NewWishlistItem, Priority, WishlistItem};
