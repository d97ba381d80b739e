pub mod domain;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use infrastructure::config;
pub use infrastructure::db;
