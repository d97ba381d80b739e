//! Store implementations using SeaORM

pub mod document_repository;

pub use document_repository::SeaOrmDocumentStore;
