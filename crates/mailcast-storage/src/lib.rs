//! Mailcast Storage - file-backed persistence
//!
//! This crate provides the persisted models of Mailcast and repositories
//! storing them as JSON collections under a data directory.

pub mod file;
pub mod models;
pub mod repository;

pub use file::{FileStorage, JsonCollection, JsonLines, Keyed, LocalStorage};
pub use models::*;
pub use repository::*;
