//! Mailcast API - REST API server
//!
//! This crate provides the REST API for Mailcast: contact lists, segments,
//! templates, providers, campaigns, direct sends, analytics and the public
//! open/click tracking endpoints.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
