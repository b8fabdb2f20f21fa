//! API request handlers

pub mod analytics;
pub mod campaigns;
pub mod contacts;
pub mod health;
pub mod oauth;
pub mod providers;
pub mod segments;
pub mod send;
pub mod templates;
pub mod tracking;

pub use health::*;
