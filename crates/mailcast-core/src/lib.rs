//! Mailcast Core - Campaign sending, contacts, providers and tracking
//!
//! This crate contains the core functionality including:
//! - Contact ingestion from CSV and segment evaluation
//! - Template rendering and campaign lifecycle
//! - The paced send pipeline and its background worker
//! - SMTP, OAuth webmail and HTTP API transports
//! - Open/click tracking and analytics

pub mod analytics;
pub mod campaign;
pub mod contacts;
pub mod provider;
pub mod tracking;

#[cfg(test)]
mod testing;

pub use analytics::{CampaignAnalytics, DashboardOverview};
pub use campaign::{CampaignManager, CampaignWorker, DirectSendRequest, DirectSender, SendPipeline};
pub use provider::{Transport, TransportFactory};
