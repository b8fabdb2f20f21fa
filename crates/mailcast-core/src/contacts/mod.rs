//! Contact Module - CSV ingestion and segmentation

pub mod ingest;
pub mod segment;

pub use ingest::{parse_contacts, parse_contacts_str, IngestReport, RowError};
pub use segment::evaluate as evaluate_segment;
