//! Contact ingestion from CSV uploads

use csv::{ReaderBuilder, StringRecord, Trim};
use mailcast_common::types::EmailAddress;
use mailcast_common::{Error, Result};
use mailcast_storage::models::Contact;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, info};

/// A rejected CSV row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based index among data rows (header excluded)
    pub row: usize,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Outcome of an import: accepted contacts plus per-row diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub contacts: Vec<Contact>,
    pub errors: Vec<RowError>,
}

fn is_email_header(header: &str) -> bool {
    let lower = header.to_lowercase();
    lower == "email"
        || lower == "email address"
        || lower == "e-mail"
        || lower.contains("email")
        || lower == "mail"
}

fn is_name_header(header: &str) -> bool {
    let lower = header.to_lowercase();
    lower.contains("name")
        || lower.contains("first")
        || lower.contains("last")
        || lower == "fname"
        || lower == "lname"
}

/// Parse a CSV document with a header row into contacts.
///
/// Rows without a usable email, with a malformed email, or repeating an
/// email seen earlier in the file are reported and skipped.
pub fn parse_contacts<R: Read>(reader: R) -> Result<IngestReport> {
    let mut csv = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = csv
        .headers()
        .map_err(|e| Error::Validation(format!("Failed to read CSV header: {}", e)))?
        .clone();
    let email_column = headers.iter().position(is_email_header);

    let mut report = IngestReport::default();
    let mut seen = HashSet::new();
    let mut rows = 0usize;

    for (index, record) in csv.records().enumerate() {
        let row = index + 1;
        rows += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                report.errors.push(RowError {
                    row,
                    message: format!("Malformed row - {}", e),
                });
                continue;
            }
        };

        match contact_from_record(&headers, &record, email_column) {
            Ok(contact) => {
                if !seen.insert(contact.email.clone()) {
                    report.errors.push(RowError {
                        row,
                        message: format!("Duplicate email address - \"{}\"", contact.email),
                    });
                    continue;
                }
                report.contacts.push(contact);
            }
            Err(message) => report.errors.push(RowError { row, message }),
        }
    }

    if rows == 0 {
        return Err(Error::Validation(
            "CSV file appears to be empty or invalid".to_string(),
        ));
    }

    info!(
        accepted = report.contacts.len(),
        rejected = report.errors.len(),
        "Parsed contact upload"
    );
    Ok(report)
}

/// Parse contacts from an in-memory CSV string
pub fn parse_contacts_str(input: &str) -> Result<IngestReport> {
    parse_contacts(input.as_bytes())
}

fn contact_from_record(
    headers: &StringRecord,
    record: &StringRecord,
    email_column: Option<usize>,
) -> std::result::Result<Contact, String> {
    let cells: Vec<(&str, &str)> = headers
        .iter()
        .zip(record.iter())
        .filter(|(_, value)| !value.is_empty())
        .collect();

    let email = email_column
        .and_then(|i| record.get(i))
        .filter(|v| !v.is_empty())
        .or_else(|| {
            cells
                .iter()
                .map(|(_, value)| *value)
                .find(|value| EmailAddress::is_valid(value))
        });

    let Some(email) = email else {
        let columns: Vec<&str> = headers.iter().collect();
        return Err(format!(
            "No valid email address found. Columns: {}",
            columns.join(", ")
        ));
    };

    if !EmailAddress::is_valid(email) {
        return Err(format!("Invalid email format - \"{}\"", email));
    }

    let email_header = email_column.and_then(|i| headers.get(i));
    let mut contact = Contact::new(email);
    for (key, value) in &cells {
        if key.is_empty() || Some(*key) == email_header {
            continue;
        }
        contact.attributes.insert(key.to_string(), (*value).into());
    }

    if !contact.attributes.contains_key("name") {
        let name: Vec<&str> = cells
            .iter()
            .filter(|(key, _)| is_name_header(key))
            .map(|(_, value)| *value)
            .collect();
        if !name.is_empty() {
            contact.attributes.insert("name".to_string(), name.join(" ").into());
        }
    }

    debug!(email = %contact.email, attributes = contact.attributes.len(), "Accepted contact");
    Ok(contact)
}
