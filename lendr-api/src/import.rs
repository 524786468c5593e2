//! Bulk customer import from plain-text CSV.
//!
//! One customer per line: `external_id,score[,preapproved_at]`, no header.
//! Lines are created independently; failures are collected, not fatal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lendr_core::{LendingRepository, NewCustomer};

use crate::error::AppError;

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportSummary {
    pub created: Vec<String>,
    pub errors: Vec<String>,
}

/// Parses every non-blank line, keyed by its 1-based physical line number.
pub fn parse_rows(raw: &str) -> Vec<(u64, Result<NewCustomer, String>)> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx as u64 + 1, read_line(line).and_then(|r| parse_record(&r))))
        .collect()
}

fn read_line(line: &str) -> Result<csv::StringRecord, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Ok(record),
        Ok(false) => Err("expected 2 or 3 values, got 0".to_string()),
        Err(e) => Err(format!("could not read row: {e}")),
    }
}

fn parse_record(record: &csv::StringRecord) -> Result<NewCustomer, String> {
    if !(2..=3).contains(&record.len()) {
        return Err(format!("expected 2 or 3 values, got {}", record.len()));
    }

    let external_id = record[0].to_string();
    let score: Decimal = record[1]
        .parse()
        .map_err(|_| "score: A valid number is required.".to_string())?;

    let preapproved_at = match record.get(2) {
        Some(raw) if !raw.is_empty() => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| "preapproved_at: Datetime has wrong format.".to_string())?
                .with_timezone(&Utc),
        ),
        _ => None,
    };

    let mut customer = NewCustomer::new(external_id, score);
    customer.preapproved_at = preapproved_at;
    Ok(customer)
}

/// Creates each parsed row. Only backend failures abort the import.
pub async fn import_customers(
    repo: &dyn LendingRepository,
    raw: &str,
) -> Result<ImportSummary, AppError> {
    let mut summary = ImportSummary::default();

    for (line, row) in parse_rows(raw) {
        let input = match row {
            Ok(input) => input,
            Err(msg) => {
                summary.errors.push(format!("Line {line}: {msg}"));
                continue;
            }
        };

        match repo.create_customer(input).await.map_err(AppError::from) {
            Ok(customer) => summary.created.push(customer.external_id),
            Err(AppError::ValidationError { field, message }) => {
                let msg = match field {
                    Some(field) => format!("Line {line}: {field}: {message}"),
                    None => format!("Line {line}: {message}"),
                };
                summary.errors.push(msg);
            }
            Err(other) => return Err(other),
        }
    }

    Ok(summary)
}
