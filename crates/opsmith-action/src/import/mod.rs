//! Bank statement import pipeline.
//!
//! Parses raw statement rows into ledger movements and filters out what
//! should not be inserted: malformed rows, repeats within the same batch
//! (exact fingerprint match), and rows already persisted from an earlier
//! import (fuzzy probe against stored movements). Parsing is lenient
//! about dates and strict about amounts and descriptions.

pub mod fingerprint;

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsmith_core::config::ImportConfig;
use opsmith_core::error::OpsError;
use opsmith_core::types::{FlowType, Money, OrgId};
use opsmith_store::ledger;

use crate::import::fingerprint::movement_fingerprint;

// ===== Row types =====

/// One raw statement row as supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Dollars as a number, or a string like "45.00" or "$1,250.00".
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    /// "income" or "expense"; rows without one default to expense.
    #[serde(default)]
    pub flow_type: Option<String>,
}

/// A row that survived parsing and batch-level dedup.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    /// Position in the submitted batch, for reporting.
    pub index: usize,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub flow_type: FlowType,
    pub fingerprint: String,
}

/// Why a row was left out, with the matched movement when the reason is
/// a persisted duplicate.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub index: usize,
    pub description: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_movement_id: Option<Uuid>,
}

/// What an import run would insert, plus everything it would skip.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub rows: Vec<ParsedRow>,
    pub skipped: Vec<SkippedRow>,
}

// ===== Parsing =====

/// Parse a statement date, falling back to today when the text is
/// missing or in no recognized format.
///
/// Accepts ISO ("2024-03-05"), US numeric ("03/05/2024"), and month-name
/// forms with or without a year ("Mar 5, 2024", "March 5"). Yearless
/// dates assume the current year.
pub fn parse_statement_date(raw: &str, today: NaiveDate) -> NaiveDate {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return today;
    }
    if let Ok(date) = trimmed.parse::<NaiveDate>() {
        return date;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return date;
    }
    for format in ["%b %d, %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date;
        }
    }
    let with_year = format!("{} {}", trimmed, today.year());
    for format in ["%b %d %Y", "%B %d %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&with_year, format) {
            return date;
        }
    }
    today
}

fn parse_amount(value: &serde_json::Value) -> Option<Money> {
    match value {
        serde_json::Value::String(s) => s.parse::<Money>().ok(),
        serde_json::Value::Number(n) => n.as_f64().map(Money::from_dollars),
        _ => None,
    }
}

/// Parse the batch, dropping invalid rows and exact repeats within it.
///
/// The first occurrence of a fingerprint wins; later repeats are skipped.
pub fn parse_rows(
    raw_rows: &[RawRow],
    today: NaiveDate,
    fingerprint_prefix_len: usize,
) -> (Vec<ParsedRow>, Vec<SkippedRow>) {
    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    let mut seen = HashSet::new();

    for (index, raw) in raw_rows.iter().enumerate() {
        let description = raw
            .description
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        if description.is_empty() {
            skipped.push(SkippedRow {
                index,
                description,
                reason: "invalid: blank description".to_string(),
                matched_movement_id: None,
            });
            continue;
        }

        let amount = match raw.amount.as_ref().and_then(parse_amount) {
            Some(amount) if amount.0 > 0 => amount,
            _ => {
                skipped.push(SkippedRow {
                    index,
                    description,
                    reason: "invalid: missing or non-positive amount".to_string(),
                    matched_movement_id: None,
                });
                continue;
            }
        };

        let flow_type = match raw.flow_type.as_deref() {
            None => FlowType::Expense,
            Some(s) => match s.parse::<FlowType>() {
                Ok(flow) => flow,
                Err(_) => {
                    skipped.push(SkippedRow {
                        index,
                        description,
                        reason: format!("invalid: unknown flow type '{}'", s),
                        matched_movement_id: None,
                    });
                    continue;
                }
            },
        };

        let date = raw
            .date
            .as_deref()
            .map(|d| parse_statement_date(d, today))
            .unwrap_or(today);

        let fingerprint =
            movement_fingerprint(amount, date, &description, fingerprint_prefix_len);
        if !seen.insert(fingerprint.clone()) {
            skipped.push(SkippedRow {
                index,
                description,
                reason: "duplicate within batch".to_string(),
                matched_movement_id: None,
            });
            continue;
        }

        rows.push(ParsedRow {
            index,
            date,
            description,
            amount,
            flow_type,
            fingerprint,
        });
    }

    (rows, skipped)
}

/// Full import plan: parse the batch, then probe each surviving row
/// against already-persisted movements.
pub fn plan_import(
    conn: &Connection,
    organization_id: OrgId,
    raw_rows: &[RawRow],
    today: NaiveDate,
    config: &ImportConfig,
) -> Result<ImportPlan, OpsError> {
    let (parsed, mut skipped) = parse_rows(raw_rows, today, config.fingerprint_prefix_len);

    let mut rows = Vec::new();
    for row in parsed {
        let existing = ledger::find_duplicate_movement(
            conn,
            organization_id,
            row.amount,
            row.date,
            &row.description,
            config.fuzzy_prefix_len,
        )?;
        match existing {
            Some(movement_id) => skipped.push(SkippedRow {
                index: row.index,
                description: row.description,
                reason: "duplicate of existing movement".to_string(),
                matched_movement_id: Some(movement_id),
            }),
            None => rows.push(row),
        }
    }

    skipped.sort_by_key(|s| s.index);
    Ok(ImportPlan { rows, skipped })
}
