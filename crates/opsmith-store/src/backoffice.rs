//! Back-office queries: quotes, leave requests, budget lines.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use opsmith_core::error::OpsError;
use opsmith_core::{Money, OrgId, Timestamp};

use crate::entities::{BudgetLine, LeaveRequest, LeaveStatus, Quote, QuoteStatus};

/// Optional narrowing criteria for quote selection. All fields are ANDed.
#[derive(Debug, Clone, Default)]
pub struct QuoteFilter {
    pub quote_id: Option<Uuid>,
    /// Case-insensitive substring match on the customer name.
    pub customer_name: Option<String>,
    /// Window on the quote's creation date.
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// Optional narrowing criteria for leave-request selection.
#[derive(Debug, Clone, Default)]
pub struct LeaveFilter {
    pub request_id: Option<Uuid>,
    /// Case-insensitive substring match on the employee name.
    pub employee_name: Option<String>,
    /// Window on the leave start date.
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

// ===== Quotes =====

/// Insert a new quote.
pub fn insert_quote(conn: &Connection, quote: &Quote) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO quotes (id, organization_id, customer_id, amount_cents, status,
                             valid_until, followed_up_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            quote.id.to_string(),
            quote.organization_id.0.to_string(),
            quote.customer_id.to_string(),
            quote.amount.0,
            quote.status.to_string(),
            quote.valid_until.map(|d| d.to_string()),
            quote.followed_up_at.map(|t| t.0),
            quote.created_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert quote: {}", e)))?;
    Ok(())
}

/// Fetch a quote by id, scoped to the organization.
pub fn get_quote(conn: &Connection, organization_id: OrgId, id: Uuid) -> Result<Option<Quote>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, customer_id, amount_cents, status,
                    valid_until, followed_up_at, created_at
             FROM quotes WHERE id = ?1 AND organization_id = ?2",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![id.to_string(), organization_id.0.to_string()],
            |row| Ok(row_to_quote(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(quote) => Ok(Some(quote?)),
        None => Ok(None),
    }
}

/// List quotes still awaiting a decision (pending or sent), filtered.
pub fn list_awaiting_quotes(
    conn: &Connection,
    organization_id: OrgId,
    filter: &QuoteFilter,
) -> Result<Vec<Quote>, OpsError> {
    let mut sql = String::from(
        "SELECT q.id, q.organization_id, q.customer_id, q.amount_cents, q.status,
                q.valid_until, q.followed_up_at, q.created_at
         FROM quotes q
         JOIN customers c ON c.id = q.customer_id
         WHERE q.organization_id = ?1
           AND q.status IN ('pending', 'sent')",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(organization_id.0.to_string())];

    if let Some(id) = filter.quote_id {
        params_vec.push(Box::new(id.to_string()));
        sql.push_str(&format!(" AND q.id = ?{}", params_vec.len()));
    }
    if let Some(name) = &filter.customer_name {
        params_vec.push(Box::new(name.to_lowercase()));
        sql.push_str(&format!(
            " AND LOWER(c.name) LIKE '%' || ?{} || '%'",
            params_vec.len()
        ));
    }
    if let Some(from) = filter.from_date {
        params_vec.push(Box::new(from.to_string()));
        sql.push_str(&format!(
            " AND date(q.created_at, 'unixepoch') >= ?{}",
            params_vec.len()
        ));
    }
    if let Some(to) = filter.to_date {
        params_vec.push(Box::new(to.to_string()));
        sql.push_str(&format!(
            " AND date(q.created_at, 'unixepoch') <= ?{}",
            params_vec.len()
        ));
    }
    sql.push_str(" ORDER BY q.created_at ASC");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), |row| Ok(row_to_quote(row)))
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut quotes = Vec::new();
    for row in rows {
        let quote = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        quotes.push(quote);
    }
    Ok(quotes)
}

/// Stamp the follow-up time on a quote still awaiting a decision.
///
/// Returns false when the quote is missing or already decided.
pub fn mark_quote_followed_up(
    conn: &Connection,
    quote_id: Uuid,
    at: Timestamp,
) -> Result<bool, OpsError> {
    let changed = conn
        .execute(
            "UPDATE quotes SET followed_up_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'sent')",
            rusqlite::params![quote_id.to_string(), at.0],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to mark quote followed up: {}", e)))?;
    Ok(changed == 1)
}

// ===== Leave requests =====

/// Insert a new leave request.
pub fn insert_leave_request(conn: &Connection, request: &LeaveRequest) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO leave_requests (id, organization_id, employee_name, start_date, end_date,
                                     status, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            request.id.to_string(),
            request.organization_id.0.to_string(),
            request.employee_name,
            request.start_date.to_string(),
            request.end_date.to_string(),
            request.status.to_string(),
            request.reason,
            request.created_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert leave request: {}", e)))?;
    Ok(())
}

/// Fetch a leave request by id, scoped to the organization.
pub fn get_leave_request(
    conn: &Connection,
    organization_id: OrgId,
    id: Uuid,
) -> Result<Option<LeaveRequest>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, employee_name, start_date, end_date, status, reason, created_at
             FROM leave_requests WHERE id = ?1 AND organization_id = ?2",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![id.to_string(), organization_id.0.to_string()],
            |row| Ok(row_to_leave_request(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(request) => Ok(Some(request?)),
        None => Ok(None),
    }
}

/// List pending leave requests matching the filter.
pub fn list_pending_leave(
    conn: &Connection,
    organization_id: OrgId,
    filter: &LeaveFilter,
) -> Result<Vec<LeaveRequest>, OpsError> {
    let mut sql = String::from(
        "SELECT id, organization_id, employee_name, start_date, end_date, status, reason, created_at
         FROM leave_requests
         WHERE organization_id = ?1 AND status = 'pending'",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(organization_id.0.to_string())];

    if let Some(id) = filter.request_id {
        params_vec.push(Box::new(id.to_string()));
        sql.push_str(&format!(" AND id = ?{}", params_vec.len()));
    }
    if let Some(name) = &filter.employee_name {
        params_vec.push(Box::new(name.to_lowercase()));
        sql.push_str(&format!(
            " AND LOWER(employee_name) LIKE '%' || ?{} || '%'",
            params_vec.len()
        ));
    }
    if let Some(from) = filter.from_date {
        params_vec.push(Box::new(from.to_string()));
        sql.push_str(&format!(" AND start_date >= ?{}", params_vec.len()));
    }
    if let Some(to) = filter.to_date {
        params_vec.push(Box::new(to.to_string()));
        sql.push_str(&format!(" AND start_date <= ?{}", params_vec.len()));
    }
    sql.push_str(" ORDER BY start_date ASC");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), |row| Ok(row_to_leave_request(row)))
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut requests = Vec::new();
    for row in rows {
        let request = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        requests.push(request);
    }
    Ok(requests)
}

/// Decide a pending leave request. Guarded so a request is decided once;
/// returns false when it was not pending.
pub fn set_leave_status(
    conn: &Connection,
    request_id: Uuid,
    status: LeaveStatus,
) -> Result<bool, OpsError> {
    let changed = conn
        .execute(
            "UPDATE leave_requests SET status = ?2 WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![request_id.to_string(), status.to_string()],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to set leave status: {}", e)))?;
    Ok(changed == 1)
}

// ===== Budget lines =====

/// Insert a budget line, or replace the amount if the category exists.
pub fn upsert_budget_line(conn: &Connection, line: &BudgetLine) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO budget_lines (id, organization_id, category, amount_cents, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (organization_id, category) DO UPDATE SET
             amount_cents = excluded.amount_cents,
             updated_at = excluded.updated_at",
        rusqlite::params![
            line.id.to_string(),
            line.organization_id.0.to_string(),
            line.category,
            line.amount.0,
            line.updated_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to upsert budget line: {}", e)))?;
    Ok(())
}

/// Find a budget line by category, case-insensitively.
pub fn find_budget_line(
    conn: &Connection,
    organization_id: OrgId,
    category: &str,
) -> Result<Option<BudgetLine>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, category, amount_cents, updated_at
             FROM budget_lines
             WHERE organization_id = ?1 AND category = ?2 COLLATE NOCASE",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![organization_id.0.to_string(), category],
            |row| Ok(row_to_budget_line(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(line) => Ok(Some(line?)),
        None => Ok(None),
    }
}

/// Set a budget line's amount.
pub fn set_budget_amount(
    conn: &Connection,
    line_id: Uuid,
    amount: Money,
    updated_at: Timestamp,
) -> Result<(), OpsError> {
    let changed = conn
        .execute(
            "UPDATE budget_lines SET amount_cents = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![line_id.to_string(), amount.0, updated_at.0],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to set budget amount: {}", e)))?;
    if changed == 0 {
        return Err(OpsError::Storage(format!(
            "Budget line not found: {}",
            line_id
        )));
    }
    Ok(())
}

/// All budget lines for the organization, alphabetical by category.
pub fn list_budget_lines(conn: &Connection, organization_id: OrgId) -> Result<Vec<BudgetLine>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, category, amount_cents, updated_at
             FROM budget_lines WHERE organization_id = ?1
             ORDER BY category ASC",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(rusqlite::params![organization_id.0.to_string()], |row| {
            Ok(row_to_budget_line(row))
        })
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut lines = Vec::new();
    for row in rows {
        let line = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        lines.push(line);
    }
    Ok(lines)
}

// ===== Row mapping =====

fn row_to_quote(row: &rusqlite::Row<'_>) -> Result<Quote, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let customer_str: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let amount_cents: i64 = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let status_str: String = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;
    let valid_until: Option<String> = row.get(5).map_err(|e| OpsError::Storage(e.to_string()))?;
    let followed_up_at: Option<i64> = row.get(6).map_err(|e| OpsError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(7).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(Quote {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        customer_id: parse_uuid(&customer_str)?,
        amount: Money(amount_cents),
        status: status_str.parse::<QuoteStatus>().map_err(OpsError::Storage)?,
        valid_until: valid_until.map(|d| parse_date(&d)).transpose()?,
        followed_up_at: followed_up_at.map(Timestamp),
        created_at: Timestamp(created_at),
    })
}

fn row_to_leave_request(row: &rusqlite::Row<'_>) -> Result<LeaveRequest, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let employee_name: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let start_str: String = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let end_str: String = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;
    let status_str: String = row.get(5).map_err(|e| OpsError::Storage(e.to_string()))?;
    let reason: Option<String> = row.get(6).map_err(|e| OpsError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(7).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(LeaveRequest {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        employee_name,
        start_date: parse_date(&start_str)?,
        end_date: parse_date(&end_str)?,
        status: status_str.parse::<LeaveStatus>().map_err(OpsError::Storage)?,
        reason,
        created_at: Timestamp(created_at),
    })
}

fn row_to_budget_line(row: &rusqlite::Row<'_>) -> Result<BudgetLine, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let category: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let amount_cents: i64 = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let updated_at: i64 = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(BudgetLine {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        category,
        amount: Money(amount_cents),
        updated_at: Timestamp(updated_at),
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, OpsError> {
    Uuid::parse_str(s).map_err(|e| OpsError::Storage(format!("Invalid UUID: {}", e)))
}

fn parse_date(s: &str) -> Result<NaiveDate, OpsError> {
    s.parse::<NaiveDate>()
        .map_err(|e| OpsError::Storage(format!("Invalid date: {}", e)))
}
