//! Billing queries: customers, invoices, invoice items, payments.
//!
//! All functions take a plain `&Connection` so they compose inside a
//! caller-managed transaction (`rusqlite::Transaction` derefs to
//! `Connection`). Every lookup is scoped to one organization.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use opsmith_core::error::OpsError;
use opsmith_core::{Money, OrgId, Timestamp};

use crate::entities::{Customer, Invoice, InvoiceItem, InvoiceStatus, Payment, PaymentAllocation};

/// Optional narrowing criteria for invoice selection.
///
/// All fields are ANDed; an empty filter matches every candidate row.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub invoice_id: Option<Uuid>,
    /// Case-insensitive substring match on the customer name.
    pub customer_name: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

// ===== Customers =====

/// Insert a new customer.
pub fn insert_customer(conn: &Connection, customer: &Customer) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO customers (id, organization_id, name, email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            customer.id.to_string(),
            customer.organization_id.0.to_string(),
            customer.name,
            customer.email,
            customer.created_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert customer: {}", e)))?;
    Ok(())
}

/// Fetch a customer by id, scoped to the organization.
pub fn get_customer(
    conn: &Connection,
    organization_id: OrgId,
    id: Uuid,
) -> Result<Option<Customer>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, name, email, created_at
             FROM customers WHERE id = ?1 AND organization_id = ?2",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![id.to_string(), organization_id.0.to_string()],
            |row| Ok(row_to_customer(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(customer) => Ok(Some(customer?)),
        None => Ok(None),
    }
}

/// Find a customer by exact name, case-insensitively.
pub fn find_customer_by_name(
    conn: &Connection,
    organization_id: OrgId,
    name: &str,
) -> Result<Option<Customer>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, name, email, created_at
             FROM customers
             WHERE organization_id = ?1 AND name = ?2 COLLATE NOCASE
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![organization_id.0.to_string(), name],
            |row| Ok(row_to_customer(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(customer) => Ok(Some(customer?)),
        None => Ok(None),
    }
}

// ===== Invoices =====

/// Insert a new invoice.
pub fn insert_invoice(conn: &Connection, invoice: &Invoice) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO invoices (id, organization_id, customer_id, number, status, due_date,
                               total_cents, outstanding_cents, reminder_sent_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            invoice.id.to_string(),
            invoice.organization_id.0.to_string(),
            invoice.customer_id.to_string(),
            invoice.number,
            invoice.status.to_string(),
            invoice.due_date.map(|d| d.to_string()),
            invoice.total.0,
            invoice.outstanding.0,
            invoice.reminder_sent_at.map(|t| t.0),
            invoice.created_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert invoice: {}", e)))?;
    Ok(())
}

/// Insert an invoice line item.
pub fn insert_invoice_item(conn: &Connection, item: &InvoiceItem) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO invoice_items (id, invoice_id, description, quantity, unit_price_cents)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            item.id.to_string(),
            item.invoice_id.to_string(),
            item.description,
            item.quantity,
            item.unit_price.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert invoice item: {}", e)))?;
    Ok(())
}

/// Fetch an invoice by id, scoped to the organization.
pub fn get_invoice(
    conn: &Connection,
    organization_id: OrgId,
    id: Uuid,
) -> Result<Option<Invoice>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, customer_id, number, status, due_date,
                    total_cents, outstanding_cents, reminder_sent_at, created_at
             FROM invoices WHERE id = ?1 AND organization_id = ?2",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![id.to_string(), organization_id.0.to_string()],
            |row| Ok(row_to_invoice(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(invoice) => Ok(Some(invoice?)),
        None => Ok(None),
    }
}

/// List the line items of an invoice.
pub fn list_invoice_items(conn: &Connection, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, invoice_id, description, quantity, unit_price_cents
             FROM invoice_items WHERE invoice_id = ?1",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(rusqlite::params![invoice_id.to_string()], |row| {
            Ok(row_to_invoice_item(row))
        })
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut items = Vec::new();
    for row in rows {
        let item = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        items.push(item);
    }
    Ok(items)
}

/// Next sequential invoice number for the organization (INV-0001, ...).
pub fn next_invoice_number(conn: &Connection, organization_id: OrgId) -> Result<String, OpsError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM invoices WHERE organization_id = ?1",
            rusqlite::params![organization_id.0.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;
    Ok(format!("INV-{:04}", count + 1))
}

/// List open invoices (sent or overdue, outstanding > 0) matching the filter.
pub fn list_open_invoices(
    conn: &Connection,
    organization_id: OrgId,
    filter: &InvoiceFilter,
) -> Result<Vec<Invoice>, OpsError> {
    let mut sql = String::from(
        "SELECT i.id, i.organization_id, i.customer_id, i.number, i.status, i.due_date,
                i.total_cents, i.outstanding_cents, i.reminder_sent_at, i.created_at
         FROM invoices i
         JOIN customers c ON c.id = i.customer_id
         WHERE i.organization_id = ?1
           AND i.status IN ('sent', 'overdue')
           AND i.outstanding_cents > 0",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(organization_id.0.to_string())];

    if let Some(id) = filter.invoice_id {
        params_vec.push(Box::new(id.to_string()));
        sql.push_str(&format!(" AND i.id = ?{}", params_vec.len()));
    }
    if let Some(name) = &filter.customer_name {
        params_vec.push(Box::new(name.to_lowercase()));
        sql.push_str(&format!(
            " AND LOWER(c.name) LIKE '%' || ?{} || '%'",
            params_vec.len()
        ));
    }
    if let Some(from) = filter.due_from {
        params_vec.push(Box::new(from.to_string()));
        sql.push_str(&format!(" AND i.due_date >= ?{}", params_vec.len()));
    }
    if let Some(to) = filter.due_to {
        params_vec.push(Box::new(to.to_string()));
        sql.push_str(&format!(" AND i.due_date <= ?{}", params_vec.len()));
    }
    sql.push_str(" ORDER BY i.created_at DESC");

    query_invoices(conn, &sql, &params_vec)
}

/// List overdue unpaid invoices (due before `today`) matching the filter.
pub fn list_overdue_invoices(
    conn: &Connection,
    organization_id: OrgId,
    filter: &InvoiceFilter,
    today: NaiveDate,
) -> Result<Vec<Invoice>, OpsError> {
    let mut sql = String::from(
        "SELECT i.id, i.organization_id, i.customer_id, i.number, i.status, i.due_date,
                i.total_cents, i.outstanding_cents, i.reminder_sent_at, i.created_at
         FROM invoices i
         JOIN customers c ON c.id = i.customer_id
         WHERE i.organization_id = ?1
           AND i.status IN ('sent', 'overdue')
           AND i.outstanding_cents > 0
           AND i.due_date IS NOT NULL
           AND i.due_date < ?2",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
        Box::new(organization_id.0.to_string()),
        Box::new(today.to_string()),
    ];

    if let Some(id) = filter.invoice_id {
        params_vec.push(Box::new(id.to_string()));
        sql.push_str(&format!(" AND i.id = ?{}", params_vec.len()));
    }
    if let Some(name) = &filter.customer_name {
        params_vec.push(Box::new(name.to_lowercase()));
        sql.push_str(&format!(
            " AND LOWER(c.name) LIKE '%' || ?{} || '%'",
            params_vec.len()
        ));
    }
    if let Some(from) = filter.due_from {
        params_vec.push(Box::new(from.to_string()));
        sql.push_str(&format!(" AND i.due_date >= ?{}", params_vec.len()));
    }
    if let Some(to) = filter.due_to {
        params_vec.push(Box::new(to.to_string()));
        sql.push_str(&format!(" AND i.due_date <= ?{}", params_vec.len()));
    }
    sql.push_str(" ORDER BY i.due_date ASC");

    query_invoices(conn, &sql, &params_vec)
}

/// Reduce an invoice's outstanding balance by the applied amount.
///
/// The decrement happens SQL-side against the stored value; the status
/// flips to paid when the remainder reaches zero. Outstanding never goes
/// below zero (callers clamp, the MAX is a floor for the stored value).
pub fn settle_invoice(conn: &Connection, invoice_id: Uuid, applied: Money) -> Result<(), OpsError> {
    let changed = conn
        .execute(
            "UPDATE invoices
             SET outstanding_cents = MAX(outstanding_cents - ?2, 0),
                 status = CASE WHEN outstanding_cents - ?2 <= 0 THEN 'paid' ELSE status END
             WHERE id = ?1",
            rusqlite::params![invoice_id.to_string(), applied.0],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to settle invoice: {}", e)))?;
    if changed == 0 {
        return Err(OpsError::Storage(format!(
            "Invoice not found: {}",
            invoice_id
        )));
    }
    Ok(())
}

/// Stamp the reminder-sent time on an invoice.
pub fn mark_reminder_sent(
    conn: &Connection,
    invoice_id: Uuid,
    at: Timestamp,
) -> Result<(), OpsError> {
    conn.execute(
        "UPDATE invoices SET reminder_sent_at = ?2 WHERE id = ?1",
        rusqlite::params![invoice_id.to_string(), at.0],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to mark reminder sent: {}", e)))?;
    Ok(())
}

/// Flag a sent invoice as overdue. No-op unless currently sent.
pub fn mark_invoice_overdue(conn: &Connection, invoice_id: Uuid) -> Result<bool, OpsError> {
    let changed = conn
        .execute(
            "UPDATE invoices SET status = 'overdue' WHERE id = ?1 AND status = 'sent'",
            rusqlite::params![invoice_id.to_string()],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to mark invoice overdue: {}", e)))?;
    Ok(changed == 1)
}

// ===== Payments =====

/// Insert a payment record.
pub fn insert_payment(conn: &Connection, payment: &Payment) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO payments (id, organization_id, amount_cents, method, received_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            payment.id.to_string(),
            payment.organization_id.0.to_string(),
            payment.amount.0,
            payment.method,
            payment.received_date.to_string(),
            payment.created_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert payment: {}", e)))?;
    Ok(())
}

/// Insert a payment-to-invoice allocation.
pub fn insert_allocation(conn: &Connection, allocation: &PaymentAllocation) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO payment_allocations (id, payment_id, invoice_id, amount_cents)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            allocation.id.to_string(),
            allocation.payment_id.to_string(),
            allocation.invoice_id.to_string(),
            allocation.amount.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert allocation: {}", e)))?;
    Ok(())
}

/// Total payments received in the date range (inclusive).
pub fn sum_payments_in_range(
    conn: &Connection,
    organization_id: OrgId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Money, OpsError> {
    let cents: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments
             WHERE organization_id = ?1 AND received_date >= ?2 AND received_date <= ?3",
            rusqlite::params![
                organization_id.0.to_string(),
                from.to_string(),
                to.to_string()
            ],
            |row| row.get(0),
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;
    Ok(Money(cents))
}

/// Total invoiced (non-cancelled) in the date range, by issue date.
pub fn sum_invoiced_in_range(
    conn: &Connection,
    organization_id: OrgId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Money, OpsError> {
    let cents: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(total_cents), 0) FROM invoices
             WHERE organization_id = ?1
               AND status != 'cancelled'
               AND date(created_at, 'unixepoch') >= ?2
               AND date(created_at, 'unixepoch') <= ?3",
            rusqlite::params![
                organization_id.0.to_string(),
                from.to_string(),
                to.to_string()
            ],
            |row| row.get(0),
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;
    Ok(Money(cents))
}

// ===== Row mapping =====

fn query_invoices(
    conn: &Connection,
    sql: &str,
    params_vec: &[Box<dyn rusqlite::types::ToSql>],
) -> Result<Vec<Invoice>, OpsError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), |row| Ok(row_to_invoice(row)))
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut invoices = Vec::new();
    for row in rows {
        let invoice = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        invoices.push(invoice);
    }
    Ok(invoices)
}

fn row_to_customer(row: &rusqlite::Row<'_>) -> Result<Customer, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let name: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let email: Option<String> = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(Customer {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        name,
        email,
        created_at: Timestamp(created_at),
    })
}

fn row_to_invoice(row: &rusqlite::Row<'_>) -> Result<Invoice, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let customer_str: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let number: String = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let status_str: String = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;
    let due_date: Option<String> = row.get(5).map_err(|e| OpsError::Storage(e.to_string()))?;
    let total_cents: i64 = row.get(6).map_err(|e| OpsError::Storage(e.to_string()))?;
    let outstanding_cents: i64 = row.get(7).map_err(|e| OpsError::Storage(e.to_string()))?;
    let reminder_sent_at: Option<i64> = row.get(8).map_err(|e| OpsError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(9).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(Invoice {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        customer_id: parse_uuid(&customer_str)?,
        number,
        status: status_str
            .parse::<InvoiceStatus>()
            .map_err(OpsError::Storage)?,
        due_date: due_date.map(|d| parse_date(&d)).transpose()?,
        total: Money(total_cents),
        outstanding: Money(outstanding_cents),
        reminder_sent_at: reminder_sent_at.map(Timestamp),
        created_at: Timestamp(created_at),
    })
}

fn row_to_invoice_item(row: &rusqlite::Row<'_>) -> Result<InvoiceItem, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let invoice_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let description: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let quantity: f64 = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let unit_price_cents: i64 = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(InvoiceItem {
        id: parse_uuid(&id_str)?,
        invoice_id: parse_uuid(&invoice_str)?,
        description,
        quantity,
        unit_price: Money(unit_price_cents),
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, OpsError> {
    Uuid::parse_str(s).map_err(|e| OpsError::Storage(format!("Invalid UUID: {}", e)))
}

fn parse_date(s: &str) -> Result<NaiveDate, OpsError> {
    s.parse::<NaiveDate>()
        .map_err(|e| OpsError::Storage(format!("Invalid date: {}", e)))
}
