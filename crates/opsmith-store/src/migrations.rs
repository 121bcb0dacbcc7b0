//! Database schema migrations.
//!
//! Applies the initial schema including the billing tables (customers,
//! invoices, payments), the money ledger (accounts, movements), the
//! back-office tables (quotes, leave requests, budget lines), the
//! action_invocations table, and schema_migrations.

use rusqlite::Connection;
use tracing::info;

use opsmith_core::error::OpsError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), OpsError> {
    // Create the migrations tracking table first.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| OpsError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| OpsError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), OpsError> {
    conn.execute_batch(
        "
        -- Customers table.
        CREATE TABLE IF NOT EXISTS customers (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            email           TEXT,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_customers_org
            ON customers (organization_id, name);

        -- Invoices table. outstanding_cents tracks the unpaid remainder.
        CREATE TABLE IF NOT EXISTS invoices (
            id                TEXT PRIMARY KEY NOT NULL,
            organization_id   TEXT NOT NULL,
            customer_id       TEXT NOT NULL,
            number            TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'draft'
                              CHECK (status IN ('draft', 'sent', 'overdue', 'paid', 'cancelled')),
            due_date          TEXT,
            total_cents       INTEGER NOT NULL DEFAULT 0,
            outstanding_cents INTEGER NOT NULL DEFAULT 0,
            reminder_sent_at  INTEGER,
            created_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_invoices_org_number
            ON invoices (organization_id, number);

        CREATE INDEX IF NOT EXISTS idx_invoices_org_status
            ON invoices (organization_id, status, created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_invoices_customer
            ON invoices (customer_id);

        -- Invoice line items.
        CREATE TABLE IF NOT EXISTS invoice_items (
            id               TEXT PRIMARY KEY NOT NULL,
            invoice_id       TEXT NOT NULL,
            description      TEXT NOT NULL,
            quantity         REAL NOT NULL DEFAULT 1.0,
            unit_price_cents INTEGER NOT NULL,
            FOREIGN KEY (invoice_id) REFERENCES invoices(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_invoice_items_invoice
            ON invoice_items (invoice_id);

        -- Payments table.
        CREATE TABLE IF NOT EXISTS payments (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            amount_cents    INTEGER NOT NULL,
            method          TEXT,
            received_date   TEXT NOT NULL,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_payments_org
            ON payments (organization_id, received_date DESC);

        -- Payment allocations against invoices.
        CREATE TABLE IF NOT EXISTS payment_allocations (
            id           TEXT PRIMARY KEY NOT NULL,
            payment_id   TEXT NOT NULL,
            invoice_id   TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            FOREIGN KEY (payment_id) REFERENCES payments(id) ON DELETE CASCADE,
            FOREIGN KEY (invoice_id) REFERENCES invoices(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_payment_allocations_invoice
            ON payment_allocations (invoice_id);

        -- Money accounts. balance_cents is only ever mutated by relative
        -- SQL updates so concurrent writers cannot clobber each other.
        CREATE TABLE IF NOT EXISTS money_accounts (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            balance_cents   INTEGER NOT NULL DEFAULT 0,
            is_default      INTEGER NOT NULL DEFAULT 0,
            active          INTEGER NOT NULL DEFAULT 1,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_money_accounts_org
            ON money_accounts (organization_id, active);

        -- Money movements (the ledger).
        CREATE TABLE IF NOT EXISTS money_movements (
            id                  TEXT PRIMARY KEY NOT NULL,
            organization_id     TEXT NOT NULL,
            flow_type           TEXT NOT NULL
                                CHECK (flow_type IN ('income', 'expense')),
            amount_cents        INTEGER NOT NULL,
            category            TEXT,
            description         TEXT NOT NULL DEFAULT '',
            date                TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'completed'
                                CHECK (status IN ('pending', 'completed', 'reversed')),
            from_account_id     TEXT,
            to_account_id       TEXT,
            fingerprint         TEXT,
            fingerprint_version INTEGER,
            created_at          INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_movements_org_date
            ON money_movements (organization_id, date DESC);

        CREATE INDEX IF NOT EXISTS idx_movements_dedup
            ON money_movements (organization_id, amount_cents, date);

        CREATE INDEX IF NOT EXISTS idx_movements_fingerprint
            ON money_movements (fingerprint)
            WHERE fingerprint IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_movements_category
            ON money_movements (organization_id, category)
            WHERE category IS NOT NULL;

        -- Quotes table.
        CREATE TABLE IF NOT EXISTS quotes (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            customer_id     TEXT NOT NULL,
            amount_cents    INTEGER NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'sent', 'accepted', 'declined', 'expired')),
            valid_until     TEXT,
            followed_up_at  INTEGER,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_quotes_org_status
            ON quotes (organization_id, status, created_at DESC);

        -- Leave requests table.
        CREATE TABLE IF NOT EXISTS leave_requests (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            employee_name   TEXT NOT NULL,
            start_date      TEXT NOT NULL,
            end_date        TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'approved', 'denied')),
            reason          TEXT,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_leave_requests_org_status
            ON leave_requests (organization_id, status, start_date ASC);

        -- Budget lines, one row per category per organization.
        CREATE TABLE IF NOT EXISTS budget_lines (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            category        TEXT NOT NULL,
            amount_cents    INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_budget_lines_org_category
            ON budget_lines (organization_id, category);

        -- Action invocations (pending confirmations and execution records).
        CREATE TABLE IF NOT EXISTS action_invocations (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            action_type     TEXT NOT NULL,
            state           TEXT NOT NULL DEFAULT 'pending'
                            CHECK (state IN ('pending', 'confirmed', 'executed', 'cancelled', 'expired')),
            parameters      TEXT NOT NULL DEFAULT '{}',
            result          TEXT,
            created_at      INTEGER NOT NULL,
            expires_at      INTEGER NOT NULL,
            executed_at     INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_invocations_state_expiry
            ON action_invocations (state, expires_at ASC);

        CREATE INDEX IF NOT EXISTS idx_invocations_org
            ON action_invocations (organization_id, created_at DESC);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| OpsError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
