//! Ledger queries: money accounts and movements.
//!
//! This module is the only code that mutates account balances. Every
//! balance change goes through `apply_balance_delta`, which increments
//! the stored value SQL-side; callers never read-modify-write a balance.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use opsmith_core::error::OpsError;
use opsmith_core::{FlowType, Money, OrgId, Timestamp};

use crate::entities::{MoneyAccount, MoneyMovement, MovementStatus};

/// One day's total for one flow direction, for report bucketing.
#[derive(Debug, Clone)]
pub struct DayFlow {
    pub date: NaiveDate,
    pub flow_type: FlowType,
    pub total: Money,
}

// ===== Accounts =====

/// Insert a new money account.
pub fn insert_account(conn: &Connection, account: &MoneyAccount) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO money_accounts (id, organization_id, name, balance_cents, is_default, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            account.id.to_string(),
            account.organization_id.0.to_string(),
            account.name,
            account.balance.0,
            account.is_default as i32,
            account.active as i32,
            account.created_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert account: {}", e)))?;
    Ok(())
}

/// Fetch an account by id, scoped to the organization.
pub fn get_account(
    conn: &Connection,
    organization_id: OrgId,
    id: Uuid,
) -> Result<Option<MoneyAccount>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, name, balance_cents, is_default, active, created_at
             FROM money_accounts WHERE id = ?1 AND organization_id = ?2",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![id.to_string(), organization_id.0.to_string()],
            |row| Ok(row_to_account(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(account) => Ok(Some(account?)),
        None => Ok(None),
    }
}

/// The organization's default active account, if any.
///
/// Prefers the account flagged default; falls back to the oldest active one.
pub fn default_account(
    conn: &Connection,
    organization_id: OrgId,
) -> Result<Option<MoneyAccount>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, name, balance_cents, is_default, active, created_at
             FROM money_accounts
             WHERE organization_id = ?1 AND active = 1
             ORDER BY is_default DESC, created_at ASC
             LIMIT 1",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(rusqlite::params![organization_id.0.to_string()], |row| {
            Ok(row_to_account(row))
        })
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(account) => Ok(Some(account?)),
        None => Ok(None),
    }
}

/// Apply a signed delta to an account balance.
///
/// The increment happens inside SQLite against the stored value, so
/// concurrent writers serialize on the database write lock instead of
/// clobbering each other.
pub fn apply_balance_delta(conn: &Connection, account_id: Uuid, delta: Money) -> Result<(), OpsError> {
    let changed = conn
        .execute(
            "UPDATE money_accounts SET balance_cents = balance_cents + ?2 WHERE id = ?1",
            rusqlite::params![account_id.to_string(), delta.0],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to update balance: {}", e)))?;
    if changed == 0 {
        return Err(OpsError::Storage(format!(
            "Account not found: {}",
            account_id
        )));
    }
    Ok(())
}

// ===== Movements =====

/// Insert a ledger movement. Does not touch balances.
pub fn insert_movement(conn: &Connection, movement: &MoneyMovement) -> Result<(), OpsError> {
    conn.execute(
        "INSERT INTO money_movements (id, organization_id, flow_type, amount_cents, category,
                                      description, date, status, from_account_id, to_account_id,
                                      fingerprint, fingerprint_version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            movement.id.to_string(),
            movement.organization_id.0.to_string(),
            movement.flow_type.to_string(),
            movement.amount.0,
            movement.category,
            movement.description,
            movement.date.to_string(),
            movement.status.to_string(),
            movement.from_account_id.map(|id| id.to_string()),
            movement.to_account_id.map(|id| id.to_string()),
            movement.fingerprint,
            movement.fingerprint_version,
            movement.created_at.0,
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert movement: {}", e)))?;
    Ok(())
}

/// Fetch a movement by id, scoped to the organization.
pub fn get_movement(
    conn: &Connection,
    organization_id: OrgId,
    id: Uuid,
) -> Result<Option<MoneyMovement>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, flow_type, amount_cents, category, description, date,
                    status, from_account_id, to_account_id, fingerprint, fingerprint_version, created_at
             FROM money_movements WHERE id = ?1 AND organization_id = ?2",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![id.to_string(), organization_id.0.to_string()],
            |row| Ok(row_to_movement(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(movement) => Ok(Some(movement?)),
        None => Ok(None),
    }
}

/// List completed movements with dates in the inclusive range.
pub fn list_movements_in_range(
    conn: &Connection,
    organization_id: OrgId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<MoneyMovement>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, flow_type, amount_cents, category, description, date,
                    status, from_account_id, to_account_id, fingerprint, fingerprint_version, created_at
             FROM money_movements
             WHERE organization_id = ?1 AND status = 'completed' AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, created_at ASC",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(
            rusqlite::params![
                organization_id.0.to_string(),
                from.to_string(),
                to.to_string()
            ],
            |row| Ok(row_to_movement(row)),
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut movements = Vec::new();
    for row in rows {
        let movement = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        movements.push(movement);
    }
    Ok(movements)
}

/// List completed movements in the range that have no category yet.
pub fn list_uncategorized_in_range(
    conn: &Connection,
    organization_id: OrgId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<MoneyMovement>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, flow_type, amount_cents, category, description, date,
                    status, from_account_id, to_account_id, fingerprint, fingerprint_version, created_at
             FROM money_movements
             WHERE organization_id = ?1 AND status = 'completed'
               AND category IS NULL AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, created_at ASC",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(
            rusqlite::params![
                organization_id.0.to_string(),
                from.to_string(),
                to.to_string()
            ],
            |row| Ok(row_to_movement(row)),
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut movements = Vec::new();
    for row in rows {
        let movement = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        movements.push(movement);
    }
    Ok(movements)
}

/// Set the category on a movement.
pub fn set_movement_category(
    conn: &Connection,
    movement_id: Uuid,
    category: &str,
) -> Result<(), OpsError> {
    let changed = conn
        .execute(
            "UPDATE money_movements SET category = ?2 WHERE id = ?1",
            rusqlite::params![movement_id.to_string(), category],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to set category: {}", e)))?;
    if changed == 0 {
        return Err(OpsError::Storage(format!(
            "Movement not found: {}",
            movement_id
        )));
    }
    Ok(())
}

/// Reverse a completed movement and undo its balance effect.
///
/// Flips status completed -> reversed with a guarded update, then applies
/// the exact opposite delta to the account the movement recorded. Returns
/// the movement as it was, or None when no completed movement matched
/// (missing id or already reversed).
pub fn reverse_movement(
    conn: &Connection,
    organization_id: OrgId,
    movement_id: Uuid,
) -> Result<Option<MoneyMovement>, OpsError> {
    let movement = match get_movement(conn, organization_id, movement_id)? {
        Some(m) => m,
        None => return Ok(None),
    };

    let claimed = conn
        .execute(
            "UPDATE money_movements SET status = 'reversed'
             WHERE id = ?1 AND organization_id = ?2 AND status = 'completed'",
            rusqlite::params![movement_id.to_string(), organization_id.0.to_string()],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to reverse movement: {}", e)))?;
    if claimed == 0 {
        return Ok(None);
    }

    if let Some(account_id) = movement.account_id() {
        apply_balance_delta(conn, account_id, -movement.signed_amount())?;
    }
    Ok(Some(movement))
}

/// Probe for an already-persisted duplicate of an incoming row.
///
/// Candidates share the organization, exact amount, and calendar date
/// (served by the dedup index); among those, descriptions match fuzzily:
/// lowercase, trimmed, and compared by prefix containment in either
/// direction. Reversed movements never count as duplicates.
pub fn find_duplicate_movement(
    conn: &Connection,
    organization_id: OrgId,
    amount: Money,
    date: NaiveDate,
    description: &str,
    fuzzy_prefix_len: usize,
) -> Result<Option<Uuid>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, description FROM money_movements
             WHERE organization_id = ?1 AND amount_cents = ?2 AND date = ?3
               AND status != 'reversed'",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(
            rusqlite::params![
                organization_id.0.to_string(),
                amount.0,
                date.to_string()
            ],
            |row| {
                let id: String = row.get(0)?;
                let description: String = row.get(1)?;
                Ok((id, description))
            },
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let incoming = description.trim().to_lowercase();
    let incoming_prefix: String = incoming.chars().take(fuzzy_prefix_len).collect();

    for row in rows {
        let (id_str, stored) = row.map_err(|e| OpsError::Storage(e.to_string()))?;
        let stored = stored.trim().to_lowercase();
        let stored_prefix: String = stored.chars().take(fuzzy_prefix_len).collect();

        let matched = (!incoming_prefix.is_empty() && stored.contains(&incoming_prefix))
            || (!stored_prefix.is_empty() && incoming.contains(&stored_prefix));
        if matched {
            return Ok(Some(parse_uuid(&id_str)?));
        }
    }
    Ok(None)
}

// ===== Aggregations =====

/// Sum of completed movements for one flow direction in the range.
pub fn sum_flow_in_range(
    conn: &Connection,
    organization_id: OrgId,
    flow_type: FlowType,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Money, OpsError> {
    let cents: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM money_movements
             WHERE organization_id = ?1 AND flow_type = ?2 AND status = 'completed'
               AND date >= ?3 AND date <= ?4",
            rusqlite::params![
                organization_id.0.to_string(),
                flow_type.to_string(),
                from.to_string(),
                to.to_string()
            ],
            |row| row.get(0),
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;
    Ok(Money(cents))
}

/// Per-category totals for one flow direction, largest first.
///
/// Uncategorized movements land in the "uncategorized" bucket.
pub fn category_totals_in_range(
    conn: &Connection,
    organization_id: OrgId,
    flow_type: FlowType,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<(String, Money)>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT COALESCE(category, 'uncategorized'), SUM(amount_cents)
             FROM money_movements
             WHERE organization_id = ?1 AND flow_type = ?2 AND status = 'completed'
               AND date >= ?3 AND date <= ?4
             GROUP BY COALESCE(category, 'uncategorized')
             ORDER BY SUM(amount_cents) DESC",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(
            rusqlite::params![
                organization_id.0.to_string(),
                flow_type.to_string(),
                from.to_string(),
                to.to_string()
            ],
            |row| {
                let category: String = row.get(0)?;
                let cents: i64 = row.get(1)?;
                Ok((category, Money(cents)))
            },
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut totals = Vec::new();
    for row in rows {
        let pair = row.map_err(|e| OpsError::Storage(e.to_string()))?;
        totals.push(pair);
    }
    Ok(totals)
}

/// Per-day, per-flow totals for the range, in date order.
pub fn daily_flow_in_range(
    conn: &Connection,
    organization_id: OrgId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DayFlow>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT date, flow_type, SUM(amount_cents)
             FROM money_movements
             WHERE organization_id = ?1 AND status = 'completed'
               AND date >= ?2 AND date <= ?3
             GROUP BY date, flow_type
             ORDER BY date ASC",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(
            rusqlite::params![
                organization_id.0.to_string(),
                from.to_string(),
                to.to_string()
            ],
            |row| {
                let date: String = row.get(0)?;
                let flow: String = row.get(1)?;
                let cents: i64 = row.get(2)?;
                Ok((date, flow, cents))
            },
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut days = Vec::new();
    for row in rows {
        let (date_str, flow_str, cents) = row.map_err(|e| OpsError::Storage(e.to_string()))?;
        days.push(DayFlow {
            date: parse_date(&date_str)?,
            flow_type: flow_str.parse::<FlowType>().map_err(OpsError::Storage)?,
            total: Money(cents),
        });
    }
    Ok(days)
}

// ===== Row mapping =====

fn row_to_account(row: &rusqlite::Row<'_>) -> Result<MoneyAccount, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let name: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let balance_cents: i64 = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let is_default: i32 = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;
    let active: i32 = row.get(5).map_err(|e| OpsError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(6).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(MoneyAccount {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        name,
        balance: Money(balance_cents),
        is_default: is_default != 0,
        active: active != 0,
        created_at: Timestamp(created_at),
    })
}

fn row_to_movement(row: &rusqlite::Row<'_>) -> Result<MoneyMovement, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let flow_str: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let amount_cents: i64 = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let category: Option<String> = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;
    let description: String = row.get(5).map_err(|e| OpsError::Storage(e.to_string()))?;
    let date_str: String = row.get(6).map_err(|e| OpsError::Storage(e.to_string()))?;
    let status_str: String = row.get(7).map_err(|e| OpsError::Storage(e.to_string()))?;
    let from_str: Option<String> = row.get(8).map_err(|e| OpsError::Storage(e.to_string()))?;
    let to_str: Option<String> = row.get(9).map_err(|e| OpsError::Storage(e.to_string()))?;
    let fingerprint: Option<String> = row.get(10).map_err(|e| OpsError::Storage(e.to_string()))?;
    let fingerprint_version: Option<i64> =
        row.get(11).map_err(|e| OpsError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(12).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(MoneyMovement {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        flow_type: flow_str.parse::<FlowType>().map_err(OpsError::Storage)?,
        amount: Money(amount_cents),
        category,
        description,
        date: parse_date(&date_str)?,
        status: status_str
            .parse::<MovementStatus>()
            .map_err(OpsError::Storage)?,
        from_account_id: from_str.map(|s| parse_uuid(&s)).transpose()?,
        to_account_id: to_str.map(|s| parse_uuid(&s)).transpose()?,
        fingerprint,
        fingerprint_version,
        created_at: Timestamp(created_at),
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, OpsError> {
    Uuid::parse_str(s).map_err(|e| OpsError::Storage(format!("Invalid UUID: {}", e)))
}

fn parse_date(s: &str) -> Result<NaiveDate, OpsError> {
    s.parse::<NaiveDate>()
        .map_err(|e| OpsError::Storage(format!("Invalid date: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn make_db() -> Database {
        Database::in_memory().unwrap()
    }

    fn seed_account(db: &Database, organization_id: OrgId, opening: Money) -> MoneyAccount {
        let account = MoneyAccount::new(organization_id, "Checking", opening);
        db.with_conn(|conn| insert_account(conn, &account)).unwrap();
        account
    }

    fn seed_movement(
        db: &Database,
        organization_id: OrgId,
        account_id: Uuid,
        flow_type: FlowType,
        amount: Money,
        description: &str,
        day: NaiveDate,
    ) -> MoneyMovement {
        let movement = MoneyMovement::new(
            organization_id,
            flow_type,
            amount,
            description,
            day,
            account_id,
        );
        db.with_conn(|conn| {
            insert_movement(conn, &movement)?;
            apply_balance_delta(conn, account_id, movement.signed_amount())
        })
        .unwrap();
        movement
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ---- Accounts ----

    #[test]
    fn test_account_round_trip() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::from_cents(100_000));

        let found = db
            .with_conn(|conn| get_account(conn, org, account.id))
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "Checking");
        assert_eq!(found.balance, Money::from_cents(100_000));
        assert!(found.active);
    }

    #[test]
    fn test_default_account_prefers_flagged() {
        let db = make_db();
        let org = OrgId::new();
        seed_account(&db, org, Money::ZERO);

        let mut savings = MoneyAccount::new(org, "Savings", Money::ZERO);
        savings.is_default = true;
        db.with_conn(|conn| insert_account(conn, &savings)).unwrap();

        let found = db
            .with_conn(|conn| default_account(conn, org))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, savings.id);
    }

    #[test]
    fn test_default_account_skips_inactive() {
        let db = make_db();
        let org = OrgId::new();
        let mut closed = MoneyAccount::new(org, "Closed", Money::ZERO);
        closed.active = false;
        db.with_conn(|conn| insert_account(conn, &closed)).unwrap();

        let found = db.with_conn(|conn| default_account(conn, org)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_apply_balance_delta_both_signs() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::from_cents(10_000));

        db.with_conn(|conn| apply_balance_delta(conn, account.id, Money::from_cents(2_500)))
            .unwrap();
        db.with_conn(|conn| apply_balance_delta(conn, account.id, Money::from_cents(-4_000)))
            .unwrap();

        let found = db
            .with_conn(|conn| get_account(conn, org, account.id))
            .unwrap()
            .unwrap();
        assert_eq!(found.balance, Money::from_cents(8_500));
    }

    #[test]
    fn test_apply_balance_delta_unknown_account() {
        let db = make_db();
        let result =
            db.with_conn(|conn| apply_balance_delta(conn, Uuid::new_v4(), Money::from_cents(1)));
        assert!(result.is_err());
    }

    // ---- Movements ----

    #[test]
    fn test_movement_round_trip() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);

        let mut movement = MoneyMovement::new(
            org,
            FlowType::Expense,
            Money::from_cents(4_500),
            "Office supplies",
            date(2024, 3, 15),
            account.id,
        );
        movement.category = Some("supplies".to_string());
        movement.fingerprint = Some("abc123".to_string());
        movement.fingerprint_version = Some(1);
        db.with_conn(|conn| insert_movement(conn, &movement)).unwrap();

        let found = db
            .with_conn(|conn| get_movement(conn, org, movement.id))
            .unwrap()
            .unwrap();
        assert_eq!(found.flow_type, FlowType::Expense);
        assert_eq!(found.amount, Money::from_cents(4_500));
        assert_eq!(found.category.as_deref(), Some("supplies"));
        assert_eq!(found.date, date(2024, 3, 15));
        assert_eq!(found.from_account_id, Some(account.id));
        assert_eq!(found.to_account_id, None);
        assert_eq!(found.fingerprint.as_deref(), Some("abc123"));
        assert_eq!(found.fingerprint_version, Some(1));
    }

    #[test]
    fn test_list_movements_in_range_bounds() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(100), "a", date(2024, 3, 1));
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(200), "b", date(2024, 3, 15));
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(300), "c", date(2024, 4, 1));

        let march = db
            .with_conn(|conn| list_movements_in_range(conn, org, date(2024, 3, 1), date(2024, 3, 31)))
            .unwrap();
        assert_eq!(march.len(), 2);
        assert_eq!(march[0].description, "a");
        assert_eq!(march[1].description, "b");
    }

    #[test]
    fn test_list_movements_excludes_reversed() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);
        let movement = seed_movement(
            &db, org, account.id, FlowType::Expense, Money::from_cents(100), "a", date(2024, 3, 1),
        );
        db.with_conn(|conn| reverse_movement(conn, org, movement.id))
            .unwrap();

        let listed = db
            .with_conn(|conn| list_movements_in_range(conn, org, date(2024, 3, 1), date(2024, 3, 31)))
            .unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_uncategorized_listing_and_set_category() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);
        let movement = seed_movement(
            &db, org, account.id, FlowType::Expense, Money::from_cents(100), "coffee", date(2024, 3, 1),
        );

        let before = db
            .with_conn(|conn| list_uncategorized_in_range(conn, org, date(2024, 3, 1), date(2024, 3, 31)))
            .unwrap();
        assert_eq!(before.len(), 1);

        db.with_conn(|conn| set_movement_category(conn, movement.id, "meals"))
            .unwrap();

        let after = db
            .with_conn(|conn| list_uncategorized_in_range(conn, org, date(2024, 3, 1), date(2024, 3, 31)))
            .unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn test_reverse_movement_restores_balance() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::from_cents(10_000));
        let movement = seed_movement(
            &db, org, account.id, FlowType::Expense, Money::from_cents(3_000), "rent", date(2024, 3, 1),
        );

        let after_spend = db
            .with_conn(|conn| get_account(conn, org, account.id))
            .unwrap()
            .unwrap();
        assert_eq!(after_spend.balance, Money::from_cents(7_000));

        let reversed = db
            .with_conn(|conn| reverse_movement(conn, org, movement.id))
            .unwrap();
        assert!(reversed.is_some());

        let restored = db
            .with_conn(|conn| get_account(conn, org, account.id))
            .unwrap()
            .unwrap();
        assert_eq!(restored.balance, Money::from_cents(10_000));

        // Second reversal finds no completed movement.
        let again = db
            .with_conn(|conn| reverse_movement(conn, org, movement.id))
            .unwrap();
        assert!(again.is_none());
        let unchanged = db
            .with_conn(|conn| get_account(conn, org, account.id))
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.balance, Money::from_cents(10_000));
    }

    #[test]
    fn test_find_duplicate_fuzzy_containment() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);
        let movement = seed_movement(
            &db,
            org,
            account.id,
            FlowType::Expense,
            Money::from_cents(1_299),
            "AWS Cloud Services monthly bill",
            date(2024, 3, 5),
        );

        // Incoming prefix contained in the stored description.
        let dup = db
            .with_conn(|conn| {
                find_duplicate_movement(
                    conn,
                    org,
                    Money::from_cents(1_299),
                    date(2024, 3, 5),
                    "aws cloud services",
                    20,
                )
            })
            .unwrap();
        assert_eq!(dup, Some(movement.id));

        // Stored prefix contained in a longer incoming description.
        let dup = db
            .with_conn(|conn| {
                find_duplicate_movement(
                    conn,
                    org,
                    Money::from_cents(1_299),
                    date(2024, 3, 5),
                    "Payment: AWS Cloud Services monthly bill ref 4421",
                    20,
                )
            })
            .unwrap();
        assert_eq!(dup, Some(movement.id));

        // Different amount: no match.
        let miss = db
            .with_conn(|conn| {
                find_duplicate_movement(
                    conn,
                    org,
                    Money::from_cents(1_300),
                    date(2024, 3, 5),
                    "aws cloud services",
                    20,
                )
            })
            .unwrap();
        assert!(miss.is_none());

        // Different date: no match.
        let miss = db
            .with_conn(|conn| {
                find_duplicate_movement(
                    conn,
                    org,
                    Money::from_cents(1_299),
                    date(2024, 3, 6),
                    "aws cloud services",
                    20,
                )
            })
            .unwrap();
        assert!(miss.is_none());

        // Unrelated description: no match.
        let miss = db
            .with_conn(|conn| {
                find_duplicate_movement(
                    conn,
                    org,
                    Money::from_cents(1_299),
                    date(2024, 3, 5),
                    "Office chairs",
                    20,
                )
            })
            .unwrap();
        assert!(miss.is_none());
    }

    // ---- Aggregations ----

    #[test]
    fn test_sum_flow_in_range() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);
        seed_movement(&db, org, account.id, FlowType::Income, Money::from_cents(10_000), "sale", date(2024, 3, 1));
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(4_000), "rent", date(2024, 3, 2));
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(1_000), "coffee", date(2024, 3, 3));

        let income = db
            .with_conn(|conn| sum_flow_in_range(conn, org, FlowType::Income, date(2024, 3, 1), date(2024, 3, 31)))
            .unwrap();
        let expenses = db
            .with_conn(|conn| sum_flow_in_range(conn, org, FlowType::Expense, date(2024, 3, 1), date(2024, 3, 31)))
            .unwrap();
        assert_eq!(income, Money::from_cents(10_000));
        assert_eq!(expenses, Money::from_cents(5_000));
    }

    #[test]
    fn test_category_totals_ordered_desc() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);

        let mut rent = MoneyMovement::new(org, FlowType::Expense, Money::from_cents(8_000), "rent", date(2024, 3, 1), account.id);
        rent.category = Some("rent".to_string());
        let mut coffee = MoneyMovement::new(org, FlowType::Expense, Money::from_cents(500), "latte", date(2024, 3, 2), account.id);
        coffee.category = Some("meals".to_string());
        let uncat = MoneyMovement::new(org, FlowType::Expense, Money::from_cents(1_500), "misc", date(2024, 3, 3), account.id);
        db.with_conn(|conn| {
            insert_movement(conn, &rent)?;
            insert_movement(conn, &coffee)?;
            insert_movement(conn, &uncat)
        })
        .unwrap();

        let totals = db
            .with_conn(|conn| {
                category_totals_in_range(conn, org, FlowType::Expense, date(2024, 3, 1), date(2024, 3, 31))
            })
            .unwrap();
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0], ("rent".to_string(), Money::from_cents(8_000)));
        assert_eq!(totals[1], ("uncategorized".to_string(), Money::from_cents(1_500)));
        assert_eq!(totals[2], ("meals".to_string(), Money::from_cents(500)));
    }

    #[test]
    fn test_daily_flow_buckets() {
        let db = make_db();
        let org = OrgId::new();
        let account = seed_account(&db, org, Money::ZERO);
        seed_movement(&db, org, account.id, FlowType::Income, Money::from_cents(5_000), "sale a", date(2024, 3, 1));
        seed_movement(&db, org, account.id, FlowType::Income, Money::from_cents(2_000), "sale b", date(2024, 3, 1));
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(1_000), "lunch", date(2024, 3, 2));

        let days = db
            .with_conn(|conn| daily_flow_in_range(conn, org, date(2024, 3, 1), date(2024, 3, 31)))
            .unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, date(2024, 3, 1));
        assert_eq!(days[0].flow_type, FlowType::Income);
        assert_eq!(days[0].total, Money::from_cents(7_000));
        assert_eq!(days[1].flow_type, FlowType::Expense);
    }

    // ---- Ledger invariant ----

    #[test]
    fn test_balance_equals_opening_plus_net() {
        let db = make_db();
        let org = OrgId::new();
        let opening = Money::from_cents(50_000);
        let account = seed_account(&db, org, opening);

        seed_movement(&db, org, account.id, FlowType::Income, Money::from_cents(12_000), "invoice", date(2024, 3, 1));
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(7_500), "rent", date(2024, 3, 2));
        seed_movement(&db, org, account.id, FlowType::Expense, Money::from_cents(1_250), "coffee", date(2024, 3, 3));
        seed_movement(&db, org, account.id, FlowType::Income, Money::from_cents(3_000), "refund", date(2024, 3, 4));

        let income = db
            .with_conn(|conn| sum_flow_in_range(conn, org, FlowType::Income, date(2024, 1, 1), date(2024, 12, 31)))
            .unwrap();
        let expenses = db
            .with_conn(|conn| sum_flow_in_range(conn, org, FlowType::Expense, date(2024, 1, 1), date(2024, 12, 31)))
            .unwrap();
        let account_now = db
            .with_conn(|conn| get_account(conn, org, account.id))
            .unwrap()
            .unwrap();

        assert_eq!(account_now.balance, opening + income - expenses);
    }
}
