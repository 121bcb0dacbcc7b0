//! Action invocation persistence.
//!
//! Invocations are durable rows: a pending row is the confirmation
//! ticket, an executed row is the audit record whose stored result is
//! replayed on duplicate confirms. State changes are guarded updates
//! (`WHERE state = expected`) so exactly one caller wins a transition.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use opsmith_core::error::OpsError;
use opsmith_core::{OrgId, Timestamp, UserId};

use crate::entities::{ActionInvocation, InvocationState};

/// Insert a new invocation row.
pub fn insert_invocation(conn: &Connection, invocation: &ActionInvocation) -> Result<(), OpsError> {
    let parameters = serde_json::to_string(&invocation.parameters)?;
    let result = invocation
        .result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO action_invocations (id, organization_id, user_id, action_type, state,
                                         parameters, result, created_at, expires_at, executed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            invocation.id.to_string(),
            invocation.organization_id.0.to_string(),
            invocation.user_id.0.to_string(),
            invocation.action_type,
            invocation.state.to_string(),
            parameters,
            result,
            invocation.created_at.0,
            invocation.expires_at.0,
            invocation.executed_at.map(|t| t.0),
        ],
    )
    .map_err(|e| OpsError::Storage(format!("Failed to insert invocation: {}", e)))?;
    Ok(())
}

/// Fetch an invocation by id, scoped to the organization.
pub fn get_invocation(
    conn: &Connection,
    organization_id: OrgId,
    id: Uuid,
) -> Result<Option<ActionInvocation>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, organization_id, user_id, action_type, state, parameters, result,
                    created_at, expires_at, executed_at
             FROM action_invocations WHERE id = ?1 AND organization_id = ?2",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(
            rusqlite::params![id.to_string(), organization_id.0.to_string()],
            |row| Ok(row_to_invocation(row)),
        )
        .optional()
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    match result {
        Some(invocation) => Ok(Some(invocation?)),
        None => Ok(None),
    }
}

/// List invocations for the organization, newest first, optionally
/// narrowed to one state.
pub fn list_invocations(
    conn: &Connection,
    organization_id: OrgId,
    state: Option<InvocationState>,
    limit: u64,
) -> Result<Vec<ActionInvocation>, OpsError> {
    let (sql, params_vec): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = if let Some(state) = state
    {
        (
            "SELECT id, organization_id, user_id, action_type, state, parameters, result,
                    created_at, expires_at, executed_at
             FROM action_invocations
             WHERE organization_id = ?1 AND state = ?2
             ORDER BY created_at DESC
             LIMIT ?3",
            vec![
                Box::new(organization_id.0.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(state.to_string()),
                Box::new(limit as i64),
            ],
        )
    } else {
        (
            "SELECT id, organization_id, user_id, action_type, state, parameters, result,
                    created_at, expires_at, executed_at
             FROM action_invocations
             WHERE organization_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
            vec![
                Box::new(organization_id.0.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit as i64),
            ],
        )
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), |row| Ok(row_to_invocation(row)))
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut invocations = Vec::new();
    for row in rows {
        let invocation = row.map_err(|e| OpsError::Storage(e.to_string()))??;
        invocations.push(invocation);
    }
    Ok(invocations)
}

/// Compare-and-swap the invocation state.
///
/// Applies only when the stored state equals `from`; returns whether
/// this caller won the transition.
pub fn transition_state(
    conn: &Connection,
    id: Uuid,
    from: InvocationState,
    to: InvocationState,
) -> Result<bool, OpsError> {
    let changed = conn
        .execute(
            "UPDATE action_invocations SET state = ?3 WHERE id = ?1 AND state = ?2",
            rusqlite::params![id.to_string(), from.to_string(), to.to_string()],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to transition invocation: {}", e)))?;
    Ok(changed == 1)
}

/// Record the execution result and flip confirmed -> executed.
///
/// Runs inside the same transaction as the handler's writes, so either
/// the side effects and the executed record commit together or neither
/// does.
pub fn record_result(
    conn: &Connection,
    id: Uuid,
    result: &serde_json::Value,
    executed_at: Timestamp,
) -> Result<(), OpsError> {
    let payload = serde_json::to_string(result)?;
    let changed = conn
        .execute(
            "UPDATE action_invocations
             SET state = 'executed', result = ?2, executed_at = ?3
             WHERE id = ?1 AND state = 'confirmed'",
            rusqlite::params![id.to_string(), payload, executed_at.0],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to record result: {}", e)))?;
    if changed == 0 {
        return Err(OpsError::Storage(format!(
            "Invocation not in confirmed state: {}",
            id
        )));
    }
    Ok(())
}

/// Replace the stored result of an executed invocation (undo marking).
pub fn update_result(conn: &Connection, id: Uuid, result: &serde_json::Value) -> Result<(), OpsError> {
    let payload = serde_json::to_string(result)?;
    let changed = conn
        .execute(
            "UPDATE action_invocations SET result = ?2 WHERE id = ?1 AND state = 'executed'",
            rusqlite::params![id.to_string(), payload],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to update result: {}", e)))?;
    if changed == 0 {
        return Err(OpsError::Storage(format!(
            "Invocation not in executed state: {}",
            id
        )));
    }
    Ok(())
}

/// Expire pending invocations whose window has lapsed.
///
/// Returns the ids that were flipped to expired.
pub fn expire_stale(conn: &Connection, now: Timestamp) -> Result<Vec<Uuid>, OpsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM action_invocations
             WHERE state = 'pending' AND expires_at <= ?1",
        )
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(rusqlite::params![now.0], |row| {
            let id: String = row.get(0)?;
            Ok(id)
        })
        .map_err(|e| OpsError::Storage(e.to_string()))?;

    let mut expired = Vec::new();
    for row in rows {
        let id_str = row.map_err(|e| OpsError::Storage(e.to_string()))?;
        expired.push(parse_uuid(&id_str)?);
    }

    if !expired.is_empty() {
        conn.execute(
            "UPDATE action_invocations SET state = 'expired'
             WHERE state = 'pending' AND expires_at <= ?1",
            rusqlite::params![now.0],
        )
        .map_err(|e| OpsError::Storage(format!("Failed to expire invocations: {}", e)))?;
    }
    Ok(expired)
}

// ===== Row mapping =====

fn row_to_invocation(row: &rusqlite::Row<'_>) -> Result<ActionInvocation, OpsError> {
    let id_str: String = row.get(0).map_err(|e| OpsError::Storage(e.to_string()))?;
    let org_str: String = row.get(1).map_err(|e| OpsError::Storage(e.to_string()))?;
    let user_str: String = row.get(2).map_err(|e| OpsError::Storage(e.to_string()))?;
    let action_type: String = row.get(3).map_err(|e| OpsError::Storage(e.to_string()))?;
    let state_str: String = row.get(4).map_err(|e| OpsError::Storage(e.to_string()))?;
    let parameters_str: String = row.get(5).map_err(|e| OpsError::Storage(e.to_string()))?;
    let result_str: Option<String> = row.get(6).map_err(|e| OpsError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(7).map_err(|e| OpsError::Storage(e.to_string()))?;
    let expires_at: i64 = row.get(8).map_err(|e| OpsError::Storage(e.to_string()))?;
    let executed_at: Option<i64> = row.get(9).map_err(|e| OpsError::Storage(e.to_string()))?;

    Ok(ActionInvocation {
        id: parse_uuid(&id_str)?,
        organization_id: OrgId(parse_uuid(&org_str)?),
        user_id: UserId(parse_uuid(&user_str)?),
        action_type,
        state: state_str
            .parse::<InvocationState>()
            .map_err(OpsError::Storage)?,
        parameters: serde_json::from_str(&parameters_str)?,
        result: result_str.map(|s| serde_json::from_str(&s)).transpose()?,
        created_at: Timestamp(created_at),
        expires_at: Timestamp(expires_at),
        executed_at: executed_at.map(Timestamp),
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, OpsError> {
    Uuid::parse_str(s).map_err(|e| OpsError::Storage(format!("Invalid UUID: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn make_db() -> Database {
        Database::in_memory().unwrap()
    }

    fn make_invocation(organization_id: OrgId, created_at: i64, ttl: i64) -> ActionInvocation {
        ActionInvocation::new(
            organization_id,
            UserId::new(),
            "create_transaction",
            serde_json::json!({"amount": "45.00", "flow_type": "expense"}),
            Timestamp(created_at),
            ttl,
        )
    }

    #[test]
    fn test_invocation_round_trip() {
        let db = make_db();
        let org = OrgId::new();
        let invocation = make_invocation(org, 1_700_000_000, 900);
        db.with_conn(|conn| insert_invocation(conn, &invocation))
            .unwrap();

        let found = db
            .with_conn(|conn| get_invocation(conn, org, invocation.id))
            .unwrap()
            .unwrap();
        assert_eq!(found.action_type, "create_transaction");
        assert_eq!(found.state, InvocationState::Pending);
        assert_eq!(found.parameters["amount"], "45.00");
        assert_eq!(found.result, None);
        assert_eq!(found.expires_at, Timestamp(1_700_000_900));
    }

    #[test]
    fn test_get_invocation_scoped_to_org() {
        let db = make_db();
        let org = OrgId::new();
        let invocation = make_invocation(org, 1_700_000_000, 900);
        db.with_conn(|conn| insert_invocation(conn, &invocation))
            .unwrap();

        let other = db
            .with_conn(|conn| get_invocation(conn, OrgId::new(), invocation.id))
            .unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn test_list_invocations_state_filter_and_limit() {
        let db = make_db();
        let org = OrgId::new();
        for i in 0..3 {
            let invocation = make_invocation(org, 1_700_000_000 + i, 900);
            db.with_conn(|conn| insert_invocation(conn, &invocation))
                .unwrap();
        }
        let cancelled = make_invocation(org, 1_700_000_100, 900);
        db.with_conn(|conn| {
            insert_invocation(conn, &cancelled)?;
            transition_state(
                conn,
                cancelled.id,
                InvocationState::Pending,
                InvocationState::Cancelled,
            )
            .map(|_| ())
        })
        .unwrap();

        let pending = db
            .with_conn(|conn| list_invocations(conn, org, Some(InvocationState::Pending), 50))
            .unwrap();
        assert_eq!(pending.len(), 3);

        let limited = db
            .with_conn(|conn| list_invocations(conn, org, None, 2))
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_transition_state_cas() {
        let db = make_db();
        let org = OrgId::new();
        let invocation = make_invocation(org, 1_700_000_000, 900);
        db.with_conn(|conn| insert_invocation(conn, &invocation))
            .unwrap();

        // First claim wins.
        let won = db
            .with_conn(|conn| {
                transition_state(
                    conn,
                    invocation.id,
                    InvocationState::Pending,
                    InvocationState::Confirmed,
                )
            })
            .unwrap();
        assert!(won);

        // Second claim observes the moved state and loses.
        let lost = db
            .with_conn(|conn| {
                transition_state(
                    conn,
                    invocation.id,
                    InvocationState::Pending,
                    InvocationState::Confirmed,
                )
            })
            .unwrap();
        assert!(!lost);
    }

    #[test]
    fn test_record_result_requires_confirmed() {
        let db = make_db();
        let org = OrgId::new();
        let invocation = make_invocation(org, 1_700_000_000, 900);
        db.with_conn(|conn| insert_invocation(conn, &invocation))
            .unwrap();

        let result = serde_json::json!({"success": true, "message": "done"});

        // Still pending: recording is refused.
        let refused = db.with_conn(|conn| {
            record_result(conn, invocation.id, &result, Timestamp(1_700_000_010))
        });
        assert!(refused.is_err());

        db.with_conn(|conn| {
            transition_state(
                conn,
                invocation.id,
                InvocationState::Pending,
                InvocationState::Confirmed,
            )
            .map(|_| ())
        })
        .unwrap();
        db.with_conn(|conn| record_result(conn, invocation.id, &result, Timestamp(1_700_000_010)))
            .unwrap();

        let found = db
            .with_conn(|conn| get_invocation(conn, org, invocation.id))
            .unwrap()
            .unwrap();
        assert_eq!(found.state, InvocationState::Executed);
        assert_eq!(found.executed_at, Some(Timestamp(1_700_000_010)));
        assert_eq!(found.result.unwrap()["message"], "done");
    }

    #[test]
    fn test_update_result_only_when_executed() {
        let db = make_db();
        let org = OrgId::new();
        let invocation = make_invocation(org, 1_700_000_000, 900);
        db.with_conn(|conn| insert_invocation(conn, &invocation))
            .unwrap();

        let refused =
            db.with_conn(|conn| update_result(conn, invocation.id, &serde_json::json!({})));
        assert!(refused.is_err());

        db.with_conn(|conn| {
            transition_state(
                conn,
                invocation.id,
                InvocationState::Pending,
                InvocationState::Confirmed,
            )?;
            record_result(
                conn,
                invocation.id,
                &serde_json::json!({"success": true}),
                Timestamp(1_700_000_010),
            )
        })
        .unwrap();

        db.with_conn(|conn| {
            update_result(
                conn,
                invocation.id,
                &serde_json::json!({"success": true, "undone": true}),
            )
        })
        .unwrap();

        let found = db
            .with_conn(|conn| get_invocation(conn, org, invocation.id))
            .unwrap()
            .unwrap();
        assert_eq!(found.result.unwrap()["undone"], true);
    }

    #[test]
    fn test_expire_stale_only_past_due_pending() {
        let db = make_db();
        let org = OrgId::new();
        let stale = make_invocation(org, 1_700_000_000, 900);
        let fresh = make_invocation(org, 1_700_000_600, 900);
        let confirmed = make_invocation(org, 1_700_000_000, 900);
        db.with_conn(|conn| {
            insert_invocation(conn, &stale)?;
            insert_invocation(conn, &fresh)?;
            insert_invocation(conn, &confirmed)?;
            transition_state(
                conn,
                confirmed.id,
                InvocationState::Pending,
                InvocationState::Confirmed,
            )
            .map(|_| ())
        })
        .unwrap();

        let expired = db
            .with_conn(|conn| expire_stale(conn, Timestamp(1_700_001_000)))
            .unwrap();
        assert_eq!(expired, vec![stale.id]);

        let stale_row = db
            .with_conn(|conn| get_invocation(conn, org, stale.id))
            .unwrap()
            .unwrap();
        assert_eq!(stale_row.state, InvocationState::Expired);

        let fresh_row = db
            .with_conn(|conn| get_invocation(conn, org, fresh.id))
            .unwrap()
            .unwrap();
        assert_eq!(fresh_row.state, InvocationState::Pending);

        // Confirmed rows are immune to the sweep.
        let confirmed_row = db
            .with_conn(|conn| get_invocation(conn, org, confirmed.id))
            .unwrap()
            .unwrap();
        assert_eq!(confirmed_row.state, InvocationState::Confirmed);

        // Second sweep finds nothing.
        let again = db
            .with_conn(|conn| expire_stale(conn, Timestamp(1_700_001_000)))
            .unwrap();
        assert!(again.is_empty());
    }
}
