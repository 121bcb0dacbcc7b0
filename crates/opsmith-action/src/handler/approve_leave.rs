//! Leave approval action handler.
//!
//! Approves pending leave requests matching an optional filter: a
//! specific request id, an employee-name substring, or a window on the
//! leave start date. With no filter, every pending request is approved.
//! Requests that leave the pending state between preview and execution
//! are skipped, not failed.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use opsmith_store::backoffice::{self, LeaveFilter};
use opsmith_store::entities::{LeaveRequest, LeaveStatus};

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::{decode_params, DateParam};
use crate::types::{ActionType, ExecutionResult, Permission, Preview};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApproveLeaveParams {
    #[serde(default)]
    request_id: Option<Uuid>,
    #[serde(default)]
    employee_name: Option<String>,
    #[serde(default)]
    from_date: Option<DateParam>,
    #[serde(default)]
    to_date: Option<DateParam>,
}

fn parse_filter(params: &serde_json::Value) -> Result<LeaveFilter, ActionError> {
    let parsed: ApproveLeaveParams = decode_params(params)?;
    Ok(LeaveFilter {
        request_id: parsed.request_id,
        employee_name: parsed
            .employee_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        from_date: parsed.from_date.map(|d| d.0),
        to_date: parsed.to_date.map(|d| d.0),
    })
}

fn pending_matches(
    conn: &Connection,
    ctx: &ActionContext<'_>,
    filter: &LeaveFilter,
) -> Result<Vec<LeaveRequest>, ActionError> {
    let matches = backoffice::list_pending_leave(conn, ctx.org(), filter)?;
    if matches.is_empty() {
        return Err(ActionError::NotFound(
            "No pending leave requests match".to_string(),
        ));
    }
    Ok(matches)
}

fn request_summary(request: &LeaveRequest) -> serde_json::Value {
    serde_json::json!({
        "request_id": request.id,
        "employee_name": request.employee_name,
        "start_date": request.start_date,
        "end_date": request.end_date,
        "days": request.duration_days(),
    })
}

/// Handler for `approve_leave`.
pub struct ApproveLeaveHandler;

impl ActionHandler for ApproveLeaveHandler {
    fn action_type(&self) -> ActionType {
        ActionType::ApproveLeave
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let filter = parse_filter(params)?;
        pending_matches(conn, ctx, &filter)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let filter = parse_filter(params)?;
        let matches = pending_matches(conn, ctx, &filter)?;
        let items: Vec<serde_json::Value> = matches.iter().map(request_summary).collect();
        Ok(Preview::new(
            format!("Approve {} leave request(s)", matches.len()),
            matches
                .iter()
                .map(|r| {
                    format!(
                        "{}: {} to {}",
                        r.employee_name, r.start_date, r.end_date
                    )
                })
                .collect::<Vec<_>>()
                .join("; "),
            self.impact(params),
        )
        .with_items(items))
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError> {
        let filter = parse_filter(params)?;
        let matches = pending_matches(conn, ctx, &filter)?;

        let mut approved = Vec::new();
        for request in &matches {
            if backoffice::set_leave_status(conn, request.id, LeaveStatus::Approved)? {
                approved.push(request_summary(request));
            }
        }

        tracing::info!(
            approved = approved.len(),
            matched = matches.len(),
            "Leave requests approved"
        );

        Ok(ExecutionResult::ok(
            format!("Approved {} leave request(s)", approved.len()),
            serde_json::json!({
                "approved": approved.len(),
                "requests": approved,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::WorkforceWrite]
    }
}
