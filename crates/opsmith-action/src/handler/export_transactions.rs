//! Transaction export action handler.
//!
//! Pure read: returns the completed movements in the resolved period as
//! the result payload. Rendering a file and delivering it is the export
//! collaborator's job, so nothing is written and no confirmation is
//! needed.

use rusqlite::Connection;
use serde::Deserialize;

use opsmith_store::ledger;

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::decode_params;
use crate::report::period::{resolve_period, DateRange};
use crate::types::{ActionType, ExecutionResult, Impact, Permission, Preview};

const DEFAULT_PERIOD: &str = "this_month";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExportTransactionsParams {
    #[serde(default)]
    period: Option<String>,
}

fn parse_range(
    ctx: &ActionContext<'_>,
    params: &serde_json::Value,
) -> Result<DateRange, ActionError> {
    let parsed: ExportTransactionsParams = decode_params(params)?;
    let token = parsed.period.unwrap_or_else(|| DEFAULT_PERIOD.to_string());
    resolve_period(&token, ctx.today())
}

/// Handler for `export_transactions`.
pub struct ExportTransactionsHandler;

impl ActionHandler for ExportTransactionsHandler {
    fn action_type(&self) -> ActionType {
        ActionType::ExportTransactions
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        _conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        parse_range(ctx, params)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let range = parse_range(ctx, params)?;
        let movements = ledger::list_movements_in_range(conn, ctx.org(), range.start, range.end)?;
        Ok(Preview::new(
            format!("Export {} transaction(s)", movements.len()),
            format!("Completed movements from {} to {}", range.start, range.end),
            Impact::Low,
        ))
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError> {
        let range = parse_range(ctx, params)?;
        let movements = ledger::list_movements_in_range(conn, ctx.org(), range.start, range.end)?;

        tracing::info!(
            rows = movements.len(),
            from = %range.start,
            to = %range.end,
            "Transactions exported"
        );

        Ok(ExecutionResult::ok(
            format!("Exported {} transaction(s)", movements.len()),
            serde_json::json!({
                "from": range.start,
                "to": range.end,
                "count": movements.len(),
                "transactions": serde_json::to_value(&movements)
                    .map_err(opsmith_core::error::OpsError::from)?,
            }),
        ))
    }

    fn impact(&self, _params: &serde_json::Value) -> Impact {
        Impact::Low
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::ReportRead]
    }
}
