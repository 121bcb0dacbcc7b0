//! Ledger transaction action handler.
//!
//! Records one income or expense movement against a money account and
//! moves the account balance with it. Undo reverses the recorded
//! movement by id and restores the balance from the stored delta.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use opsmith_core::types::{FlowType, Money};
use opsmith_store::entities::MoneyMovement;
use opsmith_store::ledger;

use crate::error::ActionError;
use crate::handler::{resolve_account, ActionContext, ActionHandler};
use crate::params::{decode_params, require_non_empty, require_positive, AmountParam, DateParam};
use crate::types::{ActionType, ExecutionResult, Impact, Permission, Preview};

/// Movements at or above this amount prompt as medium impact.
const MEDIUM_IMPACT_FROM: Money = Money(50_000);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateTransactionParams {
    amount: AmountParam,
    description: String,
    #[serde(default)]
    flow_type: Option<String>,
    #[serde(default)]
    date: Option<DateParam>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    account_id: Option<Uuid>,
}

fn parse(params: &serde_json::Value) -> Result<(CreateTransactionParams, FlowType), ActionError> {
    let parsed: CreateTransactionParams = decode_params(params)?;
    require_positive(parsed.amount.0, "amount")?;
    require_non_empty(&parsed.description, "description")?;
    let flow_type = match parsed.flow_type.as_deref() {
        Some(s) => s
            .parse::<FlowType>()
            .map_err(|e| ActionError::validation("flow_type", e))?,
        None => FlowType::Expense,
    };
    Ok((parsed, flow_type))
}

/// Handler for `create_transaction`.
pub struct CreateTransactionHandler;

impl ActionHandler for CreateTransactionHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTransaction
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let (parsed, _) = parse(params)?;
        resolve_account(ctx, conn, parsed.account_id)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let (parsed, flow_type) = parse(params)?;
        let account = resolve_account(ctx, conn, parsed.account_id)?;
        let date = parsed.date.map(|d| d.0).unwrap_or_else(|| ctx.today());
        let description = parsed.description.trim();

        Ok(Preview::new(
            format!("Record {} of {}", flow_type, parsed.amount.0),
            format!("{} on {} against {}", description, date, account.name),
            self.impact(params),
        )
        .with_items(vec![serde_json::json!({
            "description": description,
            "amount_cents": parsed.amount.0 .0,
            "flow_type": flow_type.to_string(),
            "date": date.to_string(),
            "account": account.name,
        })]))
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError> {
        let (parsed, flow_type) = parse(params)?;
        let account = resolve_account(ctx, conn, parsed.account_id)?;
        let date = parsed.date.map(|d| d.0).unwrap_or_else(|| ctx.today());
        let description = parsed.description.trim().to_string();
        let category = parsed
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from);

        let mut movement = MoneyMovement::new(
            ctx.org(),
            flow_type,
            parsed.amount.0,
            description,
            date,
            account.id,
        );
        movement.category = category;
        ledger::insert_movement(conn, &movement)?;
        ledger::apply_balance_delta(conn, account.id, movement.signed_amount())?;

        tracing::info!(
            movement_id = %movement.id,
            account = %account.name,
            amount = %movement.amount,
            flow = %flow_type,
            "Movement recorded"
        );

        Ok(ExecutionResult::ok(
            format!(
                "Recorded {} of {} against {}",
                flow_type, movement.amount, account.name
            ),
            serde_json::json!({
                "movement_id": movement.id,
                "account_id": account.id,
                "amount_cents": movement.amount.0,
                "flow_type": flow_type.to_string(),
                "date": date.to_string(),
            }),
        )
        .with_undo(serde_json::json!({
            "movement_id": movement.id,
            "account_id": account.id,
            "signed_delta_cents": movement.signed_amount().0,
        })))
    }

    fn impact(&self, params: &serde_json::Value) -> Impact {
        match decode_params::<CreateTransactionParams>(params) {
            Ok(parsed) if parsed.amount.0 < MEDIUM_IMPACT_FROM => Impact::Low,
            _ => Impact::Medium,
        }
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::LedgerWrite]
    }

    fn can_undo(&self) -> bool {
        true
    }

    fn undo(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        result: &ExecutionResult,
    ) -> Result<ExecutionResult, ActionError> {
        let token = result
            .undo
            .as_ref()
            .ok_or_else(|| ActionError::Conflict("Result carries no undo token".to_string()))?;
        let movement_id = token
            .get("movement_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                ActionError::Conflict("Undo token is missing the movement id".to_string())
            })?;

        let reversed = ledger::reverse_movement(conn, ctx.org(), movement_id)?.ok_or_else(|| {
            ActionError::Conflict(format!(
                "Movement {} is already reversed or missing",
                movement_id
            ))
        })?;

        tracing::info!(movement_id = %movement_id, "Movement reversed");

        Ok(ExecutionResult::ok(
            format!("Reversed {} of {}", reversed.flow_type, reversed.amount),
            serde_json::json!({
                "movement_id": movement_id,
                "restored_delta_cents": (-reversed.signed_amount()).0,
            }),
        ))
    }
}
