//! Budget adjustment action handler.
//!
//! Sets a budget line to a new monthly amount. The line is looked up by
//! category name case-insensitively and must already exist; adjusting an
//! unknown category is a lookup failure, not an implicit create.

use rusqlite::Connection;
use serde::Deserialize;

use opsmith_core::clock::Clock;
use opsmith_core::types::Money;
use opsmith_store::backoffice;
use opsmith_store::entities::BudgetLine;

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::{decode_params, require_non_empty, require_non_negative, AmountParam};
use crate::types::{ActionType, ExecutionResult, Impact, Permission, Preview};

/// Absolute change above which the adjustment is flagged high impact.
const HIGH_IMPACT_DIFFERENCE: Money = Money(100_000);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdjustBudgetParams {
    category: String,
    amount: AmountParam,
}

fn find_line(
    conn: &Connection,
    ctx: &ActionContext<'_>,
    category: &str,
) -> Result<BudgetLine, ActionError> {
    backoffice::find_budget_line(conn, ctx.org(), category)?.ok_or_else(|| {
        ActionError::NotFound(format!("No budget line for category '{}'", category))
    })
}

fn parse(params: &serde_json::Value) -> Result<(String, Money), ActionError> {
    let parsed: AdjustBudgetParams = decode_params(params)?;
    let category = require_non_empty(&parsed.category, "category")?.to_string();
    require_non_negative(parsed.amount.0, "amount")?;
    Ok((category, parsed.amount.0))
}

/// Handler for `adjust_budget`.
pub struct AdjustBudgetHandler;

impl ActionHandler for AdjustBudgetHandler {
    fn action_type(&self) -> ActionType {
        ActionType::AdjustBudget
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let (category, _) = parse(params)?;
        find_line(conn, ctx, &category)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let (category, amount) = parse(params)?;
        let line = find_line(conn, ctx, &category)?;
        let difference = amount - line.amount;
        let impact = if difference.abs() > HIGH_IMPACT_DIFFERENCE {
            Impact::High
        } else {
            Impact::Medium
        };
        Ok(Preview::new(
            format!("Set {} budget to {}", line.category, amount),
            format!(
                "Current {} budget is {}; change of {}",
                line.category, line.amount, difference
            ),
            impact,
        ))
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError> {
        let (category, amount) = parse(params)?;
        let line = find_line(conn, ctx, &category)?;
        let previous = line.amount;
        backoffice::set_budget_amount(conn, line.id, amount, ctx.clock.timestamp())?;

        tracing::info!(
            category = %line.category,
            previous = %previous,
            amount = %amount,
            "Budget adjusted"
        );

        Ok(ExecutionResult::ok(
            format!(
                "Budget for {} changed from {} to {}",
                line.category, previous, amount
            ),
            serde_json::json!({
                "budget_line_id": line.id,
                "category": line.category,
                "previous_cents": previous.0,
                "amount_cents": amount.0,
                "difference_cents": (amount - previous).0,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::BudgetWrite]
    }
}
