//! Transaction categorization action handler.
//!
//! Walks the uncategorized movements in a period and applies category
//! suggestions that clear the configured confidence threshold. Rows the
//! categorizer is unsure about are reported back, never guessed.

use rusqlite::Connection;
use serde::Deserialize;

use opsmith_store::entities::MoneyMovement;
use opsmith_store::ledger;

use crate::categorize::Categorizer;
use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::decode_params;
use crate::report::period::{resolve_period, DateRange};
use crate::types::{ActionType, ExecutionResult, Permission, Preview};

const DEFAULT_PERIOD: &str = "last_30_days";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategorizeParams {
    #[serde(default)]
    period: Option<String>,
}

fn parse_range(
    ctx: &ActionContext<'_>,
    params: &serde_json::Value,
) -> Result<DateRange, ActionError> {
    let parsed: CategorizeParams = decode_params(params)?;
    let token = parsed.period.unwrap_or_else(|| DEFAULT_PERIOD.to_string());
    resolve_period(&token, ctx.today())
}

/// One suggestion outcome, kept in the payload either way.
fn suggestion_for(
    ctx: &ActionContext<'_>,
    movement: &MoneyMovement,
) -> (Option<String>, serde_json::Value) {
    match ctx.categorizer.suggest(&movement.description, movement.flow_type) {
        Some(suggestion) if suggestion.confidence >= ctx.config.categorize.min_confidence => {
            let detail = serde_json::json!({
                "movement_id": movement.id,
                "description": movement.description,
                "category": suggestion.category,
                "confidence": suggestion.confidence,
            });
            (Some(suggestion.category), detail)
        }
        Some(suggestion) => {
            let detail = serde_json::json!({
                "movement_id": movement.id,
                "description": movement.description,
                "category": suggestion.category,
                "confidence": suggestion.confidence,
            });
            (None, detail)
        }
        None => {
            let detail = serde_json::json!({
                "movement_id": movement.id,
                "description": movement.description,
            });
            (None, detail)
        }
    }
}

/// Handler for `categorize_transactions`.
pub struct CategorizeTransactionsHandler;

impl ActionHandler for CategorizeTransactionsHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CategorizeTransactions
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
        let movements =
            ledger::list_uncategorized_in_range(conn, ctx.org(), range.start, range.end)?;

        let mut items = Vec::new();
        let mut would_apply = 0usize;
        for movement in &movements {
            let (applied, detail) = suggestion_for(ctx, movement);
            if applied.is_some() {
                would_apply += 1;
                items.push(detail);
            }
        }

        Ok(Preview::new(
            format!("Categorize {} of {} movement(s)", would_apply, movements.len()),
            format!("Uncategorized movements from {} to {}", range.start, range.end),
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
        let range = parse_range(ctx, params)?;
        let movements =
            ledger::list_uncategorized_in_range(conn, ctx.org(), range.start, range.end)?;

        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        for movement in &movements {
            match suggestion_for(ctx, movement) {
                (Some(category), detail) => {
                    ledger::set_movement_category(conn, movement.id, &category)?;
                    applied.push(detail);
                }
                (None, detail) => skipped.push(detail),
            }
        }

        tracing::info!(
            applied = applied.len(),
            skipped = skipped.len(),
            from = %range.start,
            to = %range.end,
            "Movements categorized"
        );

        Ok(ExecutionResult::ok(
            format!(
                "Categorized {} movement(s); {} left for review",
                applied.len(),
                skipped.len()
            ),
            serde_json::json!({
                "applied": applied.len(),
                "categorized": applied,
                "skipped": skipped,
                "from": range.start,
                "to": range.end,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::LedgerWrite]
    }
}
