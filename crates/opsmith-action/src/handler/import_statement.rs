//! Bank statement import action handler.
//!
//! Runs the import pipeline: parse the submitted rows, drop invalid and
//! duplicate entries, then insert the survivors as completed movements
//! with their dedup fingerprint and a best-effort category. Preview and
//! execute plan against the same pipeline, so re-importing the same
//! statement is a no-op rather than a double booking.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use opsmith_store::entities::MoneyMovement;
use opsmith_store::ledger;

use crate::categorize::Categorizer;
use crate::error::ActionError;
use crate::handler::{resolve_account, ActionContext, ActionHandler};
use crate::import::fingerprint::FINGERPRINT_VERSION;
use crate::import::{plan_import, ImportPlan, RawRow, SkippedRow};
use crate::params::decode_params;
use crate::types::{ActionType, ExecutionResult, Permission, Preview};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImportStatementParams {
    #[serde(default)]
    rows: Vec<RawRow>,
    #[serde(default)]
    account_id: Option<Uuid>,
}

fn parse(params: &serde_json::Value) -> Result<ImportStatementParams, ActionError> {
    let parsed: ImportStatementParams = decode_params(params)?;
    if parsed.rows.is_empty() {
        return Err(ActionError::validation(
            "rows",
            "statement must contain at least one row",
        ));
    }
    Ok(parsed)
}

fn build_plan(
    conn: &Connection,
    ctx: &ActionContext<'_>,
    rows: &[RawRow],
) -> Result<ImportPlan, ActionError> {
    Ok(plan_import(
        conn,
        ctx.org(),
        rows,
        ctx.today(),
        &ctx.config.import,
    )?)
}

fn skip_counts(skipped: &[SkippedRow]) -> (usize, usize) {
    let duplicates = skipped
        .iter()
        .filter(|s| s.reason.contains("duplicate"))
        .count();
    (duplicates, skipped.len() - duplicates)
}

/// Handler for `import_bank_statement`.
pub struct ImportStatementHandler;

impl ActionHandler for ImportStatementHandler {
    fn action_type(&self) -> ActionType {
        ActionType::ImportBankStatement
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let parsed = parse(params)?;
        resolve_account(ctx, conn, parsed.account_id)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let parsed = parse(params)?;
        let account = resolve_account(ctx, conn, parsed.account_id)?;
        let plan = build_plan(conn, ctx, &parsed.rows)?;
        let (duplicates, invalid) = skip_counts(&plan.skipped);

        let items: Vec<serde_json::Value> = plan
            .rows
            .iter()
            .map(|row| {
                serde_json::json!({
                    "index": row.index,
                    "date": row.date,
                    "description": row.description,
                    "amount_cents": row.amount.0,
                    "flow_type": row.flow_type,
                })
            })
            .collect();

        let mut preview = Preview::new(
            format!(
                "Import {} transaction(s) into {}",
                plan.rows.len(),
                account.name
            ),
            format!(
                "{} new, {} duplicate, {} invalid of {} submitted row(s)",
                plan.rows.len(),
                duplicates,
                invalid,
                parsed.rows.len()
            ),
            self.impact(params),
        )
        .with_items(items);
        if duplicates > 0 {
            preview = preview.with_warning(format!(
                "{} row(s) already exist and will be skipped",
                duplicates
            ));
        }
        if invalid > 0 {
            preview = preview.with_warning(format!("{} row(s) could not be parsed", invalid));
        }
        Ok(preview)
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError> {
        let parsed = parse(params)?;
        let account = resolve_account(ctx, conn, parsed.account_id)?;
        let plan = build_plan(conn, ctx, &parsed.rows)?;
        let (duplicates, invalid) = skip_counts(&plan.skipped);

        let mut imported = 0usize;
        for row in &plan.rows {
            let mut movement = MoneyMovement::new(
                ctx.org(),
                row.flow_type,
                row.amount,
                row.description.as_str(),
                row.date,
                account.id,
            );
            movement.fingerprint = Some(row.fingerprint.clone());
            movement.fingerprint_version = Some(FINGERPRINT_VERSION);
            movement.category = ctx
                .categorizer
                .suggest(&row.description, row.flow_type)
                .filter(|s| s.confidence >= ctx.config.categorize.min_confidence)
                .map(|s| s.category);

            ledger::insert_movement(conn, &movement)?;
            ledger::apply_balance_delta(conn, account.id, movement.signed_amount())?;
            imported += 1;
        }

        tracing::info!(
            account = %account.name,
            imported,
            duplicates,
            invalid,
            "Statement imported"
        );

        Ok(ExecutionResult::ok(
            format!(
                "Imported {} transaction(s) into {} ({} duplicate(s) skipped)",
                imported, account.name, duplicates
            ),
            serde_json::json!({
                "account_id": account.id,
                "imported": imported,
                "duplicates": duplicates,
                "invalid": invalid,
                "skipped": serde_json::to_value(&plan.skipped)
                    .map_err(opsmith_core::error::OpsError::from)?,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::LedgerWrite]
    }
}
