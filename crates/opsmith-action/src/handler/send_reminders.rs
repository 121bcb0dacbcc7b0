//! Invoice reminder action handler.
//!
//! Selects unpaid invoices whose due date has passed, stamps a reminder
//! timestamp on each, and flips still-`sent` invoices to `overdue`.
//! Delivering the reminder itself (email, chat) is the notifier
//! collaborator's job; this handler records what was selected and when.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use opsmith_core::clock::Clock;
use opsmith_store::billing::{self, InvoiceFilter};
use opsmith_store::entities::Invoice;

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::{decode_params, DateParam};
use crate::types::{ActionType, ExecutionResult, Permission, Preview};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendRemindersParams {
    #[serde(default)]
    invoice_id: Option<Uuid>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    due_from: Option<DateParam>,
    #[serde(default)]
    due_to: Option<DateParam>,
}

fn parse_filter(params: &serde_json::Value) -> Result<InvoiceFilter, ActionError> {
    let parsed: SendRemindersParams = decode_params(params)?;
    Ok(InvoiceFilter {
        invoice_id: parsed.invoice_id,
        customer_name: parsed
            .customer_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        due_from: parsed.due_from.map(|d| d.0),
        due_to: parsed.due_to.map(|d| d.0),
    })
}

fn overdue_matches(
    conn: &Connection,
    ctx: &ActionContext<'_>,
    filter: &InvoiceFilter,
) -> Result<Vec<Invoice>, ActionError> {
    let matches = billing::list_overdue_invoices(conn, ctx.org(), filter, ctx.today())?;
    if matches.is_empty() {
        return Err(ActionError::NotFound(
            "No overdue invoices match".to_string(),
        ));
    }
    Ok(matches)
}

fn invoice_summary(ctx: &ActionContext<'_>, invoice: &Invoice) -> serde_json::Value {
    let days_overdue = invoice
        .due_date
        .map(|due| (ctx.today() - due).num_days())
        .unwrap_or(0);
    serde_json::json!({
        "invoice_id": invoice.id,
        "number": invoice.number,
        "outstanding_cents": invoice.outstanding.0,
        "due_date": invoice.due_date,
        "days_overdue": days_overdue,
    })
}

/// Handler for `send_invoice_reminders`.
pub struct SendRemindersHandler;

impl ActionHandler for SendRemindersHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendInvoiceReminders
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let filter = parse_filter(params)?;
        overdue_matches(conn, ctx, &filter)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let filter = parse_filter(params)?;
        let matches = overdue_matches(conn, ctx, &filter)?;
        let items: Vec<serde_json::Value> =
            matches.iter().map(|i| invoice_summary(ctx, i)).collect();
        Ok(Preview::new(
            format!("Send reminders for {} overdue invoice(s)", matches.len()),
            format!("Invoices past due as of {}", ctx.today()),
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
        let matches = overdue_matches(conn, ctx, &filter)?;
        let now = ctx.clock.timestamp();

        let mut reminded = Vec::with_capacity(matches.len());
        for invoice in &matches {
            billing::mark_reminder_sent(conn, invoice.id, now)?;
            billing::mark_invoice_overdue(conn, invoice.id)?;
            reminded.push(invoice_summary(ctx, invoice));
        }

        tracing::info!(reminded = reminded.len(), "Invoice reminders recorded");

        Ok(ExecutionResult::ok(
            format!("Recorded reminders for {} overdue invoice(s)", reminded.len()),
            serde_json::json!({
                "reminded": reminded.len(),
                "invoices": reminded,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::BillingWrite]
    }
}
