//! Payment recording action handler.
//!
//! Applies a received payment to an open invoice, found by id or by
//! customer name. The applied amount is clamped to the invoice's
//! outstanding balance; the invoice flips to paid when the remainder
//! reaches zero. Payments are receivable bookkeeping, not ledger
//! movements, so no account balance changes here.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use opsmith_core::types::Money;
use opsmith_store::billing::{self, InvoiceFilter};
use opsmith_store::entities::{Invoice, Payment, PaymentAllocation};

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::{decode_params, require_non_empty, require_positive, AmountParam, DateParam};
use crate::types::{ActionType, ExecutionResult, Permission, Preview};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordPaymentParams {
    amount: AmountParam,
    #[serde(default)]
    invoice_id: Option<Uuid>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    date: Option<DateParam>,
}

fn parse(params: &serde_json::Value) -> Result<RecordPaymentParams, ActionError> {
    let parsed: RecordPaymentParams = decode_params(params)?;
    require_positive(parsed.amount.0, "amount")?;
    if parsed.invoice_id.is_none() {
        match parsed.customer_name.as_deref() {
            Some(name) => {
                require_non_empty(name, "customer_name")?;
            }
            None => {
                return Err(ActionError::validation(
                    "invoice_id",
                    "provide invoice_id or customer_name",
                ));
            }
        }
    }
    Ok(parsed)
}

/// The invoice the payment should land on.
///
/// By id: the invoice must exist and still be open. By customer name:
/// the most recently issued open invoice for that customer.
fn find_open_invoice(
    ctx: &ActionContext<'_>,
    conn: &Connection,
    parsed: &RecordPaymentParams,
) -> Result<Invoice, ActionError> {
    if let Some(id) = parsed.invoice_id {
        let invoice = billing::get_invoice(conn, ctx.org(), id)?
            .ok_or_else(|| ActionError::NotFound(format!("Invoice {}", id)))?;
        if !invoice.status.is_open() || invoice.outstanding.0 <= 0 {
            return Err(ActionError::Conflict(format!(
                "Invoice {} is {} with nothing outstanding",
                invoice.number, invoice.status
            )));
        }
        return Ok(invoice);
    }

    // parse() guarantees customer_name is present and non-blank here.
    let name = parsed.customer_name.as_deref().unwrap_or_default().trim();
    let filter = InvoiceFilter {
        customer_name: Some(name.to_string()),
        ..Default::default()
    };
    billing::list_open_invoices(conn, ctx.org(), &filter)?
        .into_iter()
        .next()
        .ok_or_else(|| ActionError::NotFound(format!("No open invoice for customer '{}'", name)))
}

/// Handler for `record_payment`.
pub struct RecordPaymentHandler;

impl ActionHandler for RecordPaymentHandler {
    fn action_type(&self) -> ActionType {
        ActionType::RecordPayment
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let parsed = parse(params)?;
        find_open_invoice(ctx, conn, &parsed)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let parsed = parse(params)?;
        let invoice = find_open_invoice(ctx, conn, &parsed)?;
        let requested = parsed.amount.0;
        let applied = requested.min(invoice.outstanding);

        let mut preview = Preview::new(
            format!("Apply {} to invoice {}", applied, invoice.number),
            format!(
                "Invoice {} has {} outstanding; {} of it will be settled",
                invoice.number, invoice.outstanding, applied
            ),
            self.impact(params),
        )
        .with_items(vec![serde_json::json!({
            "invoice_id": invoice.id,
            "invoice_number": invoice.number,
            "outstanding_cents": invoice.outstanding.0,
            "applied_cents": applied.0,
        })]);
        if requested > invoice.outstanding {
            preview = preview.with_warning(format!(
                "Payment of {} exceeds the outstanding {}; only {} will be applied",
                requested, invoice.outstanding, applied
            ));
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
        let invoice = find_open_invoice(ctx, conn, &parsed)?;
        let requested = parsed.amount.0;
        let applied = requested.min(invoice.outstanding);
        let received = parsed.date.map(|d| d.0).unwrap_or_else(|| ctx.today());
        let method = parsed
            .method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from);

        let payment = Payment::new(ctx.org(), applied, method, received);
        billing::insert_payment(conn, &payment)?;
        billing::insert_allocation(
            conn,
            &PaymentAllocation::new(payment.id, invoice.id, applied),
        )?;
        billing::settle_invoice(conn, invoice.id, applied)?;

        let outstanding_after = invoice.outstanding - applied;
        tracing::info!(
            payment_id = %payment.id,
            invoice = %invoice.number,
            applied = %applied,
            outstanding_after = %outstanding_after,
            "Payment recorded"
        );

        let message = if outstanding_after.0 <= 0 {
            format!("Applied {} to invoice {}; invoice settled", applied, invoice.number)
        } else {
            format!(
                "Applied {} to invoice {}; {} still outstanding",
                applied, invoice.number, outstanding_after
            )
        };
        Ok(ExecutionResult::ok(
            message,
            serde_json::json!({
                "payment_id": payment.id,
                "invoice_id": invoice.id,
                "invoice_number": invoice.number,
                "applied_cents": applied.0,
                "outstanding_after_cents": outstanding_after.0,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::BillingWrite]
    }
}
