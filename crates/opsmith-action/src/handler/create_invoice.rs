//! Invoice creation action handler.
//!
//! Finds or creates the customer by name (case-insensitive), allocates
//! the next sequential invoice number, and writes the invoice with its
//! line items in one batch. The total is subtotal plus tax minus
//! discount; with no explicit items, `total_amount` becomes a single
//! synthetic line.

use rusqlite::Connection;
use serde::Deserialize;

use chrono::NaiveDate;
use opsmith_core::types::Money;
use opsmith_store::billing;
use opsmith_store::entities::{Customer, Invoice, InvoiceItem};

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::{
    decode_params, require_non_empty, require_non_negative, require_positive, AmountParam,
    DateParam,
};
use crate::types::{ActionType, ExecutionResult, Permission, Preview};

/// Line description used when the caller gives only a total.
const SYNTHETIC_LINE_DESCRIPTION: &str = "Services";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateInvoiceParams {
    customer_name: String,
    #[serde(default)]
    items: Vec<ItemParam>,
    #[serde(default)]
    total_amount: Option<AmountParam>,
    #[serde(default)]
    tax: Option<AmountParam>,
    #[serde(default)]
    discount: Option<AmountParam>,
    #[serde(default)]
    due_date: Option<DateParam>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemParam {
    description: String,
    #[serde(default = "default_quantity")]
    quantity: f64,
    unit_price: AmountParam,
}

fn default_quantity() -> f64 {
    1.0
}

/// Fully validated invoice contents, shared by preview and execute.
struct InvoiceDraft {
    customer_name: String,
    items: Vec<(String, f64, Money)>,
    subtotal: Money,
    tax: Money,
    discount: Money,
    total: Money,
    due_date: Option<NaiveDate>,
}

fn line_total(quantity: f64, unit_price: Money) -> Money {
    Money((quantity * unit_price.0 as f64).round() as i64)
}

fn build_draft(params: &serde_json::Value) -> Result<InvoiceDraft, ActionError> {
    let parsed: CreateInvoiceParams = decode_params(params)?;
    let customer_name = require_non_empty(&parsed.customer_name, "customer_name")?.to_string();

    let mut items = Vec::new();
    if parsed.items.is_empty() {
        let total = parsed.total_amount.ok_or_else(|| {
            ActionError::validation("items", "provide line items or total_amount")
        })?;
        require_positive(total.0, "total_amount")?;
        items.push((SYNTHETIC_LINE_DESCRIPTION.to_string(), 1.0, total.0));
    } else {
        for (index, item) in parsed.items.iter().enumerate() {
            let description = item.description.trim();
            if description.is_empty() {
                return Err(ActionError::validation(
                    "items",
                    format!("item {}: description must not be empty", index),
                ));
            }
            if !item.quantity.is_finite() || item.quantity <= 0.0 {
                return Err(ActionError::validation(
                    "items",
                    format!("item {}: quantity must be positive", index),
                ));
            }
            require_non_negative(item.unit_price.0, "items")?;
            items.push((description.to_string(), item.quantity, item.unit_price.0));
        }
    }

    let subtotal: Money = items.iter().map(|(_, q, u)| line_total(*q, *u)).sum();
    let tax = parsed.tax.map(|a| a.0).unwrap_or(Money::ZERO);
    let discount = parsed.discount.map(|a| a.0).unwrap_or(Money::ZERO);
    require_non_negative(tax, "tax")?;
    require_non_negative(discount, "discount")?;

    let total = subtotal + tax - discount;
    if total.is_negative() {
        return Err(ActionError::validation(
            "discount",
            "discount exceeds the invoice total",
        ));
    }

    Ok(InvoiceDraft {
        customer_name,
        items,
        subtotal,
        tax,
        discount,
        total,
        due_date: parsed.due_date.map(|d| d.0),
    })
}

/// Handler for `create_invoice`.
pub struct CreateInvoiceHandler;

impl ActionHandler for CreateInvoiceHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CreateInvoice
    }

    fn validate(
        &self,
        _ctx: &ActionContext<'_>,
        _conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        build_draft(params)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let draft = build_draft(params)?;
        let existing = billing::find_customer_by_name(conn, ctx.org(), &draft.customer_name)?;

        let items: Vec<serde_json::Value> = draft
            .items
            .iter()
            .map(|(description, quantity, unit_price)| {
                serde_json::json!({
                    "description": description,
                    "quantity": quantity,
                    "unit_price_cents": unit_price.0,
                    "line_total_cents": line_total(*quantity, *unit_price).0,
                })
            })
            .collect();

        let mut preview = Preview::new(
            format!("Invoice {} to {}", draft.total, draft.customer_name),
            format!(
                "Subtotal {}, tax {}, discount {}; total {}",
                draft.subtotal, draft.tax, draft.discount, draft.total
            ),
            self.impact(params),
        )
        .with_items(items);
        if existing.is_none() {
            preview = preview.with_warning(format!(
                "Customer '{}' does not exist yet and will be created",
                draft.customer_name
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
        let draft = build_draft(params)?;

        let (customer, customer_created) =
            match billing::find_customer_by_name(conn, ctx.org(), &draft.customer_name)? {
                Some(existing) => (existing, false),
                None => {
                    let customer = Customer::new(ctx.org(), draft.customer_name.as_str(), None);
                    billing::insert_customer(conn, &customer)?;
                    (customer, true)
                }
            };

        let number = billing::next_invoice_number(conn, ctx.org())?;
        let invoice = Invoice::new(
            ctx.org(),
            customer.id,
            number.as_str(),
            draft.total,
            draft.due_date,
        );
        billing::insert_invoice(conn, &invoice)?;
        for (description, quantity, unit_price) in &draft.items {
            billing::insert_invoice_item(
                conn,
                &InvoiceItem::new(invoice.id, description.as_str(), *quantity, *unit_price),
            )?;
        }

        tracing::info!(
            invoice_id = %invoice.id,
            number = %number,
            customer = %customer.name,
            total = %draft.total,
            customer_created,
            "Invoice created"
        );

        Ok(ExecutionResult::ok(
            format!("Created invoice {} for {} ({})", number, customer.name, draft.total),
            serde_json::json!({
                "invoice_id": invoice.id,
                "number": number,
                "customer_id": customer.id,
                "customer_created": customer_created,
                "subtotal_cents": draft.subtotal.0,
                "tax_cents": draft.tax.0,
                "discount_cents": draft.discount.0,
                "total_cents": draft.total.0,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::BillingWrite]
    }
}
