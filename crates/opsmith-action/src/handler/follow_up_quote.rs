//! Quote follow-up action handler.
//!
//! Stamps a follow-up timestamp on quotes still awaiting a customer
//! response (pending or sent). Filtering mirrors leave approval: a
//! specific quote id, a customer-name substring, or a creation-date
//! window. Sending the actual follow-up message is the notifier
//! collaborator's job; this handler only records that it happened.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use opsmith_core::clock::Clock;
use opsmith_store::backoffice::{self, QuoteFilter};
use opsmith_store::billing;
use opsmith_store::entities::Quote;

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::{decode_params, DateParam};
use crate::types::{ActionType, ExecutionResult, Permission, Preview};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FollowUpQuoteParams {
    #[serde(default)]
    quote_id: Option<Uuid>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    from_date: Option<DateParam>,
    #[serde(default)]
    to_date: Option<DateParam>,
}

fn parse_filter(params: &serde_json::Value) -> Result<QuoteFilter, ActionError> {
    let parsed: FollowUpQuoteParams = decode_params(params)?;
    Ok(QuoteFilter {
        quote_id: parsed.quote_id,
        customer_name: parsed
            .customer_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        from_date: parsed.from_date.map(|d| d.0),
        to_date: parsed.to_date.map(|d| d.0),
    })
}

fn awaiting_matches(
    conn: &Connection,
    ctx: &ActionContext<'_>,
    filter: &QuoteFilter,
) -> Result<Vec<Quote>, ActionError> {
    let matches = backoffice::list_awaiting_quotes(conn, ctx.org(), filter)?;
    if matches.is_empty() {
        return Err(ActionError::NotFound(
            "No quotes awaiting a response match".to_string(),
        ));
    }
    Ok(matches)
}

fn quote_summary(
    conn: &Connection,
    ctx: &ActionContext<'_>,
    quote: &Quote,
) -> Result<serde_json::Value, ActionError> {
    let customer_name = billing::get_customer(conn, ctx.org(), quote.customer_id)?
        .map(|c| c.name)
        .unwrap_or_else(|| "unknown".to_string());
    Ok(serde_json::json!({
        "quote_id": quote.id,
        "customer_name": customer_name,
        "amount_cents": quote.amount.0,
        "status": quote.status,
    }))
}

/// Handler for `follow_up_quote`.
pub struct FollowUpQuoteHandler;

impl ActionHandler for FollowUpQuoteHandler {
    fn action_type(&self) -> ActionType {
        ActionType::FollowUpQuote
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let filter = parse_filter(params)?;
        awaiting_matches(conn, ctx, &filter)?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let filter = parse_filter(params)?;
        let matches = awaiting_matches(conn, ctx, &filter)?;
        let mut items = Vec::with_capacity(matches.len());
        for quote in &matches {
            items.push(quote_summary(conn, ctx, quote)?);
        }
        Ok(Preview::new(
            format!("Follow up on {} quote(s)", matches.len()),
            format!(
                "Quotes awaiting a response as of {}",
                ctx.today()
            ),
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
        let matches = awaiting_matches(conn, ctx, &filter)?;
        let now = ctx.clock.timestamp();

        let mut followed_up = Vec::new();
        for quote in &matches {
            if backoffice::mark_quote_followed_up(conn, quote.id, now)? {
                followed_up.push(quote_summary(conn, ctx, quote)?);
            }
        }

        tracing::info!(
            followed_up = followed_up.len(),
            matched = matches.len(),
            "Quotes marked followed up"
        );

        Ok(ExecutionResult::ok(
            format!("Marked {} quote(s) followed up", followed_up.len()),
            serde_json::json!({
                "followed_up": followed_up.len(),
                "quotes": followed_up,
            }),
        ))
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::SalesWrite]
    }
}
