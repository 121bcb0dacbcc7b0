//! Action handler trait and execution context.
//!
//! Defines the `ActionHandler` trait every action implements and the
//! per-request context threaded into validate/preview/execute calls.

pub mod adjust_budget;
pub mod approve_leave;
pub mod categorize_transactions;
pub mod create_invoice;
pub mod create_transaction;
pub mod export_transactions;
pub mod follow_up_quote;
pub mod generate_report;
pub mod import_statement;
pub mod record_payment;
pub mod schedule_meeting;
pub mod send_reminders;

use chrono::NaiveDate;
use rusqlite::Connection;
use uuid::Uuid;

use opsmith_core::clock::Clock;
use opsmith_core::config::OpsConfig;
use opsmith_core::types::OrgId;
use opsmith_store::entities::MoneyAccount;
use opsmith_store::ledger;

use crate::categorize::Categorizer;
use crate::error::ActionError;
use crate::types::{ActionScope, ActionType, ExecutionResult, Impact, Permission, Preview};

/// Request-scoped dependencies for one handler call.
pub struct ActionContext<'a> {
    pub scope: ActionScope,
    pub clock: &'a dyn Clock,
    pub categorizer: &'a dyn Categorizer,
    pub config: &'a OpsConfig,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        scope: ActionScope,
        clock: &'a dyn Clock,
        categorizer: &'a dyn Categorizer,
        config: &'a OpsConfig,
    ) -> Self {
        Self {
            scope,
            clock,
            categorizer,
            config,
        }
    }

    pub fn org(&self) -> OrgId {
        self.scope.organization_id
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}

/// One executable action.
///
/// Handlers are synchronous. Every call runs against a connection the
/// engine already holds, inside whatever transaction the engine opened;
/// `execute` must write only through that connection so its effects
/// commit or roll back together with the invocation record.
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Structural checks and existence probes. Runs when the action is
    /// submitted and again right before execution, since the world can
    /// change while an invocation waits for confirmation.
    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError>;

    /// Describe what `execute` would do, without side effects.
    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError>;

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError>;

    /// Blast-radius estimate shown in the confirmation prompt.
    fn impact(&self, _params: &serde_json::Value) -> Impact {
        Impact::Medium
    }

    fn required_permissions(&self) -> Vec<Permission> {
        Vec::new()
    }

    fn can_undo(&self) -> bool {
        false
    }

    /// Compensate an executed action using its stored result.
    fn undo(
        &self,
        _ctx: &ActionContext<'_>,
        _conn: &Connection,
        _result: &ExecutionResult,
    ) -> Result<ExecutionResult, ActionError> {
        Err(ActionError::UnsupportedUndo(self.action_type()))
    }
}

/// Resolve the account money should move against: the requested one, or
/// the organization's default active account when none was given.
pub(crate) fn resolve_account(
    ctx: &ActionContext<'_>,
    conn: &Connection,
    requested: Option<Uuid>,
) -> Result<MoneyAccount, ActionError> {
    match requested {
        Some(id) => ledger::get_account(conn, ctx.org(), id)?
            .ok_or_else(|| ActionError::NotFound(format!("Account {}", id))),
        None => ledger::default_account(conn, ctx.org())?.ok_or_else(|| {
            ActionError::Conflict("No active money account for the organization".to_string())
        }),
    }
}
