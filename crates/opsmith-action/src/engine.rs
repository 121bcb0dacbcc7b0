//! The action engine.
//!
//! Front door for everything the assistant layer does with actions:
//! preview, submit, confirm, cancel, undo, and the catalog surface.
//! Execution is at-most-once. Confirming claims the pending invocation
//! with a guarded state flip and runs the handler inside the same
//! IMMEDIATE transaction that records the result, so either the side
//! effects and the executed record commit together or neither does.
//! A duplicate confirm finds the executed row and replays its stored
//! result instead of running the handler again.

use std::sync::Arc;

use uuid::Uuid;

use opsmith_core::clock::Clock;
use opsmith_core::config::OpsConfig;
use opsmith_core::error::OpsError;
use opsmith_store::entities::{ActionInvocation, InvocationState};
use opsmith_store::{invocations, Database};

use crate::categorize::Categorizer;
use crate::error::ActionError;
use crate::handler::ActionContext;
use crate::invocation::validate_transition;
use crate::registry::ActionRegistry;
use crate::types::{
    ActionCategory, ActionDefinition, ActionRequest, ActionScope, ActionType, ExecutionResult,
    Preview,
};

/// What `submit` did with the request.
#[derive(Debug)]
pub enum Submission {
    /// The action needed no confirmation and has already run.
    Executed {
        invocation_id: Uuid,
        result: ExecutionResult,
    },
    /// A pending invocation was parked; `confirm` or `cancel` it by id
    /// before the expiry deadline.
    AwaitingConfirmation {
        invocation: ActionInvocation,
        preview: Preview,
    },
}

/// Outcome of the confirm transaction, separated so the expiry flip
/// commits even though the caller sees an error.
enum ConfirmOutcome {
    Done(ExecutionResult),
    Expired,
}

pub struct ActionEngine {
    registry: ActionRegistry,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    categorizer: Arc<dyn Categorizer>,
    config: OpsConfig,
}

impl ActionEngine {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        categorizer: Arc<dyn Categorizer>,
        config: OpsConfig,
    ) -> Self {
        Self {
            registry: ActionRegistry::with_defaults(),
            db,
            clock,
            categorizer,
            config,
        }
    }

    fn context(&self, scope: ActionScope) -> ActionContext<'_> {
        ActionContext::new(
            scope,
            self.clock.as_ref(),
            self.categorizer.as_ref(),
            &self.config,
        )
    }

    fn definition(&self, action_type: ActionType) -> Result<&ActionDefinition, ActionError> {
        self.registry
            .get(action_type)
            .ok_or_else(|| ActionError::UnknownAction(action_type.to_string()))
    }

    fn handler_for(
        &self,
        action_type: ActionType,
    ) -> Result<&dyn crate::handler::ActionHandler, ActionError> {
        self.registry
            .handler(action_type)
            .ok_or_else(|| ActionError::UnknownAction(action_type.to_string()))
    }

    /// Validate and preview without touching anything.
    pub fn preview(
        &self,
        scope: ActionScope,
        request: &ActionRequest,
    ) -> Result<Preview, ActionError> {
        let handler = self.handler_for(request.action_type)?;
        let ctx = self.context(scope);
        self.db.with_conn(|conn| {
            handler.validate(&ctx, conn, &request.parameters)?;
            handler.preview(&ctx, conn, &request.parameters)
        })
    }

    /// Submit a request.
    ///
    /// Actions that need no confirmation validate and execute in one
    /// transaction, leaving a born-executed audit row. Everything else
    /// validates, previews, and parks a pending invocation.
    pub fn submit(
        &self,
        scope: ActionScope,
        request: &ActionRequest,
    ) -> Result<Submission, ActionError> {
        let definition = self.definition(request.action_type)?;
        let handler = self.handler_for(request.action_type)?;
        let ctx = self.context(scope);
        let now = self.clock.timestamp();
        let ttl = self.config.confirmation.ttl_seconds();

        if !definition.confirmation_required {
            return self.db.with_tx(|tx| {
                handler.validate(&ctx, tx, &request.parameters)?;
                let result = handler.execute(&ctx, tx, &request.parameters)?;

                let mut invocation = ActionInvocation::new(
                    scope.organization_id,
                    scope.user_id,
                    request.action_type.to_string(),
                    request.parameters.clone(),
                    now,
                    ttl,
                );
                invocation.state = InvocationState::Executed;
                invocation.result = Some(result_value(&result)?);
                invocation.executed_at = Some(now);
                invocations::insert_invocation(tx, &invocation)?;

                tracing::info!(
                    invocation_id = %invocation.id,
                    action = %request.action_type,
                    "Action executed on submit"
                );
                Ok(Submission::Executed {
                    invocation_id: invocation.id,
                    result,
                })
            });
        }

        self.db.with_tx(|tx| {
            handler.validate(&ctx, tx, &request.parameters)?;
            let preview = handler.preview(&ctx, tx, &request.parameters)?;

            let invocation = ActionInvocation::new(
                scope.organization_id,
                scope.user_id,
                request.action_type.to_string(),
                request.parameters.clone(),
                now,
                ttl,
            );
            invocations::insert_invocation(tx, &invocation)?;

            tracing::info!(
                invocation_id = %invocation.id,
                action = %request.action_type,
                expires_at = invocation.expires_at.0,
                "Action awaiting confirmation"
            );
            Ok(Submission::AwaitingConfirmation {
                invocation,
                preview,
            })
        })
    }

    /// Confirm a pending invocation and execute it.
    ///
    /// At most one confirm executes; the rest replay the stored result
    /// or get a conflict. A lapsed invocation is flipped to expired and
    /// the flip sticks even though the call errors.
    pub fn confirm(&self, scope: ActionScope, id: Uuid) -> Result<ExecutionResult, ActionError> {
        let ctx = self.context(scope);
        let now = self.clock.timestamp();

        let outcome = self.db.with_tx(|tx| {
            let invocation = invocations::get_invocation(tx, scope.organization_id, id)?
                .ok_or_else(|| ActionError::NotFound(format!("Invocation {}", id)))?;

            match invocation.state {
                InvocationState::Executed => {
                    tracing::info!(invocation_id = %id, "Duplicate confirm, replaying stored result");
                    return Ok(ConfirmOutcome::Done(stored_result(&invocation)?));
                }
                InvocationState::Cancelled | InvocationState::Expired => {
                    return Err(ActionError::Conflict(format!(
                        "Invocation {} is {}",
                        id, invocation.state
                    )));
                }
                InvocationState::Confirmed => {
                    return Err(ActionError::Conflict(format!(
                        "Invocation {} is already being executed",
                        id
                    )));
                }
                InvocationState::Pending => {}
            }

            if invocation.is_expired(now) {
                invocations::transition_state(
                    tx,
                    id,
                    InvocationState::Pending,
                    InvocationState::Expired,
                )?;
                return Ok(ConfirmOutcome::Expired);
            }

            if !invocations::transition_state(
                tx,
                id,
                InvocationState::Pending,
                InvocationState::Confirmed,
            )? {
                return Err(ActionError::Conflict(format!(
                    "Invocation {} was claimed concurrently",
                    id
                )));
            }

            let action_type = self
                .registry
                .resolve(&invocation.action_type)
                .ok_or_else(|| ActionError::UnknownAction(invocation.action_type.clone()))?;
            let handler = self.handler_for(action_type)?;

            // The world may have changed while the invocation waited.
            handler.validate(&ctx, tx, &invocation.parameters)?;
            let result = handler.execute(&ctx, tx, &invocation.parameters)?;
            invocations::record_result(tx, id, &result_value(&result)?, now)?;

            tracing::info!(invocation_id = %id, action = %action_type, "Action executed");
            Ok(ConfirmOutcome::Done(result))
        })?;

        match outcome {
            ConfirmOutcome::Done(result) => Ok(result),
            ConfirmOutcome::Expired => Err(ActionError::Conflict(format!(
                "Invocation {} has expired",
                id
            ))),
        }
    }

    /// Cancel a pending invocation. Nothing has run, nothing is undone.
    pub fn cancel(&self, scope: ActionScope, id: Uuid) -> Result<ActionInvocation, ActionError> {
        self.db.with_tx(|tx| {
            let invocation = invocations::get_invocation(tx, scope.organization_id, id)?
                .ok_or_else(|| ActionError::NotFound(format!("Invocation {}", id)))?;

            validate_transition(invocation.state, InvocationState::Cancelled)?;
            if !invocations::transition_state(
                tx,
                id,
                InvocationState::Pending,
                InvocationState::Cancelled,
            )? {
                return Err(ActionError::Conflict(format!(
                    "Invocation {} was claimed concurrently",
                    id
                )));
            }

            tracing::info!(invocation_id = %id, action = %invocation.action_type, "Invocation cancelled");
            invocations::get_invocation(tx, scope.organization_id, id)?
                .ok_or_else(|| ActionError::NotFound(format!("Invocation {}", id)))
        })
    }

    /// Reverse an executed invocation through its handler's undo.
    ///
    /// The compensation uses the stored result, not a re-derivation, so
    /// it reverses exactly what was recorded. The audit row keeps its
    /// result with an `undone` marker added to the payload.
    pub fn undo(&self, scope: ActionScope, id: Uuid) -> Result<ExecutionResult, ActionError> {
        let ctx = self.context(scope);

        self.db.with_tx(|tx| {
            let invocation = invocations::get_invocation(tx, scope.organization_id, id)?
                .ok_or_else(|| ActionError::NotFound(format!("Invocation {}", id)))?;

            if invocation.state != InvocationState::Executed {
                return Err(ActionError::Conflict(format!(
                    "Invocation {} is {}, only executed actions can be undone",
                    id, invocation.state
                )));
            }

            let action_type = self
                .registry
                .resolve(&invocation.action_type)
                .ok_or_else(|| ActionError::UnknownAction(invocation.action_type.clone()))?;
            let handler = self.handler_for(action_type)?;
            if !handler.can_undo() {
                return Err(ActionError::UnsupportedUndo(action_type));
            }

            let mut stored = stored_result(&invocation)?;
            if stored
                .payload
                .get("undone")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                return Err(ActionError::Conflict(format!(
                    "Invocation {} was already undone",
                    id
                )));
            }

            let undo_result = handler.undo(&ctx, tx, &stored)?;

            if let serde_json::Value::Object(payload) = &mut stored.payload {
                payload.insert("undone".to_string(), serde_json::Value::Bool(true));
            }
            stored.undo = None;
            invocations::update_result(tx, id, &result_value(&stored)?)?;

            tracing::info!(invocation_id = %id, action = %action_type, "Action undone");
            Ok(undo_result)
        })
    }

    /// Fetch one invocation in the caller's organization.
    pub fn invocation(
        &self,
        scope: ActionScope,
        id: Uuid,
    ) -> Result<ActionInvocation, ActionError> {
        self.db.with_conn(|conn| {
            invocations::get_invocation(conn, scope.organization_id, id)?
                .ok_or_else(|| ActionError::NotFound(format!("Invocation {}", id)))
        })
    }

    /// List invocations, newest first.
    pub fn list_invocations(
        &self,
        scope: ActionScope,
        state: Option<InvocationState>,
        limit: u64,
    ) -> Result<Vec<ActionInvocation>, ActionError> {
        self.db.with_conn(|conn| {
            Ok(invocations::list_invocations(
                conn,
                scope.organization_id,
                state,
                limit,
            )?)
        })
    }

    /// Flip every lapsed pending invocation to expired.
    pub fn expire_stale(&self) -> Result<Vec<Uuid>, ActionError> {
        let now = self.clock.timestamp();
        let expired = self
            .db
            .with_tx(|tx| -> Result<Vec<Uuid>, ActionError> {
                Ok(invocations::expire_stale(tx, now)?)
            })?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired stale invocations");
        }
        Ok(expired)
    }

    /// The engine's effective configuration.
    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    /// The full action catalog.
    pub fn definitions(&self) -> Vec<&ActionDefinition> {
        self.registry.all()
    }

    /// The catalog for one business area.
    pub fn definitions_by_category(&self, category: ActionCategory) -> Vec<&ActionDefinition> {
        self.registry.by_category(category)
    }
}

fn result_value(result: &ExecutionResult) -> Result<serde_json::Value, ActionError> {
    Ok(serde_json::to_value(result).map_err(OpsError::from)?)
}

fn stored_result(invocation: &ActionInvocation) -> Result<ExecutionResult, ActionError> {
    let value = invocation.result.clone().ok_or_else(|| {
        ActionError::Conflict(format!("Invocation {} has no stored result", invocation.id))
    })?;
    Ok(serde_json::from_value(value).map_err(OpsError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use chrono::NaiveDate;

    use opsmith_core::clock::FixedClock;
    use opsmith_core::types::{FlowType, Money, OrgId, UserId};
    use opsmith_store::entities::{Customer, Invoice, LeaveRequest, MoneyAccount, MoneyMovement};
    use opsmith_store::{backoffice, billing, ledger};
    use serde_json::json;

    use crate::categorize::KeywordCategorizer;

    struct EngineEnv {
        engine: Arc<ActionEngine>,
        db: Arc<Database>,
        clock: Arc<FixedClock>,
        scope: ActionScope,
    }

    impl EngineEnv {
        fn new() -> Self {
            let db = Arc::new(Database::in_memory().unwrap());
            let clock = Arc::new(FixedClock::on(2024, 3, 15));
            let engine = Arc::new(ActionEngine::new(
                db.clone(),
                clock.clone(),
                Arc::new(KeywordCategorizer::new()),
                OpsConfig::default(),
            ));
            let scope = ActionScope::new(OrgId::new(), UserId::new());
            Self {
                engine,
                db,
                clock,
                scope,
            }
        }

        fn org(&self) -> OrgId {
            self.scope.organization_id
        }

        fn seed_account(&self, opening: Money) -> MoneyAccount {
            let mut account = MoneyAccount::new(self.org(), "Checking", opening);
            account.is_default = true;
            self.db
                .with_conn(|conn| ledger::insert_account(conn, &account))
                .unwrap();
            account
        }

        fn seed_invoice(&self, total: Money) -> Invoice {
            let customer = Customer::new(self.org(), "Acme Corp", None);
            self.db
                .with_conn(|conn| billing::insert_customer(conn, &customer))
                .unwrap();
            let invoice = Invoice::new(self.org(), customer.id, "INV-0001", total, None);
            self.db
                .with_conn(|conn| billing::insert_invoice(conn, &invoice))
                .unwrap();
            invoice
        }

        fn balance(&self, account_id: uuid::Uuid) -> Money {
            self.db
                .with_conn(|conn| ledger::get_account(conn, self.org(), account_id))
                .unwrap()
                .unwrap()
                .balance
        }

        fn movements(&self) -> Vec<MoneyMovement> {
            self.db
                .with_conn(|conn| {
                    ledger::list_movements_in_range(
                        conn,
                        self.org(),
                        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                    )
                })
                .unwrap()
        }

        fn submit_expense(&self, amount: &str) -> ActionInvocation {
            let request = ActionRequest::new(
                ActionType::CreateTransaction,
                json!({"amount": amount, "description": "Team lunch"}),
            );
            match self.engine.submit(self.scope, &request).unwrap() {
                Submission::AwaitingConfirmation { invocation, .. } => invocation,
                Submission::Executed { .. } => panic!("expected confirmation gate"),
            }
        }
    }

    // ---- Submit ----

    #[test]
    fn test_submit_parks_pending_invocation_without_side_effects() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));

        let invocation = env.submit_expense("45.00");

        assert_eq!(invocation.state, InvocationState::Pending);
        assert_eq!(invocation.expires_at.0 - invocation.created_at.0, 900);
        assert!(env.movements().is_empty());
        assert_eq!(env.balance(account.id), Money::from_cents(100_000));

        let stored = env.engine.invocation(env.scope, invocation.id).unwrap();
        assert_eq!(stored.state, InvocationState::Pending);
        assert_eq!(stored.parameters["amount"], "45.00");
    }

    #[test]
    fn test_invalid_submission_persists_nothing() {
        let env = EngineEnv::new();
        env.seed_account(Money::from_cents(100_000));

        let request = ActionRequest::new(
            ActionType::CreateTransaction,
            json!({"amount": "0", "description": "Team lunch"}),
        );
        let err = env.engine.submit(env.scope, &request).unwrap_err();
        assert!(matches!(err, ActionError::Validation { .. }));

        assert!(env
            .engine
            .list_invocations(env.scope, None, 50)
            .unwrap()
            .is_empty());
        assert!(env.movements().is_empty());
    }

    #[test]
    fn test_read_only_action_executes_on_submit() {
        let env = EngineEnv::new();
        env.seed_account(Money::from_cents(100_000));

        let request = ActionRequest::new(ActionType::GenerateReport, json!({}));
        let submission = env.engine.submit(env.scope, &request).unwrap();

        let (invocation_id, result) = match submission {
            Submission::Executed {
                invocation_id,
                result,
            } => (invocation_id, result),
            Submission::AwaitingConfirmation { .. } => panic!("report should not gate"),
        };
        assert!(result.success);

        let stored = env.engine.invocation(env.scope, invocation_id).unwrap();
        assert_eq!(stored.state, InvocationState::Executed);
        assert!(stored.result.is_some());
        assert!(stored.executed_at.is_some());
    }

    // ---- Confirm ----

    #[test]
    fn test_confirm_executes_and_records_result() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");

        let result = env.engine.confirm(env.scope, invocation.id).unwrap();
        assert!(result.success);
        assert_eq!(result.payload["amount_cents"], 4_500);

        assert_eq!(env.balance(account.id), Money::from_cents(95_500));
        assert_eq!(env.movements().len(), 1);

        let stored = env.engine.invocation(env.scope, invocation.id).unwrap();
        assert_eq!(stored.state, InvocationState::Executed);
        assert_eq!(
            stored.result.unwrap()["payload"]["amount_cents"],
            json!(4_500)
        );
    }

    #[test]
    fn test_duplicate_confirm_replays_without_re_executing() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");

        let first = env.engine.confirm(env.scope, invocation.id).unwrap();
        let second = env.engine.confirm(env.scope, invocation.id).unwrap();

        assert_eq!(first.payload["movement_id"], second.payload["movement_id"]);
        assert_eq!(env.movements().len(), 1);
        assert_eq!(env.balance(account.id), Money::from_cents(95_500));
    }

    #[test]
    fn test_concurrent_confirms_execute_exactly_once() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = env.engine.clone();
            let scope = env.scope;
            let id = invocation.id;
            handles.push(thread::spawn(move || engine.confirm(scope, id)));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(result) => {
                    assert_eq!(result.payload["amount_cents"], 4_500);
                    successes += 1;
                }
                Err(ActionError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert!(successes >= 1);

        // However the confirms interleaved, the movement landed once.
        assert_eq!(env.movements().len(), 1);
        assert_eq!(env.balance(account.id), Money::from_cents(95_500));
    }

    #[test]
    fn test_confirm_after_ttl_expires_the_invocation() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");

        env.clock.advance_seconds(901);
        let err = env.engine.confirm(env.scope, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::Conflict(ref msg) if msg.contains("expired")));

        // The expiry flip survives the failed confirm.
        let stored = env.engine.invocation(env.scope, invocation.id).unwrap();
        assert_eq!(stored.state, InvocationState::Expired);
        assert_eq!(env.balance(account.id), Money::from_cents(100_000));

        // And stays terminal on a retry.
        let err = env.engine.confirm(env.scope, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::Conflict(_)));
    }

    #[test]
    fn test_confirm_unknown_invocation_not_found() {
        let env = EngineEnv::new();
        let err = env.engine.confirm(env.scope, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
    }

    #[test]
    fn test_confirm_scoped_to_organization() {
        let env = EngineEnv::new();
        env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");

        let foreign = ActionScope::new(OrgId::new(), UserId::new());
        let err = env.engine.confirm(foreign, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));

        // Still confirmable by the owner.
        env.engine.confirm(env.scope, invocation.id).unwrap();
    }

    #[test]
    fn test_failed_execution_rolls_back_and_leaves_pending() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));
        let invoice = env.seed_invoice(Money::from_cents(50_000));

        let request = ActionRequest::new(
            ActionType::RecordPayment,
            json!({"amount": "100.00", "invoice_id": invoice.id}),
        );
        let invocation = match env.engine.submit(env.scope, &request).unwrap() {
            Submission::AwaitingConfirmation { invocation, .. } => invocation,
            Submission::Executed { .. } => panic!("expected confirmation gate"),
        };

        // Settle the invoice behind the invocation's back.
        env.db
            .with_conn(|conn| billing::settle_invoice(conn, invoice.id, Money::from_cents(50_000)))
            .unwrap();

        let err = env.engine.confirm(env.scope, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::Conflict(_)));

        // The claim rolled back with the rest of the transaction.
        let stored = env.engine.invocation(env.scope, invocation.id).unwrap();
        assert_eq!(stored.state, InvocationState::Pending);
        assert_eq!(env.balance(account.id), Money::from_cents(100_000));
    }

    // ---- Cancel ----

    #[test]
    fn test_cancel_pending_invocation() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");

        let cancelled = env.engine.cancel(env.scope, invocation.id).unwrap();
        assert_eq!(cancelled.state, InvocationState::Cancelled);
        assert!(env.movements().is_empty());
        assert_eq!(env.balance(account.id), Money::from_cents(100_000));

        let err = env.engine.confirm(env.scope, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::Conflict(_)));
    }

    #[test]
    fn test_cancel_executed_invocation_rejected() {
        let env = EngineEnv::new();
        env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");
        env.engine.confirm(env.scope, invocation.id).unwrap();

        let err = env.engine.cancel(env.scope, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::InvalidTransition(_, _)));
    }

    // ---- Undo ----

    #[test]
    fn test_undo_restores_balance_once() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");
        env.engine.confirm(env.scope, invocation.id).unwrap();
        assert_eq!(env.balance(account.id), Money::from_cents(95_500));

        let undone = env.engine.undo(env.scope, invocation.id).unwrap();
        assert!(undone.success);
        assert_eq!(env.balance(account.id), Money::from_cents(100_000));

        let stored = env.engine.invocation(env.scope, invocation.id).unwrap();
        assert_eq!(stored.result.unwrap()["payload"]["undone"], json!(true));

        let err = env.engine.undo(env.scope, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::Conflict(ref msg) if msg.contains("already undone")));
        assert_eq!(env.balance(account.id), Money::from_cents(100_000));
    }

    #[test]
    fn test_undo_rejected_for_unsupported_action() {
        let env = EngineEnv::new();
        env.seed_account(Money::from_cents(100_000));

        let request = ActionRequest::new(ActionType::GenerateReport, json!({}));
        let invocation_id = match env.engine.submit(env.scope, &request).unwrap() {
            Submission::Executed { invocation_id, .. } => invocation_id,
            Submission::AwaitingConfirmation { .. } => panic!("report should not gate"),
        };

        let err = env.engine.undo(env.scope, invocation_id).unwrap_err();
        assert!(matches!(err, ActionError::UnsupportedUndo(_)));
    }

    #[test]
    fn test_undo_requires_executed_state() {
        let env = EngineEnv::new();
        env.seed_account(Money::from_cents(100_000));
        let invocation = env.submit_expense("45.00");

        let err = env.engine.undo(env.scope, invocation.id).unwrap_err();
        assert!(matches!(err, ActionError::Conflict(_)));
    }

    // ---- End-to-end flows ----

    #[test]
    fn test_invoice_totals_through_the_full_flow() {
        let env = EngineEnv::new();

        let request = ActionRequest::new(
            ActionType::CreateInvoice,
            json!({
                "customer_name": "Acme Corp",
                "items": [{"description": "Widget", "quantity": 2.0, "unit_price": "50.00"}],
                "tax": "10.00",
                "discount": "5.00",
            }),
        );
        let invocation = match env.engine.submit(env.scope, &request).unwrap() {
            Submission::AwaitingConfirmation { invocation, .. } => invocation,
            Submission::Executed { .. } => panic!("expected confirmation gate"),
        };
        let result = env.engine.confirm(env.scope, invocation.id).unwrap();

        assert_eq!(result.payload["subtotal_cents"], 10_000);
        assert_eq!(result.payload["total_cents"], 10_500);
    }

    #[test]
    fn test_overpayment_never_drives_outstanding_negative() {
        let env = EngineEnv::new();
        let invoice = env.seed_invoice(Money::from_cents(10_000));

        let request = ActionRequest::new(
            ActionType::RecordPayment,
            json!({"amount": "150.00", "invoice_id": invoice.id}),
        );
        let invocation = match env.engine.submit(env.scope, &request).unwrap() {
            Submission::AwaitingConfirmation { invocation, .. } => invocation,
            Submission::Executed { .. } => panic!("expected confirmation gate"),
        };
        let result = env.engine.confirm(env.scope, invocation.id).unwrap();

        assert_eq!(result.payload["applied_cents"], 10_000);
        assert_eq!(result.payload["outstanding_after_cents"], 0);

        let stored = env
            .db
            .with_conn(|conn| billing::get_invoice(conn, env.org(), invoice.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.outstanding, Money::ZERO);
    }

    #[test]
    fn test_approve_leave_with_no_pending_requests_not_found() {
        let env = EngineEnv::new();
        let request = ActionRequest::new(ActionType::ApproveLeave, json!({}));
        let err = env.engine.submit(env.scope, &request).unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));

        // Seeding one makes the same request submit cleanly.
        let leave = LeaveRequest::new(
            env.org(),
            "Dana Lee",
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
        );
        env.db
            .with_conn(|conn| backoffice::insert_leave_request(conn, &leave))
            .unwrap();
        assert!(env.engine.submit(env.scope, &request).is_ok());
    }

    #[test]
    fn test_statement_import_is_idempotent_across_invocations() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::ZERO);

        let params = json!({"rows": [
            {"date": "2024-03-01", "description": "AWS BILL", "amount": "45.00"},
            {"date": "2024-03-02", "description": "STRIPE PAYOUT", "amount": "1250.00", "flow_type": "income"},
        ]});
        let request = ActionRequest::new(ActionType::ImportBankStatement, params);

        for expected_imported in [2, 0] {
            let invocation = match env.engine.submit(env.scope, &request).unwrap() {
                Submission::AwaitingConfirmation { invocation, .. } => invocation,
                Submission::Executed { .. } => panic!("expected confirmation gate"),
            };
            let result = env.engine.confirm(env.scope, invocation.id).unwrap();
            assert_eq!(result.payload["imported"], expected_imported);
        }

        assert_eq!(env.movements().len(), 2);
        assert_eq!(env.balance(account.id), Money::from_cents(120_500));
    }

    #[test]
    fn test_balances_reconcile_with_movement_history() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));

        for (amount, flow) in [("45.00", "expense"), ("250.00", "income"), ("12.50", "expense")] {
            let request = ActionRequest::new(
                ActionType::CreateTransaction,
                json!({"amount": amount, "description": "Ledger check", "flow_type": flow}),
            );
            let invocation = match env.engine.submit(env.scope, &request).unwrap() {
                Submission::AwaitingConfirmation { invocation, .. } => invocation,
                Submission::Executed { .. } => panic!("expected confirmation gate"),
            };
            env.engine.confirm(env.scope, invocation.id).unwrap();
        }

        let net: i64 = env.movements().iter().map(|m| m.signed_amount().0).sum();
        assert_eq!(
            env.balance(account.id).0,
            100_000 + net,
            "balance must equal opening plus the signed movement history"
        );
        assert_eq!(env.balance(account.id), Money::from_cents(119_250));
    }

    #[test]
    fn test_preview_is_read_only() {
        let env = EngineEnv::new();
        let account = env.seed_account(Money::from_cents(100_000));

        let request = ActionRequest::new(
            ActionType::CreateTransaction,
            json!({"amount": "45.00", "description": "Team lunch"}),
        );
        let preview = env.engine.preview(env.scope, &request).unwrap();
        assert!(preview.title.contains("expense"));

        assert!(env.movements().is_empty());
        assert!(env
            .engine
            .list_invocations(env.scope, None, 50)
            .unwrap()
            .is_empty());
        assert_eq!(env.balance(account.id), Money::from_cents(100_000));
    }

    // ---- Expiry sweep ----

    #[test]
    fn test_expire_stale_sweeps_only_lapsed_invocations() {
        let env = EngineEnv::new();
        env.seed_account(Money::from_cents(100_000));

        let stale = env.submit_expense("45.00");
        env.clock.advance_seconds(600);
        let fresh = env.submit_expense("55.00");

        env.clock.advance_seconds(400);
        let expired = env.engine.expire_stale().unwrap();
        assert_eq!(expired, vec![stale.id]);

        assert_eq!(
            env.engine.invocation(env.scope, stale.id).unwrap().state,
            InvocationState::Expired
        );
        assert_eq!(
            env.engine.invocation(env.scope, fresh.id).unwrap().state,
            InvocationState::Pending
        );
    }

    // ---- Catalog ----

    #[test]
    fn test_catalog_surfaces() {
        let env = EngineEnv::new();
        assert_eq!(env.engine.definitions().len(), 12);
        let billing = env.engine.definitions_by_category(ActionCategory::Billing);
        assert!(billing
            .iter()
            .all(|d| d.category == ActionCategory::Billing));
        assert_eq!(billing.len(), 3);
    }
}
