//! Action catalog.
//!
//! Maps action types to their handlers and catalog metadata. The
//! registry is built once at startup and never mutated afterwards; the
//! engine borrows handlers from it for the lifetime of the process.

use crate::handler::adjust_budget::AdjustBudgetHandler;
use crate::handler::approve_leave::ApproveLeaveHandler;
use crate::handler::categorize_transactions::CategorizeTransactionsHandler;
use crate::handler::create_invoice::CreateInvoiceHandler;
use crate::handler::create_transaction::CreateTransactionHandler;
use crate::handler::export_transactions::ExportTransactionsHandler;
use crate::handler::follow_up_quote::FollowUpQuoteHandler;
use crate::handler::generate_report::GenerateReportHandler;
use crate::handler::import_statement::ImportStatementHandler;
use crate::handler::record_payment::RecordPaymentHandler;
use crate::handler::schedule_meeting::ScheduleMeetingHandler;
use crate::handler::send_reminders::SendRemindersHandler;
use crate::handler::ActionHandler;
use crate::types::{ActionCategory, ActionDefinition, ActionType};

struct RegistryEntry {
    definition: ActionDefinition,
    handler: Box<dyn ActionHandler>,
}

/// Immutable table of registered actions, in catalog order.
pub struct ActionRegistry {
    entries: Vec<RegistryEntry>,
}

impl ActionRegistry {
    /// An empty registry. Most callers want [`ActionRegistry::with_defaults`].
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry with every built-in action registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register a handler with its catalog metadata.
    ///
    /// Category and permissions come from the handler itself so the
    /// catalog can never disagree with what the handler enforces.
    pub fn register(
        &mut self,
        handler: Box<dyn ActionHandler>,
        label: &'static str,
        description: &'static str,
        confirmation_required: bool,
    ) {
        let action_type = handler.action_type();
        let definition = ActionDefinition {
            action_type,
            category: action_type.category(),
            label,
            description,
            confirmation_required,
            required_permissions: handler.required_permissions(),
        };
        self.entries.push(RegistryEntry {
            definition,
            handler,
        });
    }

    /// Register the twelve built-in actions.
    ///
    /// Mutating actions require confirmation; pure reads and the
    /// scheduling stub execute on submit.
    pub fn register_defaults(&mut self) {
        self.register(
            Box::new(CreateTransactionHandler),
            "Record transaction",
            "Record a one-off income or expense against a money account",
            true,
        );
        self.register(
            Box::new(RecordPaymentHandler),
            "Record payment",
            "Apply a customer payment to an open invoice",
            true,
        );
        self.register(
            Box::new(CreateInvoiceHandler),
            "Create invoice",
            "Create an invoice with line items for a customer",
            true,
        );
        self.register(
            Box::new(AdjustBudgetHandler),
            "Adjust budget",
            "Set a budget category to a new monthly amount",
            true,
        );
        self.register(
            Box::new(ApproveLeaveHandler),
            "Approve leave",
            "Approve pending employee leave requests",
            true,
        );
        self.register(
            Box::new(FollowUpQuoteHandler),
            "Follow up quotes",
            "Mark quotes awaiting a customer response as followed up",
            true,
        );
        self.register(
            Box::new(SendRemindersHandler),
            "Send invoice reminders",
            "Record reminders for unpaid invoices past their due date",
            true,
        );
        self.register(
            Box::new(ImportStatementHandler),
            "Import bank statement",
            "Import statement rows as movements, skipping duplicates",
            true,
        );
        self.register(
            Box::new(CategorizeTransactionsHandler),
            "Categorize transactions",
            "Apply confident category suggestions to uncategorized movements",
            true,
        );
        self.register(
            Box::new(GenerateReportHandler),
            "Generate report",
            "Summarize income, expenses, and budgets for a period",
            false,
        );
        self.register(
            Box::new(ScheduleMeetingHandler),
            "Schedule meeting",
            "Prepare a meeting for the calendar collaborator",
            false,
        );
        self.register(
            Box::new(ExportTransactionsHandler),
            "Export transactions",
            "Return the completed movements in a period for export",
            false,
        );
    }

    /// Catalog entry for an action type.
    pub fn get(&self, action_type: ActionType) -> Option<&ActionDefinition> {
        self.entries
            .iter()
            .map(|e| &e.definition)
            .find(|d| d.action_type == action_type)
    }

    /// Handler for an action type.
    pub fn handler(&self, action_type: ActionType) -> Option<&dyn ActionHandler> {
        self.entries
            .iter()
            .find(|e| e.definition.action_type == action_type)
            .map(|e| e.handler.as_ref())
    }

    /// Parse a raw action name into a registered type. Unknown or
    /// unregistered names are `None`, never an error.
    pub fn resolve(&self, raw: &str) -> Option<ActionType> {
        raw.parse::<ActionType>()
            .ok()
            .filter(|t| self.get(*t).is_some())
    }

    /// All catalog entries, in registration order.
    pub fn all(&self) -> Vec<&ActionDefinition> {
        self.entries.iter().map(|e| &e.definition).collect()
    }

    /// Catalog entries for one business area.
    pub fn by_category(&self, category: ActionCategory) -> Vec<&ActionDefinition> {
        self.entries
            .iter()
            .map(|e| &e.definition)
            .filter(|d| d.category == category)
            .collect()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
