//! Core types and value objects for the action engine.
//!
//! Defines action identities, previews, execution results, and their
//! supporting enumerations.

use opsmith_core::types::{OrgId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

/// Action types mapping to handler implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTransaction,
    RecordPayment,
    CreateInvoice,
    AdjustBudget,
    ApproveLeave,
    FollowUpQuote,
    SendInvoiceReminders,
    ImportBankStatement,
    CategorizeTransactions,
    GenerateReport,
    ScheduleMeeting,
    ExportTransactions,
}

impl ActionType {
    /// Every registered action type, in catalog order.
    pub const ALL: [ActionType; 12] = [
        ActionType::CreateTransaction,
        ActionType::RecordPayment,
        ActionType::CreateInvoice,
        ActionType::AdjustBudget,
        ActionType::ApproveLeave,
        ActionType::FollowUpQuote,
        ActionType::SendInvoiceReminders,
        ActionType::ImportBankStatement,
        ActionType::CategorizeTransactions,
        ActionType::GenerateReport,
        ActionType::ScheduleMeeting,
        ActionType::ExportTransactions,
    ];

    /// The business area an action belongs to.
    pub fn category(&self) -> ActionCategory {
        match self {
            ActionType::CreateTransaction => ActionCategory::Banking,
            ActionType::RecordPayment => ActionCategory::Billing,
            ActionType::CreateInvoice => ActionCategory::Billing,
            ActionType::AdjustBudget => ActionCategory::Budgeting,
            ActionType::ApproveLeave => ActionCategory::Workforce,
            ActionType::FollowUpQuote => ActionCategory::Sales,
            ActionType::SendInvoiceReminders => ActionCategory::Billing,
            ActionType::ImportBankStatement => ActionCategory::Banking,
            ActionType::CategorizeTransactions => ActionCategory::Banking,
            ActionType::GenerateReport => ActionCategory::Reporting,
            ActionType::ScheduleMeeting => ActionCategory::Scheduling,
            ActionType::ExportTransactions => ActionCategory::Reporting,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::CreateTransaction => write!(f, "create_transaction"),
            ActionType::RecordPayment => write!(f, "record_payment"),
            ActionType::CreateInvoice => write!(f, "create_invoice"),
            ActionType::AdjustBudget => write!(f, "adjust_budget"),
            ActionType::ApproveLeave => write!(f, "approve_leave"),
            ActionType::FollowUpQuote => write!(f, "follow_up_quote"),
            ActionType::SendInvoiceReminders => write!(f, "send_invoice_reminders"),
            ActionType::ImportBankStatement => write!(f, "import_bank_statement"),
            ActionType::CategorizeTransactions => write!(f, "categorize_transactions"),
            ActionType::GenerateReport => write!(f, "generate_report"),
            ActionType::ScheduleMeeting => write!(f, "schedule_meeting"),
            ActionType::ExportTransactions => write!(f, "export_transactions"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_transaction" => Ok(ActionType::CreateTransaction),
            "record_payment" => Ok(ActionType::RecordPayment),
            "create_invoice" => Ok(ActionType::CreateInvoice),
            "adjust_budget" => Ok(ActionType::AdjustBudget),
            "approve_leave" => Ok(ActionType::ApproveLeave),
            "follow_up_quote" => Ok(ActionType::FollowUpQuote),
            "send_invoice_reminders" => Ok(ActionType::SendInvoiceReminders),
            "import_bank_statement" => Ok(ActionType::ImportBankStatement),
            "categorize_transactions" => Ok(ActionType::CategorizeTransactions),
            "generate_report" => Ok(ActionType::GenerateReport),
            "schedule_meeting" => Ok(ActionType::ScheduleMeeting),
            "export_transactions" => Ok(ActionType::ExportTransactions),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Business areas used to group actions in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Billing,
    Banking,
    Budgeting,
    Workforce,
    Sales,
    Reporting,
    Scheduling,
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCategory::Billing => write!(f, "billing"),
            ActionCategory::Banking => write!(f, "banking"),
            ActionCategory::Budgeting => write!(f, "budgeting"),
            ActionCategory::Workforce => write!(f, "workforce"),
            ActionCategory::Sales => write!(f, "sales"),
            ActionCategory::Reporting => write!(f, "reporting"),
            ActionCategory::Scheduling => write!(f, "scheduling"),
        }
    }
}

impl std::str::FromStr for ActionCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "billing" => Ok(ActionCategory::Billing),
            "banking" => Ok(ActionCategory::Banking),
            "budgeting" => Ok(ActionCategory::Budgeting),
            "workforce" => Ok(ActionCategory::Workforce),
            "sales" => Ok(ActionCategory::Sales),
            "reporting" => Ok(ActionCategory::Reporting),
            "scheduling" => Ok(ActionCategory::Scheduling),
            _ => Err(format!("Unknown action category: {}", s)),
        }
    }
}

/// How consequential an action is, shown alongside the preview so the
/// caller can calibrate how prominently to ask for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Low => write!(f, "low"),
            Impact::Medium => write!(f, "medium"),
            Impact::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Impact {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Impact::Low),
            "medium" => Ok(Impact::Medium),
            "high" => Ok(Impact::High),
            _ => Err(format!("Unknown impact: {}", s)),
        }
    }
}

/// Permissions an action needs from the acting user.
///
/// The engine does not enforce these itself; they are surfaced through the
/// catalog so the session layer can gate submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    BillingWrite,
    LedgerWrite,
    BudgetWrite,
    WorkforceWrite,
    SalesWrite,
    ReportRead,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::BillingWrite => write!(f, "billing_write"),
            Permission::LedgerWrite => write!(f, "ledger_write"),
            Permission::BudgetWrite => write!(f, "budget_write"),
            Permission::WorkforceWrite => write!(f, "workforce_write"),
            Permission::SalesWrite => write!(f, "sales_write"),
            Permission::ReportRead => write!(f, "report_read"),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// The organization and user an action runs on behalf of.
///
/// Every engine entry point takes a scope; all reads and writes are
/// restricted to the scope's organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionScope {
    pub organization_id: OrgId,
    pub user_id: UserId,
}

impl ActionScope {
    pub fn new(organization_id: OrgId, user_id: UserId) -> Self {
        Self {
            organization_id,
            user_id,
        }
    }
}

/// A request to run an action, as produced by the assistant layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: ActionType,
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({})
}

impl ActionRequest {
    pub fn new(action_type: ActionType, parameters: serde_json::Value) -> Self {
        Self {
            action_type,
            parameters,
        }
    }
}

/// Human-readable description of what an action will do, shown to the
/// user before they confirm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    pub title: String,
    pub description: String,
    /// Structured rows backing the summary (one per affected record).
    pub items: Vec<serde_json::Value>,
    pub impact: Impact,
    pub warnings: Vec<String>,
}

impl Preview {
    pub fn new(title: impl Into<String>, description: impl Into<String>, impact: Impact) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            items: Vec::new(),
            impact,
            warnings: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<serde_json::Value>) -> Self {
        self.items = items;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Result returned by action handlers and stored on the invocation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    /// Structured output (ids created, counts, report body).
    pub payload: serde_json::Value,
    /// Token the handler needs to reverse the action, if it supports undo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo: Option<serde_json::Value>,
}

impl ExecutionResult {
    pub fn ok(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload,
            undo: None,
        }
    }

    pub fn with_undo(mut self, undo: serde_json::Value) -> Self {
        self.undo = Some(undo);
        self
    }
}

/// Catalog entry describing a registered action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionDefinition {
    pub action_type: ActionType,
    pub category: ActionCategory,
    pub label: &'static str,
    pub description: &'static str,
    /// Whether submission parks the action pending explicit confirmation.
    pub confirmation_required: bool,
    pub required_permissions: Vec<Permission>,
}

// =============================================================================
// Tests
// =============================================================================
