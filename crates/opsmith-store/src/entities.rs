//! Entity structs and status enums for the business records.
//!
//! Every entity carries an `organization_id`; queries are always scoped
//! to one organization. Status enums serialize as snake_case strings and
//! match the CHECK constraints in the schema.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsmith_core::{FlowType, Money, OrgId, Timestamp, UserId};

// ===== Status enums =====

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Overdue,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    /// Whether the invoice can still receive payments.
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            _ => Err(format!("Unknown invoice status: {}", s)),
        }
    }
}

/// Money movement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    Pending,
    Completed,
    Reversed,
}

impl std::fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MovementStatus::Pending => "pending",
            MovementStatus::Completed => "completed",
            MovementStatus::Reversed => "reversed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for MovementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MovementStatus::Pending),
            "completed" => Ok(MovementStatus::Completed),
            "reversed" => Ok(MovementStatus::Reversed),
            _ => Err(format!("Unknown movement status: {}", s)),
        }
    }
}

/// Quote lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Sent,
    Accepted,
    Declined,
    Expired,
}

impl QuoteStatus {
    /// Whether the quote is still awaiting a customer decision.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, QuoteStatus::Pending | QuoteStatus::Sent)
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Declined => "declined",
            QuoteStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QuoteStatus::Pending),
            "sent" => Ok(QuoteStatus::Sent),
            "accepted" => Ok(QuoteStatus::Accepted),
            "declined" => Ok(QuoteStatus::Declined),
            "expired" => Ok(QuoteStatus::Expired),
            _ => Err(format!("Unknown quote status: {}", s)),
        }
    }
}

/// Leave request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Denied,
}

impl std::fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Denied => "denied",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for LeaveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeaveStatus::Pending),
            "approved" => Ok(LeaveStatus::Approved),
            "denied" => Ok(LeaveStatus::Denied),
            _ => Err(format!("Unknown leave status: {}", s)),
        }
    }
}

/// Action invocation state.
///
/// Transitions are forward-only: pending -> confirmed -> executed, with
/// pending -> cancelled and pending -> expired as terminal exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Pending,
    Confirmed,
    Executed,
    Cancelled,
    Expired,
}

impl InvocationState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvocationState::Executed | InvocationState::Cancelled | InvocationState::Expired
        )
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvocationState::Pending => "pending",
            InvocationState::Confirmed => "confirmed",
            InvocationState::Executed => "executed",
            InvocationState::Cancelled => "cancelled",
            InvocationState::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for InvocationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvocationState::Pending),
            "confirmed" => Ok(InvocationState::Confirmed),
            "executed" => Ok(InvocationState::Executed),
            "cancelled" => Ok(InvocationState::Cancelled),
            "expired" => Ok(InvocationState::Expired),
            _ => Err(format!("Unknown invocation state: {}", s)),
        }
    }
}

// ===== Entities =====

/// A customer of the organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub name: String,
    pub email: Option<String>,
    pub created_at: Timestamp,
}

impl Customer {
    pub fn new(organization_id: OrgId, name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            email,
            created_at: Timestamp::now(),
        }
    }
}

/// An invoice issued to a customer.
///
/// `outstanding` tracks the unpaid remainder and decreases as payments
/// are allocated; it never goes below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub customer_id: Uuid,
    pub number: String,
    pub status: InvoiceStatus,
    pub due_date: Option<NaiveDate>,
    pub total: Money,
    pub outstanding: Money,
    pub reminder_sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Invoice {
    pub fn new(
        organization_id: OrgId,
        customer_id: Uuid,
        number: impl Into<String>,
        total: Money,
        due_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            customer_id,
            number: number.into(),
            status: InvoiceStatus::Sent,
            due_date,
            total,
            outstanding: total,
            reminder_sent_at: None,
            created_at: Timestamp::now(),
        }
    }
}

/// A line item on an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: f64,
    pub unit_price: Money,
}

impl InvoiceItem {
    pub fn new(invoice_id: Uuid, description: impl Into<String>, quantity: f64, unit_price: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// Line total: quantity times unit price, rounded to whole cents.
    pub fn line_total(&self) -> Money {
        Money((self.quantity * self.unit_price.0 as f64).round() as i64)
    }
}

/// A payment received from a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub amount: Money,
    pub method: Option<String>,
    pub received_date: NaiveDate,
    pub created_at: Timestamp,
}

impl Payment {
    pub fn new(
        organization_id: OrgId,
        amount: Money,
        method: Option<String>,
        received_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            amount,
            method,
            received_date,
            created_at: Timestamp::now(),
        }
    }
}

/// Allocation of a payment amount against one invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Money,
}

impl PaymentAllocation {
    pub fn new(payment_id: Uuid, invoice_id: Uuid, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            invoice_id,
            amount,
        }
    }
}

/// A money account holding a running balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyAccount {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub name: String,
    pub balance: Money,
    pub is_default: bool,
    pub active: bool,
    pub created_at: Timestamp,
}

impl MoneyAccount {
    pub fn new(organization_id: OrgId, name: impl Into<String>, opening_balance: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            balance: opening_balance,
            is_default: false,
            active: true,
            created_at: Timestamp::now(),
        }
    }
}

/// A single ledger entry.
///
/// The flow type determines which account reference is set: expenses
/// record `from_account_id`, income records `to_account_id`. `amount`
/// is always positive; sign comes from the flow type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyMovement {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub flow_type: FlowType,
    pub amount: Money,
    pub category: Option<String>,
    pub description: String,
    pub date: NaiveDate,
    pub status: MovementStatus,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub fingerprint: Option<String>,
    pub fingerprint_version: Option<i64>,
    pub created_at: Timestamp,
}

impl MoneyMovement {
    pub fn new(
        organization_id: OrgId,
        flow_type: FlowType,
        amount: Money,
        description: impl Into<String>,
        date: NaiveDate,
        account_id: Uuid,
    ) -> Self {
        let (from_account_id, to_account_id) = match flow_type {
            FlowType::Expense => (Some(account_id), None),
            FlowType::Income => (None, Some(account_id)),
        };
        Self {
            id: Uuid::new_v4(),
            organization_id,
            flow_type,
            amount,
            category: None,
            description: description.into(),
            date,
            status: MovementStatus::Completed,
            from_account_id,
            to_account_id,
            fingerprint: None,
            fingerprint_version: None,
            created_at: Timestamp::now(),
        }
    }

    /// The account this movement touches, regardless of direction.
    pub fn account_id(&self) -> Option<Uuid> {
        self.from_account_id.or(self.to_account_id)
    }

    /// Amount with the flow sign applied: positive income, negative expense.
    pub fn signed_amount(&self) -> Money {
        self.flow_type.signed(self.amount)
    }
}

/// A quote offered to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub customer_id: Uuid,
    pub amount: Money,
    pub status: QuoteStatus,
    pub valid_until: Option<NaiveDate>,
    pub followed_up_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Quote {
    pub fn new(organization_id: OrgId, customer_id: Uuid, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            customer_id,
            amount,
            status: QuoteStatus::Pending,
            valid_until: None,
            followed_up_at: None,
            created_at: Timestamp::now(),
        }
    }
}

/// An employee leave request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub employee_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: LeaveStatus,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl LeaveRequest {
    pub fn new(
        organization_id: OrgId,
        employee_name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            employee_name: employee_name.into(),
            start_date,
            end_date,
            status: LeaveStatus::Pending,
            reason: None,
            created_at: Timestamp::now(),
        }
    }

    /// Inclusive day count of the leave window.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// A budget line: planned spend for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLine {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub category: String,
    pub amount: Money,
    pub updated_at: Timestamp,
}

impl BudgetLine {
    pub fn new(organization_id: OrgId, category: impl Into<String>, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            category: category.into(),
            amount,
            updated_at: Timestamp::now(),
        }
    }
}

/// A durable record of one action submission.
///
/// Kept after execution as an audit row; the stored `result` is what a
/// duplicate confirm replays instead of re-executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub user_id: UserId,
    pub action_type: String,
    pub state: InvocationState,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub executed_at: Option<Timestamp>,
}

impl ActionInvocation {
    pub fn new(
        organization_id: OrgId,
        user_id: UserId,
        action_type: impl Into<String>,
        parameters: serde_json::Value,
        created_at: Timestamp,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id,
            action_type: action_type.into(),
            state: InvocationState::Pending,
            parameters,
            result: None,
            created_at,
            expires_at: created_at.plus_seconds(ttl_seconds),
            executed_at: None,
        }
    }

    /// Whether the pending window has lapsed at the given instant.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.state == InvocationState::Pending && now.0 >= self.expires_at.0
    }
}
