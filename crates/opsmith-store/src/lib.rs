//! Opsmith Storage crate - SQLite persistence for business records.
//!
//! Provides a WAL-mode SQLite database with migrations, entity
//! definitions for customers/invoices/payments/accounts/movements,
//! and query modules for billing, the money ledger, back-office
//! records, and action invocations.

pub mod backoffice;
pub mod billing;
pub mod db;
pub mod entities;
pub mod invocations;
pub mod ledger;
pub mod migrations;

pub use db::Database;
pub use entities::{
    ActionInvocation, BudgetLine, Customer, Invoice, InvoiceItem, InvoiceStatus, InvocationState,
    LeaveRequest, LeaveStatus, MoneyAccount, MoneyMovement, MovementStatus, Payment,
    PaymentAllocation, Quote, QuoteStatus,
};
