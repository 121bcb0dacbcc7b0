//! Action engine for Opsmith.
//!
//! Turns structured requests from the assistant layer into previewed,
//! confirmed, and executed business operations, with an audit trail of
//! invocations and undo for the actions that support it.

pub mod categorize;
pub mod engine;
pub mod error;
pub mod handler;
pub mod import;
pub mod invocation;
pub mod params;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod types;

pub use categorize::{Categorizer, KeywordCategorizer, Suggestion};
pub use engine::{ActionEngine, Submission};
pub use error::ActionError;
pub use handler::{ActionContext, ActionHandler};
pub use registry::ActionRegistry;
pub use scheduler::ExpirySweeper;
pub use types::{
    ActionCategory, ActionDefinition, ActionRequest, ActionScope, ActionType, ExecutionResult,
    Impact, Permission, Preview,
};
