//! Invocation lifecycle state machine.
//!
//! Allowed transitions:
//! - `Pending -> Confirmed` (user approved; execution is underway)
//! - `Pending -> Executed` (auto-executed in the same transaction as the claim)
//! - `Pending -> Cancelled` (user declined)
//! - `Pending -> Expired` (confirmation window lapsed)
//! - `Confirmed -> Executed` (handler finished and the result was recorded)
//!
//! `Executed`, `Cancelled`, and `Expired` are terminal. The lifecycle is
//! forward-only; nothing ever returns to `Pending`.

use opsmith_store::entities::InvocationState;

use crate::error::ActionError;

/// Validate a state transition, returning an error when disallowed.
pub fn validate_transition(
    from: InvocationState,
    to: InvocationState,
) -> Result<(), ActionError> {
    let allowed = matches!(
        (from, to),
        (InvocationState::Pending, InvocationState::Confirmed)
            | (InvocationState::Pending, InvocationState::Executed)
            | (InvocationState::Pending, InvocationState::Cancelled)
            | (InvocationState::Pending, InvocationState::Expired)
            | (InvocationState::Confirmed, InvocationState::Executed)
    );

    if allowed {
        Ok(())
    } else {
        Err(ActionError::InvalidTransition(from, to))
    }
}
