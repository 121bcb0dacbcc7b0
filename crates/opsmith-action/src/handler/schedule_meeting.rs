//! Meeting scheduling action handler.
//!
//! Validates and echoes the meeting details. The actual calendar write
//! happens in an external collaborator; nothing is persisted here, so
//! the action executes without confirmation.

use rusqlite::Connection;
use serde::Deserialize;

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::{decode_params, require_non_empty};
use crate::types::{ActionType, ExecutionResult, Impact, Permission, Preview};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleMeetingParams {
    title: String,
    /// Free-text time as the assistant parsed it ("tomorrow 3pm").
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    attendees: Vec<String>,
}

struct Meeting {
    title: String,
    time: Option<String>,
    attendees: Vec<String>,
}

fn parse(params: &serde_json::Value) -> Result<Meeting, ActionError> {
    let parsed: ScheduleMeetingParams = decode_params(params)?;
    let title = require_non_empty(&parsed.title, "title")?.to_string();
    let time = parsed
        .time
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let attendees = parsed
        .attendees
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    Ok(Meeting {
        title,
        time,
        attendees,
    })
}

/// Handler for `schedule_meeting`.
pub struct ScheduleMeetingHandler;

impl ActionHandler for ScheduleMeetingHandler {
    fn action_type(&self) -> ActionType {
        ActionType::ScheduleMeeting
    }

    fn validate(
        &self,
        _ctx: &ActionContext<'_>,
        _conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        parse(params)?;
        Ok(())
    }

    fn preview(
        &self,
        _ctx: &ActionContext<'_>,
        _conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let meeting = parse(params)?;
        Ok(Preview::new(
            format!("Schedule '{}'", meeting.title),
            match &meeting.time {
                Some(time) => format!("Meeting '{}' at {}", meeting.title, time),
                None => format!("Meeting '{}', time to be set", meeting.title),
            },
            Impact::Low,
        ))
    }

    fn execute(
        &self,
        _ctx: &ActionContext<'_>,
        _conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError> {
        let meeting = parse(params)?;

        tracing::info!(title = %meeting.title, "Meeting prepared");

        let message = match &meeting.time {
            Some(time) => format!("Prepared meeting '{}' at {}", meeting.title, time),
            None => format!("Prepared meeting '{}'", meeting.title),
        };
        Ok(ExecutionResult::ok(
            message,
            serde_json::json!({
                "title": meeting.title,
                "time": meeting.time,
                "attendees": meeting.attendees,
            }),
        ))
    }

    fn impact(&self, _params: &serde_json::Value) -> Impact {
        Impact::Low
    }

    fn required_permissions(&self) -> Vec<Permission> {
        Vec::new()
    }
}
