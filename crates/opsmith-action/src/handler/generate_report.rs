//! Report generation action handler.
//!
//! Pure read: assembles the requested report over the resolved period.
//! Preview and execute share the same content; preview wraps it in the
//! preview envelope, execute returns it as the result payload.

use rusqlite::Connection;
use serde::Deserialize;

use crate::error::ActionError;
use crate::handler::{ActionContext, ActionHandler};
use crate::params::decode_params;
use crate::report::period::resolve_period;
use crate::report::{build_report, Report, ReportKind};
use crate::types::{ActionType, ExecutionResult, Impact, Permission, Preview};

const DEFAULT_PERIOD: &str = "this_month";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerateReportParams {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    period: Option<String>,
}

fn build(
    ctx: &ActionContext<'_>,
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<Report, ActionError> {
    let parsed: GenerateReportParams = decode_params(params)?;
    let kind = match parsed.kind {
        Some(raw) => raw
            .parse::<ReportKind>()
            .map_err(|e| ActionError::validation("kind", e))?,
        None => ReportKind::General,
    };
    let token = parsed.period.unwrap_or_else(|| DEFAULT_PERIOD.to_string());
    let range = resolve_period(&token, ctx.today())?;
    Ok(build_report(conn, ctx.org(), kind, range, &ctx.config.report)?)
}

/// Handler for `generate_report`.
pub struct GenerateReportHandler;

impl ActionHandler for GenerateReportHandler {
    fn action_type(&self) -> ActionType {
        ActionType::GenerateReport
    }

    fn validate(
        &self,
        ctx: &ActionContext<'_>,
        _conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<(), ActionError> {
        let parsed: GenerateReportParams = decode_params(params)?;
        if let Some(raw) = parsed.kind {
            raw.parse::<ReportKind>()
                .map_err(|e| ActionError::validation("kind", e))?;
        }
        let token = parsed.period.unwrap_or_else(|| DEFAULT_PERIOD.to_string());
        resolve_period(&token, ctx.today())?;
        Ok(())
    }

    fn preview(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<Preview, ActionError> {
        let report = build(ctx, conn, params)?;
        let mut preview = Preview::new(
            format!("{} report, {} to {}", report.kind, report.start, report.end),
            report.summary(),
            Impact::Low,
        );
        for warning in &report.warnings {
            preview = preview.with_warning(warning.clone());
        }
        Ok(preview)
    }

    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        conn: &Connection,
        params: &serde_json::Value,
    ) -> Result<ExecutionResult, ActionError> {
        let report = build(ctx, conn, params)?;

        tracing::info!(
            kind = %report.kind,
            from = %report.start,
            to = %report.end,
            warnings = report.warnings.len(),
            "Report generated"
        );

        let summary = report.summary();
        let payload =
            serde_json::to_value(&report).map_err(opsmith_core::error::OpsError::from)?;
        Ok(ExecutionResult::ok(summary, payload))
    }

    fn impact(&self, _params: &serde_json::Value) -> Impact {
        Impact::Low
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::ReportRead]
    }
}
