//! Financial report assembly.
//!
//! Builds period reports from ledger, billing, and budget data. Reports
//! are pure reads: nothing here writes to storage.

pub mod period;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use opsmith_core::config::ReportConfig;
use opsmith_core::error::OpsError;
use opsmith_core::types::{FlowType, Money, OrgId};
use opsmith_store::{backoffice, billing, ledger};

use crate::report::period::DateRange;

/// Collected-to-invoiced ratio below which collections count as lagging.
const COLLECTIONS_LAG_RATIO: f64 = 0.5;

// ===== Report kinds =====

/// The report variants the engine can assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    CashFlow,
    Expenses,
    Sales,
    Budget,
    General,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::CashFlow => write!(f, "cash_flow"),
            ReportKind::Expenses => write!(f, "expenses"),
            ReportKind::Sales => write!(f, "sales"),
            ReportKind::Budget => write!(f, "budget"),
            ReportKind::General => write!(f, "general"),
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash_flow" => Ok(ReportKind::CashFlow),
            "expenses" => Ok(ReportKind::Expenses),
            "sales" => Ok(ReportKind::Sales),
            "budget" => Ok(ReportKind::Budget),
            "general" => Ok(ReportKind::General),
            _ => Err(format!(
                "Unknown report type: {}. Expected cash_flow, expenses, sales, budget, or general",
                s
            )),
        }
    }
}

// ===== Report body =====

/// One calendar day's income and expense totals.
#[derive(Debug, Clone, Serialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub income: Money,
    pub expenses: Money,
}

/// One category's share of period spending.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub total: Money,
    /// Fraction of total period expenses, 0.0 when there was no spending.
    pub share: f64,
}

/// Budget line versus actual spend for the period.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetComparison {
    pub category: String,
    pub budgeted: Money,
    pub spent: Money,
    pub remaining: Money,
}

/// An assembled period report.
///
/// Sections not covered by the requested kind stay empty: a sales report
/// carries no budget comparisons, a budget report no daily buckets.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_income: Money,
    pub total_expenses: Money,
    pub net: Money,
    pub daily: Vec<DailyBucket>,
    pub top_categories: Vec<CategoryShare>,
    pub invoiced: Money,
    pub collected: Money,
    pub budget_lines: Vec<BudgetComparison>,
    pub warnings: Vec<String>,
}

impl Report {
    /// One-line summary used as the preview description.
    pub fn summary(&self) -> String {
        format!(
            "Income {}, expenses {}, net {} ({} to {})",
            self.total_income, self.total_expenses, self.net, self.start, self.end
        )
    }
}

// ===== Assembly =====

/// Assemble a report for the organization over the given range.
pub fn build_report(
    conn: &Connection,
    organization_id: OrgId,
    kind: ReportKind,
    range: DateRange,
    config: &ReportConfig,
) -> Result<Report, OpsError> {
    let total_income =
        ledger::sum_flow_in_range(conn, organization_id, FlowType::Income, range.start, range.end)?;
    let total_expenses = ledger::sum_flow_in_range(
        conn,
        organization_id,
        FlowType::Expense,
        range.start,
        range.end,
    )?;

    // Expense-by-category feeds the concentration warning and the budget
    // comparison for every kind, even when not exposed directly.
    let category_totals = ledger::category_totals_in_range(
        conn,
        organization_id,
        FlowType::Expense,
        range.start,
        range.end,
    )?;

    let daily = if matches!(kind, ReportKind::CashFlow | ReportKind::General) {
        fold_daily(ledger::daily_flow_in_range(
            conn,
            organization_id,
            range.start,
            range.end,
        )?)
    } else {
        Vec::new()
    };

    let top_categories = if matches!(kind, ReportKind::Expenses | ReportKind::General) {
        category_totals
            .iter()
            .take(config.top_categories)
            .map(|(category, total)| CategoryShare {
                category: category.clone(),
                total: *total,
                share: share_of(*total, total_expenses),
            })
            .collect()
    } else {
        Vec::new()
    };

    let (invoiced, collected) =
        if matches!(kind, ReportKind::Sales | ReportKind::CashFlow | ReportKind::General) {
            (
                billing::sum_invoiced_in_range(conn, organization_id, range.start, range.end)?,
                billing::sum_payments_in_range(conn, organization_id, range.start, range.end)?,
            )
        } else {
            (Money::ZERO, Money::ZERO)
        };

    let budget_lines = if matches!(kind, ReportKind::Budget | ReportKind::General) {
        compare_budgets(conn, organization_id, &category_totals)?
    } else {
        Vec::new()
    };

    let mut warnings = Vec::new();

    if total_expenses > total_income {
        warnings.push(format!(
            "Expenses ({}) exceed income ({}) for this period",
            total_expenses, total_income
        ));
    }

    for (category, total) in &category_totals {
        let share = share_of(*total, total_expenses);
        if share >= config.concentration_share {
            warnings.push(format!(
                "Category '{}' accounts for {:.0}% of spending",
                category,
                share * 100.0
            ));
        }
    }

    if invoiced.0 > 0 && (collected.0 as f64) < (invoiced.0 as f64) * COLLECTIONS_LAG_RATIO {
        warnings.push(format!(
            "Collections ({}) are lagging the invoiced amount ({})",
            collected, invoiced
        ));
    }

    for line in &budget_lines {
        if line.remaining.is_negative() {
            warnings.push(format!(
                "Spending on '{}' exceeds its budget line by {}",
                line.category,
                line.remaining.abs()
            ));
        }
    }

    Ok(Report {
        kind,
        start: range.start,
        end: range.end,
        total_income,
        total_expenses,
        net: total_income - total_expenses,
        daily,
        top_categories,
        invoiced,
        collected,
        budget_lines,
        warnings,
    })
}

fn share_of(total: Money, of: Money) -> f64 {
    if of.0 <= 0 {
        return 0.0;
    }
    total.0 as f64 / of.0 as f64
}

/// Fold per-flow day rows into one bucket per date, preserving date order.
fn fold_daily(rows: Vec<ledger::DayFlow>) -> Vec<DailyBucket> {
    let mut buckets: Vec<DailyBucket> = Vec::new();
    for row in rows {
        if buckets.last().map_or(true, |b| b.date != row.date) {
            buckets.push(DailyBucket {
                date: row.date,
                income: Money::ZERO,
                expenses: Money::ZERO,
            });
        }
        if let Some(bucket) = buckets.last_mut() {
            match row.flow_type {
                FlowType::Income => bucket.income += row.total,
                FlowType::Expense => bucket.expenses += row.total,
            }
        }
    }
    buckets
}

/// Join budget lines with actual expense totals, matching categories
/// case-insensitively.
fn compare_budgets(
    conn: &Connection,
    organization_id: OrgId,
    category_totals: &[(String, Money)],
) -> Result<Vec<BudgetComparison>, OpsError> {
    let lines = backoffice::list_budget_lines(conn, organization_id)?;
    let comparisons = lines
        .into_iter()
        .map(|line| {
            let spent = category_totals
                .iter()
                .find(|(category, _)| category.eq_ignore_ascii_case(&line.category))
                .map(|(_, total)| *total)
                .unwrap_or(Money::ZERO);
            BudgetComparison {
                category: line.category,
                budgeted: line.amount,
                spent,
                remaining: line.amount - spent,
            }
        })
        .collect();
    Ok(comparisons)
}
