//! Reporting period grammar.
//!
//! Resolves tokens like `last_30_days` or `this_quarter` into concrete
//! date ranges, always relative to an injected "today" so previews and
//! tests are deterministic.
//!
//! Supported tokens:
//! - `last_<N>_days`, `last_<N>_weeks`, `last_<N>_months` (rolling, ending today)
//! - `this_week`, `last_week` (weeks start on Monday)
//! - `this_month`, `last_month`
//! - `this_quarter`, `last_quarter`
//! - `this_year`, `last_year`
//! - `year_to_date`

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::ActionError;

/// Inclusive date range resolved from a period token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Upper bound on `N` in rolling periods, keeping date arithmetic well
/// inside chrono's supported year range.
const MAX_ROLLING_UNITS: u32 = 10_000;

/// Resolve a period token against the given "today".
pub fn resolve_period(token: &str, today: NaiveDate) -> Result<DateRange, ActionError> {
    let normalized = token.trim().to_lowercase();

    if let Some(range) = parse_rolling(&normalized, today)? {
        return Ok(range);
    }

    let range = match normalized.as_str() {
        "this_week" => DateRange {
            start: week_start(today),
            end: week_start(today) + Duration::days(6),
        },
        "last_week" => {
            let start = week_start(today) - Duration::days(7);
            DateRange {
                start,
                end: start + Duration::days(6),
            }
        }
        "this_month" => month_range(today.year(), today.month()),
        "last_month" => {
            let prior = shift_months(first_of_month(today), -1);
            month_range(prior.year(), prior.month())
        }
        "this_quarter" => quarter_range(today.year(), quarter_of(today.month())),
        "last_quarter" => {
            let q = quarter_of(today.month());
            if q == 1 {
                quarter_range(today.year() - 1, 4)
            } else {
                quarter_range(today.year(), q - 1)
            }
        }
        "this_year" => DateRange {
            start: ymd(today.year(), 1, 1),
            end: ymd(today.year(), 12, 31),
        },
        "last_year" => DateRange {
            start: ymd(today.year() - 1, 1, 1),
            end: ymd(today.year() - 1, 12, 31),
        },
        "year_to_date" => DateRange {
            start: ymd(today.year(), 1, 1),
            end: today,
        },
        _ => {
            return Err(ActionError::validation(
                "period",
                format!(
                    "Unknown period '{}'. Expected last_<N>_days|weeks|months, \
                     this_week, last_week, this_month, last_month, this_quarter, \
                     last_quarter, this_year, last_year, or year_to_date",
                    token.trim()
                ),
            ))
        }
    };

    Ok(range)
}

/// Parse `last_<N>_<unit>` rolling periods; Ok(None) when the token is
/// not in that shape at all.
fn parse_rolling(token: &str, today: NaiveDate) -> Result<Option<DateRange>, ActionError> {
    let Some(rest) = token.strip_prefix("last_") else {
        return Ok(None);
    };
    let Some((count_str, unit)) = rest.split_once('_') else {
        return Ok(None);
    };
    let Ok(count) = count_str.parse::<u32>() else {
        return Ok(None);
    };

    if count == 0 || count > MAX_ROLLING_UNITS {
        return Err(ActionError::validation(
            "period",
            format!("Period count must be between 1 and {}", MAX_ROLLING_UNITS),
        ));
    }

    let start = match unit {
        "day" | "days" => today - Duration::days(i64::from(count)),
        "week" | "weeks" => today - Duration::days(i64::from(count) * 7),
        "month" | "months" => shift_months(today, -(count as i32)),
        _ => {
            return Err(ActionError::validation(
                "period",
                format!("Unknown period unit '{}'. Expected days, weeks, or months", unit),
            ))
        }
    };

    Ok(Some(DateRange { start, end: today }))
}

/// Monday of the week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    ymd(date.year(), date.month(), 1)
}

fn month_range(year: i32, month: u32) -> DateRange {
    DateRange {
        start: ymd(year, month, 1),
        end: ymd(year, month, days_in_month(year, month)),
    }
}

/// 1-based quarter containing the given month.
fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

fn quarter_range(year: i32, quarter: u32) -> DateRange {
    let start_month = (quarter - 1) * 3 + 1;
    let end_month = start_month + 2;
    DateRange {
        start: ymd(year, start_month, 1),
        end: ymd(year, end_month, days_in_month(year, end_month)),
    }
}

/// Shift a date by whole months, clamping the day to the target month's
/// length (Mar 31 minus one month is Feb 29 in a leap year).
fn shift_months(date: NaiveDate, delta: i32) -> NaiveDate {
    let months = date.year() * 12 + date.month() as i32 - 1 + delta;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    ymd(year, month, day)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        ymd(year + 1, 1, 1)
    } else {
        ymd(year, month + 1, 1)
    };
    (next - Duration::days(1)).day()
}

/// Constructor for dates whose components are bounded by the grammar.
fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("Date within supported range")
}
