//! Cron expression handling
//!
//! Schedules are written in the familiar five-field crontab form (or the
//! `@daily` style shorthands). They are translated to the seconds-first
//! form understood by the `cron` crate before parsing.

use crate::error::ScheduleError;
use cron::Schedule;
use std::str::FromStr;

/// Schedule value that means "run once, right now"
pub const SCHEDULE_NONE: &str = "none";

/// True for an empty or `none` schedule
pub fn is_unscheduled(expression: &str) -> bool {
    let trimmed = expression.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SCHEDULE_NONE)
}

/// Translate a crontab expression into the `cron` crate's syntax.
///
/// Five fields gain a leading seconds field and have their day-of-week
/// numbers shifted from crontab's 0-7 (Sunday = 0 or 7) to 1-7
/// (Sunday = 1). Six or seven fields and `@` shorthands pass through.
pub fn normalize_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.starts_with('@') {
        return trimmed.to_string();
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() != 5 {
        return fields.join(" ");
    }

    format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        translate_day_of_week(fields[4])
    )
}

/// Parse an expression into a schedule
pub fn parse_schedule(expression: &str) -> Result<Schedule, ScheduleError> {
    let normalized = normalize_expression(expression);
    Schedule::from_str(&normalized).map_err(|source| ScheduleError::InvalidExpression {
        expression: expression.to_string(),
        source,
    })
}

/// Validate a schedule value as accepted by the scheduler
pub fn validate_cron_schedule(expression: &str) -> Result<(), ScheduleError> {
    if is_unscheduled(expression) {
        return Ok(());
    }
    parse_schedule(expression).map(|_| ())
}

fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(translate_dow_item)
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_dow_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    // Numeric ranges are expanded, since both 0 and 7 land on 1 after the shift
    if let Some(days) = expand_day_range(range, step) {
        return days
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",");
    }

    let translated = match range.parse::<u8>() {
        Ok(day) => shift_day(day).to_string(),
        Err(_) => range.to_string(),
    };
    match step {
        Some(step) => format!("{}/{}", translated, step),
        None => translated,
    }
}

/// Shifted, sorted days of a crontab `start-end[/step]`; `None` when the
/// item is not a well-formed numeric range
fn expand_day_range(range: &str, step: Option<&str>) -> Option<Vec<u8>> {
    let (start, end) = range.split_once('-')?;
    let start: u8 = start.parse().ok()?;
    let end: u8 = end.parse().ok()?;
    let step: usize = match step {
        Some(step) => step.parse().ok()?,
        None => 1,
    };
    if start > end || end > 7 || step == 0 {
        return None;
    }

    let mut days: Vec<u8> = (start..=end).step_by(step).map(shift_day).collect();
    days.sort_unstable();
    days.dedup();
    Some(days)
}

fn shift_day(day: u8) -> u8 {
    (day % 7) + 1
}
