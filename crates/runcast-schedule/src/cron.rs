//! Five-field cron expressions.
//!
//! ```text
//! ┌──────── minute        0-59
//! │ ┌────── hour          0-23
//! │ │ ┌──── day of month  1-31
//! │ │ │ ┌── month         1-12
//! │ │ │ │ ┌ weekday       0-6 (Sunday = 0)
//! * * * * *
//! ```
//!
//! Each field is `*`, a number, a range `a-b`, a step `base/n` (base is `*`
//! or a number/range), or a comma-separated list of those. Parsing only
//! checks shape; [`validate`] checks ranges and returns every violation.
//!
//! Conversion to [`CalendarSchedule`] is lossy: only fields that
//! are a single literal number survive, everything else becomes "every value".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::CalendarSchedule;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Position of a field inside the expression, with its numeric bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    Weekday,
}

impl CronField {
    pub const ORDER: [CronField; 5] = [
        CronField::Minute,
        CronField::Hour,
        CronField::DayOfMonth,
        CronField::Month,
        CronField::Weekday,
    ];

    pub fn range(&self) -> (u32, u32) {
        match self {
            CronField::Minute => (0, 59),
            CronField::Hour => (0, 23),
            CronField::DayOfMonth => (1, 31),
            CronField::Month => (1, 12),
            CronField::Weekday => (0, 6),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CronField::Minute => "minute",
            CronField::Hour => "hour",
            CronField::DayOfMonth => "day-of-month",
            CronField::Month => "month",
            CronField::Weekday => "weekday",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CronExpression {
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub weekday: String,
}

impl CronExpression {
    /// Split on whitespace; succeeds only with exactly five fields.
    /// No range checking happens here.
    pub fn parse(text: &str) -> Option<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        let [minute, hour, day_of_month, month, weekday] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            minute: minute.to_string(),
            hour: hour.to_string(),
            day_of_month: day_of_month.to_string(),
            month: month.to_string(),
            weekday: weekday.to_string(),
        })
    }

    pub fn field(&self, field: CronField) -> &str {
        match field {
            CronField::Minute => &self.minute,
            CronField::Hour => &self.hour,
            CronField::DayOfMonth => &self.day_of_month,
            CronField::Month => &self.month,
            CronField::Weekday => &self.weekday,
        }
    }

    /// Range-check every field; one message per violation.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for field in CronField::ORDER {
            check_field(self.field(field), field, &mut errors);
        }
        errors
    }

    /// Natural-language rendering, e.g. `At 09:30 on day 15 in March` or
    /// `Every 5 minutes of hours 9-17`.
    pub fn describe(&self) -> String {
        let minutes = || {
            repetition(&self.minute, "minute").unwrap_or_else(|| format!("at minutes {}", self.minute))
        };
        let hours =
            || repetition(&self.hour, "hour").unwrap_or_else(|| format!("hours {}", self.hour));

        let mut out = match (literal(&self.hour), literal(&self.minute)) {
            (Some(h), Some(m)) => format!("At {h:02}:{m:02}"),
            (Some(h), None) => format!("{} of hour {h:02}", minutes()),
            (None, Some(m)) => format!("At minute {m:02} of {}", hours()),
            (None, None) if self.hour == "*" => minutes(),
            (None, None) => format!("{} of {}", minutes(), hours()),
        };
        if let Some(first) = out.get(..1).map(str::to_uppercase) {
            out.replace_range(..1, &first);
        }

        if self.day_of_month != "*" {
            out.push_str(&format!(" on day {}", self.day_of_month));
        }
        if self.month != "*" {
            let name = literal(&self.month)
                .and_then(|m| m.checked_sub(1))
                .and_then(|idx| MONTH_NAMES.get(idx as usize).copied())
                .unwrap_or(self.month.as_str());
            out.push_str(&format!(" in {name}"));
        }
        if self.weekday != "*" {
            let name = literal(&self.weekday)
                .and_then(|d| WEEKDAY_NAMES.get(d as usize).copied())
                .unwrap_or(self.weekday.as_str());
            out.push_str(&format!(" on {name}"));
        }
        out
    }

    /// Unset calendar fields become `*`, set fields their decimal value.
    pub fn from_calendar_schedule(schedule: &CalendarSchedule) -> Self {
        let field = |v: Option<u8>| v.map_or_else(|| "*".to_string(), |n| n.to_string());
        Self {
            minute: field(schedule.minute),
            hour: field(schedule.hour),
            day_of_month: field(schedule.day),
            month: field(schedule.month),
            weekday: field(schedule.weekday),
        }
    }

    /// Single literal numbers survive; wildcards, ranges, steps and lists
    /// become unset.
    pub fn to_calendar_schedule(&self) -> CalendarSchedule {
        let field = |s: &str| literal(s).and_then(|n| u8::try_from(n).ok());
        CalendarSchedule {
            minute: field(&self.minute),
            hour: field(&self.hour),
            day: field(&self.day_of_month),
            weekday: field(&self.weekday),
            month: field(&self.month),
        }
    }

    /// `true` when converting to a calendar schedule drops information.
    pub fn is_lossy_for_calendar(&self) -> bool {
        CronField::ORDER.iter().any(|f| {
            let raw = self.field(*f);
            raw != "*" && literal(raw).and_then(|n| u8::try_from(n).ok()).is_none()
        })
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.weekday
        )
    }
}

impl std::str::FromStr for CronExpression {
    type Err = Vec<String>;

    /// Parse and range-check in one step.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let expr = Self::parse(s).ok_or_else(|| vec![field_count_message(s)])?;
        let errors = expr.errors();
        if errors.is_empty() {
            Ok(expr)
        } else {
            Err(errors)
        }
    }
}

impl From<CalendarSchedule> for CronExpression {
    fn from(schedule: CalendarSchedule) -> Self {
        Self::from_calendar_schedule(&schedule)
    }
}

impl From<&CronExpression> for CalendarSchedule {
    fn from(expr: &CronExpression) -> Self {
        expr.to_calendar_schedule()
    }
}

/// `every <unit>` for `*` and `*/1`, `every n <unit>s` for `*/n`.
fn repetition(raw: &str, unit: &str) -> Option<String> {
    match raw {
        "*" | "*/1" => Some(format!("every {unit}")),
        _ => {
            let n: u32 = raw.strip_prefix("*/")?.parse().ok()?;
            Some(format!("every {n} {unit}s"))
        }
    }
}

/// Validate raw cron text for display in a form. Empty means valid.
pub fn validate(text: &str) -> Vec<String> {
    match CronExpression::parse(text) {
        Some(expr) => expr.errors(),
        None => vec![field_count_message(text)],
    }
}

fn field_count_message(text: &str) -> String {
    format!(
        "expected 5 fields (minute hour day-of-month month weekday), found {}",
        text.split_whitespace().count()
    )
}

// ---------------------------------------------------------------------------
// Field grammar
// ---------------------------------------------------------------------------

/// A field that is a single decimal number.
fn literal(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// A list is valid iff every element is.
fn check_field(raw: &str, field: CronField, errors: &mut Vec<String>) {
    for element in raw.split(',') {
        if element.is_empty() {
            errors.push(format!("{}: empty list element in {raw:?}", field.name()));
            continue;
        }
        check_element(element, field, errors);
    }
}

fn check_element(element: &str, field: CronField, errors: &mut Vec<String>) {
    if element == "*" {
        return;
    }
    if let Some((base, step)) = element.split_once('/') {
        match literal(step) {
            Some(n) if n > 0 => {}
            _ => errors.push(format!(
                "{}: step {step:?} must be a positive integer",
                field.name()
            )),
        }
        if base != "*" {
            check_range(base, field, errors);
        }
        return;
    }
    check_range(element, field, errors);
}

fn check_range(raw: &str, field: CronField, errors: &mut Vec<String>) {
    match raw.split_once('-') {
        Some((lo, hi)) => {
            let lo_ok = check_value(lo, field, errors);
            let hi_ok = check_value(hi, field, errors);
            if let (Some(a), Some(b)) = (lo_ok, hi_ok) {
                if a > b {
                    errors.push(format!("{}: range {a}-{b} is reversed", field.name()));
                }
            }
        }
        None => {
            check_value(raw, field, errors);
        }
    }
}

/// Returns the value when it is a number inside the field's range.
fn check_value(raw: &str, field: CronField, errors: &mut Vec<String>) -> Option<u32> {
    let (lo, hi) = field.range();
    match literal(raw) {
        Some(v) if (lo..=hi).contains(&v) => Some(v),
        Some(v) => {
            errors.push(format!(
                "{}: value {v} out of range {lo}-{hi}",
                field.name()
            ));
            None
        }
        None => {
            errors.push(format!("{}: invalid value {raw:?}", field.name()));
            None
        }
    }
}
