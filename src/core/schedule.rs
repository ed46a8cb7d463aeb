//! Cron expression parsing and next fire time calculation.
//!
//! Expressions have six mandatory fields and an optional seventh:
//!
//! ```text
//! seconds  minutes  hours  day-of-month  month    day-of-week  [year]
//! 0-59     0-59     0-23   1-31          1-12     1-7          1970-2099
//!                                        JAN-DEC  SUN-SAT
//! ```
//!
//! Every field accepts literal values, `*`, lists (`,`), ranges (`-`) and
//! steps (`/`). The day fields additionally accept `?` ("no specific value").
//! Day-of-week is numbered from 1 = SUN to 7 = SAT.

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How far past the input instant `next_fire_after` searches before giving up.
pub const HORIZON_YEARS: i32 = 5;

const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 2099;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// The fields of a cron expression, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    Seconds,
    Minutes,
    Hours,
    DayOfMonth,
    Month,
    DayOfWeek,
    Year,
}

impl CronField {
    const ALL: [CronField; 7] = [
        CronField::Seconds,
        CronField::Minutes,
        CronField::Hours,
        CronField::DayOfMonth,
        CronField::Month,
        CronField::DayOfWeek,
        CronField::Year,
    ];

    /// Inclusive range of valid values for this field.
    pub fn bounds(self) -> (u32, u32) {
        match self {
            CronField::Seconds | CronField::Minutes => (0, 59),
            CronField::Hours => (0, 23),
            CronField::DayOfMonth => (1, 31),
            CronField::Month => (1, 12),
            CronField::DayOfWeek => (1, 7),
            CronField::Year => (MIN_YEAR as u32, MAX_YEAR as u32),
        }
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            CronField::Month => &MONTH_NAMES,
            CronField::DayOfWeek => &DAY_NAMES,
            _ => &[],
        }
    }

    fn is_day_field(self) -> bool {
        matches!(self, CronField::DayOfMonth | CronField::DayOfWeek)
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CronField::Seconds => "seconds",
            CronField::Minutes => "minutes",
            CronField::Hours => "hours",
            CronField::DayOfMonth => "day-of-month",
            CronField::Month => "month",
            CronField::DayOfWeek => "day-of-week",
            CronField::Year => "year",
        };
        f.write_str(name)
    }
}

/// A malformed cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The expression does not have 6 or 7 fields.
    #[error("expected 6 or 7 fields, got {0}")]
    FieldCount(usize),

    /// A field contains an out-of-range value, a malformed range or an
    /// unsupported character.
    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: CronField,
        value: String,
        reason: String,
    },
}

impl ParseError {
    fn invalid(field: CronField, value: &str, reason: impl Into<String>) -> Self {
        ParseError::InvalidField {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur when building or evaluating a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The expression could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The timezone is not a known IANA zone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The expression never matches within the forward horizon.
    #[error(
        "'{expression}' has no fire time within {horizon} years after {after}",
        horizon = HORIZON_YEARS
    )]
    NoFeasibleFireTime {
        expression: String,
        after: DateTime<Utc>,
    },
}

/// Parsed value set of a single field.
enum FieldSpec {
    /// `*` or `?`: the field places no constraint.
    Unconstrained { no_specific: bool },
    /// Explicit allowed values.
    Values(BTreeSet<u32>),
}

/// A parsed cron expression.
///
/// Each field is normalized into the set of values it allows. The day fields
/// and the year are `None` when unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    timezone: Tz,
    seconds: BTreeSet<u32>,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: Option<BTreeSet<u32>>,
    months: BTreeSet<u32>,
    days_of_week: Option<BTreeSet<u32>>,
    years: Option<BTreeSet<u32>>,
}

impl CronSchedule {
    /// Parse an expression evaluated in UTC.
    pub fn parse(expression: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 6 && fields.len() != 7 {
            return Err(ParseError::FieldCount(fields.len()));
        }

        // The year is optional; absent means every year.
        let specs = CronField::ALL
            .iter()
            .zip(fields.iter().copied().chain(["*"]))
            .map(|(field, text)| parse_field(*field, text))
            .collect::<Result<Vec<_>, _>>()?;
        let [seconds, minutes, hours, days_of_month, months, days_of_week, years]: [FieldSpec; 7] =
            specs
                .try_into()
                .map_err(|_| ParseError::FieldCount(fields.len()))?;

        if let (
            FieldSpec::Unconstrained { no_specific: true },
            FieldSpec::Unconstrained { no_specific: true },
        ) = (&days_of_month, &days_of_week)
        {
            return Err(ParseError::invalid(
                CronField::DayOfWeek,
                "?",
                "'?' cannot be used for both day-of-month and day-of-week",
            ));
        }

        Ok(Self {
            expression: fields.join(" "),
            timezone: Tz::UTC,
            seconds: full_set(CronField::Seconds, seconds),
            minutes: full_set(CronField::Minutes, minutes),
            hours: full_set(CronField::Hours, hours),
            days_of_month: optional_set(days_of_month),
            months: full_set(CronField::Month, months),
            days_of_week: optional_set(days_of_week),
            years: optional_set(years),
        })
    }

    /// Parse an expression evaluated in the given IANA timezone.
    pub fn with_timezone(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))?;
        Ok(Self::parse(expression)?.in_timezone(tz))
    }

    /// Evaluate this schedule in a different timezone.
    pub fn in_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// The normalized expression (fields separated by single spaces).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The timezone the expression is evaluated in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Check whether an instant satisfies every field of the schedule.
    ///
    /// A local time that occurs twice (clocks went back) only matches at its
    /// first occurrence.
    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.timezone).naive_local();
        local.nanosecond() == 0
            && self.year_allowed(local.year())
            && self.months.contains(&local.month())
            && self.day_matches(local.date())
            && self.hours.contains(&local.hour())
            && self.minutes.contains(&local.minute())
            && self.seconds.contains(&local.second())
            && self.first_occurrence(&local) == Some(instant)
    }

    /// The smallest instant strictly after `after` that the schedule matches.
    ///
    /// Gives up with [`ScheduleError::NoFeasibleFireTime`] once the search
    /// passes [`HORIZON_YEARS`] years (or year 2099).
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let local = after.with_timezone(&self.timezone).naive_local();
        let limit_year = (local.year() + HORIZON_YEARS).min(MAX_YEAR);
        let mut cursor = local.with_nanosecond(0).unwrap_or(local) + TimeDelta::seconds(1);

        while let Some(candidate) = self.next_local_match(cursor, limit_year) {
            if let Some(dt) = self.first_occurrence(&candidate) {
                if dt > after {
                    return Ok(dt);
                }
            }
            cursor = candidate + TimeDelta::seconds(1);
        }

        Err(ScheduleError::NoFeasibleFireTime {
            expression: self.expression.clone(),
            after,
        })
    }

    /// The next `n` fire times after `after`.
    ///
    /// Stops early if the schedule runs out of fire times after at least one
    /// was found.
    pub fn next_n_after(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let mut results = Vec::with_capacity(n);
        let mut current = after;
        for _ in 0..n {
            match self.next_fire_after(current) {
                Ok(next) => {
                    results.push(next);
                    current = next;
                }
                Err(e) if results.is_empty() => return Err(e),
                Err(_) => break,
            }
        }
        Ok(results)
    }

    /// Scan forward field by field for the first local time at or after
    /// `cursor` that matches, without crossing `limit_year`.
    fn next_local_match(&self, cursor: NaiveDateTime, limit_year: i32) -> Option<NaiveDateTime> {
        let mut t = cursor;
        loop {
            let year = t.year();
            if year > limit_year {
                return None;
            }

            if !self.year_allowed(year) {
                t = start_of_year(self.next_year_after(year)?)?;
                continue;
            }

            if !self.months.contains(&t.month()) {
                t = match self.months.range(t.month() + 1..).next() {
                    Some(&month) => start_of_day(NaiveDate::from_ymd_opt(year, month, 1)?),
                    None => start_of_year(year + 1)?,
                };
                continue;
            }

            if !self.day_matches(t.date()) {
                t = start_of_day(t.date().succ_opt()?);
                continue;
            }

            if !self.hours.contains(&t.hour()) {
                t = match self.hours.range(t.hour() + 1..).next() {
                    Some(&hour) => t.date().and_hms_opt(hour, 0, 0)?,
                    None => start_of_day(t.date().succ_opt()?),
                };
                continue;
            }

            if !self.minutes.contains(&t.minute()) {
                t = match self.minutes.range(t.minute() + 1..).next() {
                    Some(&minute) => t.date().and_hms_opt(t.hour(), minute, 0)?,
                    None => t.date().and_hms_opt(t.hour(), 0, 0)? + TimeDelta::hours(1),
                };
                continue;
            }

            if !self.seconds.contains(&t.second()) {
                t = match self.seconds.range(t.second() + 1..).next() {
                    Some(&second) => t.date().and_hms_opt(t.hour(), t.minute(), second)?,
                    None => {
                        t.date().and_hms_opt(t.hour(), t.minute(), 0)? + TimeDelta::minutes(1)
                    }
                };
                continue;
            }

            return Some(t);
        }
    }

    fn year_allowed(&self, year: i32) -> bool {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return false;
        }
        match &self.years {
            Some(years) => years.contains(&(year as u32)),
            None => true,
        }
    }

    fn next_year_after(&self, year: i32) -> Option<i32> {
        let candidate = (year + 1).max(MIN_YEAR);
        let next = match &self.years {
            Some(years) => *years.range(candidate as u32..).next()? as i32,
            None => candidate,
        };
        (next <= MAX_YEAR).then_some(next)
    }

    /// The instant a local time first occurs in the schedule's zone.
    ///
    /// `None` when clocks jumped over it; the earlier instant when clocks
    /// went back and it occurs twice.
    fn first_occurrence(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.timezone.from_local_datetime(local) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    }

    /// Day-of-month and day-of-week combine with OR when both are constrained.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let day = date.day();
        let weekday = date.weekday().num_days_from_sunday() + 1;
        match (&self.days_of_month, &self.days_of_week) {
            (None, None) => true,
            (Some(days), None) => days.contains(&day),
            (None, Some(weekdays)) => weekdays.contains(&weekday),
            (Some(days), Some(weekdays)) => days.contains(&day) || weekdays.contains(&weekday),
        }
    }
}

impl FromStr for CronSchedule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn start_of_year(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).map(start_of_day)
}

fn full_set(field: CronField, spec: FieldSpec) -> BTreeSet<u32> {
    match spec {
        FieldSpec::Values(values) => values,
        FieldSpec::Unconstrained { .. } => {
            let (min, max) = field.bounds();
            (min..=max).collect()
        }
    }
}

fn optional_set(spec: FieldSpec) -> Option<BTreeSet<u32>> {
    match spec {
        FieldSpec::Values(values) => Some(values),
        FieldSpec::Unconstrained { .. } => None,
    }
}

fn parse_field(field: CronField, text: &str) -> Result<FieldSpec, ParseError> {
    match text {
        "*" => return Ok(FieldSpec::Unconstrained { no_specific: false }),
        "?" if field.is_day_field() => return Ok(FieldSpec::Unconstrained { no_specific: true }),
        "?" => {
            return Err(ParseError::invalid(
                field,
                text,
                "'?' is only allowed in day-of-month and day-of-week",
            ));
        }
        _ => {}
    }

    let (min, max) = field.bounds();
    let mut values = BTreeSet::new();

    for item in text.split(',') {
        if item.is_empty() {
            return Err(ParseError::invalid(field, text, "empty list item"));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(parse_step(field, item, step)?)),
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((start, end)) = range.split_once('-') {
            let start = parse_value(field, start)?;
            let end = parse_value(field, end)?;
            if start > end {
                return Err(ParseError::invalid(
                    field,
                    item,
                    "range start is after range end",
                ));
            }
            (start, end)
        } else {
            let value = parse_value(field, range)?;
            // `a/n` runs from `a` to the end of the field.
            if step.is_some() { (value, max) } else { (value, value) }
        };

        values.extend((start..=end).step_by(step.unwrap_or(1) as usize));
    }

    Ok(FieldSpec::Values(values))
}

fn parse_step(field: CronField, item: &str, step: &str) -> Result<u32, ParseError> {
    let (_, max) = field.bounds();
    let step: u32 = step
        .parse()
        .map_err(|_| ParseError::invalid(field, item, "step is not a number"))?;
    if step == 0 || step > max {
        return Err(ParseError::invalid(
            field,
            item,
            format!("step must be between 1 and {}", max),
        ));
    }
    Ok(step)
}

fn parse_value(field: CronField, token: &str) -> Result<u32, ParseError> {
    let (min, max) = field.bounds();

    let value = if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        token
            .parse::<u32>()
            .map_err(|_| ParseError::invalid(field, token, "value is too large"))?
    } else if let Some(index) = field
        .names()
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
    {
        index as u32 + 1
    } else if token.is_empty() {
        return Err(ParseError::invalid(field, token, "missing value"));
    } else {
        return Err(ParseError::invalid(
            field,
            token,
            "unsupported character or unknown name",
        ));
    };

    if value < min || value > max {
        return Err(ParseError::invalid(
            field,
            token,
            format!("value out of range {}-{}", min, max),
        ));
    }
    Ok(value)
}
