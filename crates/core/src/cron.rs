// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron expressions and UTC fire-time computation.
//!
//! Fields: minute hour day-of-month month day-of-week. Supported syntax per
//! field: `*`, `n`, `a-b`, `a,b,c`, `*/s`, `a-b/s`, `a/s`. Day-of-week
//! accepts 0–7 with both 0 and 7 meaning Sunday. Standard cron semantics
//! apply when both day fields are restricted: the date matches if either
//! does.
//!
//! All computation is UTC. The next fire is always derived from a supplied
//! previous instant, never from "now", so a slow scheduler tick cannot
//! accumulate drift.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Errors from parsing a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("cron expression must have 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid {field} value {value:?} (allowed {min}..={max})")]
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },

    #[error("unparseable {field} component {text:?}")]
    Unparseable { field: &'static str, text: String },

    #[error("step of zero in {field}")]
    ZeroStep { field: &'static str },
}

/// Bitmask over the allowed values of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FieldMask {
    bits: u64,
    /// True when the source text was a bare `*` (matters for the
    /// day-of-month / day-of-week combination rule).
    star: bool,
}

impl FieldMask {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }
}

/// Inclusive bounds for each field.
const FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day-of-month", 1, 31),
    ("month", 1, 12),
    ("day-of-week", 0, 7),
];

/// A parsed cron schedule. Retains the source expression for display and
/// persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    expression: String,
    minute: FieldMask,
    hour: FieldMask,
    day_of_month: FieldMask,
    month: FieldMask,
    day_of_week: FieldMask,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::FieldCount(parts.len()));
        }
        let mut masks = Vec::with_capacity(5);
        for (text, (field, min, max)) in parts.iter().zip(FIELDS) {
            masks.push(parse_field(text, field, min, max)?);
        }
        let mut day_of_week = masks[4];
        // 7 is an alias for Sunday
        if day_of_week.contains(7) {
            day_of_week.bits |= 1;
        }
        Ok(Self {
            expression: expression.trim().to_string(),
            minute: masks[0],
            hour: masks[1],
            day_of_month: masks[2],
            month: masks[3],
            day_of_week,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`, in UTC.
    ///
    /// Returns `None` only for schedules that can never fire again within a
    /// five-year horizon (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cursor = (after + Duration::minutes(1))
            .with_second(0)
            .and_then(|c| c.with_nanosecond(0))?;
        let mut date = cursor.date_naive();
        let mut floor = cursor.time();
        // Five years of days bounds the search for sparse schedules.
        for _ in 0..(366 * 5) {
            if self.date_matches(date) {
                if let Some(time) = self.time_at_or_after(floor) {
                    return Utc.from_local_datetime(&date.and_time(time)).single();
                }
            }
            date = date.succ_opt()?;
            floor = NaiveTime::MIN;
        }
        None
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        if !self.month.contains(date.month()) {
            return false;
        }
        let dom_ok = self.day_of_month.contains(date.day());
        let dow_ok = self.day_of_week.contains(date.weekday().num_days_from_sunday());
        match (self.day_of_month.star, self.day_of_week.star) {
            // Both restricted: vixie-cron matches on either.
            (false, false) => dom_ok || dow_ok,
            (false, true) => dom_ok,
            (true, false) => dow_ok,
            (true, true) => true,
        }
    }

    fn time_at_or_after(&self, floor: NaiveTime) -> Option<NaiveTime> {
        for hour in floor.hour()..24 {
            if !self.hour.contains(hour) {
                continue;
            }
            let min_start = if hour == floor.hour() { floor.minute() } else { 0 };
            for minute in min_start..60 {
                if self.minute.contains(minute) {
                    return NaiveTime::from_hms_opt(hour, minute, 0);
                }
            }
        }
        None
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

fn parse_field(text: &str, field: &'static str, min: u32, max: u32) -> Result<FieldMask, CronError> {
    let mut bits = 0u64;
    let star = text == "*";
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s
                    .parse()
                    .map_err(|_| CronError::Unparseable { field, text: part.to_string() })?;
                if step == 0 {
                    return Err(CronError::ZeroStep { field });
                }
                (r, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let lo = parse_value(a, field)?;
            let hi = parse_value(b, field)?;
            (lo, hi)
        } else {
            let v = parse_value(range, field)?;
            // "a/s" means a..max stepped; bare "a" is a single value
            if step > 1 {
                (v, max)
            } else {
                (v, v)
            }
        };

        for bound in [lo, hi] {
            if bound < min || bound > max {
                return Err(CronError::OutOfRange { field, value: bound, min, max });
            }
        }
        if lo > hi {
            return Err(CronError::Unparseable { field, text: part.to_string() });
        }
        let mut v = lo;
        while v <= hi {
            bits |= 1u64 << v;
            v += step;
        }
    }
    Ok(FieldMask { bits, star })
}

fn parse_value(text: &str, field: &'static str) -> Result<u32, CronError> {
    text.parse()
        .map_err(|_| CronError::Unparseable { field, text: text.to_string() })
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
