// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for cron parsing and fire-time computation.

use crate::cron::{CronError, CronSchedule};
use chrono::{DateTime, Utc};
use yare::parameterized;

fn utc(s: &str) -> DateTime<Utc> {
    match s.parse() {
        Ok(dt) => dt,
        Err(e) => panic!("bad test timestamp {s:?}: {e}"),
    }
}

#[parameterized(
    every_minute = { "* * * * *" },
    every_other_minute = { "*/2 * * * *" },
    hourly = { "0 * * * *" },
    daily_midnight = { "0 0 * * *" },
    weekdays = { "30 9 * * 1-5" },
    list = { "0,15,30,45 * * * *" },
    ranged_step = { "10-50/10 2 * * *" },
    sunday_seven = { "0 0 * * 7" },
    start_step = { "5/15 * * * *" },
)]
fn parses_valid_expressions(expr: &str) {
    assert!(CronSchedule::parse(expr).is_ok(), "should parse: {expr}");
}

#[parameterized(
    empty = { "" },
    four_fields = { "* * * *" },
    six_fields = { "* * * * * *" },
)]
fn rejects_wrong_field_count(expr: &str) {
    assert!(matches!(CronSchedule::parse(expr), Err(CronError::FieldCount(_))));
}

#[test]
fn rejects_out_of_range_values() {
    assert!(matches!(
        CronSchedule::parse("60 * * * *"),
        Err(CronError::OutOfRange { field: "minute", value: 60, .. })
    ));
    assert!(matches!(
        CronSchedule::parse("* 24 * * *"),
        Err(CronError::OutOfRange { field: "hour", .. })
    ));
    assert!(matches!(
        CronSchedule::parse("* * 0 * *"),
        Err(CronError::OutOfRange { field: "day-of-month", .. })
    ));
    assert!(matches!(
        CronSchedule::parse("* * * 13 *"),
        Err(CronError::OutOfRange { field: "month", .. })
    ));
    assert!(matches!(
        CronSchedule::parse("* * * * 8"),
        Err(CronError::OutOfRange { field: "day-of-week", .. })
    ));
}

#[test]
fn rejects_zero_step_and_garbage() {
    assert!(matches!(
        CronSchedule::parse("*/0 * * * *"),
        Err(CronError::ZeroStep { field: "minute" })
    ));
    assert!(matches!(
        CronSchedule::parse("a * * * *"),
        Err(CronError::Unparseable { field: "minute", .. })
    ));
    assert!(CronSchedule::parse("5-2 * * * *").is_err());
}

#[parameterized(
    next_minute = { "* * * * *", "2024-03-01T10:00:00Z", "2024-03-01T10:01:00Z" },
    strictly_after = { "* * * * *", "2024-03-01T10:00:30Z", "2024-03-01T10:01:00Z" },
    top_of_hour = { "0 * * * *", "2024-03-01T10:15:00Z", "2024-03-01T11:00:00Z" },
    daily_rollover = { "30 8 * * *", "2024-03-01T09:00:00Z", "2024-03-02T08:30:00Z" },
    month_rollover = { "0 0 1 * *", "2024-03-02T00:00:00Z", "2024-04-01T00:00:00Z" },
    weekday_skip = { "0 9 * * 1-5", "2024-03-01T10:00:00Z", "2024-03-04T09:00:00Z" },
    sunday_as_seven = { "0 6 * * 7", "2024-03-01T00:00:00Z", "2024-03-03T06:00:00Z" },
    step_minutes = { "*/15 * * * *", "2024-03-01T10:16:00Z", "2024-03-01T10:30:00Z" },
    leap_day = { "0 0 29 2 *", "2023-03-01T00:00:00Z", "2024-02-29T00:00:00Z" },
)]
fn next_after_computes_utc_fires(expr: &str, after: &str, expected: &str) {
    let schedule = CronSchedule::parse(expr).unwrap();
    assert_eq!(schedule.next_after(utc(after)), Some(utc(expected)));
}

#[test]
fn dom_or_dow_when_both_restricted() {
    // Friday 2024-03-01; "0 0 15 * 5" fires on the 15th OR any Friday.
    let schedule = CronSchedule::parse("0 0 15 * 5").unwrap();
    // After Thu 2024-03-07, next is Fri 2024-03-08 (dow match, not the 15th).
    assert_eq!(
        schedule.next_after(utc("2024-03-07T12:00:00Z")),
        Some(utc("2024-03-08T00:00:00Z"))
    );
    // After Fri 2024-03-08, the 15th also happens to be a Friday.
    assert_eq!(
        schedule.next_after(utc("2024-03-08T12:00:00Z")),
        Some(utc("2024-03-15T00:00:00Z"))
    );
}

#[test]
fn drift_free_sequence_from_previous_fire() {
    // Computing fire k from fire k-1 yields exact 60s spacing even when the
    // caller observes the fires late.
    let schedule = CronSchedule::parse("* * * * *").unwrap();
    let t0 = utc("2024-03-01T10:00:00Z");
    let t1 = schedule.next_after(t0).unwrap();
    let t2 = schedule.next_after(t1).unwrap();
    let t3 = schedule.next_after(t2).unwrap();
    assert_eq!(t1, utc("2024-03-01T10:01:00Z"));
    assert_eq!(t2, utc("2024-03-01T10:02:00Z"));
    assert_eq!(t3, utc("2024-03-01T10:03:00Z"));
}

#[test]
fn impossible_date_returns_none() {
    let schedule = CronSchedule::parse("0 0 30 2 *").unwrap();
    assert_eq!(schedule.next_after(utc("2024-01-01T00:00:00Z")), None);
}

#[test]
fn expression_is_preserved_for_display() {
    let schedule = CronSchedule::parse("*/5 * * * *").unwrap();
    assert_eq!(schedule.to_string(), "*/5 * * * *");
    assert_eq!(schedule.expression(), "*/5 * * * *");
}

#[test]
fn serde_roundtrip() {
    let schedule = CronSchedule::parse("0 9 * * 1-5").unwrap();
    let json = serde_json::to_string(&schedule).unwrap();
    let back: CronSchedule = serde_json::from_str(&json).unwrap();
    assert_eq!(back, schedule);
}
