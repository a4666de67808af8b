//! `time::*`
//!
//! Instants are plain ints: seconds since the Unix epoch, UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeError, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("time::now", "%0", now);
    registry.add("time::now_ms", "%0", now_ms);
    registry.add("time::format", "{%d}{%d%s}", format);
    registry.add("time::parse", "{%s}{%s%s}", parse);
    registry.add("time::date", "%d", date);
    registry.add("time::weekday", "%d", weekday);
    registry.add("time::make", "{%d%d%d}{%d%d%d%d%d%d}", make);
}

/// Formats `time::parse` tries after RFC 3339 and RFC 2822
const FALLBACK_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Date-only formats, midnight UTC
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

fn instant(seconds: i64) -> RuntimeResult<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| RuntimeError::invalid(format!("timestamp {seconds} out of range")))
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// time::now() -> Int
fn now(_: &mut Evaluator, _: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Int(Utc::now().timestamp()))
}

/// time::now_ms() -> Int, milliseconds since the epoch
fn now_ms(_: &mut Evaluator, _: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Int(Utc::now().timestamp_millis()))
}

/// time::format(ts, [fmt]) -> String
///
/// `fmt` uses strftime codes; RFC 3339 without one.
fn format(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let dt = instant(args.int(0)?)?;
    if args.len() < 2 {
        return Ok(Val::string(dt.to_rfc3339()));
    }
    let fmt = args.str(1)?;
    let items: Vec<_> = chrono::format::StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, chrono::format::Item::Error)) {
        return Err(RuntimeError::invalid(format!("time::format: invalid format '{fmt}'")));
    }
    Ok(Val::string(dt.format_with_items(items.into_iter()).to_string()))
}

/// time::parse(s, [fmt]) -> Int
///
/// Without a format, RFC 3339, RFC 2822 and a few common layouts are tried
/// in turn.
fn parse(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let input = args.str(0)?;
    if args.len() > 1 {
        let fmt = args.str(1)?;
        let naive = NaiveDateTime::parse_from_str(input, fmt).map_err(|e| {
            RuntimeError::invalid(format!("failed to parse '{input}' with format '{fmt}': {e}"))
        })?;
        return Ok(Val::Int(naive.and_utc().timestamp()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(Val::Int(dt.timestamp()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Ok(Val::Int(dt.timestamp()));
    }
    for fmt in FALLBACK_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(Val::Int(naive.and_utc().timestamp()));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return Ok(Val::Int(date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()));
        }
    }
    Err(RuntimeError::invalid(format!("failed to parse datetime '{input}'")))
}

/// time::date(ts) -> Map of calendar fields
fn date(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let ts = args.int(0)?;
    let dt = instant(ts)?;
    Ok(Val::map([
        ("year", Val::Int(i64::from(dt.year()))),
        ("month", Val::Int(i64::from(dt.month()))),
        ("day", Val::Int(i64::from(dt.day()))),
        ("hour", Val::Int(i64::from(dt.hour()))),
        ("minute", Val::Int(i64::from(dt.minute()))),
        ("second", Val::Int(i64::from(dt.second()))),
        ("weekday", Val::string(weekday_name(dt.weekday()))),
        ("yday", Val::Int(i64::from(dt.ordinal()))),
        ("timestamp", Val::Int(ts)),
    ]))
}

fn weekday(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(weekday_name(instant(args.int(0)?)?.weekday())))
}

/// time::make(year, month, day, [hour, minute, second]) -> Int
fn make(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let field = |i: usize| -> RuntimeResult<u32> {
        u32::try_from(args.int_or(i, 0)?).map_err(|_| RuntimeError::invalid("time::make: negative field"))
    };
    let year = i32::try_from(args.int(0)?).map_err(|_| RuntimeError::invalid("time::make: year out of range"))?;
    Utc.with_ymd_and_hms(year, field(1)?, field(2)?, field(3)?, field(4)?, field(5)?)
        .single()
        .map(|dt| Val::Int(dt.timestamp()))
        .ok_or_else(|| RuntimeError::invalid("time::make: invalid date"))
}
