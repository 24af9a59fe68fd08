//! Date search values.
//!
//! A partially specified date covers the whole interval implied by its
//! precision:
//! - Year: 2023 -> [2023-01-01T00:00:00.000Z, 2023-12-31T23:59:59.999Z]
//! - Month: 2023-02 -> [2023-02-01T00:00:00.000Z, 2023-02-28T23:59:59.999Z]
//! - Day: 2023-01-15 -> [2023-01-15T00:00:00.000Z, 2023-01-15T23:59:59.999Z]
//! - Minutes, seconds: the remaining fields are filled with their maximum
//! - Milliseconds: a single instant
//!
//! Timezone offsets are normalized to UTC; values without an offset are read as UTC.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{Result, SearchError};
use crate::parameters::SearchPrefix;
use crate::range::Range;

// yyyy-mm-ddThh:mm:ss.sss[Z|(+|-)hh:mm]
static DATE_SEARCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?<prefix>eq|ne|lt|gt|ge|le|sa|eb|ap)?",
        r"(?<year>[0-9]{4})(?:-(?<month>[0-9]{2})(?:-(?<day>[0-9]{2})",
        r"(?:T(?<hours>[0-9]{2}):(?<minutes>[0-9]{2})(?::(?<seconds>[0-9]{2})",
        r"(?:\.(?<millis>[0-9]{3}))?(?<tz>Z|[+-][0-9]{2}:[0-9]{2})?)?)?)?)?$"
    ))
    .expect("Invalid date search regex")
});

pub type DateRange = Range<OffsetDateTime>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateValue {
    pub prefix: SearchPrefix,
    pub range: DateRange,
}

/// Parse `[prefix]date` into a prefix and the interval covered by the date.
pub fn parse_date_value(param: &str) -> Result<DateValue> {
    let caps = DATE_SEARCH_REGEX
        .captures(param)
        .ok_or_else(|| SearchError::invalid(format!("Invalid date search parameter: {param}")))?;
    let prefix = SearchPrefix::parse_or_default(caps.name("prefix").map(|m| m.as_str()));
    let range = range_from_captures(&caps).ok_or_else(|| {
        let input = &param[caps.name("year").map_or(0, |m| m.start())..];
        SearchError::invalid(format!("Invalid date format: {input}"))
    })?;
    Ok(DateValue { prefix, range })
}

fn range_from_captures(caps: &Captures<'_>) -> Option<DateRange> {
    let num = |name: &str| -> Option<Option<u16>> {
        match caps.name(name) {
            Some(m) => m.as_str().parse().ok().map(Some),
            None => Some(None),
        }
    };

    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    let month = num("month")?;
    let day = num("day")?;
    let hours = num("hours")?;
    let minutes = num("minutes")?;
    let seconds = num("seconds")?;
    let millis = num("millis")?;

    let month_value = Month::try_from(month.unwrap_or(1) as u8).ok()?;
    let date = Date::from_calendar_date(year, month_value, day.unwrap_or(1) as u8).ok()?;
    let time = Time::from_hms_milli(
        hours.unwrap_or(0) as u8,
        minutes.unwrap_or(0) as u8,
        seconds.unwrap_or(0) as u8,
        millis.unwrap_or(0),
    )
    .ok()?;
    let offset = match caps.name("tz").map(|m| m.as_str()) {
        None | Some("Z") => UtcOffset::UTC,
        Some(tz) => parse_offset(tz)?,
    };

    let start = PrimitiveDateTime::new(date, time)
        .assume_offset(offset)
        .to_offset(UtcOffset::UTC);

    let end = if millis.is_some() {
        start
    } else if seconds.is_some() {
        start + Duration::milliseconds(999)
    } else if minutes.is_some() {
        start + Duration::milliseconds(59_999)
    } else if day.is_some() {
        end_of_day(date)
    } else if month.is_some() {
        end_of_day(last_day_of_month(year, month_value)?)
    } else {
        end_of_day(Date::from_calendar_date(year, Month::December, 31).ok()?)
    };

    Some(Range::new(start, end))
}

fn parse_offset(tz: &str) -> Option<UtcOffset> {
    let sign: i8 = if tz.starts_with('-') { -1 } else { 1 };
    let (h, m) = tz[1..].split_once(':')?;
    let h: i8 = h.parse().ok()?;
    let m: i8 = m.parse().ok()?;
    UtcOffset::from_hms(sign * h, sign * m, 0).ok()
}

fn last_day_of_month(year: i32, month: Month) -> Option<Date> {
    let first_of_next = if month == Month::December {
        Date::from_calendar_date(year + 1, Month::January, 1)
    } else {
        Date::from_calendar_date(year, month.next(), 1)
    };
    first_of_next.ok()?.previous_day()
}

fn end_of_day(date: Date) -> OffsetDateTime {
    PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc() + Duration::milliseconds(86_399_999)
}

/// Format an instant as `YYYY-MM-DDThh:mm:ss.sssZ`, the form used in backend queries.
pub fn format_instant(dt: &OffsetDateTime) -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    dt.to_offset(UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Read a date, dateTime or instant found inside a resource.
///
/// Full RFC 3339 timestamps are read as-is; partial dates resolve to the
/// start of the interval they denote.
pub fn parse_resource_instant(s: &str) -> Option<OffsetDateTime> {
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(dt.to_offset(UtcOffset::UTC));
    }
    let caps = DATE_SEARCH_REGEX.captures(s)?;
    if caps.name("prefix").is_some() {
        return None;
    }
    range_from_captures(&caps).map(|r| r.start)
}
