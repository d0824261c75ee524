//! Domain models for the measurement exports: schema selection and the UTC
//! windows a reporting period maps to.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::ApiError;

// ---

/// Logical database partition holding one deployment's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Public,
    Dev,
    Demo,
}

impl Schema {
    /// Map the request's environment selector to a schema.
    ///
    /// `production` (or no selector) targets `public`.
    pub fn from_selector(selector: Option<&str>) -> Result<Self, ApiError> {
        // ---
        match selector.map(str::trim) {
            None | Some("") | Some("production") => Ok(Schema::Public),
            Some("dev") => Ok(Schema::Dev),
            Some("demo") => Ok(Schema::Demo),
            Some(other) => Err(ApiError::Validation(format!(
                "Invalid enviroment '{}'. Expected one of: production, demo, dev.",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Schema::Public => "public",
            Schema::Dev => "dev",
            Schema::Demo => "demo",
        }
    }
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Cut the window off at `now` so pending data is never returned.
    pub fn clamp_to(self, now: DateTime<Utc>) -> Self {
        TimeWindow {
            start: self.start,
            end: self.end.min(now),
        }
    }
}

/// Parse a stored IANA zone name.
pub fn parse_time_zone(name: &str) -> Result<Tz, ApiError> {
    // ---
    name.trim().parse::<Tz>().map_err(|_| {
        ApiError::Upstream(format!(
            "Failed to generate CSV: unknown time zone '{}'",
            name
        ))
    })
}

/// The calendar month `year`-`month` in `tz`, as a UTC window.
///
/// The end is the first instant of the following month, rolling December
/// over to January of the next year.
pub fn month_window(year: i32, month: u32, tz: Tz) -> Result<TimeWindow, ApiError> {
    // ---
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ApiError::Validation(format!("Invalid period {}-{}.", year, month)))?;

    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| ApiError::Validation(format!("Invalid period {}-{}.", year, month)))?;

    Ok(TimeWindow {
        start: localize(first.and_time(NaiveTime::MIN), tz)?,
        end: localize(next.and_time(NaiveTime::MIN), tz)?,
    })
}

/// A user-supplied range bound, parsed before the meter's zone is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// RFC 3339 input; keeps its own offset.
    Absolute(DateTime<Utc>),
    /// Wall-clock input, read in the meter's zone.
    Local(NaiveDateTime),
}

impl Timestamp {
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and
    /// `YYYY-MM-DD`.
    pub fn parse(field: &str, raw: &str) -> Result<Self, ApiError> {
        // ---
        let raw = raw.trim();

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Timestamp::Absolute(ts.with_timezone(&Utc)));
        }

        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(Timestamp::Local(naive));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(Timestamp::Local(date.and_time(NaiveTime::MIN)));
        }

        Err(ApiError::Validation(format!(
            "Invalid {} '{}'. Expected YYYY-MM-DD, YYYY-MM-DD HH:MM:SS or RFC 3339.",
            field, raw
        )))
    }

    pub fn resolve(&self, tz: Tz) -> Result<DateTime<Utc>, ApiError> {
        match self {
            Timestamp::Absolute(ts) => Ok(*ts),
            Timestamp::Local(naive) => localize(*naive, tz),
        }
    }
}

/// An explicit `[start, end)` range resolved in `tz`.
pub fn explicit_window(start: Timestamp, end: Timestamp, tz: Tz) -> Result<TimeWindow, ApiError> {
    // ---
    let window = TimeWindow {
        start: start.resolve(tz)?,
        end: end.resolve(tz)?,
    };

    if window.end <= window.start {
        return Err(ApiError::Validation(format!(
            "end_utc ({}) must be after start_utc ({}).",
            window.end, window.start
        )));
    }
    Ok(window)
}

/// Resolve a wall-clock time in `tz` to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap move forward to the first valid instant.
fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, ApiError> {
    // ---
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Gaps are at most a few hours; walk forward minute by minute.
            (1..=24 * 60)
                .map(|m| naive + Duration::minutes(m))
                .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| {
                    ApiError::Validation(format!("Time {} does not exist in {}.", naive, tz.name()))
                })
        }
    }
}

/// `2024-05` style label for a month.
pub fn month_label(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// `20240501` style label for a UTC instant, used in file names.
pub fn date_label(ts: &DateTime<Utc>) -> String {
    format!("{:04}{:02}{:02}", ts.year(), ts.month(), ts.day())
}
