//! Publication date normalization.
//!
//! Feeds in the wild disagree on how to write a timestamp. Every raw date is
//! tried against a fixed, ordered list of layouts and the first match wins.

use crate::types::{AggregatorError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

type LayoutParser = fn(&str) -> Option<DateTime<FixedOffset>>;

/// Layouts in the order they are attempted.
const LAYOUTS: [(&str, LayoutParser); 5] = [
    ("RFC1123Z", parse_rfc1123_numeric),
    ("RFC1123", parse_rfc1123_named),
    ("RFC3339", parse_rfc3339),
    ("RFC822Z", parse_rfc822_numeric),
    ("RFC822", parse_rfc822_named),
];

const RFC1123_BODY: &str = "%d %b %Y %H:%M:%S";
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const RFC822_BODY: &str = "%d %b %y %H:%M";

/// Parses a feed item's raw publication date into a UTC instant.
///
/// Surrounding whitespace is ignored. Fails with
/// [`AggregatorError::UnsupportedDateFormat`] carrying the original input when
/// no layout matches.
pub fn parse_published_at(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();

    for (name, parse) in LAYOUTS.iter() {
        if let Some(parsed) = parse(trimmed) {
            tracing::trace!("parsed {:?} as {}", raw, name);
            return Ok(parsed.with_timezone(&Utc));
        }
    }

    Err(AggregatorError::UnsupportedDateFormat(raw.to_string()))
}

/// Resolves an optional raw date the way ingestion needs it: absent, blank or
/// unparseable dates all become `None`.
pub fn resolve_published_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;

    match parse_published_at(raw) {
        Ok(instant) => Some(instant),
        Err(e) => {
            tracing::debug!("{}, storing post without a published time", e);
            None
        }
    }
}

/// Strips a leading `Xxx, ` weekday. The name must be a known abbreviation;
/// it is not checked against the date.
fn strip_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(", ")?;
    if !WEEKDAYS.iter().any(|name| name.eq_ignore_ascii_case(day)) {
        return None;
    }
    Some(rest.trim_start())
}

fn parse_rfc1123_numeric(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(strip_weekday(s)?, &format!("{} %z", RFC1123_BODY)).ok()
}

fn parse_rfc1123_named(s: &str) -> Option<DateTime<FixedOffset>> {
    parse_with_named_zone(strip_weekday(s)?, RFC1123_BODY)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

fn parse_rfc822_numeric(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, &format!("{} %z", RFC822_BODY)).ok()
}

fn parse_rfc822_named(s: &str) -> Option<DateTime<FixedOffset>> {
    parse_with_named_zone(s, RFC822_BODY)
}

fn parse_with_named_zone(s: &str, body_format: &str) -> Option<DateTime<FixedOffset>> {
    let (body, zone) = s.rsplit_once(' ')?;
    let offset = zone_offset(zone)?;
    let naive = NaiveDateTime::parse_from_str(body, body_format).ok()?;

    offset.from_local_datetime(&naive).single()
}

/// Offsets for the zone names RFC 822 defines. Any other all-caps
/// abbreviation is accepted at a zero offset.
fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let hours = match zone {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        other if is_zone_abbreviation(other) => 0,
        _ => return None,
    };

    FixedOffset::east_opt(hours * 3600)
}

fn is_zone_abbreviation(zone: &str) -> bool {
    (3..=5).contains(&zone.len()) && zone.chars().all(|c| c.is_ascii_uppercase())
}
