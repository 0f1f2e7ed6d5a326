use crate::types::{AggregatorError, Result};
use std::time::Duration;

/// Parses durations written like `30s`, `1m30s`, `1.5h` or `250ms`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is zero.
/// Negative values are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || {
        AggregatorError::InvalidInterval(format!(
            "{:?} is not a duration like 30s, 1m or 1h30m",
            input
        ))
    };

    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_end);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };

        nanos += value * scale;
        rest = next;
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}
