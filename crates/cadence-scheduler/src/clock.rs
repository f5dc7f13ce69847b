//! Delta clock: decoding deltas into absolute period bounds.
//!
//! All arithmetic happens on [`DateTime<Utc>`] values; the packed integer is
//! only split once, in [`start_of`].

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::{Result, SchedulerError};
use crate::types::{Delta, Frequency};

/// Inclusive start of the period identified by `delta`.
pub fn start_of(delta: Delta) -> Result<DateTime<Utc>> {
    let raw = delta.get();
    let hour = raw % 100;
    let date = raw / 100;
    if hour > 23 {
        return Err(SchedulerError::invalid_delta(
            delta,
            format!("hour offset {hour} is outside 0..=23"),
        ));
    }

    let year = i32::try_from(date / 10_000)
        .map_err(|_| SchedulerError::invalid_delta(delta, "year out of range"))?;
    let month = (date / 100 % 100) as u32;
    let day = (date % 100) as u32;

    Utc.with_ymd_and_hms(year, month, day, hour as u32, 0, 0)
        .single()
        .ok_or_else(|| {
            SchedulerError::invalid_delta(delta, format!("{date} is not a calendar date"))
        })
}

/// Inclusive end of the period starting at `delta`: one `frequency * interval`
/// period later, minus one second.
pub fn end_of(delta: Delta, frequency: Frequency, interval: u32) -> Result<DateTime<Utc>> {
    if interval == 0 {
        return Err(SchedulerError::InvalidTask(
            "frequency interval must be positive".to_string(),
        ));
    }
    let start = start_of(delta)?;
    let next = frequency
        .shift(start, i64::from(interval))
        .ok_or_else(|| SchedulerError::invalid_delta(delta, "period end overflows"))?;
    Ok(next - Duration::seconds(1))
}

/// The delta one `frequency` unit after `delta`.
pub fn next_delta(delta: Delta, frequency: Frequency) -> Result<Delta> {
    let start = start_of(delta)?;
    frequency
        .shift(start, 1)
        .map(Delta::from_datetime)
        .ok_or_else(|| SchedulerError::invalid_delta(delta, "next period overflows"))
}
