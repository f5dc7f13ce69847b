use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use tracing::debug;

use crate::types::{Delta, Frequency, Task};

/// Last hourly slot (hour of day).
const MAX_HOUR_SLOT: u32 = 23;
/// Last daily slot (weekday, Sunday = 0).
const MAX_WEEKDAY_SLOT: u32 = 6;

/// Slots a task runs in: hours of the day for hourly tasks, weekdays
/// (Sunday = 0) for daily tasks. Other frequencies ignore slots.
///
/// `frequency_interval` is both the step between slots and the length of
/// each period (see [`crate::clock::end_of`]). When the interval does not
/// divide the slot cycle (24 hours, 7 days), the last slot's period runs
/// into the next cycle's first slot: a daily task with interval 2 runs on
/// Sun/Tue/Thu/Sat and its Saturday period also covers Sunday. Periods are
/// never merged or clipped; each slot is processed and recorded on its own.
pub fn active_slots(task: &Task) -> Vec<u32> {
    let max = match task.frequency {
        Frequency::Hourly => MAX_HOUR_SLOT,
        Frequency::Daily => MAX_WEEKDAY_SLOT,
        _ => return Vec::new(),
    };
    let start = task.skip_start_index.min(max);
    if !task.recurrence {
        return vec![start];
    }
    let end = task.skip_end_index.unwrap_or(max).min(max);
    let step = task.frequency_interval.max(1) as usize;
    (start..=end).step_by(step).collect()
}

/// Every delta the task's configuration schedules in the `lookback` periods
/// up to `now`, oldest first.
///
/// The window end is pulled back by the task's start offset, so a period is
/// only due once `offset_start_minutes` have passed since it began.
pub fn configured_deltas(task: &Task, lookback: u32, now: DateTime<Utc>) -> Vec<Delta> {
    if lookback == 0 {
        return Vec::new();
    }
    let Some(end) = Duration::try_minutes(task.offset_start_minutes)
        .and_then(|offset| now.checked_sub_signed(offset))
    else {
        return Vec::new();
    };
    let Some(start) = task.frequency.shift(end, -i64::from(lookback)) else {
        return Vec::new();
    };
    let deltas = deltas_between(task, start, end);
    debug!(
        task = %task.name,
        lookback,
        count = deltas.len(),
        "configured deltas enumerated"
    );
    deltas
}

/// Scheduled period starts in `[from, to]`, after aligning `from` down to
/// the start of the period containing it.
pub fn deltas_between(task: &Task, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Delta> {
    let mut deltas = Vec::new();
    let Some(mut cursor) = align(task, from) else {
        return deltas;
    };

    match task.frequency {
        Frequency::Hourly | Frequency::Daily => {
            let slots = active_slots(task);
            while cursor <= to {
                let slot = match task.frequency {
                    Frequency::Hourly => cursor.hour(),
                    _ => cursor.weekday().num_days_from_sunday(),
                };
                if slots.contains(&slot) {
                    deltas.push(Delta::from_datetime(cursor));
                }
                match task.frequency.shift(cursor, 1) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
        Frequency::Weekly | Frequency::Monthly | Frequency::Quarterly => {
            let step = i64::from(task.frequency_interval.max(1));
            while cursor <= to {
                deltas.push(Delta::from_datetime(cursor));
                match task.frequency.shift(cursor, step) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
    }
    deltas
}

/// Start of the period containing `at`.
///
/// Multi-unit weekly/monthly/quarterly periods are anchored to fixed
/// epochs so the series does not drift with the lookback window.
fn align(task: &Task, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let interval = i64::from(task.frequency_interval.max(1));
    match task.frequency {
        Frequency::Hourly => Utc
            .with_ymd_and_hms(at.year(), at.month(), at.day(), at.hour(), 0, 0)
            .single(),
        Frequency::Daily => midnight(at),
        Frequency::Weekly => {
            // 1970-01-04 was a Sunday.
            let epoch = Utc.with_ymd_and_hms(1970, 1, 4, 0, 0, 0).single()?;
            let weeks = (midnight(at)? - epoch).num_days().div_euclid(7);
            let aligned = weeks - weeks.rem_euclid(interval);
            epoch.checked_add_signed(Duration::try_weeks(aligned)?)
        }
        Frequency::Monthly => {
            let index = i64::from(at.year()) * 12 + i64::from(at.month0());
            let aligned = index - index.rem_euclid(interval);
            first_of_month(aligned.div_euclid(12), aligned.rem_euclid(12))
        }
        Frequency::Quarterly => {
            let index = i64::from(at.year()) * 4 + i64::from(at.month0() / 3);
            let aligned = index - index.rem_euclid(interval);
            first_of_month(aligned.div_euclid(4), aligned.rem_euclid(4) * 3)
        }
    }
}

fn midnight(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(at.year(), at.month(), at.day(), 0, 0, 0)
        .single()
}

fn first_of_month(year: i64, month0: i64) -> Option<DateTime<Utc>> {
    let year = i32::try_from(year).ok()?;
    let month = u32::try_from(month0 + 1).ok()?;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(frequency: Frequency) -> Task {
        Task {
            id: 1,
            name: "t".into(),
            frequency,
            frequency_interval: 1,
            skip_start_index: 0,
            skip_end_index: None,
            recurrence: true,
            offset_start_minutes: 0,
            is_project_scoped: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn raw(deltas: &[Delta]) -> Vec<u64> {
        deltas.iter().map(|d| d.get()).collect()
    }

    #[test]
    fn hourly_window_includes_started_periods() {
        let deltas = configured_deltas(&task(Frequency::Hourly), 3, utc(2024, 1, 5, 10, 30));
        assert_eq!(
            raw(&deltas),
            vec![2024010507, 2024010508, 2024010509, 2024010510]
        );
    }

    #[test]
    fn start_offset_delays_the_window() {
        let mut t = task(Frequency::Hourly);
        t.offset_start_minutes = 60;
        let deltas = configured_deltas(&t, 2, utc(2024, 1, 5, 10, 30));
        assert_eq!(raw(&deltas), vec![2024010507, 2024010508, 2024010509]);
    }

    #[test]
    fn hourly_slots_step_by_interval() {
        let mut t = task(Frequency::Hourly);
        t.frequency_interval = 6;
        assert_eq!(active_slots(&t), vec![0, 6, 12, 18]);

        let deltas = configured_deltas(&t, 24, utc(2024, 1, 5, 13, 0));
        assert_eq!(
            raw(&deltas),
            vec![2024010418, 2024010500, 2024010506, 2024010512]
        );
    }

    #[test]
    fn non_recurring_task_uses_only_the_start_slot() {
        let mut t = task(Frequency::Hourly);
        t.skip_start_index = 3;
        t.skip_end_index = Some(20);
        t.recurrence = false;
        assert_eq!(active_slots(&t), vec![3]);
    }

    #[test]
    fn wrapping_slot_period_overlaps_the_next_cycle() {
        let mut t = task(Frequency::Daily);
        t.frequency_interval = 2;
        assert_eq!(active_slots(&t), vec![0, 2, 4, 6]);

        // Saturday the 6th and Sunday the 7th are both scheduled.
        let deltas = configured_deltas(&t, 4, utc(2024, 1, 7, 9, 0));
        assert_eq!(raw(&deltas), vec![2024010400, 2024010600, 2024010700]);

        let saturday_end =
            crate::clock::end_of(Delta::new(2024010600), t.frequency, t.frequency_interval).unwrap();
        let sunday_start = crate::clock::start_of(Delta::new(2024010700)).unwrap();
        assert!(saturday_end > sunday_start);
    }

    #[test]
    fn daily_slots_filter_weekdays() {
        let mut t = task(Frequency::Daily);
        // Monday through Friday.
        t.skip_start_index = 1;
        t.skip_end_index = Some(5);
        // 2024-01-01 is a Monday; the 6th and 7th fall on the weekend.
        let deltas = configured_deltas(&t, 7, utc(2024, 1, 8, 9, 0));
        assert_eq!(
            raw(&deltas),
            vec![2024010100, 2024010200, 2024010300, 2024010400, 2024010500, 2024010800]
        );
    }

    #[test]
    fn weekly_deltas_start_on_sunday() {
        let deltas = configured_deltas(&task(Frequency::Weekly), 2, utc(2024, 1, 17, 12, 0));
        assert_eq!(raw(&deltas), vec![2023123100, 2024010700, 2024011400]);
    }

    #[test]
    fn monthly_deltas_start_on_the_first() {
        let deltas = configured_deltas(&task(Frequency::Monthly), 2, utc(2024, 3, 15, 0, 0));
        assert_eq!(raw(&deltas), vec![2024010100, 2024020100, 2024030100]);
    }

    #[test]
    fn quarterly_deltas_follow_calendar_quarters() {
        let deltas = configured_deltas(&task(Frequency::Quarterly), 2, utc(2024, 5, 20, 0, 0));
        assert_eq!(raw(&deltas), vec![2023100100, 2024010100, 2024040100]);
    }

    #[test]
    fn multi_month_series_is_anchored() {
        let mut t = task(Frequency::Monthly);
        t.frequency_interval = 2;
        let march = configured_deltas(&t, 3, utc(2024, 3, 10, 0, 0));
        let april = configured_deltas(&t, 3, utc(2024, 4, 10, 0, 0));
        // Month indices divisible by two (Nov, Jan, Mar) form the series in both windows.
        assert_eq!(raw(&march), vec![2023110100, 2024010100, 2024030100]);
        assert_eq!(raw(&april), vec![2024010100, 2024030100]);
    }

    #[test]
    fn zero_lookback_enumerates_nothing() {
        assert!(configured_deltas(&task(Frequency::Daily), 0, utc(2024, 1, 1, 0, 0)).is_empty());
    }
}
