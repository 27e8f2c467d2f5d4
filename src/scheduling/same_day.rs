use super::Platform;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One platform's posting time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSlot {
    pub platform: Platform,
    pub scheduled_for: DateTime<Utc>,
}

/// Posting slots for `platforms`, all on one calendar day in `tz`.
///
/// Today is used when every platform's optimal hour is still at least
/// `lead_minutes` away; otherwise the whole batch moves to tomorrow.
/// Slots are returned in chronological order.
pub fn same_day_slots(
    platforms: &[Platform],
    tz: Tz,
    now: DateTime<Utc>,
    lead_minutes: i64,
) -> Vec<PlatformSlot> {
    if platforms.is_empty() {
        return Vec::new();
    }

    let earliest_allowed = now + Duration::minutes(lead_minutes);
    let today = now.with_timezone(&tz).date_naive();

    let todays = slots_for_day(platforms, tz, today);
    let mut slots = if todays.iter().all(|s| s.scheduled_for >= earliest_allowed) {
        todays
    } else {
        let tomorrow = today.succ_opt().unwrap_or(today);
        slots_for_day(platforms, tz, tomorrow)
    };

    slots.sort_by_key(|s| (s.scheduled_for, s.platform));
    slots
}

fn slots_for_day(platforms: &[Platform], tz: Tz, day: NaiveDate) -> Vec<PlatformSlot> {
    let weekday = day.weekday().num_days_from_sunday() as usize;
    let mut seen = Vec::with_capacity(platforms.len());
    platforms
        .iter()
        .copied()
        .filter(|p| {
            // De-duplicate while keeping caller order
            if seen.contains(p) {
                false
            } else {
                seen.push(*p);
                true
            }
        })
        .map(|platform| PlatformSlot {
            platform,
            scheduled_for: local_hour(tz, day, platform.optimal_hours()[weekday]),
        })
        .collect()
}

/// `hour:00` local time on `day`; a DST gap shifts forward to the next valid hour
fn local_hour(tz: Tz, day: NaiveDate, hour: u32) -> DateTime<Utc> {
    let mut h = hour;
    loop {
        if let Some(naive) = day.and_hms_opt(h, 0, 0) {
            if let Some(local) = tz.from_local_datetime(&naive).earliest() {
                return local.with_timezone(&Utc);
            }
        }
        if h >= 23 {
            // No valid local hour remains; fall back to UTC midnight of the next day
            let next = day.succ_opt().unwrap_or(day);
            return Utc.from_utc_datetime(&next.and_time(chrono::NaiveTime::MIN));
        }
        h += 1;
    }
}
