//! Digest scheduling for threatwire.
//!
//! Decides, for the current UTC hour and weekday, which subscriptions are
//! due. Each subscription stores a preferred local hour and a UTC offset
//! in minutes; the scheduler converts to a due UTC hour so that an hourly
//! invocation matches each subscriber exactly once per cycle.

use chrono::{DateTime, Duration, Utc};

use crate::subscriber::{Frequency, Subscription};

/// Minutes per day.
const DAY_MINUTES: i32 = 24 * 60;

/// Whether a daily/weekly subscription is due at the given UTC instant.
///
/// `utc_weekday` uses 0-6 with Sunday=0. Immediate subscriptions are not
/// scheduled here; they ride the critical-alert job.
pub fn due_digest(subscription: &Subscription, utc_hour: u32, utc_weekday: u32) -> bool {
    match subscription.frequency {
        Frequency::Immediate => false,
        Frequency::Daily => due_hour(subscription) == utc_hour,
        Frequency::Weekly => {
            due_hour(subscription) == utc_hour
                && due_weekday(subscription) == utc_weekday
        }
    }
}

/// The UTC hour at which this subscription fires.
///
/// `preferredUtcHour = preferredLocalHour - utcOffset`, normalized into
/// [0,24). Half-hour offsets floor to the containing hour so a subscriber
/// is never serviced after their preferred local hour has passed.
pub fn due_hour(subscription: &Subscription) -> u32 {
    let raw = raw_minutes(subscription);
    (raw.rem_euclid(DAY_MINUTES) / 60) as u32
}

/// The UTC weekday (0-6, Sunday=0) at which a weekly subscription fires.
///
/// An offset large enough to roll the due time across midnight shifts the
/// UTC weekday: a subscriber ahead of UTC is already on the next local
/// day, so the fire instant lands on the previous UTC day.
pub fn due_weekday(subscription: &Subscription) -> u32 {
    let raw = raw_minutes(subscription);
    let shift = if raw < 0 {
        -1
    } else if raw >= DAY_MINUTES {
        1
    } else {
        0
    };
    (subscription.preferred_weekday as i32 + shift).rem_euclid(7) as u32
}

fn raw_minutes(subscription: &Subscription) -> i32 {
    subscription.preferred_hour as i32 * 60 - subscription.utc_offset_minutes
}

/// Digest period for a cadence.
pub fn digest_period(frequency: Frequency) -> Duration {
    match frequency {
        Frequency::Immediate => Duration::hours(3),
        Frequency::Daily => Duration::hours(24),
        Frequency::Weekly => Duration::days(7),
    }
}

/// Start of the reporting window for a due subscription.
///
/// `max(last_notified_at, now - period)`: using the last successful
/// notification when it is more recent prevents re-covering articles
/// already delivered, even when the scheduler is re-invoked within one
/// period by operational retries.
pub fn window_start(subscription: &Subscription, now: DateTime<Utc>) -> DateTime<Utc> {
    let period_start = now - digest_period(subscription.frequency);
    match subscription.last_notified_at {
        Some(last) if last > period_start => last,
        _ => period_start,
    }
}
