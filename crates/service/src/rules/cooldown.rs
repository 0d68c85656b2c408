//! Window arithmetic for rate-limited actions (social reconnects, OTP resends).

use chrono::{DateTime, Duration, Utc};

/// Time left before an action started at `since` may be repeated, or `None` when allowed.
pub fn remaining(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Option<Duration> {
    let ready_at = since + window;
    if now < ready_at {
        Some(ready_at - now)
    } else {
        None
    }
}

/// Coarse human wording, rounded up to the unit shown.
pub fn describe(duration: Duration) -> String {
    let minutes = (duration.num_seconds() + 59) / 60;
    if minutes >= 24 * 60 {
        let days = (minutes + 24 * 60 - 1) / (24 * 60);
        plural(days, "day")
    } else if minutes >= 60 {
        plural((minutes + 59) / 60, "hour")
    } else if minutes >= 1 {
        plural(minutes, "minute")
    } else {
        plural(duration.num_seconds().max(1), "second")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
