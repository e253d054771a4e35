//! Time utilities

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Current Unix timestamp in seconds
pub fn unix_secs() -> i64 {
    Utc::now().timestamp()
}

/// `now + minutes`, saturating on absurd inputs
pub fn minutes_from(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(minutes)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_from_adds_and_saturates() {
        let now = Utc::now();
        assert_eq!(minutes_from(now, 30) - now, Duration::minutes(30));
        assert_eq!(minutes_from(now, i64::MAX / 120), DateTime::<Utc>::MAX_UTC);
    }
}
