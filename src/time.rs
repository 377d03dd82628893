use chrono::{DateTime, Duration, Utc};

/// Minutes between booking and due time for immediate bookings.
pub const IMMEDIATE_LEAD_MINUTES: i64 = 5;

/// Source of "now" for the engine; swapped for a settable clock in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Elapsed session time as `H:M:S` without padding, e.g. `1:30:15`.
///
/// A completion before the due time yields the absolute difference.
pub fn session_time(started: DateTime<Utc>, ended: DateTime<Utc>) -> String {
    let total = (ended - started).num_seconds().abs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}:{minutes}:{seconds}")
}

/// Renders a stored `H:M:S` session time as `"1 h 30 min"` for e-mails.
pub fn session_time_label(session_time: &str) -> String {
    let mut parts = session_time.split(':');
    let hours = parts.next().unwrap_or("0");
    let minutes = parts.next().unwrap_or("0");
    format!("{hours} h {minutes} min")
}

pub fn duration_label(minutes: i32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, rest) => format!("{rest} min"),
        (hours, 0) => format!("{hours} h"),
        (hours, rest) => format!("{hours} h {rest} min"),
    }
}

/// Parses an admin-entered `H:M[:S]` session time.
pub fn parse_session_time(value: &str) -> Option<String> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let numbers: Option<Vec<u32>> = parts.iter().map(|part| part.parse().ok()).collect();
    let numbers = numbers?;
    if numbers.iter().skip(1).any(|value| *value >= 60) {
        return None;
    }
    let seconds = numbers.get(2).copied().unwrap_or(0);
    Some(format!("{}:{}:{}", numbers[0], numbers[1], seconds))
}

/// When an unaccepted booking stops being offered.
pub fn will_expire_at(due: DateTime<Utc>, created: DateTime<Utc>) -> DateTime<Utc> {
    let lead = due - created;
    if lead <= Duration::minutes(90) {
        due
    } else if lead <= Duration::hours(24) {
        created + Duration::minutes(90)
    } else if lead <= Duration::hours(72) {
        created + Duration::hours(16)
    } else {
        due - Duration::hours(48)
    }
}
