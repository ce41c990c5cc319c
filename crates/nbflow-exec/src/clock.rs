//! Time source for context building.

use chrono::{DateTime, Utc};

/// Format of the day bucket used in output paths.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Day-bucket label for the current time.
    fn today(&self) -> String {
        self.now().format(DAY_FORMAT).to_string()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// ISO-8601 timestamp with microseconds, without offset.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_today() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 5, 23, 59, 0).unwrap());
        assert_eq!(clock.today(), "2024-01-05");
        assert_eq!(iso_timestamp(clock.now()), "2024-01-05T23:59:00.000000");
    }
}
