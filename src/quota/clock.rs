use chrono::{DateTime, FixedOffset, Utc};

/// Source of the current calendar day used to key quota records.
pub trait DayClock: Send + Sync {
    fn today(&self) -> String;
}

/// Formats "now" as `YYYY-MM-DD` in one fixed reference timezone, so every
/// request rolls over at the same instant regardless of server locale.
#[derive(Clone, Copy, Debug)]
pub struct ReferenceClock {
    offset: FixedOffset,
}

impl ReferenceClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl DayClock for ReferenceClock {
    fn today(&self) -> String {
        day_key(Utc::now(), self.offset)
    }
}

pub fn day_key(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_key_uses_reference_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        assert_eq!(day_key(instant, FixedOffset::east_opt(0).unwrap()), "2024-03-09");
        assert_eq!(
            day_key(instant, FixedOffset::east_opt(8 * 3600).unwrap()),
            "2024-03-10"
        );
        assert_eq!(
            day_key(instant, FixedOffset::west_opt(5 * 3600).unwrap()),
            "2024-03-09"
        );
    }

    #[test]
    fn today_is_a_calendar_date() {
        let today = ReferenceClock::new(FixedOffset::east_opt(0).unwrap()).today();
        assert!(chrono::NaiveDate::parse_from_str(&today, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn rollover_happens_at_reference_midnight() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 3, 9, 21, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 9, 22, 0, 0).unwrap();
        assert_eq!(day_key(before, offset), "2024-03-09");
        assert_eq!(day_key(after, offset), "2024-03-10");
    }
}
