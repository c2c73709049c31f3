pub mod clock;
pub mod store;

pub use clock::{DayClock, ReferenceClock, day_key};
pub use store::{QuotaExceeded, QuotaStatus, QuotaStore};

pub const DEFAULT_DAILY_LIMIT: u32 = 5;

/// Picks the caller's limit when it is a usable value, the fallback otherwise.
/// A custom limit of zero is treated as "not supplied".
pub fn resolve_limit(custom_limit: Option<u32>, fallback: u32) -> u32 {
    match custom_limit {
        Some(limit) if limit > 0 => limit,
        _ => fallback.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_limit_wins_when_positive() {
        assert_eq!(resolve_limit(Some(12), DEFAULT_DAILY_LIMIT), 12);
    }

    #[test]
    fn zero_or_missing_limit_falls_back() {
        assert_eq!(resolve_limit(Some(0), DEFAULT_DAILY_LIMIT), 5);
        assert_eq!(resolve_limit(None, 8), 8);
        assert_eq!(resolve_limit(None, 0), 1);
    }
}
