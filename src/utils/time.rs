//! Time and timestamp utilities

use std::time::Duration;

/// Get current Unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp_is_recent() {
        // 2020-09-13
        assert!(current_timestamp() > 1_600_000_000);
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(5000)), 5000);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
