//! Interval and jitter helpers for the posting loop

use std::time::Duration;

use rand::Rng;

use crate::error::{ConfigError, Result};

/// Shortest allowed gap between two cycles
pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Parse a human-readable interval ("1h", "90m", "2h 30m") and apply [`MIN_INTERVAL`]
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the string is not a duration.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let parsed = humantime::parse_duration(input.trim()).map_err(|e| ConfigError::InvalidValue {
        field: "schedule.interval".to_string(),
        reason: format!("{} ({})", e, input),
    })?;
    Ok(apply_floor(parsed))
}

pub fn apply_floor(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL)
}

/// Pick a delay uniformly in `[0, max]`
pub fn startup_delay<R: Rng + ?Sized>(max: Duration, rng: &mut R) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let secs = rng.gen_range(0..=max.as_secs());
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_interval_formats() {
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("90m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_interval("2h 30m").unwrap(), Duration::from_secs(9000));
    }

    #[test]
    fn test_parse_interval_applies_floor() {
        assert_eq!(parse_interval("10s").unwrap(), MIN_INTERVAL);
        assert_eq!(parse_interval("0s").unwrap(), MIN_INTERVAL);
    }

    #[test]
    fn test_parse_interval_rejects_garbage() {
        let err = parse_interval("every now and then").unwrap_err();
        assert!(err.to_string().contains("schedule.interval"));
    }

    #[test]
    fn test_startup_delay_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(startup_delay(Duration::ZERO, &mut rng), Duration::ZERO);

        let max = Duration::from_secs(300);
        for _ in 0..100 {
            assert!(startup_delay(max, &mut rng) <= max);
        }
    }
}
