use std::time::Duration;

/// Default linear backoff unit.
/// One second spaces retries past most transient network blips.
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

/// Delay schedule between attempts. Attempt 0 never waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// `attempt * unit`.
    Linear { unit: Duration },
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
        }
    }
}

impl Backoff {
    pub fn linear(unit: Duration) -> Self {
        Self::Linear { unit }
    }

    /// Delay to wait before `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match *self {
            Self::None => Duration::ZERO,
            Self::Linear { unit } => unit.saturating_mul(attempt),
            Self::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delays() {
        let backoff = Backoff::linear(Duration::from_millis(250));
        assert_eq!(backoff.delay_for(0), Duration::ZERO);
        assert_eq!(backoff.delay_for(1), Duration::from_millis(250));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(7), Duration::from_millis(1750));
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
        };
        assert_eq!(backoff.delay_for(0), Duration::ZERO);
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(64), Duration::from_secs(10));
    }

    #[test]
    fn test_default_is_linear_one_second() {
        assert_eq!(Backoff::default().delay_for(3), Duration::from_secs(3));
        assert_eq!(Backoff::None.delay_for(3), Duration::ZERO);
    }
}
