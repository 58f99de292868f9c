use std::time::Duration;

/// Spacing of the reconnection attempts to the comment feed
#[derive(Clone, Debug)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    attempts: u32,
}

impl Default for Backoff {
    fn default() -> Backoff {
        Backoff::new(5, Duration::from_secs(1), Duration::from_secs(5))
    }
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Backoff {
        Backoff {
            max_attempts,
            base_delay,
            max_delay,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt, or None once all attempts were used
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(self.attempts).unwrap_or(u32::MAX);
        self.attempts += 1;
        Some(std::cmp::min(
            self.base_delay.saturating_mul(factor),
            self.max_delay,
        ))
    }

    /// To be called once a connection succeeded
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_then_caps_then_gives_up() {
        let mut b = Backoff::default();
        let delays = std::iter::from_fn(|| b.next_delay()).collect::<Vec<_>>();
        assert_eq!(delays, [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec());
        assert_eq!(b.attempts(), 5);
        b.reset();
        assert_eq!(b.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let mut b = Backoff::new(100, Duration::from_millis(10), Duration::from_secs(60));
        let last = std::iter::from_fn(|| b.next_delay()).last();
        assert_eq!(last, Some(Duration::from_secs(60)));
    }
}
