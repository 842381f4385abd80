use std::time::Duration;

/// Reconnect delay, doubling on each failure up to a ceiling.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            current: floor.min(ceiling),
        }
    }

    /// The delay that the next failure will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the delay for a reconnect being scheduled now, then double it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.ceiling);
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor.min(self.ceiling);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let floor = Duration::from_millis(500);
        let ceiling = Duration::from_millis(8000);
        let mut backoff = Backoff::new(floor, ceiling);

        for n in 0..10u32 {
            let expected = floor.saturating_mul(2u32.pow(n)).min(ceiling);
            assert_eq!(backoff.current(), expected, "after {} failures", n);
            assert_eq!(backoff.next_delay(), expected);
        }

        assert_eq!(backoff.current(), ceiling);
    }

    #[test]
    fn test_backoff_reset_to_floor() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(8));
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_millis(4000));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }
}
