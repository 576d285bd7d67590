use std::time::{Duration, Instant};

/// An absolute point in time fixed when a timed call starts.
///
/// Waits are issued with the time left until the deadline, recomputed on every loop iteration,
/// so spurious wakeups never extend the total wait.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    /// `None` when `now + timeout` does not fit in an `Instant`, which is treated as never.
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Time left before the deadline, or `None` once it has passed.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        match self.at {
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    None
                } else {
                    Some(left)
                }
            }
            None => Some(Duration::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_is_already_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert_eq!(deadline.remaining(), None);
    }

    #[test]
    fn test_remaining_shrinks() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let first = deadline.remaining().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = deadline.remaining().unwrap();
        assert!(second < first);
        assert!(first <= Duration::from_secs(60));
    }

    #[test]
    fn test_overflowing_timeout_never_expires() {
        let deadline = Deadline::after(Duration::MAX);
        assert_eq!(deadline.remaining(), Some(Duration::MAX));
    }

    #[test]
    fn test_expires_after_timeout() {
        let deadline = Deadline::after(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(deadline.remaining(), None);
    }
}
