use std::io;
use std::thread::sleep;
use std::time::Duration;

use tracing::debug;

/// Bounded retry with exponential backoff for transient I/O failures.
///
/// Applied to reads, opens and syncs only; appends are never retried since a
/// partial write cannot be told apart from a completed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub const NONE: Self = Self {
        attempts: 1,
        backoff: Duration::ZERO,
    };

    /// Delay before retry number `attempt + 1`, saturating at `Duration::MAX`.
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(Duration::MAX)
    }

    /// Run `op`, retrying transient errors until the attempt budget is spent.
    pub fn run<T>(&self, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt + 1 < self.attempts => {
                    let delay = self.delay(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient I/O error; retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether an I/O error is worth retrying.
pub fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
