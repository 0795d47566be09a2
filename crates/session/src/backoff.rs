//! Retry backoff for transport connection attempts.
//!
//! Delays double from a 1 second base and there is no jitter, so the exact
//! schedule stays assertable: nothing before attempt 1, then 1s and 2s
//! before attempts 2 and 3.

use std::time::Duration;

/// Hard cap on transport connection attempts per `start()` call.
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Base delay the doubling sequence starts from.
pub const CONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Delay to sleep after `attempt` (1-based) fails, before the next attempt.
pub fn delay_after(attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    CONNECT_BASE_DELAY * 2u32.saturating_pow(attempt - 1)
}

/// Delay observed before `attempt` (1-based) begins: zero for the first
/// attempt, `delay_after(attempt - 1)` for every later one.
pub fn delay_before(attempt: u32) -> Duration {
    if attempt <= 1 {
        Duration::ZERO
    } else {
        delay_after(attempt - 1)
    }
}
