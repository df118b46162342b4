//! Backoff schedules for re-authentication retries and stream reconnects.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the random jitter added to stream reconnect delays,
/// as a fraction of the undelayed value.
pub const MAX_JITTER_FRACTION: f64 = 0.1;

/// Linear delay applied before the `retry`-th re-authentication (1-based).
pub fn linear_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(retry)
}

/// Exponential delay before the `attempt`-th reconnect (1-based), without jitter.
pub fn exponential_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Exponential delay plus up to [`MAX_JITTER_FRACTION`] of random jitter.
pub fn jittered_delay(base: Duration, attempt: u32) -> Duration {
    let delay = exponential_delay(base, attempt);
    with_jitter(delay, rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION))
}

fn with_jitter(delay: Duration, fraction: f64) -> Duration {
    delay.saturating_add(delay.mul_f64(fraction.clamp(0.0, MAX_JITTER_FRACTION)))
}
