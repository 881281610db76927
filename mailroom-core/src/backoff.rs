//! Retry backoff calculation.
//!
//! Pure except for jitter randomness. The service layer decides *when*
//! to retry; this module only computes *how long* to wait.

use std::time::Duration;

/// Calculate the delay before retry attempt `attempt` (1-based).
///
/// Uses exponential backoff with random jitter to avoid synchronized
/// retries against an already-throttling provider.
///
/// Formula: `min(cap, base * 2^(attempt-1)) + random(0..=500ms)`
pub fn delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let scaled = base.saturating_mul(1u32 << exponent);
    let bounded = scaled.min(cap);

    bounded + Duration::from_millis(random_jitter_ms())
}

/// Generate random jitter between 0 and 500 milliseconds.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");
    let random = u64::from_le_bytes(bytes);
    random % 501 // 0..=500
}
