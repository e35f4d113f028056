use std::time::Duration;

/// Transient provider retries (§7) get 3 attempts within the turn budget:
/// 200ms -> 400ms -> 800ms, each with up to 10% jitter. Capped low because a
/// turn that blows its 3s budget degrades instead of retrying further.
const BACKOFF_BASE_MS: u64 = 200;
const BACKOFF_MAX_MS: u64 = 800;
const JITTER_FRACTION: f64 = 0.10;
pub const MAX_TRANSIENT_ATTEMPTS: u32 = 3;

/// Delay before retry attempt `attempt` (1-indexed), with jitter applied.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = (BACKOFF_BASE_MS * 2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(BACKOFF_MAX_MS);
    Duration::from_millis(base + jitter_ms(base))
}

/// Deterministic pseudo-random jitter derived from the current monotonic
/// timestamp, avoiding a `rand` dependency for a single offset computation.
fn jitter_ms(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_ms as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let d1 = backoff_delay(1).as_millis() as u64;
        let d2 = backoff_delay(2).as_millis() as u64;
        let d3 = backoff_delay(3).as_millis() as u64;
        assert!(d1 >= BACKOFF_BASE_MS && d1 < BACKOFF_BASE_MS + BACKOFF_BASE_MS / 10 + 1);
        assert!(d2 >= BACKOFF_BASE_MS * 2);
        assert!(d3 <= BACKOFF_MAX_MS + BACKOFF_MAX_MS / 10 + 1);
    }
}
