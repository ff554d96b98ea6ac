// Time-aligned expiry
//
// Every key expires once per period at a fixed offset inside the period,
// derived from the key itself. Instances that cache the same key agree on
// the instant; different keys spread across the period.

use crate::domain::stable_hash;

/// Prime modulus for the per-key offset
pub const EXPIRY_OFFSET_MODULUS: u64 = 997;

/// Absolute expiry instant (ms) for `key`, in `(now_ms, now_ms + period_ms]`
pub fn calc_expire(key: &str, period_ms: i64, now_ms: i64) -> i64 {
    let period = period_ms.max(1);
    let slot = (stable_hash(key) % EXPIRY_OFFSET_MODULUS) as i64;
    let offset_ms = period * slot / EXPIRY_OFFSET_MODULUS as i64;

    let prev_boundary = now_ms - now_ms.rem_euclid(period);
    let expire = prev_boundary + period + offset_ms;
    if expire > now_ms + period {
        expire - period
    } else {
        expire
    }
}
