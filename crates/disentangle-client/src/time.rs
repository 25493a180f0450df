//! Time utilities.
//!
//! All timestamps are Unix epoch microseconds (u64).

use std::sync::atomic::{AtomicU64, Ordering};

static LAST_OBSERVED: AtomicU64 = AtomicU64::new(0);

/// Return the current time as microseconds since Unix epoch.
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Return a timestamp that is strictly greater than every previous value
/// returned by this function in the process.
///
/// Used to stamp coherence observations so that two snapshots taken in the
/// same microsecond still order correctly.
pub fn logical_now() -> u64 {
    let now = now_micros();
    let mut prev = LAST_OBSERVED.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_OBSERVED.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Convert microseconds to an RFC 3339 string.
pub fn micros_to_rfc3339(micros: u64) -> String {
    let secs = (micros / 1_000_000) as i64;
    let nsecs = ((micros % 1_000_000) * 1000) as u32;
    let dt = chrono::DateTime::from_timestamp(secs, nsecs).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    dt.to_rfc3339()
}
