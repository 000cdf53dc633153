use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock epoch milliseconds, the unit every timestamp in spec §3/§4
/// is expressed in.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as i64
}
