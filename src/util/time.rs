//! Time utilities for the world clock

use std::sync::OnceLock;
use std::time::Instant;

/// Server start time for uptime tracking
static SERVER_START: OnceLock<Instant> = OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Milliseconds since server start.
///
/// Monotonic, so match timing never jumps when the wall clock is adjusted.
/// Every world operation takes this value explicitly instead of reading a
/// clock itself.
pub fn server_millis() -> u64 {
    SERVER_START.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_millis_is_monotonic() {
        init_server_time();
        let a = server_millis();
        let b = server_millis();
        assert!(b >= a);
    }
}
