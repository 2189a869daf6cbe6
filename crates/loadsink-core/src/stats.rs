//! Shared runtime counters
//!
//! One `ServerStats` instance is shared by the dispatcher, every worker
//! and the collaborators in the binary (periodic reporter, debug
//! toggle). All fields are atomics; counters are monotonic within a
//! reporting interval, the gauge moves both ways.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Process-wide request/connection counters plus the debug flag.
#[derive(Debug, Default)]
pub struct ServerStats {
    requests: AtomicU64,
    active_connections: AtomicU64,
    debug: AtomicBool,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed request (a full header block was seen).
    #[inline]
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// A connection was accepted and handed to a worker.
    #[inline]
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection was deregistered and closed. Callers only invoke
    /// this when the removal actually happened, so the gauge is never
    /// decremented twice for one socket.
    #[inline]
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Debug flag: request dumps and assignment logging.
    #[inline]
    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Flip the debug flag, returning the new state.
    pub fn toggle_debug(&self) -> bool {
        !self.debug.fetch_xor(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counter() {
        let stats = ServerStats::new();
        assert_eq!(stats.requests(), 0);
        stats.record_request();
        stats.record_request();
        assert_eq!(stats.requests(), 2);
    }

    #[test]
    fn test_connection_gauge() {
        let stats = ServerStats::new();
        stats.connection_opened();
        stats.connection_opened();
        assert_eq!(stats.active_connections(), 2);
        stats.connection_closed();
        assert_eq!(stats.active_connections(), 1);
    }

    #[test]
    fn test_debug_toggle() {
        let stats = ServerStats::new();
        assert!(!stats.debug_enabled());
        assert!(stats.toggle_debug());
        assert!(stats.debug_enabled());
        assert!(!stats.toggle_debug());
        assert!(!stats.debug_enabled());
    }
}
