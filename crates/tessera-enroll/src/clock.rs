//! Injectable time source.
//!
//! TOTP codes are a function of wall-clock time; tests need to pin it.

use std::time::{SystemTime, UNIX_EPOCH};

/// Supplies the current Unix time in seconds.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in seconds.
    fn now(&self) -> u64;
}

/// Production clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // A system clock before the epoch is not a supported configuration;
        // degrade to 0 rather than panic.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

/// Deterministic clock for tests: always reports the configured instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}
