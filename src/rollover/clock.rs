//! Clock port for the rollover poll loops
//!
//! Wall-clock waits (poll interval, settle delay, timeout accounting) all go
//! through [`Clock`], so tests can drive virtual time with [`ManualClock`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Monotonic time source with an async sleep
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

pub type ClockRef = Arc<dyn Clock>;

// =============================================================================
// Tokio Clock
// =============================================================================

/// Real time, backed by the tokio timer
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Virtual time: `sleep` returns immediately after advancing the clock
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration;
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}
