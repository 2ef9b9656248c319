//! Time sources.
//!
//! Expiry is always evaluated against an injected clock so tests can move
//! time forward without sleeping.

use std::sync::Arc;
use time::UtcDateTime;

pub type ClockHandle = Arc<dyn Clock>;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> UtcDateTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// A clock that only moves when told to.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<UtcDateTime>,
}
#[cfg(any(test, feature = "mock"))]
impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self { now: std::sync::Mutex::new(start) }
    }

    pub fn set(&self, now: UtcDateTime) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: std::time::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}
#[cfg(any(test, feature = "mock"))]
impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
