use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of time for lock expiry
pub trait Clock: Send + Sync {
    /// Milliseconds since UNIX Epoch
    fn now_msec(&self) -> u64;
}

#[derive(Default)]
pub struct SystemClock;
impl Clock for SystemClock {
    fn now_msec(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to
pub struct ManualClock {
    msec: AtomicU64,
}
impl ManualClock {
    pub fn new(start_msec: u64) -> Self {
        Self {
            msec: AtomicU64::new(start_msec),
        }
    }

    pub fn advance(&self, msec: u64) {
        self.msec.fetch_add(msec, Ordering::SeqCst);
    }
}
impl Clock for ManualClock {
    fn now_msec(&self) -> u64 {
        self.msec.load(Ordering::SeqCst)
    }
}
