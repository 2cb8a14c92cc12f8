//! Source of "now" for sale-window checks and record timestamps
use super::types::TimeStamp;
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp {
        TimeStamp::new()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<TimeStamp>,
}

impl FixedClock {
    pub fn new(time: TimeStamp) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }
    pub fn set(&self, time: TimeStamp) {
        // a poisoned lock still holds a valid timestamp
        let mut guard = self.time.lock().unwrap_or_else(|e| e.into_inner());
        *guard = time;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> TimeStamp {
        *self.time.lock().unwrap_or_else(|e| e.into_inner())
    }
}
