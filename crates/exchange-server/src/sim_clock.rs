//! Simulation clock.
//!
//! The replay thread advances this clock to the timestamp of each replayed
//! market event. When `use_simulation_time` is configured, client-generated
//! events are stamped with the simulation time so they line up with the
//! replayed tape; otherwise they keep their wall-clock times, which can
//! leave large gaps against the historical timestamps.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Shared simulation clock handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    inner: Arc<ClockInner>,
}

#[derive(Debug)]
struct ClockInner {
    use_simulation_time: bool,
    micros: AtomicI64,
    initialized: AtomicBool,
}

impl SimulationClock {
    pub fn new(use_simulation_time: bool) -> Self {
        SimulationClock {
            inner: Arc::new(ClockInner {
                use_simulation_time,
                micros: AtomicI64::new(0),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Advance to the time of the latest replayed event. Safe to call from
    /// the replay thread while other contexts read.
    pub fn advance(&self, time: NaiveDateTime) {
        self.inner
            .micros
            .store(time.and_utc().timestamp_micros(), Ordering::Release);
        self.inner.initialized.store(true, Ordering::Release);
    }

    /// The timestamp to put on a client event: the simulation time when
    /// configured and already advanced, otherwise the provided time.
    pub fn event_time(&self, fallback: NaiveDateTime) -> NaiveDateTime {
        if self.inner.use_simulation_time && self.inner.initialized.load(Ordering::Acquire) {
            let micros = self.inner.micros.load(Ordering::Acquire);
            if let Some(time) = DateTime::<Utc>::from_timestamp_micros(micros) {
                return time.naive_utc();
            }
        }
        fallback
    }

    /// The timestamp to put on a server-generated event right now.
    pub fn now(&self) -> NaiveDateTime {
        self.event_time(Utc::now().naive_utc())
    }
}
