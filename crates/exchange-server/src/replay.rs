//! Order book replay driver.
//!
//! Replays recorded market events in timestamp order on its own dedicated
//! OS thread, feeding each record into the engine task. When the feed is
//! exhausted the driver emits the replay-complete command; a cooperative
//! [`ReplayHandle::stop`] makes it finish the current record and exit
//! *without* that signal, so a client-initiated stop and natural
//! completion stay distinguishable.
//!
//! A record the store cannot produce or parse is logged and skipped;
//! replay continues with the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Timelike;
use tracing::{info, warn};

use crate::history::{HistoricalEventSource, RecordKind};
use crate::sim_clock::SimulationClock;
use crate::types::{EngineCommand, EngineTx};

/// Handle to a running replay thread.
pub struct ReplayHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReplayHandle {
    /// Request a cooperative stop. Safe from any context; the driver
    /// checks the flag between records, so a match in progress is never
    /// interrupted.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait for the replay thread to finish.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Spawn the replay driver on its own thread.
///
/// `pacing_delay` is slept once per simulated second so replay does not
/// starve the rest of the process; zero disables pacing.
pub fn spawn(
    source: Box<dyn HistoricalEventSource>,
    engine_tx: EngineTx,
    clock: SimulationClock,
    pacing_delay: Duration,
) -> std::io::Result<ReplayHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let thread = std::thread::Builder::new()
        .name("replay-driver".to_string())
        .spawn(move || run(source, engine_tx, clock, pacing_delay, stop_flag))?;

    Ok(ReplayHandle {
        stop,
        thread: Some(thread),
    })
}

fn run(
    mut source: Box<dyn HistoricalEventSource>,
    engine_tx: EngineTx,
    clock: SimulationClock,
    pacing_delay: Duration,
    stop: Arc<AtomicBool>,
) {
    info!("running simulation");
    let mut last_paced_second: Option<u32> = None;
    let mut replayed: u64 = 0;

    loop {
        if stop.load(Ordering::Acquire) {
            info!(replayed, "simulation stopped by request");
            return;
        }

        let record = match source.next_record() {
            None => break,
            Some(Err(e)) => {
                warn!(error = %e, "skipping unreadable historical record");
                continue;
            }
            Some(Ok(record)) => record,
        };

        clock.advance(record.timestamp);

        if !pacing_delay.is_zero() {
            let second = record.timestamp.second();
            if last_paced_second.map_or(true, |previous| previous != second) {
                last_paced_second = Some(second);
                std::thread::sleep(pacing_delay);
            }
        }

        if record.kind == RecordKind::TransactionLimit {
            continue;
        }

        if engine_tx
            .send(EngineCommand::Historical(record))
            .is_err()
        {
            warn!("engine task gone, abandoning replay");
            return;
        }
        replayed += 1;
    }

    info!(replayed, "simulation complete");
    let _ = engine_tx.send(EngineCommand::ReplayComplete);
}

/// Owns the process's at-most-one replay driver.
///
/// The market-data gateway starts the driver on the first subscription and
/// stops it on unsubscribe. The historical source is consumed by the first
/// start; later starts while a driver is live are no-ops.
pub struct ReplayController {
    engine_tx: EngineTx,
    clock: SimulationClock,
    pacing_delay: Duration,
    inner: Mutex<ControllerInner>,
}

struct ControllerInner {
    source: Option<Box<dyn HistoricalEventSource>>,
    handle: Option<ReplayHandle>,
}

impl ReplayController {
    pub fn new(
        source: Box<dyn HistoricalEventSource>,
        engine_tx: EngineTx,
        clock: SimulationClock,
        pacing_delay: Duration,
    ) -> Self {
        ReplayController {
            engine_tx,
            clock,
            pacing_delay,
            inner: Mutex::new(ControllerInner {
                source: Some(source),
                handle: None,
            }),
        }
    }

    /// Start the replay driver if it has not run yet. Returns whether a
    /// driver was spawned by this call.
    pub fn start(&self) -> bool {
        let mut inner = self.lock();
        let Some(source) = inner.source.take() else {
            info!("replay already started, ignoring");
            return false;
        };
        match spawn(
            source,
            self.engine_tx.clone(),
            self.clock.clone(),
            self.pacing_delay,
        ) {
            Ok(handle) => {
                inner.handle = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "could not spawn the replay thread");
                false
            }
        }
    }

    /// Request a cooperative stop of the running driver, if any.
    pub fn stop(&self) {
        if let Some(handle) = self.lock().handle.as_ref() {
            handle.stop();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
