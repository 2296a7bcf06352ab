//! Report sinks.
//!
//! File-based report writers are external collaborators; the exchange
//! talks to them through the [`ReportSink`] trait. Sinks receive every
//! executed trade and are flushed and closed by the coordinator strictly
//! after both gateways have stopped.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use exchange_core::MarketEvent;

/// A consumer of executed trades.
pub trait ReportSink: Send {
    /// Called for every fill and partial fill, in execution order.
    fn record_trade(&mut self, event: &MarketEvent);

    /// Persist anything buffered.
    fn flush(&mut self) -> io::Result<()>;

    /// Final flush; the sink receives nothing afterwards.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Shared sink collection: written by the engine task, closed by the
/// coordinator.
pub type SharedSinks = Arc<Mutex<Vec<Box<dyn ReportSink>>>>;

/// Record a trade into every registered sink.
pub fn record_trade(sinks: &SharedSinks, event: &MarketEvent) {
    let mut guard = match sinks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    for sink in guard.iter_mut() {
        sink.record_trade(event);
    }
}

/// CSV trade log writer.
pub struct TradeLogWriter {
    writer: BufWriter<File>,
}

impl TradeLogWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "transact_time,symbol,side,exec_qty,exec_price,cum_qty,avg_price,client_order_id"
        )?;
        Ok(TradeLogWriter { writer })
    }
}

impl ReportSink for TradeLogWriter {
    fn record_trade(&mut self, event: &MarketEvent) {
        let line = format!(
            "{},{},{},{},{},{},{},{}",
            event.transact_time.format("%Y-%m-%dT%H:%M:%S"),
            event.symbol,
            event.side,
            event.exec_qty,
            event.exec_price,
            event.cum_qty,
            event.avg_price,
            event.client_order_id,
        );
        if let Err(e) = writeln!(self.writer, "{}", line) {
            tracing::error!(error = %e, "trade log write failed");
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
