//! Exchange coordinator.
//!
//! Owns the startup order - optional historical load, engine task,
//! market-data gateway, order gateway - and blocks until the replay
//! driver signals that the historical feed is exhausted. Shutdown then
//! stops the market-data gateway, then the order gateway, and only after
//! both have stopped flushes and closes the report sinks, so nothing
//! writes to a closed resource.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::run_engine_loop;
use crate::history::{CsvFileSource, HistoricalDataLoader, HistoricalEventSource};
use crate::market_data::{self, MdContext};
use crate::order_gateway::{self, OrderContext};
use crate::replay::ReplayController;
use crate::report::{ReportSink, SharedSinks, TradeLogWriter};
use crate::sim_clock::SimulationClock;
use crate::types::{EngineTx, GatewayHandle};

/// The exchange: configuration plus the external collaborators it
/// consumes through narrow interfaces.
pub struct Exchange {
    config: Config,
    source: Box<dyn HistoricalEventSource>,
    loader: Option<Box<dyn HistoricalDataLoader>>,
    sinks: SharedSinks,
}

impl Exchange {
    /// Build an exchange over an explicit historical source.
    pub fn new(config: Config, source: Box<dyn HistoricalEventSource>) -> Self {
        Exchange {
            config,
            source,
            loader: None,
            sinks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build from configuration: historical CSV source and, when
    /// configured, the trade-log sink. Failures here abort startup.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let source = CsvFileSource::open(&config.history.data_file).map_err(|e| {
            anyhow::anyhow!(
                "cannot open historical data file {}: {}",
                config.history.data_file.display(),
                e
            )
        })?;
        let mut exchange = Exchange::new(config, Box::new(source));
        if let Some(path) = exchange.config.reports.trade_log.clone() {
            exchange.add_sink(Box::new(TradeLogWriter::create(&path)?));
        }
        Ok(exchange)
    }

    /// Wire in the external loader that populates the historical store.
    pub fn with_loader(mut self, loader: Box<dyn HistoricalDataLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn ReportSink>) {
        let mut sinks = match self.sinks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sinks.push(sink);
    }

    /// Run to completion: start everything, block until the replay driver
    /// reports the feed exhausted, then shut down in order.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut running = self.start().await?;
        running.wait_for_completion().await;
        running.shutdown().await
    }

    /// Start the exchange and return a handle to the running pieces.
    pub async fn start(self) -> anyhow::Result<RunningExchange> {
        if self.config.history.populate {
            match &self.loader {
                Some(loader) => {
                    info!("populating historical data store");
                    loader.load()?;
                }
                None => warn!("configured to populate historical data but no loader is wired"),
            }
        }

        let symbol = self.config.symbol_upper();
        let clock = SimulationClock::new(self.config.exchange.use_simulation_time);
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (complete_tx, complete_rx) = watch::channel(false);

        tokio::spawn(run_engine_loop(
            engine_rx,
            symbol.clone(),
            self.config.exchange.server_id.clone(),
            self.sinks.clone(),
            complete_tx,
        ));

        let replay = Arc::new(ReplayController::new(
            self.source,
            engine_tx.clone(),
            clock.clone(),
            Duration::from_millis(self.config.history.replay_delay_ms),
        ));

        let market_data = market_data::start(
            &self.config.market_data,
            MdContext::new(symbol.clone(), engine_tx.clone(), replay),
        )
        .await?;

        let orders = order_gateway::start(
            &self.config.orders,
            OrderContext {
                symbol,
                client_id: self.config.exchange.client_id.clone(),
                engine_tx: engine_tx.clone(),
                clock,
            },
        )
        .await?;

        info!("exchange running");
        Ok(RunningExchange {
            market_data,
            orders,
            sinks: self.sinks,
            complete_rx,
            _engine_tx: engine_tx,
        })
    }
}

/// A started exchange: the two gateways, the report sinks and the
/// replay-completion signal.
pub struct RunningExchange {
    market_data: GatewayHandle,
    orders: GatewayHandle,
    sinks: SharedSinks,
    complete_rx: watch::Receiver<bool>,
    _engine_tx: EngineTx,
}

impl RunningExchange {
    pub fn market_data_addr(&self) -> std::net::SocketAddr {
        self.market_data.local_addr()
    }

    pub fn order_addr(&self) -> std::net::SocketAddr {
        self.orders.local_addr()
    }

    /// Block until the replay driver publishes completion. A
    /// client-initiated stop does not resolve this; only an exhausted
    /// feed does.
    pub async fn wait_for_completion(&mut self) {
        while !*self.complete_rx.borrow() {
            if self.complete_rx.changed().await.is_err() {
                warn!("engine task ended before replay completion");
                return;
            }
        }
    }

    /// Ordered shutdown: market-data gateway, then order gateway, then
    /// the report sinks.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.market_data.stop().await;
        self.orders.stop().await;

        let mut sinks = match self.sinks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.close() {
                warn!(error = %e, "report sink failed to close");
            }
        }
        info!("exchange stopped");
        Ok(())
    }
}
