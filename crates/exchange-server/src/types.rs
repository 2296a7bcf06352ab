//! Shared types for the exchange server.
//!
//! This module defines:
//! - `SessionId`: a lightweight handle for connected sessions
//! - `EngineCommand`: messages flowing into the central engine task
//! - `BookUpdate` / `OrderReply`: what flows back out
//! - channel aliases between the gateways, the replay thread and the
//!   engine task

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use exchange_core::{MarketEvent, Side};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::history::ReplayRecord;

/// Identifier for a connected session (market-data or order).
///
/// Opaque; unique over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// Allocate the next process-unique session ID.
    pub fn next() -> SessionId {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Update fanned out from the engine task to market-data subscribers, in
/// the exact order the book produced it.
#[derive(Debug, Clone)]
pub enum BookUpdate {
    /// A bid, offer, fill or partial fill applied to the book.
    Event(MarketEvent),
    /// The historical feed is exhausted. Not sent on client-initiated stop.
    ReplayComplete,
}

/// Outcome of a live order or cancel, routed back to the originating order
/// session for translation into execution reports.
#[derive(Debug, Clone)]
pub enum OrderReply {
    /// The order did not fill and now rests in the book.
    Accepted(MarketEvent),
    /// The order filled or partially filled; the event is the aggressor's
    /// fill event.
    Executed(MarketEvent),
    /// Follow-up to a market order's partial fill: the unfilled remainder
    /// is discarded, never rested.
    RemainderCanceled(MarketEvent),
    /// A market order matched nothing at all and is canceled outright.
    NothingDone(MarketEvent),
    /// A resting order was cancelled on request.
    Canceled {
        event: MarketEvent,
        orig_cl_ord_id: String,
    },
}

/// Message flowing into the central engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// A historical record pulled by the replay driver.
    Historical(ReplayRecord),
    /// The replay driver exhausted the historical feed.
    ReplayComplete,
    /// A validated live order from an order session, already converted to
    /// its market-event form.
    SubmitOrder {
        session: SessionId,
        order: MarketEvent,
    },
    /// Cancel a resting order.
    CancelOrder {
        session: SessionId,
        side: Side,
        orig_cl_ord_id: String,
    },
    /// Market-data session starts receiving book updates.
    Subscribe {
        session: SessionId,
        tx: SubscriberTx,
    },
    /// Market-data session stops receiving book updates.
    Unsubscribe { session: SessionId },
    /// Order session registers its reply channel.
    RegisterOrderSession {
        session: SessionId,
        tx: OrderReplyTx,
    },
    /// Order session disconnected.
    DeregisterOrderSession { session: SessionId },
}

pub type EngineTx = mpsc::UnboundedSender<EngineCommand>;
pub type EngineRx = mpsc::UnboundedReceiver<EngineCommand>;

pub type SubscriberTx = mpsc::UnboundedSender<BookUpdate>;
pub type SubscriberRx = mpsc::UnboundedReceiver<BookUpdate>;

pub type OrderReplyTx = mpsc::UnboundedSender<OrderReply>;
pub type OrderReplyRx = mpsc::UnboundedReceiver<OrderReply>;

/// Outbound wire frames to one session's socket writer.
pub type OutboundTx = mpsc::UnboundedSender<Vec<u8>>;
pub type OutboundRx = mpsc::UnboundedReceiver<Vec<u8>>;

/// Handle to a running gateway accept loop.
///
/// [`stop`](GatewayHandle::stop) makes the gateway stop accepting new
/// work and waits for the accept loop to exit; the coordinator relies on
/// this completing before it closes any report sink.
pub struct GatewayHandle {
    name: &'static str,
    local_addr: SocketAddr,
    stopped: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GatewayHandle {
    pub fn new(
        name: &'static str,
        local_addr: SocketAddr,
        stopped: Arc<AtomicBool>,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        GatewayHandle {
            name,
            local_addr,
            stopped,
            shutdown_tx,
            task,
        }
    }

    /// The address the gateway actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Flag that flips once the accept loop has exited.
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }

    /// Stop accepting new work and wait for the accept loop to exit.
    pub async fn stop(self) {
        tracing::info!(gateway = self.name, "stopping gateway");
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        self.stopped.store(true, Ordering::Release);
    }
}
