//! Central engine task.
//!
//! This task owns the [`OrderBook`] and is the only context that mutates
//! it: the replay thread and every order session send [`EngineCommand`]s
//! over one channel, so a match's read-only scan and the mutation that
//! applies it are a single atomic unit, and no insert can interleave
//! inside a scan.
//!
//! Routing policy:
//! - book events (bid, offer, fill, partial fill) fan out to every
//!   market-data subscriber, in production order;
//! - order outcomes go only to the originating order session;
//! - executed trades are recorded into the report sinks.

use std::collections::HashMap;

use exchange_core::{
    match_bid, match_offer, Action, EventKind, MarketEvent, OrderBook, OrderType, Side,
};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::history::{RecordKind, ReplayRecord};
use crate::report::{record_trade, SharedSinks};
use crate::types::{
    BookUpdate, EngineCommand, EngineRx, OrderReply, OrderReplyTx, SessionId, SubscriberTx,
};

/// Run the central engine processing loop until every command sender is
/// dropped.
pub async fn run_engine_loop(
    mut rx: EngineRx,
    symbol: String,
    server_id: String,
    sinks: SharedSinks,
    replay_complete_tx: watch::Sender<bool>,
) {
    let mut engine = EngineTask::new(symbol, server_id, sinks, replay_complete_tx);
    while let Some(command) = rx.recv().await {
        engine.handle(command);
    }
    debug!("engine loop shutting down (command channel closed)");
}

pub(crate) struct EngineTask {
    book: OrderBook,
    server_id: String,
    subscribers: HashMap<SessionId, SubscriberTx>,
    order_sessions: HashMap<SessionId, OrderReplyTx>,
    sinks: SharedSinks,
    replay_complete_tx: watch::Sender<bool>,
}

impl EngineTask {
    pub(crate) fn new(
        symbol: String,
        server_id: String,
        sinks: SharedSinks,
        replay_complete_tx: watch::Sender<bool>,
    ) -> Self {
        EngineTask {
            book: OrderBook::new(symbol),
            server_id,
            subscribers: HashMap::new(),
            order_sessions: HashMap::new(),
            sinks,
            replay_complete_tx,
        }
    }

    pub(crate) fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Historical(record) => self.apply_historical(record),
            EngineCommand::ReplayComplete => {
                info!("historical replay complete, notifying subscribers");
                self.publish(BookUpdate::ReplayComplete);
                let _ = self.replay_complete_tx.send(true);
            }
            EngineCommand::SubmitOrder { session, order } => self.submit_order(session, order),
            EngineCommand::CancelOrder {
                session,
                side,
                orig_cl_ord_id,
            } => self.cancel_order(session, side, orig_cl_ord_id),
            EngineCommand::Subscribe { session, tx } => {
                self.subscribers.insert(session, tx);
                info!(session = session.0, "market-data subscriber registered");
            }
            EngineCommand::Unsubscribe { session } => {
                self.subscribers.remove(&session);
                info!(session = session.0, "market-data subscriber deregistered");
            }
            EngineCommand::RegisterOrderSession { session, tx } => {
                self.order_sessions.insert(session, tx);
            }
            EngineCommand::DeregisterOrderSession { session } => {
                self.order_sessions.remove(&session);
            }
        }
    }

    /// Interpret one historical record the way it was recorded: plain
    /// orders rest, deletions and expiries leave the book, pre-computed
    /// matches reduce or remove the order they refer to. The matching
    /// engine is not consulted; historical fills arrive already decided.
    fn apply_historical(&mut self, record: ReplayRecord) {
        match record.kind {
            RecordKind::TransactionLimit => {}
            RecordKind::Order => {
                let event = self.order_event(&record);
                match self.book.insert(event.clone()) {
                    Ok(()) => self.publish_event(event),
                    Err(e) => warn!(error = %e, "historical order could not rest"),
                }
            }
            RecordKind::Delete | RecordKind::Expired => {
                let event = self.order_event(&record).with_action(Action::Delete);
                if self.book.remove(record.side, &record.order_id).is_none() {
                    debug!(order_id = %record.order_id, "delete for order not in the book");
                }
                self.publish_event(event);
            }
            RecordKind::PartialMatch => {
                let event = self.order_event(&record).partially_filled(
                    record.quantity,
                    record.quantity,
                    record.price,
                    Decimal::ZERO,
                    0,
                );
                if !self.book.apply_partial_fill(&event) {
                    debug!(order_id = %record.order_id, "partial match for order not in the book");
                }
                record_trade(&self.sinks, &event);
                self.publish_event(event);
            }
            RecordKind::FullMatch => {
                let event = self.order_event(&record).filled(
                    record.quantity,
                    record.quantity,
                    record.price,
                    Decimal::ZERO,
                );
                if !self.book.apply_fill(&event) {
                    debug!(order_id = %record.order_id, "full match for order not in the book");
                }
                record_trade(&self.sinks, &event);
                self.publish_event(event);
            }
        }
    }

    /// Match a validated live order, apply the outcome to the book, and
    /// answer the originating session.
    fn submit_order(&mut self, session: SessionId, order: MarketEvent) {
        let outcome = match order.side {
            Side::Buy => match_bid(&order, self.book.offers()),
            Side::Sell => match_offer(&order, self.book.bids()),
        };

        match outcome {
            Some(result) => {
                let fill = result.event.clone();
                self.book.apply_match(&result);
                record_trade(&self.sinks, &fill);
                self.publish_event(fill.clone());
                self.reply(session, OrderReply::Executed(fill.clone()));

                if fill.kind == EventKind::PartialFill {
                    if order.order_type == OrderType::Market {
                        // A market order never rests; the remainder is
                        // discarded.
                        self.reply(session, OrderReply::RemainderCanceled(fill));
                    } else {
                        let mut resting = order;
                        resting.remaining_qty = fill.remaining_qty;
                        resting.cum_qty = fill.cum_qty;
                        resting.avg_price = fill.avg_price;
                        match self.book.insert(resting.clone()) {
                            Ok(()) => self.publish_event(resting),
                            Err(e) => warn!(error = %e, "partial-fill remainder could not rest"),
                        }
                    }
                }
            }
            None if order.order_type == OrderType::Market => {
                self.reply(session, OrderReply::NothingDone(order));
            }
            None => {
                match self.book.insert(order.clone()) {
                    Ok(()) => self.publish_event(order.clone()),
                    Err(e) => warn!(error = %e, "order could not rest"),
                }
                self.reply(session, OrderReply::Accepted(order));
            }
        }
    }

    fn cancel_order(&mut self, session: SessionId, side: Side, orig_cl_ord_id: String) {
        match self.book.remove(side, &orig_cl_ord_id) {
            Some(event) => {
                self.publish_event(event.clone().with_action(Action::Delete));
                self.reply(
                    session,
                    OrderReply::Canceled {
                        event,
                        orig_cl_ord_id,
                    },
                );
            }
            None => info!(orig_cl_ord_id = %orig_cl_ord_id, "cancel for unknown order ignored"),
        }
    }

    fn order_event(&self, record: &ReplayRecord) -> MarketEvent {
        match record.side {
            Side::Buy => MarketEvent::bid(
                record.price,
                record.quantity,
                record.order_id.clone(),
                record.timestamp,
                self.server_id.clone(),
                OrderType::Limit,
                self.book.symbol(),
                None,
            ),
            Side::Sell => MarketEvent::offer(
                record.price,
                record.quantity,
                record.order_id.clone(),
                record.timestamp,
                self.server_id.clone(),
                OrderType::Limit,
                self.book.symbol(),
                None,
            ),
        }
    }

    fn publish_event(&mut self, event: MarketEvent) {
        self.publish(BookUpdate::Event(event));
    }

    /// Deliver to every subscriber in production order; a dead subscriber
    /// is dropped without disturbing the others.
    fn publish(&mut self, update: BookUpdate) {
        self.subscribers.retain(|session, tx| {
            if tx.send(update.clone()).is_ok() {
                true
            } else {
                warn!(session = session.0, "dropping dead market-data subscriber");
                false
            }
        });
    }

    fn reply(&mut self, session: SessionId, reply: OrderReply) {
        if let Some(tx) = self.order_sessions.get(&session) {
            if tx.send(reply).is_err() {
                warn!(session = session.0, "order session reply channel closed");
                self.order_sessions.remove(&session);
            }
        }
    }
}
