//! Market-data gateway.
//!
//! Listens for market-data sessions and runs the subscription state
//! machine per connection: a snapshot-plus-updates request for the
//! configured instrument registers the session as a book subscriber and
//! starts the replay driver; a disable-previous request stops the driver
//! and deregisters. Everything else is logged and ignored with no reply.
//!
//! At most one subscription is active per process, whichever session owns
//! it. While subscribed, every bid, offer, fill and partial fill is
//! translated to a market-data incremental refresh and sent immediately,
//! in production order.

use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use exchange_core::{EventKind, MarketEvent};
use exchange_protocol::{
    codec, MarketDataIncrementalRefresh, MdEntry, MdEntryType, Message, SubscriptionRequestType,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::config::EndpointConfig;
use crate::replay::ReplayController;
use crate::types::{
    BookUpdate, EngineCommand, EngineTx, GatewayHandle, OutboundRx, OutboundTx, SessionId,
    SubscriberRx,
};

/// The process-wide active subscription, if any.
#[derive(Debug, Clone)]
pub struct ActiveSubscription {
    pub session: SessionId,
    pub md_req_id: String,
}

/// Shared state of the market-data gateway.
#[derive(Clone)]
pub struct MdContext {
    /// Configured instrument, upper case.
    pub symbol: String,
    pub engine_tx: EngineTx,
    pub replay: Arc<ReplayController>,
    pub subscription: Arc<Mutex<Option<ActiveSubscription>>>,
}

impl MdContext {
    pub fn new(symbol: String, engine_tx: EngineTx, replay: Arc<ReplayController>) -> Self {
        MdContext {
            symbol,
            engine_tx,
            replay,
            subscription: Arc::new(Mutex::new(None)),
        }
    }

    fn lock_subscription(&self) -> std::sync::MutexGuard<'_, Option<ActiveSubscription>> {
        match self.subscription.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Bind the endpoint and start accepting market-data sessions.
///
/// A bind failure is fatal to startup.
pub async fn start(endpoint: &EndpointConfig, ctx: MdContext) -> anyhow::Result<GatewayHandle> {
    let addr = endpoint.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind market-data endpoint {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "market-data gateway listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stopped = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let stopped_flag = stopped.clone();
    let task = tokio::spawn(async move {
        accept_loop(listener, ctx, shutdown_rx).await;
        stopped_flag.store(true, std::sync::atomic::Ordering::Release);
    });

    Ok(GatewayHandle::new(
        "market-data",
        local_addr,
        stopped,
        shutdown_tx,
        task,
    ))
}

async fn accept_loop(listener: TcpListener, ctx: MdContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("market-data gateway stopped accepting sessions");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let session = SessionId::next();
                    info!(session = session.0, %peer, "market-data session connected");
                    tokio::spawn(run_session(stream, session, ctx.clone()));
                }
                Err(e) => warn!(error = %e, "market-data accept failed"),
            }
        }
    }
}

async fn run_session(stream: TcpStream, session: SessionId, ctx: MdContext) {
    let (mut reader, writer) = stream.into_split();
    let (out_tx, out_rx): (OutboundTx, OutboundRx) = mpsc::unbounded_channel();
    tokio::spawn(write_frames(writer, out_rx, session));

    let mut decoder = codec::FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                decoder.feed(&buf[..n]);
                while let Some(frame) = decoder.next_frame() {
                    match codec::decode(&frame) {
                        Ok(Message::MarketDataRequest(request)) => {
                            handle_request(&ctx, session, &request, &out_tx);
                        }
                        Ok(other) => info!(
                            session = session.0,
                            msg_type = ?other.msg_type(),
                            "ignoring unsupported message on market-data session"
                        ),
                        Err(e) => info!(
                            session = session.0,
                            error = %e,
                            "dropping undecodable market-data frame"
                        ),
                    }
                }
            }
            Err(e) => {
                warn!(session = session.0, error = %e, "market-data read failed");
                break;
            }
        }
    }

    release_subscription(&ctx, session);
    info!(session = session.0, "market-data session closed");
}

/// The subscription state machine, per the two supported request types.
fn handle_request(
    ctx: &MdContext,
    session: SessionId,
    request: &exchange_protocol::MarketDataRequest,
    out_tx: &OutboundTx,
) {
    match request.subscription_type {
        SubscriptionRequestType::SnapshotPlusUpdates => {
            let Some(symbol) = request.first_symbol() else {
                info!("ignored market data request without a symbol group");
                return;
            };
            if !symbol.eq_ignore_ascii_case(&ctx.symbol) {
                info!(requested = %symbol, "ignored market data request due to illegal symbol");
                return;
            }

            let mut subscription = ctx.lock_subscription();
            if subscription.is_some() {
                // At most one live replay per process.
                info!(session = session.0, "already subscribed, ignoring");
                return;
            }
            *subscription = Some(ActiveSubscription {
                session,
                md_req_id: request.md_req_id.clone(),
            });
            drop(subscription);

            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let _ = ctx.engine_tx.send(EngineCommand::Subscribe {
                session,
                tx: event_tx,
            });
            tokio::spawn(pump_updates(
                event_rx,
                request.md_req_id.clone(),
                out_tx.clone(),
            ));

            info!(md_req_id = %request.md_req_id, "starting simulation");
            ctx.replay.start();
        }
        SubscriptionRequestType::DisablePrevious => {
            let previous = ctx.lock_subscription().take();
            match previous {
                Some(active) => {
                    info!(md_req_id = %active.md_req_id, "stopping simulation");
                    ctx.replay.stop();
                    let _ = ctx.engine_tx.send(EngineCommand::Unsubscribe {
                        session: active.session,
                    });
                }
                None => info!("no active subscription, ignoring"),
            }
        }
        SubscriptionRequestType::Other(code) => {
            info!(
                subscription_type = %code,
                "ignored market data request due to illegal subscription type"
            );
        }
    }
}

/// Translate book updates into incremental refreshes for one subscriber.
async fn pump_updates(mut event_rx: SubscriberRx, md_req_id: String, out_tx: OutboundTx) {
    while let Some(update) = event_rx.recv().await {
        match update {
            BookUpdate::Event(event) => {
                let message =
                    Message::MarketDataIncrementalRefresh(incremental_refresh(&event, &md_req_id));
                if let Err(e) = message.validate() {
                    // The send is suppressed; processing continues.
                    error!(error = %e, "suppressing outbound refresh that failed validation");
                    continue;
                }
                if out_tx.send(codec::encode(&message)).is_err() {
                    break;
                }
            }
            BookUpdate::ReplayComplete => {
                info!(md_req_id = %md_req_id, "simulation complete");
            }
        }
    }
}

/// Field mapping from a book event to one refresh entry: trades carry the
/// execution price and quantity, bids and offers the order's.
pub(crate) fn incremental_refresh(
    event: &MarketEvent,
    md_req_id: &str,
) -> MarketDataIncrementalRefresh {
    let entry_type = match event.kind {
        EventKind::Bid => MdEntryType::Bid,
        EventKind::Offer => MdEntryType::Offer,
        EventKind::Fill | EventKind::PartialFill => MdEntryType::Trade,
    };
    let (price, size) = if event.is_execution() {
        (event.exec_price, event.exec_qty)
    } else {
        (event.order_price, event.order_qty)
    };

    MarketDataIncrementalRefresh {
        md_req_id: md_req_id.to_string(),
        entries: vec![MdEntry {
            update_action: event.action.into(),
            entry_type,
            price,
            size,
            entry_time: event.transact_time,
            symbol: event.symbol.clone(),
            entry_ref_id: event.client_order_id.clone(),
        }],
    }
}

fn release_subscription(ctx: &MdContext, session: SessionId) {
    let mut subscription = ctx.lock_subscription();
    if subscription
        .as_ref()
        .is_some_and(|active| active.session == session)
    {
        *subscription = None;
        let _ = ctx.engine_tx.send(EngineCommand::Unsubscribe { session });
        // The replay keeps running; a later session may subscribe again.
        info!(session = session.0, "subscription released on disconnect");
    }
}

async fn write_frames(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut out_rx: OutboundRx,
    session: SessionId,
) {
    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            // Drop future sends to this session; nothing else is disturbed.
            warn!(session = session.0, error = %e, "market-data write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::VecSource;
    use crate::sim_clock::SimulationClock;
    use crate::types::EngineRx;
    use exchange_core::{Action, MarketEvent, OrderType};
    use exchange_protocol::{MarketDataRequest, MdUpdateAction};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn ts() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2011, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn context() -> (MdContext, EngineRx) {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let replay = Arc::new(ReplayController::new(
            Box::new(VecSource::new(vec![])),
            engine_tx.clone(),
            SimulationClock::new(false),
            Duration::ZERO,
        ));
        (
            MdContext::new("VOD.L".into(), engine_tx, replay),
            engine_rx,
        )
    }

    fn subscribe_request(md_req_id: &str, symbol: &str) -> MarketDataRequest {
        MarketDataRequest {
            md_req_id: md_req_id.into(),
            subscription_type: SubscriptionRequestType::SnapshotPlusUpdates,
            symbols: vec![symbol.into()],
        }
    }

    fn unsubscribe_request(md_req_id: &str) -> MarketDataRequest {
        MarketDataRequest {
            md_req_id: md_req_id.into(),
            subscription_type: SubscriptionRequestType::DisablePrevious,
            symbols: vec!["VOD.L".into()],
        }
    }

    fn drain_subscribes(rx: &mut EngineRx) -> usize {
        let mut count = 0;
        while let Ok(command) = rx.try_recv() {
            if matches!(command, EngineCommand::Subscribe { .. }) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_process_wide() {
        let (ctx, mut engine_rx) = context();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        handle_request(&ctx, SessionId(1), &subscribe_request("r1", "vod.l"), &out_tx);
        assert!(ctx.lock_subscription().is_some());

        // A second subscribe, even from another session, is ignored.
        handle_request(&ctx, SessionId(2), &subscribe_request("r2", "VOD.L"), &out_tx);

        assert_eq!(drain_subscribes(&mut engine_rx), 1);
        let active = ctx.lock_subscription().clone().unwrap();
        assert_eq!(active.session, SessionId(1));
        assert_eq!(active.md_req_id, "r1");
    }

    #[tokio::test]
    async fn only_the_first_symbol_group_entry_is_evaluated() {
        let (ctx, _engine_rx) = context();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        let request = MarketDataRequest {
            md_req_id: "r1".into(),
            subscription_type: SubscriptionRequestType::SnapshotPlusUpdates,
            symbols: vec!["BARC.L".into(), "VOD.L".into()],
        };
        handle_request(&ctx, SessionId(1), &request, &out_tx);

        // The first entry does not match, so the whole request is dropped
        // even though a later entry would have.
        assert!(ctx.lock_subscription().is_none());
    }

    #[tokio::test]
    async fn symbol_mismatch_is_ignored_silently() {
        let (ctx, mut engine_rx) = context();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        handle_request(&ctx, SessionId(1), &subscribe_request("r1", "BARC.L"), &out_tx);

        assert!(ctx.lock_subscription().is_none());
        assert_eq!(drain_subscribes(&mut engine_rx), 0);
    }

    #[tokio::test]
    async fn unsubscribe_deregisters_and_is_a_noop_when_idle() {
        let (ctx, mut engine_rx) = context();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        // Idle: no-op.
        handle_request(&ctx, SessionId(1), &unsubscribe_request("r0"), &out_tx);
        assert!(engine_rx.try_recv().is_err());

        handle_request(&ctx, SessionId(1), &subscribe_request("r1", "VOD.L"), &out_tx);
        handle_request(&ctx, SessionId(1), &unsubscribe_request("r1"), &out_tx);
        assert!(ctx.lock_subscription().is_none());

        let mut saw_unsubscribe = false;
        while let Ok(command) = engine_rx.try_recv() {
            if matches!(command, EngineCommand::Unsubscribe { .. }) {
                saw_unsubscribe = true;
            }
        }
        assert!(saw_unsubscribe);
    }

    #[tokio::test]
    async fn unknown_subscription_type_changes_nothing() {
        let (ctx, mut engine_rx) = context();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        let request = MarketDataRequest {
            md_req_id: "r1".into(),
            subscription_type: SubscriptionRequestType::Other('3'),
            symbols: vec!["VOD.L".into()],
        };
        handle_request(&ctx, SessionId(1), &request, &out_tx);

        assert!(ctx.lock_subscription().is_none());
        assert!(engine_rx.try_recv().is_err());
    }

    #[test]
    fn refresh_mapping_uses_exec_fields_for_trades() {
        let bid = MarketEvent::bid(
            dec!(1.2050),
            100,
            "ord-1",
            ts(),
            "A",
            OrderType::Limit,
            "VOD.L",
            None,
        );
        let fill = bid.partially_filled(60, 60, dec!(1.2049), dec!(1.2049), 40);

        let refresh = incremental_refresh(&fill, "r1");
        assert_eq!(refresh.md_req_id, "r1");
        let entry = &refresh.entries[0];
        assert_eq!(entry.entry_type, MdEntryType::Trade);
        assert_eq!(entry.price, dec!(1.2049));
        assert_eq!(entry.size, 60);
        assert_eq!(entry.entry_ref_id, "ord-1");
    }

    #[test]
    fn refresh_mapping_uses_order_fields_for_resting_orders() {
        let offer = MarketEvent::offer(
            dec!(1.2045),
            300,
            "ord-2",
            ts(),
            "A",
            OrderType::Limit,
            "VOD.L",
            None,
        )
        .with_action(Action::Delete);

        let entry = &incremental_refresh(&offer, "r1").entries[0];
        assert_eq!(entry.entry_type, MdEntryType::Offer);
        assert_eq!(entry.update_action, MdUpdateAction::Delete);
        assert_eq!(entry.price, dec!(1.2045));
        assert_eq!(entry.size, 300);
    }

    #[test]
    fn refresh_with_an_empty_ref_id_fails_validation() {
        let bid = MarketEvent::bid(
            dec!(1.2050),
            100,
            "",
            ts(),
            "A",
            OrderType::Limit,
            "VOD.L",
            None,
        );
        let message = Message::MarketDataIncrementalRefresh(incremental_refresh(&bid, "r1"));
        assert!(message.validate().is_err());
    }
}
