//! Order gateway.
//!
//! Accepts order sessions, validates each new-order-single (instrument
//! symbol; good-till-cancel when a time-in-force is given), hands valid
//! orders to the engine task for matching, and translates the outcomes
//! into execution reports. Cancels remove a resting order by its original
//! client order ID.
//!
//! Stateless per order beyond what the book captures; the session only
//! bridges wire messages to engine commands and back.

use std::sync::Arc;

use anyhow::Context as _;
use exchange_core::{MarketEvent, OrderType, Side};
use exchange_protocol::{
    codec, ExecType, ExecutionReport, Message, NewOrderSingle, OrdRejReason, OrdStatus,
    OrderCancelRequest, TIF_GOOD_TILL_CANCEL,
};
use rust_decimal::Decimal;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EndpointConfig;
use crate::sim_clock::SimulationClock;
use crate::types::{
    EngineCommand, EngineTx, GatewayHandle, OrderReply, OrderReplyRx, OutboundRx, OutboundTx,
    SessionId,
};

/// Shared state of the order gateway.
#[derive(Clone)]
pub struct OrderContext {
    /// Configured instrument, upper case.
    pub symbol: String,
    /// Identifier assigned to live client orders; self-trade prevention
    /// compares it against the owner of each resting order.
    pub client_id: String,
    pub engine_tx: EngineTx,
    pub clock: SimulationClock,
}

/// Bind the endpoint and start accepting order sessions.
///
/// A bind failure is fatal to startup.
pub async fn start(endpoint: &EndpointConfig, ctx: OrderContext) -> anyhow::Result<GatewayHandle> {
    let addr = endpoint.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind order endpoint {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "order gateway listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stopped = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let stopped_flag = stopped.clone();
    let task = tokio::spawn(async move {
        accept_loop(listener, ctx, shutdown_rx).await;
        stopped_flag.store(true, std::sync::atomic::Ordering::Release);
    });

    Ok(GatewayHandle::new(
        "orders",
        local_addr,
        stopped,
        shutdown_tx,
        task,
    ))
}

async fn accept_loop(listener: TcpListener, ctx: OrderContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("order gateway stopped accepting sessions");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let session = SessionId::next();
                    info!(session = session.0, %peer, "order session connected");
                    tokio::spawn(run_session(stream, session, ctx.clone()));
                }
                Err(e) => warn!(error = %e, "order accept failed"),
            }
        }
    }
}

async fn run_session(stream: TcpStream, session: SessionId, ctx: OrderContext) {
    let (mut reader, writer) = stream.into_split();
    let (out_tx, out_rx): (OutboundTx, OutboundRx) = mpsc::unbounded_channel();
    tokio::spawn(write_frames(writer, out_rx, session));

    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let _ = ctx.engine_tx.send(EngineCommand::RegisterOrderSession {
        session,
        tx: reply_tx,
    });
    tokio::spawn(pump_replies(reply_rx, out_tx.clone(), ctx.clock.clone()));

    let mut decoder = codec::FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                decoder.feed(&buf[..n]);
                while let Some(frame) = decoder.next_frame() {
                    match codec::decode(&frame) {
                        Ok(Message::NewOrderSingle(order)) => {
                            handle_new_order(&ctx, session, &order, &out_tx);
                        }
                        Ok(Message::OrderCancelRequest(cancel)) => {
                            handle_cancel(&ctx, session, &cancel);
                        }
                        Ok(other) => info!(
                            session = session.0,
                            msg_type = ?other.msg_type(),
                            "ignoring unsupported message on order session"
                        ),
                        Err(e) => info!(
                            session = session.0,
                            error = %e,
                            "dropping undecodable order frame"
                        ),
                    }
                }
            }
            Err(e) => {
                warn!(session = session.0, error = %e, "order session read failed");
                break;
            }
        }
    }

    let _ = ctx
        .engine_tx
        .send(EngineCommand::DeregisterOrderSession { session });
    info!(session = session.0, "order session closed");
}

fn handle_new_order(
    ctx: &OrderContext,
    session: SessionId,
    order: &NewOrderSingle,
    out_tx: &OutboundTx,
) {
    if order.order_qty == 0 {
        info!(cl_ord_id = %order.cl_ord_id, "dropping zero-quantity order");
        return;
    }

    let event = order_event(ctx, order);
    if let Err(reason) = vet_order(order, &ctx.symbol) {
        info!(cl_ord_id = %order.cl_ord_id, reason = ?reason, "rejected order");
        let report = execution_report(
            &event,
            ExecType::Rejected,
            OrdStatus::Rejected,
            event.order_qty,
            ctx.clock.now(),
        );
        let _ = send_report(
            out_tx,
            ExecutionReport {
                ord_rej_reason: Some(reason),
                ..report
            },
        );
        return;
    }

    let _ = ctx
        .engine_tx
        .send(EngineCommand::SubmitOrder { session, order: event });
}

fn handle_cancel(ctx: &OrderContext, session: SessionId, cancel: &OrderCancelRequest) {
    let _ = ctx.engine_tx.send(EngineCommand::CancelOrder {
        session,
        side: cancel.side,
        orig_cl_ord_id: cancel.orig_cl_ord_id.clone(),
    });
}

/// Orders must be for the configured instrument and, when a time-in-force
/// is given, good-till-cancel.
fn vet_order(order: &NewOrderSingle, symbol: &str) -> Result<(), OrdRejReason> {
    if !order.symbol.eq_ignore_ascii_case(symbol) {
        return Err(OrdRejReason::UnknownSymbol);
    }
    if let Some(tif) = order.time_in_force {
        if tif != TIF_GOOD_TILL_CANCEL {
            return Err(OrdRejReason::UnknownOrder);
        }
    }
    Ok(())
}

/// Build the market-event form of an inbound order. The transact time
/// follows the simulation clock when so configured.
fn order_event(ctx: &OrderContext, order: &NewOrderSingle) -> MarketEvent {
    let transact_time = ctx.clock.event_time(order.transact_time);
    let price = order.price.unwrap_or_default();
    match order.side {
        Side::Buy => MarketEvent::bid(
            price,
            order.order_qty,
            order.cl_ord_id.clone(),
            transact_time,
            ctx.client_id.clone(),
            order.ord_type,
            order.symbol.to_uppercase(),
            order.account.clone(),
        ),
        Side::Sell => MarketEvent::offer(
            price,
            order.order_qty,
            order.cl_ord_id.clone(),
            transact_time,
            ctx.client_id.clone(),
            order.ord_type,
            order.symbol.to_uppercase(),
            order.account.clone(),
        ),
    }
}

/// Translate engine outcomes into execution reports.
async fn pump_replies(mut reply_rx: OrderReplyRx, out_tx: OutboundTx, clock: SimulationClock) {
    while let Some(reply) = reply_rx.recv().await {
        let now = clock.now();
        let report = match reply {
            OrderReply::Accepted(event) => {
                execution_report(&event, ExecType::New, OrdStatus::New, event.remaining_qty, now)
            }
            OrderReply::Executed(event) => {
                let status = match event.kind {
                    exchange_core::EventKind::Fill => OrdStatus::Filled,
                    _ => OrdStatus::PartiallyFilled,
                };
                execution_report(&event, ExecType::Trade, status, event.remaining_qty, now)
            }
            OrderReply::RemainderCanceled(event) | OrderReply::NothingDone(event) => {
                let mut report =
                    execution_report(&event, ExecType::Canceled, OrdStatus::Canceled, 0, now);
                report.last_px = Decimal::ZERO;
                report.last_qty = 0;
                report
            }
            OrderReply::Canceled {
                event,
                orig_cl_ord_id,
            } => {
                let mut report =
                    execution_report(&event, ExecType::Canceled, OrdStatus::Canceled, 0, now);
                report.orig_cl_ord_id = Some(orig_cl_ord_id);
                report.last_px = Decimal::ZERO;
                report.last_qty = 0;
                report
            }
        };
        if send_report(&out_tx, report).is_err() {
            break;
        }
    }
}

/// Execution report skeleton from a market event. Order and exec IDs are
/// fresh process-unique tokens; the order's limit price is reported as 0
/// when the original was a market order (its stored price is the
/// unbounded sentinel).
fn execution_report(
    event: &MarketEvent,
    exec_type: ExecType,
    ord_status: OrdStatus,
    leaves_qty: u64,
    transact_time: chrono::NaiveDateTime,
) -> ExecutionReport {
    let price = match event.order_type {
        OrderType::Market => Decimal::ZERO,
        OrderType::Limit => event.order_price,
    };
    ExecutionReport {
        order_id: Uuid::new_v4().to_string(),
        exec_id: Uuid::new_v4().to_string(),
        exec_type,
        ord_status,
        side: event.side,
        leaves_qty,
        cum_qty: event.cum_qty,
        avg_px: event.avg_price,
        symbol: event.symbol.clone(),
        cl_ord_id: event.client_order_id.clone(),
        order_qty: event.order_qty,
        ord_type: event.order_type,
        transact_time,
        last_px: event.exec_price,
        last_qty: event.exec_qty,
        price,
        account: event.account.clone(),
        ord_rej_reason: None,
        orig_cl_ord_id: None,
    }
}

/// Validate, encode and queue one report; an invalid report is logged and
/// suppressed while the session keeps going.
fn send_report(out_tx: &OutboundTx, report: ExecutionReport) -> Result<(), ()> {
    let message = Message::ExecutionReport(report);
    if let Err(e) = message.validate() {
        error!(error = %e, "suppressing outbound execution report that failed validation");
        return Ok(());
    }
    out_tx.send(codec::encode(&message)).map_err(|_| ())
}

async fn write_frames(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut out_rx: OutboundRx,
    session: SessionId,
) {
    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!(session = session.0, error = %e, "order session write failed");
            break;
        }
    }
}
