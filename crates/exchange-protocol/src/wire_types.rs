//! Typed wire messages.
//!
//! These are the logical forms of the five FIX messages the exchange
//! speaks. Encoding and decoding live in `codec`; outbound messages are
//! checked against [`validate`](Message::validate) before they are sent,
//! and a failed check suppresses the send.

use chrono::NaiveDateTime;
use exchange_core::{OrderType, Side};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::fields::{
    ExecType, MdEntryType, MdUpdateAction, MsgType, OrdRejReason, OrdStatus,
    SubscriptionRequestType,
};

/// A message's outbound validation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field {0} is empty")]
    EmptyField(&'static str),
    #[error("message carries no entries")]
    NoEntries,
    #[error("quantity fields are inconsistent: cum {cum_qty} + leaves {leaves_qty} exceeds order qty {order_qty}")]
    InconsistentQuantities {
        cum_qty: u64,
        leaves_qty: u64,
        order_qty: u64,
    },
}

/// Market-data subscribe / unsubscribe request (35=V).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDataRequest {
    /// Opaque token echoed in every response.
    pub md_req_id: String,
    pub subscription_type: SubscriptionRequestType,
    /// Repeating symbol group; only the first entry is evaluated.
    pub symbols: Vec<String>,
}

impl MarketDataRequest {
    /// The symbol the request is evaluated against.
    pub fn first_symbol(&self) -> Option<&str> {
        self.symbols.first().map(String::as_str)
    }
}

/// One entry of a market-data incremental refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdEntry {
    pub update_action: MdUpdateAction,
    pub entry_type: MdEntryType,
    pub price: Decimal,
    /// Order quantity for bid/offer entries, execution quantity for trades.
    pub size: u64,
    pub entry_time: NaiveDateTime,
    pub symbol: String,
    /// The originating order's client order ID.
    pub entry_ref_id: String,
}

/// Market-data incremental refresh (35=X), one entry per book change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDataIncrementalRefresh {
    pub md_req_id: String,
    pub entries: Vec<MdEntry>,
}

/// Order submission (35=D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderSingle {
    pub cl_ord_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_qty: u64,
    pub ord_type: OrderType,
    /// Absent for market orders.
    pub price: Option<Decimal>,
    pub time_in_force: Option<char>,
    pub account: Option<String>,
    pub transact_time: NaiveDateTime,
}

/// Cancel of a resting order (35=F).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCancelRequest {
    pub orig_cl_ord_id: String,
    pub cl_ord_id: String,
    pub symbol: String,
    pub side: Side,
}

/// Execution report (35=8).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Process-unique generated token.
    pub order_id: String,
    /// Process-unique generated token.
    pub exec_id: String,
    pub exec_type: ExecType,
    pub ord_status: OrdStatus,
    pub side: Side,
    /// Remaining quantity.
    pub leaves_qty: u64,
    pub cum_qty: u64,
    pub avg_px: Decimal,
    pub symbol: String,
    pub cl_ord_id: String,
    pub order_qty: u64,
    pub ord_type: OrderType,
    pub transact_time: NaiveDateTime,
    /// This fill's execution price.
    pub last_px: Decimal,
    /// This fill's quantity.
    pub last_qty: u64,
    /// The order's limit price; zero when the original was a market order.
    pub price: Decimal,
    pub account: Option<String>,
    pub ord_rej_reason: Option<OrdRejReason>,
    pub orig_cl_ord_id: Option<String>,
}

/// Any message the exchange can receive or send.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    MarketDataRequest(MarketDataRequest),
    MarketDataIncrementalRefresh(MarketDataIncrementalRefresh),
    NewOrderSingle(NewOrderSingle),
    OrderCancelRequest(OrderCancelRequest),
    ExecutionReport(ExecutionReport),
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::MarketDataRequest(_) => MsgType::MarketDataRequest,
            Message::MarketDataIncrementalRefresh(_) => MsgType::MarketDataIncrementalRefresh,
            Message::NewOrderSingle(_) => MsgType::NewOrderSingle,
            Message::OrderCancelRequest(_) => MsgType::OrderCancelRequest,
            Message::ExecutionReport(_) => MsgType::ExecutionReport,
        }
    }

    /// Check an outbound message against the dictionary before sending.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Message::MarketDataRequest(req) => {
                if req.md_req_id.is_empty() {
                    return Err(ValidationError::EmptyField("MDReqID"));
                }
                if req.symbols.is_empty() {
                    return Err(ValidationError::NoEntries);
                }
                Ok(())
            }
            Message::MarketDataIncrementalRefresh(refresh) => {
                if refresh.md_req_id.is_empty() {
                    return Err(ValidationError::EmptyField("MDReqID"));
                }
                if refresh.entries.is_empty() {
                    return Err(ValidationError::NoEntries);
                }
                for entry in &refresh.entries {
                    if entry.symbol.is_empty() {
                        return Err(ValidationError::EmptyField("Symbol"));
                    }
                    if entry.entry_ref_id.is_empty() {
                        return Err(ValidationError::EmptyField("MDEntryRefID"));
                    }
                }
                Ok(())
            }
            Message::NewOrderSingle(order) => {
                if order.cl_ord_id.is_empty() {
                    return Err(ValidationError::EmptyField("ClOrdID"));
                }
                if order.symbol.is_empty() {
                    return Err(ValidationError::EmptyField("Symbol"));
                }
                Ok(())
            }
            Message::OrderCancelRequest(cancel) => {
                if cancel.orig_cl_ord_id.is_empty() {
                    return Err(ValidationError::EmptyField("OrigClOrdID"));
                }
                Ok(())
            }
            Message::ExecutionReport(report) => {
                if report.order_id.is_empty() {
                    return Err(ValidationError::EmptyField("OrderID"));
                }
                if report.exec_id.is_empty() {
                    return Err(ValidationError::EmptyField("ExecID"));
                }
                if report.cl_ord_id.is_empty() {
                    return Err(ValidationError::EmptyField("ClOrdID"));
                }
                if report.cum_qty + report.leaves_qty > report.order_qty {
                    return Err(ValidationError::InconsistentQuantities {
                        cum_qty: report.cum_qty,
                        leaves_qty: report.leaves_qty,
                        order_qty: report.order_qty,
                    });
                }
                Ok(())
            }
        }
    }
}
