//! exchange-protocol
//!
//! FIX-style wire layer for the exchange:
//! - field tags and enumerated values
//! - typed wire messages with outbound validation
//! - tag=value codec with SOH framing and checksums

pub mod codec;
pub mod fields;
pub mod wire_types;

pub use codec::{decode, encode, DecodeError, FrameDecoder, SOH};
pub use fields::{
    ExecType, MdEntryType, MdUpdateAction, MsgType, OrdRejReason, OrdStatus,
    SubscriptionRequestType, TIF_GOOD_TILL_CANCEL,
};
pub use wire_types::{
    ExecutionReport, MarketDataIncrementalRefresh, MarketDataRequest, MdEntry, Message,
    NewOrderSingle, OrderCancelRequest, ValidationError,
};
