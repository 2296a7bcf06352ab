//! FIX 4.4 field tags and enumerated values used by the exchange.
//!
//! Only the subset of the dictionary this exchange speaks is defined here;
//! the encode/decode logic lives in `codec`.

use exchange_core::Action;

/// Tag numbers, FIX 4.4 numbering.
pub mod tags {
    pub const ACCOUNT: u32 = 1;
    pub const AVG_PX: u32 = 6;
    pub const BEGIN_STRING: u32 = 8;
    pub const BODY_LENGTH: u32 = 9;
    pub const CHECKSUM: u32 = 10;
    pub const CL_ORD_ID: u32 = 11;
    pub const CUM_QTY: u32 = 14;
    pub const EXEC_ID: u32 = 17;
    pub const LAST_PX: u32 = 31;
    pub const LAST_QTY: u32 = 32;
    pub const MSG_TYPE: u32 = 35;
    pub const ORDER_ID: u32 = 37;
    pub const ORDER_QTY: u32 = 38;
    pub const ORD_STATUS: u32 = 39;
    pub const ORD_TYPE: u32 = 40;
    pub const ORIG_CL_ORD_ID: u32 = 41;
    pub const PRICE: u32 = 44;
    pub const SIDE: u32 = 54;
    pub const SYMBOL: u32 = 55;
    pub const TIME_IN_FORCE: u32 = 59;
    pub const TRANSACT_TIME: u32 = 60;
    pub const ORD_REJ_REASON: u32 = 103;
    pub const NO_RELATED_SYM: u32 = 146;
    pub const EXEC_TYPE: u32 = 150;
    pub const LEAVES_QTY: u32 = 151;
    pub const MD_REQ_ID: u32 = 262;
    pub const SUBSCRIPTION_REQUEST_TYPE: u32 = 263;
    pub const NO_MD_ENTRIES: u32 = 268;
    pub const MD_ENTRY_TYPE: u32 = 269;
    pub const MD_ENTRY_PX: u32 = 270;
    pub const MD_ENTRY_SIZE: u32 = 271;
    pub const MD_ENTRY_DATE: u32 = 272;
    pub const MD_ENTRY_TIME: u32 = 273;
    pub const MD_UPDATE_ACTION: u32 = 279;
    pub const MD_ENTRY_REF_ID: u32 = 280;
}

/// MsgType (35) values this exchange speaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgType {
    MarketDataRequest,
    MarketDataIncrementalRefresh,
    NewOrderSingle,
    OrderCancelRequest,
    ExecutionReport,
}

impl MsgType {
    pub fn as_str(self) -> &'static str {
        match self {
            MsgType::MarketDataRequest => "V",
            MsgType::MarketDataIncrementalRefresh => "X",
            MsgType::NewOrderSingle => "D",
            MsgType::OrderCancelRequest => "F",
            MsgType::ExecutionReport => "8",
        }
    }

    pub fn from_str_value(value: &str) -> Option<Self> {
        match value {
            "V" => Some(MsgType::MarketDataRequest),
            "X" => Some(MsgType::MarketDataIncrementalRefresh),
            "D" => Some(MsgType::NewOrderSingle),
            "F" => Some(MsgType::OrderCancelRequest),
            "8" => Some(MsgType::ExecutionReport),
            _ => None,
        }
    }
}

/// SubscriptionRequestType (263).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubscriptionRequestType {
    /// '1': subscribe to a snapshot plus updates.
    SnapshotPlusUpdates,
    /// '2': disable a previous snapshot-plus-updates subscription.
    DisablePrevious,
    /// Anything else; the gateway logs and ignores it.
    Other(char),
}

impl SubscriptionRequestType {
    pub fn as_fix_char(self) -> char {
        match self {
            SubscriptionRequestType::SnapshotPlusUpdates => '1',
            SubscriptionRequestType::DisablePrevious => '2',
            SubscriptionRequestType::Other(c) => c,
        }
    }

    pub fn from_fix_char(c: char) -> Self {
        match c {
            '1' => SubscriptionRequestType::SnapshotPlusUpdates,
            '2' => SubscriptionRequestType::DisablePrevious,
            other => SubscriptionRequestType::Other(other),
        }
    }
}

/// MDEntryType (269).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MdEntryType {
    Bid,
    Offer,
    Trade,
}

impl MdEntryType {
    pub fn as_fix_char(self) -> char {
        match self {
            MdEntryType::Bid => '0',
            MdEntryType::Offer => '1',
            MdEntryType::Trade => '2',
        }
    }

    pub fn from_fix_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(MdEntryType::Bid),
            '1' => Some(MdEntryType::Offer),
            '2' => Some(MdEntryType::Trade),
            _ => None,
        }
    }
}

/// MDUpdateAction (279), ordinal-encoded from the event's action tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MdUpdateAction {
    New,
    Change,
    Delete,
}

impl MdUpdateAction {
    pub fn as_fix_char(self) -> char {
        match self {
            MdUpdateAction::New => '0',
            MdUpdateAction::Change => '1',
            MdUpdateAction::Delete => '2',
        }
    }

    pub fn from_fix_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(MdUpdateAction::New),
            '1' => Some(MdUpdateAction::Change),
            '2' => Some(MdUpdateAction::Delete),
            _ => None,
        }
    }
}

impl From<Action> for MdUpdateAction {
    fn from(action: Action) -> Self {
        match action.ordinal() {
            0 => MdUpdateAction::New,
            1 => MdUpdateAction::Change,
            _ => MdUpdateAction::Delete,
        }
    }
}

/// ExecType (150).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExecType {
    New,
    Trade,
    Canceled,
    Rejected,
}

impl ExecType {
    pub fn as_fix_char(self) -> char {
        match self {
            ExecType::New => '0',
            ExecType::Trade => 'F',
            ExecType::Canceled => '4',
            ExecType::Rejected => '8',
        }
    }

    pub fn from_fix_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(ExecType::New),
            'F' => Some(ExecType::Trade),
            '4' => Some(ExecType::Canceled),
            '8' => Some(ExecType::Rejected),
            _ => None,
        }
    }
}

/// OrdStatus (39).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrdStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrdStatus {
    pub fn as_fix_char(self) -> char {
        match self {
            OrdStatus::New => '0',
            OrdStatus::PartiallyFilled => '1',
            OrdStatus::Filled => '2',
            OrdStatus::Canceled => '4',
            OrdStatus::Rejected => '8',
        }
    }

    pub fn from_fix_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(OrdStatus::New),
            '1' => Some(OrdStatus::PartiallyFilled),
            '2' => Some(OrdStatus::Filled),
            '4' => Some(OrdStatus::Canceled),
            '8' => Some(OrdStatus::Rejected),
            _ => None,
        }
    }
}

/// OrdRejReason (103).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrdRejReason {
    UnknownSymbol,
    UnknownOrder,
}

impl OrdRejReason {
    pub fn as_u32(self) -> u32 {
        match self {
            OrdRejReason::UnknownSymbol => 1,
            OrdRejReason::UnknownOrder => 5,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(OrdRejReason::UnknownSymbol),
            5 => Some(OrdRejReason::UnknownOrder),
            _ => None,
        }
    }
}

/// TimeInForce (59) values the order server accepts.
pub const TIF_GOOD_TILL_CANCEL: char = '1';
