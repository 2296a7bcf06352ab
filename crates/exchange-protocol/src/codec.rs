//! Tag=value codec.
//!
//! Frames look like standard FIX 4.4:
//!
//! ```text
//! 8=FIX.4.4 | 9=<body length> | 35=... body ... | 10=<checksum> |
//! ```
//!
//! with `|` standing for the SOH byte (0x01). The body length counts the
//! bytes between the SOH after the BodyLength field and the start of the
//! CheckSum field; the checksum is the byte sum of everything before the
//! CheckSum field, mod 256, printed as three digits.
//!
//! [`FrameDecoder`] incrementally extracts complete frames from a byte
//! stream; [`decode`] turns one frame into a typed [`Message`];
//! [`encode`] does the reverse.

use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use thiserror::Error;

use exchange_core::{OrderType, Side};

use crate::fields::{
    tags, ExecType, MdEntryType, MdUpdateAction, MsgType, OrdRejReason, OrdStatus,
    SubscriptionRequestType,
};
use crate::wire_types::{
    ExecutionReport, MarketDataIncrementalRefresh, MarketDataRequest, MdEntry, Message,
    NewOrderSingle, OrderCancelRequest,
};

/// Field separator byte.
pub const SOH: u8 = 0x01;

const BEGIN_STRING: &str = "FIX.4.4";

const TRANSACT_TIME_FORMAT: &str = "%Y%m%d-%H:%M:%S%.3f";
const ENTRY_DATE_FORMAT: &str = "%Y%m%d";
const ENTRY_TIME_FORMAT: &str = "%H:%M:%S";

/// Decoding failures for one frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed tag=value field {0:?}")]
    Malformed(String),
    #[error("unexpected begin string {0:?}")]
    BadBeginString(String),
    #[error("body length mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch { declared: u32, computed: u32 },
    #[error("missing required tag {0}")]
    MissingTag(u32),
    #[error("invalid value {value:?} for tag {tag}")]
    InvalidValue { tag: u32, value: String },
    #[error("unsupported message type {0:?}")]
    UnsupportedMsgType(String),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a message as a complete framed byte sequence.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut body = String::new();
    push_field(&mut body, tags::MSG_TYPE, message.msg_type().as_str());

    match message {
        Message::MarketDataRequest(req) => {
            push_field(&mut body, tags::MD_REQ_ID, &req.md_req_id);
            push_field(
                &mut body,
                tags::SUBSCRIPTION_REQUEST_TYPE,
                req.subscription_type.as_fix_char(),
            );
            push_field(&mut body, tags::NO_RELATED_SYM, req.symbols.len());
            for symbol in &req.symbols {
                push_field(&mut body, tags::SYMBOL, symbol);
            }
        }
        Message::MarketDataIncrementalRefresh(refresh) => {
            push_field(&mut body, tags::MD_REQ_ID, &refresh.md_req_id);
            push_field(&mut body, tags::NO_MD_ENTRIES, refresh.entries.len());
            for entry in &refresh.entries {
                push_field(
                    &mut body,
                    tags::MD_UPDATE_ACTION,
                    entry.update_action.as_fix_char(),
                );
                push_field(&mut body, tags::MD_ENTRY_TYPE, entry.entry_type.as_fix_char());
                push_field(&mut body, tags::MD_ENTRY_PX, entry.price);
                push_field(&mut body, tags::MD_ENTRY_SIZE, entry.size);
                push_field(
                    &mut body,
                    tags::MD_ENTRY_DATE,
                    entry.entry_time.format(ENTRY_DATE_FORMAT),
                );
                push_field(
                    &mut body,
                    tags::MD_ENTRY_TIME,
                    entry.entry_time.format(ENTRY_TIME_FORMAT),
                );
                push_field(&mut body, tags::SYMBOL, &entry.symbol);
                push_field(&mut body, tags::MD_ENTRY_REF_ID, &entry.entry_ref_id);
            }
        }
        Message::NewOrderSingle(order) => {
            push_field(&mut body, tags::CL_ORD_ID, &order.cl_ord_id);
            push_field(&mut body, tags::SYMBOL, &order.symbol);
            push_field(&mut body, tags::SIDE, order.side.as_fix_char());
            push_field(&mut body, tags::ORDER_QTY, order.order_qty);
            push_field(&mut body, tags::ORD_TYPE, order.ord_type.as_fix_char());
            if let Some(price) = order.price {
                push_field(&mut body, tags::PRICE, price);
            }
            if let Some(tif) = order.time_in_force {
                push_field(&mut body, tags::TIME_IN_FORCE, tif);
            }
            if let Some(account) = &order.account {
                push_field(&mut body, tags::ACCOUNT, account);
            }
            push_field(
                &mut body,
                tags::TRANSACT_TIME,
                order.transact_time.format(TRANSACT_TIME_FORMAT),
            );
        }
        Message::OrderCancelRequest(cancel) => {
            push_field(&mut body, tags::ORIG_CL_ORD_ID, &cancel.orig_cl_ord_id);
            push_field(&mut body, tags::CL_ORD_ID, &cancel.cl_ord_id);
            push_field(&mut body, tags::SYMBOL, &cancel.symbol);
            push_field(&mut body, tags::SIDE, cancel.side.as_fix_char());
        }
        Message::ExecutionReport(report) => {
            push_field(&mut body, tags::ORDER_ID, &report.order_id);
            push_field(&mut body, tags::EXEC_ID, &report.exec_id);
            push_field(&mut body, tags::EXEC_TYPE, report.exec_type.as_fix_char());
            push_field(&mut body, tags::ORD_STATUS, report.ord_status.as_fix_char());
            push_field(&mut body, tags::SIDE, report.side.as_fix_char());
            push_field(&mut body, tags::LEAVES_QTY, report.leaves_qty);
            push_field(&mut body, tags::CUM_QTY, report.cum_qty);
            push_field(&mut body, tags::AVG_PX, report.avg_px);
            push_field(&mut body, tags::SYMBOL, &report.symbol);
            push_field(&mut body, tags::CL_ORD_ID, &report.cl_ord_id);
            if let Some(orig) = &report.orig_cl_ord_id {
                push_field(&mut body, tags::ORIG_CL_ORD_ID, orig);
            }
            push_field(&mut body, tags::ORDER_QTY, report.order_qty);
            push_field(&mut body, tags::ORD_TYPE, report.ord_type.as_fix_char());
            push_field(
                &mut body,
                tags::TRANSACT_TIME,
                report.transact_time.format(TRANSACT_TIME_FORMAT),
            );
            push_field(&mut body, tags::LAST_PX, report.last_px);
            push_field(&mut body, tags::LAST_QTY, report.last_qty);
            push_field(&mut body, tags::PRICE, report.price);
            if let Some(account) = &report.account {
                push_field(&mut body, tags::ACCOUNT, account);
            }
            if let Some(reason) = report.ord_rej_reason {
                push_field(&mut body, tags::ORD_REJ_REASON, reason.as_u32());
            }
        }
    }

    frame(&body)
}

fn push_field(body: &mut String, tag: u32, value: impl std::fmt::Display) {
    // Writing into a String cannot fail.
    let _ = write!(body, "{}={}{}", tag, value, SOH as char);
}

fn frame(body: &str) -> Vec<u8> {
    let mut out = String::new();
    let _ = write!(
        out,
        "8={}{}9={}{}",
        BEGIN_STRING,
        SOH as char,
        body.len(),
        SOH as char
    );
    out.push_str(body);
    let checksum = out.bytes().map(u32::from).sum::<u32>() % 256;
    let _ = write!(out, "10={:03}{}", checksum, SOH as char);
    out.into_bytes()
}

// ---------------------------------------------------------------------------
// Frame extraction
// ---------------------------------------------------------------------------

/// Accumulates stream bytes and yields complete frames.
///
/// Bytes before the next `8=FIX` are discarded, so a session survives
/// leading noise or a partially dropped frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let start = find_subsequence(&self.buffer, b"8=FIX")?;
        if start > 0 {
            self.buffer.drain(..start);
        }

        // A frame ends with "<SOH>10=nnn<SOH>".
        let trailer_start = find_subsequence(&self.buffer, &[SOH, b'1', b'0', b'='])?;
        let end = self.buffer[trailer_start + 1..]
            .iter()
            .position(|&b| b == SOH)
            .map(|p| trailer_start + 1 + p)?;

        let frame: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(frame)
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one complete frame into a typed message.
pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
    let fields = split_fields(frame)?;
    verify_framing(frame, &fields)?;

    // Skip BeginString, BodyLength; drop the trailing CheckSum.
    let body = &fields[2..fields.len() - 1];
    let msg_type_value = match body.first() {
        Some((tag, value)) if *tag == tags::MSG_TYPE => value.as_str(),
        _ => return Err(DecodeError::MissingTag(tags::MSG_TYPE)),
    };
    let msg_type = MsgType::from_str_value(msg_type_value)
        .ok_or_else(|| DecodeError::UnsupportedMsgType(msg_type_value.to_string()))?;
    let body = &body[1..];

    match msg_type {
        MsgType::MarketDataRequest => decode_market_data_request(body),
        MsgType::MarketDataIncrementalRefresh => decode_incremental_refresh(body),
        MsgType::NewOrderSingle => decode_new_order_single(body),
        MsgType::OrderCancelRequest => decode_order_cancel_request(body),
        MsgType::ExecutionReport => decode_execution_report(body),
    }
}

fn split_fields(frame: &[u8]) -> Result<Vec<(u32, String)>, DecodeError> {
    let mut fields = Vec::new();
    for chunk in frame.split(|&b| b == SOH) {
        if chunk.is_empty() {
            continue;
        }
        let text = String::from_utf8_lossy(chunk);
        let (tag, value) = text
            .split_once('=')
            .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;
        let tag: u32 = tag
            .parse()
            .map_err(|_| DecodeError::Malformed(text.to_string()))?;
        fields.push((tag, value.to_string()));
    }
    if fields.len() < 4 {
        return Err(DecodeError::Malformed(String::from_utf8_lossy(frame).into()));
    }
    Ok(fields)
}

fn verify_framing(frame: &[u8], fields: &[(u32, String)]) -> Result<(), DecodeError> {
    let begin = &fields[0];
    if begin.0 != tags::BEGIN_STRING || begin.1 != BEGIN_STRING {
        return Err(DecodeError::BadBeginString(begin.1.clone()));
    }

    let declared_len: usize = match &fields[1] {
        (tag, value) if *tag == tags::BODY_LENGTH => {
            value.parse().map_err(|_| DecodeError::InvalidValue {
                tag: tags::BODY_LENGTH,
                value: value.clone(),
            })?
        }
        _ => return Err(DecodeError::MissingTag(tags::BODY_LENGTH)),
    };

    let last = &fields[fields.len() - 1];
    if last.0 != tags::CHECKSUM {
        return Err(DecodeError::MissingTag(tags::CHECKSUM));
    }
    let declared_checksum: u32 = last.1.parse().map_err(|_| DecodeError::InvalidValue {
        tag: tags::CHECKSUM,
        value: last.1.clone(),
    })?;

    // Bytes before the CheckSum field are covered by the checksum; the body
    // starts after the BodyLength field's SOH.
    let trailer_len = 3 + last.1.len() + 1; // "10=" value SOH
    let checksummed = &frame[..frame.len().saturating_sub(trailer_len)];
    let computed = checksummed.iter().map(|&b| u32::from(b)).sum::<u32>() % 256;
    if computed != declared_checksum {
        return Err(DecodeError::ChecksumMismatch {
            declared: declared_checksum,
            computed,
        });
    }

    let header_len = 2 + BEGIN_STRING.len() + 1 + 2 + fields[1].1.len() + 1;
    let actual_len = checksummed.len().saturating_sub(header_len);
    if actual_len != declared_len {
        return Err(DecodeError::BodyLengthMismatch {
            declared: declared_len,
            actual: actual_len,
        });
    }

    Ok(())
}

fn first<'a>(fields: &'a [(u32, String)], tag: u32) -> Option<&'a str> {
    fields
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, v)| v.as_str())
}

fn require<'a>(fields: &'a [(u32, String)], tag: u32) -> Result<&'a str, DecodeError> {
    first(fields, tag).ok_or(DecodeError::MissingTag(tag))
}

fn parse_qty(tag: u32, value: &str) -> Result<u64, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidValue {
        tag,
        value: value.to_string(),
    })
}

fn parse_price(tag: u32, value: &str) -> Result<Decimal, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidValue {
        tag,
        value: value.to_string(),
    })
}

fn parse_char(tag: u32, value: &str) -> Result<char, DecodeError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(DecodeError::InvalidValue {
            tag,
            value: value.to_string(),
        }),
    }
}

fn parse_side(tag: u32, value: &str) -> Result<Side, DecodeError> {
    let c = parse_char(tag, value)?;
    Side::from_fix_char(c).ok_or_else(|| DecodeError::InvalidValue {
        tag,
        value: value.to_string(),
    })
}

fn parse_transact_time(tag: u32, value: &str) -> Result<NaiveDateTime, DecodeError> {
    NaiveDateTime::parse_from_str(value, TRANSACT_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%d-%H:%M:%S"))
        .map_err(|_| DecodeError::InvalidValue {
            tag,
            value: value.to_string(),
        })
}

fn decode_market_data_request(fields: &[(u32, String)]) -> Result<Message, DecodeError> {
    let md_req_id = require(fields, tags::MD_REQ_ID)?.to_string();
    let sub_type_raw = require(fields, tags::SUBSCRIPTION_REQUEST_TYPE)?;
    let subscription_type = SubscriptionRequestType::from_fix_char(parse_char(
        tags::SUBSCRIPTION_REQUEST_TYPE,
        sub_type_raw,
    )?);

    // Symbols arrive as a repeating group; the declared count is advisory.
    let symbols: Vec<String> = fields
        .iter()
        .filter(|(tag, _)| *tag == tags::SYMBOL)
        .map(|(_, v)| v.clone())
        .collect();

    Ok(Message::MarketDataRequest(MarketDataRequest {
        md_req_id,
        subscription_type,
        symbols,
    }))
}

fn decode_incremental_refresh(fields: &[(u32, String)]) -> Result<Message, DecodeError> {
    let md_req_id = require(fields, tags::MD_REQ_ID)?.to_string();

    let mut entries = Vec::new();
    let mut index = 0;
    while index < fields.len() {
        if fields[index].0 != tags::MD_UPDATE_ACTION {
            index += 1;
            continue;
        }
        let group_end = fields[index + 1..]
            .iter()
            .position(|(tag, _)| *tag == tags::MD_UPDATE_ACTION)
            .map(|p| index + 1 + p)
            .unwrap_or(fields.len());
        let group = &fields[index..group_end];

        let update_action_raw = require(group, tags::MD_UPDATE_ACTION)?;
        let update_action =
            MdUpdateAction::from_fix_char(parse_char(tags::MD_UPDATE_ACTION, update_action_raw)?)
                .ok_or_else(|| DecodeError::InvalidValue {
                    tag: tags::MD_UPDATE_ACTION,
                    value: update_action_raw.to_string(),
                })?;
        let entry_type_raw = require(group, tags::MD_ENTRY_TYPE)?;
        let entry_type =
            MdEntryType::from_fix_char(parse_char(tags::MD_ENTRY_TYPE, entry_type_raw)?)
                .ok_or_else(|| DecodeError::InvalidValue {
                    tag: tags::MD_ENTRY_TYPE,
                    value: entry_type_raw.to_string(),
                })?;
        let price = parse_price(tags::MD_ENTRY_PX, require(group, tags::MD_ENTRY_PX)?)?;
        let size = parse_qty(tags::MD_ENTRY_SIZE, require(group, tags::MD_ENTRY_SIZE)?)?;

        let date_raw = require(group, tags::MD_ENTRY_DATE)?;
        let date = NaiveDate::parse_from_str(date_raw, ENTRY_DATE_FORMAT).map_err(|_| {
            DecodeError::InvalidValue {
                tag: tags::MD_ENTRY_DATE,
                value: date_raw.to_string(),
            }
        })?;
        let time_raw = require(group, tags::MD_ENTRY_TIME)?;
        let time = NaiveTime::parse_from_str(time_raw, ENTRY_TIME_FORMAT).map_err(|_| {
            DecodeError::InvalidValue {
                tag: tags::MD_ENTRY_TIME,
                value: time_raw.to_string(),
            }
        })?;

        entries.push(MdEntry {
            update_action,
            entry_type,
            price,
            size,
            entry_time: date.and_time(time),
            symbol: require(group, tags::SYMBOL)?.to_string(),
            entry_ref_id: require(group, tags::MD_ENTRY_REF_ID)?.to_string(),
        });

        index = group_end;
    }

    Ok(Message::MarketDataIncrementalRefresh(
        MarketDataIncrementalRefresh { md_req_id, entries },
    ))
}

fn decode_new_order_single(fields: &[(u32, String)]) -> Result<Message, DecodeError> {
    let ord_type_raw = require(fields, tags::ORD_TYPE)?;
    let ord_type = OrderType::from_fix_char(parse_char(tags::ORD_TYPE, ord_type_raw)?)
        .ok_or_else(|| DecodeError::InvalidValue {
            tag: tags::ORD_TYPE,
            value: ord_type_raw.to_string(),
        })?;

    let price = match first(fields, tags::PRICE) {
        Some(value) => Some(parse_price(tags::PRICE, value)?),
        None => None,
    };
    let time_in_force = match first(fields, tags::TIME_IN_FORCE) {
        Some(value) => Some(parse_char(tags::TIME_IN_FORCE, value)?),
        None => None,
    };

    Ok(Message::NewOrderSingle(NewOrderSingle {
        cl_ord_id: require(fields, tags::CL_ORD_ID)?.to_string(),
        symbol: require(fields, tags::SYMBOL)?.to_string(),
        side: parse_side(tags::SIDE, require(fields, tags::SIDE)?)?,
        order_qty: parse_qty(tags::ORDER_QTY, require(fields, tags::ORDER_QTY)?)?,
        ord_type,
        price,
        time_in_force,
        account: first(fields, tags::ACCOUNT).map(str::to_string),
        transact_time: parse_transact_time(
            tags::TRANSACT_TIME,
            require(fields, tags::TRANSACT_TIME)?,
        )?,
    }))
}

fn decode_order_cancel_request(fields: &[(u32, String)]) -> Result<Message, DecodeError> {
    Ok(Message::OrderCancelRequest(OrderCancelRequest {
        orig_cl_ord_id: require(fields, tags::ORIG_CL_ORD_ID)?.to_string(),
        cl_ord_id: require(fields, tags::CL_ORD_ID)?.to_string(),
        symbol: require(fields, tags::SYMBOL)?.to_string(),
        side: parse_side(tags::SIDE, require(fields, tags::SIDE)?)?,
    }))
}

fn decode_execution_report(fields: &[(u32, String)]) -> Result<Message, DecodeError> {
    let exec_type_raw = require(fields, tags::EXEC_TYPE)?;
    let exec_type = ExecType::from_fix_char(parse_char(tags::EXEC_TYPE, exec_type_raw)?)
        .ok_or_else(|| DecodeError::InvalidValue {
            tag: tags::EXEC_TYPE,
            value: exec_type_raw.to_string(),
        })?;
    let ord_status_raw = require(fields, tags::ORD_STATUS)?;
    let ord_status = OrdStatus::from_fix_char(parse_char(tags::ORD_STATUS, ord_status_raw)?)
        .ok_or_else(|| DecodeError::InvalidValue {
            tag: tags::ORD_STATUS,
            value: ord_status_raw.to_string(),
        })?;
    let ord_type_raw = require(fields, tags::ORD_TYPE)?;
    let ord_type = OrderType::from_fix_char(parse_char(tags::ORD_TYPE, ord_type_raw)?)
        .ok_or_else(|| DecodeError::InvalidValue {
            tag: tags::ORD_TYPE,
            value: ord_type_raw.to_string(),
        })?;

    let ord_rej_reason = match first(fields, tags::ORD_REJ_REASON) {
        Some(value) => {
            let code: u32 = value.parse().map_err(|_| DecodeError::InvalidValue {
                tag: tags::ORD_REJ_REASON,
                value: value.to_string(),
            })?;
            OrdRejReason::from_u32(code)
        }
        None => None,
    };

    Ok(Message::ExecutionReport(ExecutionReport {
        order_id: require(fields, tags::ORDER_ID)?.to_string(),
        exec_id: require(fields, tags::EXEC_ID)?.to_string(),
        exec_type,
        ord_status,
        side: parse_side(tags::SIDE, require(fields, tags::SIDE)?)?,
        leaves_qty: parse_qty(tags::LEAVES_QTY, require(fields, tags::LEAVES_QTY)?)?,
        cum_qty: parse_qty(tags::CUM_QTY, require(fields, tags::CUM_QTY)?)?,
        avg_px: parse_price(tags::AVG_PX, require(fields, tags::AVG_PX)?)?,
        symbol: require(fields, tags::SYMBOL)?.to_string(),
        cl_ord_id: require(fields, tags::CL_ORD_ID)?.to_string(),
        order_qty: parse_qty(tags::ORDER_QTY, require(fields, tags::ORDER_QTY)?)?,
        ord_type,
        transact_time: parse_transact_time(
            tags::TRANSACT_TIME,
            require(fields, tags::TRANSACT_TIME)?,
        )?,
        last_px: parse_price(tags::LAST_PX, require(fields, tags::LAST_PX)?)?,
        last_qty: parse_qty(tags::LAST_QTY, require(fields, tags::LAST_QTY)?)?,
        price: parse_price(tags::PRICE, require(fields, tags::PRICE)?)?,
        account: first(fields, tags::ACCOUNT).map(str::to_string),
        ord_rej_reason,
        orig_cl_ord_id: first(fields, tags::ORIG_CL_ORD_ID).map(str::to_string),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2011, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn subscribe_request() -> Message {
        Message::MarketDataRequest(MarketDataRequest {
            md_req_id: "md-req-1".into(),
            subscription_type: SubscriptionRequestType::SnapshotPlusUpdates,
            symbols: vec!["VOD.L".into()],
        })
    }

    #[test]
    fn frames_carry_begin_string_and_checksum_trailer() {
        let bytes = encode(&subscribe_request());
        assert!(bytes.starts_with(b"8=FIX.4.4\x019="));
        assert_eq!(bytes.last(), Some(&SOH));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("35=V\x01"));
        assert!(text.contains("262=md-req-1\x01"));
        assert!(text.contains("263=1\x01"));
        assert!(text.contains("146=1\x0155=VOD.L\x01"));
    }

    #[test]
    fn market_data_request_round_trips() {
        let message = subscribe_request();
        let decoded = decode(&encode(&message)).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn new_order_single_round_trips_with_optional_fields() {
        let message = Message::NewOrderSingle(NewOrderSingle {
            cl_ord_id: "ord-7".into(),
            symbol: "VOD.L".into(),
            side: Side::Buy,
            order_qty: 100,
            ord_type: OrderType::Limit,
            price: Some(dec!(1.2050)),
            time_in_force: Some('1'),
            account: Some("acct-9".into()),
            transact_time: ts(),
        });
        assert_eq!(decode(&encode(&message)).unwrap(), message);
    }

    #[test]
    fn market_order_omits_the_price_field() {
        let message = Message::NewOrderSingle(NewOrderSingle {
            cl_ord_id: "ord-8".into(),
            symbol: "VOD.L".into(),
            side: Side::Sell,
            order_qty: 40,
            ord_type: OrderType::Market,
            price: None,
            time_in_force: None,
            account: None,
            transact_time: ts(),
        });
        let bytes = encode(&message);
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("\x0144="));
        assert_eq!(decode(&bytes).unwrap(), message);
    }

    #[test]
    fn execution_report_round_trips() {
        let message = Message::ExecutionReport(ExecutionReport {
            order_id: "o-uuid".into(),
            exec_id: "e-uuid".into(),
            exec_type: ExecType::Trade,
            ord_status: OrdStatus::PartiallyFilled,
            side: Side::Buy,
            leaves_qty: 40,
            cum_qty: 60,
            avg_px: dec!(1.2049),
            symbol: "VOD.L".into(),
            cl_ord_id: "ord-7".into(),
            order_qty: 100,
            ord_type: OrderType::Limit,
            transact_time: ts(),
            last_px: dec!(1.2049),
            last_qty: 60,
            price: dec!(1.2050),
            account: None,
            ord_rej_reason: None,
            orig_cl_ord_id: None,
        });
        assert_eq!(decode(&encode(&message)).unwrap(), message);
    }

    #[test]
    fn incremental_refresh_round_trips_multiple_entries() {
        let message = Message::MarketDataIncrementalRefresh(MarketDataIncrementalRefresh {
            md_req_id: "md-req-1".into(),
            entries: vec![
                MdEntry {
                    update_action: MdUpdateAction::New,
                    entry_type: MdEntryType::Bid,
                    price: dec!(1.2040),
                    size: 100,
                    entry_time: ts(),
                    symbol: "VOD.L".into(),
                    entry_ref_id: "hist-1".into(),
                },
                MdEntry {
                    update_action: MdUpdateAction::Delete,
                    entry_type: MdEntryType::Trade,
                    price: dec!(1.2041),
                    size: 30,
                    entry_time: ts(),
                    symbol: "VOD.L".into(),
                    entry_ref_id: "hist-2".into(),
                },
            ],
        });
        assert_eq!(decode(&encode(&message)).unwrap(), message);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = encode(&subscribe_request());
        // Corrupt a value byte without touching the field structure.
        let pos = find_subsequence(&bytes, b"md-req-1").unwrap() + 7;
        bytes[pos] = b'2';
        match decode(&bytes) {
            Err(DecodeError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn unsupported_message_type_is_reported() {
        // A Logon (35=A) is valid FIX but not spoken here.
        let bytes = frame("35=A\x0198=0\x01108=30\x01");
        match decode(&bytes) {
            Err(DecodeError::UnsupportedMsgType(t)) => assert_eq!(t, "A"),
            other => panic!("expected unsupported type, got {:?}", other),
        }
    }

    #[test]
    fn missing_required_field_is_reported() {
        let bytes = frame("35=F\x0111=c-1\x0155=VOD.L\x0154=1\x01");
        match decode(&bytes) {
            Err(DecodeError::MissingTag(tag)) => assert_eq!(tag, tags::ORIG_CL_ORD_ID),
            other => panic!("expected missing tag, got {:?}", other),
        }
    }

    #[test]
    fn frame_decoder_reassembles_split_frames() {
        let bytes = encode(&subscribe_request());
        let (head, tail) = bytes.split_at(bytes.len() / 2);

        let mut decoder = FrameDecoder::new();
        decoder.feed(head);
        assert!(decoder.next_frame().is_none());
        decoder.feed(tail);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame, bytes);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn frame_decoder_skips_leading_noise_and_yields_consecutive_frames() {
        let first = encode(&subscribe_request());
        let second = encode(&Message::MarketDataRequest(MarketDataRequest {
            md_req_id: "md-req-2".into(),
            subscription_type: SubscriptionRequestType::DisablePrevious,
            symbols: vec!["VOD.L".into()],
        }));

        let mut decoder = FrameDecoder::new();
        decoder.feed(b"\r\ngarbage");
        decoder.feed(&first);
        decoder.feed(&second);

        assert_eq!(decoder.next_frame().unwrap(), first);
        assert_eq!(decoder.next_frame().unwrap(), second);
        assert!(decoder.next_frame().is_none());
    }
}
