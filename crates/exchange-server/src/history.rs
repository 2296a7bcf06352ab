//! Historical market data interface.
//!
//! Ingestion of raw recorded data into persistent storage is an external
//! collaborator; the replay driver consumes it through the narrow
//! [`HistoricalEventSource`] interface defined here. Records must arrive
//! in nondecreasing timestamp order - that is the store's contract.
//!
//! The file format accepted by [`CsvFileSource`] mirrors the store's
//! recorded order-book activity, one record per line:
//!
//! ```text
//! orderID,actionType,buySellInd,price,quantity,dateTime
//! 4000001,,B,1.2040,5000,2011-03-01T08:00:00
//! 4000002,P,S,1.2041,1200,2011-03-01T08:00:01
//! ```
//!
//! `actionType` is empty for a plain order, or one of `D` (delete), `E`
//! (expired), `P` (partial match), `M` (full match), `T` (transaction
//! limit, ignored).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use exchange_core::Side;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from the historical store.
///
/// A per-record error is logged and the record skipped; replay continues
/// with the next record.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error reading historical data: {0}")]
    Io(#[from] std::io::Error),
    #[error("unparsable record at line {line}: {reason}")]
    BadRecord { line: usize, reason: String },
}

/// What a historical record did to the recorded book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A plain bid or offer entering the book.
    Order,
    /// The order was deleted.
    Delete,
    /// The order expired.
    Expired,
    /// The order partially matched.
    PartialMatch,
    /// The order fully matched.
    FullMatch,
    /// Transaction-limit marker; carries no book change.
    TransactionLimit,
}

impl RecordKind {
    fn from_action_code(code: Option<char>) -> Option<RecordKind> {
        match code {
            None => Some(RecordKind::Order),
            Some('D') => Some(RecordKind::Delete),
            Some('E') => Some(RecordKind::Expired),
            Some('P') => Some(RecordKind::PartialMatch),
            Some('M') => Some(RecordKind::FullMatch),
            Some('T') => Some(RecordKind::TransactionLimit),
            Some(_) => None,
        }
    }
}

/// One historical market event, as recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    pub order_id: String,
    pub kind: RecordKind,
    pub side: Side,
    pub price: Decimal,
    pub quantity: u64,
    pub timestamp: NaiveDateTime,
}

/// Narrow interface to the external historical store.
///
/// `next_record` pulls the next record in nondecreasing timestamp order;
/// `None` means the feed is exhausted.
pub trait HistoricalEventSource: Send {
    fn next_record(&mut self) -> Option<Result<ReplayRecord, HistoryError>>;
}

/// External loader that (re)populates the historical store before the
/// exchange starts. Owned by collaborators; invoked synchronously by the
/// coordinator when configured to.
pub trait HistoricalDataLoader: Send {
    fn load(&self) -> anyhow::Result<()>;
}

/// In-memory source, used by tests and demos.
pub struct VecSource {
    records: std::vec::IntoIter<ReplayRecord>,
}

impl VecSource {
    pub fn new(records: Vec<ReplayRecord>) -> Self {
        VecSource {
            records: records.into_iter(),
        }
    }
}

impl HistoricalEventSource for VecSource {
    fn next_record(&mut self) -> Option<Result<ReplayRecord, HistoryError>> {
        self.records.next().map(Ok)
    }
}

/// File-backed source reading the store's CSV export line by line.
pub struct CsvFileSource {
    lines: std::io::Lines<BufReader<File>>,
    line_no: usize,
}

impl CsvFileSource {
    /// Open the file; failure here is a startup error, not a per-record
    /// one.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let file = File::open(path)?;
        Ok(CsvFileSource {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl HistoricalEventSource for CsvFileSource {
    fn next_record(&mut self) -> Option<Result<ReplayRecord, HistoryError>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(HistoryError::Io(e))),
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            return Some(parse_record(trimmed, self.line_no));
        }
    }
}

fn parse_record(line: &str, line_no: usize) -> Result<ReplayRecord, HistoryError> {
    let bad = |reason: &str| HistoryError::BadRecord {
        line: line_no,
        reason: reason.to_string(),
    };

    let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
    if tokens.len() != 6 {
        return Err(bad("expected 6 comma-separated fields"));
    }

    let order_id = tokens[0].to_string();
    if order_id.is_empty() {
        return Err(bad("empty order ID"));
    }

    let action_code = tokens[1].chars().next();
    let kind = RecordKind::from_action_code(action_code)
        .ok_or_else(|| bad(&format!("unknown action code {:?}", tokens[1])))?;

    let side = match tokens[2] {
        "B" => Side::Buy,
        "S" => Side::Sell,
        other => return Err(bad(&format!("unknown buy/sell indicator {:?}", other))),
    };

    let price: Decimal = tokens[3]
        .parse()
        .map_err(|_| bad(&format!("unparsable price {:?}", tokens[3])))?;
    let quantity: u64 = tokens[4]
        .parse()
        .map_err(|_| bad(&format!("unparsable quantity {:?}", tokens[4])))?;

    let timestamp = NaiveDateTime::parse_from_str(tokens[5], "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(tokens[5], "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| bad(&format!("unparsable timestamp {:?}", tokens[5])))?;

    Ok(ReplayRecord {
        order_id,
        kind,
        side,
        price,
        quantity,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_a_plain_order_record() {
        let record = parse_record("4000001,,B,1.2040,5000,2011-03-01T08:00:00", 1).unwrap();
        assert_eq!(record.order_id, "4000001");
        assert_eq!(record.kind, RecordKind::Order);
        assert_eq!(record.side, Side::Buy);
        assert_eq!(record.price, dec!(1.2040));
        assert_eq!(record.quantity, 5000);
    }

    #[test]
    fn parses_every_action_code() {
        for (code, kind) in [
            ("D", RecordKind::Delete),
            ("E", RecordKind::Expired),
            ("P", RecordKind::PartialMatch),
            ("M", RecordKind::FullMatch),
            ("T", RecordKind::TransactionLimit),
        ] {
            let line = format!("1,{},S,1.0,10,2011-03-01T08:00:00", code);
            assert_eq!(parse_record(&line, 1).unwrap().kind, kind);
        }
    }

    #[test]
    fn rejects_malformed_records() {
        assert!(parse_record("not,enough,fields", 1).is_err());
        assert!(parse_record("1,X,B,1.0,10,2011-03-01T08:00:00", 1).is_err());
        assert!(parse_record("1,,Q,1.0,10,2011-03-01T08:00:00", 1).is_err());
        assert!(parse_record("1,,B,abc,10,2011-03-01T08:00:00", 1).is_err());
        assert!(parse_record("1,,B,1.0,-5,2011-03-01T08:00:00", 1).is_err());
        assert!(parse_record("1,,B,1.0,10,yesterday", 1).is_err());
    }

    #[test]
    fn vec_source_drains_in_order() {
        let ts = NaiveDateTime::parse_from_str("2011-03-01T08:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let records = vec![
            ReplayRecord {
                order_id: "1".into(),
                kind: RecordKind::Order,
                side: Side::Buy,
                price: dec!(1.0),
                quantity: 10,
                timestamp: ts,
            },
            ReplayRecord {
                order_id: "2".into(),
                kind: RecordKind::Order,
                side: Side::Sell,
                price: dec!(1.1),
                quantity: 20,
                timestamp: ts,
            },
        ];
        let mut source = VecSource::new(records.clone());
        assert_eq!(source.next_record().unwrap().unwrap(), records[0]);
        assert_eq!(source.next_record().unwrap().unwrap(), records[1]);
        assert!(source.next_record().is_none());
    }
}
