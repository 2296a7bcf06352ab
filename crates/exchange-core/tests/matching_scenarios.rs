//! End-to-end matching scenarios against a populated order book.

use chrono::NaiveDateTime;
use exchange_core::{
    match_bid, match_offer, EventKind, MarketEvent, OrderBook, OrderType,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn ts() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2011, 3, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn resting_offer(price: Decimal, qty: u64, client: &str, id: &str) -> MarketEvent {
    MarketEvent::offer(price, qty, id, ts(), client, OrderType::Limit, "VOD.L", None)
}

fn resting_bid(price: Decimal, qty: u64, client: &str, id: &str) -> MarketEvent {
    MarketEvent::bid(price, qty, id, ts(), client, OrderType::Limit, "VOD.L", None)
}

fn live_bid(price: Decimal, qty: u64, client: &str) -> MarketEvent {
    MarketEvent::bid(price, qty, "live-1", ts(), client, OrderType::Limit, "VOD.L", None)
}

/// Bid for 100 @ 1.2050 against offers 60 @ 1.2049 and 80 @ 1.2051: only
/// the first offer crosses, so the bid partially fills.
#[test]
fn partial_fill_when_the_second_offer_does_not_cross() {
    let mut book = OrderBook::new("VOD.L");
    book.insert(resting_offer(dec!(1.2049), 60, "B", "o1")).unwrap();
    book.insert(resting_offer(dec!(1.2051), 80, "C", "o2")).unwrap();

    let bid = live_bid(dec!(1.2050), 100, "A");
    let result = match_bid(&bid, book.offers()).unwrap();

    assert_eq!(result.event.kind, EventKind::PartialFill);
    assert_eq!(result.event.cum_qty, 60);
    assert_eq!(result.event.exec_price, dec!(1.2049));
    assert_eq!(result.event.remaining_qty, 40);

    book.apply_match(&result);
    assert!(book.offers().get("o1").is_none());
    assert_eq!(book.offers().get("o2").unwrap().remaining_qty, 80);
}

/// The same bid against a single 150 @ 1.2048 offer: a complete fill, and
/// the offer stays resting with the leftover 50.
#[test]
fn full_fill_leaves_the_oversized_offer_resting() {
    let mut book = OrderBook::new("VOD.L");
    book.insert(resting_offer(dec!(1.2048), 150, "B", "o1")).unwrap();

    let bid = live_bid(dec!(1.2050), 100, "A");
    let result = match_bid(&bid, book.offers()).unwrap();

    assert_eq!(result.event.kind, EventKind::Fill);
    assert_eq!(result.event.cum_qty, 100);
    assert_eq!(result.event.exec_price, dec!(1.2048));
    assert_eq!(result.event.remaining_qty, 0);

    book.apply_match(&result);
    let resting = book.offers().get("o1").unwrap();
    assert_eq!(resting.remaining_qty, 50);
}

/// Bid for 50 @ 10.00 from client A against A's own 50 @ 9.90 offer: the
/// best-priced candidate is the client's own order, so nothing fills.
#[test]
fn self_trade_candidate_yields_no_fill() {
    let mut book = OrderBook::new("VOD.L");
    book.insert(resting_offer(dec!(9.90), 50, "A", "o-own")).unwrap();

    let bid = live_bid(dec!(10.00), 50, "A");
    assert!(match_bid(&bid, book.offers()).is_none());
    // Nothing was consumed.
    assert_eq!(book.offers().get("o-own").unwrap().remaining_qty, 50);
}

/// An order that never matches keeps whatever average price it had before.
#[test]
fn no_fill_leaves_avg_price_untouched() {
    let book = OrderBook::new("VOD.L");

    let mut bid = live_bid(dec!(1.2040), 100, "A");
    bid.avg_price = dec!(1.1111);
    bid.cum_qty = 10;
    bid.remaining_qty = 90;

    assert!(match_bid(&bid, book.offers()).is_none());
    assert_eq!(bid.avg_price, dec!(1.1111));
}

/// Conservation across a multi-level sweep: the quantities consumed from
/// the book equal the aggressor's executed quantity, and the book shrinks
/// by exactly that amount.
#[test]
fn consumed_quantity_is_conserved() {
    let mut book = OrderBook::new("VOD.L");
    book.insert(resting_bid(dec!(1.2045), 30, "B", "b1")).unwrap();
    book.insert(resting_bid(dec!(1.2044), 50, "C", "b2")).unwrap();
    book.insert(resting_bid(dec!(1.2043), 40, "D", "b3")).unwrap();
    let before: u64 = book.bids().iter().map(|e| e.remaining_qty).sum();

    let offer = MarketEvent::offer(
        dec!(1.2044),
        70,
        "live-1",
        ts(),
        "A",
        OrderType::Limit,
        "VOD.L",
        None,
    );
    let result = match_offer(&offer, book.bids()).unwrap();

    let consumed_total: u64 = result.consumed.iter().map(|c| c.quantity).sum();
    assert_eq!(consumed_total, result.event.exec_qty);
    assert_eq!(result.event.kind, EventKind::Fill);

    book.apply_match(&result);
    let after: u64 = book.bids().iter().map(|e| e.remaining_qty).sum();
    assert_eq!(before - after, consumed_total);
    // The 1.2043 bid is below the offer's limit and was never reachable.
    assert_eq!(book.bids().get("b3").unwrap().remaining_qty, 40);
}

/// A partially filled remainder that rests and fills later accumulates its
/// lifetime average price across both executions.
#[test]
fn lifetime_average_price_spans_multiple_executions() {
    let mut book = OrderBook::new("VOD.L");
    book.insert(resting_offer(dec!(1.2000), 60, "B", "o1")).unwrap();

    let bid = live_bid(dec!(1.2200), 100, "A");
    let first = match_bid(&bid, book.offers()).unwrap();
    book.apply_match(&first);
    assert_eq!(first.event.avg_price, dec!(1.2000));

    // New liquidity arrives; the resting remainder goes again.
    book.insert(resting_offer(dec!(1.2200), 40, "C", "o2")).unwrap();
    let second = match_bid(&first.event, book.offers()).unwrap();
    book.apply_match(&second);

    assert_eq!(second.event.kind, EventKind::Fill);
    assert_eq!(second.event.cum_qty, 100);
    // (1.20 * 60 + 1.22 * 40) / 100
    assert_eq!(second.event.avg_price, dec!(1.208));
    assert_eq!(second.event.exec_price, dec!(1.2200));
}
