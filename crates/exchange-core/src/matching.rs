//! Matching engine: decides whether an incoming order crosses the opposing
//! side of the book and computes the resulting execution.
//!
//! Full match: the opposing side holds orders at-or-better than the
//! aggressor's crossing price whose cumulative size covers the aggressor's
//! remaining quantity. Partial match: some opposing quantity crosses but not
//! enough to cover it. Otherwise no fill, and the aggressor rests.
//!
//! An aggressor bid executes at the resting offers' prices, so its
//! execution price is always at or below its limit. A limit offer executes
//! at its own offer price; a market offer executes at the resting bids'
//! prices. Market orders cross everything via their sentinel price.
//!
//! The scan itself never mutates the book: the result carries the list of
//! consumed resting quantities, and applying them is the order book's
//! responsibility.

use rust_decimal::Decimal;

use crate::market_event::MarketEvent;
use crate::order_type::OrderType;
use crate::ordered_list::OrderedMarketEventList;

/// Quantity consumed from one resting order during a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumption {
    pub client_order_id: String,
    pub quantity: u64,
}

/// Outcome of a successful match attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// The aggressor's resulting [`EventKind::Fill`] or
    /// [`EventKind::PartialFill`] event.
    ///
    /// [`EventKind::Fill`]: crate::EventKind::Fill
    /// [`EventKind::PartialFill`]: crate::EventKind::PartialFill
    pub event: MarketEvent,
    /// Resting quantities to subtract from the opposing side, in match
    /// order.
    pub consumed: Vec<Consumption>,
}

/// Check an incoming bid for execution against the offer list.
///
/// Walks the offers best-first and stops as soon as an offer no longer
/// crosses, or an own-client offer occupies the best crossing slot
/// (self-trade prevention: the own order blocks the incoming order from
/// trading through it).
pub fn match_bid(bid: &MarketEvent, offers: &OrderedMarketEventList) -> Option<MatchResult> {
    let crossing_price = bid.crossing_price();

    let mut remaining_qty = bid.remaining_qty;
    let mut cum_price = Decimal::ZERO;
    let mut cum_qty: u64 = 0;
    let mut consumed = Vec::new();

    for offer in offers.iter() {
        if offer.order_price <= crossing_price && offer.client_id != bid.client_id {
            if offer.remaining_qty >= remaining_qty {
                // This offer covers the rest: complete fill.
                cum_price += offer.order_price * Decimal::from(remaining_qty);
                cum_qty += remaining_qty;
                consumed.push(Consumption {
                    client_order_id: offer.client_order_id.clone(),
                    quantity: remaining_qty,
                });
                return Some(full_fill(bid, cum_price, cum_qty, consumed));
            }
            // The price matches but the size does not; consume the whole
            // offer and look deeper into the book.
            let filled_qty = offer.remaining_qty;
            cum_price += offer.order_price * Decimal::from(filled_qty);
            cum_qty += filled_qty;
            remaining_qty -= filled_qty;
            consumed.push(Consumption {
                client_order_id: offer.client_order_id.clone(),
                quantity: filled_qty,
            });
        } else {
            // The list is ordered: no later offer can match either.
            break;
        }
    }

    if cum_qty > 0 {
        return Some(partial_fill(bid, cum_price, cum_qty, remaining_qty, consumed));
    }

    None
}

/// Check an incoming offer for execution against the bid list.
///
/// Mirror of [`match_bid`] with the price direction inverted. A limit offer
/// accumulates at its own offer price; a market offer accumulates at each
/// resting bid's price.
pub fn match_offer(offer: &MarketEvent, bids: &OrderedMarketEventList) -> Option<MatchResult> {
    let is_market = matches!(offer.order_type, OrderType::Market);
    let crossing_price = offer.crossing_price();

    let mut remaining_qty = offer.remaining_qty;
    let mut cum_price = Decimal::ZERO;
    let mut cum_qty: u64 = 0;
    let mut consumed = Vec::new();

    for bid in bids.iter() {
        let exec_price = if is_market { bid.order_price } else { offer.order_price };

        if bid.order_price >= crossing_price && bid.client_id != offer.client_id {
            if bid.remaining_qty >= remaining_qty {
                cum_price += exec_price * Decimal::from(remaining_qty);
                cum_qty += remaining_qty;
                consumed.push(Consumption {
                    client_order_id: bid.client_order_id.clone(),
                    quantity: remaining_qty,
                });
                return Some(full_fill(offer, cum_price, cum_qty, consumed));
            }
            let filled_qty = bid.remaining_qty;
            cum_price += exec_price * Decimal::from(filled_qty);
            cum_qty += filled_qty;
            remaining_qty -= filled_qty;
            consumed.push(Consumption {
                client_order_id: bid.client_order_id.clone(),
                quantity: filled_qty,
            });
        } else {
            break;
        }
    }

    if cum_qty > 0 {
        return Some(partial_fill(offer, cum_price, cum_qty, remaining_qty, consumed));
    }

    None
}

fn full_fill(
    order: &MarketEvent,
    cum_price: Decimal,
    cum_qty: u64,
    consumed: Vec<Consumption>,
) -> MatchResult {
    let execution_price = cum_price / Decimal::from(cum_qty);
    let avg_price = lifetime_avg_price(order, cum_price, cum_qty);

    MatchResult {
        event: order.filled(order.cum_qty + cum_qty, cum_qty, execution_price, avg_price),
        consumed,
    }
}

fn partial_fill(
    order: &MarketEvent,
    cum_price: Decimal,
    cum_qty: u64,
    remaining_qty: u64,
    consumed: Vec<Consumption>,
) -> MatchResult {
    let execution_price = cum_price / Decimal::from(cum_qty);
    let avg_price = lifetime_avg_price(order, cum_price, cum_qty);

    MatchResult {
        event: order.partially_filled(
            order.cum_qty + cum_qty,
            cum_qty,
            execution_price,
            avg_price,
            remaining_qty,
        ),
        consumed,
    }
}

/// Recompute the order's lifetime volume-weighted average price after this
/// match. Never reset; prior fills keep their weight.
fn lifetime_avg_price(order: &MarketEvent, cum_price: Decimal, cum_qty: u64) -> Decimal {
    let prior_cum_qty = Decimal::from(order.cum_qty);
    (order.avg_price * prior_cum_qty + cum_price) / (Decimal::from(cum_qty) + prior_cum_qty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_event::EventKind;
    use crate::ordered_list::SortDirection;
    use crate::OrderType;
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;

    fn ts() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2011, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn limit_bid(price: Decimal, qty: u64, client: &str, id: &str) -> MarketEvent {
        MarketEvent::bid(price, qty, id, ts(), client, OrderType::Limit, "VOD.L", None)
    }

    fn limit_offer(price: Decimal, qty: u64, client: &str, id: &str) -> MarketEvent {
        MarketEvent::offer(price, qty, id, ts(), client, OrderType::Limit, "VOD.L", None)
    }

    fn offers_from(entries: &[MarketEvent]) -> OrderedMarketEventList {
        let mut list = OrderedMarketEventList::new(SortDirection::Ascending);
        for e in entries {
            list.insert(e.clone());
        }
        list
    }

    fn bids_from(entries: &[MarketEvent]) -> OrderedMarketEventList {
        let mut list = OrderedMarketEventList::new(SortDirection::Descending);
        for e in entries {
            list.insert(e.clone());
        }
        list
    }

    #[test]
    fn bid_partially_fills_against_single_crossing_offer() {
        let bid = limit_bid(dec!(1.2050), 100, "A", "bid-1");
        let offers = offers_from(&[
            limit_offer(dec!(1.2049), 60, "B", "off-1"),
            limit_offer(dec!(1.2051), 80, "C", "off-2"),
        ]);

        let result = match_bid(&bid, &offers).unwrap();
        assert_eq!(result.event.kind, EventKind::PartialFill);
        assert_eq!(result.event.cum_qty, 60);
        assert_eq!(result.event.exec_price, dec!(1.2049));
        assert_eq!(result.event.remaining_qty, 40);
        // The 1.2051 offer does not cross and is never touched.
        assert_eq!(result.consumed.len(), 1);
        assert_eq!(result.consumed[0].client_order_id, "off-1");
    }

    #[test]
    fn bid_fully_fills_and_leaves_the_offer_resting() {
        let bid = limit_bid(dec!(1.2050), 100, "A", "bid-1");
        let offers = offers_from(&[limit_offer(dec!(1.2048), 150, "B", "off-1")]);

        let result = match_bid(&bid, &offers).unwrap();
        assert_eq!(result.event.kind, EventKind::Fill);
        assert_eq!(result.event.cum_qty, 100);
        assert_eq!(result.event.exec_price, dec!(1.2048));
        assert_eq!(result.event.remaining_qty, 0);
        // Only the consumed quantity is reported; the offer itself stays in
        // the book for the caller to reduce.
        assert_eq!(
            result.consumed,
            vec![Consumption {
                client_order_id: "off-1".into(),
                quantity: 100
            }]
        );
    }

    #[test]
    fn own_order_at_best_price_blocks_the_match() {
        let bid = limit_bid(dec!(10.00), 50, "A", "bid-1");
        let offers = offers_from(&[limit_offer(dec!(9.90), 50, "A", "off-own")]);

        assert!(match_bid(&bid, &offers).is_none());
    }

    #[test]
    fn own_order_blocks_even_with_other_offers_behind_it() {
        let bid = limit_bid(dec!(10.00), 50, "A", "bid-1");
        let offers = offers_from(&[
            limit_offer(dec!(9.90), 50, "A", "off-own"),
            limit_offer(dec!(9.95), 50, "B", "off-other"),
        ]);

        // The own order occupies the best slot; the scan halts there.
        assert!(match_bid(&bid, &offers).is_none());
    }

    #[test]
    fn bid_sweeps_multiple_levels_at_weighted_average() {
        let bid = limit_bid(dec!(1.21), 100, "A", "bid-1");
        let offers = offers_from(&[
            limit_offer(dec!(1.20), 40, "B", "off-1"),
            limit_offer(dec!(1.21), 60, "C", "off-2"),
        ]);

        let result = match_bid(&bid, &offers).unwrap();
        assert_eq!(result.event.kind, EventKind::Fill);
        // (1.20 * 40 + 1.21 * 60) / 100 = 1.206
        assert_eq!(result.event.exec_price, dec!(1.206));
        assert_eq!(result.event.avg_price, dec!(1.206));
        let total: u64 = result.consumed.iter().map(|c| c.quantity).sum();
        assert_eq!(total, result.event.exec_qty);
    }

    #[test]
    fn avg_price_accumulates_across_successive_matches() {
        // First match: 60 @ 1.20.
        let bid = limit_bid(dec!(1.22), 100, "A", "bid-1");
        let offers = offers_from(&[limit_offer(dec!(1.20), 60, "B", "off-1")]);
        let first = match_bid(&bid, &offers).unwrap();
        assert_eq!(first.event.avg_price, dec!(1.20));

        // The partially filled bid later matches 40 @ 1.22.
        let offers = offers_from(&[limit_offer(dec!(1.22), 40, "C", "off-2")]);
        let second = match_bid(&first.event, &offers).unwrap();
        assert_eq!(second.event.kind, EventKind::Fill);
        assert_eq!(second.event.cum_qty, 100);
        // (1.20 * 60 + 1.22 * 40) / 100 = 1.208
        assert_eq!(second.event.avg_price, dec!(1.208));
        // This match alone executed at 1.22.
        assert_eq!(second.event.exec_price, dec!(1.22));
    }

    #[test]
    fn market_bid_crosses_any_offer_price() {
        let bid = MarketEvent::bid(
            Decimal::ZERO,
            30,
            "bid-1",
            ts(),
            "A",
            OrderType::Market,
            "VOD.L",
            None,
        );
        let offers = offers_from(&[limit_offer(dec!(999.99), 30, "B", "off-1")]);

        let result = match_bid(&bid, &offers).unwrap();
        assert_eq!(result.event.kind, EventKind::Fill);
        assert_eq!(result.event.exec_price, dec!(999.99));
    }

    #[test]
    fn no_crossing_offer_means_no_fill() {
        let bid = limit_bid(dec!(1.2040), 100, "A", "bid-1");
        let offers = offers_from(&[limit_offer(dec!(1.2041), 100, "B", "off-1")]);

        assert!(match_bid(&bid, &offers).is_none());
    }

    #[test]
    fn limit_offer_executes_at_its_own_price() {
        let offer = limit_offer(dec!(1.2040), 100, "A", "off-1");
        let bids = bids_from(&[limit_bid(dec!(1.2045), 100, "B", "bid-1")]);

        let result = match_offer(&offer, &bids).unwrap();
        assert_eq!(result.event.kind, EventKind::Fill);
        // The offer asked 1.2040 and that is what it gets, even though the
        // resting bid offered more.
        assert_eq!(result.event.exec_price, dec!(1.2040));
    }

    #[test]
    fn market_offer_executes_at_resting_bid_prices() {
        let offer = MarketEvent::offer(
            Decimal::ZERO,
            100,
            "off-1",
            ts(),
            "A",
            OrderType::Market,
            "VOD.L",
            None,
        );
        let bids = bids_from(&[
            limit_bid(dec!(1.2045), 60, "B", "bid-1"),
            limit_bid(dec!(1.2040), 40, "C", "bid-2"),
        ]);

        let result = match_offer(&offer, &bids).unwrap();
        assert_eq!(result.event.kind, EventKind::Fill);
        // (1.2045 * 60 + 1.2040 * 40) / 100 = 1.2043
        assert_eq!(result.event.exec_price, dec!(1.2043));
    }

    #[test]
    fn offer_below_all_bids_does_not_fill() {
        let offer = limit_offer(dec!(1.2050), 100, "A", "off-1");
        let bids = bids_from(&[limit_bid(dec!(1.2045), 100, "B", "bid-1")]);

        assert!(match_offer(&offer, &bids).is_none());
    }

    #[test]
    fn consumed_quantities_equal_exec_qty() {
        let offer = limit_offer(dec!(1.2040), 90, "A", "off-1");
        let bids = bids_from(&[
            limit_bid(dec!(1.2045), 30, "B", "bid-1"),
            limit_bid(dec!(1.2042), 30, "C", "bid-2"),
            limit_bid(dec!(1.2041), 10, "D", "bid-3"),
        ]);

        let result = match_offer(&offer, &bids).unwrap();
        assert_eq!(result.event.kind, EventKind::PartialFill);
        let total: u64 = result.consumed.iter().map(|c| c.quantity).sum();
        assert_eq!(total, result.event.exec_qty);
        assert_eq!(result.event.remaining_qty, 90 - total);
    }
}
