//! Single-instrument order book with price-time priority.
//!
//! - One instance per process, scoped to the configured instrument.
//! - Offers: ascending by price (best = lowest).
//! - Bids: descending by price (best = highest).
//! - FIFO among equal prices.
//!
//! The book is mutated by the replay driver (historical events) and by the
//! order gateway (live orders); all mutation is serialized by the engine
//! task that owns this struct. The matching scan never touches the book; it
//! hands back a [`MatchResult`] and [`OrderBook::apply_match`] applies the
//! consumption.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::market_event::{EventKind, MarketEvent};
use crate::matching::MatchResult;
use crate::ordered_list::{OrderedMarketEventList, SortDirection};
use crate::side::Side;

/// Errors from order-book operations.
#[derive(Debug, Error)]
pub enum BookError {
    #[error("event kind {0:?} cannot rest in the book")]
    NotARestingOrder(EventKind),
}

/// Best price and total quantity at the best price for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookSnapshot {
    pub best_bid: Option<(Decimal, u64)>,
    pub best_offer: Option<(Decimal, u64)>,
}

/// The current state of the market for one instrument.
#[derive(Debug)]
pub struct OrderBook {
    symbol: String,
    bids: OrderedMarketEventList,
    offers: OrderedMarketEventList,
    trades: Vec<MarketEvent>,
}

impl OrderBook {
    /// Create an empty book for the given instrument.
    pub fn new(symbol: impl Into<String>) -> Self {
        OrderBook {
            symbol: symbol.into(),
            bids: OrderedMarketEventList::new(SortDirection::Descending),
            offers: OrderedMarketEventList::new(SortDirection::Ascending),
            trades: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Rest a new bid or offer in its side's list.
    pub fn insert(&mut self, event: MarketEvent) -> Result<(), BookError> {
        match event.kind {
            EventKind::Bid => {
                self.bids.insert(event);
                Ok(())
            }
            EventKind::Offer => {
                self.offers.insert(event);
                Ok(())
            }
            other => Err(BookError::NotARestingOrder(other)),
        }
    }

    /// Apply a full execution to the resting order it refers to: the order
    /// leaves the book and the trade is recorded.
    ///
    /// Returns false when no resting order carries the fill's client order
    /// ID (the historical window may open mid-life of an order).
    pub fn apply_fill(&mut self, fill: &MarketEvent) -> bool {
        let removed = self.side_mut(fill.side).remove(&fill.client_order_id);
        self.trades.push(fill.clone());
        removed.is_some()
    }

    /// Apply a partial execution to the resting order it refers to: its
    /// remaining quantity drops by the executed quantity and the trade is
    /// recorded.
    pub fn apply_partial_fill(&mut self, partial: &MarketEvent) -> bool {
        let updated = match self.side_mut(partial.side).get_mut(&partial.client_order_id) {
            Some(resting) => {
                resting.consume(partial.exec_qty);
                true
            }
            None => false,
        };
        self.trades.push(partial.clone());
        updated
    }

    /// Apply a live match outcome: subtract each consumed quantity from the
    /// opposing side, dropping orders whose remaining quantity reaches
    /// zero, and record the aggressor's trade.
    pub fn apply_match(&mut self, result: &MatchResult) {
        let opposing = self.side_mut(result.event.side.opposite());
        for consumption in &result.consumed {
            if let Some(resting) = opposing.get_mut(&consumption.client_order_id) {
                resting.consume(consumption.quantity);
                if resting.remaining_qty == 0 {
                    opposing.remove(&consumption.client_order_id);
                }
            }
        }
        self.trades.push(result.event.clone());
    }

    /// Remove a resting order (cancel, historical delete or expiry).
    pub fn remove(&mut self, side: Side, client_order_id: &str) -> Option<MarketEvent> {
        self.side_mut(side).remove(client_order_id)
    }

    /// Highest bid price currently in the book.
    pub fn best_bid_price(&self) -> Option<Decimal> {
        self.bids.best().map(|e| e.order_price)
    }

    /// Lowest offer price currently in the book.
    pub fn best_offer_price(&self) -> Option<Decimal> {
        self.offers.best().map(|e| e.order_price)
    }

    /// Read-only snapshot of the top of the book: best price and the total
    /// resting quantity at that price, per side.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            best_bid: Self::top_of(&self.bids),
            best_offer: Self::top_of(&self.offers),
        }
    }

    pub fn bids(&self) -> &OrderedMarketEventList {
        &self.bids
    }

    pub fn offers(&self) -> &OrderedMarketEventList {
        &self.offers
    }

    /// Every fill and partial fill recorded against this book, in order.
    pub fn trades(&self) -> &[MarketEvent] {
        &self.trades
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderedMarketEventList {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.offers,
        }
    }

    fn top_of(list: &OrderedMarketEventList) -> Option<(Decimal, u64)> {
        let best_price = list.best()?.order_price;
        let qty = list
            .iter()
            .take_while(|e| e.order_price == best_price)
            .map(|e| e.remaining_qty)
            .sum();
        Some((best_price, qty))
    }
}
