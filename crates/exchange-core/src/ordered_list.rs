//! Price-ordered market event list.
//!
//! One list holds one side of the book: offers sorted ascending (best price
//! first) or bids sorted descending (best price first). At equal prices,
//! arrival order is preserved, which together with the price sort gives the
//! book price-time priority.

use rust_decimal::Decimal;

use crate::market_event::MarketEvent;

/// Sort direction of a list.
///
/// Ascending is used for offers, descending for bids; either way index 0
/// holds the best price.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// True when `existing` sorts strictly after `candidate` under this
    /// direction (i.e. `existing` is a strictly worse price).
    fn sorts_after(self, existing: Decimal, candidate: Decimal) -> bool {
        match self {
            SortDirection::Ascending => existing > candidate,
            SortDirection::Descending => existing < candidate,
        }
    }
}

/// A sequence of same-side market events kept sorted by price.
#[derive(Debug, Clone)]
pub struct OrderedMarketEventList {
    direction: SortDirection,
    events: Vec<MarketEvent>,
}

impl OrderedMarketEventList {
    /// Create an empty list with the given sort direction.
    pub fn new(direction: SortDirection) -> Self {
        OrderedMarketEventList {
            direction,
            events: Vec::new(),
        }
    }

    /// Insert an event at its sort position.
    ///
    /// Scans from the head for the first strictly worse price and inserts in
    /// front of it; equal prices are passed over, so the new event lands
    /// after the last equal-priced element (FIFO at a price level). Elements
    /// are never deduplicated.
    pub fn insert(&mut self, event: MarketEvent) {
        let position = self
            .events
            .iter()
            .position(|existing| {
                self.direction
                    .sorts_after(existing.order_price, event.order_price)
            })
            .unwrap_or(self.events.len());
        self.events.insert(position, event);
    }

    /// Iterate in list order: best price first, then first-arrived first.
    pub fn iter(&self) -> std::slice::Iter<'_, MarketEvent> {
        self.events.iter()
    }

    /// Best-priced event, if any.
    pub fn best(&self) -> Option<&MarketEvent> {
        self.events.first()
    }

    /// Find a resting event by client order ID.
    pub fn get(&self, client_order_id: &str) -> Option<&MarketEvent> {
        self.events
            .iter()
            .find(|e| e.client_order_id == client_order_id)
    }

    /// Mutable lookup by client order ID.
    pub fn get_mut(&mut self, client_order_id: &str) -> Option<&mut MarketEvent> {
        self.events
            .iter_mut()
            .find(|e| e.client_order_id == client_order_id)
    }

    /// Remove the first event with the given client order ID, returning it.
    pub fn remove(&mut self, client_order_id: &str) -> Option<MarketEvent> {
        let position = self
            .events
            .iter()
            .position(|e| e.client_order_id == client_order_id)?;
        Some(self.events.remove(position))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
