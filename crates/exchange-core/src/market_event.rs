//! Market events: the value types exchanged throughout the exchange.
//!
//! One struct covers all four event kinds (bid, offer, fill, partial fill)
//! with a [`EventKind`] tag. The fill-specific fields (`cum_qty`,
//! `exec_qty`, `exec_price`, `avg_price`) stay zero on plain bid/offer
//! events, which keeps the matching engine's signatures uniform without an
//! inheritance hierarchy.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::order_type::OrderType;
use crate::side::Side;

/// Which kind of market event this is.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A resting (or to-be-rested) buy order.
    Bid,
    /// A resting (or to-be-rested) sell order.
    Offer,
    /// A complete execution: the order's remaining quantity reached zero.
    Fill,
    /// A partial execution: some quantity matched, the rest is outstanding.
    PartialFill,
}

/// Update action carried by an event, ordinal-encoded on the wire
/// (0 = add, 1 = change, 2 = delete).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Add,
    Change,
    Delete,
}

impl Action {
    /// Ordinal used by the market-data update-action field.
    pub fn ordinal(self) -> u8 {
        match self {
            Action::Add => 0,
            Action::Change => 1,
            Action::Delete => 2,
        }
    }
}

/// An event happening in the market: a new bid or offer, or a full or
/// partial execution.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    pub kind: EventKind,
    pub side: Side,
    pub order_type: OrderType,
    pub action: Action,

    /// Limit price. Market orders carry the side's sentinel price so they
    /// cross any resting price (see [`MarketEvent::market_sentinel`]).
    pub order_price: Decimal,
    /// Original order quantity.
    pub order_qty: u64,
    /// Quantity still open. Equals `order_qty - cum_qty` for a live order,
    /// zero for a [`EventKind::Fill`].
    pub remaining_qty: u64,
    /// Cumulative filled quantity across the order's life.
    pub cum_qty: u64,
    /// Volume-weighted average fill price across the order's life.
    pub avg_price: Decimal,
    /// Price of this specific execution (fills only).
    pub exec_price: Decimal,
    /// Quantity of this specific execution (fills only).
    pub exec_qty: u64,

    pub client_order_id: String,
    /// Owning client, used for self-trade prevention.
    pub client_id: String,
    pub symbol: String,
    pub account: Option<String>,
    pub transact_time: NaiveDateTime,
}

impl MarketEvent {
    /// Sentinel price for a market order: crosses every resting price on
    /// the opposing side.
    pub fn market_sentinel(side: Side) -> Decimal {
        match side {
            Side::Buy => Decimal::MAX,
            Side::Sell => Decimal::MIN,
        }
    }

    /// Create a bid event. Remaining quantity starts at the order quantity.
    #[allow(clippy::too_many_arguments)]
    pub fn bid(
        order_price: Decimal,
        order_qty: u64,
        client_order_id: impl Into<String>,
        transact_time: NaiveDateTime,
        client_id: impl Into<String>,
        order_type: OrderType,
        symbol: impl Into<String>,
        account: Option<String>,
    ) -> Self {
        Self::order(
            EventKind::Bid,
            Side::Buy,
            order_price,
            order_qty,
            client_order_id,
            transact_time,
            client_id,
            order_type,
            symbol,
            account,
        )
    }

    /// Create an offer event. Remaining quantity starts at the order quantity.
    #[allow(clippy::too_many_arguments)]
    pub fn offer(
        order_price: Decimal,
        order_qty: u64,
        client_order_id: impl Into<String>,
        transact_time: NaiveDateTime,
        client_id: impl Into<String>,
        order_type: OrderType,
        symbol: impl Into<String>,
        account: Option<String>,
    ) -> Self {
        Self::order(
            EventKind::Offer,
            Side::Sell,
            order_price,
            order_qty,
            client_order_id,
            transact_time,
            client_id,
            order_type,
            symbol,
            account,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn order(
        kind: EventKind,
        side: Side,
        order_price: Decimal,
        order_qty: u64,
        client_order_id: impl Into<String>,
        transact_time: NaiveDateTime,
        client_id: impl Into<String>,
        order_type: OrderType,
        symbol: impl Into<String>,
        account: Option<String>,
    ) -> Self {
        let order_price = match order_type {
            OrderType::Market => Self::market_sentinel(side),
            OrderType::Limit => order_price,
        };
        MarketEvent {
            kind,
            side,
            order_type,
            action: Action::Add,
            order_price,
            order_qty,
            remaining_qty: order_qty,
            cum_qty: 0,
            avg_price: Decimal::ZERO,
            exec_price: Decimal::ZERO,
            exec_qty: 0,
            client_order_id: client_order_id.into(),
            client_id: client_id.into(),
            symbol: symbol.into(),
            account,
            transact_time,
        }
    }

    /// The full execution of this order: remaining quantity drops to zero.
    ///
    /// `cum_qty` is the order's new lifetime cumulative quantity,
    /// `exec_qty`/`exec_price` describe this specific match, `avg_price`
    /// the recomputed lifetime volume-weighted average.
    pub fn filled(
        &self,
        cum_qty: u64,
        exec_qty: u64,
        exec_price: Decimal,
        avg_price: Decimal,
    ) -> MarketEvent {
        let mut fill = self.clone();
        fill.kind = EventKind::Fill;
        fill.action = Action::Add;
        fill.remaining_qty = 0;
        fill.cum_qty = cum_qty;
        fill.exec_qty = exec_qty;
        fill.exec_price = exec_price;
        fill.avg_price = avg_price;
        fill
    }

    /// A partial execution of this order: `remaining_qty` stays above zero.
    pub fn partially_filled(
        &self,
        cum_qty: u64,
        exec_qty: u64,
        exec_price: Decimal,
        avg_price: Decimal,
        remaining_qty: u64,
    ) -> MarketEvent {
        let mut fill = self.filled(cum_qty, exec_qty, exec_price, avg_price);
        fill.kind = EventKind::PartialFill;
        fill.remaining_qty = remaining_qty;
        fill
    }

    /// Same event with a different update action.
    pub fn with_action(mut self, action: Action) -> MarketEvent {
        self.action = action;
        self
    }

    /// The price boundary beyond which this order no longer matches: its
    /// limit price, or the side's sentinel for market orders.
    pub fn crossing_price(&self) -> Decimal {
        match self.order_type {
            OrderType::Market => Self::market_sentinel(self.side),
            OrderType::Limit => self.order_price,
        }
    }

    /// True for [`EventKind::Fill`] and [`EventKind::PartialFill`].
    pub fn is_execution(&self) -> bool {
        matches!(self.kind, EventKind::Fill | EventKind::PartialFill)
    }

    /// Consume matched quantity from a resting order: remaining goes down,
    /// lifetime cumulative goes up.
    pub(crate) fn consume(&mut self, qty: u64) {
        self.remaining_qty = self.remaining_qty.saturating_sub(qty);
        self.cum_qty += qty;
    }
}
