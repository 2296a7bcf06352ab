//! exchange-core
//!
//! Pure exchange logic:
//! - market events (bid / offer / fill / partial fill)
//! - price-ordered event lists
//! - single-instrument order book
//! - matching engine (price-time priority, full and partial fills)

pub mod market_event;
pub mod matching;
pub mod order_book;
pub mod order_type;
pub mod ordered_list;
pub mod side;

pub use market_event::{Action, EventKind, MarketEvent};
pub use matching::{match_bid, match_offer, Consumption, MatchResult};
pub use order_book::{BookError, BookSnapshot, OrderBook};
pub use order_type::OrderType;
pub use ordered_list::{OrderedMarketEventList, SortDirection};
pub use side::Side;
