//! Side (Buy / Sell) for orders and market events.

/// Order side: Buy or Sell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side of the book an aggressor on this side matches against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// FIX char representation (`'1'` = buy, `'2'` = sell).
    pub fn as_fix_char(self) -> char {
        match self {
            Side::Buy => '1',
            Side::Sell => '2',
        }
    }

    /// Parse from a FIX char. `'5'` (sell short) is treated as a plain
    /// sell; the book does not track short positions.
    pub fn from_fix_char(c: char) -> Option<Self> {
        match c {
            '1' => Some(Side::Buy),
            '2' | '5' => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}
