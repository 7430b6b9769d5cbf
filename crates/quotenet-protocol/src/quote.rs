//! The price-quote message exchanged on gossip topics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single price quote for a trading pair.
///
/// Both fields are free-form strings; the network does not interpret
/// them. Field names are part of the wire format (`pair`, `price`).
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Trading pair, e.g. `BTC/USDT`.
    pub pair: String,
    /// Quoted price, kept as text to avoid lossy float conversion.
    pub price: String,
}

impl PriceQuote {
    /// Creates a quote from anything string-like.
    pub fn new(pair: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            price: price.into(),
        }
    }
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pair, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_console_format() {
        let quote = PriceQuote::new("ETH/USD", "3120.55");
        assert_eq!(quote.to_string(), "ETH/USD: 3120.55");
    }
}
