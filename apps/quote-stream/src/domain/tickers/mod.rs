//! Ticker Subscription Set
//!
//! The client-side list of symbols the stream should be subscribed to.
//! Symbols are opaque and case-sensitive; duplicates are absorbed and
//! insertion order is kept for announcement frames and logs.

/// A ticker symbol (e.g. `AAPL`, `BTC-USD`, `^GSPC`).
pub type Ticker = String;

/// Deduplicated, insertion-ordered set of tickers.
///
/// # Example
///
/// ```rust
/// use quote_stream::domain::tickers::TickerSet;
///
/// let mut tickers = TickerSet::new();
/// assert!(tickers.add(["AAPL", "AAPL", "MSFT"], false));
/// assert_eq!(tickers.len(), 2);
///
/// // Not empty before this call
/// assert!(!tickers.add(["TSLA"], false));
///
/// tickers.remove("MSFT");
/// tickers.remove("");
/// assert!(tickers.is_empty());
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickerSet {
    symbols: Vec<Ticker>,
}

impl TickerSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: Vec::new(),
        }
    }

    /// Merge `symbols` into the set, optionally clearing it first.
    ///
    /// Returns `true` when the set was empty before the merge (after the
    /// optional clear). The connection manager uses this to connect on
    /// the first subscription.
    pub fn add<I, S>(&mut self, symbols: I, clear: bool) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<Ticker>,
    {
        if clear {
            self.symbols.clear();
        }
        let was_empty = self.symbols.is_empty();

        for symbol in symbols {
            let symbol = symbol.into();
            if !self.symbols.contains(&symbol) {
                self.symbols.push(symbol);
            }
        }

        was_empty
    }

    /// Remove one symbol, or every symbol when `symbol` is empty.
    ///
    /// Removing a symbol that is not present is not an error.
    pub fn remove(&mut self, symbol: &str) {
        if symbol.is_empty() {
            self.symbols.clear();
        } else {
            self.symbols.retain(|s| s != symbol);
        }
    }

    /// Remove every symbol.
    pub fn clear(&mut self) {
        self.symbols.clear();
    }

    /// Whether the set has no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether `symbol` is in the set.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }

    /// Symbols as a slice, in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[Ticker] {
        &self.symbols
    }

    /// Owned copy of the symbols.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Ticker> {
        self.symbols.clone()
    }
}

impl<S: Into<Ticker>> FromIterator<S> for TickerSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.add(iter, false);
        set
    }
}

impl<'a> IntoIterator for &'a TickerSet {
    type Item = &'a Ticker;
    type IntoIter = std::slice::Iter<'a, Ticker>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn add_absorbs_duplicates() {
        let mut set = TickerSet::new();
        let was_empty = set.add(["AAPL", "AAPL", "MSFT"], false);

        assert!(was_empty);
        let symbols: HashSet<&str> = set.iter().collect();
        assert_eq!(symbols, HashSet::from(["AAPL", "MSFT"]));
    }

    #[test]
    fn add_reports_non_empty_before() {
        let mut set: TickerSet = ["AAPL"].into_iter().collect();
        assert!(!set.add(["MSFT"], false));
        assert!(!set.add(["AAPL"], false));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn add_with_clear_replaces_contents() {
        let mut set: TickerSet = ["AAPL", "MSFT"].into_iter().collect();
        let was_empty = set.add(["TSLA"], true);

        assert!(was_empty);
        assert_eq!(set.as_slice(), ["TSLA".to_string()]);
    }

    #[test]
    fn add_empty_input_keeps_empty() {
        let mut set = TickerSet::new();
        assert!(set.add(Vec::<String>::new(), false));
        assert!(set.is_empty());
    }

    #[test]
    fn symbols_are_case_sensitive() {
        let set: TickerSet = ["aapl", "AAPL"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains("aapl"));
        assert!(!set.contains("Aapl"));
    }

    #[test]
    fn insertion_order_is_kept() {
        let set: TickerSet = ["MSFT", "AAPL", "MSFT", "GOOG"].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), ["MSFT", "AAPL", "GOOG"]);
    }

    #[test]
    fn remove_single_and_missing() {
        let mut set: TickerSet = ["AAPL", "MSFT"].into_iter().collect();
        set.remove("MSFT");
        set.remove("NFLX");
        assert_eq!(set.to_vec(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn remove_empty_clears_all() {
        let mut set: TickerSet = ["AAPL", "MSFT"].into_iter().collect();
        set.remove("");
        assert!(set.is_empty());
    }
}
