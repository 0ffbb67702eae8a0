//! Symbol list: the tickers requested for a run.
//!
//! The list arrives as newline-separated text. Entries are trimmed, blank
//! lines and `#` comments are dropped, duplicates collapse, and the result
//! is processed in ascending lexicographic order.

use std::collections::BTreeSet;

/// Deduplicated, sorted, case-sensitive tickers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolList {
    symbols: Vec<String>,
}

impl SymbolList {
    /// Parse newline-separated symbol text.
    pub fn parse(text: &str) -> Self {
        let set: BTreeSet<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();

        Self {
            symbols: set.into_iter().collect(),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for SymbolList {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let text: Vec<&str> = iter.into_iter().collect();
        Self::parse(&text.join("\n"))
    }
}
