//! Price and position lookups backing the agent prompts.

pub mod positions;
pub mod price_store;
pub mod universe;

pub use positions::{PositionLog, CASH};
pub use price_store::{normalize_timestamp, PriceSource, PriceStore};
pub use universe::{forex_default_pairs, nasdaq_100_symbols, sse_50_symbols};

use std::collections::BTreeMap;

/// `<SYMBOL>_price -> value`, ordered by key.
pub type PriceMap = BTreeMap<String, f64>;

pub fn price_key(symbol: &str) -> String {
    format!("{}_price", symbol)
}

fn symbol_of(key: &str) -> &str {
    key.strip_suffix("_price").unwrap_or(key)
}

/// Buy (open) prices at `timestamp` for the symbols that have one.
pub fn open_prices(source: &dyn PriceSource, timestamp: &str, symbols: &[String]) -> PriceMap {
    symbols
        .iter()
        .filter_map(|s| {
            let open = source.bar(s, timestamp)?.open?;
            Some((price_key(s), open))
        })
        .collect()
}

/// Buy and sell prices of the period before `timestamp`.
pub fn previous_open_close(
    source: &dyn PriceSource,
    timestamp: &str,
    symbols: &[String],
) -> (PriceMap, PriceMap) {
    let Some(previous) = source.previous_timestamp(timestamp) else {
        tracing::warn!("No price period before {}", timestamp);
        return (PriceMap::new(), PriceMap::new());
    };

    let mut buy = PriceMap::new();
    let mut sell = PriceMap::new();
    for symbol in symbols {
        let Some(bar) = source.bar(symbol, &previous) else { continue };
        if let Some(open) = bar.open {
            buy.insert(price_key(symbol), open);
        }
        if let Some(close) = bar.close {
            sell.insert(price_key(symbol), close);
        }
    }
    (buy, sell)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodProfit {
    pub by_symbol: BTreeMap<String, f64>,
    pub total: f64,
}

/// `(sell - buy) × held quantity` per symbol over the previous period.
pub fn period_profit(
    buy: &PriceMap,
    sell: &PriceMap,
    positions: &BTreeMap<String, f64>,
    symbols: &[String],
) -> PeriodProfit {
    let mut profit = PeriodProfit::default();
    for symbol in symbols {
        let key = price_key(symbol);
        let (Some(open), Some(close)) = (buy.get(&key), sell.get(&key)) else {
            continue;
        };
        let qty = positions.get(symbol).copied().unwrap_or(0.0);
        let value = (close - open) * qty;
        profit.by_symbol.insert(symbol.clone(), value);
        profit.total += value;
    }
    profit
}

/// Re-keys a price map to `<SYMBOL> (<name>)_price` where a name is known.
pub fn with_names(source: &dyn PriceSource, prices: &PriceMap) -> PriceMap {
    prices
        .iter()
        .map(|(key, value)| {
            let symbol = symbol_of(key);
            let key = match source.display_name(symbol) {
                Some(name) => format!("{} ({})_price", symbol, name),
                None => key.clone(),
            };
            (key, *value)
        })
        .collect()
}
