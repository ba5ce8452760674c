use crate::pipelines::astock::read_bars;
use crate::types::{PriceBar, SeriesDocument, BUY_PRICE, CLOSE, OPEN, SELL_PRICE};
use crate::{AppError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read access to per-symbol bars, as the prompt layer needs it.
pub trait PriceSource: Send + Sync {
    fn bar(&self, symbol: &str, timestamp: &str) -> Option<PriceBar>;

    /// Every timestamp with at least one bar, ascending.
    fn timestamps(&self) -> &BTreeSet<String>;

    fn symbols(&self) -> Vec<String>;

    fn display_name(&self, _symbol: &str) -> Option<String> {
        None
    }

    /// Greatest stored timestamp strictly before `timestamp`.
    fn previous_timestamp(&self, timestamp: &str) -> Option<String> {
        let key = normalize_timestamp(timestamp);
        self.timestamps().range(..key).next_back().cloned()
    }
}

/// `YYYY-MM-DD HH:MM` gains `:00` seconds; other forms are trimmed only.
pub fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 16 && trimmed.as_bytes().get(10) == Some(&b' ') {
        format!("{}:00", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Default, Clone)]
pub struct PriceStore {
    bars: HashMap<String, BTreeMap<String, PriceBar>>,
    timestamps: BTreeSet<String>,
    names: HashMap<String, String>,
}

impl PriceStore {
    pub fn insert(&mut self, symbol: &str, timestamp: &str, bar: PriceBar) {
        let ts = normalize_timestamp(timestamp);
        self.timestamps.insert(ts.clone());
        self.bars.entry(symbol.to_string()).or_default().insert(ts, bar);
    }

    pub fn set_name(&mut self, symbol: &str, name: &str) {
        if !name.is_empty() {
            self.names.insert(symbol.to_string(), name.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn add_document(&mut self, doc: &SeriesDocument) -> Result<()> {
        let symbol = doc
            .symbol()
            .ok_or_else(|| AppError::Validation("Document without '2. Symbol'".to_string()))?
            .to_string();
        for (ts, bar) in &doc.time_series {
            let field = |keys: [&str; 2]| {
                keys.iter()
                    .find_map(|k| bar.get(*k))
                    .and_then(|v| v.trim().parse::<f64>().ok())
            };
            self.insert(
                &symbol,
                ts,
                PriceBar {
                    open: field([BUY_PRICE, OPEN]),
                    close: field([SELL_PRICE, CLOSE]),
                },
            );
        }
        Ok(())
    }

    /// Loads a merged JSONL of daily documents; lines that do not parse as a
    /// document are logged and skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let reader = BufReader::new(std::fs::File::open(path).map_err(|e| {
            AppError::NotFound(format!("Price file {}: {}", path.display(), e))
        })?);

        let mut store = Self::default();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<SeriesDocument>(&line)
                .map_err(AppError::from)
                .and_then(|doc| store.add_document(&doc));
            if let Err(e) = parsed {
                tracing::warn!("Skipping line {} of {}: {}", line_num, path.display(), e);
            }
        }

        tracing::debug!(
            "Loaded {} symbols / {} timestamps from {}",
            store.bars.len(),
            store.timestamps.len(),
            path.display()
        );
        Ok(store)
    }

    /// Loads the A-share hourly CSV; rows that do not parse are logged and
    /// skipped.
    pub fn from_astock_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "Price file {} does not exist",
                path.display()
            )));
        }

        let mut store = Self::default();
        for bar in read_bars(path)? {
            store.insert(
                &bar.stock_code,
                &bar.trade_date,
                PriceBar {
                    open: bar.open,
                    close: bar.close,
                },
            );
            store.set_name(&bar.stock_code, &bar.stock_name);
        }
        Ok(store)
    }
}

impl PriceSource for PriceStore {
    fn bar(&self, symbol: &str, timestamp: &str) -> Option<PriceBar> {
        self.bars
            .get(symbol)?
            .get(&normalize_timestamp(timestamp))
            .copied()
    }

    fn timestamps(&self) -> &BTreeSet<String> {
        &self.timestamps
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.bars.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn display_name(&self, symbol: &str) -> Option<String> {
        self.names.get(symbol).cloned()
    }
}
