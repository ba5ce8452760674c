//! Merges per-symbol NASDAQ-100 daily files into `merged.jsonl`.

use crate::types::{BUY_PRICE, CLOSE, META_DATA, OPEN, SELL_PRICE, TIME_SERIES_PREFIX};
use crate::Result;
use serde_json::{Map, Value};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MERGED_FILE: &str = "merged.jsonl";
const FILE_PREFIX: &str = "daily_price";
const MERGED_INFORMATION: &str = "Daily Prices (buy price, high, low, sell price) and Volumes";

pub const NASDAQ_100_SYMBOLS: [&str; 101] = [
    "NVDA", "MSFT", "AAPL", "GOOG", "GOOGL", "AMZN", "META", "AVGO", "TSLA", "NFLX", "PLTR",
    "COST", "ASML", "AMD", "CSCO", "AZN", "TMUS", "MU", "LIN", "PEP", "SHOP", "APP", "INTU",
    "AMAT", "LRCX", "PDD", "QCOM", "ARM", "INTC", "BKNG", "AMGN", "TXN", "ISRG", "GILD", "KLAC",
    "PANW", "ADBE", "HON", "CRWD", "CEG", "ADI", "ADP", "DASH", "CMCSA", "VRTX", "MELI", "SBUX",
    "CDNS", "ORLY", "SNPS", "MSTR", "MDLZ", "ABNB", "MRVL", "CTAS", "TRI", "MAR", "MNST", "CSX",
    "ADSK", "PYPL", "FTNT", "AEP", "WDAY", "REGN", "ROP", "NXPI", "DDOG", "AXON", "ROST", "IDXX",
    "EA", "PCAR", "FAST", "EXC", "TTWO", "XEL", "ZS", "PAYX", "WBD", "BKR", "CPRT", "CCEP",
    "FANG", "TEAM", "CHTR", "KDP", "MCHP", "GEHC", "VRSK", "CTSH", "CSGP", "KHC", "ODFL", "DXCM",
    "TTD", "ON", "BIIB", "LULU", "CDW", "GFS",
];

pub fn nasdaq_100_symbols() -> Vec<String> {
    NASDAQ_100_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

/// Symbol encoded in `daily_price_<SYM>.json` / `daily_prices_<SYM>.json`.
pub fn symbol_from_file_name(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(".json")?;
    let rest = stem.strip_prefix(FILE_PREFIX)?;
    let rest = rest.strip_prefix('s').unwrap_or(rest);
    rest.strip_prefix('_').filter(|s| !s.is_empty())
}

/// Renames open/close to buy/sell price in every bar and reduces the most
/// recent bar to its buy price. Returns `false` (document untouched) when no
/// non-empty `Time Series*` object is present.
pub fn transform_document(doc: &mut Value) -> bool {
    let Some(root) = doc.as_object_mut() else {
        return false;
    };

    let Some(series_key) = root
        .keys()
        .find(|k| k.starts_with(TIME_SERIES_PREFIX))
        .cloned()
    else {
        return false;
    };

    let Some(series) = root.get_mut(&series_key).and_then(Value::as_object_mut) else {
        return false;
    };
    if series.is_empty() {
        return false;
    }

    for bar in series.values_mut() {
        let Some(bar) = bar.as_object_mut() else { continue };
        if let Some(open) = bar.remove(OPEN) {
            bar.insert(BUY_PRICE.to_string(), open);
        }
        if let Some(close) = bar.remove(CLOSE) {
            bar.insert(SELL_PRICE.to_string(), close);
        }
    }

    if let Some(latest) = series.keys().max().cloned() {
        let buy = series
            .get(&latest)
            .and_then(|bar| bar.get(BUY_PRICE))
            .cloned();
        let mut reduced = Map::new();
        if let Some(buy) = buy {
            reduced.insert(BUY_PRICE.to_string(), buy);
        }
        series.insert(latest, Value::Object(reduced));
    }

    if let Some(meta) = root.get_mut(META_DATA).and_then(Value::as_object_mut) {
        meta.insert(
            "1. Information".to_string(),
            Value::String(MERGED_INFORMATION.to_string()),
        );
    }

    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NasdaqMergeSummary {
    pub written: usize,
    /// Files whose symbol is not a constituent.
    pub ignored: usize,
    /// Constituent files that could not be read or parsed.
    pub failed: usize,
}

/// Writes every constituent file in `dir` as one JSON line of `output`.
pub fn merge_nasdaq_jsonl(dir: &Path, output: &Path, symbols: &[String]) -> Result<NasdaqMergeSummary> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"))
        })
        .collect();
    files.sort();

    let mut out = BufWriter::new(std::fs::File::create(output)?);
    let mut summary = NasdaqMergeSummary::default();

    for path in &files {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let is_constituent = symbol_from_file_name(name)
            .is_some_and(|sym| symbols.iter().any(|s| s == sym));
        if !is_constituent {
            summary.ignored += 1;
            continue;
        }

        let mut doc = match read_document(path) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", name, e);
                summary.failed += 1;
                continue;
            }
        };
        if !transform_document(&mut doc) {
            tracing::warn!("Unexpected layout in {}, writing as is", name);
        }

        writeln!(out, "{}", serde_json::to_string(&doc)?)?;
        summary.written += 1;
    }
    out.flush()?;

    tracing::info!(
        "Merged {} NASDAQ-100 files into {} ({} ignored, {} failed)",
        summary.written,
        output.display(),
        summary.ignored,
        summary.failed
    );
    Ok(summary)
}

fn read_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Value {
        json!({
            "Meta Data": { "1. Information": "Daily Prices (open, high, low, close) and Volumes", "2. Symbol": "AAPL" },
            "Time Series (Daily)": {
                "2025-10-30": { "1. open": "270.1", "2. high": "272.0", "3. low": "268.5", "4. close": "271.4", "5. volume": "100" },
                "2025-10-31": { "1. open": "272.0", "2. high": "275.0", "3. low": "271.0", "4. close": "274.2", "5. volume": "120" }
            }
        })
    }

    #[test]
    fn extracts_symbol_from_both_prefixes() {
        assert_eq!(symbol_from_file_name("daily_prices_AAPL.json"), Some("AAPL"));
        assert_eq!(symbol_from_file_name("daily_price_GOOGL.json"), Some("GOOGL"));
        assert_eq!(symbol_from_file_name("daily_prices_.json"), None);
        assert_eq!(symbol_from_file_name("merged.jsonl"), None);
    }

    #[test]
    fn renames_and_reduces_latest_bar() {
        let mut doc = sample();
        assert!(transform_document(&mut doc));

        let series = &doc["Time Series (Daily)"];
        assert_eq!(series["2025-10-30"]["1. buy price"], "270.1");
        assert_eq!(series["2025-10-30"]["4. sell price"], "271.4");
        assert!(series["2025-10-30"].get("1. open").is_none());
        assert_eq!(series["2025-10-31"], json!({ "1. buy price": "272.0" }));
        assert_eq!(doc["Meta Data"]["1. Information"], MERGED_INFORMATION);
    }

    #[test]
    fn abnormal_documents_are_left_alone() {
        let mut doc = json!({ "Information": "rate limited" });
        let before = doc.clone();
        assert!(!transform_document(&mut doc));
        assert_eq!(doc, before);
    }

    #[test]
    fn merge_filters_to_constituents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("daily_prices_AAPL.json"), sample().to_string()).unwrap();
        std::fs::write(dir.path().join("daily_prices_GOOG.json"), sample().to_string()).unwrap();
        std::fs::write(dir.path().join("daily_prices_QQQ.json"), sample().to_string()).unwrap();

        let output = dir.path().join(MERGED_FILE);
        let summary = merge_nasdaq_jsonl(dir.path(), &output, &nasdaq_100_symbols()).unwrap();

        assert_eq!(summary, NasdaqMergeSummary { written: 2, ignored: 1, failed: 0 });
        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l.contains("1. buy price")));
    }

    #[test]
    fn broken_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("daily_prices_AAPL.json"), sample().to_string()).unwrap();
        std::fs::write(dir.path().join("daily_prices_AMZN.json"), "{\"Meta Data\":").unwrap();
        std::fs::write(dir.path().join("daily_prices_MSFT.json"), sample().to_string()).unwrap();

        let output = dir.path().join(MERGED_FILE);
        let summary = merge_nasdaq_jsonl(dir.path(), &output, &nasdaq_100_symbols()).unwrap();

        assert_eq!(summary, NasdaqMergeSummary { written: 2, ignored: 0, failed: 1 });
        assert_eq!(std::fs::read_to_string(&output).unwrap().lines().count(), 2);
    }
}
