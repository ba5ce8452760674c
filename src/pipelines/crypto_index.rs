//! Synthesizes a fixed-units crypto portfolio index (CD5 by default) in the
//! same daily document layout the equity benchmarks use.
//!
//! Units per constituent are bought once on the base date at its buy price;
//! every later bar values those units at that day's prices. High/low cannot
//! be derived for a portfolio and are emitted as zero.

use crate::types::{
    Bar, SeriesDocument, TimeSeries, BUY_PRICE, CLOSE, HIGH, LOW, META_DATA, OPEN, SELL_PRICE,
    TIME_SERIES_PREFIX, VOLUME,
};
use crate::{AppError, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const INPUT_FILE: &str = "crypto_merged.jsonl";
pub const DEFAULT_TOTAL_VALUE: f64 = 50_000.0;
pub const DEFAULT_BASE_DATE: &str = "2025-11-02";
const WEIGHT_TOLERANCE: f64 = 0.01;

/// One coin's series keyed by display name.
#[derive(Debug, Clone, PartialEq)]
pub struct CryptoSeries {
    pub symbol: String,
    pub name: String,
    pub time_series: TimeSeries,
}

pub type CryptoData = BTreeMap<String, CryptoSeries>;

/// Index definition: constituent weights in percent (display-name keyed).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub weights: Vec<(String, f64)>,
    pub total_value: f64,
    pub base_date: String,
}

impl IndexSpec {
    pub fn cd5() -> Self {
        Self {
            name: "CD5".to_string(),
            weights: vec![
                ("Bitcoin".to_string(), 74.56),
                ("Ethereum".to_string(), 15.97),
                ("Ripple".to_string(), 5.20),
                ("Solana".to_string(), 3.53),
                ("Cardano".to_string(), 0.76),
            ],
            total_value: DEFAULT_TOTAL_VALUE,
            base_date: DEFAULT_BASE_DATE.to_string(),
        }
    }

    pub fn constituents(&self) -> Vec<&str> {
        self.weights.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn output_file_name(&self) -> String {
        format!("{}_crypto_index.json", self.name)
    }
}

pub fn display_name(symbol: &str) -> String {
    match symbol {
        "BTC-USDT" => "Bitcoin",
        "ETH-USDT" => "Ethereum",
        "XRP-USDT" => "Ripple",
        "SOL-USDT" => "Solana",
        "ADA-USDT" => "Cardano",
        "SUI-USDT" => "Sui",
        "LINK-USDT" => "Chainlink",
        "AVAX-USDT" => "Avalanche",
        "LTC-USDT" => "Litecoin",
        "DOT-USDT" => "Polkadot",
        other => return other.replace("-USDT", ""),
    }
    .to_string()
}

/// Reads the merged crypto JSONL. Lines without `Meta Data.2. Symbol` or a
/// `Time Series*` object are skipped; unparsable lines are logged.
pub fn load_crypto_data(path: &Path) -> Result<CryptoData> {
    tracing::info!("Loading crypto data from {}", path.display());
    let reader = BufReader::new(std::fs::File::open(path)?);

    let mut data = CryptoData::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_crypto_line(&line) {
            Ok(Some(series)) => {
                data.insert(series.name.clone(), series);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Error parsing line {}: {}", line_num, e),
        }
    }

    tracing::info!("Loaded data for {} cryptocurrencies", data.len());
    Ok(data)
}

fn parse_crypto_line(line: &str) -> Result<Option<CryptoSeries>> {
    let doc: Value = serde_json::from_str(line)?;
    let Some(symbol) = doc
        .get(META_DATA)
        .and_then(|m| m.get("2. Symbol"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    let Some(series) = doc.as_object().and_then(|root| {
        root.iter()
            .find(|(k, v)| k.starts_with(TIME_SERIES_PREFIX) && v.is_object())
            .and_then(|(_, v)| v.as_object())
    }) else {
        return Ok(None);
    };

    let time_series: TimeSeries = series
        .iter()
        .filter_map(|(ts, bar)| Some((ts.clone(), bar_from_value(bar)?)))
        .collect();
    Ok(Some(CryptoSeries {
        symbol: symbol.to_string(),
        name: display_name(symbol),
        time_series,
    }))
}

/// String and numeric fields of one bar; nulls and nested values are dropped.
fn bar_from_value(bar: &Value) -> Option<Bar> {
    let fields = bar.as_object()?;
    Some(
        fields
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((key.clone(), text))
            })
            .collect(),
    )
}

/// Sorted timestamps present in every named series.
pub fn common_timestamps(data: &CryptoData, names: &[&str]) -> Vec<String> {
    let mut common: Option<BTreeSet<&String>> = None;
    for name in names {
        let Some(series) = data.get(*name) else {
            return Vec::new();
        };
        let keys: BTreeSet<&String> = series.time_series.keys().collect();
        common = Some(match common {
            None => keys,
            Some(acc) => acc.intersection(&keys).copied().collect(),
        });
    }
    common
        .map(|set| set.into_iter().cloned().collect())
        .unwrap_or_default()
}

pub fn validate_weights(spec: &IndexSpec, data: &CryptoData) -> Result<()> {
    let total: f64 = spec.weights.iter().map(|(_, w)| w).sum();
    if (total - 100.0).abs() > WEIGHT_TOLERANCE {
        return Err(AppError::Validation(format!(
            "Percentages must sum to 100%. Current sum: {:.2}%",
            total
        )));
    }

    for (name, _) in &spec.weights {
        if !data.contains_key(name) {
            return Err(AppError::Validation(format!(
                "Cryptocurrency '{}' not found in data. Available: {:?}",
                name,
                data.keys().collect::<Vec<_>>()
            )));
        }
    }
    Ok(())
}

/// The requested base date when every constituent has it, else the first
/// common timestamp.
pub fn resolve_base_date(requested: &str, common: &[String]) -> Result<String> {
    if common.iter().any(|ts| ts == requested) {
        return Ok(requested.to_string());
    }
    let first = common.first().ok_or_else(|| {
        AppError::Validation("No common dates found for all index constituents".to_string())
    })?;
    tracing::warn!(
        "Base date {} not available, using first common date {}",
        requested,
        first
    );
    Ok(first.clone())
}

fn price(bar: &Bar, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| bar.get(*k))
        .and_then(|v| v.trim().parse::<f64>().ok())
}

/// Units of each constituent bought with `total_value × weight` at the base
/// date's buy price.
pub fn constituent_units(
    spec: &IndexSpec,
    data: &CryptoData,
    base_date: &str,
) -> Result<Vec<(String, f64)>> {
    let mut units = Vec::with_capacity(spec.weights.len());
    for (name, pct) in &spec.weights {
        let series = data
            .get(name)
            .ok_or_else(|| AppError::Validation(format!("Missing constituent {}", name)))?;
        let base_price = series
            .time_series
            .get(base_date)
            .and_then(|bar| price(bar, &[BUY_PRICE, OPEN]))
            .filter(|p| *p > 0.0)
            .ok_or_else(|| {
                AppError::Validation(format!("No buy price for {} on {}", name, base_date))
            })?;

        let value = spec.total_value * pct / 100.0;
        let amount = value / base_price;
        tracing::info!(
            "  {} ({}): {:.2}% = ${:.2} -> {:.6} units @ ${}",
            name,
            series.symbol,
            pct,
            value,
            amount,
            base_price
        );
        units.push((name.clone(), amount));
    }
    Ok(units)
}

/// Daily index bars from `base_date` onward over `timestamps`.
pub fn calculate_index_values(
    spec: &IndexSpec,
    data: &CryptoData,
    timestamps: &[String],
    base_date: &str,
) -> Result<TimeSeries> {
    let units = constituent_units(spec, data, base_date)?;
    let base_index = timestamps
        .iter()
        .position(|ts| ts == base_date)
        .ok_or_else(|| AppError::Validation(format!("Base date {} is not a common date", base_date)))?;

    let mut values = TimeSeries::new();
    let mut last_close: Option<f64> = None;

    for timestamp in &timestamps[base_index..] {
        let mut open_value = 0.0;
        let mut close_value = 0.0;
        let mut valid = 0usize;

        for (name, amount) in &units {
            let Some(bar) = data.get(name).and_then(|s| s.time_series.get(timestamp)) else {
                continue;
            };
            let open = price(bar, &[BUY_PRICE, OPEN]).unwrap_or(0.0);
            let close = price(bar, &[SELL_PRICE, CLOSE]).unwrap_or(0.0);
            if open > 0.0 && close > 0.0 {
                valid += 1;
                open_value += amount * open;
                close_value += amount * close;
            }
        }

        if (valid as f64) < units.len() as f64 / 2.0 || close_value <= 0.0 {
            tracing::warn!(
                "Skipping {} - insufficient valid data ({}/{})",
                timestamp,
                valid,
                units.len()
            );
            continue;
        }

        // open chains to the previous stored close after the base bar
        let open = last_close.unwrap_or(open_value);
        values.insert(
            timestamp.clone(),
            BTreeMap::from([
                (OPEN.to_string(), format!("{:.4}", open)),
                (HIGH.to_string(), "0.0000".to_string()),
                (LOW.to_string(), "0.0000".to_string()),
                (CLOSE.to_string(), format!("{:.4}", close_value)),
                (VOLUME.to_string(), "0".to_string()),
            ]),
        );
        last_close = Some(close_value);
    }

    tracing::info!("Index calculation completed: {} bars", values.len());
    Ok(values)
}

pub fn index_metadata(spec: &IndexSpec) -> BTreeMap<String, String> {
    let (allocation, symbol) = if spec.name == "CD5" {
        (
            "CD5 Index (BTC: 74.56%, ETH: 15.97%, XRP: 5.20%, SOL: 3.53%, ADA: 0.76%)".to_string(),
            "CD5".to_string(),
        )
    } else {
        (
            spec.weights
                .iter()
                .map(|(name, pct)| format!("{}: {:.1}%", name, pct))
                .collect::<Vec<_>>()
                .join(", "),
            format!("CRYPTO_INDEX_{}", spec.name.to_uppercase()),
        )
    };

    BTreeMap::from([
        (
            "1. Information".to_string(),
            format!(
                "{} - Daily open, high, low, close prices and volume - Total Value: ${} USDT",
                allocation,
                group_thousands(spec.total_value.round() as i64)
            ),
        ),
        ("2. Symbol".to_string(), symbol),
        (
            "3. Last Refreshed".to_string(),
            Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
        ("4. Interval".to_string(), "daily".to_string()),
        ("5. Output Size".to_string(), "Full size".to_string()),
        ("6. Time Zone".to_string(), "UTC".to_string()),
    ])
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// Loads `input`, computes the index described by `spec` and writes
/// `<NAME>_crypto_index.json` into `output_dir`.
pub fn synthesize_index(input: &Path, output_dir: &Path, spec: &IndexSpec) -> Result<(PathBuf, SeriesDocument)> {
    if !input.exists() {
        return Err(AppError::NotFound(format!(
            "Crypto data file {} does not exist; build the merged crypto JSONL first",
            input.display()
        )));
    }

    let data = load_crypto_data(input)?;
    validate_weights(spec, &data)?;

    let common = common_timestamps(&data, &spec.constituents());
    let (first, last) = match (common.first(), common.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(AppError::Validation(
                "No common timestamps found across cryptocurrencies".to_string(),
            ))
        }
    };
    tracing::info!(
        "Found {} common timestamps ({} to {})",
        common.len(),
        first,
        last
    );

    let base_date = resolve_base_date(&spec.base_date, &common)?;
    tracing::info!(
        "Calculating {} index for total value ${:.2} from {}",
        spec.name,
        spec.total_value,
        base_date
    );
    let time_series = calculate_index_values(spec, &data, &common, &base_date)?;

    let doc = SeriesDocument {
        meta: index_metadata(spec),
        time_series,
    };

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(spec.output_file_name());
    std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    tracing::info!("Saved index data to {}", path.display());

    log_samples(&doc.time_series);
    Ok((path, doc))
}

fn log_samples(series: &TimeSeries) {
    let keys: Vec<&String> = series.keys().collect();
    let samples: Vec<&String> = if keys.len() >= 3 {
        vec![keys[0], keys[keys.len() / 2], keys[keys.len() - 1]]
    } else {
        keys
    };
    for ts in samples {
        let bar = &series[ts];
        tracing::info!(
            "  {}: Open=${}, Close=${}",
            ts,
            bar.get(OPEN).map(String::as_str).unwrap_or("-"),
            bar.get(CLOSE).map(String::as_str).unwrap_or("-")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bar(open: &str, close: &str) -> Bar {
        BTreeMap::from([
            (BUY_PRICE.to_string(), open.to_string()),
            (SELL_PRICE.to_string(), close.to_string()),
        ])
    }

    fn series(symbol: &str, bars: &[(&str, &str, &str)]) -> CryptoSeries {
        CryptoSeries {
            symbol: symbol.to_string(),
            name: display_name(symbol),
            time_series: bars
                .iter()
                .map(|(ts, o, c)| (ts.to_string(), bar(o, c)))
                .collect(),
        }
    }

    fn two_coin_spec() -> IndexSpec {
        IndexSpec {
            name: "duo".to_string(),
            weights: vec![("Bitcoin".to_string(), 60.0), ("Ethereum".to_string(), 40.0)],
            total_value: 1000.0,
            base_date: "2025-11-02".to_string(),
        }
    }

    fn two_coin_data() -> CryptoData {
        let btc = series(
            "BTC-USDT",
            &[
                ("2025-11-01", "90", "95"),
                ("2025-11-02", "100", "110"),
                ("2025-11-03", "110", "120"),
                ("2025-11-04", "120", "100"),
            ],
        );
        let eth = series(
            "ETH-USDT",
            &[
                ("2025-11-02", "10", "12"),
                ("2025-11-03", "12", "11"),
                ("2025-11-04", "11", "10"),
            ],
        );
        CryptoData::from([(btc.name.clone(), btc), (eth.name.clone(), eth)])
    }

    #[test]
    fn maps_known_symbols_to_names() {
        assert_eq!(display_name("XRP-USDT"), "Ripple");
        assert_eq!(display_name("DOGE-USDT"), "DOGE");
    }

    #[test]
    fn intersects_timestamps() {
        let data = two_coin_data();
        assert_eq!(
            common_timestamps(&data, &["Bitcoin", "Ethereum"]),
            vec!["2025-11-02", "2025-11-03", "2025-11-04"]
        );
        assert!(common_timestamps(&data, &["Bitcoin", "Solana"]).is_empty());
    }

    #[test]
    fn weights_must_sum_to_one_hundred() {
        let data = two_coin_data();
        let mut spec = two_coin_spec();
        assert!(validate_weights(&spec, &data).is_ok());

        spec.weights[1].1 = 39.0;
        assert!(matches!(validate_weights(&spec, &data), Err(AppError::Validation(_))));

        let mut spec = two_coin_spec();
        spec.weights[1].0 = "Solana".to_string();
        assert!(matches!(validate_weights(&spec, &data), Err(AppError::Validation(_))));
    }

    #[test]
    fn base_date_falls_back_to_first_common() {
        let common = vec!["2025-11-03".to_string(), "2025-11-04".to_string()];
        assert_eq!(resolve_base_date("2025-11-02", &common).unwrap(), "2025-11-03");
        assert_eq!(resolve_base_date("2025-11-04", &common).unwrap(), "2025-11-04");
        assert!(resolve_base_date("2025-11-02", &[]).is_err());
    }

    #[test]
    fn index_values_hold_fixed_units() {
        let data = two_coin_data();
        let spec = two_coin_spec();
        let common = common_timestamps(&data, &spec.constituents());
        let values = calculate_index_values(&spec, &data, &common, "2025-11-02").unwrap();

        // 6 BTC units (600 / 100), 40 ETH units (400 / 10)
        assert_eq!(values.len(), 3);
        assert_eq!(values["2025-11-02"][OPEN], "1000.0000");
        assert_eq!(values["2025-11-02"][CLOSE], "1140.0000");
        assert_eq!(values["2025-11-03"][OPEN], "1140.0000");
        assert_eq!(values["2025-11-03"][CLOSE], "1160.0000");
        assert_eq!(values["2025-11-04"][CLOSE], "1000.0000");
        assert_eq!(values["2025-11-04"][HIGH], "0.0000");
        assert_eq!(values["2025-11-04"][VOLUME], "0");
    }

    #[test]
    fn bars_with_too_few_valid_constituents_are_skipped() {
        let mut data = two_coin_data();
        let mut spec = two_coin_spec();
        spec.weights = vec![
            ("Bitcoin".to_string(), 50.0),
            ("Ethereum".to_string(), 30.0),
            ("Solana".to_string(), 20.0),
        ];
        let sol = series(
            "SOL-USDT",
            &[
                ("2025-11-02", "100", "100"),
                ("2025-11-03", "0", "0"),
                ("2025-11-04", "100", "100"),
            ],
        );
        data.insert(sol.name.clone(), sol);
        data.get_mut("Ethereum")
            .unwrap()
            .time_series
            .insert("2025-11-03".to_string(), bar("0", "0"));

        let common = common_timestamps(&data, &spec.constituents());
        let values = calculate_index_values(&spec, &data, &common, "2025-11-02").unwrap();

        assert!(!values.contains_key("2025-11-03"));
        // open chains to the last stored close
        assert_eq!(values["2025-11-04"][OPEN], values["2025-11-02"][CLOSE]);
    }

    #[test]
    fn cd5_metadata_uses_fixed_allocation() {
        let meta = index_metadata(&IndexSpec::cd5());
        assert_eq!(meta["2. Symbol"], "CD5");
        assert!(meta["1. Information"].ends_with("Total Value: $50,000 USDT"));
        assert_eq!(meta["6. Time Zone"], "UTC");

        let meta = index_metadata(&two_coin_spec());
        assert_eq!(meta["2. Symbol"], "CRYPTO_INDEX_DUO");
        assert!(meta["1. Information"].starts_with("Bitcoin: 60.0%, Ethereum: 40.0%"));
    }

    #[test]
    fn synthesize_writes_index_document() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join(INPUT_FILE);
        let lines = [
            r#"{"Meta Data":{"2. Symbol":"BTC-USDT"},"Time Series (60min)":{"2025-11-02":{"1. buy price":"100","4. sell price":"110"},"2025-11-03":{"1. buy price":"110","4. sell price":"120"}}}"#,
            "",
            "not json",
            r#"{"Meta Data":{"2. Symbol":"ETH-USDT"},"Time Series (60min)":{"2025-11-02":{"1. buy price":"10","4. sell price":"12"},"2025-11-03":{"1. buy price":"12","4. sell price":"11"}}}"#,
        ];
        std::fs::write(&input, lines.join("\n")).unwrap();

        let (path, doc) = synthesize_index(&input, dir.path(), &two_coin_spec()).unwrap();

        assert_eq!(path, dir.path().join("duo_crypto_index.json"));
        assert_eq!(doc.time_series.len(), 2);
        let reread: SeriesDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread, doc);
    }

    #[test]
    fn missing_input_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = synthesize_index(&dir.path().join(INPUT_FILE), dir.path(), &IndexSpec::cd5());
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[test]
    fn numeric_and_null_bar_fields_are_accepted() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join(INPUT_FILE);
        std::fs::write(
            &input,
            r#"{"Meta Data":{"2. Symbol":"BTC-USDT"},"Time Series (Daily)":{"2025-11-02":{"1. buy price":110250.5,"4. sell price":"110900.1","5. volume":1234.5,"2. high":null}}}"#,
        )
        .unwrap();

        let data = load_crypto_data(&input).unwrap();

        let bar = &data["Bitcoin"].time_series["2025-11-02"];
        assert_eq!(bar[BUY_PRICE], "110250.5");
        assert_eq!(bar[SELL_PRICE], "110900.1");
        assert_eq!(bar[VOLUME], "1234.5");
        assert!(!bar.contains_key(HIGH));
        assert_eq!(price(bar, &[BUY_PRICE, OPEN]), Some(110250.5));
    }
}
