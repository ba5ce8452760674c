//! Forex daily prices: fetch per pair into `daily_prices_<PAIR>.json`,
//! then merge every pair file into one JSONL.

use crate::clients::alpha_vantage::{parse_forex_pair, FxDailyResponse};
use crate::clients::FxSource;
use crate::types::{
    Bar, SeriesDocument, BUY_PRICE, CLOSE, HIGH, LOW, OPEN, SELL_PRICE, VOLUME,
};
use crate::{AppError, Result};
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MAJOR_PAIRS: [&str; 7] = [
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD",
];
pub const PRECIOUS_METALS: [&str; 2] = ["XAUUSD", "XAGUSD"];

const FILE_PREFIX: &str = "daily_prices_";
pub const MERGED_FILE: &str = "forex_merged.jsonl";

/// Free tier pairs: EUR, GBP, JPY, CHF, AUD.
pub fn default_pairs() -> Vec<String> {
    MAJOR_PAIRS[..5].iter().map(|p| p.to_string()).collect()
}

/// Re-keys an FX_DAILY body into the agent-facing document layout.
pub fn format_forex_document(pair: &str, raw: &FxDailyResponse) -> SeriesDocument {
    let meta_value = |key: &str| raw.meta.get(key).cloned().unwrap_or_default();

    let meta = BTreeMap::from([
        (
            "1. Information".to_string(),
            "Forex Daily Prices (open, high, low, close)".to_string(),
        ),
        ("2. Symbol".to_string(), pair.to_string()),
        ("3. Last Refreshed".to_string(), meta_value("5. Last Refreshed")),
        ("4. Time Zone".to_string(), meta_value("6. Time Zone")),
    ]);

    let time_series = raw
        .time_series
        .iter()
        .map(|(date, prices)| {
            let field = |key: &str| prices.get(key).cloned().unwrap_or_default();
            let bar: Bar = BTreeMap::from([
                (BUY_PRICE.to_string(), field(OPEN)),
                (HIGH.to_string(), field(HIGH)),
                (LOW.to_string(), field(LOW)),
                (SELL_PRICE.to_string(), field(CLOSE)),
                // forex has no volume
                (VOLUME.to_string(), "0".to_string()),
            ]);
            (date.clone(), bar)
        })
        .collect();

    SeriesDocument { meta, time_series }
}

pub fn save_forex_document(pair: &str, doc: &SeriesDocument, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}{}.json", FILE_PREFIX, pair));
    std::fs::write(&path, serde_json::to_string_pretty(doc)?)?;
    tracing::info!("Saved {} to {}", pair, path.display());
    Ok(path)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchSummary {
    pub saved: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct ForexFetcher<S: FxSource> {
    source: S,
    output_dir: PathBuf,
    rate_limit: Duration,
}

impl<S: FxSource> ForexFetcher<S> {
    pub fn new(source: S, output_dir: impl Into<PathBuf>, rate_limit: Duration) -> Self {
        Self {
            source,
            output_dir: output_dir.into(),
            rate_limit,
        }
    }

    /// `Ok(false)` when the source does not serve the pair.
    async fn fetch_one(&self, pair: &str, from: &str, to: &str) -> Result<bool> {
        match self.source.fx_daily(from, to).await? {
            Some(raw) => {
                let doc = format_forex_document(pair, &raw);
                save_forex_document(pair, &doc, &self.output_dir)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetches every pair; a failing pair is logged and skipped. The rate
    /// limit wait follows only pairs that reached the API.
    pub async fn fetch_all(&self, pairs: &[String]) -> Result<FetchSummary> {
        std::fs::create_dir_all(&self.output_dir)?;
        tracing::info!(
            "Fetching {} forex pairs from {}: {}",
            pairs.len(),
            self.source.source_name(),
            pairs.join(", ")
        );

        let mut summary = FetchSummary::default();
        for (i, pair) in pairs.iter().enumerate() {
            tracing::info!("[{}/{}] Processing {}", i + 1, pairs.len(), pair);

            let (from, to) = match parse_forex_pair(pair) {
                Ok(codes) => codes,
                Err(e) => {
                    tracing::error!("Error processing {}: {}", pair, e);
                    summary.skipped.push(pair.clone());
                    continue;
                }
            };

            let requested = match self.fetch_one(pair, &from, &to).await {
                Ok(true) => {
                    summary.saved.push(pair.clone());
                    true
                }
                Ok(false) => {
                    tracing::warn!("Skipping {}: not available from source", pair);
                    summary.skipped.push(pair.clone());
                    false
                }
                Err(e) => {
                    tracing::error!("Error processing {}: {}", pair, e);
                    summary.skipped.push(pair.clone());
                    true
                }
            };

            // Alpha Vantage free tier: 5 requests per minute
            if requested && i + 1 < pairs.len() && !self.rate_limit.is_zero() {
                tracing::info!("Waiting {:?} (rate limiting)...", self.rate_limit);
                tokio::time::sleep(self.rate_limit).await;
            }
        }

        tracing::info!(
            "Forex data fetching completed: {} saved, {} skipped",
            summary.saved.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }
}

/// `daily_prices_*.json` files in `dir`, sorted by name.
pub fn pair_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub processed: usize,
    pub total: usize,
}

/// Writes each pair file as one compact JSON line of `output_file`.
pub fn merge_forex_jsonl(input_dir: &Path, output_file: &Path) -> Result<MergeSummary> {
    let files = pair_files(input_dir)?;
    if files.is_empty() {
        return Err(AppError::NotFound(format!(
            "No forex price files found in {}; run the forex fetch first",
            input_dir.display()
        )));
    }

    tracing::info!(
        "Merging {} forex pair files from {} into {}",
        files.len(),
        input_dir.display(),
        output_file.display()
    );

    if let Some(parent) = output_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(std::fs::File::create(output_file)?);
    let mut processed = 0;
    for file in &files {
        let pair = file
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_start_matches(FILE_PREFIX).to_string())
            .unwrap_or_default();

        match read_json(file) {
            Ok(value) => {
                writeln!(out, "{}", serde_json::to_string(&value)?)?;
                tracing::debug!("Merged {}", pair);
                processed += 1;
            }
            Err(e) => tracing::error!("Error merging {}: {}", pair, e),
        }
    }
    out.flush()?;

    let size_mb = std::fs::metadata(output_file)?.len() as f64 / (1024.0 * 1024.0);
    tracing::info!(
        "Successfully merged {}/{} forex pairs into {} ({:.2} MB)",
        processed,
        files.len(),
        output_file.display(),
        size_mb
    );

    Ok(MergeSummary {
        processed,
        total: files.len(),
    })
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
