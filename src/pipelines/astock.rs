//! A-share intraday kline fetcher with incremental CSV updates.
//!
//! The output CSV is keyed by `(stock_code, trade_date)`. Each run resumes
//! from the day after the newest `trade_date` already on disk, fetches the
//! missing klines, and rewrites the file sorted by `(trade_date, stock_code)`.

use crate::clients::KlineSource;
use crate::types::HourlyBar;
use crate::{AppError, Result};
use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const DEFAULT_START_DATE: &str = "20251001";
pub const DEFAULT_STOCK_LIST: &str = "sse_50_weight.csv";
pub const DEFAULT_OUTPUT: &str = "A_stock_hourly.csv";
pub const DEFAULT_FREQUENCY: u32 = 60;

const CODE_COLUMN: &str = "con_code";
const DATE_COLUMN: &str = "trade_date";

#[derive(Debug, Clone)]
pub struct AstockOptions {
    pub frequency: u32,
    pub data_dir: PathBuf,
    pub stock_list_file: String,
    pub output_file: String,
    pub default_start_date: String,
    pub auto_date_range: bool,
}

impl AstockOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            data_dir: data_dir.into(),
            stock_list_file: DEFAULT_STOCK_LIST.to_string(),
            output_file: DEFAULT_OUTPUT.to_string(),
            default_start_date: DEFAULT_START_DATE.to_string(),
            auto_date_range: true,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Existing data already covers today.
    UpToDate(Vec<HourlyBar>),
    Updated(Vec<HourlyBar>),
    /// Nothing on disk and nothing to fetch.
    Empty,
}

pub struct AstockFetcher<S: KlineSource> {
    source: S,
    options: AstockOptions,
    stock_list_path: PathBuf,
    output_path: PathBuf,
}

impl<S: KlineSource> AstockFetcher<S> {
    pub fn new(source: S, options: AstockOptions) -> Result<Self> {
        std::fs::create_dir_all(&options.data_dir)?;

        let stock_list_path = options.data_dir.join(&options.stock_list_file);
        let output_path = options.data_dir.join(&options.output_file);

        tracing::info!(
            "Initialize data fetcher: frequency={}mins, data_dir={}",
            options.frequency,
            options.data_dir.display()
        );

        Ok(Self {
            source,
            options,
            stock_list_path,
            output_path,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Bare stock codes (`600519`) from the `con_code` column, first-seen order.
    pub fn load_stock_list(&self) -> Result<Vec<String>> {
        tracing::info!("Load stock list from {}", self.stock_list_path.display());

        let mut seen = HashSet::new();
        let codes: Vec<String> = read_stock_codes(&self.stock_list_path)?
            .into_iter()
            .map(|code| code.replace(".SH", "").replace(".SZ", ""))
            .filter(|code| seen.insert(code.clone()))
            .collect();

        tracing::info!("Successfully loaded {} stocks", codes.len());
        tracing::debug!("Stock list: {:?}", codes.iter().take(5).collect::<Vec<_>>());
        Ok(codes)
    }

    /// `(begin, end)` as `YYYYMMDD`. `end` is always `today`.
    pub fn date_range(&self, today: NaiveDate) -> (String, String) {
        let end = today.format("%Y%m%d").to_string();
        let default_start = self.options.default_start_date.clone();

        if !self.output_path.exists() {
            tracing::info!(
                "Existing data file not detected, fetching from {}",
                default_start
            );
            return (default_start, end);
        }

        tracing::info!("Detected existing data file: {}", self.output_path.display());
        match last_trade_date(&self.output_path) {
            Ok(Some(last)) => {
                let begin = (last + Duration::days(1)).format("%Y%m%d").to_string();
                tracing::info!("Last date of existing data: {}", last.format("%Y-%m-%d"));
                if begin > end {
                    tracing::info!("Data is already up to date, no update needed");
                } else {
                    tracing::info!("Will start incremental update from {}", begin);
                }
                (begin, end)
            }
            Ok(None) => {
                tracing::warn!(
                    "Existing file is empty or missing trade_date column, using default start date"
                );
                (default_start, end)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read existing data file: {}, using default start date",
                    e
                );
                (default_start, end)
            }
        }
    }

    pub async fn fetch(&self, stock_list: &[String], begin: &str, end: &str) -> Result<Vec<HourlyBar>> {
        tracing::info!(
            "Start fetching intraday data for {} stocks from {}",
            stock_list.len(),
            self.source.source_name()
        );
        tracing::info!(
            "Time range: {} - {}, Period: {} mins",
            begin,
            end,
            self.options.frequency
        );

        let mut bars = Vec::new();
        for code in stock_list {
            let mut one = self
                .source
                .klines(code, self.options.frequency, begin, end)
                .await
                .map_err(|e| {
                    tracing::error!("Data fetch failed for {}: {}", code, e);
                    e
                })?;
            bars.append(&mut one);
        }

        tracing::info!("Data fetched successfully: {} rows", bars.len());
        Ok(bars)
    }

    /// Writes `new_bars` (merged with the file on disk when `incremental`).
    pub fn process_and_save(&self, new_bars: Vec<HourlyBar>, incremental: bool) -> Result<Vec<HourlyBar>> {
        tracing::info!("Start processing data");

        let total = if incremental && self.output_path.exists() {
            tracing::info!("Incremental update mode: merging old and new data");
            // keep the saved history untouched when it cannot be read back
            let old = read_bars(&self.output_path).map_err(|e| {
                tracing::error!(
                    "Failed to read {} for merging, leaving it unchanged: {}",
                    self.output_path.display(),
                    e
                );
                e
            })?;
            let (old_len, new_len) = (old.len(), new_bars.len());
            let merged = merge_bars(old, new_bars);
            tracing::info!(
                "Total records after merge: {} (Old: {}, New: {})",
                merged.len(),
                old_len,
                new_len
            );
            merged
        } else {
            new_bars
        };

        write_bars(&self.output_path, &total)?;
        tracing::info!("Data saved to: {}", self.output_path.display());
        tracing::info!("Total {} records", total.len());
        Ok(total)
    }

    pub async fn run(&self, today: NaiveDate) -> Result<RunOutcome> {
        let stock_list = self.load_stock_list()?;

        let (begin, end, incremental) = if self.options.auto_date_range {
            let (begin, end) = self.date_range(today);
            if begin > end {
                tracing::info!("Data is up to date, no update needed");
                if self.output_path.exists() {
                    return Ok(RunOutcome::UpToDate(read_bars(&self.output_path)?));
                }
                return Ok(RunOutcome::Empty);
            }
            (begin, end, self.output_path.exists())
        } else {
            (
                self.options.default_start_date.clone(),
                today.format("%Y%m%d").to_string(),
                false,
            )
        };

        tracing::info!("Data fetch date range: {} - {}", begin, end);
        let new_bars = self.fetch(&stock_list, &begin, &end).await?;
        let total = self.process_and_save(new_bars, incremental)?;

        log_overview(&total);
        tracing::info!("Data fetch process completed");
        Ok(RunOutcome::Updated(total))
    }
}

/// Concatenates `old` and `new`, keeps the last row per
/// `(stock_code, trade_date)`, sorts by `(trade_date, stock_code)`.
pub fn merge_bars(old: Vec<HourlyBar>, new: Vec<HourlyBar>) -> Vec<HourlyBar> {
    let mut latest: HashMap<(String, String), HourlyBar> = HashMap::new();
    for bar in old.into_iter().chain(new) {
        latest.insert((bar.stock_code.clone(), bar.trade_date.clone()), bar);
    }

    let mut merged: Vec<HourlyBar> = latest.into_values().collect();
    merged.sort_by(|a, b| {
        a.trade_date
            .cmp(&b.trade_date)
            .then_with(|| a.stock_code.cmp(&b.stock_code))
    });
    merged
}

/// Unique `con_code` values of a stock-list CSV, suffixes kept, first-seen order.
pub fn read_stock_codes(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(AppError::NotFound(format!(
            "Stock list file does not exist: {}",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == CODE_COLUMN)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Missing '{}' column in file {}",
                CODE_COLUMN,
                path.display()
            ))
        })?;

    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping stock list row in {}: {}", path.display(), e);
                continue;
            }
        };
        let Some(raw) = record.get(column) else { continue };
        let code = raw.trim().to_string();
        if !code.is_empty() && seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    Ok(codes)
}

/// Reads the hourly CSV. Blank numeric cells become `None`; rows that do not
/// parse are logged and skipped.
pub fn read_bars(path: &Path) -> Result<Vec<HourlyBar>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut bars = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        match record.and_then(|r| r.deserialize::<HourlyBar>(Some(&headers))) {
            Ok(bar) => bars.push(bar),
            // +2: header line and 1-based numbering
            Err(e) => tracing::warn!("Skipping row {} of {}: {}", idx + 2, path.display(), e),
        }
    }
    Ok(bars)
}

pub fn write_bars(path: &Path, bars: &[HourlyBar]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    if bars.is_empty() {
        writer.write_record(HourlyBar::HEADER)?;
    }
    for bar in bars {
        writer.serialize(bar)?;
    }
    writer.flush()?;
    Ok(())
}

/// Date part of the greatest `trade_date` in the file, `None` when the file
/// has no rows or no `trade_date` column.
fn last_trade_date(path: &Path) -> Result<Option<NaiveDate>> {
    let mut reader = csv::Reader::from_path(path)?;
    let Some(column) = reader.headers()?.iter().position(|h| h == DATE_COLUMN) else {
        return Ok(None);
    };

    let mut max: Option<String> = None;
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(column) {
            if max.as_deref().map_or(true, |m| value > m) {
                max = Some(value.to_string());
            }
        }
    }

    let Some(max) = max else { return Ok(None) };
    let date_part = max.split_whitespace().next().unwrap_or_default();
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| AppError::Validation(format!("Bad trade_date {:?}: {}", max, e)))?;
    Ok(Some(date))
}

fn log_overview(bars: &[HourlyBar]) {
    if bars.is_empty() {
        tracing::info!("No new data or data fetch failed");
        return;
    }
    let stocks: HashSet<&str> = bars.iter().map(|b| b.stock_code.as_str()).collect();
    let first = bars.iter().map(|b| b.trade_date.as_str()).min().unwrap_or_default();
    let last = bars.iter().map(|b| b.trade_date.as_str()).max().unwrap_or_default();
    tracing::info!(
        "Data overview: {} rows, {} stocks, {} - {}",
        bars.len(),
        stocks.len(),
        first,
        last
    );
}
