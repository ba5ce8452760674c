use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Bar field keys
pub const OPEN: &str = "1. open";
pub const BUY_PRICE: &str = "1. buy price";
pub const HIGH: &str = "2. high";
pub const LOW: &str = "3. low";
pub const CLOSE: &str = "4. close";
pub const SELL_PRICE: &str = "4. sell price";
pub const VOLUME: &str = "5. volume";

pub const META_DATA: &str = "Meta Data";
pub const DAILY_SERIES: &str = "Time Series (Daily)";
pub const TIME_SERIES_PREFIX: &str = "Time Series";

/// One bar: numbered field name -> decimal string.
pub type Bar = BTreeMap<String, String>;

/// Timestamp -> bar, ordered by timestamp.
pub type TimeSeries = BTreeMap<String, Bar>;

/// A daily price document in the Alpha Vantage layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDocument {
    #[serde(rename = "Meta Data")]
    pub meta: BTreeMap<String, String>,
    #[serde(rename = "Time Series (Daily)")]
    pub time_series: TimeSeries,
}

impl SeriesDocument {
    pub fn symbol(&self) -> Option<&str> {
        self.meta.get("2. Symbol").map(String::as_str)
    }
}

/// One A-share kline row as stored in the hourly CSV. Blank cells read as
/// `None` and are written back blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyBar {
    pub stock_name: String,
    pub stock_code: String,
    pub trade_date: String,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

impl HourlyBar {
    pub const HEADER: [&'static str; 8] = [
        "stock_name",
        "stock_code",
        "trade_date",
        "open",
        "close",
        "high",
        "low",
        "volume",
    ];
}

/// One line of an agent's position log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub date: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this_action: Option<serde_json::Value>,
    pub positions: BTreeMap<String, f64>,
}

/// Open/close pair at one timestamp for one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceBar {
    pub open: Option<f64>,
    pub close: Option<f64>,
}

// Metric reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetrics {
    pub evaluation_time: String,
    pub model_name: String,
    pub market: String,
    pub trading_days: usize,
    pub start_date: String,
    pub end_date: String,
    pub initial_value: f64,
    pub final_value: f64,
    pub value_change: f64,
    pub cumulative_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_start: String,
    pub max_drawdown_end: String,
    pub volatility: f64,
    pub win_rate: f64,
    pub trading_days_with_data: usize,
    pub investment_days: i64,
    pub daily_returns_count: usize,
    pub daily_volatility: f64,
    pub mean_daily_return: f64,
    pub annualized_return_for_sharpe: f64,
    pub risk_free_rate: f64,
    pub trading_days_per_year: u32,
    #[serde(rename = "cd5_composition")]
    pub composition: BTreeMap<String, f64>,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexComparison {
    pub model_name: String,
    pub status: String,
    pub trading_days: usize,
    pub start_date: String,
    pub end_date: String,
    pub cumulative_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub win_rate: f64,
    pub initial_value: f64,
    pub final_value: f64,
    pub value_change: f64,
    pub value_change_percent: f64,
    pub is_benchmark: bool,
}

// Request Types
#[derive(Debug, Deserialize)]
pub struct AstockPromptRequest {
    pub today_date: String,
    pub signature: String,
    pub symbols: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ForexPromptRequest {
    pub today_date: String,
    pub signature: String,
    pub pairs: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexMetricsRequest {
    pub index_file: Option<String>,
    pub agent_start_date: Option<String>,
}

// Response Types
#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub prompt: String,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Serialize)]
pub struct IndexMetricsResponse {
    pub metrics: IndexMetrics,
    pub comparison: IndexComparison,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Serialize)]
pub struct ResponseMetadata {
    pub timestamp: String,
    pub execution_time_ms: u64,
}
