use crate::types::TimeSeries;
use crate::{AppError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";
const TIMEOUT_SECS: u64 = 30;
const FX_SERIES_KEY: &str = "Time Series FX (Daily)";
const METAL_CODES: [&str; 4] = ["XAU", "XAG", "XPT", "XPD"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputSize {
    /// Latest 100 data points.
    Compact,
    /// Full history (20+ years).
    #[default]
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

/// Body of a successful FX_DAILY call.
#[derive(Debug, Clone, Deserialize)]
pub struct FxDailyResponse {
    #[serde(rename = "Meta Data")]
    pub meta: BTreeMap<String, String>,
    #[serde(rename = "Time Series FX (Daily)")]
    pub time_series: TimeSeries,
}

#[async_trait]
pub trait FxSource: Send + Sync {
    /// Daily candles for `from`/`to`. `Ok(None)` means the pair is not
    /// served by this source and should be skipped.
    async fn fx_daily(&self, from: &str, to: &str) -> Result<Option<FxDailyResponse>>;
    fn source_name(&self) -> &'static str;
}

/// Splits a pair symbol such as `EURUSD` or `XAUUSD` into its two currency codes.
pub fn parse_forex_pair(pair: &str) -> Result<(String, String)> {
    match pair {
        "XAUUSD" => return Ok(("XAU".to_string(), "USD".to_string())),
        "XAGUSD" => return Ok(("XAG".to_string(), "USD".to_string())),
        "XPTUSD" => return Ok(("XPT".to_string(), "USD".to_string())),
        "XPDUSD" => return Ok(("XPD".to_string(), "USD".to_string())),
        _ => {}
    }

    static PAIR_RE: OnceLock<Regex> = OnceLock::new();
    let re = PAIR_RE.get_or_init(|| Regex::new(r"^[A-Z]{6}$").expect("valid pair regex"));

    if re.is_match(pair) {
        Ok((pair[..3].to_string(), pair[3..].to_string()))
    } else {
        Err(AppError::Validation(format!("Invalid forex pair format: {}", pair)))
    }
}

pub fn is_metal(currency: &str) -> bool {
    METAL_CODES.contains(&currency)
}

pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    output_size: OutputSize,
}

impl AlphaVantageClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AppError::Config("ALPHAADVANTAGE_API_KEY not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            output_size: OutputSize::default(),
        })
    }

    pub fn with_output_size(mut self, output_size: OutputSize) -> Self {
        self.output_size = output_size;
        self
    }

    /// Last four characters of the key, for startup logs.
    pub fn masked_key(&self) -> String {
        let tail: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{}{}", "*".repeat(20), tail)
    }

    async fn call_api(&self, from: &str, to: &str) -> Result<Value> {
        let response = self
            .client
            .get(ALPHA_VANTAGE_URL)
            .query(&[
                ("function", "FX_DAILY"),
                ("from_symbol", from),
                ("to_symbol", to),
                ("apikey", self.api_key.as_str()),
                ("outputsize", self.output_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("Alpha Vantage request timed out for {}/{}", from, to))
                } else {
                    AppError::ExternalApi(format!("Alpha Vantage request failed: {}", e.without_url()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApi(format!(
                "Alpha Vantage returned {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Failed to parse Alpha Vantage response: {}", e)))
    }
}

/// Classifies an FX_DAILY body: API errors, throttle notes and bodies
/// without a series are errors.
pub fn interpret_fx_body(body: Value) -> Result<FxDailyResponse> {
    if let Some(message) = body.get("Error Message") {
        return Err(AppError::ExternalApi(format!(
            "Alpha Vantage error: {}",
            value_text(message)
        )));
    }
    if let Some(note) = body.get("Note") {
        return Err(AppError::RateLimit(value_text(note)));
    }
    if body.get(FX_SERIES_KEY).is_none() {
        let preview: String = body.to_string().chars().take(200).collect();
        return Err(AppError::ExternalApi(format!(
            "No time series data received: {}...",
            preview
        )));
    }

    serde_json::from_value(body)
        .map_err(|e| AppError::ExternalApi(format!("Unexpected FX_DAILY layout: {}", e)))
}

fn value_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[async_trait]
impl FxSource for AlphaVantageClient {
    async fn fx_daily(&self, from: &str, to: &str) -> Result<Option<FxDailyResponse>> {
        if is_metal(from) {
            tracing::warn!(
                "Precious metals require a premium API plan, skipping {}/{}",
                from,
                to
            );
            return Ok(None);
        }

        tracing::info!("Fetching {}/{}...", from, to);
        let body = self.call_api(from, to).await?;
        let parsed = interpret_fx_body(body)?;
        tracing::info!(
            "Fetched {} daily bars for {}/{}",
            parsed.time_series.len(),
            from,
            to
        );
        Ok(Some(parsed))
    }

    fn source_name(&self) -> &'static str {
        "alpha_vantage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_standard_and_metal_pairs() {
        assert_eq!(
            parse_forex_pair("EURUSD").unwrap(),
            ("EUR".to_string(), "USD".to_string())
        );
        assert_eq!(
            parse_forex_pair("XAGUSD").unwrap(),
            ("XAG".to_string(), "USD".to_string())
        );
        assert!(matches!(parse_forex_pair("EURO"), Err(AppError::Validation(_))));
        assert!(matches!(parse_forex_pair("eurusd"), Err(AppError::Validation(_))));
    }

    #[test]
    fn throttle_note_is_a_rate_limit() {
        let body = json!({ "Note": "Thank you for using Alpha Vantage!" });
        assert!(matches!(interpret_fx_body(body), Err(AppError::RateLimit(_))));
    }

    #[test]
    fn error_message_is_external_error() {
        let body = json!({ "Error Message": "Invalid API call." });
        match interpret_fx_body(body) {
            Err(AppError::ExternalApi(msg)) => assert!(msg.contains("Invalid API call.")),
            other => panic!("unexpected: {:?}", other.map(|r| r.time_series.len())),
        }
    }

    #[test]
    fn missing_series_is_rejected() {
        let body = json!({ "Information": "premium endpoint" });
        assert!(matches!(interpret_fx_body(body), Err(AppError::ExternalApi(_))));
    }

    #[test]
    fn valid_body_is_parsed() {
        let body = json!({
            "Meta Data": {
                "1. Information": "Forex Daily Prices (open, high, low, close)",
                "2. From Symbol": "EUR",
                "3. To Symbol": "USD",
                "4. Output Size": "Full size",
                "5. Last Refreshed": "2025-11-03",
                "6. Time Zone": "UTC"
            },
            "Time Series FX (Daily)": {
                "2025-11-03": { "1. open": "1.1520", "2. high": "1.1540", "3. low": "1.1490", "4. close": "1.1510" }
            }
        });
        let parsed = interpret_fx_body(body).unwrap();
        assert_eq!(parsed.meta["5. Last Refreshed"], "2025-11-03");
        assert_eq!(parsed.time_series["2025-11-03"]["4. close"], "1.1510");
    }

    #[test]
    fn masks_all_but_last_four_characters() {
        let client = AlphaVantageClient::new("ABCDEFGH1234").unwrap();
        assert_eq!(client.masked_key(), format!("{}1234", "*".repeat(20)));
    }

    #[tokio::test]
    async fn metals_are_skipped_without_a_request() {
        let client = AlphaVantageClient::new("demo").unwrap();
        assert!(client.fx_daily("XAU", "USD").await.unwrap().is_none());
    }
}
