use crate::types::HourlyBar;
use crate::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const TIMEOUT_SECS: u64 = 30;
// forward-adjusted prices
const ADJUST_FORWARD: &str = "1";

#[derive(Debug, Deserialize)]
struct KlineEnvelope {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    code: String,
    name: String,
    #[serde(default)]
    klines: Vec<String>,
}

/// Exchange a mainland A-share code trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Shanghai,
    Shenzhen,
}

impl Exchange {
    pub fn for_code(code: &str) -> Self {
        if code.starts_with('6') {
            Exchange::Shanghai
        } else {
            Exchange::Shenzhen
        }
    }

    fn market_id(&self) -> u8 {
        match self {
            Exchange::Shanghai => 1,
            Exchange::Shenzhen => 0,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Exchange::Shanghai => ".SH",
            Exchange::Shenzhen => ".SZ",
        }
    }
}

#[async_trait]
pub trait KlineSource: Send + Sync {
    /// Klines for one bare code (`600519`) between `begin` and `end`
    /// (both `YYYYMMDD`, inclusive) at `frequency` minutes.
    async fn klines(
        &self,
        code: &str,
        frequency: u32,
        begin: &str,
        end: &str,
    ) -> Result<Vec<HourlyBar>>;
    fn source_name(&self) -> &'static str;
}

pub struct EastmoneyClient {
    client: Client,
}

impl EastmoneyClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn kline_url(code: &str, frequency: u32, begin: &str, end: &str) -> Result<Url> {
        let secid = format!("{}.{}", Exchange::for_code(code).market_id(), code);
        let klt = frequency.to_string();
        Url::parse_with_params(
            KLINE_URL,
            &[
                ("secid", secid.as_str()),
                ("klt", klt.as_str()),
                ("fqt", ADJUST_FORWARD),
                ("beg", begin),
                ("end", end),
                ("fields1", "f1,f2,f3,f4,f5,f6"),
                ("fields2", "f51,f52,f53,f54,f55,f56,f57"),
            ],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid kline URL: {}", e)))
    }
}

/// Parses one `date,open,close,high,low,volume[,...]` kline row.
pub fn parse_kline(stock_name: &str, stock_code: &str, row: &str) -> Result<HourlyBar> {
    let fields: Vec<&str> = row.split(',').collect();
    if fields.len() < 6 {
        return Err(AppError::ExternalApi(format!("Malformed kline row: {}", row)));
    }

    let number = |idx: usize| -> Result<f64> {
        fields[idx]
            .trim()
            .parse::<f64>()
            .map_err(|e| AppError::ExternalApi(format!("Bad number in kline row {:?}: {}", row, e)))
    };

    Ok(HourlyBar {
        stock_name: stock_name.to_string(),
        stock_code: stock_code.to_string(),
        trade_date: fields[0].trim().to_string(),
        open: Some(number(1)?),
        close: Some(number(2)?),
        high: Some(number(3)?),
        low: Some(number(4)?),
        volume: Some(number(5)?),
    })
}

#[async_trait]
impl KlineSource for EastmoneyClient {
    async fn klines(
        &self,
        code: &str,
        frequency: u32,
        begin: &str,
        end: &str,
    ) -> Result<Vec<HourlyBar>> {
        let url = Self::kline_url(code, frequency, begin, end)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Eastmoney request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApi(format!(
                "Eastmoney returned {}: {}",
                status, error_text
            )));
        }

        let envelope: KlineEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Failed to parse Eastmoney response: {}", e)))?;

        let Some(data) = envelope.data else {
            tracing::warn!("No kline data returned for {}", code);
            return Ok(Vec::new());
        };

        let stock_code = format!("{}{}", data.code, Exchange::for_code(&data.code).suffix());
        let mut bars = Vec::with_capacity(data.klines.len());
        for row in &data.klines {
            match parse_kline(&data.name, &stock_code, row) {
                Ok(bar) => bars.push(bar),
                Err(e) => tracing::warn!("Skipping kline for {}: {}", stock_code, e),
            }
        }

        tracing::debug!("Fetched {} klines for {}", bars.len(), stock_code);
        Ok(bars)
    }

    fn source_name(&self) -> &'static str {
        "eastmoney"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shanghai_and_shenzhen_codes_map_to_market_ids() {
        assert_eq!(Exchange::for_code("600519"), Exchange::Shanghai);
        assert_eq!(Exchange::for_code("000001"), Exchange::Shenzhen);
        assert_eq!(Exchange::for_code("300750").suffix(), ".SZ");
    }

    #[test]
    fn kline_url_carries_secid_and_range() {
        let url = EastmoneyClient::kline_url("600519", 60, "20251001", "20251010").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("secid".to_string(), "1.600519".to_string())));
        assert!(pairs.contains(&("klt".to_string(), "60".to_string())));
        assert!(pairs.contains(&("beg".to_string(), "20251001".to_string())));
        assert!(pairs.contains(&("end".to_string(), "20251010".to_string())));
    }

    #[test]
    fn parses_kline_row_in_column_order() {
        let bar = parse_kline(
            "贵州茅台",
            "600519.SH",
            "2025-10-09 10:30,1450.00,1455.50,1460.00,1440.10,12345,17900000.00",
        )
        .unwrap();

        assert_eq!(bar.trade_date, "2025-10-09 10:30");
        assert_eq!(bar.open, Some(1450.0));
        assert_eq!(bar.close, Some(1455.5));
        assert_eq!(bar.high, Some(1460.0));
        assert_eq!(bar.low, Some(1440.1));
        assert_eq!(bar.volume, Some(12345.0));
    }

    #[test]
    fn short_rows_are_rejected() {
        assert!(parse_kline("x", "600000.SH", "2025-10-09 10:30,1,2").is_err());
    }
}
