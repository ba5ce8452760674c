use crate::{AppError, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_FOREX_RATE_LIMIT_SECS: u64 = 15;

/// Runtime settings read from the process environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub alpha_vantage_api_key: Option<String>,
    pub today_date: Option<String>,
    pub signature: Option<String>,
    pub server_addr: String,
    pub forex_rate_limit: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        let forex_rate_limit = match std::env::var("FOREX_RATE_LIMIT_SECS") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| {
                AppError::Config(format!("FOREX_RATE_LIMIT_SECS must be an integer: {}", e))
            })?,
            Err(_) => DEFAULT_FOREX_RATE_LIMIT_SECS,
        };

        Ok(Self {
            data_dir,
            alpha_vantage_api_key: non_empty_var("ALPHAADVANTAGE_API_KEY"),
            today_date: non_empty_var("TODAY_DATE"),
            signature: non_empty_var("SIGNATURE"),
            server_addr: non_empty_var("SERVER_ADDR")
                .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
            forex_rate_limit: Duration::from_secs(forex_rate_limit),
        })
    }

    pub fn astock_dir(&self) -> PathBuf {
        self.data_dir.join("A_stock").join("A_stock_data")
    }

    pub fn forex_dir(&self) -> PathBuf {
        self.data_dir.join("forex")
    }

    pub fn crypto_dir(&self) -> PathBuf {
        self.data_dir.join("crypto")
    }

    pub fn position_file(&self, signature: &str) -> PathBuf {
        self.data_dir
            .join("agent_data")
            .join(signature)
            .join("position")
            .join("position.jsonl")
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.alpha_vantage_api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("ALPHAADVANTAGE_API_KEY not set".to_string()))
    }

    pub fn require_signature(&self) -> Result<&str> {
        self.signature
            .as_deref()
            .ok_or_else(|| AppError::Config("SIGNATURE environment variable is not set".to_string()))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            alpha_vantage_api_key: None,
            today_date: None,
            signature: None,
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            forex_rate_limit: Duration::from_secs(DEFAULT_FOREX_RATE_LIMIT_SECS),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_data_dir() {
        let settings = Settings {
            data_dir: PathBuf::from("/tmp/market"),
            ..Settings::default()
        };

        assert_eq!(
            settings.position_file("gpt-5"),
            PathBuf::from("/tmp/market/agent_data/gpt-5/position/position.jsonl")
        );
        assert_eq!(
            settings.astock_dir(),
            PathBuf::from("/tmp/market/A_stock/A_stock_data")
        );
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let settings = Settings::default();
        assert!(matches!(settings.require_api_key(), Err(AppError::Config(_))));
    }
}
