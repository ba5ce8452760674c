pub mod astock;
pub mod forex;

use crate::config::Settings;
use crate::market::{self, PositionLog, PriceSource, PriceStore};
use crate::pipelines;
use crate::{AppError, Result};
use serde::Serialize;

pub const STOP_SIGNAL: &str = "<FINISH_SIGNAL>";

/// Inputs shared by every market's system prompt.
pub struct PromptContext<'a> {
    pub today_date: &'a str,
    pub signature: &'a str,
    pub symbols: &'a [String],
    pub prices: &'a dyn PriceSource,
    pub positions: &'a PositionLog,
}

pub(crate) fn render<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// A-share prompt over the hourly CSV under the configured data directory.
/// `symbols` defaults to the SSE-50 stock list, or to every stock in the CSV
/// when no list is available.
pub fn astock_prompt_from_files(
    settings: &Settings,
    today_date: &str,
    signature: &str,
    symbols: Option<Vec<String>>,
) -> Result<String> {
    require("today_date", today_date)?;
    require("signature", signature)?;

    let store = PriceStore::from_astock_csv(&settings.astock_dir().join(astock::HOURLY_FILE))?;
    let symbols = match symbols {
        Some(symbols) => symbols,
        None => market::sse_50_symbols(settings).unwrap_or_else(|e| {
            tracing::warn!("SSE-50 list unavailable ({}), using every stock in the CSV", e);
            store.symbols()
        }),
    };
    let positions = PositionLog::new(settings.position_file(signature));

    astock::build_astock_prompt(&PromptContext {
        today_date,
        signature,
        symbols: &symbols,
        prices: &store,
        positions: &positions,
    })
}

/// Forex prompt over the merged forex JSONL. `pairs` defaults to the
/// free-tier major pairs.
pub fn forex_prompt_from_files(
    settings: &Settings,
    today_date: &str,
    signature: &str,
    pairs: Option<Vec<String>>,
) -> Result<String> {
    require("today_date", today_date)?;
    require("signature", signature)?;

    let store = PriceStore::from_jsonl(&settings.forex_dir().join(pipelines::forex::MERGED_FILE))?;
    let pairs = pairs.unwrap_or_else(market::forex_default_pairs);
    let positions = PositionLog::new(settings.position_file(signature));

    forex::build_forex_prompt(&PromptContext {
        today_date,
        signature,
        symbols: &pairs,
        prices: &store,
        positions: &positions,
    })
}
