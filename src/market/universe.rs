//! Default symbol sets per market.

use crate::config::Settings;
use crate::pipelines::astock::{read_stock_codes, DEFAULT_STOCK_LIST};
use crate::Result;

pub use crate::pipelines::forex::default_pairs as forex_default_pairs;
pub use crate::pipelines::nasdaq::nasdaq_100_symbols;

/// SSE-50 constituents with exchange suffix (`600519.SH`), read from the
/// A-share stock list.
pub fn sse_50_symbols(settings: &Settings) -> Result<Vec<String>> {
    read_stock_codes(&settings.astock_dir().join(DEFAULT_STOCK_LIST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppError;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        }
    }

    #[test]
    fn sse_50_comes_from_stock_list() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        std::fs::create_dir_all(settings.astock_dir()).unwrap();
        std::fs::write(
            settings.astock_dir().join(DEFAULT_STOCK_LIST),
            "index_code,con_code,trade_date,weight\n\
             000016.SH,600519.SH,20250930,12.1\n\
             000016.SH,600036.SH,20250930,6.2\n\
             000016.SH,600519.SH,20250831,12.0\n",
        )
        .unwrap();

        assert_eq!(
            sse_50_symbols(&settings).unwrap(),
            vec!["600519.SH".to_string(), "600036.SH".to_string()]
        );
    }

    #[test]
    fn missing_stock_list_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            sse_50_symbols(&settings(&dir)),
            Err(AppError::NotFound(_))
        ));
    }
}
