//! Benchmark performance metrics for a synthesized index document.

use crate::types::{IndexComparison, IndexMetrics, SeriesDocument, CLOSE, SELL_PRICE};
use crate::{AppError, Result};
use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_AGENT_START_DATE: &str = "2025-11-02";
pub const CRYPTO_TRADING_DAYS: u32 = 365;
pub const RISK_FREE_RATE: f64 = 0.02;

#[derive(Debug, Clone)]
pub struct MetricsOptions {
    pub index_name: String,
    pub market: String,
    pub agent_start_date: Option<String>,
    pub trading_days_per_year: u32,
    pub risk_free_rate: f64,
    pub composition: BTreeMap<String, f64>,
}

impl MetricsOptions {
    pub fn cd5() -> Self {
        Self {
            index_name: "CD5".to_string(),
            market: "crypto".to_string(),
            agent_start_date: Some(DEFAULT_AGENT_START_DATE.to_string()),
            trading_days_per_year: CRYPTO_TRADING_DAYS,
            risk_free_rate: RISK_FREE_RATE,
            composition: BTreeMap::from([
                ("BTC".to_string(), 74.56),
                ("ETH".to_string(), 15.97),
                ("XRP".to_string(), 5.20),
                ("SOL".to_string(), 3.53),
                ("ADA".to_string(), 0.76),
            ]),
        }
    }
}

/// Percentage change between consecutive values.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

pub fn annualized_volatility(returns: &[f64], trading_days: u32) -> f64 {
    sample_std(returns) * f64::from(trading_days).sqrt()
}

pub fn sharpe_ratio(returns: &[f64], trading_days: u32, risk_free_rate: f64) -> f64 {
    let vol = annualized_volatility(returns, trading_days);
    if vol == 0.0 {
        return 0.0;
    }
    (mean(returns) * f64::from(trading_days) - risk_free_rate) / vol
}

pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
}

/// Largest peak-to-trough decline as a negative fraction, with the peak and
/// trough dates.
pub fn max_drawdown(series: &[(String, f64)]) -> (f64, String, String) {
    let Some((first_date, first_value)) = series.first() else {
        return (0.0, String::new(), String::new());
    };

    let mut peak = *first_value;
    let mut peak_date = first_date.clone();
    let mut worst = 0.0;
    let mut start = first_date.clone();
    let mut end = first_date.clone();

    for (date, value) in series {
        if *value > peak {
            peak = *value;
            peak_date = date.clone();
        }
        if peak > 0.0 {
            let drawdown = value / peak - 1.0;
            if drawdown < worst {
                worst = drawdown;
                start = peak_date.clone();
                end = date.clone();
            }
        }
    }
    (worst, start, end)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Close values by date, aligned to the agent start date when present.
pub fn aligned_closes(doc: &SeriesDocument, agent_start_date: Option<&str>) -> Result<Vec<(String, f64)>> {
    let mut closes = Vec::with_capacity(doc.time_series.len());
    for (date, bar) in &doc.time_series {
        let raw = bar
            .get(CLOSE)
            .or_else(|| bar.get(SELL_PRICE))
            .ok_or_else(|| AppError::Validation(format!("Missing close on {}", date)))?;
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| AppError::Validation(format!("Bad close {:?} on {}: {}", raw, date, e)))?;
        closes.push((date.clone(), value));
    }

    if let Some(start) = agent_start_date {
        match closes.iter().position(|(d, _)| d == start) {
            Some(idx) => {
                tracing::info!("Time alignment: starting from {}", start);
                closes.drain(..idx);
            }
            None => tracing::warn!("{} data not found, using all available data", start),
        }
    }
    Ok(closes)
}

pub fn compute_metrics(doc: &SeriesDocument, options: &MetricsOptions) -> Result<IndexMetrics> {
    let closes = aligned_closes(doc, options.agent_start_date.as_deref())?;
    if closes.len() < 2 {
        return Err(AppError::Validation(format!(
            "Need at least two data points for metrics, got {}",
            closes.len()
        )));
    }

    let values: Vec<f64> = closes.iter().map(|(_, v)| *v).collect();
    let (start_date, initial_value) = closes[0].clone();
    let (end_date, final_value) = closes[closes.len() - 1].clone();

    let returns = daily_returns(&values);
    let n = options.trading_days_per_year;
    let volatility = annualized_volatility(&returns, n);
    let sharpe = sharpe_ratio(&returns, n, options.risk_free_rate);
    let wins = win_rate(&returns);
    let (drawdown, drawdown_start, drawdown_end) = max_drawdown(&closes);
    let cumulative = if initial_value != 0.0 {
        final_value / initial_value - 1.0
    } else {
        0.0
    };

    let days = match (
        NaiveDate::parse_from_str(&start_date, "%Y-%m-%d"),
        NaiveDate::parse_from_str(&end_date, "%Y-%m-%d"),
    ) {
        (Ok(s), Ok(e)) => (e - s).num_days(),
        _ => 0,
    };
    let annualized = if days > 0 {
        (1.0 + cumulative).powf(365.0 / days as f64) - 1.0
    } else {
        0.0
    };

    let daily_volatility = sample_std(&returns);
    let mean_return = mean(&returns);

    tracing::info!(
        "{} {} to {}: cumulative {:.2}%, annualized {:.2}%, sharpe {:.4}, max drawdown {:.2}%",
        options.index_name,
        start_date,
        end_date,
        cumulative * 100.0,
        annualized * 100.0,
        sharpe,
        drawdown * 100.0
    );

    Ok(IndexMetrics {
        evaluation_time: Local::now().to_rfc3339(),
        model_name: format!("{} Index", options.index_name),
        market: options.market.clone(),
        trading_days: closes.len(),
        start_date,
        end_date,
        initial_value,
        final_value,
        value_change: final_value - initial_value,
        cumulative_return: round_to(cumulative, 4),
        annualized_return: round_to(annualized, 4),
        sharpe_ratio: round_to(sharpe, 4),
        max_drawdown: round_to(drawdown, 4),
        max_drawdown_start: drawdown_start,
        max_drawdown_end: drawdown_end,
        volatility: round_to(volatility, 4),
        win_rate: round_to(wins, 4),
        trading_days_with_data: returns.len(),
        investment_days: days,
        daily_returns_count: returns.len(),
        daily_volatility: round_to(daily_volatility, 6),
        mean_daily_return: round_to(mean_return, 6),
        annualized_return_for_sharpe: round_to(mean_return * f64::from(n), 4),
        risk_free_rate: options.risk_free_rate,
        trading_days_per_year: n,
        composition: options.composition.clone(),
        notes: format!(
            "{} Index benchmark, using {} trading days for annualized metrics",
            options.index_name, n
        ),
    })
}

pub fn comparison(metrics: &IndexMetrics) -> IndexComparison {
    IndexComparison {
        model_name: metrics.model_name.clone(),
        status: "Benchmark".to_string(),
        trading_days: metrics.trading_days,
        start_date: metrics.start_date.clone(),
        end_date: metrics.end_date.clone(),
        cumulative_return: metrics.cumulative_return,
        annualized_return: metrics.annualized_return,
        sharpe_ratio: metrics.sharpe_ratio,
        max_drawdown: metrics.max_drawdown,
        volatility: metrics.volatility,
        win_rate: metrics.win_rate,
        initial_value: metrics.initial_value,
        final_value: metrics.final_value,
        value_change: metrics.value_change,
        value_change_percent: metrics.cumulative_return,
        is_benchmark: true,
    }
}

/// Files written by [`write_reports`].
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub timestamped: PathBuf,
    pub latest: PathBuf,
    pub comparison: PathBuf,
}

pub fn write_reports(
    metrics: &IndexMetrics,
    options: &MetricsOptions,
    output_dir: &Path,
) -> Result<ReportFiles> {
    std::fs::create_dir_all(output_dir)?;
    let name = &options.index_name;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");

    let files = ReportFiles {
        timestamped: output_dir.join(format!("{}_metrics_{}.json", name, stamp)),
        latest: output_dir.join(format!("{}_latest_metrics.json", name)),
        comparison: output_dir.join(format!("{}_for_comparison.json", name)),
    };

    let detailed = serde_json::to_string_pretty(metrics)?;
    std::fs::write(&files.timestamped, &detailed)?;
    std::fs::write(&files.latest, &detailed)?;
    std::fs::write(
        &files.comparison,
        serde_json::to_string_pretty(&comparison(metrics))?,
    )?;

    tracing::info!(
        "{} metrics saved to {} (latest: {}, comparison: {})",
        name,
        files.timestamped.display(),
        files.latest.display(),
        files.comparison.display()
    );
    Ok(files)
}

pub fn load_index_document(path: &Path) -> Result<SeriesDocument> {
    if !path.exists() {
        return Err(AppError::NotFound(format!(
            "Index file {} does not exist",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OPEN;
    use tempfile::TempDir;

    fn doc(closes: &[(&str, f64)]) -> SeriesDocument {
        SeriesDocument {
            meta: BTreeMap::new(),
            time_series: closes
                .iter()
                .map(|(d, c)| {
                    (
                        d.to_string(),
                        BTreeMap::from([
                            (OPEN.to_string(), format!("{:.4}", c)),
                            (CLOSE.to_string(), format!("{:.4}", c)),
                        ]),
                    )
                })
                .collect(),
        }
    }

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn returns_and_win_rate() {
        let r = daily_returns(&[100.0, 110.0, 99.0, 99.0]);
        assert_eq!(r.len(), 3);
        assert!(close_to(r[0], 0.1));
        assert!(close_to(r[1], -0.1));
        assert!(close_to(win_rate(&r), 1.0 / 3.0));
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        assert!(close_to(sample_std(&[1.0, 2.0, 3.0, 4.0]), (5.0f64 / 3.0).sqrt()));
        assert_eq!(sample_std(&[1.0]), 0.0);
        assert_eq!(sharpe_ratio(&[0.01], 365, 0.02), 0.0);
    }

    #[test]
    fn drawdown_tracks_peak_and_trough() {
        let series: Vec<(String, f64)> = [
            ("d1", 100.0),
            ("d2", 120.0),
            ("d3", 90.0),
            ("d4", 130.0),
            ("d5", 110.0),
        ]
        .iter()
        .map(|(d, v)| (d.to_string(), *v))
        .collect();

        let (dd, start, end) = max_drawdown(&series);
        assert!(close_to(dd, -0.25));
        assert_eq!((start.as_str(), end.as_str()), ("d2", "d3"));
    }

    #[test]
    fn alignment_drops_dates_before_agent_start() {
        let d = doc(&[("2025-11-01", 1.0), ("2025-11-02", 2.0), ("2025-11-03", 3.0)]);
        let aligned = aligned_closes(&d, Some("2025-11-02")).unwrap();
        assert_eq!(aligned[0].0, "2025-11-02");

        let all = aligned_closes(&d, Some("2024-01-01")).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn metrics_for_a_short_series() {
        let d = doc(&[
            ("2025-11-01", 40_000.0),
            ("2025-11-02", 50_000.0),
            ("2025-11-03", 55_000.0),
            ("2025-11-04", 49_500.0),
        ]);
        let m = compute_metrics(&d, &MetricsOptions::cd5()).unwrap();

        assert_eq!(m.start_date, "2025-11-02");
        assert_eq!(m.trading_days, 3);
        assert_eq!(m.investment_days, 2);
        assert_eq!(m.cumulative_return, -0.01);
        assert_eq!(m.max_drawdown, -0.1);
        assert_eq!(m.win_rate, 0.5);
        assert_eq!(m.max_drawdown_start, "2025-11-03");
        assert_eq!(m.model_name, "CD5 Index");
        assert!(close_to(m.value_change, -500.0));
    }

    #[test]
    fn single_point_is_rejected() {
        let d = doc(&[("2025-11-02", 1.0)]);
        assert!(matches!(
            compute_metrics(&d, &MetricsOptions::cd5()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn reports_are_written() {
        let dir = TempDir::new().unwrap();
        let d = doc(&[("2025-11-02", 100.0), ("2025-11-03", 101.0)]);
        let options = MetricsOptions::cd5();
        let m = compute_metrics(&d, &options).unwrap();

        let files = write_reports(&m, &options, dir.path()).unwrap();

        let cmp: IndexComparison =
            serde_json::from_str(&std::fs::read_to_string(&files.comparison).unwrap()).unwrap();
        assert!(cmp.is_benchmark);
        assert_eq!(cmp.cumulative_return, 0.01);
        assert!(files.latest.exists());
        assert!(files.timestamped.exists());

        let latest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.latest).unwrap()).unwrap();
        assert_eq!(latest["cd5_composition"]["BTC"], 74.56);
        assert!(latest.get("composition").is_none());
    }
}
