use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use trader_data::api;
use trader_data::clients::{AlphaVantageClient, EastmoneyClient};
use trader_data::config::Settings;
use trader_data::pipelines::astock::{AstockFetcher, AstockOptions, RunOutcome};
use trader_data::pipelines::crypto_index::{self, IndexSpec};
use trader_data::pipelines::{forex, index_metrics, nasdaq};
use trader_data::prompts::{astock_prompt_from_files, forex_prompt_from_files};

#[derive(Parser, Debug)]
#[command(name = "trader-data")]
#[command(about = "Market data preparation and agent prompts for LLM trading agents")]
struct Cli {
    /// Root data directory (overrides DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch A-share intraday klines and merge them into the hourly CSV
    Astock {
        /// Kline period in minutes
        #[arg(long, default_value_t = 60)]
        frequency: u32,
        /// First date (YYYYMMDD) when no data exists yet
        #[arg(long, default_value = "20251001")]
        start_date: String,
        /// Always refetch from --start-date instead of resuming
        #[arg(long)]
        full: bool,
    },
    /// Fetch daily forex prices from Alpha Vantage
    ForexFetch {
        /// Pairs to fetch (defaults to the five free-tier majors)
        #[arg(long, value_delimiter = ',')]
        pairs: Option<Vec<String>>,
    },
    /// Merge per-pair forex files into forex_merged.jsonl
    ForexMerge,
    /// Merge NASDAQ-100 daily files into merged.jsonl
    NasdaqMerge {
        /// Directory holding daily_price*.json files
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Synthesize the CD5 crypto index from crypto_merged.jsonl
    CryptoIndex {
        /// Portfolio value in USDT
        #[arg(long, default_value_t = crypto_index::DEFAULT_TOTAL_VALUE)]
        total_value: f64,
        /// Purchase date for the fixed units
        #[arg(long, default_value = crypto_index::DEFAULT_BASE_DATE)]
        base_date: String,
    },
    /// Compute benchmark metrics for the CD5 index
    CryptoMetrics {
        /// First date aligned with the agent simulation
        #[arg(long, default_value = index_metrics::DEFAULT_AGENT_START_DATE)]
        agent_start_date: String,
    },
    /// Print an agent system prompt
    Prompt {
        #[arg(value_enum)]
        market: PromptMarket,
        /// Current time (overrides TODAY_DATE)
        #[arg(long)]
        today_date: Option<String>,
        /// Agent signature (overrides SIGNATURE)
        #[arg(long)]
        signature: Option<String>,
    },
    /// Serve prompts and index metrics over HTTP
    Serve,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PromptMarket {
    Astock,
    Forex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trader_data=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }

    match cli.command {
        Command::Astock {
            frequency,
            start_date,
            full,
        } => {
            let options = AstockOptions {
                frequency,
                default_start_date: start_date,
                auto_date_range: !full,
                ..AstockOptions::new(settings.astock_dir())
            };
            let fetcher = AstockFetcher::new(EastmoneyClient::new()?, options)?;
            match fetcher.run(Local::now().date_naive()).await? {
                RunOutcome::Updated(rows) => {
                    tracing::info!("Wrote {} rows to {}", rows.len(), fetcher.output_path().display())
                }
                RunOutcome::UpToDate(rows) => {
                    tracing::info!("Already up to date ({} rows)", rows.len())
                }
                RunOutcome::Empty => tracing::info!("No data available"),
            }
        }
        Command::ForexFetch { pairs } => {
            let client = AlphaVantageClient::new(settings.require_api_key()?)?;
            tracing::info!("API Key: {}", client.masked_key());
            let pairs = pairs.unwrap_or_else(forex::default_pairs);
            let fetcher = forex::ForexFetcher::new(client, settings.forex_dir(), settings.forex_rate_limit);
            fetcher.fetch_all(&pairs).await?;
        }
        Command::ForexMerge => {
            let dir = settings.forex_dir();
            forex::merge_forex_jsonl(&dir, &dir.join(forex::MERGED_FILE))?;
        }
        Command::NasdaqMerge { dir } => {
            let dir = dir.unwrap_or_else(|| settings.data_dir.clone());
            nasdaq::merge_nasdaq_jsonl(&dir, &dir.join(nasdaq::MERGED_FILE), &nasdaq::nasdaq_100_symbols())?;
        }
        Command::CryptoIndex {
            total_value,
            base_date,
        } => {
            let spec = IndexSpec {
                total_value,
                base_date,
                ..IndexSpec::cd5()
            };
            let dir = settings.crypto_dir();
            let (path, doc) = crypto_index::synthesize_index(&dir.join(crypto_index::INPUT_FILE), &dir, &spec)?;
            tracing::info!(
                "{} index: {} data points written to {}",
                spec.name,
                doc.time_series.len(),
                path.display()
            );
        }
        Command::CryptoMetrics { agent_start_date } => {
            let options = index_metrics::MetricsOptions {
                agent_start_date: Some(agent_start_date),
                ..index_metrics::MetricsOptions::cd5()
            };
            let dir = settings.crypto_dir();
            let doc = index_metrics::load_index_document(&dir.join(IndexSpec::cd5().output_file_name()))?;
            let metrics = index_metrics::compute_metrics(&doc, &options)?;
            index_metrics::write_reports(&metrics, &options, &dir)?;
            println!("{}", serde_json::to_string_pretty(&index_metrics::comparison(&metrics))?);
        }
        Command::Prompt {
            market,
            today_date,
            signature,
        } => {
            let today = match today_date.or_else(|| settings.today_date.clone()) {
                Some(date) => date,
                None => Local::now().date_naive().format("%Y-%m-%d").to_string(),
            };
            validate_today(&today)?;
            let signature = match signature {
                Some(s) => s,
                None => settings.require_signature()?.to_string(),
            };

            let prompt = match market {
                PromptMarket::Astock => astock_prompt_from_files(&settings, &today, &signature, None)?,
                PromptMarket::Forex => forex_prompt_from_files(&settings, &today, &signature, None)?,
            };
            println!("{}", prompt);
        }
        Command::Serve => serve(settings).await?,
    }

    Ok(())
}

/// Accepts `YYYY-MM-DD` with an optional time part.
fn validate_today(today: &str) -> anyhow::Result<()> {
    let date_part = today.split_whitespace().next().unwrap_or_default();
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("TODAY_DATE {:?} is not a date: {}", today, e))?;
    Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr = settings.server_addr.clone();

    // Create app state
    let app_state = Arc::new(api::AppState {
        settings: Arc::new(settings),
    });

    // Create router with state
    let app = api::create_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
