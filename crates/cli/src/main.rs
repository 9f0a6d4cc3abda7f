//! Options Lab: technical and options-flow setup analysis from the command line
//!
//! Usage:
//!   options-lab import --symbol SPY --range 1y        : Fetch daily bars from Yahoo
//!   options-lab analyze --symbol SPY                  : Classify today's setup
//!   options-lab size --account 10000 --risk-pct 2 --premium 2.5

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use clap::{Parser, Subcommand};
use engine::aggregates::atm_iv;
use engine::risk::PositionSpec;
use engine::stops::{Side, StopLossMode};
use engine::{
    aggregate_chain, analyze, analyze_position, compute_stop_loss, generate_synthetic_chain,
    resolve_spot, resolve_spot_cached, size_position, AnalysisConfig, GexAdjustment, OptionChain,
    PositionSizeRequest, PricePoint, SetupType, StopLossRequest, TtlCache, YahooQuoteClient,
};
use persistence::Database;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

/// Spot quotes are reused for this long within one run
const SPOT_TTL: Duration = Duration::from_secs(60);
/// Days of ATM IV history behind the IV percentile
const IV_HISTORY_DAYS: i64 = 252;

#[derive(Parser)]
#[command(name = "options-lab", version = APP_VERSION)]
#[command(about = "Technical and options-flow trade setup analysis", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file overriding indicator, chain, aggregate, classifier and sizing settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load daily bars into the database (from a JSON file, or Yahoo Finance)
    Import {
        #[arg(long)]
        symbol: String,
        /// JSON array of bars; fetched from Yahoo when omitted
        #[arg(long)]
        file: Option<PathBuf>,
        /// Yahoo history range (e.g. 6mo, 1y, 2y)
        #[arg(long, default_value = "1y")]
        range: String,
    },
    /// Run the full analysis for a symbol and store the result
    Analyze {
        #[arg(long)]
        symbol: String,
        /// Chain snapshot JSON; otherwise the latest stored chain, otherwise synthetic
        #[arg(long)]
        chain_file: Option<PathBuf>,
        /// Expiration for a synthetic chain (defaults to the Friday after next week)
        #[arg(long)]
        expiration: Option<NaiveDate>,
        /// Include every snapshot in the output
        #[arg(long)]
        full: bool,
        /// Do not write aggregates or setups back to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a synthetic chain and print it with its aggregates
    Chain {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        expiration: Option<NaiveDate>,
        /// Use this spot instead of fetching a quote
        #[arg(long)]
        spot: Option<f64>,
        /// Store the generated chain
        #[arg(long)]
        save: bool,
    },
    /// Risk/reward and expected value for a position described in JSON
    Risk {
        /// Path to a position JSON file, or "-" for stdin
        #[arg(long, default_value = "-")]
        input: String,
    },
    /// Number of option contracts for a given account risk
    Size {
        #[arg(long)]
        account: Decimal,
        /// Percent of the account to risk
        #[arg(long)]
        risk_pct: Decimal,
        /// Premium per contract
        #[arg(long)]
        premium: Decimal,
        /// Implied volatility in percent
        #[arg(long)]
        iv: Option<Decimal>,
        /// conservative, neutral or aggressive
        #[arg(long, default_value = "neutral", value_parser = parse_gex)]
        gex: GexAdjustment,
    },
    /// Stop-loss level for an entry
    Stop {
        /// technical, percentage, atr, fixed or time
        #[arg(long, value_parser = parse_stop_mode)]
        mode: StopLossMode,
        #[arg(long)]
        entry: f64,
        /// long or short
        #[arg(long, default_value = "long", value_parser = parse_side)]
        side: Side,
        #[arg(long)]
        level: Option<f64>,
        #[arg(long)]
        pct: Option<f64>,
        #[arg(long)]
        atr: Option<f64>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        quantity: Option<u32>,
    },
    /// List the latest stored setups of one type
    Setups {
        /// bullish, bearish or neutral
        #[arg(long, value_parser = parse_setup_type)]
        setup_type: SetupType,
        #[arg(long, default_value_t = 0)]
        min_strength: u8,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,options_lab=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,persistence=info,options_lab=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn parse_gex(s: &str) -> Result<GexAdjustment, String> {
    match s.to_lowercase().as_str() {
        "conservative" => Ok(GexAdjustment::Conservative),
        "neutral" => Ok(GexAdjustment::Neutral),
        "aggressive" => Ok(GexAdjustment::Aggressive),
        other => Err(format!("unknown GEX adjustment: {other}")),
    }
}

fn parse_stop_mode(s: &str) -> Result<StopLossMode, String> {
    match s.to_lowercase().as_str() {
        "technical" => Ok(StopLossMode::Technical),
        "percentage" => Ok(StopLossMode::Percentage),
        "atr" => Ok(StopLossMode::Atr),
        "fixed" => Ok(StopLossMode::Fixed),
        "time" => Ok(StopLossMode::Time),
        other => Err(format!("unknown stop-loss mode: {other}")),
    }
}

fn parse_side(s: &str) -> Result<Side, String> {
    match s.to_lowercase().as_str() {
        "long" => Ok(Side::Long),
        "short" => Ok(Side::Short),
        other => Err(format!("unknown side: {other}")),
    }
}

fn parse_setup_type(s: &str) -> Result<SetupType, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Import { symbol, file, range } => cmd_import(&symbol, file, &range).await?,
        Commands::Analyze {
            symbol,
            chain_file,
            expiration,
            full,
            dry_run,
        } => cmd_analyze(&symbol, chain_file, expiration, full, dry_run, &config).await?,
        Commands::Chain {
            symbol,
            expiration,
            spot,
            save,
        } => cmd_chain(&symbol, expiration, spot, save, &config).await?,
        Commands::Risk { input } => {
            let spec: PositionSpec = serde_json::from_str(&read_input(&input)?)
                .context("Invalid position JSON")?;
            print_json(&analyze_position(&spec)?)?;
        }
        Commands::Size {
            account,
            risk_pct,
            premium,
            iv,
            gex,
        } => {
            let request = PositionSizeRequest {
                account_size: account,
                risk_percentage: risk_pct,
                option_premium: premium,
                iv,
                gex_adjustment: gex,
            };
            print_json(&size_position(&request, &config.sizing)?)?;
        }
        Commands::Stop {
            mode,
            entry,
            side,
            level,
            pct,
            atr,
            amount,
            days,
            quantity,
        } => {
            let request = StopLossRequest {
                mode,
                entry_price: entry,
                side,
                technical_level: level,
                percentage: pct,
                atr,
                fixed_amount: amount,
                holding_days: days,
                quantity,
            };
            print_json(&compute_stop_loss(&request)?)?;
        }
        Commands::Setups {
            setup_type,
            min_strength,
        } => {
            let db = open_database().await?;
            let setups = db.analysis().setups_by_type(setup_type, min_strength).await?;
            print_json(&setups)?;
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

async fn open_database() -> anyhow::Result<Database> {
    let db_path =
        std::env::var("OPTIONS_LAB_DB_PATH").unwrap_or_else(|_| "data/options_lab.db".to_string());
    Database::new(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("Database initialization failed ({db_path}): {e}"))
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        std::io::read_to_string(std::io::stdin()).context("Cannot read stdin")
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Cannot read {input}"))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First Friday at least a week after `today`
/// A stored chain is reused only if it was taken on or after the last bar's date
fn chain_is_current(chain: &OptionChain, as_of: NaiveDate) -> bool {
    DateTime::from_timestamp(chain.as_of_timestamp, 0)
        .map(|taken| taken.date_naive() >= as_of)
        .unwrap_or(false)
}

fn default_expiration(today: NaiveDate) -> NaiveDate {
    let start = today + chrono::Duration::days(7);
    let friday = Weekday::Fri.num_days_from_monday();
    let ahead = (friday + 7 - start.weekday().num_days_from_monday()) % 7;
    start + chrono::Duration::days(ahead as i64)
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_import(symbol: &str, file: Option<PathBuf>, range: &str) -> anyhow::Result<()> {
    let points: Vec<PricePoint> = match file {
        Some(path) => read_json(&path)?,
        None => YahooQuoteClient::new()
            .get_daily_history(symbol, range)
            .await
            .with_context(|| format!("Failed to fetch {symbol} history"))?,
    };

    let db = open_database().await?;
    let written = db.prices().save_prices(symbol, &points).await?;
    info!(symbol, bars = points.len(), written, "Imported price history");

    print_json(&serde_json::json!({
        "symbol": symbol,
        "bars": points.len(),
        "first": points.first().map(|p| p.date),
        "last": points.last().map(|p| p.date),
    }))
}

async fn cmd_analyze(
    symbol: &str,
    chain_file: Option<PathBuf>,
    expiration: Option<NaiveDate>,
    full: bool,
    dry_run: bool,
    config: &AnalysisConfig,
) -> anyhow::Result<()> {
    let db = open_database().await?;
    let prices = db.prices().get_prices(symbol, None).await?;
    let Some(last) = prices.last() else {
        anyhow::bail!(
            "No price history for {symbol}; run `options-lab import --symbol {symbol}` first"
        );
    };
    let as_of = last.date;

    let chain: OptionChain = match chain_file {
        Some(path) => read_json(&path)?,
        None => match db.chains().latest_chain(symbol).await? {
            Some(chain) if chain_is_current(&chain, as_of) => chain,
            stored => {
                if let Some(stale) = stored {
                    info!(
                        symbol,
                        as_of_timestamp = stale.as_of_timestamp,
                        last_bar = %as_of,
                        "Stored chain predates the last bar, regenerating"
                    );
                }
                let yahoo = YahooQuoteClient::new();
                let spot = resolve_spot(&yahoo, symbol).await;
                if spot.fallback {
                    warn!(symbol, "Synthetic chain built around the default spot");
                }
                generate_synthetic_chain(
                    symbol,
                    expiration.unwrap_or_else(|| default_expiration(as_of)),
                    Utc::now().timestamp(),
                    spot.price,
                    &config.chain,
                )
            }
        },
    };

    let analysis = db.analysis();
    let iv_history = analysis.iv_history(symbol, as_of, IV_HISTORY_DAYS).await?;
    let previous_pcr = analysis.previous_pcr(symbol, as_of).await?;

    let report = analyze(symbol, &prices, &chain, &iv_history, previous_pcr, config)?;

    if !dry_run {
        db.chains().save_chain(&chain).await?;
        analysis.save_aggregate(&report.aggregate, atm_iv(&chain)).await?;
        let classification = serde_json::to_string(&report.classification)?;
        analysis.save_setup(&report.setup, Some(&classification)).await?;
    }

    if full {
        print_json(&report)
    } else {
        print_json(&serde_json::json!({
            "ticker": report.ticker,
            "latest": report.latest_snapshot(),
            "volume": report.volume,
            "atr": report.atr,
            "aggregate": report.aggregate,
            "classification": report.classification,
            "setup": report.setup,
        }))
    }
}

async fn cmd_chain(
    symbol: &str,
    expiration: Option<NaiveDate>,
    spot: Option<f64>,
    save: bool,
    config: &AnalysisConfig,
) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();
    let spot = match spot {
        Some(s) => s,
        None => {
            let cache: TtlCache<String, f64> = TtlCache::new(64);
            resolve_spot_cached(&YahooQuoteClient::new(), &cache, SPOT_TTL, symbol)
                .await
                .price
        }
    };

    let chain = generate_synthetic_chain(
        symbol,
        expiration.unwrap_or_else(|| default_expiration(today)),
        Utc::now().timestamp(),
        spot,
        &config.chain,
    );
    let aggregate = aggregate_chain(&chain, today, &[], None, &config.aggregates);

    if save {
        let db = open_database().await?;
        db.chains().save_chain(&chain).await?;
        info!(symbol, strikes = chain.strikes.len(), "Stored synthetic chain");
    }

    print_json(&serde_json::json!({
        "chain": chain,
        "aggregate": aggregate,
    }))
}
