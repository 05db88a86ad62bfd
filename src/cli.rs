//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    DEFAULT_START_DATE, DEFAULT_STOP_DATE, config_date, parse_date, validate_backtest_config,
    validate_data_config, validate_model_config,
};
use crate::domain::error::WalkforwardError;
use crate::domain::forecast::{ModelConfig, ModelKind, build_model};
use crate::domain::position::ExitPrecedence;
use crate::domain::price::PriceField;
use crate::domain::strategy::StrategyParams;
use crate::domain::trade::{TradeConfig, TradeOutcome, run_trade};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "walkforward", about = "Walk-forward trading strategy backtester")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a walk-forward backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
        /// arima or neural
        #[arg(long)]
        model: Option<String>,
        /// First simulated day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Exclusive end of the simulated window (YYYY-MM-DD)
        #[arg(long)]
        stop: Option<String>,
        /// CSV file for the per-day asset history
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the data range for a ticker
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
    /// List tickers available in the configured data source
    ListTickers {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub ticker: Option<String>,
    pub model: Option<String>,
    pub start: Option<String>,
    pub stop: Option<String>,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            ticker,
            model,
            start,
            stop,
            output,
        } => {
            let overrides = Overrides {
                ticker,
                model,
                start,
                stop,
            };
            run_backtest(&config, &overrides, output.as_deref())
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
        Command::ListTickers { config } => run_list_tickers(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn fail(e: WalkforwardError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

fn run_backtest(config_path: &Path, overrides: &Overrides, output: Option<&Path>) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate before touching any data
    let validated = validate_backtest_config(&adapter)
        .and_then(|_| validate_model_config(&adapter))
        .and_then(|_| validate_data_config(&adapter));
    if let Err(e) = validated {
        return fail(e);
    }

    // Stage 3: Build run and model parameters
    let trade_config = match build_trade_config(&adapter, overrides) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let model_config = match build_model_config(&adapter, overrides.model.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // Stage 4: Open the data source
    let data_port = match open_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let output = output
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_string("report", "output").map(PathBuf::from));

    run_backtest_pipeline(
        data_port.as_ref(),
        &trade_config,
        &model_config,
        output.as_deref(),
    )
}

/// Stages 5-7: simulate, summarise, report.
pub fn run_backtest_pipeline(
    data_port: &dyn MarketDataPort,
    trade_config: &TradeConfig,
    model_config: &ModelConfig,
    output: Option<&Path>,
) -> ExitCode {
    // Stage 5: Simulate
    let model = build_model(model_config);
    eprintln!(
        "Running {} on {}: {} to {}",
        model.name(),
        trade_config.ticker,
        trade_config.start_date,
        trade_config.stop_date,
    );
    let outcome = match run_trade(data_port, trade_config, model) {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    // Stage 6: Summary to stderr, result record to stdout
    print_summary(&outcome);
    println!("{}", outcome.result);

    // Stage 7: Optional report
    if let Some(path) = output {
        if let Err(e) = CsvReportAdapter.write(&outcome, path) {
            return fail(e);
        }
        eprintln!("\nReport written to: {}", path.display());
    }

    ExitCode::SUCCESS
}

fn print_summary(outcome: &TradeOutcome) {
    let m = &outcome.metrics;
    eprintln!("\n=== Results ({}) ===", outcome.model);
    eprintln!("Days simulated:   {}", outcome.dates.len());
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    eprintln!("Buy and Hold:     {:.1}%", outcome.result.possible_pct);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!(
        "Max Drawdown:     -{:.1}% ({} days)",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
    eprintln!("Total Trades:     {}", m.trades.total());
    eprintln!("Win Rate:         {:.1}%", m.trades.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", m.trades.profit_factor);
    eprintln!("Avg Holding:      {:.1} days", m.trades.avg_holding_days);
    if let Some(date) = outcome.halted_on {
        eprintln!("Stop-loss budget breached on {date}; no entries after that day");
    }
}

fn usize_key(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<usize, WalkforwardError> {
    let value = config.get_int(section, key, default);
    usize::try_from(value)
        .map_err(|_| WalkforwardError::invalid(section, key, format!("{key} must be non-negative")))
}

pub fn build_trade_config(
    config: &dyn ConfigPort,
    overrides: &Overrides,
) -> Result<TradeConfig, WalkforwardError> {
    let ticker = overrides
        .ticker
        .clone()
        .or_else(|| config.get_string("backtest", "ticker"))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "aapl".to_string());

    let start_date = match &overrides.start {
        Some(s) => parse_date(s, "start_date")?,
        None => config_date(config, "start_date", DEFAULT_START_DATE)?,
    };
    let stop_date = match &overrides.stop {
        Some(s) => parse_date(s, "stop_date")?,
        None => config_date(config, "stop_date", DEFAULT_STOP_DATE)?,
    };

    let exit_precedence = match config.get_string("backtest", "exit_precedence") {
        Some(s) => ExitPrecedence::parse(&s).ok_or_else(|| {
            WalkforwardError::invalid("backtest", "exit_precedence", format!("unrecognised value '{s}'"))
        })?,
        None => ExitPrecedence::default(),
    };
    let price_field = match config.get_string("backtest", "price_field") {
        Some(s) => PriceField::parse(&s).ok_or_else(|| {
            WalkforwardError::invalid("backtest", "price_field", format!("unrecognised value '{s}'"))
        })?,
        None => PriceField::default(),
    };

    Ok(TradeConfig {
        ticker,
        start_date,
        stop_date,
        starting_capital: config.get_double("backtest", "starting_capital", 5000.0),
        loss_fraction: config.get_double("backtest", "loss_fraction", 0.30),
        share_pct: config.get_double("backtest", "share_pct", 1.0),
        signal_threshold: config.get_double("backtest", "signal_threshold", 0.0),
        exit_precedence,
        price_field,
        risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
        strategy: StrategyParams {
            trigger_pct: config.get_double("backtest", "trigger_pct", 0.03),
            hold_time: usize_key(config, "backtest", "hold_time", 5)?,
            return_window: usize_key(config, "backtest", "return_window", 5)?,
            allow_shorting: config.get_bool("backtest", "allow_shorting", true),
            close_on_reversal: config.get_bool("backtest", "close_on_reversal", true),
        },
    })
}

pub fn build_model_config(
    config: &dyn ConfigPort,
    model_override: Option<&str>,
) -> Result<ModelConfig, WalkforwardError> {
    let kind = match model_override
        .map(str::to_string)
        .or_else(|| config.get_string("model", "kind"))
    {
        Some(s) => ModelKind::parse(&s).ok_or_else(|| {
            WalkforwardError::invalid("model", "kind", format!("unrecognised model '{s}'"))
        })?,
        None => ModelKind::default(),
    };

    let defaults = ModelConfig::default();
    let seed = config.get_int("model", "seed", defaults.seed as i64);
    Ok(ModelConfig {
        kind,
        ar_order: usize_key(config, "model", "ar_order", defaults.ar_order as i64)?,
        diff_order: usize_key(config, "model", "diff_order", defaults.diff_order as i64)?,
        epochs: usize_key(config, "model", "epochs", defaults.epochs as i64)?,
        width: usize_key(config, "model", "width", defaults.width as i64)?,
        lookback: usize_key(config, "model", "lookback", defaults.lookback as i64)?,
        learning_rate: config.get_double("model", "learning_rate", defaults.learning_rate),
        seed: u64::try_from(seed)
            .map_err(|_| WalkforwardError::invalid("model", "seed", "seed must be non-negative"))?,
    })
}

pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, WalkforwardError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string())
        .trim()
        .to_lowercase();

    match source.as_str() {
        "csv" => {
            let path = config.require_string("data", "path")?;
            eprintln!("Reading prices from {path}");
            Ok(Box::new(CsvAdapter::new(path)))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            let adapter = SqliteAdapter::from_config(config)?;
            eprintln!("Reading prices from sqlite");
            Ok(Box::new(adapter))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(WalkforwardError::invalid(
            "data",
            "source",
            "sqlite feature is required for source = sqlite",
        )),
        other => Err(WalkforwardError::invalid(
            "data",
            "source",
            format!("unknown source '{other}', expected csv or sqlite"),
        )),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let validated = validate_backtest_config(&adapter)
        .and_then(|_| validate_model_config(&adapter))
        .and_then(|_| validate_data_config(&adapter));
    if let Err(e) = validated {
        return fail(e);
    }

    let trade = match build_trade_config(&adapter, &Overrides::default()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let model = match build_model_config(&adapter, None) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    eprintln!("\nSections: {}", adapter.sections().join(", "));
    eprintln!("\nRun:");
    eprintln!("  ticker:           {}", trade.ticker);
    eprintln!("  window:           {} to {}", trade.start_date, trade.stop_date);
    eprintln!("  starting capital: {:.2}", trade.starting_capital);
    eprintln!("  stop-loss budget: {:.2}", trade.stop_loss_budget());
    eprintln!("  trigger pct:      {}", trade.strategy.trigger_pct);
    eprintln!("  share pct:        {}", trade.share_pct);
    eprintln!("  hold time:        {} days", trade.strategy.hold_time);
    eprintln!("\nModel:");
    eprintln!("  {}", build_model(&model).name());

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, ticker: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let tickers = match ticker {
        Some(t) => vec![t.to_string()],
        None => match config.get_string("backtest", "ticker") {
            Some(t) => vec![t],
            None => match data_port.list_tickers() {
                Ok(t) => t,
                Err(e) => return fail(e),
            },
        },
    };

    for t in &tickers {
        match data_port.data_range(t) {
            Ok(Some((first, last, count))) => {
                println!("{t}: {count} days, {first} to {last}");
            }
            Ok(None) => eprintln!("{t}: no data found"),
            Err(e) => eprintln!("error querying {t}: {e}"),
        }
    }
    ExitCode::SUCCESS
}

fn run_list_tickers(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let tickers = match data_port.list_tickers() {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    if tickers.is_empty() {
        eprintln!("No tickers found");
    } else {
        for t in &tickers {
            println!("{t}");
        }
        eprintln!("{} tickers found", tickers.len());
    }
    ExitCode::SUCCESS
}
