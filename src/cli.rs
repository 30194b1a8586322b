//! CLI definition and dispatch.

use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::adapters::csv_bar_adapter::CsvBarAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{run_backtest, BacktestReport};
use crate::domain::config::{EngineConfig, Timeframe};
use crate::domain::config_validation::validate_engine_config;
use crate::domain::error::FxpilotError;
use crate::domain::order::Side;
use crate::domain::scheduler::{TickPorts, TradingScheduler};
use crate::domain::session::TradingWindow;
use crate::domain::sim::{PaperFeed, ReplayFeed, SimBroker};
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "fxpilot", about = "Automated single-symbol trading engine")]
pub struct Cli {
    /// Log verbosity: trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a bar file through the trading engine
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Starting account balance
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,
    },
    /// Paper-trade a bar file at live cadence
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// Starting account balance
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,
    },
    /// Validate an engine configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(&cli.log_level);

    match cli.command {
        Command::Backtest {
            config,
            data,
            balance,
        } => run_backtest_command(&config, &data, balance),
        Command::Run {
            config,
            data,
            ticks,
            balance,
        } => run_paper_command(&config, &data, ticks, balance),
        Command::Validate { config } => run_validate(&config),
    }
}

fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    // Tests dispatch several commands in one process; the first
    // subscriber stays installed.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// Resolve the full engine configuration from an INI source. Absent keys
/// take their documented defaults; `symbol` is the only required key.
pub fn build_engine_config(adapter: &dyn ConfigPort) -> Result<EngineConfig, FxpilotError> {
    let defaults = EngineConfig::default();

    let symbol = adapter
        .get_string("engine", "symbol")
        .ok_or_else(|| FxpilotError::ConfigMissing {
            section: "engine".into(),
            key: "symbol".into(),
        })?;

    let timeframe = match adapter.get_string("engine", "timeframe") {
        Some(s) => {
            s.parse::<Timeframe>()
                .map_err(|reason| FxpilotError::ConfigInvalid {
                    section: "engine".into(),
                    key: "timeframe".into(),
                    reason,
                })?
        }
        None => defaults.timeframe,
    };

    let start = parse_session_time(adapter, "trading_hours_start", defaults.trading_hours.start)?;
    let end = parse_session_time(adapter, "trading_hours_end", defaults.trading_hours.end)?;

    Ok(EngineConfig {
        symbol,
        timeframe,
        fast_ma_period: adapter.get_int("engine", "fast_ma_period", defaults.fast_ma_period as i64)
            as usize,
        slow_ma_period: adapter.get_int("engine", "slow_ma_period", defaults.slow_ma_period as i64)
            as usize,
        rsi_window: adapter.get_int("engine", "rsi_window", defaults.rsi_window as i64) as usize,
        atr_period: adapter.get_int("engine", "atr_period", defaults.atr_period as i64) as usize,
        max_risk_percent: adapter.get_double("risk", "max_risk_percent", defaults.max_risk_percent),
        take_profit_ratio: adapter.get_double(
            "risk",
            "take_profit_ratio",
            defaults.take_profit_ratio,
        ),
        trailing_stop_ratio: adapter.get_double(
            "risk",
            "trailing_stop_ratio",
            defaults.trailing_stop_ratio,
        ),
        trading_hours: TradingWindow { start, end },
        cooldown_secs: adapter.get_int("session", "cooldown_secs", defaults.cooldown_secs as i64)
            as u64,
        tick_interval_secs: adapter.get_int(
            "engine",
            "tick_interval_secs",
            defaults.tick_interval_secs as i64,
        ) as u64,
        max_retries: adapter.get_int("engine", "max_retries", defaults.max_retries as i64) as u32,
        is_demo: adapter.get_bool("engine", "is_demo", defaults.is_demo),
    })
}

fn parse_session_time(
    adapter: &dyn ConfigPort,
    key: &str,
    default: NaiveTime,
) -> Result<NaiveTime, FxpilotError> {
    match adapter.get_string("session", key) {
        Some(s) => {
            NaiveTime::parse_from_str(&s, "%H:%M").map_err(|_| FxpilotError::ConfigInvalid {
                section: "session".into(),
                key: key.into(),
                reason: "invalid time format (expected HH:MM)".into(),
            })
        }
        None => Ok(default),
    }
}

fn run_backtest_command(config_path: &PathBuf, data_path: &PathBuf, balance: f64) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate and resolve engine config
    if let Err(e) = validate_engine_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: Load bar data
    eprintln!("Loading bars from {}", data_path.display());
    let bars = match CsvBarAdapter::new(data_path.clone()).load_bars(&config.symbol) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 4: Replay
    eprintln!("Running backtest: {} over {} bars", config.symbol, bars.len());
    let report = match run_backtest(&bars, &config, balance) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 5: Print trades to stdout, summary to stderr
    print_report(&report);
    ExitCode::SUCCESS
}

fn print_report(report: &BacktestReport) {
    for trade in &report.trades {
        let side = match trade.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let sign = if trade.profit >= 0.0 { "+" } else { "" };
        println!(
            "{}  {:<4} {:>8.2} @ {:.5} -> {:.5}  {}{:.2}",
            trade.opened_at.format("%Y-%m-%d %H:%M"),
            side,
            trade.volume,
            trade.entry_price,
            trade.exit_price,
            sign,
            trade.profit,
        );
    }

    let s = &report.summary;
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Initial Balance:  {:.2}", report.initial_balance);
    eprintln!("Final Balance:    {:.2}", report.final_balance);
    eprintln!("Total Profit:     {:.2}", s.total_profit);
    eprintln!("Total Trades:     {}", s.total_trades);
    eprintln!("Win Rate:         {:.1}%", s.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", s.profit_factor);
    eprintln!("Avg Win:          {:.2}", s.avg_win);
    eprintln!("Avg Loss:         {:.2}", s.avg_loss);
    eprintln!("Max Drawdown:     -{:.1}%", s.max_drawdown * 100.0);
}

fn run_paper_command(
    config_path: &PathBuf,
    data_path: &PathBuf,
    ticks: Option<u64>,
    balance: f64,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate and resolve engine config
    if let Err(e) = validate_engine_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Live order routing is not wired up; paper trading insists on a
    // demo account so a config meant for real money cannot run here.
    if !config.is_demo {
        let e = FxpilotError::ConfigInvalid {
            section: "engine".into(),
            key: "is_demo".into(),
            reason: "paper trading requires a demo account (set is_demo = true)".into(),
        };
        eprintln!("error: {e}");
        return (&e).into();
    }

    // Stage 3: Load bar data
    eprintln!("Loading bars from {}", data_path.display());
    let bars = match CsvBarAdapter::new(data_path.clone()).load_bars(&config.symbol) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    if bars.is_empty() {
        let e = FxpilotError::DataUnavailable {
            symbol: config.symbol.clone(),
            reason: "no bars to replay".into(),
        };
        eprintln!("error: {e}");
        return (&e).into();
    }

    // Stage 4: Wire the replay feed and simulated broker into the loop
    let feed = ReplayFeed::new(bars);
    let broker = SimBroker::new(balance);
    let market = PaperFeed::new(&feed, &broker);
    let ports = TickPorts {
        market: &market,
        account: &broker,
        broker: &broker,
        model: None,
    };

    let mut scheduler = TradingScheduler::new(config);
    let stop = AtomicBool::new(false);

    eprintln!(
        "Paper trading {} (Ctrl-C to stop)",
        scheduler.config().symbol
    );
    scheduler.run(&ports, &stop, ticks);

    // Stage 5: Session summary
    let trades = broker.closed_trades();
    eprintln!("\n=== Paper Session ===");
    eprintln!("Trades:         {}", trades.len());
    eprintln!("Open Position:  {}", scheduler.position().is_some());
    eprintln!("Final Balance:  {:.2}", broker.balance());
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_engine_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nEngine:");
    eprintln!("  symbol:          {}", config.symbol);
    eprintln!("  timeframe:       {}", config.timeframe);
    eprintln!(
        "  ma periods:      {}/{}",
        config.fast_ma_period, config.slow_ma_period
    );
    eprintln!("  rsi window:      {}", config.rsi_window);
    eprintln!("  atr period:      {}", config.atr_period);
    eprintln!("  tick interval:   {}s", config.tick_interval_secs);
    eprintln!("  max retries:     {}", config.max_retries);
    eprintln!("  demo account:    {}", config.is_demo);

    eprintln!("\nRisk:");
    eprintln!(
        "  max risk:        {:.2}%",
        config.max_risk_percent * 100.0
    );
    eprintln!("  take profit:     {:.1}x stop distance", config.take_profit_ratio);
    eprintln!(
        "  trailing stop:   {:.2}%",
        config.trailing_stop_ratio * 100.0
    );

    eprintln!("\nSession:");
    eprintln!(
        "  trading hours:   {} to {}",
        config.trading_hours.start.format("%H:%M"),
        config.trading_hours.end.format("%H:%M")
    );
    eprintln!("  cooldown:        {}s", config.cooldown_secs);

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
