//! Historical replay of the trading loop.
//!
//! The backtest drives the exact `TradingScheduler` used live, one tick
//! per bar, against a `ReplayFeed` and a `SimBroker`. Nothing about the
//! decision pipeline is reimplemented here.

use std::time::Duration;

use tracing::info;

use crate::domain::bar::Bar;
use crate::domain::config::EngineConfig;
use crate::domain::error::FxpilotError;
use crate::domain::metrics::{EquityPoint, Summary};
use crate::domain::order::ClosedTrade;
use crate::domain::scheduler::{TickPorts, TradingScheduler};
use crate::domain::sim::{ReplayFeed, SimBroker};

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub summary: Summary,
    pub initial_balance: f64,
    pub final_balance: f64,
}

/// Replay `bars` through the live decision pipeline and summarize the
/// result. A position still open after the last bar is closed at that
/// bar's close so every entry produces a completed trade.
pub fn run_backtest(
    bars: &[Bar],
    config: &EngineConfig,
    initial_balance: f64,
) -> Result<BacktestReport, FxpilotError> {
    if bars.is_empty() {
        return Err(FxpilotError::DataUnavailable {
            symbol: config.symbol.clone(),
            reason: "no bars to replay".to_string(),
        });
    }
    if !(initial_balance > 0.0) {
        return Err(FxpilotError::InvalidRiskInput {
            reason: format!("initial balance must be positive, got {initial_balance}"),
        });
    }

    let feed = ReplayFeed::new(bars.to_vec());
    let broker = SimBroker::new(initial_balance);
    let mut scheduler =
        TradingScheduler::new(config.clone()).with_retry_interval(Duration::from_millis(1));
    let ports = TickPorts {
        market: &feed,
        account: &broker,
        broker: &broker,
        model: None,
    };

    info!(
        bars = bars.len(),
        symbol = %config.symbol,
        initial_balance,
        "backtest started"
    );

    for bar in bars {
        feed.advance();
        broker.advance(bar);
        scheduler.tick(&ports, bar.timestamp);
        broker.record_equity(bar.timestamp);
    }

    // Forced end-of-data exit.
    if let Some(last) = bars.last() {
        if broker.force_close(last.close, last.timestamp) {
            info!(close_price = last.close, "open position closed at end of data");
            broker.record_equity(last.timestamp);
        }
    }

    let trades = broker.closed_trades();
    let equity_curve = broker.equity_curve();
    let summary = Summary::compute(&trades, &equity_curve);
    let final_balance = broker.balance();

    info!(
        trades = trades.len(),
        final_balance,
        total_profit = summary.total_profit,
        "backtest complete"
    );

    Ok(BacktestReport {
        trades,
        equity_curve,
        summary,
        initial_balance,
        final_balance,
    })
}
