//! In-memory market replay and broker simulation.
//!
//! `ReplayFeed` serves a fixed bar series one step at a time so the same
//! scheduler that trades live can be driven over history. `SimBroker`
//! fills at the current bar close, sweeps protective levels against each
//! new bar's range, and keeps the cash ledger and equity curve the
//! summary is computed from.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::bar::{AccountState, Bar, Tick};
use crate::domain::config::Timeframe;
use crate::domain::error::FxpilotError;
use crate::domain::metrics::EquityPoint;
use crate::domain::order::{ClosedTrade, OrderReceipt, PositionStatus, Side, TradeIntent};
use crate::domain::risk::VolumeConstraints;
use crate::ports::account_port::AccountPort;
use crate::ports::broker_port::BrokerPort;
use crate::ports::market_data_port::MarketDataPort;

/// Margin held per unit of notional. 50:1 leverage.
const MARGIN_RATE: f64 = 0.02;

/// Replays a bar series as if it were arriving live. `advance` reveals
/// one more bar; fetches only ever see bars already revealed, so a
/// backtest cannot look ahead.
pub struct ReplayFeed {
    bars: Vec<Bar>,
    visible: std::cell::Cell<usize>,
}

impl ReplayFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            visible: std::cell::Cell::new(0),
        }
    }

    /// Reveal the next bar. Saturates at the end of the series.
    pub fn advance(&self) {
        let next = (self.visible.get() + 1).min(self.bars.len());
        self.visible.set(next);
    }

    pub fn revealed(&self) -> usize {
        self.visible.get()
    }

    /// Most recently revealed bar, if any.
    pub fn latest(&self) -> Option<Bar> {
        self.bars[..self.visible.get()].last().cloned()
    }
}

impl MarketDataPort for ReplayFeed {
    fn fetch_bars(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, FxpilotError> {
        let visible = self.visible.get();
        if visible == 0 {
            return Err(FxpilotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "replay has not advanced past the first bar".to_string(),
            });
        }
        if visible < count {
            return Err(FxpilotError::InsufficientBars {
                symbol: symbol.to_string(),
                bars: visible,
                required: count,
            });
        }
        Ok(self.bars[visible - count..visible].to_vec())
    }

    fn fetch_tick(&self, symbol: &str) -> Result<Tick, FxpilotError> {
        let Some(bar) = self.latest() else {
            return Err(FxpilotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "replay has not advanced past the first bar".to_string(),
            });
        };
        // Replay quotes carry no spread: both sides sit on the last close.
        Ok(Tick {
            bid: bar.close,
            ask: bar.close,
        })
    }
}

/// Live-loop wrapper for paper trading. Each bar fetch first reveals the
/// next replay bar and hands it to the simulated broker for a sweep, so
/// one scheduler tick consumes one bar of history.
pub struct PaperFeed<'a> {
    feed: &'a ReplayFeed,
    broker: &'a SimBroker,
}

impl<'a> PaperFeed<'a> {
    pub fn new(feed: &'a ReplayFeed, broker: &'a SimBroker) -> Self {
        Self { feed, broker }
    }
}

impl MarketDataPort for PaperFeed<'_> {
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, FxpilotError> {
        self.feed.advance();
        if let Some(bar) = self.feed.latest() {
            self.broker.advance(&bar);
        }
        self.feed.fetch_bars(symbol, timeframe, count)
    }

    fn fetch_tick(&self, symbol: &str) -> Result<Tick, FxpilotError> {
        self.feed.fetch_tick(symbol)
    }
}

#[derive(Debug, Clone)]
struct SimPosition {
    order_id: String,
    symbol: String,
    side: Side,
    volume: f64,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    opened_at: DateTime<Utc>,
}

struct SimState {
    balance: f64,
    current: Option<Bar>,
    position: Option<SimPosition>,
    last_closed: Option<(String, f64)>,
    trades: Vec<ClosedTrade>,
    equity: Vec<EquityPoint>,
    receipts: HashMap<String, OrderReceipt>,
    next_order: u64,
}

/// A broker that fills instantly at the current bar close and enforces
/// protective levels itself, the way a live server would.
pub struct SimBroker {
    state: RefCell<SimState>,
    limits: VolumeConstraints,
}

impl SimBroker {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            state: RefCell::new(SimState {
                balance: initial_balance,
                current: None,
                position: None,
                last_closed: None,
                trades: Vec::new(),
                equity: Vec::new(),
                receipts: HashMap::new(),
                next_order: 1,
            }),
            limits: VolumeConstraints {
                min_volume: 0.01,
                max_volume: 100.0,
                volume_step: 0.01,
            },
        }
    }

    pub fn with_volume_limits(mut self, limits: VolumeConstraints) -> Self {
        self.limits = limits;
        self
    }

    /// Move the simulated market to `bar` and sweep any open position
    /// against its range. The stop is checked before the target, so a
    /// bar that spans both resolves as a loss.
    pub fn advance(&self, bar: &Bar) {
        let mut state = self.state.borrow_mut();
        state.current = Some(bar.clone());

        let Some(position) = state.position.clone() else {
            return;
        };
        let exit = match position.side {
            Side::Buy if bar.low <= position.stop_loss => Some(position.stop_loss),
            Side::Buy if bar.high >= position.take_profit => Some(position.take_profit),
            Side::Sell if bar.high >= position.stop_loss => Some(position.stop_loss),
            Side::Sell if bar.low <= position.take_profit => Some(position.take_profit),
            _ => None,
        };
        if let Some(exit_price) = exit {
            close_position(&mut state, &position, exit_price, bar.timestamp);
        }
    }

    /// Append an equity point: cash plus unrealized profit at the
    /// current close.
    pub fn record_equity(&self, timestamp: DateTime<Utc>) {
        let mut state = self.state.borrow_mut();
        let equity = equity_value(&state);
        state.equity.push(EquityPoint { timestamp, equity });
    }

    /// Close any open position at `price`, as an end-of-data exit.
    /// Returns false when there was nothing to close.
    pub fn force_close(&self, price: f64, at: DateTime<Utc>) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(position) = state.position.clone() else {
            return false;
        };
        close_position(&mut state, &position, price, at);
        true
    }

    pub fn balance(&self) -> f64 {
        self.state.borrow().balance
    }

    pub fn closed_trades(&self) -> Vec<ClosedTrade> {
        self.state.borrow().trades.clone()
    }

    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.state.borrow().equity.clone()
    }
}

impl BrokerPort for SimBroker {
    fn place_order(
        &self,
        intent: &TradeIntent,
        token: &str,
    ) -> Result<OrderReceipt, FxpilotError> {
        let mut state = self.state.borrow_mut();

        // A token already filled returns its original receipt, so a
        // retried request cannot open a second position.
        if let Some(receipt) = state.receipts.get(token) {
            return Ok(receipt.clone());
        }
        if state.position.is_some() {
            return Err(FxpilotError::OrderRejected {
                reason: "a position is already open".to_string(),
            });
        }
        let Some(bar) = state.current.clone() else {
            return Err(FxpilotError::OrderRejected {
                reason: "no market price available".to_string(),
            });
        };

        let fill_price = bar.close;
        let required = intent.volume * fill_price * MARGIN_RATE;
        if required > state.balance {
            return Err(FxpilotError::InsufficientBalance {
                required,
                available: state.balance,
            });
        }

        let order_id = format!("sim-{}", state.next_order);
        state.next_order += 1;
        state.position = Some(SimPosition {
            order_id: order_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            volume: intent.volume,
            entry_price: fill_price,
            stop_loss: intent.stop_loss,
            take_profit: intent.take_profit,
            opened_at: bar.timestamp,
        });

        let receipt = OrderReceipt {
            order_id,
            fill_price,
        };
        state.receipts.insert(token.to_string(), receipt.clone());
        Ok(receipt)
    }

    fn modify_order(
        &self,
        order_id: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), FxpilotError> {
        let mut state = self.state.borrow_mut();
        match state.position.as_mut() {
            Some(position) if position.order_id == order_id => {
                position.stop_loss = stop_loss;
                position.take_profit = take_profit;
                Ok(())
            }
            _ => Err(FxpilotError::OrderRejected {
                reason: format!("no open order {order_id}"),
            }),
        }
    }

    fn position_status(&self, order_id: &str) -> Result<PositionStatus, FxpilotError> {
        let state = self.state.borrow();
        if let Some(position) = state.position.as_ref() {
            if position.order_id == order_id {
                let current_price = state
                    .current
                    .as_ref()
                    .map(|bar| bar.close)
                    .unwrap_or(position.entry_price);
                return Ok(PositionStatus::Open { current_price });
            }
        }
        match state.last_closed.as_ref() {
            Some((closed_id, close_price)) if closed_id == order_id => {
                Ok(PositionStatus::Closed {
                    close_price: *close_price,
                })
            }
            _ => Err(FxpilotError::OrderRejected {
                reason: format!("unknown order {order_id}"),
            }),
        }
    }

    fn volume_limits(&self, _symbol: &str) -> Result<VolumeConstraints, FxpilotError> {
        Ok(self.limits)
    }
}

impl AccountPort for SimBroker {
    fn account_state(&self) -> Result<AccountState, FxpilotError> {
        let state = self.state.borrow();
        Ok(AccountState {
            balance: state.balance,
            equity: equity_value(&state),
        })
    }
}

fn close_position(
    state: &mut SimState,
    position: &SimPosition,
    exit_price: f64,
    at: DateTime<Utc>,
) {
    let profit = match position.side {
        Side::Buy => (exit_price - position.entry_price) * position.volume,
        Side::Sell => (position.entry_price - exit_price) * position.volume,
    };
    state.balance += profit;
    state.trades.push(ClosedTrade {
        symbol: position.symbol.clone(),
        side: position.side,
        volume: position.volume,
        entry_price: position.entry_price,
        exit_price,
        opened_at: position.opened_at,
        closed_at: at,
        profit,
    });
    state.last_closed = Some((position.order_id.clone(), exit_price));
    state.position = None;
}

fn equity_value(state: &SimState) -> f64 {
    let unrealized = match (state.position.as_ref(), state.current.as_ref()) {
        (Some(position), Some(bar)) => match position.side {
            Side::Buy => (bar.close - position.entry_price) * position.volume,
            Side::Sell => (position.entry_price - bar.close) * position.volume,
        },
        _ => 0.0,
    };
    state.balance + unrealized
}
