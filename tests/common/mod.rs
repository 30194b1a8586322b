#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use fxpilot::domain::bar::{AccountState, Bar, Tick};
use fxpilot::domain::config::{EngineConfig, Timeframe};
use fxpilot::domain::error::FxpilotError;
use fxpilot::domain::order::{OrderReceipt, PositionStatus, TradeIntent};
use fxpilot::domain::risk::VolumeConstraints;
use fxpilot::domain::signal::Direction;
use fxpilot::ports::account_port::AccountPort;
use fxpilot::ports::broker_port::BrokerPort;
use fxpilot::ports::market_data_port::MarketDataPort;
use fxpilot::ports::predictive_port::PredictivePort;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Fixed test date: 2024-03-04, a Monday.
pub fn ts(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, min, 0).unwrap()
}

/// Small periods so four bars of history are enough to trade.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        fast_ma_period: 2,
        slow_ma_period: 3,
        rsi_window: 3,
        atr_period: 3,
        max_risk_percent: 0.1,
        cooldown_secs: 0,
        ..EngineConfig::default()
    }
}

pub fn make_bar(at: DateTime<Utc>, close: f64) -> Bar {
    Bar {
        timestamp: at,
        open: close - 0.5,
        high: close + 0.2,
        low: close - 0.7,
        close,
        volume: 1_000,
    }
}

/// Closes step up 0.5 per bar, one bar per minute from 09:00.
pub fn rising_bars(count: usize, start_close: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| make_bar(ts(9, i as u32), start_close + i as f64 * 0.5))
        .collect()
}

pub fn falling_bars(count: usize, start_close: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| make_bar(ts(9, i as u32), start_close - i as f64 * 0.5))
        .collect()
}

/// Serves a fixed bar window and quote, with an optional outage switch.
pub struct MockMarket {
    bars: RefCell<Vec<Bar>>,
    tick: Cell<Tick>,
    outage: Cell<bool>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self {
            bars: RefCell::new(Vec::new()),
            tick: Cell::new(Tick {
                bid: 100.0,
                ask: 100.0,
            }),
            outage: Cell::new(false),
        }
    }

    pub fn with_bars(self, bars: Vec<Bar>) -> Self {
        if let Some(last) = bars.last() {
            self.tick.set(Tick {
                bid: last.close,
                ask: last.close,
            });
        }
        *self.bars.borrow_mut() = bars;
        self
    }

    pub fn with_tick(self, bid: f64, ask: f64) -> Self {
        self.tick.set(Tick { bid, ask });
        self
    }

    pub fn set_bars(&self, bars: Vec<Bar>) {
        if let Some(last) = bars.last() {
            self.tick.set(Tick {
                bid: last.close,
                ask: last.close,
            });
        }
        *self.bars.borrow_mut() = bars;
    }

    pub fn set_outage(&self, outage: bool) {
        self.outage.set(outage);
    }
}

impl MarketDataPort for MockMarket {
    fn fetch_bars(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, FxpilotError> {
        if self.outage.get() {
            return Err(FxpilotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "feed outage".into(),
            });
        }
        let bars = self.bars.borrow();
        if bars.len() < count {
            return Err(FxpilotError::InsufficientBars {
                symbol: symbol.to_string(),
                bars: bars.len(),
                required: count,
            });
        }
        Ok(bars[bars.len() - count..].to_vec())
    }

    fn fetch_tick(&self, symbol: &str) -> Result<Tick, FxpilotError> {
        if self.outage.get() {
            return Err(FxpilotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "feed outage".into(),
            });
        }
        Ok(self.tick.get())
    }
}

/// Broker double driven by scripted response queues. Placements and
/// modifications are recorded for assertions; an exhausted placement
/// queue panics so a test cannot silently place more orders than it
/// scripted.
pub struct MockBroker {
    place_results: RefCell<VecDeque<Result<OrderReceipt, FxpilotError>>>,
    modify_results: RefCell<VecDeque<Result<(), FxpilotError>>>,
    status_results: RefCell<VecDeque<Result<PositionStatus, FxpilotError>>>,
    pub placed: RefCell<Vec<TradeIntent>>,
    pub tokens: RefCell<Vec<String>>,
    pub modifications: RefCell<Vec<(String, f64, f64)>>,
    limits: VolumeConstraints,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            place_results: RefCell::new(VecDeque::new()),
            modify_results: RefCell::new(VecDeque::new()),
            status_results: RefCell::new(VecDeque::new()),
            placed: RefCell::new(Vec::new()),
            tokens: RefCell::new(Vec::new()),
            modifications: RefCell::new(Vec::new()),
            limits: VolumeConstraints {
                min_volume: 0.01,
                max_volume: 100.0,
                volume_step: 0.01,
            },
        }
    }

    pub fn will_fill(self, order_id: &str, fill_price: f64) -> Self {
        self.place_results.borrow_mut().push_back(Ok(OrderReceipt {
            order_id: order_id.to_string(),
            fill_price,
        }));
        self
    }

    pub fn will_timeout(self) -> Self {
        self.place_results
            .borrow_mut()
            .push_back(Err(FxpilotError::Connection {
                operation: "place_order".into(),
                reason: "timed out".into(),
            }));
        self
    }

    pub fn will_reject(self, reason: &str) -> Self {
        self.place_results
            .borrow_mut()
            .push_back(Err(FxpilotError::OrderRejected {
                reason: reason.to_string(),
            }));
        self
    }

    pub fn will_refuse_balance(self, required: f64, available: f64) -> Self {
        self.place_results
            .borrow_mut()
            .push_back(Err(FxpilotError::InsufficientBalance {
                required,
                available,
            }));
        self
    }

    pub fn will_report_open(self, current_price: f64) -> Self {
        self.status_results
            .borrow_mut()
            .push_back(Ok(PositionStatus::Open { current_price }));
        self
    }

    pub fn will_report_closed(self, close_price: f64) -> Self {
        self.status_results
            .borrow_mut()
            .push_back(Ok(PositionStatus::Closed { close_price }));
        self
    }

    pub fn will_modify_ok(self) -> Self {
        self.modify_results.borrow_mut().push_back(Ok(()));
        self
    }

    pub fn will_modify_fail(self) -> Self {
        self.modify_results
            .borrow_mut()
            .push_back(Err(FxpilotError::Connection {
                operation: "modify_order".into(),
                reason: "timed out".into(),
            }));
        self
    }

    pub fn place_count(&self) -> usize {
        self.placed.borrow().len()
    }

    pub fn distinct_tokens(&self) -> usize {
        let mut tokens = self.tokens.borrow().clone();
        tokens.sort();
        tokens.dedup();
        tokens.len()
    }
}

impl BrokerPort for MockBroker {
    fn place_order(
        &self,
        intent: &TradeIntent,
        token: &str,
    ) -> Result<OrderReceipt, FxpilotError> {
        self.placed.borrow_mut().push(intent.clone());
        self.tokens.borrow_mut().push(token.to_string());
        self.place_results
            .borrow_mut()
            .pop_front()
            .expect("unscripted place_order call")
    }

    fn modify_order(
        &self,
        order_id: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), FxpilotError> {
        self.modifications
            .borrow_mut()
            .push((order_id.to_string(), stop_loss, take_profit));
        self.modify_results
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn position_status(&self, _order_id: &str) -> Result<PositionStatus, FxpilotError> {
        self.status_results
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(PositionStatus::Open {
                current_price: 100.0,
            }))
    }

    fn volume_limits(&self, _symbol: &str) -> Result<VolumeConstraints, FxpilotError> {
        Ok(self.limits)
    }
}

/// Account double serving a scripted balance sequence, falling back to
/// the initial balance once the script runs out.
pub struct MockAccount {
    states: RefCell<VecDeque<AccountState>>,
    fallback: Cell<AccountState>,
}

impl MockAccount {
    pub fn new(balance: f64) -> Self {
        Self {
            states: RefCell::new(VecDeque::new()),
            fallback: Cell::new(AccountState {
                balance,
                equity: balance,
            }),
        }
    }

    pub fn then_balance(self, balance: f64) -> Self {
        self.states.borrow_mut().push_back(AccountState {
            balance,
            equity: balance,
        });
        self
    }
}

impl AccountPort for MockAccount {
    fn account_state(&self) -> Result<AccountState, FxpilotError> {
        Ok(self
            .states
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.fallback.get()))
    }
}

/// Predictive model double: a fixed label or a hard failure.
pub struct MockModel {
    direction: Cell<Direction>,
    failing: Cell<bool>,
}

impl MockModel {
    pub fn saying(direction: Direction) -> Self {
        Self {
            direction: Cell::new(direction),
            failing: Cell::new(false),
        }
    }

    pub fn failing() -> Self {
        let model = Self::saying(Direction::Flat);
        model.failing.set(true);
        model
    }
}

impl PredictivePort for MockModel {
    fn predict(
        &self,
        _indicators: &fxpilot::domain::indicator::IndicatorSet,
    ) -> Result<Direction, FxpilotError> {
        if self.failing.get() {
            return Err(FxpilotError::Connection {
                operation: "predict".into(),
                reason: "model unavailable".into(),
            });
        }
        Ok(self.direction.get())
    }
}
