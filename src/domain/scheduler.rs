//! Tick orchestration.
//!
//! One `tick` runs the full decision pipeline against a single snapshot:
//! session gate, bar fetch, indicators, signal, sizing, placement. Position
//! monitoring and any due trailing adjustment run on every tick, including
//! ticks outside trading hours and ticks whose earlier stages failed. A
//! stage failure is classified and logged, never propagated out of the
//! loop; config problems were rejected at startup and cannot appear here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::domain::config::EngineConfig;
use crate::domain::error::FxpilotError;
use crate::domain::indicator;
use crate::domain::order::{
    MonitorOutcome, OpenOutcome, OrderLifecycleManager, Position, Side, TradeIntent,
    TrailingOutcome,
};
use crate::domain::risk;
use crate::domain::session::Cooldown;
use crate::domain::signal::{Direction, EntryGate, SignalGenerator};
use crate::ports::account_port::AccountPort;
use crate::ports::broker_port::BrokerPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::predictive_port::PredictivePort;

/// The collaborators a tick works against.
pub struct TickPorts<'a> {
    pub market: &'a dyn MarketDataPort,
    pub account: &'a dyn AccountPort,
    pub broker: &'a dyn BrokerPort,
    pub model: Option<&'a dyn PredictivePort>,
}

/// What a tick did, for logging and for the replay harness.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    OutsideHours,
    AwaitingData,
    Flat,
    EntriesHalted,
    Entered {
        order_id: String,
        fill_price: f64,
        volume: f64,
    },
    EntryFailed,
    Holding,
}

/// Owns all mutable trading state: the order lifecycle, the cooldown
/// marker, and the insufficient-balance halt.
pub struct TradingScheduler {
    config: EngineConfig,
    signal_generator: SignalGenerator,
    orders: OrderLifecycleManager,
    cooldown: Cooldown,
    halt_balance: Option<f64>,
}

impl TradingScheduler {
    pub fn new(config: EngineConfig) -> Self {
        let signal_generator = SignalGenerator::new(config.signal_validity());
        let orders =
            OrderLifecycleManager::new(config.trailing_stop_ratio, config.max_retries);
        let cooldown = Cooldown::new(config.cooldown_interval());
        Self {
            config,
            signal_generator,
            orders,
            cooldown,
            halt_balance: None,
        }
    }

    /// Shrink broker retry delays. Replay and tests use milliseconds.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.orders = self.orders.with_retry_interval(interval);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn position(&self) -> Option<&Position> {
        self.orders.position()
    }

    pub fn entries_halted(&self) -> bool {
        self.halt_balance.is_some()
    }

    pub fn last_trade_at(&self) -> Option<DateTime<Utc>> {
        self.cooldown.last_trade_at()
    }

    /// Run one decision cycle at `now`.
    pub fn tick(&mut self, ports: &TickPorts<'_>, now: DateTime<Utc>) -> TickOutcome {
        let outcome = if self.config.trading_hours.contains(now.time()) {
            self.evaluate_and_enter(ports, now)
        } else {
            debug!(time = %now.time(), "outside trading hours");
            TickOutcome::OutsideHours
        };

        self.monitor_and_trail(ports);
        outcome
    }

    /// Tick forever at the configured cadence. Stops when `stop` is set or
    /// after `max_ticks` cycles.
    pub fn run(&mut self, ports: &TickPorts<'_>, stop: &AtomicBool, max_ticks: Option<u64>) {
        let interval = Duration::from_secs(self.config.tick_interval_secs);
        let mut ticks: u64 = 0;

        info!(
            symbol = %self.config.symbol,
            timeframe = %self.config.timeframe,
            "trading loop started"
        );

        loop {
            if stop.load(Ordering::SeqCst) {
                info!("stop requested, shutting down");
                break;
            }

            let outcome = self.tick(ports, Utc::now());
            debug!(?outcome, "tick complete");

            ticks += 1;
            if let Some(limit) = max_ticks {
                if ticks >= limit {
                    info!(ticks, "tick budget exhausted, shutting down");
                    break;
                }
            }

            thread::sleep(interval);
        }
    }

    fn evaluate_and_enter(&mut self, ports: &TickPorts<'_>, now: DateTime<Utc>) -> TickOutcome {
        let params = self.config.indicator_params();

        let bars = match ports.market.fetch_bars(
            &self.config.symbol,
            self.config.timeframe,
            params.required_bars(),
        ) {
            Ok(bars) => bars,
            Err(e) => {
                log_stage_error("fetch_bars", &e);
                return TickOutcome::AwaitingData;
            }
        };

        let indicators = match indicator::compute(&self.config.symbol, &bars, &params) {
            Ok(set) => set,
            Err(e) => {
                log_stage_error("indicators", &e);
                return TickOutcome::AwaitingData;
            }
        };

        let label = match ports.model {
            Some(model) => match model.predict(&indicators) {
                Ok(direction) => Some(direction),
                Err(e) => {
                    warn!(error = %e, "predictive model failed, using crossover only");
                    None
                }
            },
            None => None,
        };

        let gate = EntryGate {
            position_open: self.orders.has_open_position(),
            cooldown_elapsed: self.cooldown.elapsed(now),
        };
        let signal = self.signal_generator.evaluate(&indicators, label, &gate, now);
        debug!(
            direction = ?signal.direction,
            confidence = signal.confidence,
            fast_ma = indicators.fast_ma,
            slow_ma = indicators.slow_ma,
            "signal evaluated"
        );

        if signal.direction != Direction::Buy {
            return if gate.position_open {
                TickOutcome::Holding
            } else {
                TickOutcome::Flat
            };
        }
        if !signal.is_valid_at(now) {
            debug!("signal expired before action");
            return TickOutcome::Flat;
        }

        self.try_enter(ports, indicators.atr, now)
    }

    fn try_enter(&mut self, ports: &TickPorts<'_>, atr: f64, now: DateTime<Utc>) -> TickOutcome {
        let account = match ports.account.account_state() {
            Ok(state) => state,
            Err(e) => {
                log_stage_error("account_state", &e);
                return TickOutcome::EntryFailed;
            }
        };

        if let Some(halt_balance) = self.halt_balance {
            if account.balance > halt_balance {
                info!(balance = account.balance, "balance recovered, lifting entry halt");
                self.halt_balance = None;
            } else {
                debug!(balance = account.balance, "entries halted, no new orders");
                return TickOutcome::EntriesHalted;
            }
        }

        let quote = match ports.market.fetch_tick(&self.config.symbol) {
            Ok(tick) => tick,
            Err(e) => {
                log_stage_error("fetch_tick", &e);
                return TickOutcome::EntryFailed;
            }
        };

        let limits = match ports.broker.volume_limits(&self.config.symbol) {
            Ok(limits) => limits,
            Err(e) => {
                log_stage_error("volume_limits", &e);
                return TickOutcome::EntryFailed;
            }
        };

        let volume = match risk::size_position(
            account.balance,
            atr,
            self.config.max_risk_percent,
            &limits,
        ) {
            Ok(volume) => volume,
            Err(e) => {
                error!(error = %e, "position sizing rejected, entry abandoned");
                return TickOutcome::EntryFailed;
            }
        };

        let intent = match TradeIntent::with_protective_levels(
            &self.config.symbol,
            Side::Buy,
            volume,
            quote.ask,
            atr,
            self.config.take_profit_ratio,
        ) {
            Ok(intent) => intent,
            Err(e) => {
                error!(error = %e, "trade intent rejected, entry abandoned");
                return TickOutcome::EntryFailed;
            }
        };

        match self.orders.open(ports.broker, &intent, now) {
            Ok(OpenOutcome::Opened {
                order_id,
                fill_price,
            }) => {
                self.cooldown.mark(now);
                info!(
                    order_id = %order_id,
                    fill_price,
                    volume,
                    stop_loss = intent.stop_loss,
                    take_profit = intent.take_profit,
                    "position opened"
                );
                TickOutcome::Entered {
                    order_id,
                    fill_price,
                    volume,
                }
            }
            Ok(OpenOutcome::AlreadyOpen) => TickOutcome::Holding,
            Err(e) => {
                if let FxpilotError::InsufficientBalance { .. } = &e {
                    warn!(
                        error = %e,
                        balance = account.balance,
                        "entries halted until balance recovers"
                    );
                    self.halt_balance = Some(account.balance);
                } else {
                    log_stage_error("place_order", &e);
                }
                TickOutcome::EntryFailed
            }
        }
    }

    fn monitor_and_trail(&mut self, ports: &TickPorts<'_>) {
        match self.orders.monitor(ports.broker) {
            Ok(MonitorOutcome::NoPosition) => {}
            Ok(MonitorOutcome::JustClosed { close_price }) => {
                info!(close_price, "position closed");
            }
            Ok(MonitorOutcome::StillOpen { current_price }) => {
                match self.orders.adjust_trailing_stop(ports.broker, current_price) {
                    Ok(TrailingOutcome::Tightened { new_stop }) => {
                        info!(current_price, new_stop, "trailing stop tightened");
                    }
                    Ok(TrailingOutcome::Unchanged) => {}
                    Err(e) => log_stage_error("modify_order", &e),
                }
            }
            Err(e) => log_stage_error("position_status", &e),
        }
    }
}

fn log_stage_error(stage: &str, e: &FxpilotError) {
    match e {
        FxpilotError::DataUnavailable { .. } | FxpilotError::InsufficientBars { .. } => {
            debug!(stage, error = %e, "data not ready, tick skipped");
        }
        FxpilotError::Connection { .. } => {
            error!(stage, error = %e, "connection failure");
        }
        FxpilotError::OrderRejected { .. } => {
            error!(stage, error = %e, "order rejected");
        }
        _ => {
            error!(stage, error = %e, "tick stage failed");
        }
    }
}
