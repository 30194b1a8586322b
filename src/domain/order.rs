//! Order lifecycle: placement with idempotent retries, a one-way trailing
//! stop, and close monitoring.
//!
//! The lifecycle is Idle → Pending → Open → (Trailing)* → Closed, with
//! Failed reachable from Pending on a rejection or exhausted retries. A
//! manager whose cycle ended in Closed or Failed can start a fresh cycle
//! on a later call to `open`.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};

use crate::domain::error::FxpilotError;
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// A fully specified order request. Build through
/// `with_protective_levels` so the stop always sits strictly on the
/// losing side of the reference price and the take-profit strictly on
/// the winning side.
#[derive(Debug, Clone)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl TradeIntent {
    pub fn with_protective_levels(
        symbol: &str,
        side: Side,
        volume: f64,
        reference_price: f64,
        stop_distance: f64,
        take_profit_ratio: f64,
    ) -> Result<Self, FxpilotError> {
        if !(volume > 0.0) {
            return Err(FxpilotError::InvalidRiskInput {
                reason: format!("volume must be positive, got {volume}"),
            });
        }
        if !(reference_price > 0.0) {
            return Err(FxpilotError::InvalidRiskInput {
                reason: format!("reference price must be positive, got {reference_price}"),
            });
        }
        if !(stop_distance > 0.0) {
            return Err(FxpilotError::InvalidRiskInput {
                reason: format!("stop distance must be positive, got {stop_distance}"),
            });
        }
        if !(take_profit_ratio > 0.0) {
            return Err(FxpilotError::InvalidRiskInput {
                reason: format!("take profit ratio must be positive, got {take_profit_ratio}"),
            });
        }

        let (stop_loss, take_profit) = match side {
            Side::Buy => (
                reference_price - stop_distance,
                reference_price + stop_distance * take_profit_ratio,
            ),
            Side::Sell => (
                reference_price + stop_distance,
                reference_price - stop_distance * take_profit_ratio,
            ),
        };

        if !(stop_loss > 0.0) || !(take_profit > 0.0) {
            return Err(FxpilotError::InvalidRiskInput {
                reason: format!(
                    "protective levels out of range: stop {stop_loss}, take profit {take_profit}"
                ),
            });
        }

        Ok(Self {
            symbol: symbol.to_string(),
            side,
            volume,
            stop_loss,
            take_profit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Idle,
    Pending,
    Open,
    Trailing,
    Closed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    pub order_id: String,
    pub state: OrderState,
}

/// Broker acknowledgement of a filled placement.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: String,
    pub fill_price: f64,
}

#[derive(Debug, Clone, Copy)]
pub enum PositionStatus {
    Open { current_price: f64 },
    Closed { close_price: f64 },
}

/// A completed round trip, as recorded by the simulator and reported by
/// the backtest summary.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Opened { order_id: String, fill_price: f64 },
    AlreadyOpen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailingOutcome {
    Tightened { new_stop: f64 },
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorOutcome {
    NoPosition,
    StillOpen { current_price: f64 },
    JustClosed { close_price: f64 },
}

pub struct OrderLifecycleManager {
    trailing_ratio: f64,
    max_retries: u32,
    retry_initial_interval: Duration,
    state: OrderState,
    position: Option<Position>,
    token_seq: u64,
}

impl OrderLifecycleManager {
    pub fn new(trailing_ratio: f64, max_retries: u32) -> Self {
        Self {
            trailing_ratio,
            max_retries,
            retry_initial_interval: Duration::from_millis(500),
            state: OrderState::Idle,
            position: None,
            token_seq: 0,
        }
    }

    /// Shrink the first retry delay. Tests use millisecond intervals.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_initial_interval = interval;
        self
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn has_open_position(&self) -> bool {
        self.position.is_some()
    }

    /// Place the order described by `intent`. At most one position per
    /// manager: a live cycle short-circuits to `AlreadyOpen` without
    /// touching the broker. Connection failures are retried with
    /// exponential backoff, reusing one idempotency token for every
    /// attempt; rejections are never retried.
    pub fn open(
        &mut self,
        broker: &dyn BrokerPort,
        intent: &TradeIntent,
        now: DateTime<Utc>,
    ) -> Result<OpenOutcome, FxpilotError> {
        if self.position.is_some() {
            return Ok(OpenOutcome::AlreadyOpen);
        }

        self.state = OrderState::Pending;
        let token = self.mint_token(&intent.symbol, now);

        match self.with_retry(|| broker.place_order(intent, &token)) {
            Ok(receipt) => {
                self.position = Some(Position {
                    symbol: intent.symbol.clone(),
                    side: intent.side,
                    volume: intent.volume,
                    entry_price: receipt.fill_price,
                    stop_loss: intent.stop_loss,
                    take_profit: intent.take_profit,
                    opened_at: now,
                    order_id: receipt.order_id.clone(),
                    state: OrderState::Open,
                });
                self.state = OrderState::Open;
                Ok(OpenOutcome::Opened {
                    order_id: receipt.order_id,
                    fill_price: receipt.fill_price,
                })
            }
            Err(e) => {
                self.state = OrderState::Failed;
                Err(e)
            }
        }
    }

    /// Ratchet the stop toward the current price. The stop only ever
    /// tightens; a candidate that does not improve on the held stop makes
    /// no broker call.
    pub fn adjust_trailing_stop(
        &mut self,
        broker: &dyn BrokerPort,
        current_price: f64,
    ) -> Result<TrailingOutcome, FxpilotError> {
        let trailing_ratio = self.trailing_ratio;
        let max_retries = self.max_retries;
        let interval = self.retry_initial_interval;
        let Some(position) = self.position.as_mut() else {
            return Ok(TrailingOutcome::Unchanged);
        };

        let candidate = match position.side {
            Side::Buy => current_price * (1.0 - trailing_ratio),
            Side::Sell => current_price * (1.0 + trailing_ratio),
        };
        let improves = match position.side {
            Side::Buy => candidate > position.stop_loss,
            Side::Sell => candidate < position.stop_loss,
        };
        if !improves {
            return Ok(TrailingOutcome::Unchanged);
        }

        retry_transient(max_retries, interval, || {
            broker.modify_order(&position.order_id, candidate, position.take_profit)
        })?;
        position.stop_loss = candidate;
        position.state = OrderState::Trailing;
        self.state = OrderState::Trailing;
        Ok(TrailingOutcome::Tightened { new_stop: candidate })
    }

    /// Query the broker for the held position. A close clears the slot so
    /// a later tick can open a fresh cycle.
    pub fn monitor(&mut self, broker: &dyn BrokerPort) -> Result<MonitorOutcome, FxpilotError> {
        let Some(position) = self.position.as_ref() else {
            return Ok(MonitorOutcome::NoPosition);
        };
        let order_id = position.order_id.clone();

        match self.with_retry(|| broker.position_status(&order_id))? {
            PositionStatus::Open { current_price } => {
                Ok(MonitorOutcome::StillOpen { current_price })
            }
            PositionStatus::Closed { close_price } => {
                self.position = None;
                self.state = OrderState::Closed;
                Ok(MonitorOutcome::JustClosed { close_price })
            }
        }
    }

    fn with_retry<T>(
        &self,
        op: impl FnMut() -> Result<T, FxpilotError>,
    ) -> Result<T, FxpilotError> {
        retry_transient(self.max_retries, self.retry_initial_interval, op)
    }

    fn mint_token(&mut self, symbol: &str, now: DateTime<Utc>) -> String {
        self.token_seq += 1;
        format!("{}-{}-{}", symbol, now.timestamp_millis(), self.token_seq)
    }
}

/// Run a broker call under exponential backoff. Attempts are capped at
/// `max_retries` in total; only transient (connection) failures re-run.
fn retry_transient<T>(
    max_retries: u32,
    initial_interval: Duration,
    mut op: impl FnMut() -> Result<T, FxpilotError>,
) -> Result<T, FxpilotError> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(initial_interval)
        .with_randomization_factor(0.0)
        .with_multiplier(2.0)
        .with_max_elapsed_time(None)
        .build();

    let mut attempt: u32 = 0;
    backoff::retry(policy, || {
        attempt += 1;
        op().map_err(|e| {
            if e.is_transient() && attempt < max_retries {
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .map_err(|e| match e {
        backoff::Error::Permanent(err) => err,
        backoff::Error::Transient { err, .. } => err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk::VolumeConstraints;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedBroker {
        place_responses: RefCell<VecDeque<Result<OrderReceipt, FxpilotError>>>,
        modify_responses: RefCell<VecDeque<Result<(), FxpilotError>>>,
        status_responses: RefCell<VecDeque<Result<PositionStatus, FxpilotError>>>,
        place_tokens: RefCell<Vec<String>>,
        modify_calls: RefCell<Vec<(String, f64, f64)>>,
    }

    impl ScriptedBroker {
        fn new() -> Self {
            Self {
                place_responses: RefCell::new(VecDeque::new()),
                modify_responses: RefCell::new(VecDeque::new()),
                status_responses: RefCell::new(VecDeque::new()),
                place_tokens: RefCell::new(Vec::new()),
                modify_calls: RefCell::new(Vec::new()),
            }
        }

        fn will_fill(self, order_id: &str, price: f64) -> Self {
            self.place_responses.borrow_mut().push_back(Ok(OrderReceipt {
                order_id: order_id.to_string(),
                fill_price: price,
            }));
            self
        }

        fn will_timeout(self) -> Self {
            self.place_responses
                .borrow_mut()
                .push_back(Err(FxpilotError::Connection {
                    operation: "place_order".to_string(),
                    reason: "timeout".to_string(),
                }));
            self
        }

        fn will_reject(self, reason: &str) -> Self {
            self.place_responses
                .borrow_mut()
                .push_back(Err(FxpilotError::OrderRejected {
                    reason: reason.to_string(),
                }));
            self
        }

        fn will_modify_ok(self) -> Self {
            self.modify_responses.borrow_mut().push_back(Ok(()));
            self
        }

        fn will_modify_fail(self) -> Self {
            self.modify_responses
                .borrow_mut()
                .push_back(Err(FxpilotError::OrderRejected {
                    reason: "modify refused".to_string(),
                }));
            self
        }

        fn will_report(self, status: PositionStatus) -> Self {
            self.status_responses.borrow_mut().push_back(Ok(status));
            self
        }

        fn place_count(&self) -> usize {
            self.place_tokens.borrow().len()
        }

        fn distinct_tokens(&self) -> usize {
            let mut tokens = self.place_tokens.borrow().clone();
            tokens.sort();
            tokens.dedup();
            tokens.len()
        }
    }

    impl BrokerPort for ScriptedBroker {
        fn place_order(
            &self,
            _intent: &TradeIntent,
            token: &str,
        ) -> Result<OrderReceipt, FxpilotError> {
            self.place_tokens.borrow_mut().push(token.to_string());
            self.place_responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected place_order call"))
        }

        fn modify_order(
            &self,
            order_id: &str,
            stop_loss: f64,
            take_profit: f64,
        ) -> Result<(), FxpilotError> {
            self.modify_calls
                .borrow_mut()
                .push((order_id.to_string(), stop_loss, take_profit));
            self.modify_responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected modify_order call"))
        }

        fn position_status(&self, _order_id: &str) -> Result<PositionStatus, FxpilotError> {
            self.status_responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected position_status call"))
        }

        fn volume_limits(&self, _symbol: &str) -> Result<VolumeConstraints, FxpilotError> {
            Ok(VolumeConstraints {
                min_volume: 0.01,
                max_volume: 100.0,
                volume_step: 0.01,
            })
        }
    }

    fn buy_intent() -> TradeIntent {
        TradeIntent::with_protective_levels("USDJPY", Side::Buy, 0.5, 150.0, 0.5, 2.0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    fn fast_manager(max_retries: u32) -> OrderLifecycleManager {
        OrderLifecycleManager::new(0.05, max_retries)
            .with_retry_interval(Duration::from_millis(1))
    }

    #[test]
    fn protective_levels_bracket_the_reference() {
        let intent = buy_intent();
        // 150 - 0.5 and 150 + 0.5 * 2
        assert!((intent.stop_loss - 149.5).abs() < 1e-9);
        assert!((intent.take_profit - 151.0).abs() < 1e-9);
        assert!(intent.stop_loss < 150.0 && intent.take_profit > 150.0);
    }

    #[test]
    fn protective_levels_mirror_for_sells() {
        let intent =
            TradeIntent::with_protective_levels("USDJPY", Side::Sell, 0.5, 150.0, 0.5, 2.0)
                .unwrap();
        assert!((intent.stop_loss - 150.5).abs() < 1e-9);
        assert!((intent.take_profit - 149.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_intents_rejected() {
        assert!(TradeIntent::with_protective_levels("USDJPY", Side::Buy, 0.0, 150.0, 0.5, 2.0)
            .is_err());
        assert!(TradeIntent::with_protective_levels("USDJPY", Side::Buy, 0.5, 150.0, 0.0, 2.0)
            .is_err());
        assert!(TradeIntent::with_protective_levels("USDJPY", Side::Buy, 0.5, 150.0, -1.0, 2.0)
            .is_err());
        assert!(TradeIntent::with_protective_levels("USDJPY", Side::Buy, 0.5, 150.0, 0.5, 0.0)
            .is_err());
        // stop distance swallows the whole price
        assert!(TradeIntent::with_protective_levels("USDJPY", Side::Buy, 0.5, 0.4, 0.5, 2.0)
            .is_err());
    }

    #[test]
    fn open_fills_and_stores_position() {
        let broker = ScriptedBroker::new().will_fill("ord-1", 150.02);
        let mut manager = fast_manager(3);

        let outcome = manager.open(&broker, &buy_intent(), now()).unwrap();

        assert_eq!(
            outcome,
            OpenOutcome::Opened {
                order_id: "ord-1".to_string(),
                fill_price: 150.02
            }
        );
        assert_eq!(manager.state(), OrderState::Open);
        let position = manager.position().unwrap();
        assert_eq!(position.order_id, "ord-1");
        assert!((position.entry_price - 150.02).abs() < 1e-9);
        assert_eq!(broker.place_count(), 1);
    }

    #[test]
    fn second_open_short_circuits_without_broker_call() {
        let broker = ScriptedBroker::new().will_fill("ord-1", 150.02);
        let mut manager = fast_manager(3);

        manager.open(&broker, &buy_intent(), now()).unwrap();
        let outcome = manager.open(&broker, &buy_intent(), now()).unwrap();

        assert_eq!(outcome, OpenOutcome::AlreadyOpen);
        assert_eq!(broker.place_count(), 1);
    }

    #[test]
    fn timeouts_retry_with_one_token_then_fill() {
        let broker = ScriptedBroker::new()
            .will_timeout()
            .will_timeout()
            .will_fill("ord-7", 150.01);
        let mut manager = fast_manager(3);

        let outcome = manager.open(&broker, &buy_intent(), now()).unwrap();

        assert!(matches!(outcome, OpenOutcome::Opened { .. }));
        assert_eq!(manager.state(), OrderState::Open);
        assert_eq!(broker.place_count(), 3);
        assert_eq!(broker.distinct_tokens(), 1);
    }

    #[test]
    fn exhausted_retries_fail_the_cycle() {
        let broker = ScriptedBroker::new().will_timeout().will_timeout().will_timeout();
        let mut manager = fast_manager(3);

        let err = manager.open(&broker, &buy_intent(), now()).unwrap_err();

        assert!(matches!(err, FxpilotError::Connection { .. }));
        assert_eq!(manager.state(), OrderState::Failed);
        assert!(manager.position().is_none());
        assert_eq!(broker.place_count(), 3);
    }

    #[test]
    fn rejection_fails_without_retry() {
        let broker = ScriptedBroker::new().will_reject("market closed");
        let mut manager = fast_manager(3);

        let err = manager.open(&broker, &buy_intent(), now()).unwrap_err();

        assert!(matches!(err, FxpilotError::OrderRejected { .. }));
        assert_eq!(manager.state(), OrderState::Failed);
        assert_eq!(broker.place_count(), 1);
    }

    #[test]
    fn failed_cycle_can_open_again() {
        let broker = ScriptedBroker::new().will_reject("market closed").will_fill("ord-2", 150.0);
        let mut manager = fast_manager(3);

        assert!(manager.open(&broker, &buy_intent(), now()).is_err());
        let outcome = manager.open(&broker, &buy_intent(), now()).unwrap();

        assert!(matches!(outcome, OpenOutcome::Opened { .. }));
        assert_eq!(manager.state(), OrderState::Open);
    }

    #[test]
    fn trailing_tightens_on_favorable_move() {
        let broker = ScriptedBroker::new().will_fill("ord-1", 150.0).will_modify_ok();
        let mut manager = fast_manager(3);
        manager.open(&broker, &buy_intent(), now()).unwrap();

        let outcome = manager.adjust_trailing_stop(&broker, 160.0).unwrap();

        // 160 * (1 - 0.05) = 152, above the original 149.5
        assert_eq!(outcome, TrailingOutcome::Tightened { new_stop: 152.0 });
        assert_eq!(manager.state(), OrderState::Trailing);
        assert!((manager.position().unwrap().stop_loss - 152.0).abs() < 1e-9);
        assert_eq!(broker.modify_calls.borrow().len(), 1);
    }

    #[test]
    fn trailing_never_loosens() {
        let broker = ScriptedBroker::new().will_fill("ord-1", 150.0).will_modify_ok();
        let mut manager = fast_manager(3);
        manager.open(&broker, &buy_intent(), now()).unwrap();
        manager.adjust_trailing_stop(&broker, 160.0).unwrap();

        // Price falls back: candidate 147.25 is below the held 152.
        let outcome = manager.adjust_trailing_stop(&broker, 155.0).unwrap();

        assert_eq!(outcome, TrailingOutcome::Unchanged);
        assert!((manager.position().unwrap().stop_loss - 152.0).abs() < 1e-9);
        assert_eq!(broker.modify_calls.borrow().len(), 1);
    }

    #[test]
    fn trailing_mirrors_for_short_positions() {
        let broker = ScriptedBroker::new().will_fill("ord-1", 150.0).will_modify_ok();
        let mut manager = fast_manager(3);
        let intent =
            TradeIntent::with_protective_levels("USDJPY", Side::Sell, 0.5, 150.0, 0.5, 2.0)
                .unwrap();
        manager.open(&broker, &intent, now()).unwrap();

        // 140 * 1.05 = 147, below the original 150.5
        let outcome = manager.adjust_trailing_stop(&broker, 140.0).unwrap();

        assert_eq!(outcome, TrailingOutcome::Tightened { new_stop: 147.0 });
    }

    #[test]
    fn trailing_without_position_is_noop() {
        let broker = ScriptedBroker::new();
        let mut manager = fast_manager(3);
        let outcome = manager.adjust_trailing_stop(&broker, 160.0).unwrap();
        assert_eq!(outcome, TrailingOutcome::Unchanged);
    }

    #[test]
    fn failed_modify_keeps_local_stop() {
        let broker = ScriptedBroker::new().will_fill("ord-1", 150.0).will_modify_fail();
        let mut manager = fast_manager(3);
        manager.open(&broker, &buy_intent(), now()).unwrap();

        assert!(manager.adjust_trailing_stop(&broker, 160.0).is_err());
        assert!((manager.position().unwrap().stop_loss - 149.5).abs() < 1e-9);
    }

    #[test]
    fn monitor_without_position_makes_no_call() {
        let broker = ScriptedBroker::new();
        let mut manager = fast_manager(3);
        assert_eq!(manager.monitor(&broker).unwrap(), MonitorOutcome::NoPosition);
    }

    #[test]
    fn monitor_reports_open_position() {
        let broker = ScriptedBroker::new()
            .will_fill("ord-1", 150.0)
            .will_report(PositionStatus::Open { current_price: 151.2 });
        let mut manager = fast_manager(3);
        manager.open(&broker, &buy_intent(), now()).unwrap();

        let outcome = manager.monitor(&broker).unwrap();

        assert_eq!(outcome, MonitorOutcome::StillOpen { current_price: 151.2 });
        assert!(manager.has_open_position());
    }

    #[test]
    fn monitor_clears_closed_position() {
        let broker = ScriptedBroker::new()
            .will_fill("ord-1", 150.0)
            .will_report(PositionStatus::Closed { close_price: 151.0 })
            .will_fill("ord-2", 151.5);
        let mut manager = fast_manager(3);
        manager.open(&broker, &buy_intent(), now()).unwrap();

        let outcome = manager.monitor(&broker).unwrap();

        assert_eq!(outcome, MonitorOutcome::JustClosed { close_price: 151.0 });
        assert_eq!(manager.state(), OrderState::Closed);
        assert!(!manager.has_open_position());

        // The slot is free for the next cycle.
        let reopened = manager.open(&broker, &buy_intent(), now()).unwrap();
        assert!(matches!(reopened, OpenOutcome::Opened { .. }));
    }
}
