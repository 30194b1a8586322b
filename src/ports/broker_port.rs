//! Broker gateway port trait.

use crate::domain::error::FxpilotError;
use crate::domain::order::{OrderReceipt, PositionStatus, TradeIntent};
use crate::domain::risk::VolumeConstraints;

pub trait BrokerPort {
    /// Submit an order. `token` identifies the intent across retries so a
    /// gateway that already accepted it must not fill twice.
    fn place_order(
        &self,
        intent: &TradeIntent,
        token: &str,
    ) -> Result<OrderReceipt, FxpilotError>;

    fn modify_order(
        &self,
        order_id: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), FxpilotError>;

    fn position_status(&self, order_id: &str) -> Result<PositionStatus, FxpilotError>;

    fn volume_limits(&self, symbol: &str) -> Result<VolumeConstraints, FxpilotError>;
}
