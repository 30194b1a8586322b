//! Port traits the domain depends on.

pub mod account_port;
pub mod broker_port;
pub mod config_port;
pub mod market_data_port;
pub mod predictive_port;
