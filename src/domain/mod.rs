//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod config;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod order;
pub mod risk;
pub mod scheduler;
pub mod session;
pub mod signal;
pub mod sim;
