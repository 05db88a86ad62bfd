//! Core domain types and logic.

pub mod calendar;
pub mod clock;
pub mod config_validation;
pub mod error;
pub mod forecast;
pub mod ledger;
pub mod metrics;
pub mod position;
pub mod price;
pub mod strategy;
pub mod trade;
