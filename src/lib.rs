//! # Chargegate - prepaid charging session engine
//!
//! Chargegate sits between EV charging stations that speak an XML/HTTP
//! device API and a payment rail holding each station's prepaid funds.
//!
//! ## Features
//!
//! - **Cached telemetry**: staleness-bounded station snapshots with retries
//! - **Session detection**: cable connect/disconnect transitions per station
//! - **Budget metering**: charge runs stop themselves when the budget is spent
//! - **Settlement**: session costs and refunds paid through a background desk
//! - **Web Interface**: status, start/stop and live events over HTTP
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `station`: Device transport, XML decoding, telemetry and commands
//! - `engine`: Session cache, poller, detector, controller, settlement
//! - `payment`: Balance lookups and transfers
//! - `market`: Price and carbon-intensity feed
//! - `status`: Station status read model
//! - `web`: HTTP server

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod market;
pub mod payment;
pub mod station;
pub mod status;
#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use engine::ChargingEngine;
pub use error::{ChargeGateError, Result};
