//! Configuration loading for the MSR Retest Capture engine, from
//! environment variables or a TOML document.

pub mod strategy_config;

pub use strategy_config::{SignalFilterConfig, StrategyConfig};
