//! ORB — Opening-range-breakout intraday signal engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod platforms;
pub mod notify;
pub mod strategy;
pub mod engine;
