//! Evidence Locker - Backend Library
//!
//! Encrypted evidence storage for police cases: an append-only
//! chain-of-custody log, gapless file versions and case-scoped access
//! control.

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
