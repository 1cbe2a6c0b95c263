//! fxsweep: intraday FX record analysis, backtesting and parameter sweeps.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod obs;
pub mod ports;
