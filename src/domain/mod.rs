//! Core domain types and logic.

pub mod bar;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod optimizer;
pub mod position;
pub mod record;
pub mod series;
pub mod stats;
pub mod strategy;
pub mod timestamp;
