//! Port traits the domain depends on.

pub mod config_port;
pub mod record_source;
pub mod report_port;
