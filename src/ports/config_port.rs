//! Configuration access port.
//!
//! Values are looked up by INI section and key. Numeric values come back as
//! text and are parsed by the caller, so malformed input can be rejected.
//! `get_bool` falls back to `default` for a missing or unrecognized value.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
