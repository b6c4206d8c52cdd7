//! Shared utilities: rate parsing and address helpers.

pub mod ip_utils;
pub mod rate;

pub use ip_utils::{is_in_space, parse_endpoint};
pub use rate::{format_rate, parse_rate, Rate};
