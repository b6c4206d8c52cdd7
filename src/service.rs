//! Service tags identifying a traffic's service class.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label identifying a service class (e.g., "bulk", "realtime", "periodic")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTag(String);

impl ServiceTag {
    pub const BULK: &'static str = "bulk";
    pub const REALTIME: &'static str = "realtime";
    pub const PERIODIC: &'static str = "periodic";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn bulk() -> Self {
        Self::new(Self::BULK)
    }

    pub fn realtime() -> Self {
        Self::new(Self::REALTIME)
    }

    pub fn periodic() -> Self {
        Self::new(Self::PERIODIC)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}
