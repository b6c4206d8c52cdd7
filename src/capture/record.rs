//! Structured capture summaries.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Protocols counted individually; everything else lands in [`OTHER_PROTOCOL`]
pub const KNOWN_PROTOCOLS: [&str; 3] = ["TCP", "UDP", "ICMP"];

/// Remainder bucket for frames no protocol counter claimed
pub const OTHER_PROTOCOL: &str = "Other";

/// Per-address frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCounters {
    pub sent: u64,
    pub received: u64,
}

impl AddressCounters {
    pub fn new(sent: u64, received: u64) -> Self {
        Self { sent, received }
    }

    pub fn volume(&self) -> u64 {
        self.sent.saturating_add(self.received)
    }

    pub fn add(&mut self, other: AddressCounters) {
        self.sent = self.sent.saturating_add(other.sent);
        self.received = self.received.saturating_add(other.received);
    }
}

/// Summary of one capture artifact.
///
/// Protocol counts (including the `Other` remainder) sum to exactly `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Capture point that produced the artifact
    pub source: String,
    pub total: u64,
    pub protocols: BTreeMap<String, u64>,
    pub addresses: BTreeMap<IpAddr, AddressCounters>,
}

impl CaptureRecord {
    /// Record with all counters at zero
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            total: 0,
            protocols: BTreeMap::new(),
            addresses: BTreeMap::new(),
        }
    }

    pub fn protocol_count(&self, protocol: &str) -> u64 {
        self.protocols.get(protocol).copied().unwrap_or(0)
    }
}
