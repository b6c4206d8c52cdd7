//! Raw capture summary parsing.
//!
//! A raw summary is a line-oriented text artifact:
//!
//! ```text
//! # s1_20240101_120000
//! total 100
//! proto TCP 50
//! proto UDP 30
//! proto ICMP 5
//! host 10.0.0.1 40 12
//! ```
//!
//! Blank lines and `#` comments are skipped. Protocol counts may repeat and
//! are summed; host lines for the same address are merged.

use std::collections::BTreeMap;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::LazyLock;

use ipnet::IpNet;
use regex::Regex;

use super::record::{AddressCounters, CaptureRecord, KNOWN_PROTOCOLS, OTHER_PROTOCOL};
use crate::utils::ip_utils::is_in_space;

/// Capture ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Capture '{capture}': protocol counts sum to {protocol_sum}, above the total of {total}")]
    InconsistentCounts {
        capture: String,
        total: u64,
        protocol_sum: u64,
    },
    #[error("Capture '{capture}' line {line}: cannot parse '{content}'")]
    MalformedLine {
        capture: String,
        line: usize,
        content: String,
    },
    #[error("Capture '{0}' has protocol or host lines but no total")]
    MissingTotal(String),
    #[error("Capture file name '{0}' has no '<point>_' prefix")]
    InvalidFileName(String),
    #[error("Failed to read capture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Compiled patterns for raw summary lines
struct SummaryPatterns {
    total: Regex,
    protocol: Regex,
    host: Regex,
}

impl SummaryPatterns {
    fn new() -> Self {
        Self {
            total: Regex::new(r"^total\s+(\d+)$").expect("Invalid total regex"),
            protocol: Regex::new(r"^proto\s+([A-Za-z0-9_-]+)\s+(\d+)$")
                .expect("Invalid protocol regex"),
            host: Regex::new(r"^host\s+(\S+)\s+(\d+)\s+(\d+)$").expect("Invalid host regex"),
        }
    }
}

static PATTERNS: LazyLock<SummaryPatterns> = LazyLock::new(SummaryPatterns::new);

/// Canonical spelling for a protocol name
fn canonical_protocol(name: &str) -> String {
    if name.eq_ignore_ascii_case(OTHER_PROTOCOL) {
        return OTHER_PROTOCOL.to_string();
    }
    KNOWN_PROTOCOLS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(name))
        .map(|known| known.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Parse one raw summary into a [`CaptureRecord`].
///
/// Host lines outside `address_space` are ignored. An empty summary yields an
/// all-zero record.
pub fn parse(raw: &str, source: &str, address_space: &IpNet) -> Result<CaptureRecord, IngestError> {
    let malformed = |line: usize, content: &str| IngestError::MalformedLine {
        capture: source.to_string(),
        line,
        content: content.to_string(),
    };
    let number = |line: usize, content: &str, digits: &str| {
        digits.parse::<u64>().map_err(|_| malformed(line, content))
    };

    let mut total: Option<u64> = None;
    let mut protocols: BTreeMap<String, u64> = BTreeMap::new();
    let mut addresses: BTreeMap<IpAddr, AddressCounters> = BTreeMap::new();
    let mut ignored = 0usize;

    for (index, raw_line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = PATTERNS.total.captures(line) {
            if total.is_some() {
                return Err(malformed(line_no, line));
            }
            total = Some(number(line_no, line, &caps[1])?);
        } else if let Some(caps) = PATTERNS.protocol.captures(line) {
            let count = number(line_no, line, &caps[2])?;
            let entry = protocols.entry(canonical_protocol(&caps[1])).or_insert(0);
            *entry = entry.checked_add(count).ok_or_else(|| malformed(line_no, line))?;
        } else if let Some(caps) = PATTERNS.host.captures(line) {
            let address: IpAddr = caps[1].parse().map_err(|_| malformed(line_no, line))?;
            let counters = AddressCounters::new(
                number(line_no, line, &caps[2])?,
                number(line_no, line, &caps[3])?,
            );
            if !is_in_space(&address, address_space) {
                ignored += 1;
                continue;
            }
            addresses.entry(address).or_default().add(counters);
        } else {
            return Err(malformed(line_no, line));
        }
    }

    if ignored > 0 {
        log::debug!(
            "Capture '{}': ignored {} addresses outside {}",
            source,
            ignored,
            address_space
        );
    }

    let total = match total {
        Some(total) => total,
        None if protocols.is_empty() && addresses.is_empty() => return Ok(CaptureRecord::empty(source)),
        None => return Err(IngestError::MissingTotal(source.to_string())),
    };

    let protocol_sum = protocols
        .values()
        .try_fold(0u64, |acc, count| acc.checked_add(*count))
        .unwrap_or(u64::MAX);
    if protocol_sum > total {
        return Err(IngestError::InconsistentCounts {
            capture: source.to_string(),
            total,
            protocol_sum,
        });
    }
    let remainder = total - protocol_sum;
    if remainder > 0 {
        *protocols.entry(OTHER_PROTOCOL.to_string()).or_insert(0) += remainder;
    }

    Ok(CaptureRecord {
        source: source.to_string(),
        total,
        protocols,
        addresses,
    })
}

/// Render a record back to the raw summary format
pub fn render(record: &CaptureRecord) -> String {
    let mut out = format!("# {}\ntotal {}\n", record.source, record.total);
    for (protocol, count) in &record.protocols {
        out.push_str(&format!("proto {} {}\n", protocol, count));
    }
    for (address, counters) in &record.addresses {
        out.push_str(&format!("host {} {} {}\n", address, counters.sent, counters.received));
    }
    out
}
