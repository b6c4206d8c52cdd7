//! Conversion of `tcpdump -nn -r` text output into a raw capture summary.
//!
//! Every unindented line is one frame. Indented lines are continuations
//! (`-v` prints the IPv4 endpoints on the line after the header) and never
//! count as frames.
//!
//! The transport of an `IP`/`IP6` frame comes from the header's
//! `proto <NAME> (<n>)` / `next-header <NAME> (<n>)` field when tcpdump
//! runs with `-v`. Without it, the transport is inferred from the line
//! shape: `Flags [` is TCP, `ICMP`/`ICMP6` is ICMP, and any other frame with
//! a port on both endpoints is UDP, whatever application tcpdump decoded
//! (DNS, NTP, DHCPv6, ...). The source endpoint counts as sent and the
//! destination as received.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::record::{AddressCounters, CaptureRecord};
use crate::utils::ip_utils::parse_endpoint;

struct DumpPatterns {
    /// Match: "... IP ..." or "... IP6 ..."
    family: Regex,
    /// Match: "proto UDP (17)" or "next-header ICMPv6 (58)"
    transport: Regex,
    /// Match: "10.0.0.1.5001 > 10.0.0.2.80: <payload>"
    endpoints: Regex,
}

static PATTERNS: LazyLock<DumpPatterns> = LazyLock::new(|| DumpPatterns {
    family: Regex::new(r"(?:^|\s)IP6?\s").expect("Invalid address family regex"),
    transport: Regex::new(r"\b(?:proto|next-header)\s+(\w+)\s+\(\d+\)")
        .expect("Invalid transport regex"),
    endpoints: Regex::new(r"(\S+)\s+>\s+(\S+):(?:\s+(.*))?$").expect("Invalid endpoints regex"),
});

fn transport_name(declared: &str) -> Option<&'static str> {
    match declared.to_ascii_uppercase().as_str() {
        "TCP" => Some("TCP"),
        "UDP" => Some("UDP"),
        "ICMP" | "ICMPV6" | "ICMP6" => Some("ICMP"),
        _ => None,
    }
}

fn infer_transport(payload: &str, ported: bool) -> Option<&'static str> {
    if payload.starts_with("Flags [") {
        Some("TCP")
    } else if payload.contains("ICMP") {
        Some("ICMP")
    } else if payload.starts_with("UDP") || (ported && !payload.starts_with("sctp")) {
        Some("UDP")
    } else {
        None
    }
}

#[derive(Default)]
struct Summary {
    total: u64,
    protocols: BTreeMap<String, u64>,
    addresses: BTreeMap<IpAddr, AddressCounters>,
}

impl Summary {
    fn count_protocol(&mut self, protocol: Option<&str>) {
        if let Some(protocol) = protocol {
            *self.protocols.entry(protocol.to_string()).or_insert(0) += 1;
        }
    }

    /// Attribute a frame's endpoints; returns whether both carried a port
    fn attribute(&mut self, caps: &Captures) -> bool {
        let src = parse_endpoint(&caps[1]);
        let dst = parse_endpoint(&caps[2]);
        if let Some((address, _)) = src {
            self.addresses.entry(address).or_default().sent += 1;
        }
        if let Some((address, _)) = dst {
            self.addresses.entry(address).or_default().received += 1;
        }
        matches!((src, dst), (Some((_, Some(_))), Some((_, Some(_)))))
    }
}

/// Summarize tcpdump output as a [`CaptureRecord`] for `source`.
///
/// Addresses are not filtered here; render the record and feed it through
/// [`super::ingest::parse`] to apply the address space.
pub fn summarize_tcpdump(output: &str, source: &str) -> CaptureRecord {
    let mut summary = Summary::default();
    // A `-v` IPv4 header whose endpoints follow on the next line
    let mut awaiting_endpoints = false;

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        if line.starts_with(char::is_whitespace) {
            if std::mem::take(&mut awaiting_endpoints) {
                if let Some(caps) = PATTERNS.endpoints.captures(line.trim()) {
                    summary.attribute(&caps);
                }
            }
            continue;
        }

        awaiting_endpoints = false;
        summary.total += 1;
        let Some(family) = PATTERNS.family.find(line) else {
            continue;
        };
        let rest = &line[family.end()..];
        let endpoints = PATTERNS.endpoints.captures(rest);
        // Only the IP header may declare the transport, never the payload
        let header = &rest[..endpoints.as_ref().and_then(|c| c.get(0)).map_or(rest.len(), |m| m.start())];
        let declared = PATTERNS
            .transport
            .captures(header)
            .map(|caps| transport_name(&caps[1]));

        match endpoints {
            Some(caps) => {
                let ported = summary.attribute(&caps);
                let protocol = match declared {
                    Some(protocol) => protocol,
                    None => infer_transport(caps.get(3).map_or("", |p| p.as_str()), ported),
                };
                summary.count_protocol(protocol);
            }
            None => {
                if let Some(protocol) = declared {
                    summary.count_protocol(protocol);
                    awaiting_endpoints = true;
                }
            }
        }
    }

    CaptureRecord {
        source: source.to_string(),
        total: summary.total,
        protocols: summary.protocols,
        addresses: summary.addresses,
    }
}
