//! Aggregation of capture records.
//!
//! [`aggregate`] is a pure fold over [`CaptureRecord`]s. All counters are
//! integers; percentages are derived only when a report is rendered.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use serde::Serialize;

use crate::capture::{AddressCounters, CaptureRecord};
use crate::service::ServiceTag;

/// Resolves an address to the service class it belongs to
pub trait ClassLookup {
    fn class_of(&self, address: &IpAddr) -> Option<ServiceTag>;
}

impl<F> ClassLookup for F
where
    F: Fn(&IpAddr) -> Option<ServiceTag>,
{
    fn class_of(&self, address: &IpAddr) -> Option<ServiceTag> {
        self(address)
    }
}

/// Cross-capture rollup of a run's capture records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub capture_count: usize,
    pub total_frames: u64,
    pub protocol_totals: BTreeMap<String, u64>,
    pub per_point_totals: BTreeMap<String, u64>,
    pub per_point_protocols: BTreeMap<String, BTreeMap<String, u64>>,
    pub address_totals: BTreeMap<IpAddr, AddressCounters>,
    /// Sent/received frames of addresses with a resolvable class
    pub class_totals: BTreeMap<ServiceTag, AddressCounters>,
    /// Sent plus received frames of addresses without a class
    pub unclassified_volume: u64,
    pub unclassified_addresses: BTreeSet<IpAddr>,
}

fn add_counts(into: &mut BTreeMap<String, u64>, from: &BTreeMap<String, u64>) {
    for (key, count) in from {
        let entry = into.entry(key.clone()).or_insert(0);
        *entry = entry.saturating_add(*count);
    }
}

impl AggregateReport {
    /// Fold one record into the running totals
    fn absorb(mut self, record: &CaptureRecord) -> Self {
        self.capture_count += 1;
        self.total_frames = self.total_frames.saturating_add(record.total);
        add_counts(&mut self.protocol_totals, &record.protocols);

        let point_total = self.per_point_totals.entry(record.source.clone()).or_insert(0);
        *point_total = point_total.saturating_add(record.total);
        add_counts(
            self.per_point_protocols.entry(record.source.clone()).or_default(),
            &record.protocols,
        );

        for (address, counters) in &record.addresses {
            self.address_totals.entry(*address).or_default().add(*counters);
        }
        self
    }

    /// Resolve every observed address to a class
    fn classify(mut self, lookup: &dyn ClassLookup) -> Self {
        for (address, counters) in &self.address_totals {
            match lookup.class_of(address) {
                Some(tag) => self.class_totals.entry(tag).or_default().add(*counters),
                None => {
                    self.unclassified_volume = self.unclassified_volume.saturating_add(counters.volume());
                    self.unclassified_addresses.insert(*address);
                }
            }
        }
        self
    }

    /// Sent plus received frames across all observed addresses
    pub fn address_volume(&self) -> u64 {
        self.address_totals
            .values()
            .fold(0u64, |acc, c| acc.saturating_add(c.volume()))
    }

    /// The report's global totals as one synthetic capture record
    pub fn as_capture_record(&self, source: impl Into<String>) -> CaptureRecord {
        CaptureRecord {
            source: source.into(),
            total: self.total_frames,
            protocols: self.protocol_totals.clone(),
            addresses: self.address_totals.clone(),
        }
    }
}

/// Fold capture records into an [`AggregateReport`].
///
/// The result does not depend on record order. Addresses `class_lookup`
/// cannot resolve still count toward the global totals.
pub fn aggregate<'a, I>(records: I, class_lookup: &dyn ClassLookup) -> AggregateReport
where
    I: IntoIterator<Item = &'a CaptureRecord>,
{
    records
        .into_iter()
        .fold(AggregateReport::default(), AggregateReport::absorb)
        .classify(class_lookup)
}
