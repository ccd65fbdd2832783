//! Execution results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Histogram of measured bitstrings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counts(BTreeMap<String, u64>);

impl Counts {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` occurrences of `bitstring`.
    pub fn insert(&mut self, bitstring: impl Into<String>, count: u64) {
        *self.0.entry(bitstring.into()).or_insert(0) += count;
    }

    /// Record one occurrence of `bitstring`.
    pub fn increment(&mut self, bitstring: impl Into<String>) {
        self.insert(bitstring, 1);
    }

    /// Occurrences of `bitstring`.
    pub fn get(&self, bitstring: &str) -> u64 {
        self.0.get(bitstring).copied().unwrap_or(0)
    }

    /// Total number of recorded shots.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Number of distinct bitstrings.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most frequent bitstring and its count.
    pub fn most_frequent(&self) -> Option<(&str, u64)> {
        self.0
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(bits, count)| (bits.as_str(), *count))
    }

    /// Iterate over `(bitstring, count)` in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(bits, count)| (bits.as_str(), *count))
    }

    /// Distinct bitstrings in lexical order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Result of running all shots of a co-execution group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Histogram keyed by bitstring, classical bit 0 rightmost.
    pub counts: Counts,
    /// Wall-clock seconds spent executing shots.
    pub time_taken: f64,
}

impl ExecutionResult {
    /// Create a result.
    pub fn new(counts: Counts, time_taken: f64) -> Self {
        Self { counts, time_taken }
    }

    /// Number of shots recorded.
    pub fn shots(&self) -> u64 {
        self.counts.total()
    }
}
