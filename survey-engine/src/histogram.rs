//! Histogram accumulation.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::feature::FeatureKey;

/// Counts per canonical feature key, kept in first-seen order.
///
/// Equality compares counts per key and ignores ordering.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl Histogram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, key: &FeatureKey) {
        self.add(key.canonical(), 1);
    }

    /// Add `count` occurrences of a canonical key.
    pub fn add(&mut self, key: impl Into<String>, count: u64) {
        let key = key.into();
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].1 += count;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, count));
        }
    }

    /// Sum `other` into `self`; keys new to `self` are appended in `other`'s order.
    pub fn merge(&mut self, other: &Self) {
        for (key, count) in &other.entries {
            self.add(key.as_str(), *count);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> u64 {
        self.index.get(key).map_or(0, |&slot| self.entries[slot].1)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(key, count)| (key.as_str(), *count))
    }

    #[must_use]
    pub fn counts(&self) -> BTreeMap<&str, u64> {
        self.iter().collect()
    }

    /// Copy with keys in lexicographic order.
    #[must_use]
    pub fn sorted(&self) -> Self {
        let mut sorted = Self::new();
        for (key, count) in self.counts() {
            sorted.add(key, count);
        }
        sorted
    }
}

impl PartialEq for Histogram {
    fn eq(&self, other: &Self) -> bool {
        self.counts() == other.counts()
    }
}

impl Eq for Histogram {}

impl Serialize for Histogram {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Histogram {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HistogramVisitor;

        impl<'de> Visitor<'de> for HistogramVisitor {
            type Value = Histogram;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of feature keys to counts")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut histogram = Histogram::new();
                while let Some((key, count)) = access.next_entry::<String, u64>()? {
                    histogram.add(key, count);
                }
                Ok(histogram)
            }
        }

        deserializer.deserialize_map(HistogramVisitor)
    }
}

/// Histogram plus trial bookkeeping for one sweep or one shard of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregator {
    histogram: Histogram,
    successful_trials: u64,
    failed_trials: u64,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, key: &FeatureKey) {
        self.histogram.increment(key);
    }

    /// Count one successfully classified trial and all keys it produced.
    pub fn record_trial<'k>(&mut self, keys: impl IntoIterator<Item = &'k FeatureKey>) {
        for key in keys {
            self.increment(key);
        }
        self.successful_trials += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed_trials += 1;
    }

    /// Combine two shards. Commutative and associative over counts per key.
    pub fn merge(&mut self, other: &Self) {
        self.histogram.merge(&other.histogram);
        self.successful_trials += other.successful_trials;
        self.failed_trials += other.failed_trials;
    }

    #[must_use]
    pub const fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    #[must_use]
    pub fn into_histogram(self) -> Histogram {
        self.histogram
    }

    #[must_use]
    pub const fn successful_trials(&self) -> u64 {
        self.successful_trials
    }

    #[must_use]
    pub const fn failed_trials(&self) -> u64 {
        self.failed_trials
    }

    /// Histogram entries in first-seen order.
    #[must_use]
    pub fn serialize(&self) -> Vec<(String, u64)> {
        self.histogram
            .iter()
            .map(|(key, count)| (key.to_string(), count))
            .collect()
    }

    /// Expected histogram total for a rule emitting `keys_per_trial` keys.
    #[must_use]
    pub fn expected_total(&self, keys_per_trial: usize) -> u64 {
        self.successful_trials * keys_per_trial as u64
    }
}
