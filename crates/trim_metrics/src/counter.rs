//! Named counters for trim bookkeeping

use std::collections::BTreeMap;

/// Monotonic named counters. Iteration is sorted by name so reports are stable.
#[derive(Debug, Default)]
pub struct Counter {
    counters: BTreeMap<&'static str, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, name: &'static str, value: usize) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.counters.iter().map(|(name, value)| (*name, *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate_per_name() {
        let mut counter = Counter::new();
        counter.increment("packets_written", 2);
        counter.increment("packets_written", 5);
        counter.increment("packets_released", 1);

        assert_eq!(counter.get("packets_written"), 7);
        assert_eq!(counter.get("packets_released"), 1);
        assert_eq!(counter.get("unknown"), 0);

        let names: Vec<_> = counter.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["packets_released", "packets_written"]);
    }
}
