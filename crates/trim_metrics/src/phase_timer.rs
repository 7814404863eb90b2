//! Wall-clock timing of named trim phases

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct PhaseTimer {
    timings: BTreeMap<&'static str, Duration>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self {
            timings: BTreeMap::new(),
        }
    }

    /// Run `f`, adding its elapsed time to the phase total.
    pub fn time_phase<F, R>(&mut self, name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        *self.timings.entry(name).or_insert(Duration::ZERO) += start.elapsed();
        result
    }

    pub fn get_timing(&self, name: &str) -> Duration {
        self.timings.get(name).copied().unwrap_or(Duration::ZERO)
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.timings.iter().map(|(name, elapsed)| (*name, *elapsed))
    }
}
