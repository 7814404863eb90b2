//! Trim Metrics - counters and phase timings for trim sessions
//!
//! Collects how much a trim session tracked, wrote and dropped, and how long
//! the snapshot and emit phases took. Everything vanishes when the `metrics`
//! feature is off.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use trim_metrics::{Counter, PhaseTimer};
//!
//! let mut counter = Counter::new();
//! counter.increment("packets_written", 12);
//!
//! let mut timer = PhaseTimer::new();
//! timer.time_phase("snapshot", || take_snapshot());
//! ```

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod phase_timer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use phase_timer::PhaseTimer;

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
    pub fn reset_all(&mut self) {}
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct PhaseTimer;

#[cfg(not(feature = "metrics"))]
impl PhaseTimer {
    pub fn new() -> Self { Self }
    pub fn time_phase<F, R>(&mut self, _name: &'static str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn get_timing(&self, _name: &str) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    #[test]
    fn stubs_and_real_types_share_an_api() {
        let mut counter = super::Counter::new();
        counter.increment("packets_written", 3);
        let mut timer = super::PhaseTimer::new();
        let value = timer.time_phase("emit", || 7);
        assert_eq!(value, 7);
        counter.reset_all();
        timer.reset();
        assert_eq!(counter.get("packets_written"), 0);
    }
}
