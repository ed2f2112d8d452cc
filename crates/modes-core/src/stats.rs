//! Process-wide statistics, independently partitioned between producer and
//! consumer so plain atomics suffice (no field ever needs to be updated
//! jointly with another).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct Stats {
    pub samples_processed: AtomicU64,
    pub samples_dropped: AtomicU64,
    pub buffers_processed: AtomicU64,
    pub messages_accepted: AtomicU64,
    pub messages_unknown_df: AtomicU64,
    pub messages_unknown_icao: AtomicU64,
    pub messages_bad: AtomicU64,
    pub messages_duplicate: AtomicU64,
    noise_power_sum: Mutex<f64>,
    noise_power_count: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_noise_power(&self, power: f64) {
        *self.noise_power_sum.lock().unwrap() += power;
        self.noise_power_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mean_noise_power(&self) -> f64 {
        let n = self.noise_power_count.load(Ordering::Relaxed);
        if n == 0 {
            0.0
        } else {
            *self.noise_power_sum.lock().unwrap() / n as f64
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            buffers_processed: self.buffers_processed.load(Ordering::Relaxed),
            messages_accepted: self.messages_accepted.load(Ordering::Relaxed),
            messages_unknown_df: self.messages_unknown_df.load(Ordering::Relaxed),
            messages_unknown_icao: self.messages_unknown_icao.load(Ordering::Relaxed),
            messages_bad: self.messages_bad.load(Ordering::Relaxed),
            messages_duplicate: self.messages_duplicate.load(Ordering::Relaxed),
            mean_noise_power: self.mean_noise_power(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub samples_processed: u64,
    pub samples_dropped: u64,
    pub buffers_processed: u64,
    pub messages_accepted: u64,
    pub messages_unknown_df: u64,
    pub messages_unknown_icao: u64,
    pub messages_bad: u64,
    pub messages_duplicate: u64,
    pub mean_noise_power: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_power_accumulates_mean() {
        let stats = Stats::new();
        stats.add_noise_power(0.1);
        stats.add_noise_power(0.3);
        assert!((stats.mean_noise_power() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.messages_accepted, 0);
        assert_eq!(snap.samples_processed, 0);
    }
}
