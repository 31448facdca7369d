// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The stats surface and the per-column size histograms used by
//! the adaptive builder's monitoring hook.

use std::sync::atomic::{AtomicU64, Ordering};

/// A small fixed-sample running histogram: tracks min/max/count/sum/sum of
/// squares exactly, and approximates p50/p99 via a bounded reservoir. This is
/// exposed for observability only; it never feeds the promotion decision
/// itself.
#[derive(Debug, Default)]
pub struct SizeHistogram {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
    samples: Vec<f64>,
}

const MAX_SAMPLES: usize = 1024;

impl SizeHistogram {
    /// Records one observation.
    pub fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.sum_sq += value * value;
        self.count += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(value);
        }
    }

    /// Number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Minimum observed value.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Maximum observed value.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Arithmetic mean.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Population standard deviation.
    #[must_use]
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        variance.max(0.0).sqrt()
    }

    /// Approximate percentile over the bounded sample reservoir.
    #[must_use]
    pub fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() as f64 - 1.0) * p.clamp(0.0, 1.0)).round() as usize;
        sorted[idx]
    }

    /// p50 convenience accessor.
    #[must_use]
    pub fn p50(&self) -> f64 {
        self.percentile(0.50)
    }

    /// p99 convenience accessor.
    #[must_use]
    pub fn p99(&self) -> f64 {
        self.percentile(0.99)
    }
}

/// Accumulating counters exposed by a producer or consumer instance
///. All fields are monotonically increasing between resets.
#[derive(Debug, Default)]
pub struct Stats {
    batches_produced: AtomicU64,
    stream_producers_created: AtomicU64,
    stream_producers_closed: AtomicU64,
    schema_updates: AtomicU64,
    dictionary_index_type_changes: AtomicU64,
    dictionary_overflows: AtomicU64,
}

/// A point-in-time, non-atomic-across-fields read of [`Stats`]: a reader
/// accepts a snapshot, not a cross-field transaction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Batches produced per signal.
    pub batches_produced: u64,
    /// Stream producers (sub-streams) created.
    pub stream_producers_created: u64,
    /// Stream producers (sub-streams) closed.
    pub stream_producers_closed: u64,
    /// Schema updates performed (promotions + fallbacks).
    pub schema_updates: u64,
    /// Dictionary index-type promotions.
    pub dictionary_index_type_changes: u64,
    /// Dictionary overflow-to-fallback events.
    pub dictionary_overflows: u64,
}

impl Stats {
    /// Increments the "batch produced" counter.
    pub fn record_batch_produced(&self) {
        let _ = self.batches_produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the "stream producer created" counter.
    pub fn record_stream_producer_created(&self) {
        let _ = self
            .stream_producers_created
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the "stream producer closed" counter.
    pub fn record_stream_producer_closed(&self) {
        let _ = self
            .stream_producers_closed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records a schema-update event, also bucketing it as a promotion or an
    /// overflow-to-fallback.
    pub fn record_schema_update(&self, event: &crate::dictionary::SchemaUpdateEvent) {
        let _ = self.schema_updates.fetch_add(1, Ordering::Relaxed);
        match event {
            crate::dictionary::SchemaUpdateEvent::IndexTypeChanged { .. } => {
                let _ = self
                    .dictionary_index_type_changes
                    .fetch_add(1, Ordering::Relaxed);
            }
            crate::dictionary::SchemaUpdateEvent::WithOverflow { .. } => {
                let _ = self.dictionary_overflows.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Reads the current counters and zeroes them.
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches_produced: self.batches_produced.swap(0, Ordering::Relaxed),
            stream_producers_created: self.stream_producers_created.swap(0, Ordering::Relaxed),
            stream_producers_closed: self.stream_producers_closed.swap(0, Ordering::Relaxed),
            schema_updates: self.schema_updates.swap(0, Ordering::Relaxed),
            dictionary_index_type_changes: self
                .dictionary_index_type_changes
                .swap(0, Ordering::Relaxed),
            dictionary_overflows: self.dictionary_overflows.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_tracks_basic_moments() {
        let mut h = SizeHistogram::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            h.observe(v);
        }
        assert_eq!(h.count(), 5);
        assert_eq!(h.min(), 1.0);
        assert_eq!(h.max(), 5.0);
        assert_eq!(h.mean(), 3.0);
    }

    #[test]
    fn snapshot_and_reset_zeroes_counters() {
        let stats = Stats::default();
        stats.record_batch_produced();
        stats.record_batch_produced();
        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.batches_produced, 2);
        let snap2 = stats.snapshot_and_reset();
        assert_eq!(snap2.batches_produced, 0);
    }
}
