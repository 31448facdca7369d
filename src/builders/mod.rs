// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Signal entity builders: Traces, Logs, Metrics.

pub mod logs;
pub mod metrics;
pub mod traces;

use crate::error::Result;
use crate::schema::PayloadType;
use crate::stats::Stats;
use arrow::array::RecordBatch;
use std::rc::Rc;

/// The shared contract every signal builder implements. Kept as a
/// per-signal associated-type trait rather than a trait object,
/// since the retry loop (`adaptive::build_with_retry`) is parameterized over
/// the concrete builder at each call site rather than needing runtime
/// polymorphism across signal kinds.
pub trait EntityBuilder {
    /// The OTLP entity tree this builder appends (e.g. `Traces`, `Logs`).
    type Entity;

    /// Shares `stats` with this builder and everything it owns, so that
    /// dictionary schema-update events observed while building a batch are
    /// recorded against the owning producer's counters.
    #[must_use]
    fn with_stats(self, stats: Rc<Stats>) -> Self;

    /// Appends one entity tree's rows into the accumulators.
    fn append(&mut self, entity: &Self::Entity) -> Result<()>;

    /// Finalizes accumulated rows into an ordered list of
    /// `(payload_type, record)`, main record first. Returns an
    /// empty vec if nothing was appended.
    fn build(&mut self) -> Result<Vec<(PayloadType, RecordBatch)>>;

    /// Clears all accumulators, ready for the next batch or a schema-update
    /// retry.
    fn reset(&mut self);

    /// `true` if no rows are currently accumulated.
    fn is_empty(&self) -> bool;
}
