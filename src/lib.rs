// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! A bidirectional codec between in-memory OTLP pipeline data (traces,
//! logs, metrics) and OTAP, a columnar Arrow-IPC wire representation:
//! schema projection, adaptive dictionary encoding, parent-id delta
//! encoding, and any-value sparse-union encoding, wrapped in a stream
//! producer/consumer state machine and a single-call producer/consumer
//! façade.
//!
//! Start with [`api::OtapProducer`] and [`api::OtapConsumer`].

pub mod adaptive;
pub mod alloc;
pub mod anyvalue;
pub mod api;
pub mod attributes;
pub mod builders;
pub mod cbor;
pub mod config;
pub mod decode;
pub mod dictionary;
pub mod error;
pub mod ids;
pub mod optimizer;
pub mod otlp;
pub mod related;
pub mod schema;
pub mod stats;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_util;

pub use api::{LogsProducer, MetricsProducer, OtapConsumer, OtapProducer, TracesProducer};
pub use config::{ConsumerConfig, ProducerConfig};
pub use error::{Error, ErrorKind, Result};
pub use schema::PayloadType;
pub use stream::consumer::RecordMessage;
pub use stream::producer::BatchMessage;
