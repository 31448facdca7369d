// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Producer and consumer façades: the single entry point a caller uses to
//! turn an in-memory OTLP entity tree into [`BatchMessage`]s and back,
//! wiring together the signal builder, the related-records manager, and the
//! stream producer/consumer without exposing any of their internals.

use crate::adaptive::build_with_retry;
use crate::alloc::AllocGuard;
use crate::builders::logs::LogsBuilder;
use crate::builders::metrics::MetricsBuilder;
use crate::builders::traces::TracesBuilder;
use crate::builders::EntityBuilder;
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::decode::{self, Batches};
use crate::error::{Error, Result};
use crate::otlp::{Logs, Metrics, Traces};
use crate::related::build_record_messages;
use crate::stats::{Stats, StatsSnapshot};
use crate::stream::consumer::StreamConsumer;
use crate::stream::producer::{BatchMessage, StreamProducer};
use std::rc::Rc;

/// Producer façade for one OTLP signal, parameterized over which
/// [`EntityBuilder`] accumulates it. Use [`TracesProducer`],
/// [`LogsProducer`], or [`MetricsProducer`] rather than naming this type
/// directly.
pub struct OtapProducer<B: EntityBuilder> {
    builder: B,
    stream: StreamProducer,
    alloc: Rc<AllocGuard>,
    stats: Rc<Stats>,
}

impl<B: EntityBuilder> OtapProducer<B> {
    fn with_builder(config: &ProducerConfig, builder: B) -> Self {
        let alloc = Rc::new(AllocGuard::new(config.allocator_limit));
        let stats = Rc::new(Stats::default());
        let stream = StreamProducer::new(config, Rc::clone(&alloc), Rc::clone(&stats));
        Self {
            builder: builder.with_stats(Rc::clone(&stats)),
            stream,
            alloc,
            stats,
        }
    }

    /// Appends `entity` to the pending batch. Call [`Self::produce`] to
    /// flush it; the builder accumulates rows across as many `append` calls
    /// as the caller likes before a flush.
    pub fn append(&mut self, entity: &B::Entity) -> Result<()> {
        self.builder.append(entity)
    }

    /// Builds and flushes everything appended since the last call into one
    /// [`BatchMessage`]: runs the builder (retrying up to
    /// [`crate::adaptive::MAX_SCHEMA_RETRIES`] times on
    /// `Error::SchemaNotUpToDate`), tags the resulting records via the
    /// related-records manager, and hands them to the stream producer.
    /// `Ok(None)` if nothing was appended.
    pub fn produce(&mut self) -> Result<Option<BatchMessage>> {
        if self.builder.is_empty() {
            return Ok(None);
        }
        let builder = &mut self.builder;
        let records = build_with_retry(|| builder.build(), || {})?;
        self.builder.reset();
        let messages = build_record_messages(records);
        Ok(Some(self.stream.produce(messages)?))
    }

    /// Appends `entity` then immediately produces, for callers that don't
    /// need cross-call accumulation.
    pub fn produce_one(&mut self, entity: &B::Entity) -> Result<Option<BatchMessage>> {
        self.append(entity)?;
        self.produce()
    }

    /// Snapshots and resets the producer's running stats.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }

    /// Bytes currently reserved against the allocator guard.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.alloc.inuse()
    }

    /// Number of currently open sub-streams.
    #[must_use]
    pub fn open_sub_stream_count(&self) -> usize {
        self.stream.open_sub_stream_count()
    }
}

impl OtapProducer<TracesBuilder> {
    /// A producer for `Traces` batches, honoring `config`'s dictionary
    /// index-width policy.
    #[must_use]
    pub fn for_traces(config: &ProducerConfig) -> Self {
        Self::with_builder(
            config,
            TracesBuilder::with_dictionary_config(config.dictionary_config()),
        )
    }
}

impl OtapProducer<LogsBuilder> {
    /// A producer for `Logs` batches.
    #[must_use]
    pub fn for_logs(config: &ProducerConfig) -> Self {
        Self::with_builder(
            config,
            LogsBuilder::with_dictionary_config(config.dictionary_config()),
        )
    }
}

impl OtapProducer<MetricsBuilder> {
    /// A producer for `Metrics` batches.
    #[must_use]
    pub fn for_metrics(config: &ProducerConfig) -> Self {
        Self::with_builder(
            config,
            MetricsBuilder::with_dictionary_config(config.dictionary_config()),
        )
    }
}

/// Producer bound to [`TracesBuilder`].
pub type TracesProducer = OtapProducer<TracesBuilder>;
/// Producer bound to [`LogsBuilder`].
pub type LogsProducer = OtapProducer<LogsBuilder>;
/// Producer bound to [`MetricsBuilder`].
pub type MetricsProducer = OtapProducer<MetricsBuilder>;

/// Consumer façade: decodes a [`BatchMessage`] into its records, grouped by
/// payload type, then reconstructs whichever OTLP entity tree the caller
/// asks for.
pub struct OtapConsumer {
    stream: StreamConsumer,
    alloc: Rc<AllocGuard>,
    stats: Rc<Stats>,
}

impl OtapConsumer {
    /// Creates an empty consumer.
    #[must_use]
    pub fn new(config: &ConsumerConfig) -> Self {
        let alloc = Rc::new(AllocGuard::new(config.allocator_limit));
        let stats = Rc::new(Stats::default());
        let stream = StreamConsumer::new(config, Rc::clone(&alloc), Rc::clone(&stats));
        Self {
            stream,
            alloc,
            stats,
        }
    }

    /// Decodes every record in `batch` and groups them by payload type.
    /// Releases each record's allocator-guard reservation once it's been
    /// moved into the grouped map: this façade is the caller the stream
    /// consumer defers release to. If more than one record of the same
    /// payload type arrives in one batch, the later one wins; a
    /// well-formed producer never emits that.
    pub fn consume(&mut self, batch: BatchMessage) -> Result<Batches> {
        if batch.payloads.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let records = self.stream.consume(batch)?;
        let mut grouped = Batches::new();
        for msg in records {
            self.stream.release(&msg.record);
            let _ = grouped.insert(msg.payload_type, msg.record);
        }
        Ok(grouped)
    }

    /// Reconstructs a `Traces` tree from grouped records.
    pub fn decode_traces(&self, batches: &Batches) -> Result<Traces> {
        decode::decode_traces(batches)
    }

    /// Reconstructs a `Logs` tree from grouped records.
    pub fn decode_logs(&self, batches: &Batches) -> Result<Logs> {
        decode::decode_logs(batches)
    }

    /// Reconstructs a `Metrics` tree from grouped records.
    pub fn decode_metrics(&self, batches: &Batches) -> Result<Metrics> {
        decode::decode_metrics(batches)
    }

    /// Snapshots and resets the consumer's running stats.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }

    /// Bytes currently reserved against the allocator guard.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.alloc.inuse()
    }

    /// Number of currently open sub-streams.
    #[must_use]
    pub fn open_sub_stream_count(&self) -> usize {
        self.stream.open_sub_stream_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anyvalue::AnyValue;
    use crate::dictionary::IndexWidth;
    use crate::ids::{SpanId, TraceId};
    use crate::otlp::*;
    use crate::test_util::{random_logs, random_metrics, random_traces};

    fn one_span_traces() -> Traces {
        let span = Span {
            trace_id: TraceId::new(&[1; 16]),
            span_id: SpanId::new(&[2; 8]),
            name: "GET /".into(),
            kind: SpanKind::Server,
            start_ns: 10,
            duration_ns: 5,
            status: Status {
                code: StatusCode::Ok,
                message: String::new(),
            },
            attributes: vec![("http.method".into(), AnyValue::Str("GET".into()))],
            ..Default::default()
        };
        vec![ResourceSpans {
            resource: Resource {
                attributes: Vec::new(),
                dropped_attributes_count: 2,
            },
            schema_url: "https://opentelemetry.io/schemas/1.0".into(),
            scope_spans: vec![ScopeSpans {
                scope: Scope {
                    name: "s".into(),
                    version: "1".into(),
                    attributes: Vec::new(),
                    dropped_attributes_count: 1,
                },
                schema_url: "https://opentelemetry.io/schemas/scope".into(),
                spans: vec![span],
            }],
        }]
    }

    /// Order-insensitive attribute equality: the accumulators may re-sort
    /// rows for dictionary locality, so round-trip checks can't assume
    /// insertion order survives.
    fn attrs_match(a: &Attributes, b: &Attributes) -> bool {
        if a.len() != b.len() {
            return false;
        }
        let mut remaining: Vec<&(String, AnyValue)> = b.iter().collect();
        for (k, v) in a {
            let Some(pos) = remaining
                .iter()
                .position(|(rk, rv)| rk == k && crate::anyvalue::values_equal(v, rv))
            else {
                return false;
            };
            let _ = remaining.remove(pos);
        }
        true
    }

    fn resource_matches(a: &Resource, b: &Resource) -> bool {
        a.dropped_attributes_count == b.dropped_attributes_count && attrs_match(&a.attributes, &b.attributes)
    }

    fn scope_matches(a: &Scope, b: &Scope) -> bool {
        a.name == b.name
            && a.version == b.version
            && a.dropped_attributes_count == b.dropped_attributes_count
            && attrs_match(&a.attributes, &b.attributes)
    }

    /// S1: a single span whose dictionary columns fit comfortably within
    /// the default index width produces one batch that round-trips.
    #[test]
    fn s1_single_span_round_trips() {
        let mut producer = TracesProducer::for_traces(&ProducerConfig::default());
        let mut consumer = OtapConsumer::new(&ConsumerConfig::default());

        let batch = producer.produce_one(&one_span_traces()).unwrap().unwrap();
        assert_eq!(batch.payloads.len(), 2); // Spans + SpanAttrs

        let grouped = consumer.consume(batch).unwrap();
        let traces = consumer.decode_traces(&grouped).unwrap();
        let input = one_span_traces();

        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].schema_url, input[0].schema_url);
        assert!(resource_matches(&traces[0].resource, &input[0].resource));
        assert_eq!(
            traces[0].scope_spans[0].schema_url,
            input[0].scope_spans[0].schema_url
        );
        assert!(scope_matches(
            &traces[0].scope_spans[0].scope,
            &input[0].scope_spans[0].scope
        ));
        assert_eq!(traces[0].scope_spans[0].spans[0].name, "GET /");
        assert_eq!(traces[0].scope_spans[0].spans[0].attributes.len(), 1);
    }

    /// S2: 300 distinct span names with `init=u8`/`limit=u32` overflow the
    /// initial dictionary and promote to `u16`, but still round-trip
    /// cleanly in a single batch.
    #[test]
    fn s2_dictionary_promotion_round_trips() {
        let config = ProducerConfig {
            init_index_size: IndexWidth::U8,
            limit_index_size: IndexWidth::U32,
            ..Default::default()
        };
        let mut producer = TracesProducer::for_traces(&config);
        let mut consumer = OtapConsumer::new(&ConsumerConfig::default());

        let spans = (0..300)
            .map(|i| Span {
                name: format!("span_{i}"),
                start_ns: 1,
                duration_ns: 1,
                ..Default::default()
            })
            .collect();
        let traces = vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }];

        let batch = producer.produce_one(&traces).unwrap().unwrap();
        let grouped = consumer.consume(batch).unwrap();
        let decoded = consumer.decode_traces(&grouped).unwrap();
        assert_eq!(decoded[0].scope_spans[0].spans.len(), 300);
    }

    /// S5: ten identical batches stay on the same sub-stream (schema-stable
    /// traffic never forces a new dictionary or sub-stream).
    #[test]
    fn s5_schema_stable_across_repeated_batches() {
        let mut producer = TracesProducer::for_traces(&ProducerConfig::default());
        for _ in 0..10 {
            let _ = producer.produce_one(&one_span_traces()).unwrap().unwrap();
        }
        assert_eq!(producer.open_sub_stream_count(), 2); // Spans + SpanAttrs
    }

    /// S6: a byte budget too small for a large batch fails with
    /// `AllocationLimitExceeded` and retains no reservation, so a later,
    /// much smaller batch under the same producer still succeeds.
    #[test]
    fn s6_allocation_limit_then_recovers() {
        let config = ProducerConfig {
            allocator_limit: 8192,
            ..Default::default()
        };
        let mut producer = TracesProducer::for_traces(&config);
        let big: Traces = (0..50)
            .map(|_| ResourceSpans {
                scope_spans: vec![ScopeSpans {
                    spans: (0..50)
                        .map(|_| Span {
                            name: "span".into(),
                            start_ns: 1,
                            duration_ns: 1,
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .collect();
        let err = producer.produce_one(&big).unwrap_err();
        assert!(matches!(err, Error::AllocationLimitExceeded { .. }));
        assert_eq!(producer.allocated_bytes(), 0);

        let small = producer.produce_one(&one_span_traces()).unwrap();
        assert!(small.is_some());
        assert_eq!(producer.allocated_bytes(), 0);
    }

    #[test]
    fn logs_round_trip_with_map_body() {
        let mut producer = LogsProducer::for_logs(&ProducerConfig::default());
        let mut consumer = OtapConsumer::new(&ConsumerConfig::default());
        let log = LogRecord {
            time_ns: 1,
            observed_time_ns: 1,
            severity_number: 9,
            severity_text: "INFO".into(),
            body: AnyValue::Map(vec![(
                "k1".into(),
                AnyValue::Slice(vec![
                    AnyValue::Int(1),
                    AnyValue::Double(2.0),
                    AnyValue::Str("x".into()),
                ]),
            )]),
            ..Default::default()
        };
        let logs: Logs = vec![ResourceLogs {
            resource: Resource::default(),
            schema_url: String::new(),
            scope_logs: vec![ScopeLogs {
                scope: Scope::default(),
                schema_url: String::new(),
                log_records: vec![log],
            }],
        }];
        let batch = producer.produce_one(&logs).unwrap().unwrap();
        let grouped = consumer.consume(batch).unwrap();
        let decoded = consumer.decode_logs(&grouped).unwrap();
        assert!(crate::anyvalue::values_equal(
            &decoded[0].scope_logs[0].log_records[0].body,
            &logs[0].scope_logs[0].log_records[0].body,
        ));
    }

    #[test]
    fn metrics_round_trip_random_batch() {
        let mut r = rand::rng();
        let metrics = random_metrics(&mut r, 3, 4);
        let mut producer = MetricsProducer::for_metrics(&ProducerConfig::default());
        let mut consumer = OtapConsumer::new(&ConsumerConfig::default());
        let batch = producer.produce_one(&metrics).unwrap().unwrap();
        let grouped = consumer.consume(batch).unwrap();
        let decoded = consumer.decode_metrics(&grouped).unwrap();
        let total: usize = decoded.iter().map(|r| r.scope_metrics[0].metrics.len()).sum();
        assert_eq!(total, 12);
        for (original, round_tripped) in metrics.iter().zip(&decoded) {
            assert!(resource_matches(&original.resource, &round_tripped.resource));
            assert!(scope_matches(
                &original.scope_metrics[0].scope,
                &round_tripped.scope_metrics[0].scope
            ));
        }
    }

    #[test]
    fn logs_round_trip_random_batch() {
        let mut r = rand::rng();
        let logs = random_logs(&mut r, 2, 5);
        let mut producer = LogsProducer::for_logs(&ProducerConfig::default());
        let mut consumer = OtapConsumer::new(&ConsumerConfig::default());
        let batch = producer.produce_one(&logs).unwrap().unwrap();
        let grouped = consumer.consume(batch).unwrap();
        let decoded = consumer.decode_logs(&grouped).unwrap();
        let total: usize = decoded.iter().map(|r| r.scope_logs[0].log_records.len()).sum();
        assert_eq!(total, 10);
        for (original, round_tripped) in logs.iter().zip(&decoded) {
            assert!(resource_matches(&original.resource, &round_tripped.resource));
            assert!(scope_matches(
                &original.scope_logs[0].scope,
                &round_tripped.scope_logs[0].scope
            ));
        }
    }

    #[test]
    fn traces_round_trip_random_batch() {
        let mut r = rand::rng();
        let traces = random_traces(&mut r, 2, 6);
        let mut producer = TracesProducer::for_traces(&ProducerConfig::default());
        let mut consumer = OtapConsumer::new(&ConsumerConfig::default());
        let batch = producer.produce_one(&traces).unwrap().unwrap();
        let grouped = consumer.consume(batch).unwrap();
        let decoded = consumer.decode_traces(&grouped).unwrap();
        let total: usize = decoded.iter().map(|r| r.scope_spans[0].spans.len()).sum();
        assert_eq!(total, 12);
        for (original, round_tripped) in traces.iter().zip(&decoded) {
            assert!(resource_matches(&original.resource, &round_tripped.resource));
            assert!(scope_matches(
                &original.scope_spans[0].scope,
                &round_tripped.scope_spans[0].scope
            ));
        }
    }

    #[test]
    fn empty_batch_is_rejected_by_consumer() {
        let mut consumer = OtapConsumer::new(&ConsumerConfig::default());
        let err = consumer
            .consume(BatchMessage {
                batch_id: 0,
                payloads: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::EmptyBatch));
    }
}
