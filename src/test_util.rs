// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Random Arrow array/record generators and random OTLP entity builders,
//! shared by property and round-trip tests across the crate.

use crate::anyvalue::AnyValue;
use crate::ids::{SpanId, TraceId};
use crate::otlp::{
    Attributes, GaugeDataPoint, LogRecord, Metric, MetricData, Resource, ResourceLogs,
    ResourceMetrics, ResourceSpans, Scope, ScopeLogs, ScopeMetrics, ScopeSpans, Span, SpanKind,
    Status, StatusCode, SumDataPoint,
};
use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
    UInt16Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};
use std::sync::Arc;

pub(crate) fn create_test_schema() -> Schema {
    Schema::new(vec![
        Field::new("a", DataType::UInt16, true),
        Field::new("b", DataType::Utf8, true),
        Field::new("c", DataType::Float64, true),
    ])
}

pub(crate) fn create_record_batch(schema: SchemaRef, num_rows: usize) -> RecordBatch {
    let columns = schema
        .fields
        .iter()
        .map(|f| create_array(f.data_type(), num_rows))
        .collect::<Vec<_>>();
    RecordBatch::try_new(schema, columns).unwrap()
}

pub(crate) fn create_array(dt: &DataType, num_rows: usize) -> ArrayRef {
    let mut r = rand::rng();
    match dt {
        DataType::Boolean => Arc::new(
            (0..num_rows)
                .map(|_| Some(r.random_bool(1.0 / 2.0)))
                .collect::<BooleanArray>(),
        ) as ArrayRef,
        DataType::UInt16 => {
            Arc::new(UInt16Array::from_iter((0..num_rows).map(|_| r.random::<u16>()))) as ArrayRef
        }
        DataType::Int64 => {
            Arc::new(Int64Array::from_iter((0..num_rows).map(|_| r.random::<i64>()))) as ArrayRef
        }
        DataType::Float64 => {
            Arc::new(Float64Array::from_iter((0..num_rows).map(|_| r.random::<f64>()))) as ArrayRef
        }
        DataType::Binary => Arc::new(BinaryArray::from_iter(
            (0..num_rows).map(|_| Some(Alphanumeric.sample_string(&mut r, 10))),
        )) as ArrayRef,
        DataType::Utf8 => Arc::new(StringArray::from_iter(
            (0..num_rows).map(|_| Some(Alphanumeric.sample_string(&mut r, 10))),
        )) as ArrayRef,
        other => unimplemented!("{other:?}"),
    }
}

fn random_string(r: &mut impl Rng, len: usize) -> String {
    Alphanumeric.sample_string(r, len)
}

fn random_trace_id(r: &mut impl Rng) -> TraceId {
    TraceId::new(&r.random::<[u8; 16]>())
}

fn random_span_id(r: &mut impl Rng) -> SpanId {
    SpanId::new(&r.random::<[u8; 8]>())
}

/// A random scalar or nested [`AnyValue`], `depth` bounding `Slice`/`Map`
/// recursion.
pub(crate) fn random_any_value(r: &mut impl Rng, depth: u8) -> AnyValue {
    let arm = if depth == 0 { r.random_range(0..5) } else { r.random_range(0..7) };
    match arm {
        0 => AnyValue::Str(random_string(r, 8)),
        1 => AnyValue::Int(r.random::<i64>()),
        2 => AnyValue::Double(r.random::<f64>()),
        3 => AnyValue::Bool(r.random_bool(0.5)),
        4 => AnyValue::Bytes((0..6).map(|_| r.random::<u8>()).collect()),
        5 => AnyValue::Slice((0..3).map(|_| random_any_value(r, depth - 1)).collect()),
        _ => AnyValue::Map(
            (0..2)
                .map(|_| (random_string(r, 4), random_any_value(r, depth - 1)))
                .collect(),
        ),
    }
}

/// A random flat attribute bag of `count` entries.
pub(crate) fn random_attributes(r: &mut impl Rng, count: usize) -> Attributes {
    (0..count)
        .map(|_| (random_string(r, 6), random_any_value(r, 1)))
        .collect()
}

pub(crate) fn random_resource(r: &mut impl Rng) -> Resource {
    Resource {
        attributes: random_attributes(r, r.random_range(0..4)),
        dropped_attributes_count: 0,
    }
}

pub(crate) fn random_scope(r: &mut impl Rng) -> Scope {
    Scope {
        name: random_string(r, 8),
        version: "1.0".into(),
        attributes: random_attributes(r, r.random_range(0..3)),
        dropped_attributes_count: 0,
    }
}

pub(crate) fn random_span(r: &mut impl Rng) -> Span {
    let start_ns = r.random_range(0..i64::MAX / 2);
    Span {
        trace_id: random_trace_id(r),
        span_id: random_span_id(r),
        parent_span_id: random_span_id(r),
        name: random_string(r, 12),
        kind: SpanKind::Internal,
        start_ns,
        duration_ns: r.random_range(0..1_000_000),
        status: Status {
            code: StatusCode::Ok,
            message: String::new(),
        },
        attributes: random_attributes(r, r.random_range(0..5)),
        events: Vec::new(),
        links: Vec::new(),
        dropped_attributes_count: 0,
        dropped_events_count: 0,
        dropped_links_count: 0,
    }
}

/// A random `Traces` pipeline batch with `resources` resource groups, each
/// holding `spans_per_resource` spans under a single scope.
pub(crate) fn random_traces(
    r: &mut impl Rng,
    resources: usize,
    spans_per_resource: usize,
) -> Vec<ResourceSpans> {
    (0..resources)
        .map(|_| ResourceSpans {
            resource: random_resource(r),
            schema_url: String::new(),
            scope_spans: vec![ScopeSpans {
                scope: random_scope(r),
                schema_url: String::new(),
                spans: (0..spans_per_resource).map(|_| random_span(r)).collect(),
            }],
        })
        .collect()
}

pub(crate) fn random_log_record(r: &mut impl Rng) -> LogRecord {
    LogRecord {
        time_ns: r.random_range(0..i64::MAX / 2),
        observed_time_ns: r.random_range(0..i64::MAX / 2),
        trace_id: random_trace_id(r),
        span_id: random_span_id(r),
        severity_number: r.random_range(1..24),
        severity_text: random_string(r, 4),
        body: random_any_value(r, 1),
        attributes: random_attributes(r, r.random_range(0..5)),
        flags: 0,
        dropped_attributes_count: 0,
    }
}

/// A random `Logs` pipeline batch, shaped like [`random_traces`].
pub(crate) fn random_logs(
    r: &mut impl Rng,
    resources: usize,
    logs_per_resource: usize,
) -> Vec<ResourceLogs> {
    (0..resources)
        .map(|_| ResourceLogs {
            resource: random_resource(r),
            schema_url: String::new(),
            scope_logs: vec![ScopeLogs {
                scope: random_scope(r),
                schema_url: String::new(),
                log_records: (0..logs_per_resource).map(|_| random_log_record(r)).collect(),
            }],
        })
        .collect()
}

fn random_gauge_point(r: &mut impl Rng, as_int: bool) -> GaugeDataPoint {
    GaugeDataPoint {
        start_ns: r.random_range(0..i64::MAX / 2),
        time_ns: r.random_range(0..i64::MAX / 2),
        value: if as_int {
            AnyValue::Int(r.random::<i64>())
        } else {
            AnyValue::Double(r.random::<f64>())
        },
        flags: 0,
        attributes: random_attributes(r, r.random_range(0..3)),
        exemplars: Vec::new(),
    }
}

pub(crate) fn random_metric(r: &mut impl Rng, points: usize) -> Metric {
    let data = if r.random_bool(0.5) {
        MetricData::IntGauge((0..points).map(|_| random_gauge_point(r, true)).collect())
    } else {
        MetricData::DoubleSum(
            (0..points)
                .map(|_| SumDataPoint {
                    gauge: random_gauge_point(r, false),
                    temporality: crate::otlp::AggregationTemporality::Cumulative,
                    is_monotonic: true,
                })
                .collect(),
        )
    };
    Metric {
        name: random_string(r, 10),
        description: String::new(),
        unit: "1".into(),
        data,
    }
}

/// A random `Metrics` pipeline batch, shaped like [`random_traces`].
pub(crate) fn random_metrics(
    r: &mut impl Rng,
    resources: usize,
    metrics_per_resource: usize,
) -> Vec<ResourceMetrics> {
    (0..resources)
        .map(|_| ResourceMetrics {
            resource: random_resource(r),
            schema_url: String::new(),
            scope_metrics: vec![ScopeMetrics {
                scope: random_scope(r),
                schema_url: String::new(),
                metrics: (0..metrics_per_resource).map(|_| random_metric(r, 3)).collect(),
            }],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_record_batch_matches_schema_row_count() {
        let schema = Arc::new(create_test_schema());
        let batch = create_record_batch(schema.clone(), 5);
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(batch.schema(), schema);
    }

    #[test]
    fn random_traces_has_requested_shape() {
        let mut r = rand::rng();
        let traces = random_traces(&mut r, 2, 3);
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].scope_spans[0].spans.len(), 3);
    }

    #[test]
    fn random_any_value_terminates_at_depth_zero() {
        let mut r = rand::rng();
        for _ in 0..50 {
            let v = random_any_value(&mut r, 0);
            assert!(!matches!(v, AnyValue::Slice(_) | AnyValue::Map(_)));
        }
    }
}
