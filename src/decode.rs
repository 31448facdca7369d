// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Reconstructs OTLP entity trees from decoded OTAP records: the inverse of
//! the signal builders.
//!
//! Each function takes every record of one batch, keyed by payload type
//! (as handed up by [`crate::stream::consumer::StreamConsumer`]), and
//! rebuilds the corresponding `Resource*`/`Scope*` tree. Spans, logs, and
//! metric data points are grouped back under a resource/scope pair, in
//! order of first appearance, keyed on every column that distinguishes one
//! resource/scope instance from another: the attrs id plus the scalar
//! `name`/`version`/`dropped_attributes_count`/`schema_url` fields carried
//! alongside it on the main record.

use crate::anyvalue::{self, AnyValue};
use crate::attributes::{column_as, decode_attributes, decode_string_column, ParentIdEncoding, ParentIdWidth};
use crate::error::Result;
use crate::ids::{SpanId, TraceId};
use crate::otlp::{
    AggregationTemporality, Exemplar, ExponentialBuckets, ExponentialHistogramDataPoint,
    GaugeDataPoint, HistogramDataPoint, LogRecord, Logs, Metric, MetricData, Metrics, Resource,
    ResourceLogs, ResourceMetrics, ResourceSpans, Scope, ScopeLogs, ScopeMetrics, ScopeSpans, Span,
    SpanEvent, SpanKind, SpanLink, Status, StatusCode, SumDataPoint, SummaryDataPoint,
    SummaryQuantile, Traces,
};
use crate::schema::PayloadType;
use arrow::array::{
    Array, BinaryArray, BooleanArray, FixedSizeBinaryArray, Float64Array, Int32Array, Int64Array,
    ListArray, RecordBatch, StringArray, TimestampNanosecondArray, UInt16Array, UInt32Array,
    UInt64Array, UInt8Array,
};
use std::collections::HashMap;

/// A batch's records, keyed by payload type.
pub type Batches = HashMap<PayloadType, RecordBatch>;

fn opt_u16(col: &UInt16Array, i: usize) -> Option<u16> {
    col.is_valid(i).then(|| col.value(i))
}

/// Identifies one distinct resource/scope instance within a batch. Two rows
/// sharing `None` attrs ids but differing in any scalar field below are
/// still distinct resources or scopes and must not be merged.
#[derive(Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    resource_attrs_id: Option<u16>,
    resource_schema_url: String,
    resource_dropped_attributes_count: u32,
    scope_attrs_id: Option<u16>,
    scope_name: String,
    scope_version: String,
    scope_dropped_attributes_count: u32,
    scope_schema_url: String,
}

fn trace_id_at(col: &FixedSizeBinaryArray, i: usize) -> Result<TraceId> {
    if col.is_null(i) {
        return Ok(TraceId::default());
    }
    TraceId::try_from(col.value(i))
}

fn span_id_at(col: &FixedSizeBinaryArray, i: usize) -> Result<SpanId> {
    if col.is_null(i) {
        return Ok(SpanId::default());
    }
    SpanId::try_from(col.value(i))
}

fn list_f64_at(col: &ListArray, i: usize) -> Vec<f64> {
    let value = col.value(i);
    let arr = value
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("list<f64>");
    (0..arr.len()).map(|j| arr.value(j)).collect()
}

fn list_u64_at(col: &ListArray, i: usize) -> Vec<u64> {
    let value = col.value(i);
    let arr = value
        .as_any()
        .downcast_ref::<UInt64Array>()
        .expect("list<u64>");
    (0..arr.len()).map(|j| arr.value(j)).collect()
}

fn kind_from_code(code: i32) -> SpanKind {
    match code {
        1 => SpanKind::Internal,
        2 => SpanKind::Server,
        3 => SpanKind::Client,
        4 => SpanKind::Producer,
        5 => SpanKind::Consumer,
        _ => SpanKind::Unspecified,
    }
}

fn status_code_from_code(code: i32) -> StatusCode {
    match code {
        1 => StatusCode::Ok,
        2 => StatusCode::Error,
        _ => StatusCode::Unset,
    }
}

fn temporality_from_code(code: i32) -> AggregationTemporality {
    match code {
        1 => AggregationTemporality::Delta,
        2 => AggregationTemporality::Cumulative,
        _ => AggregationTemporality::Unspecified,
    }
}

fn decode_resource_scope_attrs(
    records: &Batches,
) -> Result<(
    HashMap<u32, Vec<(String, AnyValue)>>,
    HashMap<u32, Vec<(String, AnyValue)>>,
)> {
    let resource = records
        .get(&PayloadType::ResourceAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U16, ParentIdEncoding::Delta))
        .transpose()?
        .unwrap_or_default();
    let scope = records
        .get(&PayloadType::ScopeAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U16, ParentIdEncoding::Delta))
        .transpose()?
        .unwrap_or_default();
    Ok((resource, scope))
}

fn decode_events(records: &Batches) -> Result<HashMap<u32, Vec<SpanEvent>>> {
    let mut out: HashMap<u32, Vec<SpanEvent>> = HashMap::new();
    let Some(batch) = records.get(&PayloadType::SpanEvents) else {
        return Ok(out);
    };
    let ids = column_as::<UInt16Array>(batch, "id")?;
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let dropped = column_as::<UInt32Array>(batch, "dropped_attributes_count")?;
    let names = decode_string_column(batch, "name")?;
    let attrs = records
        .get(&PayloadType::SpanEventAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();

    for i in 0..batch.num_rows() {
        let id = u32::from(ids.value(i));
        let event = SpanEvent {
            name: names[i].clone(),
            time_ns: time_ns.value(i),
            attributes: attrs.get(&id).cloned().unwrap_or_default(),
            dropped_attributes_count: dropped.value(i),
        };
        out.entry(parent_ids.value(i)).or_default().push(event);
    }
    Ok(out)
}

fn decode_links(records: &Batches) -> Result<HashMap<u32, Vec<SpanLink>>> {
    let mut out: HashMap<u32, Vec<SpanLink>> = HashMap::new();
    let Some(batch) = records.get(&PayloadType::SpanLinks) else {
        return Ok(out);
    };
    let ids = column_as::<UInt16Array>(batch, "id")?;
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let trace_ids = column_as::<FixedSizeBinaryArray>(batch, "trace_id")?;
    let span_ids = column_as::<FixedSizeBinaryArray>(batch, "span_id")?;
    let dropped = column_as::<UInt32Array>(batch, "dropped_attributes_count")?;
    let trace_states = decode_string_column(batch, "trace_state")?;
    let attrs = records
        .get(&PayloadType::SpanLinkAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();

    for i in 0..batch.num_rows() {
        let id = u32::from(ids.value(i));
        let link = SpanLink {
            trace_id: trace_id_at(trace_ids, i)?,
            span_id: span_id_at(span_ids, i)?,
            trace_state: trace_states[i].clone(),
            attributes: attrs.get(&id).cloned().unwrap_or_default(),
            dropped_attributes_count: dropped.value(i),
        };
        out.entry(parent_ids.value(i)).or_default().push(link);
    }
    Ok(out)
}

/// Reconstructs a `Traces` pipeline batch from its SPANS/SPAN_EVENTS/
/// SPAN_LINKS and attribute records, the inverse of
/// `builders::traces::TracesBuilder`.
pub fn decode_traces(records: &Batches) -> Result<Traces> {
    let Some(batch) = records.get(&PayloadType::Spans) else {
        return Ok(Vec::new());
    };

    let ids = column_as::<UInt16Array>(batch, "id")?;
    let trace_ids = column_as::<FixedSizeBinaryArray>(batch, "trace_id")?;
    let span_ids = column_as::<FixedSizeBinaryArray>(batch, "span_id")?;
    let parent_span_ids = column_as::<FixedSizeBinaryArray>(batch, "parent_span_id")?;
    let start_ns = column_as::<TimestampNanosecondArray>(batch, "start_time_unix_nano")?;
    let duration_ns = column_as::<Int64Array>(batch, "duration_time_unix_nano")?;
    let kind = column_as::<Int32Array>(batch, "kind")?;
    let status_code = column_as::<Int32Array>(batch, "status_code")?;
    let status_message = column_as::<StringArray>(batch, "status_message")?;
    let dropped_attrs = column_as::<UInt32Array>(batch, "dropped_attributes_count")?;
    let dropped_events = column_as::<UInt32Array>(batch, "dropped_events_count")?;
    let dropped_links = column_as::<UInt32Array>(batch, "dropped_links_count")?;
    let resource_attrs_id = column_as::<UInt16Array>(batch, "resource_attrs_id")?;
    let resource_schema_url = decode_string_column(batch, "resource_schema_url")?;
    let resource_dropped_attrs = column_as::<UInt32Array>(batch, "resource_dropped_attributes_count")?;
    let scope_attrs_id = column_as::<UInt16Array>(batch, "scope_attrs_id")?;
    let scope_dropped_attrs = column_as::<UInt32Array>(batch, "scope_dropped_attributes_count")?;
    let scope_schema_url = decode_string_column(batch, "scope_schema_url")?;
    let scope_names = decode_string_column(batch, "scope_name")?;
    let scope_versions = decode_string_column(batch, "scope_version")?;
    let names = decode_string_column(batch, "name")?;

    let (resource_attrs, scope_attrs) = decode_resource_scope_attrs(records)?;
    let span_attrs = records
        .get(&PayloadType::SpanAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();
    let events_by_parent = decode_events(records)?;
    let links_by_parent = decode_links(records)?;

    let mut groups: HashMap<GroupKey, usize> = HashMap::new();
    let mut resource_spans: Vec<ResourceSpans> = Vec::new();

    for i in 0..batch.num_rows() {
        let key = GroupKey {
            resource_attrs_id: opt_u16(resource_attrs_id, i),
            resource_schema_url: resource_schema_url[i].clone(),
            resource_dropped_attributes_count: resource_dropped_attrs.value(i),
            scope_attrs_id: opt_u16(scope_attrs_id, i),
            scope_name: scope_names[i].clone(),
            scope_version: scope_versions[i].clone(),
            scope_dropped_attributes_count: scope_dropped_attrs.value(i),
            scope_schema_url: scope_schema_url[i].clone(),
        };
        let idx = *groups.entry(key.clone()).or_insert_with(|| {
            resource_spans.push(ResourceSpans {
                resource: Resource {
                    attributes: key
                        .resource_attrs_id
                        .and_then(|id| resource_attrs.get(&u32::from(id)).cloned())
                        .unwrap_or_default(),
                    dropped_attributes_count: key.resource_dropped_attributes_count,
                },
                schema_url: key.resource_schema_url.clone(),
                scope_spans: vec![ScopeSpans {
                    scope: Scope {
                        name: key.scope_name.clone(),
                        version: key.scope_version.clone(),
                        attributes: key
                            .scope_attrs_id
                            .and_then(|id| scope_attrs.get(&u32::from(id)).cloned())
                            .unwrap_or_default(),
                        dropped_attributes_count: key.scope_dropped_attributes_count,
                    },
                    schema_url: key.scope_schema_url.clone(),
                    spans: Vec::new(),
                }],
            });
            resource_spans.len() - 1
        });

        let id = u32::from(ids.value(i));
        let span = Span {
            trace_id: trace_id_at(trace_ids, i)?,
            span_id: span_id_at(span_ids, i)?,
            parent_span_id: span_id_at(parent_span_ids, i)?,
            name: names[i].clone(),
            kind: kind_from_code(kind.value(i)),
            start_ns: start_ns.value(i),
            duration_ns: duration_ns.value(i),
            status: Status {
                code: status_code_from_code(
                    status_code.is_valid(i).then(|| status_code.value(i)).unwrap_or(0),
                ),
                message: status_message
                    .is_valid(i)
                    .then(|| status_message.value(i).to_owned())
                    .unwrap_or_default(),
            },
            attributes: span_attrs.get(&id).cloned().unwrap_or_default(),
            events: events_by_parent.get(&id).cloned().unwrap_or_default(),
            links: links_by_parent.get(&id).cloned().unwrap_or_default(),
            dropped_attributes_count: dropped_attrs.value(i),
            dropped_events_count: dropped_events.value(i),
            dropped_links_count: dropped_links.value(i),
        };
        resource_spans[idx].scope_spans[0].spans.push(span);
    }
    Ok(resource_spans)
}

/// Reconstructs a `Logs` pipeline batch from its LOGS and attribute records,
/// the inverse of `builders::logs::LogsBuilder`.
pub fn decode_logs(records: &Batches) -> Result<Logs> {
    let Some(batch) = records.get(&PayloadType::Logs) else {
        return Ok(Vec::new());
    };

    let ids = column_as::<UInt16Array>(batch, "id")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let observed_time_ns = column_as::<TimestampNanosecondArray>(batch, "observed_time_unix_nano")?;
    let trace_ids = column_as::<FixedSizeBinaryArray>(batch, "trace_id")?;
    let span_ids = column_as::<FixedSizeBinaryArray>(batch, "span_id")?;
    let severity_number = column_as::<Int32Array>(batch, "severity_number")?;
    let flags = column_as::<UInt32Array>(batch, "flags")?;
    let dropped_attrs = column_as::<UInt32Array>(batch, "dropped_attributes_count")?;
    let resource_attrs_id = column_as::<UInt16Array>(batch, "resource_attrs_id")?;
    let resource_schema_url = decode_string_column(batch, "resource_schema_url")?;
    let resource_dropped_attrs = column_as::<UInt32Array>(batch, "resource_dropped_attributes_count")?;
    let scope_attrs_id = column_as::<UInt16Array>(batch, "scope_attrs_id")?;
    let scope_dropped_attrs = column_as::<UInt32Array>(batch, "scope_dropped_attributes_count")?;
    let scope_schema_url = decode_string_column(batch, "scope_schema_url")?;
    let scope_names = decode_string_column(batch, "scope_name")?;
    let scope_versions = decode_string_column(batch, "scope_version")?;
    let severity_texts = decode_string_column(batch, "severity_text")?;
    let body_type = column_as::<UInt8Array>(batch, "body_type")?;
    let body_str = column_as::<StringArray>(batch, "body_str")?;
    let body_int = column_as::<Int64Array>(batch, "body_int")?;
    let body_double = column_as::<Float64Array>(batch, "body_double")?;
    let body_bool = column_as::<BooleanArray>(batch, "body_bool")?;
    let body_bytes = column_as::<BinaryArray>(batch, "body_bytes")?;
    let body_ser = column_as::<BinaryArray>(batch, "body_ser")?;

    let (resource_attrs, scope_attrs) = decode_resource_scope_attrs(records)?;
    let log_attrs = records
        .get(&PayloadType::LogAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();

    let mut groups: HashMap<GroupKey, usize> = HashMap::new();
    let mut resource_logs: Vec<ResourceLogs> = Vec::new();

    for i in 0..batch.num_rows() {
        let key = GroupKey {
            resource_attrs_id: opt_u16(resource_attrs_id, i),
            resource_schema_url: resource_schema_url[i].clone(),
            resource_dropped_attributes_count: resource_dropped_attrs.value(i),
            scope_attrs_id: opt_u16(scope_attrs_id, i),
            scope_name: scope_names[i].clone(),
            scope_version: scope_versions[i].clone(),
            scope_dropped_attributes_count: scope_dropped_attrs.value(i),
            scope_schema_url: scope_schema_url[i].clone(),
        };
        let idx = *groups.entry(key.clone()).or_insert_with(|| {
            resource_logs.push(ResourceLogs {
                resource: Resource {
                    attributes: key
                        .resource_attrs_id
                        .and_then(|id| resource_attrs.get(&u32::from(id)).cloned())
                        .unwrap_or_default(),
                    dropped_attributes_count: key.resource_dropped_attributes_count,
                },
                schema_url: key.resource_schema_url.clone(),
                scope_logs: vec![ScopeLogs {
                    scope: Scope {
                        name: key.scope_name.clone(),
                        version: key.scope_version.clone(),
                        attributes: key
                            .scope_attrs_id
                            .and_then(|id| scope_attrs.get(&u32::from(id)).cloned())
                            .unwrap_or_default(),
                        dropped_attributes_count: key.scope_dropped_attributes_count,
                    },
                    schema_url: key.scope_schema_url.clone(),
                    log_records: Vec::new(),
                }],
            });
            resource_logs.len() - 1
        });

        let id = u32::from(ids.value(i));
        let body = anyvalue::decode(
            body_type.is_valid(i).then(|| body_type.value(i)),
            body_str.is_valid(i).then(|| body_str.value(i)),
            body_int.is_valid(i).then(|| body_int.value(i)),
            body_double.is_valid(i).then(|| body_double.value(i)),
            body_bool.is_valid(i).then(|| body_bool.value(i)),
            body_bytes.is_valid(i).then(|| body_bytes.value(i)),
            body_ser.is_valid(i).then(|| body_ser.value(i)),
        )?;
        let log = LogRecord {
            time_ns: time_ns.value(i),
            observed_time_ns: observed_time_ns.value(i),
            trace_id: trace_id_at(trace_ids, i)?,
            span_id: span_id_at(span_ids, i)?,
            severity_number: severity_number
                .is_valid(i)
                .then(|| severity_number.value(i))
                .unwrap_or(0),
            severity_text: severity_texts[i].clone(),
            body,
            attributes: log_attrs.get(&id).cloned().unwrap_or_default(),
            flags: flags.value(i),
            dropped_attributes_count: dropped_attrs.value(i),
        };
        resource_logs[idx].scope_logs[0].log_records.push(log);
    }
    Ok(resource_logs)
}

/// An exemplar table's `attrs_id` column is always null in practice (no
/// builder ever populates it, see `DESIGN.md`), so `filtered_attributes`
/// always decodes empty.
fn decode_exemplars(batch: &RecordBatch) -> Result<HashMap<u32, Vec<Exemplar>>> {
    let mut out: HashMap<u32, Vec<Exemplar>> = HashMap::new();
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let int_value = column_as::<Int64Array>(batch, "int_value")?;
    let double_value = column_as::<Float64Array>(batch, "double_value")?;
    let span_ids = column_as::<FixedSizeBinaryArray>(batch, "span_id")?;
    let trace_ids = column_as::<FixedSizeBinaryArray>(batch, "trace_id")?;

    for i in 0..batch.num_rows() {
        let value = if int_value.is_valid(i) {
            AnyValue::Int(int_value.value(i))
        } else if double_value.is_valid(i) {
            AnyValue::Double(double_value.value(i))
        } else {
            AnyValue::Empty
        };
        let exemplar = Exemplar {
            time_ns: time_ns.value(i),
            value,
            span_id: span_id_at(span_ids, i)?,
            trace_id: trace_id_at(trace_ids, i)?,
            filtered_attributes: Vec::new(),
        };
        out.entry(parent_ids.value(i)).or_default().push(exemplar);
    }
    Ok(out)
}

fn gauge_value(int_value: &Int64Array, double_value: &Float64Array, i: usize) -> AnyValue {
    if int_value.is_valid(i) {
        AnyValue::Int(int_value.value(i))
    } else if double_value.is_valid(i) {
        AnyValue::Double(double_value.value(i))
    } else {
        AnyValue::Empty
    }
}

fn decode_gauge_variant(
    records: &Batches,
    payload_type: PayloadType,
    attrs_type: PayloadType,
    exemplars_type: PayloadType,
) -> Result<HashMap<u32, Vec<GaugeDataPoint>>> {
    let mut out: HashMap<u32, Vec<GaugeDataPoint>> = HashMap::new();
    let Some(batch) = records.get(&payload_type) else {
        return Ok(out);
    };
    let ids = column_as::<UInt32Array>(batch, "id")?;
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let start_ns = column_as::<TimestampNanosecondArray>(batch, "start_time_unix_nano")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let int_value = column_as::<Int64Array>(batch, "int_value")?;
    let double_value = column_as::<Float64Array>(batch, "double_value")?;
    let flags = column_as::<UInt32Array>(batch, "flags")?;
    let attrs = records
        .get(&attrs_type)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();
    let exemplars = records
        .get(&exemplars_type)
        .map(decode_exemplars)
        .transpose()?
        .unwrap_or_default();

    for i in 0..batch.num_rows() {
        let id = ids.value(i);
        let dp = GaugeDataPoint {
            start_ns: start_ns.is_valid(i).then(|| start_ns.value(i)).unwrap_or(0),
            time_ns: time_ns.value(i),
            value: gauge_value(int_value, double_value, i),
            flags: flags.value(i),
            attributes: attrs.get(&id).cloned().unwrap_or_default(),
            exemplars: exemplars.get(&id).cloned().unwrap_or_default(),
        };
        out.entry(parent_ids.value(i)).or_default().push(dp);
    }
    Ok(out)
}

fn decode_sum_variant(
    records: &Batches,
    payload_type: PayloadType,
    attrs_type: PayloadType,
    exemplars_type: PayloadType,
) -> Result<HashMap<u32, Vec<SumDataPoint>>> {
    let mut out: HashMap<u32, Vec<SumDataPoint>> = HashMap::new();
    let Some(batch) = records.get(&payload_type) else {
        return Ok(out);
    };
    let ids = column_as::<UInt32Array>(batch, "id")?;
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let start_ns = column_as::<TimestampNanosecondArray>(batch, "start_time_unix_nano")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let int_value = column_as::<Int64Array>(batch, "int_value")?;
    let double_value = column_as::<Float64Array>(batch, "double_value")?;
    let flags = column_as::<UInt32Array>(batch, "flags")?;
    let temporality = column_as::<Int32Array>(batch, "aggregation_temporality")?;
    let is_monotonic = column_as::<BooleanArray>(batch, "is_monotonic")?;
    let attrs = records
        .get(&attrs_type)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();
    let exemplars = records
        .get(&exemplars_type)
        .map(decode_exemplars)
        .transpose()?
        .unwrap_or_default();

    for i in 0..batch.num_rows() {
        let id = ids.value(i);
        let dp = SumDataPoint {
            gauge: GaugeDataPoint {
                start_ns: start_ns.is_valid(i).then(|| start_ns.value(i)).unwrap_or(0),
                time_ns: time_ns.value(i),
                value: gauge_value(int_value, double_value, i),
                flags: flags.value(i),
                attributes: attrs.get(&id).cloned().unwrap_or_default(),
                exemplars: exemplars.get(&id).cloned().unwrap_or_default(),
            },
            temporality: temporality_from_code(temporality.value(i)),
            is_monotonic: is_monotonic.value(i),
        };
        out.entry(parent_ids.value(i)).or_default().push(dp);
    }
    Ok(out)
}

fn decode_summary(records: &Batches) -> Result<HashMap<u32, Vec<SummaryDataPoint>>> {
    let mut out: HashMap<u32, Vec<SummaryDataPoint>> = HashMap::new();
    let Some(batch) = records.get(&PayloadType::Summaries) else {
        return Ok(out);
    };
    let ids = column_as::<UInt32Array>(batch, "id")?;
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let start_ns = column_as::<TimestampNanosecondArray>(batch, "start_time_unix_nano")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let count = column_as::<UInt64Array>(batch, "count")?;
    let sum = column_as::<Float64Array>(batch, "sum")?;
    let values = column_as::<ListArray>(batch, "quantile_values")?;
    let quantiles = column_as::<ListArray>(batch, "quantile_quantiles")?;
    let flags = column_as::<UInt32Array>(batch, "flags")?;
    let attrs = records
        .get(&PayloadType::SummaryAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();

    for i in 0..batch.num_rows() {
        let id = ids.value(i);
        let vs = list_f64_at(values, i);
        let qs = list_f64_at(quantiles, i);
        let dp = SummaryDataPoint {
            start_ns: start_ns.is_valid(i).then(|| start_ns.value(i)).unwrap_or(0),
            time_ns: time_ns.value(i),
            count: count.value(i),
            sum: sum.value(i),
            quantiles: qs
                .into_iter()
                .zip(vs)
                .map(|(quantile, value)| SummaryQuantile { quantile, value })
                .collect(),
            flags: flags.value(i),
            attributes: attrs.get(&id).cloned().unwrap_or_default(),
        };
        out.entry(parent_ids.value(i)).or_default().push(dp);
    }
    Ok(out)
}

fn decode_histogram(records: &Batches) -> Result<HashMap<u32, Vec<HistogramDataPoint>>> {
    let mut out: HashMap<u32, Vec<HistogramDataPoint>> = HashMap::new();
    let Some(batch) = records.get(&PayloadType::Histograms) else {
        return Ok(out);
    };
    let ids = column_as::<UInt32Array>(batch, "id")?;
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let start_ns = column_as::<TimestampNanosecondArray>(batch, "start_time_unix_nano")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let count = column_as::<UInt64Array>(batch, "count")?;
    let sum = column_as::<Float64Array>(batch, "sum")?;
    let min = column_as::<Float64Array>(batch, "min")?;
    let max = column_as::<Float64Array>(batch, "max")?;
    let bucket_counts = column_as::<ListArray>(batch, "bucket_counts")?;
    let explicit_bounds = column_as::<ListArray>(batch, "explicit_bounds")?;
    let flags = column_as::<UInt32Array>(batch, "flags")?;
    let attrs = records
        .get(&PayloadType::HistogramAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();
    let exemplars = records
        .get(&PayloadType::HistogramExemplars)
        .map(decode_exemplars)
        .transpose()?
        .unwrap_or_default();

    for i in 0..batch.num_rows() {
        let id = ids.value(i);
        let dp = HistogramDataPoint {
            start_ns: start_ns.is_valid(i).then(|| start_ns.value(i)).unwrap_or(0),
            time_ns: time_ns.value(i),
            count: count.value(i),
            sum: sum.is_valid(i).then(|| sum.value(i)),
            min: min.is_valid(i).then(|| min.value(i)),
            max: max.is_valid(i).then(|| max.value(i)),
            bucket_counts: list_u64_at(bucket_counts, i),
            explicit_bounds: list_f64_at(explicit_bounds, i),
            flags: flags.value(i),
            attributes: attrs.get(&id).cloned().unwrap_or_default(),
            exemplars: exemplars.get(&id).cloned().unwrap_or_default(),
        };
        out.entry(parent_ids.value(i)).or_default().push(dp);
    }
    Ok(out)
}

fn decode_exp_histogram(
    records: &Batches,
) -> Result<HashMap<u32, Vec<ExponentialHistogramDataPoint>>> {
    let mut out: HashMap<u32, Vec<ExponentialHistogramDataPoint>> = HashMap::new();
    let Some(batch) = records.get(&PayloadType::ExpHistograms) else {
        return Ok(out);
    };
    let ids = column_as::<UInt32Array>(batch, "id")?;
    let parent_ids = column_as::<UInt32Array>(batch, "parent_id")?;
    let start_ns = column_as::<TimestampNanosecondArray>(batch, "start_time_unix_nano")?;
    let time_ns = column_as::<TimestampNanosecondArray>(batch, "time_unix_nano")?;
    let count = column_as::<UInt64Array>(batch, "count")?;
    let sum = column_as::<Float64Array>(batch, "sum")?;
    let min = column_as::<Float64Array>(batch, "min")?;
    let max = column_as::<Float64Array>(batch, "max")?;
    let scale = column_as::<Int32Array>(batch, "scale")?;
    let zero_count = column_as::<UInt64Array>(batch, "zero_count")?;
    let positive_offset = column_as::<Int32Array>(batch, "positive_offset")?;
    let positive_counts = column_as::<ListArray>(batch, "positive_bucket_counts")?;
    let negative_offset = column_as::<Int32Array>(batch, "negative_offset")?;
    let negative_counts = column_as::<ListArray>(batch, "negative_bucket_counts")?;
    let flags = column_as::<UInt32Array>(batch, "flags")?;
    let attrs = records
        .get(&PayloadType::ExpHistogramAttrs)
        .map(|b| decode_attributes(b, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup))
        .transpose()?
        .unwrap_or_default();
    let exemplars = records
        .get(&PayloadType::ExpHistogramExemplars)
        .map(decode_exemplars)
        .transpose()?
        .unwrap_or_default();

    for i in 0..batch.num_rows() {
        let id = ids.value(i);
        let dp = ExponentialHistogramDataPoint {
            start_ns: start_ns.is_valid(i).then(|| start_ns.value(i)).unwrap_or(0),
            time_ns: time_ns.value(i),
            count: count.value(i),
            sum: sum.is_valid(i).then(|| sum.value(i)),
            min: min.is_valid(i).then(|| min.value(i)),
            max: max.is_valid(i).then(|| max.value(i)),
            scale: scale.value(i),
            zero_count: zero_count.value(i),
            positive: ExponentialBuckets {
                offset: positive_offset.value(i),
                bucket_counts: list_u64_at(positive_counts, i),
            },
            negative: ExponentialBuckets {
                offset: negative_offset.value(i),
                bucket_counts: list_u64_at(negative_counts, i),
            },
            flags: flags.value(i),
            attributes: attrs.get(&id).cloned().unwrap_or_default(),
            exemplars: exemplars.get(&id).cloned().unwrap_or_default(),
        };
        out.entry(parent_ids.value(i)).or_default().push(dp);
    }
    Ok(out)
}

/// Reconstructs a `Metrics` pipeline batch from its METRICS main record and
/// the seven variant data-point/attrs/exemplar records, the inverse of
/// `builders::metrics::MetricsBuilder`.
pub fn decode_metrics(records: &Batches) -> Result<Metrics> {
    let Some(batch) = records.get(&PayloadType::Metrics) else {
        return Ok(Vec::new());
    };

    let ids = column_as::<UInt16Array>(batch, "id")?;
    let metric_type = column_as::<UInt8Array>(batch, "metric_type")?;
    let resource_attrs_id = column_as::<UInt16Array>(batch, "resource_attrs_id")?;
    let resource_schema_url = decode_string_column(batch, "resource_schema_url")?;
    let resource_dropped_attrs = column_as::<UInt32Array>(batch, "resource_dropped_attributes_count")?;
    let scope_attrs_id = column_as::<UInt16Array>(batch, "scope_attrs_id")?;
    let scope_dropped_attrs = column_as::<UInt32Array>(batch, "scope_dropped_attributes_count")?;
    let scope_schema_url = decode_string_column(batch, "scope_schema_url")?;
    let scope_names = decode_string_column(batch, "scope_name")?;
    let scope_versions = decode_string_column(batch, "scope_version")?;
    let names = decode_string_column(batch, "name")?;
    let descriptions = decode_string_column(batch, "description")?;
    let units = decode_string_column(batch, "unit")?;

    let (resource_attrs, scope_attrs) = decode_resource_scope_attrs(records)?;

    let int_gauge = decode_gauge_variant(
        records,
        PayloadType::IntGauge,
        PayloadType::IntGaugeAttrs,
        PayloadType::IntGaugeExemplars,
    )?;
    let double_gauge = decode_gauge_variant(
        records,
        PayloadType::DoubleGauge,
        PayloadType::DoubleGaugeAttrs,
        PayloadType::DoubleGaugeExemplars,
    )?;
    let int_sum = decode_sum_variant(
        records,
        PayloadType::IntSum,
        PayloadType::IntSumAttrs,
        PayloadType::IntSumExemplars,
    )?;
    let double_sum = decode_sum_variant(
        records,
        PayloadType::DoubleSum,
        PayloadType::DoubleSumAttrs,
        PayloadType::DoubleSumExemplars,
    )?;
    let summary = decode_summary(records)?;
    let histogram = decode_histogram(records)?;
    let exp_histogram = decode_exp_histogram(records)?;

    let mut groups: HashMap<GroupKey, usize> = HashMap::new();
    let mut resource_metrics: Vec<ResourceMetrics> = Vec::new();

    for i in 0..batch.num_rows() {
        let key = GroupKey {
            resource_attrs_id: opt_u16(resource_attrs_id, i),
            resource_schema_url: resource_schema_url[i].clone(),
            resource_dropped_attributes_count: resource_dropped_attrs.value(i),
            scope_attrs_id: opt_u16(scope_attrs_id, i),
            scope_name: scope_names[i].clone(),
            scope_version: scope_versions[i].clone(),
            scope_dropped_attributes_count: scope_dropped_attrs.value(i),
            scope_schema_url: scope_schema_url[i].clone(),
        };
        let idx = *groups.entry(key.clone()).or_insert_with(|| {
            resource_metrics.push(ResourceMetrics {
                resource: Resource {
                    attributes: key
                        .resource_attrs_id
                        .and_then(|id| resource_attrs.get(&u32::from(id)).cloned())
                        .unwrap_or_default(),
                    dropped_attributes_count: key.resource_dropped_attributes_count,
                },
                schema_url: key.resource_schema_url.clone(),
                scope_metrics: vec![ScopeMetrics {
                    scope: Scope {
                        name: key.scope_name.clone(),
                        version: key.scope_version.clone(),
                        attributes: key
                            .scope_attrs_id
                            .and_then(|id| scope_attrs.get(&u32::from(id)).cloned())
                            .unwrap_or_default(),
                        dropped_attributes_count: key.scope_dropped_attributes_count,
                    },
                    schema_url: key.scope_schema_url.clone(),
                    metrics: Vec::new(),
                }],
            });
            resource_metrics.len() - 1
        });

        let id = u32::from(ids.value(i));
        let data = match metric_type.value(i) {
            0 => MetricData::IntGauge(int_gauge.get(&id).cloned().unwrap_or_default()),
            1 => MetricData::DoubleGauge(double_gauge.get(&id).cloned().unwrap_or_default()),
            2 => MetricData::IntSum(int_sum.get(&id).cloned().unwrap_or_default()),
            3 => MetricData::DoubleSum(double_sum.get(&id).cloned().unwrap_or_default()),
            4 => MetricData::Summary(summary.get(&id).cloned().unwrap_or_default()),
            5 => MetricData::Histogram(histogram.get(&id).cloned().unwrap_or_default()),
            _ => MetricData::ExponentialHistogram(exp_histogram.get(&id).cloned().unwrap_or_default()),
        };
        let metric = Metric {
            name: names[i].clone(),
            description: descriptions[i].clone(),
            unit: units[i].clone(),
            data,
        };
        resource_metrics[idx].scope_metrics[0].metrics.push(metric);
    }
    Ok(resource_metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::logs::LogsBuilder;
    use crate::builders::metrics::MetricsBuilder;
    use crate::builders::traces::TracesBuilder;
    use crate::builders::EntityBuilder;
    use crate::ids::{SpanId, TraceId};
    use crate::otlp::*;

    fn to_batches(records: Vec<(PayloadType, RecordBatch)>) -> Batches {
        records.into_iter().collect()
    }

    #[test]
    fn decode_traces_round_trips_span_with_event_link_and_attrs() {
        let span = Span {
            trace_id: TraceId::new(&[1; 16]),
            span_id: SpanId::new(&[2; 8]),
            parent_span_id: SpanId::new(&[3; 8]),
            name: "GET /users".into(),
            kind: SpanKind::Server,
            start_ns: 100,
            duration_ns: 50,
            status: Status {
                code: StatusCode::Error,
                message: "boom".into(),
            },
            attributes: vec![("http.method".into(), AnyValue::Str("GET".into()))],
            events: vec![SpanEvent {
                name: "exception".into(),
                time_ns: 120,
                attributes: vec![("ex.type".into(), AnyValue::Str("IOError".into()))],
                dropped_attributes_count: 0,
            }],
            links: vec![SpanLink {
                trace_id: TraceId::new(&[9; 16]),
                span_id: SpanId::new(&[8; 8]),
                trace_state: "vendor=x".into(),
                attributes: vec![],
                dropped_attributes_count: 0,
            }],
            dropped_attributes_count: 1,
            dropped_events_count: 0,
            dropped_links_count: 0,
        };
        let mut resource = Resource::default();
        resource
            .attributes
            .push(("service.name".into(), AnyValue::Str("checkout".into())));
        let traces: Traces = vec![ResourceSpans {
            resource,
            schema_url: "unused".into(),
            scope_spans: vec![ScopeSpans {
                scope: Scope {
                    name: "tracer".into(),
                    version: "1.0".into(),
                    ..Scope::default()
                },
                schema_url: String::new(),
                spans: vec![span],
            }],
        }];

        let mut builder = TracesBuilder::default();
        builder.append(&traces).unwrap();
        let records = builder.build().unwrap();
        let decoded = decode_traces(&to_batches(records)).unwrap();

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].resource.attributes.len(), 1);
        let spans = &decoded[0].scope_spans[0].spans;
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET /users");
        assert_eq!(spans[0].start_ns, 100);
        assert_eq!(spans[0].duration_ns, 50);
        assert_eq!(spans[0].status.code, StatusCode::Error);
        assert_eq!(spans[0].status.message, "boom");
        assert_eq!(spans[0].attributes.len(), 1);
        assert_eq!(spans[0].events.len(), 1);
        assert_eq!(spans[0].events[0].name, "exception");
        assert_eq!(spans[0].links.len(), 1);
        assert_eq!(spans[0].links[0].trace_state, "vendor=x");
    }

    #[test]
    fn decode_logs_round_trips_map_body() {
        let log = LogRecord {
            time_ns: 10,
            observed_time_ns: 11,
            severity_number: 9,
            severity_text: "INFO".into(),
            body: AnyValue::Map(vec![("msg".into(), AnyValue::Str("started".into()))]),
            attributes: vec![("k".into(), AnyValue::Int(7))],
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

        let mut builder = LogsBuilder::default();
        builder.append(&logs).unwrap();
        let records = builder.build().unwrap();
        let decoded = decode_logs(&to_batches(records)).unwrap();

        assert_eq!(decoded.len(), 1);
        let record = &decoded[0].scope_logs[0].log_records[0];
        assert_eq!(record.severity_text, "INFO");
        assert!(crate::anyvalue::values_equal(
            &record.body,
            &AnyValue::Map(vec![("msg".into(), AnyValue::Str("started".into()))])
        ));
        assert_eq!(record.attributes.len(), 1);
    }

    #[test]
    fn decode_metrics_round_trips_histogram_and_int_gauge() {
        let gauge_dp = GaugeDataPoint {
            start_ns: 1,
            time_ns: 2,
            value: AnyValue::Int(42),
            flags: 0,
            attributes: vec![("k".into(), AnyValue::Str("v".into()))],
            exemplars: vec![Exemplar {
                time_ns: 2,
                value: AnyValue::Int(42),
                ..Default::default()
            }],
        };
        let hist_dp = HistogramDataPoint {
            start_ns: 0,
            time_ns: 1,
            count: 3,
            sum: Some(6.0),
            min: Some(1.0),
            max: Some(3.0),
            bucket_counts: vec![1, 1, 1],
            explicit_bounds: vec![1.0, 2.0],
            flags: 0,
            attributes: vec![],
            exemplars: vec![],
        };
        let metrics: Metrics = vec![ResourceMetrics {
            resource: Resource::default(),
            schema_url: String::new(),
            scope_metrics: vec![ScopeMetrics {
                scope: Scope::default(),
                schema_url: String::new(),
                metrics: vec![
                    Metric {
                        name: "requests".into(),
                        description: "total requests".into(),
                        unit: "1".into(),
                        data: MetricData::IntGauge(vec![gauge_dp]),
                    },
                    Metric {
                        name: "latency".into(),
                        description: String::new(),
                        unit: "ms".into(),
                        data: MetricData::Histogram(vec![hist_dp]),
                    },
                ],
            }],
        }];

        let mut builder = MetricsBuilder::default();
        builder.append(&metrics).unwrap();
        let records = builder.build().unwrap();
        let decoded = decode_metrics(&to_batches(records)).unwrap();

        assert_eq!(decoded.len(), 1);
        let decoded_metrics = &decoded[0].scope_metrics[0].metrics;
        assert_eq!(decoded_metrics.len(), 2);
        let gauge = decoded_metrics.iter().find(|m| m.name == "requests").unwrap();
        match &gauge.data {
            MetricData::IntGauge(points) => {
                assert_eq!(points.len(), 1);
                assert!(matches!(points[0].value, AnyValue::Int(42)));
                assert_eq!(points[0].exemplars.len(), 1);
            }
            other => panic!("expected IntGauge, got {other:?}"),
        }
        let hist = decoded_metrics.iter().find(|m| m.name == "latency").unwrap();
        match &hist.data {
            MetricData::Histogram(points) => {
                assert_eq!(points.len(), 1);
                assert_eq!(points[0].bucket_counts, vec![1, 1, 1]);
                assert_eq!(points[0].explicit_bounds, vec![1.0, 2.0]);
            }
            other => panic!("expected Histogram, got {other:?}"),
        }
    }
}
