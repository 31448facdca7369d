// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The closed set of OTAP payload types and their canonical Arrow schemas.

use crate::attributes::{ParentIdEncoding, ParentIdWidth};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::sync::Arc;

/// A closed set of tagged record kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(i32)]
pub enum PayloadType {
    /// Main metrics record.
    Metrics = 0,
    /// Main logs record.
    Logs = 1,
    /// Main spans record.
    Spans = 2,
    /// Resource-level attributes.
    ResourceAttrs = 3,
    /// Scope-level attributes.
    ScopeAttrs = 4,
    /// Span-level attributes.
    SpanAttrs = 5,
    /// Span-event attributes.
    SpanEventAttrs = 6,
    /// Span-link attributes.
    SpanLinkAttrs = 7,
    /// Log-record attributes.
    LogAttrs = 8,
    /// Span event child records.
    SpanEvents = 9,
    /// Span link child records.
    SpanLinks = 10,
    /// Integer gauge data points.
    IntGauge = 11,
    /// Double gauge data points.
    DoubleGauge = 12,
    /// Integer sum data points.
    IntSum = 13,
    /// Double sum data points.
    DoubleSum = 14,
    /// Summary data points.
    Summaries = 15,
    /// Explicit-bucket histogram data points.
    Histograms = 16,
    /// Exponential histogram data points.
    ExpHistograms = 17,
    /// Int-gauge data-point attributes.
    IntGaugeAttrs = 18,
    /// Double-gauge data-point attributes.
    DoubleGaugeAttrs = 19,
    /// Int-sum data-point attributes.
    IntSumAttrs = 20,
    /// Double-sum data-point attributes.
    DoubleSumAttrs = 21,
    /// Summary data-point attributes.
    SummaryAttrs = 22,
    /// Histogram data-point attributes.
    HistogramAttrs = 23,
    /// Exponential-histogram data-point attributes.
    ExpHistogramAttrs = 24,
    /// Int-gauge exemplars.
    IntGaugeExemplars = 25,
    /// Double-gauge exemplars.
    DoubleGaugeExemplars = 26,
    /// Int-sum exemplars.
    IntSumExemplars = 27,
    /// Double-sum exemplars.
    DoubleSumExemplars = 28,
    /// Histogram exemplars.
    HistogramExemplars = 29,
    /// Exponential-histogram exemplars.
    ExpHistogramExemplars = 30,
}

impl PayloadType {
    /// `true` for the three main-record kinds.
    #[must_use]
    pub fn is_main(self) -> bool {
        matches!(self, PayloadType::Metrics | PayloadType::Logs | PayloadType::Spans)
    }

    /// `true` for attribute-record kinds.
    #[must_use]
    pub fn is_attrs(self) -> bool {
        matches!(
            self,
            PayloadType::ResourceAttrs
                | PayloadType::ScopeAttrs
                | PayloadType::SpanAttrs
                | PayloadType::SpanEventAttrs
                | PayloadType::SpanLinkAttrs
                | PayloadType::LogAttrs
                | PayloadType::IntGaugeAttrs
                | PayloadType::DoubleGaugeAttrs
                | PayloadType::IntSumAttrs
                | PayloadType::DoubleSumAttrs
                | PayloadType::SummaryAttrs
                | PayloadType::HistogramAttrs
                | PayloadType::ExpHistogramAttrs
        )
    }

    /// The parent-id width used by this attribute-record kind. Resource/scope
    /// attrs use `u16` parent ids (they key off a small per-batch
    /// resource/scope table); span/log/metric-data-point attrs use `u32`.
    /// The owning row's own `id (u16)` is widened to `u32` on the attribute
    /// side so every attrs payload type can share one decoder (see
    /// `DESIGN.md`).
    #[must_use]
    pub fn parent_id_width(self) -> Option<ParentIdWidth> {
        match self {
            PayloadType::ResourceAttrs | PayloadType::ScopeAttrs => Some(ParentIdWidth::U16),
            _ if self.is_attrs() => Some(ParentIdWidth::U32),
            _ => None,
        }
    }

    /// The parent-id encoding used by this attribute-record kind:
    /// resource/scope attrs (which are small, per-batch tables) use plain
    /// delta encoding; span/log/metric-data-point attrs, which are sorted
    /// `(type, key, value, parent_id)`, use delta-group encoding since
    /// repeated `(key, value)` runs are common across sibling rows.
    #[must_use]
    pub fn parent_id_encoding(self) -> Option<ParentIdEncoding> {
        match self {
            PayloadType::ResourceAttrs | PayloadType::ScopeAttrs => Some(ParentIdEncoding::Delta),
            _ if self.is_attrs() => Some(ParentIdEncoding::DeltaGroup),
            _ => None,
        }
    }
}

/// `trace_id`/`span_id` fixed-width binary fields.
pub fn trace_id_field(name: &str) -> Field {
    Field::new(name, DataType::FixedSizeBinary(16), true)
}

/// `span_id` fixed-width binary field.
pub fn span_id_field(name: &str) -> Field {
    Field::new(name, DataType::FixedSizeBinary(8), true)
}

/// Nanosecond timestamp field.
pub fn timestamp_ns_field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Timestamp(TimeUnit::Nanosecond, None), nullable)
}

/// The canonical SPANS main-record schema, minus the dictionary-encoded
/// `name`/`scope_name`/`scope_version` columns, which the adaptive builder
/// supplies at their current width (see `builders::traces`).
#[must_use]
pub fn spans_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::UInt16, false),
        trace_id_field("trace_id"),
        span_id_field("span_id"),
        span_id_field("parent_span_id"),
        timestamp_ns_field("start_time_unix_nano", false),
        Field::new("duration_time_unix_nano", DataType::Int64, false),
        Field::new("kind", DataType::Int32, false),
        Field::new("status_code", DataType::Int32, true),
        Field::new("status_message", DataType::Utf8, true),
        Field::new("dropped_attributes_count", DataType::UInt32, false),
        Field::new("dropped_events_count", DataType::UInt32, false),
        Field::new("dropped_links_count", DataType::UInt32, false),
        Field::new("resource_attrs_id", DataType::UInt16, true),
        Field::new("resource_schema_url", DataType::Utf8, true),
        Field::new("resource_dropped_attributes_count", DataType::UInt32, false),
        Field::new("scope_attrs_id", DataType::UInt16, true),
        Field::new("scope_dropped_attributes_count", DataType::UInt32, false),
        Field::new("scope_schema_url", DataType::Utf8, true),
    ]
}

/// The canonical SPAN_EVENTS child-record schema.
#[must_use]
pub fn span_events_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::UInt16, false),
        Field::new("parent_id", DataType::UInt32, false),
        timestamp_ns_field("time_unix_nano", false),
        Field::new("dropped_attributes_count", DataType::UInt32, false),
    ]
}

/// The canonical SPAN_LINKS child-record schema.
#[must_use]
pub fn span_links_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::UInt16, false),
        Field::new("parent_id", DataType::UInt32, false),
        trace_id_field("trace_id"),
        span_id_field("span_id"),
        Field::new("dropped_attributes_count", DataType::UInt32, false),
    ]
}

/// The canonical LOGS main-record schema, minus dictionary columns and the
/// any-value `body` columns, built separately.
#[must_use]
pub fn logs_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::UInt16, false),
        timestamp_ns_field("time_unix_nano", false),
        timestamp_ns_field("observed_time_unix_nano", false),
        trace_id_field("trace_id"),
        span_id_field("span_id"),
        Field::new("severity_number", DataType::Int32, true),
        Field::new("flags", DataType::UInt32, false),
        Field::new("dropped_attributes_count", DataType::UInt32, false),
        Field::new("resource_attrs_id", DataType::UInt16, true),
        Field::new("resource_schema_url", DataType::Utf8, true),
        Field::new("resource_dropped_attributes_count", DataType::UInt32, false),
        Field::new("scope_attrs_id", DataType::UInt16, true),
        Field::new("scope_dropped_attributes_count", DataType::UInt32, false),
        Field::new("scope_schema_url", DataType::Utf8, true),
    ]
}

/// The canonical METRICS main-record schema.
#[must_use]
pub fn metrics_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::UInt16, false),
        Field::new("metric_type", DataType::UInt8, false),
        Field::new("resource_attrs_id", DataType::UInt16, true),
        Field::new("resource_schema_url", DataType::Utf8, true),
        Field::new("resource_dropped_attributes_count", DataType::UInt32, false),
        Field::new("scope_attrs_id", DataType::UInt16, true),
        Field::new("scope_dropped_attributes_count", DataType::UInt32, false),
        Field::new("scope_schema_url", DataType::Utf8, true),
    ]
}

/// Fixed fields shared by gauge/sum-shaped data-point records.
#[must_use]
pub fn gauge_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("parent_id", DataType::UInt32, false),
        timestamp_ns_field("start_time_unix_nano", true),
        timestamp_ns_field("time_unix_nano", false),
        Field::new("int_value", DataType::Int64, true),
        Field::new("double_value", DataType::Float64, true),
        Field::new("flags", DataType::UInt32, false),
    ]
}

/// Fixed fields for sum-shaped data points: gauge shape plus temporality and
/// monotonicity.
#[must_use]
pub fn sum_fixed_fields() -> Vec<Field> {
    let mut fields = gauge_fixed_fields();
    fields.push(Field::new("aggregation_temporality", DataType::Int32, false));
    fields.push(Field::new("is_monotonic", DataType::Boolean, false));
    fields
}

/// Fixed fields for summary data points. `quantile`/`value` are
/// carried as parallel `List<Float64>` columns since there is no list-of-
/// struct need beyond two parallel arrays of equal per-row length.
#[must_use]
pub fn summary_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("parent_id", DataType::UInt32, false),
        timestamp_ns_field("start_time_unix_nano", true),
        timestamp_ns_field("time_unix_nano", false),
        Field::new("count", DataType::UInt64, false),
        Field::new("sum", DataType::Float64, false),
        Field::new(
            "quantile_values",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            true,
        ),
        Field::new(
            "quantile_quantiles",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            true,
        ),
        Field::new("flags", DataType::UInt32, false),
    ]
}

/// Fixed fields for explicit-bucket histogram data points.
#[must_use]
pub fn histogram_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("parent_id", DataType::UInt32, false),
        timestamp_ns_field("start_time_unix_nano", true),
        timestamp_ns_field("time_unix_nano", false),
        Field::new("count", DataType::UInt64, false),
        Field::new("sum", DataType::Float64, true),
        Field::new("min", DataType::Float64, true),
        Field::new("max", DataType::Float64, true),
        Field::new(
            "bucket_counts",
            DataType::List(Arc::new(Field::new("item", DataType::UInt64, true))),
            false,
        ),
        Field::new(
            "explicit_bounds",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        ),
        Field::new("flags", DataType::UInt32, false),
    ]
}

/// Fixed fields for exponential-histogram data points.
#[must_use]
pub fn exp_histogram_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("parent_id", DataType::UInt32, false),
        timestamp_ns_field("start_time_unix_nano", true),
        timestamp_ns_field("time_unix_nano", false),
        Field::new("count", DataType::UInt64, false),
        Field::new("sum", DataType::Float64, true),
        Field::new("min", DataType::Float64, true),
        Field::new("max", DataType::Float64, true),
        Field::new("scale", DataType::Int32, false),
        Field::new("zero_count", DataType::UInt64, false),
        Field::new("positive_offset", DataType::Int32, false),
        Field::new(
            "positive_bucket_counts",
            DataType::List(Arc::new(Field::new("item", DataType::UInt64, true))),
            false,
        ),
        Field::new("negative_offset", DataType::Int32, false),
        Field::new(
            "negative_bucket_counts",
            DataType::List(Arc::new(Field::new("item", DataType::UInt64, true))),
            false,
        ),
        Field::new("flags", DataType::UInt32, false),
    ]
}

/// Fixed fields shared by exemplar records.
#[must_use]
pub fn exemplar_fixed_fields() -> Vec<Field> {
    vec![
        Field::new("parent_id", DataType::UInt32, false),
        timestamp_ns_field("time_unix_nano", false),
        Field::new("int_value", DataType::Int64, true),
        Field::new("double_value", DataType::Float64, true),
        span_id_field("span_id"),
        trace_id_field("trace_id"),
        Field::new("attrs_id", DataType::UInt32, true),
    ]
}

/// Wraps a set of fields into a [`SchemaRef`] carrying the `encoding` hint
/// metadata on its sole parent-id column, if any.
#[must_use]
pub fn finish_schema(mut fields: Vec<Field>, parent_id_encoding: Option<ParentIdEncoding>) -> SchemaRef {
    if let Some(encoding) = parent_id_encoding {
        if let Some(pos) = fields.iter().position(|f| f.name() == "parent_id") {
            let mut metadata = fields[pos].metadata().clone();
            let _ = metadata.insert("encoding".to_string(), encoding.as_metadata_str().to_string());
            fields[pos] = fields[pos].clone().with_metadata(metadata);
        }
    }
    Arc::new(Schema::new(fields))
}
