// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The in-memory OTLP entity model the codec consumes and produces.

use crate::anyvalue::AnyValue;
use crate::ids::{SpanId, TraceId};

/// `key -> value` attribute bag. Order is not semantically meaningful.
pub type Attributes = Vec<(String, AnyValue)>;

/// `Resource = {Attributes, DroppedAttributesCount}`.
#[derive(Clone, Debug, Default)]
pub struct Resource {
    /// Resource-level attributes.
    pub attributes: Attributes,
    /// Count of attributes dropped due to collection limits.
    pub dropped_attributes_count: u32,
}

/// `Scope = {Name, Version, Attributes, DroppedAttributesCount}`.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    /// Instrumentation scope name.
    pub name: String,
    /// Instrumentation scope version.
    pub version: String,
    /// Scope-level attributes.
    pub attributes: Attributes,
    /// Count of attributes dropped due to collection limits.
    pub dropped_attributes_count: u32,
}

/// Span kind (OTLP `SpanKind`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum SpanKind {
    /// Unspecified.
    #[default]
    Unspecified,
    /// Internal operation within an application.
    Internal,
    /// Synchronous request from a client.
    Server,
    /// Synchronous request to a server.
    Client,
    /// Initiator of an async request.
    Producer,
    /// Receiver of an async request.
    Consumer,
}

/// Span status code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum StatusCode {
    /// Default status.
    #[default]
    Unset,
    /// The operation succeeded.
    Ok,
    /// The operation failed.
    Error,
}

/// Span status (`{code, message}`).
#[derive(Clone, Debug, Default)]
pub struct Status {
    /// Status code.
    pub code: StatusCode,
    /// Human-readable status message (only meaningful when `code == Error`).
    pub message: String,
}

/// `SpanEvent`.
#[derive(Clone, Debug, Default)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// Event timestamp, nanoseconds since Unix epoch.
    pub time_ns: i64,
    /// Event attributes.
    pub attributes: Attributes,
    /// Count of attributes dropped due to collection limits.
    pub dropped_attributes_count: u32,
}

/// `SpanLink`.
#[derive(Clone, Debug, Default)]
pub struct SpanLink {
    /// Linked trace id.
    pub trace_id: TraceId,
    /// Linked span id.
    pub span_id: SpanId,
    /// W3C tracestate of the linked span.
    pub trace_state: String,
    /// Link attributes.
    pub attributes: Attributes,
    /// Count of attributes dropped due to collection limits.
    pub dropped_attributes_count: u32,
}

/// `Span`. `end_ns = start_ns + duration_ns`; negative
/// durations are rejected at encode time.
#[derive(Clone, Debug, Default)]
pub struct Span {
    /// Trace id, 16 bytes, zero-padded when absent.
    pub trace_id: TraceId,
    /// Span id, 8 bytes, zero-padded when absent.
    pub span_id: SpanId,
    /// Parent span id; zero when this is a root span.
    pub parent_span_id: SpanId,
    /// Span name.
    pub name: String,
    /// Span kind.
    pub kind: SpanKind,
    /// Start time, nanoseconds since Unix epoch.
    pub start_ns: i64,
    /// Duration in nanoseconds. Must be non-negative.
    pub duration_ns: i64,
    /// Span status.
    pub status: Status,
    /// Span attributes.
    pub attributes: Attributes,
    /// Child events, in order.
    pub events: Vec<SpanEvent>,
    /// Child links, in order.
    pub links: Vec<SpanLink>,
    /// Count of attributes dropped due to collection limits.
    pub dropped_attributes_count: u32,
    /// Count of events dropped due to collection limits.
    pub dropped_events_count: u32,
    /// Count of links dropped due to collection limits.
    pub dropped_links_count: u32,
}

impl Span {
    /// `start_ns + duration_ns`.
    #[must_use]
    pub fn end_ns(&self) -> i64 {
        self.start_ns + self.duration_ns
    }
}

/// `ScopeSpans = {Scope, SchemaUrl, list<Span>}`.
#[derive(Clone, Debug, Default)]
pub struct ScopeSpans {
    /// Instrumentation scope.
    pub scope: Scope,
    /// Schema URL for this scope's spans.
    pub schema_url: String,
    /// Spans belonging to this scope.
    pub spans: Vec<Span>,
}

/// `ResourceSpans = {Resource, SchemaUrl, list<ScopeSpans>}`.
#[derive(Clone, Debug, Default)]
pub struct ResourceSpans {
    /// Resource producing these spans.
    pub resource: Resource,
    /// Schema URL for this resource's spans.
    pub schema_url: String,
    /// Per-scope span groups.
    pub scope_spans: Vec<ScopeSpans>,
}

/// `Traces = list<ResourceSpans>`.
pub type Traces = Vec<ResourceSpans>;

/// Log record severity number (OTLP `SeverityNumber`, carried verbatim).
pub type SeverityNumber = i32;

/// `LogRecord`.
#[derive(Clone, Debug, Default)]
pub struct LogRecord {
    /// Event time, nanoseconds since Unix epoch.
    pub time_ns: i64,
    /// Time the record was observed by the collection pipeline.
    pub observed_time_ns: i64,
    /// Trace id this record is correlated with, if any.
    pub trace_id: TraceId,
    /// Span id this record is correlated with, if any.
    pub span_id: SpanId,
    /// Numeric severity.
    pub severity_number: SeverityNumber,
    /// Textual severity.
    pub severity_text: String,
    /// Log body.
    pub body: AnyValue,
    /// Record attributes.
    pub attributes: Attributes,
    /// OTLP trace flags.
    pub flags: u32,
    /// Count of attributes dropped due to collection limits.
    pub dropped_attributes_count: u32,
}

/// `ScopeLogs = {Scope, SchemaUrl, list<LogRecord>}`.
#[derive(Clone, Debug, Default)]
pub struct ScopeLogs {
    /// Instrumentation scope.
    pub scope: Scope,
    /// Schema URL for this scope's logs.
    pub schema_url: String,
    /// Log records belonging to this scope.
    pub log_records: Vec<LogRecord>,
}

/// `ResourceLogs = {Resource, SchemaUrl, list<ScopeLogs>}`.
#[derive(Clone, Debug, Default)]
pub struct ResourceLogs {
    /// Resource producing these logs.
    pub resource: Resource,
    /// Schema URL for this resource's logs.
    pub schema_url: String,
    /// Per-scope log groups.
    pub scope_logs: Vec<ScopeLogs>,
}

/// `Logs = list<ResourceLogs>`.
pub type Logs = Vec<ResourceLogs>;

/// Data-point flags (OTLP `DataPointFlags`), carried verbatim.
pub type DataPointFlags = u32;

/// An exemplar attached to a metric data point.
#[derive(Clone, Debug, Default)]
pub struct Exemplar {
    /// Exemplar timestamp, nanoseconds since Unix epoch.
    pub time_ns: i64,
    /// Exemplar value (`Int` or `Double` arm of [`AnyValue`]).
    pub value: AnyValue,
    /// Span id of the span active when this measurement was recorded.
    pub span_id: SpanId,
    /// Trace id of the trace active when this measurement was recorded.
    pub trace_id: TraceId,
    /// Filtered attributes attached directly to the exemplar.
    pub filtered_attributes: Attributes,
}

/// Gauge-shaped data point: used for both int and double gauges,
/// distinguished by which arm of `value` is populated.
#[derive(Clone, Debug, Default)]
pub struct GaugeDataPoint {
    /// Start time, nanoseconds since Unix epoch.
    pub start_ns: i64,
    /// Sample time, nanoseconds since Unix epoch.
    pub time_ns: i64,
    /// Value (`Int` or `Double`).
    pub value: AnyValue,
    /// Data-point flags.
    pub flags: DataPointFlags,
    /// Data-point attributes.
    pub attributes: Attributes,
    /// Attached exemplars.
    pub exemplars: Vec<Exemplar>,
}

/// Aggregation temporality (OTLP `AggregationTemporality`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum AggregationTemporality {
    /// Unspecified.
    #[default]
    Unspecified,
    /// Delta: each point covers only the interval since the previous point.
    Delta,
    /// Cumulative: each point covers the interval since the start time.
    Cumulative,
}

/// Sum-shaped data point: gauge shape plus temporality and monotonicity.
#[derive(Clone, Debug, Default)]
pub struct SumDataPoint {
    /// The underlying gauge-shaped fields.
    pub gauge: GaugeDataPoint,
    /// Aggregation temporality.
    pub temporality: AggregationTemporality,
    /// Whether the sum is monotonically increasing.
    pub is_monotonic: bool,
}

/// One `(quantile, value)` pair of a summary data point.
#[derive(Clone, Copy, Debug, Default)]
pub struct SummaryQuantile {
    /// Quantile, in `[0, 1]`.
    pub quantile: f64,
    /// Value at that quantile.
    pub value: f64,
}

/// Summary-shaped data point.
#[derive(Clone, Debug, Default)]
pub struct SummaryDataPoint {
    /// Start time, nanoseconds since Unix epoch.
    pub start_ns: i64,
    /// Sample time, nanoseconds since Unix epoch.
    pub time_ns: i64,
    /// Number of observations.
    pub count: u64,
    /// Sum of observed values.
    pub sum: f64,
    /// Quantile values.
    pub quantiles: Vec<SummaryQuantile>,
    /// Data-point flags.
    pub flags: DataPointFlags,
    /// Data-point attributes.
    pub attributes: Attributes,
}

/// Explicit-bucket histogram data point. Invariant:
/// `bucket_counts.len() == explicit_bounds.len() + 1`.
#[derive(Clone, Debug, Default)]
pub struct HistogramDataPoint {
    /// Start time, nanoseconds since Unix epoch.
    pub start_ns: i64,
    /// Sample time, nanoseconds since Unix epoch.
    pub time_ns: i64,
    /// Number of observations.
    pub count: u64,
    /// Sum of observed values, if recorded.
    pub sum: Option<f64>,
    /// Minimum observed value, if recorded.
    pub min: Option<f64>,
    /// Maximum observed value, if recorded.
    pub max: Option<f64>,
    /// Per-bucket counts; `len() == explicit_bounds.len() + 1`.
    pub bucket_counts: Vec<u64>,
    /// Bucket upper bounds, ascending.
    pub explicit_bounds: Vec<f64>,
    /// Data-point flags.
    pub flags: DataPointFlags,
    /// Data-point attributes.
    pub attributes: Attributes,
    /// Attached exemplars.
    pub exemplars: Vec<Exemplar>,
}

/// One side (positive or negative) of an exponential histogram's buckets
///: independent offset, absent lists treated as zero-length.
#[derive(Clone, Debug, Default)]
pub struct ExponentialBuckets {
    /// Index of the first bucket, relative to scale.
    pub offset: i32,
    /// Per-bucket counts.
    pub bucket_counts: Vec<u64>,
}

/// Exponential-histogram data point.
#[derive(Clone, Debug, Default)]
pub struct ExponentialHistogramDataPoint {
    /// Start time, nanoseconds since Unix epoch.
    pub start_ns: i64,
    /// Sample time, nanoseconds since Unix epoch.
    pub time_ns: i64,
    /// Number of observations.
    pub count: u64,
    /// Sum of observed values, if recorded.
    pub sum: Option<f64>,
    /// Minimum observed value, if recorded.
    pub min: Option<f64>,
    /// Maximum observed value, if recorded.
    pub max: Option<f64>,
    /// Bucket scale factor.
    pub scale: i32,
    /// Count of values exactly zero.
    pub zero_count: u64,
    /// Positive-value buckets.
    pub positive: ExponentialBuckets,
    /// Negative-value buckets.
    pub negative: ExponentialBuckets,
    /// Data-point flags.
    pub flags: DataPointFlags,
    /// Data-point attributes.
    pub attributes: Attributes,
    /// Attached exemplars.
    pub exemplars: Vec<Exemplar>,
}

/// The variant-specific data carried by a [`Metric`].
#[derive(Clone, Debug)]
pub enum MetricData {
    /// Integer-valued gauge (`value` arm of each point is `AnyValue::Int`).
    IntGauge(Vec<GaugeDataPoint>),
    /// Double-valued gauge.
    DoubleGauge(Vec<GaugeDataPoint>),
    /// Integer-valued sum.
    IntSum(Vec<SumDataPoint>),
    /// Double-valued sum.
    DoubleSum(Vec<SumDataPoint>),
    /// Summary.
    Summary(Vec<SummaryDataPoint>),
    /// Explicit-bucket histogram.
    Histogram(Vec<HistogramDataPoint>),
    /// Exponential histogram.
    ExponentialHistogram(Vec<ExponentialHistogramDataPoint>),
}

/// `Metric = {name, description, unit, variant}`.
#[derive(Clone, Debug)]
pub struct Metric {
    /// Metric name.
    pub name: String,
    /// Metric description.
    pub description: String,
    /// Metric unit.
    pub unit: String,
    /// Variant-specific data points.
    pub data: MetricData,
}

/// `ScopeMetrics = {Scope, SchemaUrl, list<Metric>}`.
#[derive(Clone, Debug, Default)]
pub struct ScopeMetrics {
    /// Instrumentation scope.
    pub scope: Scope,
    /// Schema URL for this scope's metrics.
    pub schema_url: String,
    /// Metrics belonging to this scope.
    pub metrics: Vec<Metric>,
}

/// `ResourceMetrics = {Resource, SchemaUrl, list<ScopeMetrics>}`.
#[derive(Clone, Debug, Default)]
pub struct ResourceMetrics {
    /// Resource producing these metrics.
    pub resource: Resource,
    /// Schema URL for this resource's metrics.
    pub schema_url: String,
    /// Per-scope metric groups.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// `Metrics = list<ResourceMetrics>`.
pub type Metrics = Vec<ResourceMetrics>;
