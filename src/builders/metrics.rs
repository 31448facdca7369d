// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metrics builder: main metric record plus the seven variant-specific
//! data-point accumulators (int/double gauge, int/double sum, summary,
//! histogram, exponential histogram), each with its own attrs and
//! exemplars.

use super::EntityBuilder;
use crate::adaptive::AdaptiveStringColumn;
use crate::attributes::{AttributeAccumulator, ParentIdEncoding, ParentIdWidth, SortOrder};
use crate::dictionary::DictionaryConfig;
use crate::error::{Error, Result};
use crate::optimizer;
use crate::otlp::{
    Exemplar, GaugeDataPoint, HistogramDataPoint, Metric, MetricData, Metrics, SumDataPoint,
    SummaryDataPoint,
};
use crate::schema::{self, PayloadType};
use crate::stats::Stats;
use arrow::array::{
    FixedSizeBinaryArray, Float64Array, Int32Array, ListArray, RecordBatch, StringArray,
    TimestampNanosecondArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{Field, Float64Type, Schema, UInt64Type};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Bundles a `ResourceMetrics`/`ScopeMetrics` pair's scalar fields so
/// `push_metric` doesn't need a growing parameter list.
struct ResourceScopeContext<'a> {
    resource_attrs_id: Option<u16>,
    resource_schema_url: Option<&'a str>,
    resource_dropped_attributes_count: u32,
    scope_attrs_id: Option<u16>,
    scope_name: Option<&'a str>,
    scope_version: Option<&'a str>,
    scope_dropped_attributes_count: u32,
    scope_schema_url: Option<&'a str>,
}

fn metric_type_code(data: &MetricData) -> u8 {
    match data {
        MetricData::IntGauge(_) => 0,
        MetricData::DoubleGauge(_) => 1,
        MetricData::IntSum(_) => 2,
        MetricData::DoubleSum(_) => 3,
        MetricData::Summary(_) => 4,
        MetricData::Histogram(_) => 5,
        MetricData::ExponentialHistogram(_) => 6,
    }
}

fn list_f64(rows: Vec<Vec<f64>>) -> ListArray {
    ListArray::from_iter_primitive::<Float64Type, _, _>(
        rows.into_iter()
            .map(|r| Some(r.into_iter().map(Some).collect::<Vec<_>>())),
    )
}

fn list_u64(rows: Vec<Vec<u64>>) -> ListArray {
    ListArray::from_iter_primitive::<UInt64Type, _, _>(
        rows.into_iter()
            .map(|r| Some(r.into_iter().map(Some).collect::<Vec<_>>())),
    )
}

fn fixed_bytes<const N: usize>(rows: &[[u8; N]]) -> Result<FixedSizeBinaryArray> {
    FixedSizeBinaryArray::try_from_iter(rows.iter()).map_err(Error::from)
}

/// One variant's worth of state: gauge/sum-shaped data points, their attrs,
/// and their exemplars, keyed by a per-variant `u32` data-point id.
struct GaugeLikeVariant {
    payload_type: PayloadType,
    attrs_payload_type: PayloadType,
    exemplars_payload_type: PayloadType,
    ids: Vec<u32>,
    parent_ids: Vec<u32>,
    start_ns: Vec<Option<i64>>,
    time_ns: Vec<i64>,
    int_value: Vec<Option<i64>>,
    double_value: Vec<Option<f64>>,
    flags: Vec<u32>,
    temporality: Vec<Option<i32>>,
    is_monotonic: Vec<Option<bool>>,
    attrs: AttributeAccumulator,
    exemplar_rows: ExemplarRows,
    next_id: u32,
}

#[derive(Default)]
struct ExemplarRows {
    parent_ids: Vec<u32>,
    time_ns: Vec<i64>,
    int_value: Vec<Option<i64>>,
    double_value: Vec<Option<f64>>,
    span_ids: Vec<[u8; 8]>,
    trace_ids: Vec<[u8; 16]>,
}

impl ExemplarRows {
    fn push(&mut self, parent_id: u32, ex: &Exemplar) {
        self.parent_ids.push(parent_id);
        self.time_ns.push(ex.time_ns);
        match &ex.value {
            crate::anyvalue::AnyValue::Int(i) => {
                self.int_value.push(Some(*i));
                self.double_value.push(None);
            }
            crate::anyvalue::AnyValue::Double(d) => {
                self.int_value.push(None);
                self.double_value.push(Some(*d));
            }
            _ => {
                self.int_value.push(None);
                self.double_value.push(None);
            }
        }
        self.span_ids.push(*ex.span_id.as_bytes());
        self.trace_ids.push(*ex.trace_id.as_bytes());
    }

    fn is_empty(&self) -> bool {
        self.parent_ids.is_empty()
    }

    fn build(&self) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(schema::exemplar_fixed_fields()));
        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt32Array::from(self.parent_ids.clone())),
                Arc::new(TimestampNanosecondArray::from(self.time_ns.clone())),
                Arc::new(arrow::array::Int64Array::from(self.int_value.clone())),
                Arc::new(Float64Array::from(self.double_value.clone())),
                Arc::new(fixed_bytes(&self.span_ids)?),
                Arc::new(fixed_bytes(&self.trace_ids)?),
                Arc::new(UInt32Array::from(vec![None::<u32>; self.parent_ids.len()])),
            ],
        )?)
    }
}

impl GaugeLikeVariant {
    fn new(
        payload_type: PayloadType,
        attrs_payload_type: PayloadType,
        exemplars_payload_type: PayloadType,
    ) -> Self {
        Self {
            payload_type,
            attrs_payload_type,
            exemplars_payload_type,
            ids: Vec::new(),
            parent_ids: Vec::new(),
            start_ns: Vec::new(),
            time_ns: Vec::new(),
            int_value: Vec::new(),
            double_value: Vec::new(),
            flags: Vec::new(),
            temporality: Vec::new(),
            is_monotonic: Vec::new(),
            attrs: AttributeAccumulator::new(
                ParentIdWidth::U32,
                ParentIdEncoding::DeltaGroup,
                SortOrder::TypeKeyValueParent,
            ),
            exemplar_rows: ExemplarRows::default(),
            next_id: 0,
        }
    }

    #[must_use]
    fn with_stats(mut self, stats: Rc<Stats>) -> Self {
        self.attrs = self.attrs.with_stats(stats);
        self
    }

    fn push_gauge(&mut self, metric_id: u32, dp: &GaugeDataPoint, is_int: bool) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ids.push(id);
        self.parent_ids.push(metric_id);
        self.start_ns.push(Some(dp.start_ns));
        self.time_ns.push(dp.time_ns);
        match (&dp.value, is_int) {
            (crate::anyvalue::AnyValue::Int(i), true) => {
                self.int_value.push(Some(*i));
                self.double_value.push(None);
            }
            (crate::anyvalue::AnyValue::Double(d), false) => {
                self.int_value.push(None);
                self.double_value.push(Some(*d));
            }
            _ => {
                self.int_value.push(None);
                self.double_value.push(None);
            }
        }
        self.flags.push(dp.flags);
        if !dp.attributes.is_empty() {
            self.attrs.push_all(id, &dp.attributes);
        }
        for exemplar in &dp.exemplars {
            self.exemplar_rows.push(id, exemplar);
        }
    }

    fn push_sum(&mut self, metric_id: u32, dp: &SumDataPoint, is_int: bool) {
        self.push_gauge(metric_id, &dp.gauge, is_int);
        self.temporality.push(Some(dp.temporality as i32));
        self.is_monotonic.push(Some(dp.is_monotonic));
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn build_points(&self, is_sum: bool) -> Result<RecordBatch> {
        let fields = if is_sum {
            schema::sum_fixed_fields()
        } else {
            schema::gauge_fixed_fields()
        };
        let mut all_fields = vec![Field::new("id", arrow::datatypes::DataType::UInt32, false)];
        all_fields.extend(fields);
        let schema = Arc::new(Schema::new(all_fields));
        let mut columns: Vec<arrow::array::ArrayRef> = vec![
            Arc::new(UInt32Array::from(self.ids.clone())),
            Arc::new(UInt32Array::from(self.parent_ids.clone())),
            Arc::new(TimestampNanosecondArray::from(self.start_ns.clone())),
            Arc::new(TimestampNanosecondArray::from(self.time_ns.clone())),
            Arc::new(arrow::array::Int64Array::from(self.int_value.clone())),
            Arc::new(Float64Array::from(self.double_value.clone())),
            Arc::new(UInt32Array::from(self.flags.clone())),
        ];
        if is_sum {
            columns.push(Arc::new(Int32Array::from(self.temporality.clone())));
            columns.push(Arc::new(arrow::array::BooleanArray::from(
                self.is_monotonic.clone(),
            )));
        }
        Ok(RecordBatch::try_new(schema, columns)?)
    }

    fn build(&mut self, is_sum: bool) -> Result<Vec<(PayloadType, RecordBatch)>> {
        let mut out = Vec::new();
        if self.is_empty() {
            return Ok(out);
        }
        out.push((self.payload_type, self.build_points(is_sum)?));
        if let Some(batch) = self.attrs.build()? {
            out.push((self.attrs_payload_type, batch));
        }
        if !self.exemplar_rows.is_empty() {
            out.push((self.exemplars_payload_type, self.exemplar_rows.build()?));
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.ids.clear();
        self.parent_ids.clear();
        self.start_ns.clear();
        self.time_ns.clear();
        self.int_value.clear();
        self.double_value.clear();
        self.flags.clear();
        self.temporality.clear();
        self.is_monotonic.clear();
        self.attrs.reset();
        self.exemplar_rows = ExemplarRows::default();
        self.next_id = 0;
    }
}

#[derive(Default)]
struct SummaryRows {
    ids: Vec<u32>,
    parent_ids: Vec<u32>,
    start_ns: Vec<Option<i64>>,
    time_ns: Vec<i64>,
    count: Vec<u64>,
    sum: Vec<f64>,
    quantiles: Vec<Vec<f64>>,
    values: Vec<Vec<f64>>,
    flags: Vec<u32>,
    next_id: u32,
}

#[derive(Default)]
struct HistogramRows {
    ids: Vec<u32>,
    parent_ids: Vec<u32>,
    start_ns: Vec<Option<i64>>,
    time_ns: Vec<i64>,
    count: Vec<u64>,
    sum: Vec<Option<f64>>,
    min: Vec<Option<f64>>,
    max: Vec<Option<f64>>,
    bucket_counts: Vec<Vec<u64>>,
    explicit_bounds: Vec<Vec<f64>>,
    flags: Vec<u32>,
    next_id: u32,
}

#[derive(Default)]
struct ExpHistogramRows {
    ids: Vec<u32>,
    parent_ids: Vec<u32>,
    start_ns: Vec<Option<i64>>,
    time_ns: Vec<i64>,
    count: Vec<u64>,
    sum: Vec<Option<f64>>,
    min: Vec<Option<f64>>,
    max: Vec<Option<f64>>,
    scale: Vec<i32>,
    zero_count: Vec<u64>,
    positive_offset: Vec<i32>,
    positive_counts: Vec<Vec<u64>>,
    negative_offset: Vec<i32>,
    negative_counts: Vec<Vec<u64>>,
    flags: Vec<u32>,
    next_id: u32,
}

#[derive(Default)]
struct MetricRows {
    ids: Vec<u16>,
    metric_type: Vec<u8>,
    resource_attrs_id: Vec<Option<u16>>,
    resource_schema_url: Vec<Option<String>>,
    resource_dropped_attrs: Vec<u32>,
    scope_attrs_id: Vec<Option<u16>>,
    scope_dropped_attrs: Vec<u32>,
    scope_schema_url: Vec<Option<String>>,
}

/// Builds the METRICS main record and the per-variant data-point/attrs/
/// exemplar records.
pub struct MetricsBuilder {
    dict_config: DictionaryConfig,
    stats: Rc<Stats>,
    rows: MetricRows,
    names: AdaptiveStringColumn,
    descriptions: AdaptiveStringColumn,
    units: AdaptiveStringColumn,
    scope_names: AdaptiveStringColumn,
    scope_versions: AdaptiveStringColumn,
    resource_attrs: AttributeAccumulator,
    scope_attrs: AttributeAccumulator,
    int_gauge: GaugeLikeVariant,
    double_gauge: GaugeLikeVariant,
    int_sum: GaugeLikeVariant,
    double_sum: GaugeLikeVariant,
    summary: SummaryRows,
    summary_attrs: AttributeAccumulator,
    histogram: HistogramRows,
    histogram_attrs: AttributeAccumulator,
    histogram_exemplars: ExemplarRows,
    exp_histogram: ExpHistogramRows,
    exp_histogram_attrs: AttributeAccumulator,
    exp_histogram_exemplars: ExemplarRows,
    next_metric_id: u16,
    next_resource_attrs_id: u16,
    next_scope_attrs_id: u16,
    resource_attrs_cache: HashMap<String, u16>,
    scope_attrs_cache: HashMap<String, u16>,
}

fn attrs_acc() -> AttributeAccumulator {
    AttributeAccumulator::new(
        ParentIdWidth::U32,
        ParentIdEncoding::DeltaGroup,
        SortOrder::TypeKeyValueParent,
    )
}

impl Default for MetricsBuilder {
    fn default() -> Self {
        Self::with_dictionary_config(DictionaryConfig::default_str())
    }
}

impl MetricsBuilder {
    /// Builds with a non-default dictionary index-width policy for its
    /// string columns.
    #[must_use]
    pub fn with_dictionary_config(dict_config: DictionaryConfig) -> Self {
        let stats = Rc::new(Stats::default());
        Self {
            dict_config,
            stats: Rc::clone(&stats),
            rows: MetricRows::default(),
            names: AdaptiveStringColumn::new("name", dict_config),
            descriptions: AdaptiveStringColumn::new("description", dict_config),
            units: AdaptiveStringColumn::new("unit", dict_config),
            scope_names: AdaptiveStringColumn::new("scope_name", dict_config),
            scope_versions: AdaptiveStringColumn::new("scope_version", dict_config),
            resource_attrs: AttributeAccumulator::new(
                ParentIdWidth::U16,
                ParentIdEncoding::Delta,
                SortOrder::TypeParentKeyValue,
            )
            .with_stats(Rc::clone(&stats)),
            scope_attrs: AttributeAccumulator::new(
                ParentIdWidth::U16,
                ParentIdEncoding::Delta,
                SortOrder::TypeParentKeyValue,
            )
            .with_stats(Rc::clone(&stats)),
            int_gauge: GaugeLikeVariant::new(
                PayloadType::IntGauge,
                PayloadType::IntGaugeAttrs,
                PayloadType::IntGaugeExemplars,
            )
            .with_stats(Rc::clone(&stats)),
            double_gauge: GaugeLikeVariant::new(
                PayloadType::DoubleGauge,
                PayloadType::DoubleGaugeAttrs,
                PayloadType::DoubleGaugeExemplars,
            )
            .with_stats(Rc::clone(&stats)),
            int_sum: GaugeLikeVariant::new(
                PayloadType::IntSum,
                PayloadType::IntSumAttrs,
                PayloadType::IntSumExemplars,
            )
            .with_stats(Rc::clone(&stats)),
            double_sum: GaugeLikeVariant::new(
                PayloadType::DoubleSum,
                PayloadType::DoubleSumAttrs,
                PayloadType::DoubleSumExemplars,
            )
            .with_stats(Rc::clone(&stats)),
            summary: SummaryRows::default(),
            summary_attrs: attrs_acc().with_stats(Rc::clone(&stats)),
            histogram: HistogramRows::default(),
            histogram_attrs: attrs_acc().with_stats(Rc::clone(&stats)),
            histogram_exemplars: ExemplarRows::default(),
            exp_histogram: ExpHistogramRows::default(),
            exp_histogram_attrs: attrs_acc().with_stats(Rc::clone(&stats)),
            exp_histogram_exemplars: ExemplarRows::default(),
            next_metric_id: 0,
            next_resource_attrs_id: 0,
            next_scope_attrs_id: 0,
            resource_attrs_cache: HashMap::new(),
            scope_attrs_cache: HashMap::new(),
        }
    }
}

impl MetricsBuilder {
    fn push_metric(&mut self, metric: &Metric, ctx: &ResourceScopeContext<'_>) -> Result<()> {
        let id = self.next_metric_id;
        self.next_metric_id = self.next_metric_id.wrapping_add(1);
        self.rows.ids.push(id);
        self.rows.metric_type.push(metric_type_code(&metric.data));
        self.rows.resource_attrs_id.push(ctx.resource_attrs_id);
        self.rows
            .resource_schema_url
            .push(ctx.resource_schema_url.map(str::to_owned));
        self.rows
            .resource_dropped_attrs
            .push(ctx.resource_dropped_attributes_count);
        self.rows.scope_attrs_id.push(ctx.scope_attrs_id);
        self.rows
            .scope_dropped_attrs
            .push(ctx.scope_dropped_attributes_count);
        self.rows
            .scope_schema_url
            .push(ctx.scope_schema_url.map(str::to_owned));
        self.names.append(Some(&metric.name));
        self.descriptions.append(Some(&metric.description));
        self.units.append(Some(&metric.unit));
        self.scope_names.append(ctx.scope_name);
        self.scope_versions.append(ctx.scope_version);

        let metric_id = id as u32;
        match &metric.data {
            MetricData::IntGauge(points) => {
                for p in points {
                    self.int_gauge.push_gauge(metric_id, p, true);
                }
            }
            MetricData::DoubleGauge(points) => {
                for p in points {
                    self.double_gauge.push_gauge(metric_id, p, false);
                }
            }
            MetricData::IntSum(points) => {
                for p in points {
                    self.int_sum.push_sum(metric_id, p, true);
                }
            }
            MetricData::DoubleSum(points) => {
                for p in points {
                    self.double_sum.push_sum(metric_id, p, false);
                }
            }
            MetricData::Summary(points) => {
                for p in points {
                    self.push_summary(metric_id, p);
                }
            }
            MetricData::Histogram(points) => {
                for p in points {
                    self.push_histogram(metric_id, p)?;
                }
            }
            MetricData::ExponentialHistogram(points) => {
                for p in points {
                    self.push_exp_histogram(metric_id, p);
                }
            }
        }
        Ok(())
    }

    fn push_summary(&mut self, metric_id: u32, dp: &SummaryDataPoint) {
        let id = self.summary.next_id;
        self.summary.next_id = self.summary.next_id.wrapping_add(1);
        self.summary.ids.push(id);
        self.summary.parent_ids.push(metric_id);
        self.summary.start_ns.push(Some(dp.start_ns));
        self.summary.time_ns.push(dp.time_ns);
        self.summary.count.push(dp.count);
        self.summary.sum.push(dp.sum);
        self.summary
            .quantiles
            .push(dp.quantiles.iter().map(|q| q.quantile).collect());
        self.summary
            .values
            .push(dp.quantiles.iter().map(|q| q.value).collect());
        self.summary.flags.push(dp.flags);
        if !dp.attributes.is_empty() {
            self.summary_attrs.push_all(id, &dp.attributes);
        }
    }

    fn push_histogram(&mut self, metric_id: u32, dp: &HistogramDataPoint) -> Result<()> {
        if dp.bucket_counts.len() != dp.explicit_bounds.len() + 1 {
            return Err(Error::HistogramBucketMismatch {
                bucket_counts: dp.bucket_counts.len(),
                explicit_bounds: dp.explicit_bounds.len(),
            });
        }
        let id = self.histogram.next_id;
        self.histogram.next_id = self.histogram.next_id.wrapping_add(1);
        self.histogram.ids.push(id);
        self.histogram.parent_ids.push(metric_id);
        self.histogram.start_ns.push(Some(dp.start_ns));
        self.histogram.time_ns.push(dp.time_ns);
        self.histogram.count.push(dp.count);
        self.histogram.sum.push(dp.sum);
        self.histogram.min.push(dp.min);
        self.histogram.max.push(dp.max);
        self.histogram.bucket_counts.push(dp.bucket_counts.clone());
        self.histogram.explicit_bounds.push(dp.explicit_bounds.clone());
        self.histogram.flags.push(dp.flags);
        if !dp.attributes.is_empty() {
            self.histogram_attrs.push_all(id, &dp.attributes);
        }
        for exemplar in &dp.exemplars {
            self.histogram_exemplars.push(id, exemplar);
        }
        Ok(())
    }

    fn push_exp_histogram(&mut self, metric_id: u32, dp: &crate::otlp::ExponentialHistogramDataPoint) {
        let id = self.exp_histogram.next_id;
        self.exp_histogram.next_id = self.exp_histogram.next_id.wrapping_add(1);
        self.exp_histogram.ids.push(id);
        self.exp_histogram.parent_ids.push(metric_id);
        self.exp_histogram.start_ns.push(Some(dp.start_ns));
        self.exp_histogram.time_ns.push(dp.time_ns);
        self.exp_histogram.count.push(dp.count);
        self.exp_histogram.sum.push(dp.sum);
        self.exp_histogram.min.push(dp.min);
        self.exp_histogram.max.push(dp.max);
        self.exp_histogram.scale.push(dp.scale);
        self.exp_histogram.zero_count.push(dp.zero_count);
        self.exp_histogram.positive_offset.push(dp.positive.offset);
        self.exp_histogram
            .positive_counts
            .push(dp.positive.bucket_counts.clone());
        self.exp_histogram.negative_offset.push(dp.negative.offset);
        self.exp_histogram
            .negative_counts
            .push(dp.negative.bucket_counts.clone());
        self.exp_histogram.flags.push(dp.flags);
        if !dp.attributes.is_empty() {
            self.exp_histogram_attrs.push_all(id, &dp.attributes);
        }
        for exemplar in &dp.exemplars {
            self.exp_histogram_exemplars.push(id, exemplar);
        }
    }

    fn build_metrics_record(&mut self) -> Result<Option<RecordBatch>> {
        if self.rows.ids.is_empty() {
            return Ok(None);
        }
        for col in [
            &mut self.names,
            &mut self.descriptions,
            &mut self.units,
            &mut self.scope_names,
            &mut self.scope_versions,
        ] {
            if let Some(event) = col.propose_update() {
                self.stats.record_schema_update(&event);
                col.apply_update(&event);
            }
        }
        let mut fields = schema::metrics_fixed_fields();
        fields.push(self.names.field());
        fields.push(self.descriptions.field());
        fields.push(self.units.field());
        fields.push(self.scope_names.field());
        fields.push(self.scope_versions.field());
        let schema = Arc::new(Schema::new(fields));
        Ok(Some(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt16Array::from(self.rows.ids.clone())),
                Arc::new(UInt8Array::from(self.rows.metric_type.clone())),
                Arc::new(UInt16Array::from(self.rows.resource_attrs_id.clone())),
                Arc::new(StringArray::from_iter(
                    self.rows.resource_schema_url.iter().map(|o| o.as_deref()),
                )),
                Arc::new(UInt32Array::from(self.rows.resource_dropped_attrs.clone())),
                Arc::new(UInt16Array::from(self.rows.scope_attrs_id.clone())),
                Arc::new(UInt32Array::from(self.rows.scope_dropped_attrs.clone())),
                Arc::new(StringArray::from_iter(
                    self.rows.scope_schema_url.iter().map(|o| o.as_deref()),
                )),
                self.names.build_array(),
                self.descriptions.build_array(),
                self.units.build_array(),
                self.scope_names.build_array(),
                self.scope_versions.build_array(),
            ],
        )?))
    }

    fn build_summary(&self) -> Result<RecordBatch> {
        let mut fields = vec![Field::new("id", arrow::datatypes::DataType::UInt32, false)];
        fields.extend(schema::summary_fixed_fields());
        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt32Array::from(self.summary.ids.clone())),
                Arc::new(UInt32Array::from(self.summary.parent_ids.clone())),
                Arc::new(TimestampNanosecondArray::from(self.summary.start_ns.clone())),
                Arc::new(TimestampNanosecondArray::from(self.summary.time_ns.clone())),
                Arc::new(UInt64Array::from(self.summary.count.clone())),
                Arc::new(Float64Array::from(self.summary.sum.clone())),
                Arc::new(list_f64(self.summary.values.clone())),
                Arc::new(list_f64(self.summary.quantiles.clone())),
                Arc::new(UInt32Array::from(self.summary.flags.clone())),
            ],
        )?)
    }

    fn build_histogram(&self) -> Result<RecordBatch> {
        let mut fields = vec![Field::new("id", arrow::datatypes::DataType::UInt32, false)];
        fields.extend(schema::histogram_fixed_fields());
        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt32Array::from(self.histogram.ids.clone())),
                Arc::new(UInt32Array::from(self.histogram.parent_ids.clone())),
                Arc::new(TimestampNanosecondArray::from(self.histogram.start_ns.clone())),
                Arc::new(TimestampNanosecondArray::from(self.histogram.time_ns.clone())),
                Arc::new(UInt64Array::from(self.histogram.count.clone())),
                Arc::new(Float64Array::from(self.histogram.sum.clone())),
                Arc::new(Float64Array::from(self.histogram.min.clone())),
                Arc::new(Float64Array::from(self.histogram.max.clone())),
                Arc::new(list_u64(self.histogram.bucket_counts.clone())),
                Arc::new(list_f64(self.histogram.explicit_bounds.clone())),
                Arc::new(UInt32Array::from(self.histogram.flags.clone())),
            ],
        )?)
    }

    fn build_exp_histogram(&self) -> Result<RecordBatch> {
        let mut fields = vec![Field::new("id", arrow::datatypes::DataType::UInt32, false)];
        fields.extend(schema::exp_histogram_fixed_fields());
        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt32Array::from(self.exp_histogram.ids.clone())),
                Arc::new(UInt32Array::from(self.exp_histogram.parent_ids.clone())),
                Arc::new(TimestampNanosecondArray::from(self.exp_histogram.start_ns.clone())),
                Arc::new(TimestampNanosecondArray::from(self.exp_histogram.time_ns.clone())),
                Arc::new(UInt64Array::from(self.exp_histogram.count.clone())),
                Arc::new(Float64Array::from(self.exp_histogram.sum.clone())),
                Arc::new(Float64Array::from(self.exp_histogram.min.clone())),
                Arc::new(Float64Array::from(self.exp_histogram.max.clone())),
                Arc::new(Int32Array::from(self.exp_histogram.scale.clone())),
                Arc::new(UInt64Array::from(self.exp_histogram.zero_count.clone())),
                Arc::new(Int32Array::from(self.exp_histogram.positive_offset.clone())),
                Arc::new(list_u64(self.exp_histogram.positive_counts.clone())),
                Arc::new(Int32Array::from(self.exp_histogram.negative_offset.clone())),
                Arc::new(list_u64(self.exp_histogram.negative_counts.clone())),
                Arc::new(UInt32Array::from(self.exp_histogram.flags.clone())),
            ],
        )?)
    }
}

impl EntityBuilder for MetricsBuilder {
    type Entity = Metrics;

    fn with_stats(mut self, stats: Rc<Stats>) -> Self {
        self.resource_attrs = self.resource_attrs.with_stats(Rc::clone(&stats));
        self.scope_attrs = self.scope_attrs.with_stats(Rc::clone(&stats));
        self.int_gauge = self.int_gauge.with_stats(Rc::clone(&stats));
        self.double_gauge = self.double_gauge.with_stats(Rc::clone(&stats));
        self.int_sum = self.int_sum.with_stats(Rc::clone(&stats));
        self.double_sum = self.double_sum.with_stats(Rc::clone(&stats));
        self.summary_attrs = self.summary_attrs.with_stats(Rc::clone(&stats));
        self.histogram_attrs = self.histogram_attrs.with_stats(Rc::clone(&stats));
        self.exp_histogram_attrs = self.exp_histogram_attrs.with_stats(Rc::clone(&stats));
        self.stats = stats;
        self
    }

    fn append(&mut self, metrics: &Metrics) -> Result<()> {
        for resource_metrics in metrics {
            let resource_attrs_id = if resource_metrics.resource.attributes.is_empty() {
                None
            } else {
                let rid = optimizer::resource_id(
                    &resource_metrics.resource,
                    &resource_metrics.schema_url,
                );
                Some(*self.resource_attrs_cache.entry(rid).or_insert_with(|| {
                    let id = self.next_resource_attrs_id;
                    self.next_resource_attrs_id = self.next_resource_attrs_id.wrapping_add(1);
                    self.resource_attrs
                        .push_all(id as u32, &resource_metrics.resource.attributes);
                    id
                }))
            };
            let resource_schema_url = non_empty(&resource_metrics.schema_url);
            let resource_dropped_attributes_count =
                resource_metrics.resource.dropped_attributes_count;
            for scope_metrics in &resource_metrics.scope_metrics {
                let scope_attrs_id = if scope_metrics.scope.attributes.is_empty() {
                    None
                } else {
                    let sid = optimizer::scope_id(&scope_metrics.scope);
                    Some(*self.scope_attrs_cache.entry(sid).or_insert_with(|| {
                        let id = self.next_scope_attrs_id;
                        self.next_scope_attrs_id = self.next_scope_attrs_id.wrapping_add(1);
                        self.scope_attrs
                            .push_all(id as u32, &scope_metrics.scope.attributes);
                        id
                    }))
                };
                let ctx = ResourceScopeContext {
                    resource_attrs_id,
                    resource_schema_url,
                    resource_dropped_attributes_count,
                    scope_attrs_id,
                    scope_name: non_empty(&scope_metrics.scope.name),
                    scope_version: non_empty(&scope_metrics.scope.version),
                    scope_dropped_attributes_count: scope_metrics.scope.dropped_attributes_count,
                    scope_schema_url: non_empty(&scope_metrics.schema_url),
                };
                for metric in &scope_metrics.metrics {
                    self.push_metric(metric, &ctx)?;
                }
            }
        }
        Ok(())
    }

    fn build(&mut self) -> Result<Vec<(PayloadType, RecordBatch)>> {
        let mut out = Vec::new();
        if let Some(batch) = self.build_metrics_record()? {
            out.push((PayloadType::Metrics, batch));
        }
        if let Some(batch) = self.resource_attrs.build()? {
            out.push((PayloadType::ResourceAttrs, batch));
        }
        if let Some(batch) = self.scope_attrs.build()? {
            out.push((PayloadType::ScopeAttrs, batch));
        }
        out.extend(self.int_gauge.build(false)?);
        out.extend(self.double_gauge.build(false)?);
        out.extend(self.int_sum.build(true)?);
        out.extend(self.double_sum.build(true)?);
        if !self.summary.ids.is_empty() {
            out.push((PayloadType::Summaries, self.build_summary()?));
            if let Some(batch) = self.summary_attrs.build()? {
                out.push((PayloadType::SummaryAttrs, batch));
            }
        }
        if !self.histogram.ids.is_empty() {
            out.push((PayloadType::Histograms, self.build_histogram()?));
            if let Some(batch) = self.histogram_attrs.build()? {
                out.push((PayloadType::HistogramAttrs, batch));
            }
            if !self.histogram_exemplars.is_empty() {
                out.push((PayloadType::HistogramExemplars, self.histogram_exemplars.build()?));
            }
        }
        if !self.exp_histogram.ids.is_empty() {
            out.push((PayloadType::ExpHistograms, self.build_exp_histogram()?));
            if let Some(batch) = self.exp_histogram_attrs.build()? {
                out.push((PayloadType::ExpHistogramAttrs, batch));
            }
            if !self.exp_histogram_exemplars.is_empty() {
                out.push((
                    PayloadType::ExpHistogramExemplars,
                    self.exp_histogram_exemplars.build()?,
                ));
            }
        }
        Ok(out)
    }

    fn reset(&mut self) {
        let stats = Rc::clone(&self.stats);
        *self = MetricsBuilder::with_dictionary_config(self.dict_config).with_stats(stats);
    }

    fn is_empty(&self) -> bool {
        self.rows.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anyvalue::AnyValue;
    use crate::otlp::*;

    fn metric_with(data: MetricData) -> Metric {
        Metric {
            name: "m".into(),
            description: String::new(),
            unit: String::new(),
            data,
        }
    }

    fn single_metric(data: MetricData) -> Metrics {
        vec![ResourceMetrics {
            resource: Resource::default(),
            schema_url: String::new(),
            scope_metrics: vec![ScopeMetrics {
                scope: Scope::default(),
                schema_url: String::new(),
                metrics: vec![metric_with(data)],
            }],
        }]
    }

    #[test]
    fn int_gauge_round_trips_through_builder() {
        let mut builder = MetricsBuilder::default();
        let dp = GaugeDataPoint {
            start_ns: 1,
            time_ns: 2,
            value: AnyValue::Int(42),
            flags: 0,
            attributes: vec![("k".into(), AnyValue::Str("v".into()))],
            exemplars: vec![],
        };
        builder
            .append(&single_metric(MetricData::IntGauge(vec![dp])))
            .unwrap();
        let records = builder.build().unwrap();
        assert!(records.iter().any(|(pt, b)| *pt == PayloadType::Metrics && b.num_rows() == 1));
        assert!(records.iter().any(|(pt, b)| *pt == PayloadType::IntGauge && b.num_rows() == 1));
        assert!(records.iter().any(|(pt, _)| *pt == PayloadType::IntGaugeAttrs));
    }

    #[test]
    fn histogram_bucket_mismatch_is_rejected() {
        let mut builder = MetricsBuilder::default();
        let dp = HistogramDataPoint {
            start_ns: 0,
            time_ns: 1,
            count: 1,
            sum: Some(1.0),
            min: None,
            max: None,
            bucket_counts: vec![1, 2, 3],
            explicit_bounds: vec![1.0],
            flags: 0,
            attributes: vec![],
            exemplars: vec![],
        };
        let err = builder
            .append(&single_metric(MetricData::Histogram(vec![dp])))
            .unwrap_err();
        assert!(matches!(err, Error::HistogramBucketMismatch { .. }));
    }

    #[test]
    fn reset_clears_variant_state() {
        let mut builder = MetricsBuilder::default();
        let dp = GaugeDataPoint {
            value: AnyValue::Double(1.0),
            ..Default::default()
        };
        builder
            .append(&single_metric(MetricData::DoubleGauge(vec![dp])))
            .unwrap();
        assert!(!builder.is_empty());
        builder.reset();
        assert!(builder.is_empty());
        assert!(builder.double_gauge.is_empty());
    }
}
