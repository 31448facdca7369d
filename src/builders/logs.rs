// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Log builder: main log record + resource/scope/log attribute accumulators.

use super::EntityBuilder;
use crate::adaptive::AdaptiveStringColumn;
use crate::anyvalue;
use crate::attributes::{AttributeAccumulator, ParentIdEncoding, ParentIdWidth, SortOrder};
use crate::dictionary::DictionaryConfig;
use crate::error::{Error, Result};
use crate::optimizer;
use crate::otlp::{LogRecord, Logs};
use crate::schema::{self, PayloadType};
use crate::stats::Stats;
use arrow::array::{
    BinaryArray, BooleanArray, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampNanosecondArray, UInt16Array, UInt32Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Resource/scope identity broadcast across every log record in one
/// resource-scope group, alongside its attrs-id dedup keys.
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

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

#[derive(Default)]
struct LogRows {
    ids: Vec<u16>,
    time_ns: Vec<i64>,
    observed_time_ns: Vec<i64>,
    trace_ids: Vec<[u8; 16]>,
    span_ids: Vec<[u8; 8]>,
    severity_number: Vec<Option<i32>>,
    flags: Vec<u32>,
    dropped_attrs: Vec<u32>,
    resource_attrs_id: Vec<Option<u16>>,
    resource_schema_url: Vec<Option<String>>,
    resource_dropped_attrs: Vec<u32>,
    scope_attrs_id: Vec<Option<u16>>,
    scope_dropped_attrs: Vec<u32>,
    scope_schema_url: Vec<Option<String>>,
    body_type: Vec<Option<u8>>,
    body_str: Vec<Option<String>>,
    body_int: Vec<Option<i64>>,
    body_double: Vec<Option<f64>>,
    body_bool: Vec<Option<bool>>,
    body_bytes: Vec<Option<Vec<u8>>>,
    body_ser: Vec<Option<Vec<u8>>>,
}

/// Builds the LOGS main record plus RESOURCE_ATTRS/SCOPE_ATTRS/LOG_ATTRS.
pub struct LogsBuilder {
    dict_config: DictionaryConfig,
    stats: Rc<Stats>,
    rows: LogRows,
    severity_texts: AdaptiveStringColumn,
    scope_names: AdaptiveStringColumn,
    scope_versions: AdaptiveStringColumn,
    resource_attrs: AttributeAccumulator,
    scope_attrs: AttributeAccumulator,
    log_attrs: AttributeAccumulator,
    next_log_id: u16,
    next_resource_attrs_id: u16,
    next_scope_attrs_id: u16,
    resource_attrs_cache: HashMap<String, u16>,
    scope_attrs_cache: HashMap<String, u16>,
}

impl Default for LogsBuilder {
    fn default() -> Self {
        Self::with_dictionary_config(DictionaryConfig::default_str())
    }
}

impl LogsBuilder {
    /// Builds with a non-default dictionary index-width policy for its
    /// string columns.
    #[must_use]
    pub fn with_dictionary_config(dict_config: DictionaryConfig) -> Self {
        let stats = Rc::new(Stats::default());
        Self {
            dict_config,
            stats: Rc::clone(&stats),
            rows: LogRows::default(),
            severity_texts: AdaptiveStringColumn::new("severity_text", dict_config),
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
            log_attrs: AttributeAccumulator::new(
                ParentIdWidth::U32,
                ParentIdEncoding::DeltaGroup,
                SortOrder::TypeKeyValueParent,
            )
            .with_stats(Rc::clone(&stats)),
            next_log_id: 0,
            next_resource_attrs_id: 0,
            next_scope_attrs_id: 0,
            resource_attrs_cache: HashMap::new(),
            scope_attrs_cache: HashMap::new(),
        }
    }
}

impl LogsBuilder {
    fn push_log(&mut self, log: &LogRecord, ctx: &ResourceScopeContext<'_>) -> Result<()> {
        let id = self.next_log_id;
        self.next_log_id = self.next_log_id.wrapping_add(1);

        self.rows.ids.push(id);
        self.rows.time_ns.push(log.time_ns);
        self.rows.observed_time_ns.push(log.observed_time_ns);
        self.rows.trace_ids.push(*log.trace_id.as_bytes());
        self.rows.span_ids.push(*log.span_id.as_bytes());
        self.rows.severity_number.push(Some(log.severity_number));
        self.severity_texts.append(if log.severity_text.is_empty() {
            None
        } else {
            Some(&log.severity_text)
        });
        self.rows.flags.push(log.flags);
        self.rows.dropped_attrs.push(log.dropped_attributes_count);
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
        self.rows.scope_schema_url.push(ctx.scope_schema_url.map(str::to_owned));
        self.scope_names.append(ctx.scope_name);
        self.scope_versions.append(ctx.scope_version);

        let body = anyvalue::encode(&log.body)?;
        self.rows.body_type.push(body.type_code.map(|c| c as u8));
        self.rows.body_str.push(body.str_value);
        self.rows.body_int.push(body.int_value);
        self.rows.body_double.push(body.double_value);
        self.rows.body_bool.push(body.bool_value);
        self.rows.body_bytes.push(body.bytes_value);
        self.rows.body_ser.push(body.cbor_value);

        if !log.attributes.is_empty() {
            self.log_attrs.push_all(id as u32, &log.attributes);
        }
        Ok(())
    }

    fn build_logs_record(&mut self) -> Result<Option<RecordBatch>> {
        if self.rows.ids.is_empty() {
            return Ok(None);
        }
        for col in [&mut self.severity_texts, &mut self.scope_names, &mut self.scope_versions] {
            if let Some(event) = col.propose_update() {
                self.stats.record_schema_update(&event);
                col.apply_update(&event);
            }
        }
        let mut fields = schema::logs_fixed_fields();
        fields.push(self.severity_texts.field());
        fields.push(self.scope_names.field());
        fields.push(self.scope_versions.field());
        fields.push(Field::new("body_type", DataType::UInt8, true));
        fields.push(Field::new("body_str", DataType::Utf8, true));
        fields.push(Field::new("body_int", DataType::Int64, true));
        fields.push(Field::new("body_double", DataType::Float64, true));
        fields.push(Field::new("body_bool", DataType::Boolean, true));
        fields.push(Field::new("body_bytes", DataType::Binary, true));
        fields.push(Field::new("body_ser", DataType::Binary, true));
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt16Array::from(self.rows.ids.clone())),
                Arc::new(TimestampNanosecondArray::from(self.rows.time_ns.clone())),
                Arc::new(TimestampNanosecondArray::from(self.rows.observed_time_ns.clone())),
                Arc::new(
                    arrow::array::FixedSizeBinaryArray::try_from_iter(self.rows.trace_ids.iter())
                        .map_err(Error::from)?,
                ),
                Arc::new(
                    arrow::array::FixedSizeBinaryArray::try_from_iter(self.rows.span_ids.iter())
                        .map_err(Error::from)?,
                ),
                Arc::new(Int32Array::from(self.rows.severity_number.clone())),
                Arc::new(UInt32Array::from(self.rows.flags.clone())),
                Arc::new(UInt32Array::from(self.rows.dropped_attrs.clone())),
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
                self.severity_texts.build_array(),
                self.scope_names.build_array(),
                self.scope_versions.build_array(),
                Arc::new(UInt8Array::from(self.rows.body_type.clone())),
                Arc::new(StringArray::from_iter(
                    self.rows.body_str.iter().map(|o| o.as_deref()),
                )),
                Arc::new(Int64Array::from(self.rows.body_int.clone())),
                Arc::new(Float64Array::from(self.rows.body_double.clone())),
                Arc::new(BooleanArray::from(self.rows.body_bool.clone())),
                Arc::new(BinaryArray::from_iter(
                    self.rows.body_bytes.iter().map(|o| o.as_deref()),
                )),
                Arc::new(BinaryArray::from_iter(
                    self.rows.body_ser.iter().map(|o| o.as_deref()),
                )),
            ],
        )?;
        Ok(Some(batch))
    }
}

impl EntityBuilder for LogsBuilder {
    type Entity = Logs;

    fn with_stats(mut self, stats: Rc<Stats>) -> Self {
        self.resource_attrs = self.resource_attrs.with_stats(Rc::clone(&stats));
        self.scope_attrs = self.scope_attrs.with_stats(Rc::clone(&stats));
        self.log_attrs = self.log_attrs.with_stats(Rc::clone(&stats));
        self.stats = stats;
        self
    }

    fn append(&mut self, logs: &Logs) -> Result<()> {
        for resource_logs in logs {
            let resource_attrs_id = if resource_logs.resource.attributes.is_empty() {
                None
            } else {
                let rid = optimizer::resource_id(&resource_logs.resource, &resource_logs.schema_url);
                Some(*self.resource_attrs_cache.entry(rid).or_insert_with(|| {
                    let id = self.next_resource_attrs_id;
                    self.next_resource_attrs_id = self.next_resource_attrs_id.wrapping_add(1);
                    self.resource_attrs
                        .push_all(id as u32, &resource_logs.resource.attributes);
                    id
                }))
            };
            let resource_schema_url = non_empty(&resource_logs.schema_url);
            let resource_dropped_attributes_count = resource_logs.resource.dropped_attributes_count;
            for scope_logs in &resource_logs.scope_logs {
                let scope_attrs_id = if scope_logs.scope.attributes.is_empty() {
                    None
                } else {
                    let sid = optimizer::scope_id(&scope_logs.scope);
                    Some(*self.scope_attrs_cache.entry(sid).or_insert_with(|| {
                        let id = self.next_scope_attrs_id;
                        self.next_scope_attrs_id = self.next_scope_attrs_id.wrapping_add(1);
                        self.scope_attrs
                            .push_all(id as u32, &scope_logs.scope.attributes);
                        id
                    }))
                };
                let ctx = ResourceScopeContext {
                    resource_attrs_id,
                    resource_schema_url,
                    resource_dropped_attributes_count,
                    scope_attrs_id,
                    scope_name: non_empty(&scope_logs.scope.name),
                    scope_version: non_empty(&scope_logs.scope.version),
                    scope_dropped_attributes_count: scope_logs.scope.dropped_attributes_count,
                    scope_schema_url: non_empty(&scope_logs.schema_url),
                };
                for log in &scope_logs.log_records {
                    self.push_log(log, &ctx)?;
                }
            }
        }
        Ok(())
    }

    fn build(&mut self) -> Result<Vec<(PayloadType, RecordBatch)>> {
        let mut out = Vec::new();
        if let Some(batch) = self.build_logs_record()? {
            out.push((PayloadType::Logs, batch));
        }
        if let Some(batch) = self.resource_attrs.build()? {
            out.push((PayloadType::ResourceAttrs, batch));
        }
        if let Some(batch) = self.scope_attrs.build()? {
            out.push((PayloadType::ScopeAttrs, batch));
        }
        if let Some(batch) = self.log_attrs.build()? {
            out.push((PayloadType::LogAttrs, batch));
        }
        Ok(out)
    }

    fn reset(&mut self) {
        let stats = Rc::clone(&self.stats);
        *self = LogsBuilder::with_dictionary_config(self.dict_config).with_stats(stats);
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

    #[test]
    fn appends_log_and_attaches_resource_attrs() {
        let mut builder = LogsBuilder::default();
        let log = LogRecord {
            time_ns: 100,
            observed_time_ns: 101,
            severity_number: 9,
            attributes: vec![("k".into(), AnyValue::Str("v".into()))],
            ..Default::default()
        };
        let mut resource = Resource::default();
        resource
            .attributes
            .push(("service.name".into(), AnyValue::Str("svc".into())));
        let logs: Logs = vec![ResourceLogs {
            resource,
            schema_url: String::new(),
            scope_logs: vec![ScopeLogs {
                scope: Scope::default(),
                schema_url: String::new(),
                log_records: vec![log],
            }],
        }];
        builder.append(&logs).unwrap();
        let records = builder.build().unwrap();
        assert!(records.iter().any(|(pt, b)| *pt == PayloadType::Logs && b.num_rows() == 1));
        assert!(records.iter().any(|(pt, _)| *pt == PayloadType::ResourceAttrs));
        assert!(records.iter().any(|(pt, _)| *pt == PayloadType::LogAttrs));
        assert!(!records.iter().any(|(pt, _)| *pt == PayloadType::ScopeAttrs));
    }

    #[test]
    fn reset_clears_all_state() {
        let mut builder = LogsBuilder::default();
        assert!(builder.is_empty());
        let ctx = ResourceScopeContext {
            resource_attrs_id: None,
            resource_schema_url: None,
            resource_dropped_attributes_count: 0,
            scope_attrs_id: None,
            scope_name: None,
            scope_version: None,
            scope_dropped_attributes_count: 0,
            scope_schema_url: None,
        };
        builder.push_log(&LogRecord::default(), &ctx).unwrap();
        assert!(!builder.is_empty());
        builder.reset();
        assert!(builder.is_empty());
    }
}
