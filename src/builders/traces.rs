// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Trace builder: main span record + span events/links + resource/scope/
//! span/event/link attribute accumulators.

use super::EntityBuilder;
use crate::adaptive::AdaptiveStringColumn;
use crate::attributes::{AttributeAccumulator, ParentIdEncoding, ParentIdWidth, SortOrder};
use crate::dictionary::DictionaryConfig;
use crate::error::{Error, Result};
use crate::optimizer;
use crate::otlp::{Span, SpanEvent, SpanKind, SpanLink, StatusCode, Traces};
use crate::schema::{self, PayloadType};
use crate::stats::Stats;
use arrow::array::{
    FixedSizeBinaryArray, Int32Array, RecordBatch, StringArray, TimestampNanosecondArray,
    UInt16Array, UInt32Array,
};
use arrow::datatypes::Schema;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Resource/scope identity carried alongside a resource-scope group's attrs
/// ids: everything `EntityBuilder::append` knows about the enclosing
/// `ResourceSpans`/`ScopeSpans` that isn't already captured by the attrs-id
/// dedup cache, broadcast across every span the group contains.
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

fn kind_code(kind: SpanKind) -> i32 {
    match kind {
        SpanKind::Unspecified => 0,
        SpanKind::Internal => 1,
        SpanKind::Server => 2,
        SpanKind::Client => 3,
        SpanKind::Producer => 4,
        SpanKind::Consumer => 5,
    }
}

fn status_code(code: StatusCode) -> i32 {
    match code {
        StatusCode::Unset => 0,
        StatusCode::Ok => 1,
        StatusCode::Error => 2,
    }
}

#[derive(Default)]
struct SpanRows {
    ids: Vec<u16>,
    trace_ids: Vec<[u8; 16]>,
    span_ids: Vec<[u8; 8]>,
    parent_span_ids: Vec<[u8; 8]>,
    start_ns: Vec<i64>,
    duration_ns: Vec<i64>,
    kind: Vec<i32>,
    status_code: Vec<Option<i32>>,
    status_message: Vec<Option<String>>,
    dropped_attrs: Vec<u32>,
    dropped_events: Vec<u32>,
    dropped_links: Vec<u32>,
    resource_attrs_id: Vec<Option<u16>>,
    resource_schema_url: Vec<Option<String>>,
    resource_dropped_attrs: Vec<u32>,
    scope_attrs_id: Vec<Option<u16>>,
    scope_dropped_attrs: Vec<u32>,
    scope_schema_url: Vec<Option<String>>,
}

#[derive(Default)]
struct EventRows {
    ids: Vec<u16>,
    parent_ids: Vec<u32>,
    time_ns: Vec<i64>,
    dropped_attrs: Vec<u32>,
}

#[derive(Default)]
struct LinkRows {
    ids: Vec<u16>,
    parent_ids: Vec<u32>,
    trace_ids: Vec<[u8; 16]>,
    span_ids: Vec<[u8; 8]>,
    trace_state: Vec<Option<String>>,
    dropped_attrs: Vec<u32>,
}

/// Builds the SPANS main record, the SPAN_EVENTS/SPAN_LINKS child records,
/// and the RESOURCE_ATTRS/SCOPE_ATTRS/SPAN_ATTRS/SPAN_EVENT_ATTRS/
/// SPAN_LINK_ATTRS attribute records for one batch.
pub struct TracesBuilder {
    dict_config: DictionaryConfig,
    stats: Rc<Stats>,
    span_rows: SpanRows,
    span_names: AdaptiveStringColumn,
    scope_names: AdaptiveStringColumn,
    scope_versions: AdaptiveStringColumn,
    event_rows: EventRows,
    event_names: AdaptiveStringColumn,
    link_rows: LinkRows,
    resource_attrs: AttributeAccumulator,
    scope_attrs: AttributeAccumulator,
    span_attrs: AttributeAccumulator,
    event_attrs: AttributeAccumulator,
    link_attrs: AttributeAccumulator,
    next_span_id: u16,
    next_event_id: u16,
    next_link_id: u16,
    next_resource_attrs_id: u16,
    next_scope_attrs_id: u16,
    resource_attrs_cache: HashMap<String, u16>,
    scope_attrs_cache: HashMap<String, u16>,
}

impl Default for TracesBuilder {
    fn default() -> Self {
        Self::with_dictionary_config(DictionaryConfig::default_str())
    }
}

impl TracesBuilder {
    /// Builds with a non-default dictionary index-width policy for its
    /// string columns.
    #[must_use]
    pub fn with_dictionary_config(dict_config: DictionaryConfig) -> Self {
        let stats = Rc::new(Stats::default());
        Self {
            dict_config,
            stats: Rc::clone(&stats),
            span_rows: SpanRows::default(),
            span_names: AdaptiveStringColumn::new("name", dict_config),
            scope_names: AdaptiveStringColumn::new("scope_name", dict_config),
            scope_versions: AdaptiveStringColumn::new("scope_version", dict_config),
            event_rows: EventRows::default(),
            event_names: AdaptiveStringColumn::new("name", dict_config),
            link_rows: LinkRows::default(),
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
            span_attrs: AttributeAccumulator::new(
                ParentIdWidth::U32,
                ParentIdEncoding::DeltaGroup,
                SortOrder::TypeKeyValueParent,
            )
            .with_stats(Rc::clone(&stats)),
            event_attrs: AttributeAccumulator::new(
                ParentIdWidth::U32,
                ParentIdEncoding::DeltaGroup,
                SortOrder::TypeKeyValueParent,
            )
            .with_stats(Rc::clone(&stats)),
            link_attrs: AttributeAccumulator::new(
                ParentIdWidth::U32,
                ParentIdEncoding::DeltaGroup,
                SortOrder::TypeKeyValueParent,
            )
            .with_stats(Rc::clone(&stats)),
            next_span_id: 0,
            next_event_id: 0,
            next_link_id: 0,
            next_resource_attrs_id: 0,
            next_scope_attrs_id: 0,
            resource_attrs_cache: HashMap::new(),
            scope_attrs_cache: HashMap::new(),
        }
    }
}

impl TracesBuilder {
    fn push_span(&mut self, span: &Span, ctx: &ResourceScopeContext<'_>) -> Result<()> {
        if span.duration_ns < 0 {
            return Err(Error::NegativeSpanDuration {
                start_ns: span.start_ns,
                duration_ns: span.duration_ns,
            });
        }
        let id = self.next_span_id;
        self.next_span_id = self.next_span_id.wrapping_add(1);

        self.span_rows.ids.push(id);
        self.span_rows.trace_ids.push(*span.trace_id.as_bytes());
        self.span_rows.span_ids.push(*span.span_id.as_bytes());
        self.span_rows
            .parent_span_ids
            .push(*span.parent_span_id.as_bytes());
        self.span_names.append(Some(&span.name));
        self.span_rows.start_ns.push(span.start_ns);
        self.span_rows.duration_ns.push(span.duration_ns);
        self.span_rows.kind.push(kind_code(span.kind));
        self.span_rows.status_code.push(Some(status_code(span.status.code)));
        self.span_rows.status_message.push(if span.status.message.is_empty() {
            None
        } else {
            Some(span.status.message.clone())
        });
        self.span_rows.dropped_attrs.push(span.dropped_attributes_count);
        self.span_rows.dropped_events.push(span.dropped_events_count);
        self.span_rows.dropped_links.push(span.dropped_links_count);
        self.span_rows.resource_attrs_id.push(ctx.resource_attrs_id);
        self.span_rows
            .resource_schema_url
            .push(ctx.resource_schema_url.map(str::to_owned));
        self.span_rows
            .resource_dropped_attrs
            .push(ctx.resource_dropped_attributes_count);
        self.span_rows.scope_attrs_id.push(ctx.scope_attrs_id);
        self.span_rows
            .scope_dropped_attrs
            .push(ctx.scope_dropped_attributes_count);
        self.span_rows
            .scope_schema_url
            .push(ctx.scope_schema_url.map(str::to_owned));
        self.scope_names.append(ctx.scope_name);
        self.scope_versions.append(ctx.scope_version);

        if !span.attributes.is_empty() {
            self.span_attrs.push_all(id as u32, &span.attributes);
        }

        for event in &span.events {
            self.push_event(event, id as u32);
        }
        for link in &span.links {
            self.push_link(link, id as u32);
        }
        Ok(())
    }

    fn push_event(&mut self, event: &SpanEvent, parent_id: u32) {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.event_rows.ids.push(id);
        self.event_rows.parent_ids.push(parent_id);
        self.event_names.append(Some(&event.name));
        self.event_rows.time_ns.push(event.time_ns);
        self.event_rows.dropped_attrs.push(event.dropped_attributes_count);
        if !event.attributes.is_empty() {
            self.event_attrs.push_all(id as u32, &event.attributes);
        }
    }

    fn push_link(&mut self, link: &SpanLink, parent_id: u32) {
        let id = self.next_link_id;
        self.next_link_id = self.next_link_id.wrapping_add(1);
        self.link_rows.ids.push(id);
        self.link_rows.parent_ids.push(parent_id);
        self.link_rows.trace_ids.push(*link.trace_id.as_bytes());
        self.link_rows.span_ids.push(*link.span_id.as_bytes());
        self.link_rows.trace_state.push(if link.trace_state.is_empty() {
            None
        } else {
            Some(link.trace_state.clone())
        });
        self.link_rows.dropped_attrs.push(link.dropped_attributes_count);
        if !link.attributes.is_empty() {
            self.link_attrs.push_all(id as u32, &link.attributes);
        }
    }

    fn build_spans_record(&mut self) -> Result<Option<RecordBatch>> {
        if self.span_rows.ids.is_empty() {
            return Ok(None);
        }
        for col in [&mut self.span_names, &mut self.scope_names, &mut self.scope_versions] {
            if let Some(event) = col.propose_update() {
                self.stats.record_schema_update(&event);
                col.apply_update(&event);
            }
        }
        let mut fields = schema::spans_fixed_fields();
        fields.push(self.span_names.field());
        fields.push(self.scope_names.field());
        fields.push(self.scope_versions.field());
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt16Array::from(self.span_rows.ids.clone())),
                Arc::new(
                    FixedSizeBinaryArray::try_from_iter(self.span_rows.trace_ids.iter())
                        .map_err(Error::from)?,
                ),
                Arc::new(
                    FixedSizeBinaryArray::try_from_iter(self.span_rows.span_ids.iter())
                        .map_err(Error::from)?,
                ),
                Arc::new(
                    FixedSizeBinaryArray::try_from_iter(self.span_rows.parent_span_ids.iter())
                        .map_err(Error::from)?,
                ),
                Arc::new(TimestampNanosecondArray::from(self.span_rows.start_ns.clone())),
                Arc::new(arrow::array::Int64Array::from(self.span_rows.duration_ns.clone())),
                Arc::new(Int32Array::from(self.span_rows.kind.clone())),
                Arc::new(Int32Array::from(self.span_rows.status_code.clone())),
                Arc::new(StringArray::from_iter(
                    self.span_rows.status_message.iter().map(|o| o.as_deref()),
                )),
                Arc::new(UInt32Array::from(self.span_rows.dropped_attrs.clone())),
                Arc::new(UInt32Array::from(self.span_rows.dropped_events.clone())),
                Arc::new(UInt32Array::from(self.span_rows.dropped_links.clone())),
                Arc::new(UInt16Array::from(self.span_rows.resource_attrs_id.clone())),
                Arc::new(StringArray::from_iter(
                    self.span_rows.resource_schema_url.iter().map(|o| o.as_deref()),
                )),
                Arc::new(UInt32Array::from(self.span_rows.resource_dropped_attrs.clone())),
                Arc::new(UInt16Array::from(self.span_rows.scope_attrs_id.clone())),
                Arc::new(UInt32Array::from(self.span_rows.scope_dropped_attrs.clone())),
                Arc::new(StringArray::from_iter(
                    self.span_rows.scope_schema_url.iter().map(|o| o.as_deref()),
                )),
                self.span_names.build_array(),
                self.scope_names.build_array(),
                self.scope_versions.build_array(),
            ],
        )?;
        Ok(Some(batch))
    }

    fn build_events_record(&mut self) -> Result<Option<RecordBatch>> {
        if self.event_rows.ids.is_empty() {
            return Ok(None);
        }
        if let Some(event) = self.event_names.propose_update() {
            self.stats.record_schema_update(&event);
            self.event_names.apply_update(&event);
        }
        let mut fields = schema::span_events_fixed_fields();
        fields.push(self.event_names.field());
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt16Array::from(self.event_rows.ids.clone())),
                Arc::new(UInt32Array::from(self.event_rows.parent_ids.clone())),
                Arc::new(TimestampNanosecondArray::from(self.event_rows.time_ns.clone())),
                Arc::new(UInt32Array::from(self.event_rows.dropped_attrs.clone())),
                self.event_names.build_array(),
            ],
        )?;
        Ok(Some(batch))
    }

    fn build_links_record(&self) -> Result<Option<RecordBatch>> {
        if self.link_rows.ids.is_empty() {
            return Ok(None);
        }
        let mut fields = schema::span_links_fixed_fields();
        fields.push(arrow::datatypes::Field::new(
            "trace_state",
            arrow::datatypes::DataType::Utf8,
            true,
        ));
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt16Array::from(self.link_rows.ids.clone())),
                Arc::new(UInt32Array::from(self.link_rows.parent_ids.clone())),
                Arc::new(
                    FixedSizeBinaryArray::try_from_iter(self.link_rows.trace_ids.iter())
                        .map_err(Error::from)?,
                ),
                Arc::new(
                    FixedSizeBinaryArray::try_from_iter(self.link_rows.span_ids.iter())
                        .map_err(Error::from)?,
                ),
                Arc::new(UInt32Array::from(self.link_rows.dropped_attrs.clone())),
                Arc::new(StringArray::from_iter(
                    self.link_rows.trace_state.iter().map(|o| o.as_deref()),
                )),
            ],
        )?;
        Ok(Some(batch))
    }
}

impl EntityBuilder for TracesBuilder {
    type Entity = Traces;

    fn with_stats(mut self, stats: Rc<Stats>) -> Self {
        self.resource_attrs = self.resource_attrs.with_stats(Rc::clone(&stats));
        self.scope_attrs = self.scope_attrs.with_stats(Rc::clone(&stats));
        self.span_attrs = self.span_attrs.with_stats(Rc::clone(&stats));
        self.event_attrs = self.event_attrs.with_stats(Rc::clone(&stats));
        self.link_attrs = self.link_attrs.with_stats(Rc::clone(&stats));
        self.stats = stats;
        self
    }

    fn append(&mut self, traces: &Traces) -> Result<()> {
        for resource_spans in traces {
            let resource_attrs_id = if resource_spans.resource.attributes.is_empty() {
                None
            } else {
                let rid = optimizer::resource_id(&resource_spans.resource, &resource_spans.schema_url);
                Some(*self.resource_attrs_cache.entry(rid).or_insert_with(|| {
                    let id = self.next_resource_attrs_id;
                    self.next_resource_attrs_id = self.next_resource_attrs_id.wrapping_add(1);
                    self.resource_attrs
                        .push_all(id as u32, &resource_spans.resource.attributes);
                    id
                }))
            };
            let resource_schema_url = non_empty(&resource_spans.schema_url);
            let resource_dropped_attributes_count = resource_spans.resource.dropped_attributes_count;
            for scope_spans in &resource_spans.scope_spans {
                let scope_attrs_id = if scope_spans.scope.attributes.is_empty() {
                    None
                } else {
                    let sid = optimizer::scope_id(&scope_spans.scope);
                    Some(*self.scope_attrs_cache.entry(sid).or_insert_with(|| {
                        let id = self.next_scope_attrs_id;
                        self.next_scope_attrs_id = self.next_scope_attrs_id.wrapping_add(1);
                        self.scope_attrs
                            .push_all(id as u32, &scope_spans.scope.attributes);
                        id
                    }))
                };
                let ctx = ResourceScopeContext {
                    resource_attrs_id,
                    resource_schema_url,
                    resource_dropped_attributes_count,
                    scope_attrs_id,
                    scope_name: non_empty(&scope_spans.scope.name),
                    scope_version: non_empty(&scope_spans.scope.version),
                    scope_dropped_attributes_count: scope_spans.scope.dropped_attributes_count,
                    scope_schema_url: non_empty(&scope_spans.schema_url),
                };
                for span in &scope_spans.spans {
                    self.push_span(span, &ctx)?;
                }
            }
        }
        Ok(())
    }

    fn build(&mut self) -> Result<Vec<(PayloadType, RecordBatch)>> {
        let mut out = Vec::new();
        if let Some(batch) = self.build_spans_record()? {
            out.push((PayloadType::Spans, batch));
        }
        if let Some(batch) = self.resource_attrs.build()? {
            out.push((PayloadType::ResourceAttrs, batch));
        }
        if let Some(batch) = self.scope_attrs.build()? {
            out.push((PayloadType::ScopeAttrs, batch));
        }
        if let Some(batch) = self.span_attrs.build()? {
            out.push((PayloadType::SpanAttrs, batch));
        }
        if let Some(batch) = self.build_events_record()? {
            out.push((PayloadType::SpanEvents, batch));
        }
        if let Some(batch) = self.event_attrs.build()? {
            out.push((PayloadType::SpanEventAttrs, batch));
        }
        if let Some(batch) = self.build_links_record()? {
            out.push((PayloadType::SpanLinks, batch));
        }
        if let Some(batch) = self.link_attrs.build()? {
            out.push((PayloadType::SpanLinkAttrs, batch));
        }
        Ok(out)
    }

    fn reset(&mut self) {
        let stats = Rc::clone(&self.stats);
        *self = TracesBuilder::with_dictionary_config(self.dict_config).with_stats(stats);
    }

    fn is_empty(&self) -> bool {
        self.span_rows.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anyvalue::AnyValue;
    use crate::ids::{SpanId, TraceId};
    use crate::otlp::*;

    fn single_span_traces() -> Traces {
        let span = Span {
            trace_id: TraceId::new(&[0xAA; 16]),
            span_id: SpanId::new(&[0xAA; 8]),
            name: "GET".into(),
            kind: SpanKind::Server,
            start_ns: 1,
            duration_ns: 1,
            status: Status {
                code: StatusCode::Ok,
                message: String::new(),
            },
            ..Default::default()
        };
        let mut resource = Resource::default();
        resource
            .attributes
            .push(("hostname".into(), AnyValue::Str("h1".into())));
        vec![ResourceSpans {
            resource,
            schema_url: "schema".into(),
            scope_spans: vec![ScopeSpans {
                scope: Scope {
                    name: "s".into(),
                    version: "1".into(),
                    ..Default::default()
                },
                schema_url: String::new(),
                spans: vec![span],
            }],
        }]
    }

    #[test]
    fn s1_single_span_dictionary_fits() {
        let mut builder = TracesBuilder::default();
        builder.append(&single_span_traces()).unwrap();
        let records = builder.build().unwrap();
        let spans = records
            .iter()
            .find(|(pt, _)| *pt == PayloadType::Spans)
            .unwrap();
        assert_eq!(spans.1.num_rows(), 1);
        assert!(records.iter().any(|(pt, _)| *pt == PayloadType::ResourceAttrs));
        assert!(!records.iter().any(|(pt, _)| *pt == PayloadType::ScopeAttrs));
        assert!(!records.iter().any(|(pt, _)| *pt == PayloadType::SpanAttrs));
    }

    #[test]
    fn s2_dictionary_promotes_past_u8_capacity() {
        use crate::dictionary::{DictionaryConfig, IndexWidth};
        let mut builder =
            TracesBuilder::with_dictionary_config(DictionaryConfig::new(IndexWidth::U8, IndexWidth::U32));
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
        builder.append(&traces).unwrap();
        let records = builder.build().unwrap();
        let (_, spans_batch) = records
            .into_iter()
            .find(|(pt, _)| *pt == PayloadType::Spans)
            .unwrap();
        let name_field = spans_batch.schema_ref().field_with_name("name").unwrap().clone();
        assert_eq!(
            name_field.data_type(),
            &arrow::datatypes::DataType::Dictionary(
                Box::new(arrow::datatypes::DataType::UInt16),
                Box::new(arrow::datatypes::DataType::Utf8)
            )
        );
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut builder = TracesBuilder::default();
        let span = Span {
            start_ns: 10,
            duration_ns: -1,
            ..Default::default()
        };
        let traces = vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans: vec![span],
                ..Default::default()
            }],
            ..Default::default()
        }];
        let err = builder.append(&traces).unwrap_err();
        assert!(matches!(err, Error::NegativeSpanDuration { .. }));
    }
}
