// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Stream producer: one Arrow IPC writer per sub-stream, keyed by schema
//! identity, reopened on schema change.

use crate::alloc::AllocGuard;
use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use crate::related::RecordMessage;
use crate::schema::PayloadType;
use crate::stats::Stats;
use arrow::datatypes::SchemaRef;
use arrow::ipc::CompressionType;
use arrow::ipc::writer::{IpcWriteOptions, StreamWriter};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// One payload ready to go on the wire: a sub-stream id, its payload type,
/// and an opaque Arrow IPC stream fragment.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Decimal-numeric sub-stream id, assigned by the producer.
    pub sub_stream_id: String,
    /// The payload's record kind.
    pub payload_type: PayloadType,
    /// One Arrow IPC stream fragment: a record plus any dictionary deltas.
    pub record_bytes: Vec<u8>,
}

/// A batch of payloads produced together, in declaration order, main record
/// first.
#[derive(Debug, Clone)]
pub struct BatchMessage {
    /// Monotonically increasing per producer.
    pub batch_id: u64,
    /// Ordered payloads for this batch.
    pub payloads: Vec<Payload>,
}

struct SubStream {
    sub_stream_id: u64,
    payload_type: PayloadType,
    writer: StreamWriter<Vec<u8>>,
    schema: SchemaRef,
    last_production: Instant,
}

/// Owns one Arrow IPC writer per distinct schema shape, keyed by the
/// schema-id tag a [`RecordMessage`] carries. Creating a sub-stream for a
/// schema-id not seen before closes any prior sub-stream of the same payload
/// type, since an additive schema change makes it stale.
pub struct StreamProducer {
    zstd: bool,
    stats_enabled: bool,
    alloc: Rc<AllocGuard>,
    stats: Rc<Stats>,
    sub_streams: HashMap<String, SubStream>,
    next_sub_stream_id: u64,
    next_batch_id: u64,
}

impl StreamProducer {
    /// Creates a producer sharing `alloc` and `stats` with the rest of the
    /// owning façade: one allocator per producer instance.
    #[must_use]
    pub fn new(config: &ProducerConfig, alloc: Rc<AllocGuard>, stats: Rc<Stats>) -> Self {
        Self {
            zstd: config.zstd,
            stats_enabled: config.stats,
            alloc,
            stats,
            sub_streams: HashMap::new(),
            next_sub_stream_id: 0,
            next_batch_id: 0,
        }
    }

    /// Writes `messages` to their sub-streams and assembles one batch
    /// message. The caller is responsible for ordering
    /// `messages` with the main record first.
    pub fn produce(&mut self, messages: Vec<RecordMessage>) -> Result<BatchMessage> {
        let mut payloads = Vec::with_capacity(messages.len());
        for message in messages {
            let sub_stream_id = self.sub_stream_for(&message)?;
            let sub_stream = self
                .sub_streams
                .get_mut(&message.schema_key)
                .expect("sub_stream_for just created or found this entry");

            let size = message.record.get_array_memory_size();
            self.alloc.reserve(size)?;
            sub_stream.writer.write(&message.record)?;
            sub_stream.writer.flush()?;
            let record_bytes = std::mem::take(sub_stream.writer.get_mut());
            self.alloc.release(size);
            sub_stream.last_production = Instant::now();

            payloads.push(Payload {
                sub_stream_id: sub_stream_id.to_string(),
                payload_type: message.payload_type,
                record_bytes,
            });
        }

        let batch_id = self.next_batch_id;
        self.next_batch_id = self.next_batch_id.wrapping_add(1);
        if self.stats_enabled {
            self.stats.record_batch_produced();
        }
        Ok(BatchMessage { batch_id, payloads })
    }

    /// The cached schema for a still-open sub-stream, if any: the cached
    /// schema is part of a sub-stream's state.
    #[must_use]
    pub fn schema_for_sub_stream(&self, sub_stream_id: u64) -> Option<&SchemaRef> {
        self.sub_streams
            .values()
            .find(|s| s.sub_stream_id == sub_stream_id)
            .map(|s| &s.schema)
    }

    /// Number of currently open sub-streams.
    #[must_use]
    pub fn open_sub_stream_count(&self) -> usize {
        self.sub_streams.len()
    }

    fn sub_stream_for(&mut self, message: &RecordMessage) -> Result<u64> {
        if let Some(existing) = self.sub_streams.get(&message.schema_key) {
            return Ok(existing.sub_stream_id);
        }

        let stale: Vec<String> = self
            .sub_streams
            .iter()
            .filter(|(_, s)| s.payload_type == message.payload_type)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            let _ = self.sub_streams.remove(&key);
            if self.stats_enabled {
                self.stats.record_stream_producer_closed();
            }
        }

        let sub_stream_id = self.next_sub_stream_id;
        self.next_sub_stream_id = self.next_sub_stream_id.wrapping_add(1);

        let schema = message.record.schema();
        let options = if self.zstd {
            IpcWriteOptions::default()
                .try_with_compression(Some(CompressionType::ZSTD))
                .map_err(Error::from)?
        } else {
            IpcWriteOptions::default()
        };
        let writer = StreamWriter::try_new_with_options(Vec::new(), &schema, options)
            .map_err(Error::from)?;

        let _ = self.sub_streams.insert(
            message.schema_key.clone(),
            SubStream {
                sub_stream_id,
                payload_type: message.payload_type,
                writer,
                schema,
                last_production: Instant::now(),
            },
        );
        if self.stats_enabled {
            self.stats.record_stream_producer_created();
        }

        Ok(sub_stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::related::build_record_messages;
    use arrow::array::{RecordBatch, UInt16Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn spans_batch(id_width: DataType, rows: &[u16]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", id_width, false)]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(UInt16Array::from(rows.to_vec())) as _],
        )
        .unwrap()
    }

    #[test]
    fn same_schema_reuses_sub_stream() {
        let mut producer = StreamProducer::new(
            &ProducerConfig::default(),
            Rc::new(AllocGuard::default()),
            Rc::new(Stats::default()),
        );
        let batch1 = build_record_messages(vec![(
            PayloadType::Spans,
            spans_batch(DataType::UInt16, &[1, 2]),
        )]);
        let out1 = producer.produce(batch1).unwrap();
        let batch2 = build_record_messages(vec![(
            PayloadType::Spans,
            spans_batch(DataType::UInt16, &[3]),
        )]);
        let out2 = producer.produce(batch2).unwrap();
        assert_eq!(out1.payloads[0].sub_stream_id, out2.payloads[0].sub_stream_id);
        assert_eq!(producer.open_sub_stream_count(), 1);
        assert_eq!(out1.batch_id + 1, out2.batch_id);
    }

    #[test]
    fn schema_change_closes_prior_sub_stream() {
        let mut producer = StreamProducer::new(
            &ProducerConfig::default(),
            Rc::new(AllocGuard::default()),
            Rc::new(Stats::default()),
        );
        let narrow = build_record_messages(vec![(
            PayloadType::Spans,
            spans_batch(DataType::UInt16, &[1]),
        )]);
        let out1 = producer.produce(narrow).unwrap();

        // A dictionary index-width promotion (or any schema evolution)
        // changes the column's data type, which mints a new schema key.
        let wide_schema = Arc::new(Schema::new(vec![Field::new("id", DataType::UInt32, false)]));
        let wide_messages = build_record_messages(vec![(
            PayloadType::Spans,
            RecordBatch::try_new(
                wide_schema,
                vec![Arc::new(arrow::array::UInt32Array::from(vec![1])) as _],
            )
            .unwrap(),
        )]);
        let out2 = producer.produce(wide_messages).unwrap();
        assert_ne!(out1.payloads[0].sub_stream_id, out2.payloads[0].sub_stream_id);
        assert_eq!(producer.open_sub_stream_count(), 1);
    }
}
