// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Stream consumer: mirrors the producer, one Arrow IPC reader per
//! sub-stream keyed by sub-stream id.

use crate::alloc::AllocGuard;
use crate::config::ConsumerConfig;
use crate::error::{Error, Result};
use crate::schema::PayloadType;
use crate::stats::Stats;
use crate::stream::producer::{BatchMessage, Payload};
use arrow::array::RecordBatch;
use arrow::ipc::reader::StreamReader;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;

/// One decoded record plus the metadata it arrived with.
#[derive(Debug)]
pub struct RecordMessage {
    /// The batch this record arrived in.
    pub batch_id: u64,
    /// Sub-stream id the record was read from.
    pub sub_stream_id: String,
    /// The record's payload kind.
    pub payload_type: PayloadType,
    /// The decoded record. Release it with [`StreamConsumer::release`] once
    /// done: records are released by the caller after decoding, not by
    /// the consumer itself.
    pub record: RecordBatch,
}

struct SubStream {
    payload_type: PayloadType,
    reader: StreamReader<Cursor<Vec<u8>>>,
}

impl SubStream {
    fn try_new(payload_type: PayloadType, bytes: Vec<u8>) -> Result<Self> {
        let reader = StreamReader::try_new(Cursor::new(bytes), None).map_err(Error::from)?;
        Ok(Self {
            payload_type,
            reader,
        })
    }

    fn replace_bytes(&mut self, bytes: Vec<u8>) {
        *self.reader.get_mut() = Cursor::new(bytes);
    }

    fn next_record(&mut self) -> Option<std::result::Result<RecordBatch, arrow::error::ArrowError>> {
        self.reader.next()
    }
}

/// Mirrors [`crate::stream::producer::StreamProducer`]: one Arrow IPC reader
/// per sub-stream id, re-pointed at each payload's bytes in turn. A
/// sub-stream id not seen before evicts any reader of the same payload type,
/// since the producer only mints a new id on schema change.
pub struct StreamConsumer {
    stats_enabled: bool,
    alloc: Rc<AllocGuard>,
    stats: Rc<Stats>,
    sub_streams: HashMap<String, SubStream>,
}

impl StreamConsumer {
    /// Creates an empty consumer sharing `alloc` and `stats` with the rest
    /// of the owning façade.
    #[must_use]
    pub fn new(config: &ConsumerConfig, alloc: Rc<AllocGuard>, stats: Rc<Stats>) -> Self {
        Self {
            stats_enabled: config.stats,
            alloc,
            stats,
            sub_streams: HashMap::new(),
        }
    }

    /// Decodes every payload in `batch`, in order.
    pub fn consume(&mut self, batch: BatchMessage) -> Result<Vec<RecordMessage>> {
        let mut records = Vec::with_capacity(batch.payloads.len());
        for payload in batch.payloads {
            let Payload {
                sub_stream_id,
                payload_type,
                record_bytes,
            } = payload;

            let sub_stream = match self.sub_streams.get_mut(&sub_stream_id) {
                Some(existing) => {
                    existing.replace_bytes(record_bytes);
                    existing
                }
                None => {
                    let stale: Vec<String> = self
                        .sub_streams
                        .iter()
                        .filter(|(_, s)| s.payload_type == payload_type)
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in stale {
                        let _ = self.sub_streams.remove(&key);
                        if self.stats_enabled {
                            self.stats.record_stream_producer_closed();
                        }
                    }
                    if self.stats_enabled {
                        self.stats.record_stream_producer_created();
                    }
                    self.sub_streams
                        .entry(sub_stream_id.clone())
                        .or_insert(SubStream::try_new(payload_type, record_bytes)?)
                }
            };

            if let Some(result) = sub_stream.next_record() {
                let record = result.map_err(Error::from)?;
                self.alloc.reserve(record.get_array_memory_size())?;
                records.push(RecordMessage {
                    batch_id: batch.batch_id,
                    sub_stream_id,
                    payload_type,
                    record,
                });
            }
            // Else: the fragment carried only a schema/dictionary message
            // with no data record; nothing to hand up for this payload.
        }
        if self.stats_enabled {
            self.stats.record_batch_produced();
        }
        Ok(records)
    }

    /// Releases the allocator-guard reservation made when `record` was
    /// decoded. The caller, not the consumer, is responsible for calling
    /// this once it is done with the record.
    pub fn release(&self, record: &RecordBatch) {
        self.alloc.release(record.get_array_memory_size());
    }

    /// Number of currently open sub-streams.
    #[must_use]
    pub fn open_sub_stream_count(&self) -> usize {
        self.sub_streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProducerConfig;
    use crate::related::build_record_messages;
    use crate::stream::producer::StreamProducer;
    use arrow::array::{RecordBatch, UInt16Array, UInt32Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn spans_batch(dt: DataType, rows: Vec<u32>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", dt.clone(), false)]));
        let array: arrow::array::ArrayRef = match dt {
            DataType::UInt16 => Arc::new(UInt16Array::from(
                rows.iter().map(|v| *v as u16).collect::<Vec<_>>(),
            )),
            DataType::UInt32 => Arc::new(UInt32Array::from(rows)),
            other => unimplemented!("{other:?}"),
        };
        RecordBatch::try_new(schema, vec![array]).unwrap()
    }

    #[test]
    fn round_trips_two_batches_on_one_sub_stream() {
        let mut producer = StreamProducer::new(
            &ProducerConfig::default(),
            Rc::new(AllocGuard::default()),
            Rc::new(Stats::default()),
        );
        let mut consumer =
            StreamConsumer::new(&ConsumerConfig::default(), Rc::new(AllocGuard::default()), Rc::new(Stats::default()));

        let out1 = producer
            .produce(build_record_messages(vec![(
                PayloadType::Spans,
                spans_batch(DataType::UInt16, vec![1, 2, 3]),
            )]))
            .unwrap();
        let decoded1 = consumer.consume(out1).unwrap();
        assert_eq!(decoded1.len(), 1);
        assert_eq!(decoded1[0].record.num_rows(), 3);
        consumer.release(&decoded1[0].record);

        let out2 = producer
            .produce(build_record_messages(vec![(
                PayloadType::Spans,
                spans_batch(DataType::UInt16, vec![4]),
            )]))
            .unwrap();
        let decoded2 = consumer.consume(out2).unwrap();
        assert_eq!(decoded2[0].record.num_rows(), 1);
        assert_eq!(consumer.open_sub_stream_count(), 1);
    }

    #[test]
    fn schema_change_evicts_stale_sub_stream_consumer() {
        let mut producer = StreamProducer::new(
            &ProducerConfig::default(),
            Rc::new(AllocGuard::default()),
            Rc::new(Stats::default()),
        );
        let mut consumer =
            StreamConsumer::new(&ConsumerConfig::default(), Rc::new(AllocGuard::default()), Rc::new(Stats::default()));

        let out1 = producer
            .produce(build_record_messages(vec![(
                PayloadType::Spans,
                spans_batch(DataType::UInt16, vec![1]),
            )]))
            .unwrap();
        let _ = consumer.consume(out1).unwrap();

        let out2 = producer
            .produce(build_record_messages(vec![(
                PayloadType::Spans,
                spans_batch(DataType::UInt32, vec![1]),
            )]))
            .unwrap();
        let decoded2 = consumer.consume(out2).unwrap();
        assert_eq!(decoded2.len(), 1);
        assert_eq!(consumer.open_sub_stream_count(), 1);
    }
}
