// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Wraps a signal builder's finished records into tagged messages ready for
//! the stream producer.

use crate::schema::PayloadType;
use arrow::array::RecordBatch;
use arrow::datatypes::Schema;

/// One record tagged with the schema identity the stream producer uses to
/// find or create its sub-stream.
#[derive(Debug)]
pub struct RecordMessage {
    /// `schema-prefix ∥ ":" ∥ schema-id`: a stable identity for
    /// this record's schema shape. Two messages with the same key are
    /// wire-compatible and may share a sub-stream.
    pub schema_key: String,
    /// The payload type this record carries.
    pub payload_type: PayloadType,
    /// The record itself.
    pub record: RecordBatch,
}

/// Turns a signal builder's `(payload_type, record)` list (already ordered
/// main-record-first by the builder) into tagged [`RecordMessage`]s. Never
/// reorders or drops entries; the main record stays first because the
/// builder put it first.
#[must_use]
pub fn build_record_messages(records: Vec<(PayloadType, RecordBatch)>) -> Vec<RecordMessage> {
    records
        .into_iter()
        .map(|(payload_type, record)| RecordMessage {
            schema_key: schema_key(payload_type, record.schema().as_ref()),
            payload_type,
            record,
        })
        .collect()
}

/// A stable string identity for a record's schema shape: the payload type
/// plus each field's name, data type, and nullability, in order.
///
/// Two records with the same key are sub-stream peers. A dictionary
/// index-width promotion changes a field's data type and so mints a new
/// key, which is exactly how a schema change propagates to the stream
/// producer.
#[must_use]
pub fn schema_key(payload_type: PayloadType, schema: &Schema) -> String {
    let mut key = format!("{payload_type:?}");
    for field in schema.fields() {
        key.push('\u{1}');
        key.push_str(field.name());
        key.push(':');
        key.push_str(&format!("{:?}", field.data_type()));
        key.push(':');
        key.push(if field.is_nullable() { '1' } else { '0' });
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};
    use std::sync::Arc;

    fn batch(field_name: &str, dt: DataType) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(field_name, dt.clone(), true)]));
        let array = arrow::array::new_null_array(&dt, 1);
        RecordBatch::try_new(schema, vec![array]).unwrap()
    }

    #[test]
    fn schema_key_changes_with_field_type() {
        let a = batch("id", DataType::UInt8);
        let b = batch("id", DataType::UInt16);
        assert_ne!(
            schema_key(PayloadType::Spans, a.schema().as_ref()),
            schema_key(PayloadType::Spans, b.schema().as_ref())
        );
    }

    #[test]
    fn build_record_messages_preserves_order() {
        let records = vec![
            (PayloadType::Spans, batch("id", DataType::UInt16)),
            (PayloadType::ResourceAttrs, batch("id", DataType::UInt16)),
        ];
        let messages = build_record_messages(records);
        assert_eq!(messages[0].payload_type, PayloadType::Spans);
        assert_eq!(messages[1].payload_type, PayloadType::ResourceAttrs);
    }
}
