// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The adaptive record builder: dictionary-column cardinality monitoring,
//! index-width promotion/fallback, and the bounded schema-update retry loop.

use crate::dictionary::{DictionaryConfig, IndexWidth, SchemaUpdateEvent};
use crate::error::{Error, Result};
use crate::stats::SizeHistogram;
use arrow::array::{
    Array, ArrayRef, DictionaryArray, RecordBatch, StringArray, UInt8Array, UInt16Array,
    UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum consecutive `SchemaNotUpToDate` retries per batch: exceeding
/// this is a fatal invariant violation, not a recoverable condition.
pub const MAX_SCHEMA_RETRIES: u32 = 5;

/// A single dictionary-encoded string column, buffered row-wise so that a
/// schema-update retry can rebuild the Arrow array against a wider index
/// width (or the plain-string fallback) without re-appending rows.
#[derive(Debug)]
pub struct AdaptiveStringColumn {
    name: String,
    config: DictionaryConfig,
    current_width: IndexWidth,
    rows: Vec<Option<String>>,
    dict_order: Vec<String>,
    dict_index: HashMap<String, u32>,
}

impl AdaptiveStringColumn {
    /// Creates a new column named `name` using `config`'s initial index
    /// width.
    #[must_use]
    pub fn new(name: impl Into<String>, config: DictionaryConfig) -> Self {
        Self {
            name: name.into(),
            current_width: config.init_index_width,
            config,
            rows: Vec::new(),
            dict_order: Vec::new(),
            dict_index: HashMap::new(),
        }
    }

    /// Appends a row. `None` is a null.
    pub fn append(&mut self, value: Option<&str>) {
        if let Some(v) = value {
            if !self.dict_index.contains_key(v) {
                let idx = self.dict_order.len() as u32;
                self.dict_order.push(v.to_owned());
                let _ = self.dict_index.insert(v.to_owned(), idx);
            }
        }
        self.rows.push(value.map(str::to_owned));
    }

    /// Number of distinct non-null values observed so far.
    #[must_use]
    pub fn distinct_count(&self) -> usize {
        self.dict_order.len()
    }

    /// Clears buffered rows (but not the configuration), for reuse after a
    /// batch flush.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.dict_order.clear();
        self.dict_index.clear();
        self.current_width = self.config.init_index_width;
    }

    /// Inspects observed cardinality against `current_width` and proposes a
    /// schema update if it overflows, without mutating any state.
    #[must_use]
    pub fn propose_update(&self) -> Option<SchemaUpdateEvent> {
        if self.current_width == IndexWidth::None {
            return None;
        }
        let observed = self.distinct_count() as u64;
        let Some(capacity) = self.current_width.capacity() else {
            return None;
        };
        if observed <= capacity {
            return None;
        }
        match self.next_width_within_limit() {
            Some(wider) => Some(SchemaUpdateEvent::IndexTypeChanged {
                column: self.name.clone(),
                new_width: wider,
            }),
            None => Some(SchemaUpdateEvent::WithOverflow {
                column: self.name.clone(),
            }),
        }
    }

    fn next_width_within_limit(&self) -> Option<IndexWidth> {
        let promoted = self.current_width.promote()?;
        if promoted <= self.config.limit_index_width {
            Some(promoted)
        } else {
            None
        }
    }

    /// Applies a previously proposed update, promoting to a wider index or
    /// dropping the dictionary entirely (falling back to `IndexWidth::None`,
    /// i.e. a plain string column).
    pub fn apply_update(&mut self, event: &SchemaUpdateEvent) {
        match event {
            SchemaUpdateEvent::IndexTypeChanged { new_width, .. } => {
                self.current_width = *new_width;
            }
            SchemaUpdateEvent::WithOverflow { .. } => {
                self.current_width = IndexWidth::None;
            }
        }
    }

    /// The Arrow field this column currently builds against.
    #[must_use]
    pub fn field(&self) -> Field {
        Field::new(&self.name, self.arrow_type(), true)
    }

    fn arrow_type(&self) -> DataType {
        match self.current_width {
            IndexWidth::None => DataType::Utf8,
            IndexWidth::U8 => {
                DataType::Dictionary(Box::new(DataType::UInt8), Box::new(DataType::Utf8))
            }
            IndexWidth::U16 => {
                DataType::Dictionary(Box::new(DataType::UInt16), Box::new(DataType::Utf8))
            }
            IndexWidth::U32 => {
                DataType::Dictionary(Box::new(DataType::UInt32), Box::new(DataType::Utf8))
            }
            IndexWidth::U64 => {
                DataType::Dictionary(Box::new(DataType::UInt64), Box::new(DataType::Utf8))
            }
        }
    }

    /// Builds the Arrow array for this column at its current index width.
    #[must_use]
    pub fn build_array(&self) -> ArrayRef {
        match self.current_width {
            IndexWidth::None => {
                Arc::new(StringArray::from_iter(self.rows.iter().map(|o| o.as_deref())))
            }
            IndexWidth::U8 => self.build_dictionary::<u8>(),
            IndexWidth::U16 => self.build_dictionary::<u16>(),
            IndexWidth::U32 => self.build_dictionary::<u32>(),
            IndexWidth::U64 => self.build_dictionary::<u64>(),
        }
    }

    fn build_dictionary<K>(&self) -> ArrayRef
    where
        K: DictKey,
    {
        let values = Arc::new(StringArray::from_iter(
            self.dict_order.iter().map(|s| Some(s.as_str())),
        ));
        let keys = K::key_array(&self.rows, &self.dict_index);
        Arc::new(K::build(keys, values))
    }

    /// Current index width, for schema-metadata emission.
    #[must_use]
    pub fn current_width(&self) -> IndexWidth {
        self.current_width
    }
}

/// Abstraction over the four dictionary-key integer widths, used so
/// [`AdaptiveStringColumn::build_dictionary`] can be generic.
trait DictKey: Sized {
    type KeyArray;
    type ArrowType: arrow::datatypes::ArrowDictionaryKeyType;

    fn key_array(rows: &[Option<String>], index: &HashMap<String, u32>) -> Self::KeyArray;
    fn build(keys: Self::KeyArray, values: ArrayRef) -> DictionaryArray<Self::ArrowType>;
}

macro_rules! impl_dict_key {
    ($prim:ty, $arrow_ty:ty, $array_ty:ty) => {
        impl DictKey for $prim {
            type KeyArray = $array_ty;
            type ArrowType = $arrow_ty;

            fn key_array(rows: &[Option<String>], index: &HashMap<String, u32>) -> Self::KeyArray {
                <$array_ty>::from_iter(rows.iter().map(|o| {
                    o.as_ref()
                        .map(|s| *index.get(s).expect("value was recorded in dict_index") as $prim)
                }))
            }

            fn build(keys: Self::KeyArray, values: ArrayRef) -> DictionaryArray<Self::ArrowType> {
                DictionaryArray::new(keys, values)
            }
        }
    };
}

impl_dict_key!(u8, arrow::datatypes::UInt8Type, UInt8Array);
impl_dict_key!(u16, arrow::datatypes::UInt16Type, UInt16Array);
impl_dict_key!(u32, arrow::datatypes::UInt32Type, UInt32Array);
impl_dict_key!(u64, arrow::datatypes::UInt64Type, UInt64Array);

/// Marks a column's parent-id encoding and sort discipline in schema
/// metadata. Not used directly by `AdaptiveRecordBuilder`
/// (that lives in `attributes.rs`), but shared here since both consult the
/// same `Schema` metadata convention.
pub fn with_encoding_metadata(field: Field, encoding: &str) -> Field {
    let mut metadata = field.metadata().clone();
    let _ = metadata.insert("encoding".to_string(), encoding.to_string());
    field.with_metadata(metadata)
}

/// Builds a `dictionary = ...` metadata map entry for a field.
pub fn dictionary_hint(width: IndexWidth) -> HashMap<String, String> {
    let mut m = HashMap::new();
    let _ = m.insert("dictionary".to_string(), width.as_metadata_str().to_string());
    m
}

/// Runs `attempt`, retrying up to [`MAX_SCHEMA_RETRIES`] times whenever it
/// signals `Error::SchemaNotUpToDate`, calling `on_retry` between attempts
/// to let the caller rebuild its schema/columns. This is the single place
/// that observes `SchemaNotUpToDate`.
pub fn build_with_retry<T>(
    mut attempt: impl FnMut() -> Result<T>,
    mut on_retry: impl FnMut(),
) -> Result<T> {
    let mut retries = 0u32;
    loop {
        match attempt() {
            Ok(record) => return Ok(record),
            Err(Error::SchemaNotUpToDate) => {
                retries += 1;
                if retries > MAX_SCHEMA_RETRIES {
                    return Err(Error::SchemaRetriesExhausted { attempts: retries - 1 });
                }
                on_retry();
            }
            Err(other) => return Err(other),
        }
    }
}

/// A minimal fixed schema + record batch wrapper carrying a size-monitoring
/// hook: after each successful build, the record's in-memory size feeds a
/// running histogram.
#[derive(Debug, Default)]
pub struct SizeMonitor {
    histogram: SizeHistogram,
}

impl SizeMonitor {
    /// Records the in-memory size of a freshly built record batch.
    pub fn observe(&mut self, batch: &RecordBatch) {
        self.histogram.observe(batch.get_array_memory_size() as f64);
    }

    /// Read-only access to the accumulated histogram.
    #[must_use]
    pub fn histogram(&self) -> &SizeHistogram {
        &self.histogram
    }
}

/// Convenience: builds a [`SchemaRef`] from this set of adaptive string
/// columns in declaration order, plus any already-typed fixed fields.
#[must_use]
pub fn build_schema(dict_columns: &[&AdaptiveStringColumn], fixed_fields: &[Field]) -> SchemaRef {
    let mut fields: Vec<Field> = fixed_fields.to_vec();
    fields.extend(dict_columns.iter().map(|c| c.field()));
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(init: IndexWidth, limit: IndexWidth) -> DictionaryConfig {
        DictionaryConfig::new(init, limit)
    }

    #[test]
    fn promotion_is_signalled_once_and_then_stable() {
        let mut col = AdaptiveStringColumn::new("name", cfg(IndexWidth::U8, IndexWidth::U32));
        for i in 0..300 {
            col.append(Some(&format!("span_{i}")));
        }
        let event = col.propose_update().expect("should overflow u8");
        assert_eq!(
            event,
            SchemaUpdateEvent::IndexTypeChanged {
                column: "name".into(),
                new_width: IndexWidth::U16,
            }
        );
        col.apply_update(&event);
        assert!(col.propose_update().is_none());
        assert_eq!(col.current_width(), IndexWidth::U16);
    }

    #[test]
    fn overflow_past_limit_falls_back_to_plain_string() {
        let mut col = AdaptiveStringColumn::new("name", cfg(IndexWidth::U8, IndexWidth::U8));
        for i in 0..300 {
            col.append(Some(&format!("span_{i}")));
        }
        let event = col.propose_update().expect("should overflow u8");
        assert_eq!(
            event,
            SchemaUpdateEvent::WithOverflow {
                column: "name".into()
            }
        );
        col.apply_update(&event);
        assert_eq!(col.current_width(), IndexWidth::None);
        let arr = col.build_array();
        assert_eq!(arr.data_type(), &DataType::Utf8);
    }

    #[test]
    fn dictionary_array_round_trips_values() {
        let mut col = AdaptiveStringColumn::new("k", cfg(IndexWidth::U8, IndexWidth::U32));
        col.append(Some("a"));
        col.append(None);
        col.append(Some("b"));
        col.append(Some("a"));
        let arr = col.build_array();
        let dict = arr
            .as_any()
            .downcast_ref::<DictionaryArray<arrow::datatypes::UInt8Type>>()
            .unwrap();
        assert_eq!(dict.len(), 4);
        assert!(dict.is_null(1));
    }

    #[test]
    fn retry_loop_bounds_at_five_and_then_fails() {
        let mut attempts = 0;
        let result: Result<()> = build_with_retry(
            || {
                attempts += 1;
                Err(Error::SchemaNotUpToDate)
            },
            || {},
        );
        match result {
            Err(Error::SchemaRetriesExhausted { attempts: a }) => assert_eq!(a, MAX_SCHEMA_RETRIES),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(attempts, MAX_SCHEMA_RETRIES as usize + 1);
    }

    #[test]
    fn retry_loop_succeeds_after_one_retry() {
        let mut calls = 0;
        let result = build_with_retry(
            || {
                calls += 1;
                if calls == 1 {
                    Err(Error::SchemaNotUpToDate)
                } else {
                    Ok(42)
                }
            },
            || {},
        );
        assert_eq!(result.unwrap(), 42);
    }
}
