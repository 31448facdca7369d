// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Flat attribute records: accumulator, parent-id delta/delta-group
//! encoding, sort disciplines, and the decoder.

use crate::adaptive::AdaptiveStringColumn;
use crate::anyvalue::{self, AnyValue, compare_values};
use crate::dictionary::DictionaryConfig;
use crate::error::{Error, Result};
use crate::schema;
use crate::stats::Stats;
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float64Array, Int64Array, RecordBatch, UInt16Array,
    UInt32Array,
};
use arrow::datatypes::{DataType, Field};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Parent-id column width: resource/scope attributes key
/// off a `u16` row id; span/log/metric-data-point attributes key off a
/// `u32` row id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParentIdWidth {
    /// 16-bit parent ids.
    U16,
    /// 32-bit parent ids.
    U32,
}

/// One row of an attribute record's raw (pre-encoding) content.
#[derive(Clone, Debug)]
pub struct AttributeRow {
    /// The id of the parent row this attribute belongs to.
    pub parent_id: u32,
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: AnyValue,
}

/// Sort discipline applied to attribute rows before parent-id encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortOrder {
    /// `(type, parent_id, key, value)`.
    TypeParentKeyValue,
    /// `(type, key, parent_id, value)`.
    TypeKeyParentValue,
    /// `(type, key, value, parent_id)`.
    TypeKeyValueParent,
    /// No sorting.
    None,
}

impl SortOrder {
    fn compare(self, a: &AttributeRow, b: &AttributeRow) -> Ordering {
        let type_cmp = || a.value.variant_ordinal().cmp(&b.value.variant_ordinal());
        let key_cmp = || a.key.cmp(&b.key);
        let parent_cmp = || a.parent_id.cmp(&b.parent_id);
        let value_cmp = || compare_values(&a.value, &b.value);
        match self {
            SortOrder::TypeParentKeyValue => type_cmp()
                .then_with(parent_cmp)
                .then_with(key_cmp)
                .then_with(value_cmp),
            SortOrder::TypeKeyParentValue => type_cmp()
                .then_with(key_cmp)
                .then_with(parent_cmp)
                .then_with(value_cmp),
            SortOrder::TypeKeyValueParent => type_cmp()
                .then_with(key_cmp)
                .then_with(value_cmp)
                .then_with(parent_cmp),
            SortOrder::None => Ordering::Equal,
        }
    }
}

/// Parent-id encoding scheme.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParentIdEncoding {
    /// Raw parent id, no transform.
    None,
    /// `parent_id_i - parent_id_{i-1}`, implicit zero start. Requires rows
    /// sorted by parent-id ascending.
    Delta,
    /// Delta within a run of identical `(key, value)`; absolute on run
    /// break.
    DeltaGroup,
}

impl ParentIdEncoding {
    /// Schema-metadata spelling.
    #[must_use]
    pub fn as_metadata_str(self) -> &'static str {
        match self {
            ParentIdEncoding::None => "none",
            ParentIdEncoding::Delta => "delta",
            ParentIdEncoding::DeltaGroup => "delta_group",
        }
    }

    /// Encodes a sorted sequence of rows' parent ids in place, returning the
    /// wire-level parent-id values to store per row.
    ///
    /// `Delta` requires rows already sorted by parent-id ascending.
    /// `DeltaGroup` requires rows sorted so that a run of identical
    /// `(key, value)` is contiguous.
    #[must_use]
    pub fn encode(self, rows: &[AttributeRow]) -> Vec<u32> {
        match self {
            ParentIdEncoding::None => rows.iter().map(|r| r.parent_id).collect(),
            ParentIdEncoding::Delta => {
                let mut prev = 0u32;
                rows.iter()
                    .map(|r| {
                        let delta = r.parent_id.wrapping_sub(prev);
                        prev = r.parent_id;
                        delta
                    })
                    .collect()
            }
            ParentIdEncoding::DeltaGroup => {
                let mut out = Vec::with_capacity(rows.len());
                let mut prev: Option<(&str, &AnyValue, u32)> = None;
                for row in rows {
                    match prev {
                        Some((pk, pv, pid))
                            if pk == row.key && anyvalue::values_equal(pv, &row.value) =>
                        {
                            out.push(row.parent_id.wrapping_sub(pid));
                        }
                        _ => {
                            out.push(row.parent_id);
                        }
                    }
                    prev = Some((&row.key, &row.value, row.parent_id));
                }
                out
            }
        }
    }

    /// Inverse of [`ParentIdEncoding::encode`]: reconstructs absolute parent
    /// ids from the wire-level values and each row's `(key, value)`.
    #[must_use]
    pub fn decode(self, wire_values: &[u32], keys: &[String], values: &[AnyValue]) -> Vec<u32> {
        match self {
            ParentIdEncoding::None => wire_values.to_vec(),
            ParentIdEncoding::Delta => {
                let mut prev = 0u32;
                wire_values
                    .iter()
                    .map(|&delta| {
                        prev = prev.wrapping_add(delta);
                        prev
                    })
                    .collect()
            }
            ParentIdEncoding::DeltaGroup => {
                let mut out = Vec::with_capacity(wire_values.len());
                let mut prev: Option<(&str, &AnyValue, u32)> = None;
                for (i, &wire) in wire_values.iter().enumerate() {
                    let key = keys[i].as_str();
                    let value = &values[i];
                    let parent_id = match prev {
                        Some((pk, pv, pid)) if pk == key && anyvalue::values_equal(pv, value) => {
                            pid.wrapping_add(wire)
                        }
                        _ => wire,
                    };
                    out.push(parent_id);
                    prev = Some((key, value, parent_id));
                }
                out
            }
        }
    }
}

/// Accumulates attribute rows for one attribute-record kind across a batch,
/// then builds the flat record.
pub struct AttributeAccumulator {
    width: ParentIdWidth,
    encoding: ParentIdEncoding,
    sort_order: SortOrder,
    rows: Vec<AttributeRow>,
    key_column: AdaptiveStringColumn,
    stats: Rc<Stats>,
}

impl AttributeAccumulator {
    /// Creates a new accumulator for one attribute-record kind.
    #[must_use]
    pub fn new(width: ParentIdWidth, encoding: ParentIdEncoding, sort_order: SortOrder) -> Self {
        Self {
            width,
            encoding,
            sort_order,
            rows: Vec::new(),
            key_column: AdaptiveStringColumn::new("key", DictionaryConfig::default_str()),
            stats: Rc::new(Stats::default()),
        }
    }

    /// Shares `stats` with the owning builder so that dictionary schema
    /// updates observed on the `key` column are recorded against the same
    /// counters as the rest of the batch.
    #[must_use]
    pub fn with_stats(mut self, stats: Rc<Stats>) -> Self {
        self.stats = stats;
        self
    }

    /// `true` if no rows have been pushed since the last flush/reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pushes every attribute of `attrs` under `parent_id`.
    pub fn push_all(&mut self, parent_id: u32, attrs: &[(String, AnyValue)]) {
        for (key, value) in attrs {
            self.rows.push(AttributeRow {
                parent_id,
                key: key.clone(),
                value: value.clone(),
            });
        }
    }

    /// Sorts accumulated rows per this record kind's sort discipline, then
    /// builds the flat Arrow record batch, applying the key column's
    /// adaptive dictionary logic. No retry is needed here since
    /// `AdaptiveStringColumn` buffers rows and rebuilds at any width without
    /// re-appending.
    pub fn build(&mut self) -> Result<Option<RecordBatch>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        self.rows
            .sort_by(|a, b| self.sort_order.compare(a, b));

        self.key_column.reset();
        for row in &self.rows {
            self.key_column.append(Some(&row.key));
        }
        if let Some(event) = self.key_column.propose_update() {
            self.stats.record_schema_update(&event);
            self.key_column.apply_update(&event);
        }

        let wire_parent_ids = self.encoding.encode(&self.rows);
        let parent_id_array: ArrayRef = match self.width {
            ParentIdWidth::U16 => Arc::new(UInt16Array::from_iter(
                wire_parent_ids.iter().map(|&p| Some(p as u16)),
            )),
            ParentIdWidth::U32 => {
                Arc::new(UInt32Array::from_iter(wire_parent_ids.iter().map(|&p| Some(p))))
            }
        };

        let key_array = self.key_column.build_array();
        let type_array = arrow::array::UInt8Array::from_iter(
            self.rows.iter().map(|r| r.value.type_code().map(|c| c as u8)),
        );

        let mut str_vals = Vec::with_capacity(self.rows.len());
        let mut int_vals = Vec::with_capacity(self.rows.len());
        let mut double_vals = Vec::with_capacity(self.rows.len());
        let mut bool_vals = Vec::with_capacity(self.rows.len());
        let mut bytes_vals = Vec::with_capacity(self.rows.len());
        let mut cbor_vals = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let enc = anyvalue::encode(&row.value)?;
            str_vals.push(enc.str_value);
            int_vals.push(enc.int_value);
            double_vals.push(enc.double_value);
            bool_vals.push(enc.bool_value);
            bytes_vals.push(enc.bytes_value);
            cbor_vals.push(enc.cbor_value);
        }

        let parent_id_field = {
            let dt = match self.width {
                ParentIdWidth::U16 => DataType::UInt16,
                ParentIdWidth::U32 => DataType::UInt32,
            };
            let mut metadata = HashMap::new();
            let _ = metadata.insert(
                "encoding".to_string(),
                self.encoding.as_metadata_str().to_string(),
            );
            Field::new("parent_id", dt, false).with_metadata(metadata)
        };

        let schema = Arc::new(arrow::datatypes::Schema::new(vec![
            parent_id_field,
            self.key_column.field(),
            Field::new("type", DataType::UInt8, true),
            Field::new("str", DataType::Utf8, true),
            Field::new("int", DataType::Int64, true),
            Field::new("double", DataType::Float64, true),
            Field::new("bool", DataType::Boolean, true),
            Field::new("bytes", DataType::Binary, true),
            Field::new("ser", DataType::Binary, true),
        ]));

        let batch = RecordBatch::try_new(
            schema,
            vec![
                parent_id_array,
                key_array,
                Arc::new(type_array),
                Arc::new(arrow::array::StringArray::from_iter(
                    str_vals.iter().map(|o| o.as_deref()),
                )),
                Arc::new(Int64Array::from(int_vals)),
                Arc::new(Float64Array::from(double_vals)),
                Arc::new(BooleanArray::from(bool_vals)),
                Arc::new(BinaryArray::from_iter(bytes_vals.iter().map(|o| o.as_deref()))),
                Arc::new(BinaryArray::from_iter(cbor_vals.iter().map(|o| o.as_deref()))),
            ],
        )?;
        Ok(Some(batch))
    }

    /// Clears accumulated rows after a successful flush.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.key_column.reset();
    }
}

/// Reconstructs `parent_id -> [(key, value), ...]` from a flat attribute
/// record batch, the inverse of [`AttributeAccumulator`].
pub fn decode_attributes(
    batch: &RecordBatch,
    width: ParentIdWidth,
    encoding: ParentIdEncoding,
) -> Result<HashMap<u32, Vec<(String, AnyValue)>>> {
    let parent_id_col = batch
        .column_by_name("parent_id")
        .ok_or_else(|| Error::ColumnNotFound { name: "parent_id".into() })?;
    let wire_parent_ids: Vec<u32> = match width {
        ParentIdWidth::U16 => {
            let arr = parent_id_col
                .as_any()
                .downcast_ref::<UInt16Array>()
                .ok_or_else(|| Error::ColumnDataTypeMismatch {
                    name: "parent_id".into(),
                    expect: DataType::UInt16,
                    actual: parent_id_col.data_type().clone(),
                })?;
            arr.iter().map(|v| v.unwrap_or(0) as u32).collect()
        }
        ParentIdWidth::U32 => {
            let arr = parent_id_col
                .as_any()
                .downcast_ref::<UInt32Array>()
                .ok_or_else(|| Error::ColumnDataTypeMismatch {
                    name: "parent_id".into(),
                    expect: DataType::UInt32,
                    actual: parent_id_col.data_type().clone(),
                })?;
            arr.iter().map(|v| v.unwrap_or(0)).collect()
        }
    };

    let keys = decode_string_column(batch, "key")?;

    let type_col = batch
        .column_by_name("type")
        .ok_or_else(|| Error::ColumnNotFound { name: "type".into() })?
        .as_any()
        .downcast_ref::<arrow::array::UInt8Array>()
        .ok_or_else(|| Error::ColumnDataTypeMismatch {
            name: "type".into(),
            expect: DataType::UInt8,
            actual: DataType::Null,
        })?
        .clone();
    let str_col = column_as::<arrow::array::StringArray>(batch, "str")?;
    let int_col = column_as::<Int64Array>(batch, "int")?;
    let double_col = column_as::<Float64Array>(batch, "double")?;
    let bool_col = column_as::<BooleanArray>(batch, "bool")?;
    let bytes_col = column_as::<BinaryArray>(batch, "bytes")?;
    let cbor_col = column_as::<BinaryArray>(batch, "ser")?;

    let mut values = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let value = anyvalue::decode(
            type_col.is_valid(i).then(|| type_col.value(i)),
            str_col.is_valid(i).then(|| str_col.value(i)),
            int_col.is_valid(i).then(|| int_col.value(i)),
            double_col.is_valid(i).then(|| double_col.value(i)),
            bool_col.is_valid(i).then(|| bool_col.value(i)),
            bytes_col.is_valid(i).then(|| bytes_col.value(i)),
            cbor_col.is_valid(i).then(|| cbor_col.value(i)),
        )?;
        values.push(value);
    }

    let parent_ids = encoding.decode(&wire_parent_ids, &keys, &values);

    let mut result: HashMap<u32, Vec<(String, AnyValue)>> = HashMap::new();
    for i in 0..batch.num_rows() {
        result
            .entry(parent_ids[i])
            .or_default()
            .push((keys[i].clone(), values[i].clone()));
    }
    Ok(result)
}

pub(crate) fn column_as<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::ColumnNotFound { name: name.into() })?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::ColumnDataTypeMismatch {
            name: name.into(),
            expect: DataType::Null,
            actual: DataType::Null,
        })
}

/// Reads a `Utf8` or dictionary-of-`Utf8` column as plain strings, whatever
/// index width the adaptive builder settled on. Nulls decode as `""`. Shared
/// by the attribute-record `key` column and every dictionary-encoded string
/// column the signal builders emit (span/event name, log severity text,
/// metric name/description/unit, ...).
pub(crate) fn decode_string_column(batch: &RecordBatch, name: &str) -> Result<Vec<String>> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| Error::ColumnNotFound { name: name.into() })?;
    match col.data_type() {
        DataType::Utf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<arrow::array::StringArray>()
                .expect("utf8");
            Ok((0..arr.len())
                .map(|i| if arr.is_valid(i) { arr.value(i).to_owned() } else { String::new() })
                .collect())
        }
        DataType::Dictionary(key_ty, _) => decode_dict_strings(col, key_ty, name),
        other => Err(Error::ColumnDataTypeMismatch {
            name: name.into(),
            expect: DataType::Utf8,
            actual: other.clone(),
        }),
    }
}

fn decode_dict_strings(col: &ArrayRef, key_ty: &DataType, name: &str) -> Result<Vec<String>> {
    use arrow::array::DictionaryArray;
    use arrow::datatypes::{UInt8Type, UInt16Type, UInt32Type, UInt64Type};

    macro_rules! decode_as {
        ($ty:ty) => {{
            let dict = col
                .as_any()
                .downcast_ref::<DictionaryArray<$ty>>()
                .ok_or_else(|| Error::ColumnDataTypeMismatch {
                    name: name.into(),
                    expect: col.data_type().clone(),
                    actual: col.data_type().clone(),
                })?;
            let values = dict
                .values()
                .as_any()
                .downcast_ref::<arrow::array::StringArray>()
                .ok_or_else(|| Error::ColumnDataTypeMismatch {
                    name: name.into(),
                    expect: DataType::Utf8,
                    actual: dict.values().data_type().clone(),
                })?;
            Ok((0..dict.len())
                .map(|i| {
                    if dict.is_null(i) {
                        String::new()
                    } else {
                        values.value(dict.keys().value(i) as usize).to_owned()
                    }
                })
                .collect())
        }};
    }

    match key_ty {
        DataType::UInt8 => decode_as!(UInt8Type),
        DataType::UInt16 => decode_as!(UInt16Type),
        DataType::UInt32 => decode_as!(UInt32Type),
        DataType::UInt64 => decode_as!(UInt64Type),
        other => Err(Error::ColumnDataTypeMismatch {
            name: name.into(),
            expect: DataType::UInt32,
            actual: other.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(kv: &[(&str, AnyValue)]) -> Vec<(String, AnyValue)> {
        kv.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn delta_encoding_round_trips_sorted_parent_ids() {
        let mut acc = AttributeAccumulator::new(
            ParentIdWidth::U32,
            ParentIdEncoding::Delta,
            SortOrder::TypeParentKeyValue,
        );
        acc.push_all(1, &attrs(&[("a", AnyValue::Int(1))]));
        acc.push_all(3, &attrs(&[("b", AnyValue::Int(2))]));
        acc.push_all(5, &attrs(&[("c", AnyValue::Int(3))]));
        let batch = acc.build().unwrap().unwrap();
        let decoded =
            decode_attributes(&batch, ParentIdWidth::U32, ParentIdEncoding::Delta).unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(decoded.contains_key(&1));
        assert!(decoded.contains_key(&3));
        assert!(decoded.contains_key(&5));
    }

    #[test]
    fn delta_group_reconstructs_mapping_for_repeated_key_value_runs() {
        let mut acc = AttributeAccumulator::new(
            ParentIdWidth::U32,
            ParentIdEncoding::DeltaGroup,
            SortOrder::TypeKeyValueParent,
        );
        // Three parents share the same (key, value) pair.
        for pid in [2u32, 7, 9] {
            acc.push_all(pid, &attrs(&[("env", AnyValue::Str("prod".into()))]));
        }
        acc.push_all(9, &attrs(&[("other", AnyValue::Bool(true))]));
        let batch = acc.build().unwrap().unwrap();
        let decoded =
            decode_attributes(&batch, ParentIdWidth::U32, ParentIdEncoding::DeltaGroup).unwrap();
        assert_eq!(decoded.get(&2).unwrap().len(), 1);
        assert_eq!(decoded.get(&9).unwrap().len(), 2);
    }

    #[test]
    fn empty_accumulator_builds_nothing() {
        let mut acc = AttributeAccumulator::new(
            ParentIdWidth::U16,
            ParentIdEncoding::Delta,
            SortOrder::None,
        );
        assert!(acc.is_empty());
        assert!(acc.build().unwrap().is_none());
    }
}
