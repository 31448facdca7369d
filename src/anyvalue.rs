// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The OTLP any-value model and its six-arm sparse-union wire encoding.

use crate::cbor;
use crate::error::{Error, Result};
use std::cmp::Ordering;

/// A dynamically-typed OTLP attribute/body value.
#[derive(Clone, Debug, Default)]
pub enum AnyValue {
    /// No value present.
    #[default]
    Empty,
    /// UTF-8 string.
    Str(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    Slice(Vec<AnyValue>),
    /// Ordered string-keyed map (insertion order is not semantically
    /// meaningful but is preserved for stable CBOR encoding).
    Map(Vec<(String, AnyValue)>),
}

/// Stable type codes for the any-value sparse union. `Slice` and
/// `Map` both serialize through the `Cbor` arm; they remain distinct logical
/// kinds but share a wire arm.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum AnyValueTypeCode {
    /// `str` arm.
    Str = 0,
    /// `i64` arm.
    Int = 1,
    /// `f64` arm.
    Double = 2,
    /// `bool` arm.
    Bool = 3,
    /// `binary` arm (plain bytes).
    Binary = 4,
    /// `cbor` arm (serialized `Slice`/`Map`).
    Cbor = 5,
}

impl AnyValue {
    /// The variant ordinal used for type-based comparison during sorting.
    #[must_use]
    pub fn variant_ordinal(&self) -> u8 {
        match self {
            AnyValue::Empty => 0,
            AnyValue::Str(_) => 1,
            AnyValue::Int(_) => 2,
            AnyValue::Double(_) => 3,
            AnyValue::Bool(_) => 4,
            AnyValue::Bytes(_) => 5,
            AnyValue::Slice(_) => 6,
            AnyValue::Map(_) => 7,
        }
    }

    /// The wire type code this value would be appended under, or `None` for
    /// `Empty` (encoded as a null at the union level).
    #[must_use]
    pub fn type_code(&self) -> Option<AnyValueTypeCode> {
        match self {
            AnyValue::Empty => None,
            AnyValue::Str(_) => Some(AnyValueTypeCode::Str),
            AnyValue::Int(_) => Some(AnyValueTypeCode::Int),
            AnyValue::Double(_) => Some(AnyValueTypeCode::Double),
            AnyValue::Bool(_) => Some(AnyValueTypeCode::Bool),
            AnyValue::Bytes(_) => Some(AnyValueTypeCode::Binary),
            AnyValue::Slice(_) | AnyValue::Map(_) => Some(AnyValueTypeCode::Cbor),
        }
    }
}

/// Total order over [`AnyValue`]s, shared by the sorter and the delta-group
/// encoder, which needs a careful equality notion to decide run boundaries.
///
/// Types compare by variant ordinal first. NaN is treated as equal to itself
/// and greater than all other doubles (a total-order float policy, see
/// `DESIGN.md`). `Empty` compares equal only to `Empty`.
pub fn compare_values(a: &AnyValue, b: &AnyValue) -> Ordering {
    match (a, b) {
        (AnyValue::Empty, AnyValue::Empty) => Ordering::Equal,
        (AnyValue::Str(x), AnyValue::Str(y)) => x.cmp(y),
        (AnyValue::Int(x), AnyValue::Int(y)) => x.cmp(y),
        (AnyValue::Double(x), AnyValue::Double(y)) => total_cmp_f64(*x, *y),
        (AnyValue::Bool(x), AnyValue::Bool(y)) => x.cmp(y),
        (AnyValue::Bytes(x), AnyValue::Bytes(y)) => x.cmp(y),
        (AnyValue::Slice(_) | AnyValue::Map(_), AnyValue::Slice(_) | AnyValue::Map(_)) => {
            // Compare via canonical CBOR bytes.
            let xb = cbor::encode(a).unwrap_or_default();
            let yb = cbor::encode(b).unwrap_or_default();
            xb.cmp(&yb)
        }
        _ => a.variant_ordinal().cmp(&b.variant_ordinal()),
    }
}

/// Deep-structural equality matching [`compare_values`]'s notion of equality.
#[must_use]
pub fn values_equal(a: &AnyValue, b: &AnyValue) -> bool {
    compare_values(a, b) == Ordering::Equal
}

fn total_cmp_f64(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

/// Encodes `value` into the six-arm sparse-union's flat columns, returning
/// `(type_code, str, int, double, bool, bytes, cbor)`. Exactly one of the six
/// trailing fields is `Some` (or none, for `Empty`), matching the sparse
/// discipline shared by the any-value column and the attribute records'
/// explicit-column fan-out.
pub struct EncodedAnyValue {
    /// Wire type code, or `None` for `Empty`.
    pub type_code: Option<AnyValueTypeCode>,
    /// Populated iff `type_code == Some(Str)`.
    pub str_value: Option<String>,
    /// Populated iff `type_code == Some(Int)`.
    pub int_value: Option<i64>,
    /// Populated iff `type_code == Some(Double)`.
    pub double_value: Option<f64>,
    /// Populated iff `type_code == Some(Bool)`.
    pub bool_value: Option<bool>,
    /// Populated iff `type_code == Some(Binary)`.
    pub bytes_value: Option<Vec<u8>>,
    /// Populated iff `type_code == Some(Cbor)`.
    pub cbor_value: Option<Vec<u8>>,
}

/// Encodes an [`AnyValue`] into its sparse-union arm representation.
pub fn encode(value: &AnyValue) -> Result<EncodedAnyValue> {
    let mut out = EncodedAnyValue {
        type_code: value.type_code(),
        str_value: None,
        int_value: None,
        double_value: None,
        bool_value: None,
        bytes_value: None,
        cbor_value: None,
    };
    match value {
        AnyValue::Empty => {}
        AnyValue::Str(s) => out.str_value = Some(s.clone()),
        AnyValue::Int(i) => out.int_value = Some(*i),
        AnyValue::Double(d) => out.double_value = Some(*d),
        AnyValue::Bool(b) => out.bool_value = Some(*b),
        AnyValue::Bytes(b) => out.bytes_value = Some(b.clone()),
        AnyValue::Slice(_) | AnyValue::Map(_) => out.cbor_value = Some(cbor::encode(value)?),
    }
    Ok(out)
}

/// Decodes a sparse-union row given its type code and the value present in
/// that arm. `type_code = None` means `Empty`.
pub fn decode(
    type_code: Option<u8>,
    str_value: Option<&str>,
    int_value: Option<i64>,
    double_value: Option<f64>,
    bool_value: Option<bool>,
    bytes_value: Option<&[u8]>,
    cbor_value: Option<&[u8]>,
) -> Result<AnyValue> {
    let Some(code) = type_code else {
        return Ok(AnyValue::Empty);
    };
    let code = AnyValueTypeCode::try_from(code)
        .map_err(|_| Error::InvalidAnyValueVariant { type_code: code })?;
    match code {
        AnyValueTypeCode::Str => str_value
            .map(|s| AnyValue::Str(s.to_owned()))
            .ok_or(Error::InvalidAnyValueVariant { type_code: code as u8 }),
        AnyValueTypeCode::Int => int_value
            .map(AnyValue::Int)
            .ok_or(Error::InvalidAnyValueVariant { type_code: code as u8 }),
        AnyValueTypeCode::Double => double_value
            .map(AnyValue::Double)
            .ok_or(Error::InvalidAnyValueVariant { type_code: code as u8 }),
        AnyValueTypeCode::Bool => bool_value
            .map(AnyValue::Bool)
            .ok_or(Error::InvalidAnyValueVariant { type_code: code as u8 }),
        AnyValueTypeCode::Binary => bytes_value
            .map(|b| AnyValue::Bytes(b.to_vec()))
            .ok_or(Error::InvalidAnyValueVariant { type_code: code as u8 }),
        AnyValueTypeCode::Cbor => {
            let bytes = cbor_value.ok_or(Error::InvalidAnyValueVariant { type_code: code as u8 })?;
            cbor::decode(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_round_trips_as_none() {
        let enc = encode(&AnyValue::Empty).unwrap();
        assert!(enc.type_code.is_none());
        let dec = decode(None, None, None, None, None, None, None).unwrap();
        assert!(values_equal(&dec, &AnyValue::Empty));
    }

    #[test]
    fn scalar_round_trip() {
        for v in [
            AnyValue::Str(String::new()),
            AnyValue::Str("hello".into()),
            AnyValue::Int(i64::MIN),
            AnyValue::Int(i64::MAX),
            AnyValue::Double(0.0),
            AnyValue::Double(-0.0),
            AnyValue::Double(f64::MIN),
            AnyValue::Double(f64::MAX),
            AnyValue::Double(f64::NAN),
            AnyValue::Bool(true),
            AnyValue::Bool(false),
            AnyValue::Bytes(vec![]),
            AnyValue::Bytes(vec![1, 2, 3]),
        ] {
            let enc = encode(&v).unwrap();
            let dec = decode(
                enc.type_code.map(|c| c as u8),
                enc.str_value.as_deref(),
                enc.int_value,
                enc.double_value,
                enc.bool_value,
                enc.bytes_value.as_deref(),
                enc.cbor_value.as_deref(),
            )
            .unwrap();
            assert!(values_equal(&dec, &v), "round trip mismatch for {v:?}");
        }
    }

    #[test]
    fn nested_slice_and_map_round_trip() {
        let v = AnyValue::Map(vec![(
            "k1".into(),
            AnyValue::Slice(vec![
                AnyValue::Int(1),
                AnyValue::Double(2.0),
                AnyValue::Str("x".into()),
            ]),
        )]);
        let enc = encode(&v).unwrap();
        let dec = decode(
            enc.type_code.map(|c| c as u8),
            None,
            None,
            None,
            None,
            None,
            enc.cbor_value.as_deref(),
        )
        .unwrap();
        assert!(values_equal(&dec, &v));
    }

    #[test]
    fn invalid_type_code_is_an_error() {
        let err = decode(Some(200), None, None, None, None, None, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidAnyValueVariant);
    }

    #[test]
    fn bool_orders_false_before_true() {
        assert_eq!(
            compare_values(&AnyValue::Bool(false), &AnyValue::Bool(true)),
            Ordering::Less
        );
    }
}
