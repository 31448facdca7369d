// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! CBOR serialization for the any-value `Slice`/`Map` variants.

use crate::anyvalue::AnyValue;
use crate::error::{Error, Result};
use ciborium::Value as Cbor;

/// Serializes a [`AnyValue`] (of any variant) to canonical CBOR bytes.
pub fn encode(value: &AnyValue) -> Result<Vec<u8>> {
    let cbor = to_cbor(value);
    let mut buf = Vec::new();
    ciborium::into_writer(&cbor, &mut buf).map_err(|source| Error::CborEncodeFailure { source })?;
    Ok(buf)
}

/// Deserializes a CBOR-encoded any-value.
pub fn decode(bytes: &[u8]) -> Result<AnyValue> {
    let cbor: Cbor =
        ciborium::from_reader(bytes).map_err(|source| Error::InvalidCborValue { source })?;
    from_cbor(&cbor)
}

fn to_cbor(value: &AnyValue) -> Cbor {
    match value {
        AnyValue::Empty => Cbor::Null,
        AnyValue::Str(s) => Cbor::Text(s.clone()),
        AnyValue::Int(i) => Cbor::Integer((*i).into()),
        AnyValue::Double(d) => Cbor::Float(*d),
        AnyValue::Bool(b) => Cbor::Bool(*b),
        AnyValue::Bytes(b) => Cbor::Bytes(b.clone()),
        AnyValue::Slice(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
        AnyValue::Map(entries) => Cbor::Map(
            entries
                .iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), to_cbor(v)))
                .collect(),
        ),
    }
}

fn from_cbor(cbor: &Cbor) -> Result<AnyValue> {
    match cbor {
        Cbor::Null => Ok(AnyValue::Empty),
        Cbor::Text(s) => Ok(AnyValue::Str(s.clone())),
        Cbor::Integer(i) => {
            let as_i128: i128 = (*i).into();
            let as_i64 = i64::try_from(as_i128).map_err(|_| Error::InvalidRecordShape {
                column: "cbor".into(),
                reason: format!("integer {as_i128} does not fit in i64"),
            })?;
            Ok(AnyValue::Int(as_i64))
        }
        Cbor::Float(f) => Ok(AnyValue::Double(*f)),
        Cbor::Bool(b) => Ok(AnyValue::Bool(*b)),
        Cbor::Bytes(b) => Ok(AnyValue::Bytes(b.clone())),
        Cbor::Array(items) => {
            let values = items.iter().map(from_cbor).collect::<Result<Vec<_>>>()?;
            Ok(AnyValue::Slice(values))
        }
        Cbor::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let key = k.as_text().ok_or_else(|| Error::InvalidRecordShape {
                    column: "cbor".into(),
                    reason: format!("map key is not a string: {k:?}"),
                })?;
                out.push((key.to_owned(), from_cbor(v)?));
            }
            Ok(AnyValue::Map(out))
        }
        other => Err(Error::InvalidRecordShape {
            column: "cbor".into(),
            reason: format!("unsupported CBOR value: {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_nesting_round_trips() {
        let v = AnyValue::Slice(vec![AnyValue::Slice(vec![AnyValue::Map(vec![(
            "a".into(),
            AnyValue::Slice(vec![AnyValue::Int(1), AnyValue::Bool(false)]),
        )])])]);
        let bytes = encode(&v).unwrap();
        let back = decode(&bytes).unwrap();
        assert!(crate::anyvalue::values_equal(&v, &back));
    }

    #[test]
    fn canonical_bytes_are_order_sensitive_for_sorting() {
        let a = AnyValue::Slice(vec![AnyValue::Int(1)]);
        let b = AnyValue::Slice(vec![AnyValue::Int(2)]);
        assert_ne!(encode(&a).unwrap(), encode(&b).unwrap());
    }
}
