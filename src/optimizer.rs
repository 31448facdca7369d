// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed ids for grouping an OTLP entity tree by
//! `(ResourceID, ScopeID)`: two resources or scopes with
//! identical content collapse to the same id regardless of instance
//! identity.

use crate::anyvalue::AnyValue;
use crate::otlp::{Attributes, Resource, Scope};

/// Canonical content id for a [`Resource`]: sorted attrs string, dropped
/// count, and schema url.
#[must_use]
pub fn resource_id(resource: &Resource, schema_url: &str) -> String {
    format!(
        "{}\u{1}{}\u{1}{}",
        canonical_attrs(&resource.attributes),
        resource.dropped_attributes_count,
        schema_url
    )
}

/// Canonical content id for a [`Scope`]: name, version, sorted attrs,
/// dropped count.
#[must_use]
pub fn scope_id(scope: &Scope) -> String {
    format!(
        "{}\u{1}{}\u{1}{}\u{1}{}",
        scope.name,
        scope.version,
        canonical_attrs(&scope.attributes),
        scope.dropped_attributes_count
    )
}

fn canonical_attrs(attrs: &Attributes) -> String {
    let mut sorted: Vec<&(String, AnyValue)> = attrs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={}", render_value(v)))
        .collect::<Vec<_>>()
        .join("\u{2}")
}

fn render_value(v: &AnyValue) -> String {
    match v {
        AnyValue::Empty => "∅".to_string(),
        AnyValue::Str(s) => format!("s:{s}"),
        AnyValue::Int(i) => format!("i:{i}"),
        AnyValue::Double(d) => format!("d:{d}"),
        AnyValue::Bool(b) => format!("b:{b}"),
        AnyValue::Bytes(b) => format!("x:{}", hex(b)),
        AnyValue::Slice(_) | AnyValue::Map(_) => {
            format!("c:{}", hex(&crate::cbor::encode(v).unwrap_or_default()))
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_is_stable_under_attribute_reordering() {
        let mut r1 = Resource::default();
        r1.attributes.push(("a".into(), AnyValue::Str("1".into())));
        r1.attributes.push(("b".into(), AnyValue::Str("2".into())));
        let mut r2 = Resource::default();
        r2.attributes.push(("b".into(), AnyValue::Str("2".into())));
        r2.attributes.push(("a".into(), AnyValue::Str("1".into())));
        assert_eq!(resource_id(&r1, "s"), resource_id(&r2, "s"));
    }
}
