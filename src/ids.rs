// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-width trace/span identifiers.

use crate::error::Error;

/// 16-byte trace identifier. Zero-padded when absent.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Hash)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// Creates a new `TraceId` by copying the given bytes.
    #[must_use]
    pub fn new(value: &[u8; 16]) -> TraceId {
        TraceId(*value)
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// `true` if every byte is zero (an absent trace id).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl From<[u8; 16]> for TraceId {
    fn from(tid: [u8; 16]) -> Self {
        TraceId(tid)
    }
}

impl From<TraceId> for Vec<u8> {
    fn from(tid: TraceId) -> Self {
        tid.0.to_vec()
    }
}

impl TryFrom<&[u8]> for TraceId {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let id_bytes: [u8; 16] = value.try_into().map_err(|_| Error::InvalidId {
            expected: 16,
            given: value.len(),
        })?;
        Ok(TraceId::from(id_bytes))
    }
}

/// 8-byte span identifier. Zero-padded when absent.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Hash)]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// Creates a new `SpanId` by copying the given bytes.
    #[must_use]
    pub fn new(value: &[u8; 8]) -> SpanId {
        SpanId(*value)
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// `true` if every byte is zero (an absent span id).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

impl From<[u8; 8]> for SpanId {
    fn from(sid: [u8; 8]) -> Self {
        SpanId(sid)
    }
}

impl From<SpanId> for Vec<u8> {
    fn from(sid: SpanId) -> Self {
        sid.0.to_vec()
    }
}

impl TryFrom<&[u8]> for SpanId {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let id_bytes: [u8; 8] = value.try_into().map_err(|_| Error::InvalidId {
            expected: 8,
            given: value.len(),
        })?;
        Ok(SpanId::from(id_bytes))
    }
}
