// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Error and result types for the OTAP codec.

use arrow::datatypes::DataType;
use arrow::error::ArrowError;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error kind, stable across error-message changes.
///
/// Allocator-limit and schema-retry errors in particular must be matched by
/// kind rather than by message, since the Arrow IPC layer may wrap them with
/// arbitrary message prefixes as they bubble up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// A dictionary overflowed and the target schema needs to be rebuilt.
    SchemaNotUpToDate,
    /// The allocator guard's byte limit would be exceeded.
    AllocationLimitExceeded,
    /// A released builder was used again.
    BuilderAlreadyReleased,
    /// An any-value sparse-union field id was not recognized.
    InvalidAnyValueVariant,
    /// A record batch was missing a required column or had the wrong type.
    InvalidRecordShape,
    /// An error from the underlying Arrow IPC reader/writer.
    IpcLevelError,
    /// Any other error kind not covered above.
    Other,
}

/// Errors produced by the OTAP codec.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned by the adaptive record builder when a dictionary column
    /// overflowed its index type and the caller must rebuild the schema and
    /// retry.
    #[error("schema not up to date, rebuild and retry")]
    SchemaNotUpToDate,

    /// More than 5 consecutive `SchemaNotUpToDate` retries in one batch.
    #[error("schema planner did not converge after {attempts} retries")]
    SchemaRetriesExhausted {
        /// Number of retries attempted before giving up.
        attempts: u32,
    },

    /// The allocator guard's limit would be exceeded by this allocation.
    #[error(
        "allocation of {request} bytes would exceed limit {limit} (currently in use: {inuse})"
    )]
    AllocationLimitExceeded {
        /// Bytes requested by the failing allocation.
        request: usize,
        /// Bytes in use at the time of the request.
        inuse: usize,
        /// The configured limit.
        limit: usize,
    },

    /// A builder was appended to or built after it was released.
    #[error("builder `{label}` was already released")]
    BuilderAlreadyReleased {
        /// The builder's id/label.
        label: String,
    },

    /// An any-value sparse union carried an unrecognized type code / field id.
    #[error("invalid any-value variant: type code {type_code}")]
    InvalidAnyValueVariant {
        /// The unrecognized type code.
        type_code: u8,
    },

    /// A record batch was missing a required column, or a column had the
    /// wrong Arrow type.
    #[error("invalid record shape in column `{column}`: {reason}")]
    InvalidRecordShape {
        /// Name of the offending column.
        column: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// Required column is entirely absent.
    #[error("column not found: `{name}`")]
    ColumnNotFound {
        /// Name of the missing column.
        name: String,
    },

    /// A column carried an unexpected Arrow data type.
    #[error("column `{name}` data type mismatch: expected {expect}, found {actual}")]
    ColumnDataTypeMismatch {
        /// Name of the offending column.
        name: String,
        /// Expected data type.
        expect: DataType,
        /// Actual data type.
        actual: DataType,
    },

    /// Propagated from the Arrow IPC reader/writer.
    #[error("arrow IPC error: {source}")]
    IpcLevelError {
        /// Underlying Arrow error.
        #[source]
        source: ArrowError,
    },

    /// A CBOR-encoded any-value failed to decode.
    #[error("invalid CBOR-serialized any-value")]
    InvalidCborValue {
        /// Underlying ciborium error.
        #[source]
        source: ciborium::de::Error<std::io::Error>,
    },

    /// A CBOR-encoded any-value failed to serialize.
    #[error("failed to serialize any-value as CBOR")]
    CborEncodeFailure {
        /// Underlying ciborium error.
        #[source]
        source: ciborium::ser::Error<std::io::Error>,
    },

    /// A batch carried no payloads.
    #[error("batch message has no payloads")]
    EmptyBatch,

    /// Received a payload whose numeric payload-type tag isn't recognized.
    #[error("unsupported payload type: {actual}")]
    UnsupportedPayloadType {
        /// The unrecognized numeric tag.
        actual: i32,
    },

    /// `bucket_counts.len() != explicit_bounds.len() + 1` for a histogram
    /// data point.
    #[error(
        "histogram bucket_counts length {bucket_counts} does not match explicit_bounds length {explicit_bounds} + 1"
    )]
    HistogramBucketMismatch {
        /// Length of `bucket_counts`.
        bucket_counts: usize,
        /// Length of `explicit_bounds`.
        explicit_bounds: usize,
    },

    /// A span had a negative duration.
    #[error("span duration is negative: start_ns={start_ns}, duration_ns={duration_ns}")]
    NegativeSpanDuration {
        /// Span start time in nanoseconds.
        start_ns: i64,
        /// Span duration in nanoseconds.
        duration_ns: i64,
    },

    /// An id byte slice had the wrong length (trace ids are 16 bytes, span
    /// ids are 8 bytes).
    #[error("invalid id length: expected {expected}, given {given}")]
    InvalidId {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        given: usize,
    },
}

impl Error {
    /// Projects this error onto its stable [`ErrorKind`], for callers that
    /// need to match by kind rather than by message.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SchemaNotUpToDate => ErrorKind::SchemaNotUpToDate,
            Error::AllocationLimitExceeded { .. } => ErrorKind::AllocationLimitExceeded,
            Error::BuilderAlreadyReleased { .. } => ErrorKind::BuilderAlreadyReleased,
            Error::InvalidAnyValueVariant { .. } => ErrorKind::InvalidAnyValueVariant,
            Error::InvalidRecordShape { .. }
            | Error::ColumnNotFound { .. }
            | Error::ColumnDataTypeMismatch { .. }
            | Error::HistogramBucketMismatch { .. }
            | Error::InvalidId { .. } => ErrorKind::InvalidRecordShape,
            Error::IpcLevelError { .. } => ErrorKind::IpcLevelError,
            Error::SchemaRetriesExhausted { .. }
            | Error::InvalidCborValue { .. }
            | Error::CborEncodeFailure { .. }
            | Error::EmptyBatch
            | Error::UnsupportedPayloadType { .. }
            | Error::NegativeSpanDuration { .. } => ErrorKind::Other,
        }
    }
}

impl From<ArrowError> for Error {
    fn from(source: ArrowError) -> Self {
        Error::IpcLevelError { source }
    }
}
