// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Adaptive dictionary index-width configuration and promotion table.

/// The width of a dictionary's index array, or "no dictionary at all".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum IndexWidth {
    /// Dictionary encoding disabled; the column is a plain primitive.
    None,
    /// `u8` indices (up to 256 distinct values).
    U8,
    /// `u16` indices (up to 65536 distinct values).
    U16,
    /// `u32` indices.
    U32,
    /// `u64` indices.
    U64,
}

impl IndexWidth {
    /// The number of distinct values this width can address before
    /// overflowing, or `None` for [`IndexWidth::None`] (unbounded: there is
    /// no dictionary to overflow) and [`IndexWidth::U64`] (treated as
    /// unbounded in practice).
    #[must_use]
    pub fn capacity(self) -> Option<u64> {
        match self {
            IndexWidth::None => None,
            IndexWidth::U8 => Some(1 << 8),
            IndexWidth::U16 => Some(1 << 16),
            IndexWidth::U32 => Some(1 << 32),
            IndexWidth::U64 => None,
        }
    }

    /// The next wider index type, or `None` if already at the widest.
    #[must_use]
    pub fn promote(self) -> Option<IndexWidth> {
        match self {
            IndexWidth::None => None,
            IndexWidth::U8 => Some(IndexWidth::U16),
            IndexWidth::U16 => Some(IndexWidth::U32),
            IndexWidth::U32 => Some(IndexWidth::U64),
            IndexWidth::U64 => None,
        }
    }

    /// Schema-metadata spelling used for the `dictionary = ...` hint.
    #[must_use]
    pub fn as_metadata_str(self) -> &'static str {
        match self {
            IndexWidth::None => "none",
            IndexWidth::U8 => "uint8",
            IndexWidth::U16 => "uint16",
            IndexWidth::U32 => "uint32",
            IndexWidth::U64 => "uint64",
        }
    }
}

/// Per-column dictionary configuration: the width to start at, and the
/// widest width the adaptive builder is allowed to promote to before it must
/// fall back to the non-dictionary primitive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DictionaryConfig {
    /// Initial index width.
    pub init_index_width: IndexWidth,
    /// Widest index width to promote to before falling back.
    pub limit_index_width: IndexWidth,
}

impl DictionaryConfig {
    /// Creates a config, clamping `limit` up to at least `init` (promotion
    /// never needs to go backwards).
    #[must_use]
    pub fn new(init: IndexWidth, limit: IndexWidth) -> Self {
        let limit = if limit < init { init } else { limit };
        Self {
            init_index_width: init,
            limit_index_width: limit,
        }
    }

    /// Default configuration used when a payload type doesn't override it:
    /// start at `u8`, promote up to `u32`.
    #[must_use]
    pub fn default_str() -> Self {
        Self::new(IndexWidth::U8, IndexWidth::U32)
    }
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self::default_str()
    }
}

/// Decision made by the adaptive builder for one dictionary column after
/// observing its cardinality.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SchemaUpdateEvent {
    /// The dictionary overflowed but a wider index type exists within its
    /// configured limit; emitted as `DictionaryIndexTypeChanged[col]`.
    IndexTypeChanged {
        /// Name of the affected column.
        column: String,
        /// The new, wider index width.
        new_width: IndexWidth,
    },
    /// The dictionary overflowed and even the widest permitted index type
    /// can't hold it; emitted as `DictionaryWithOverflow[col]`.
    WithOverflow {
        /// Name of the affected column.
        column: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_chain_is_u8_u16_u32_u64() {
        assert_eq!(IndexWidth::U8.promote(), Some(IndexWidth::U16));
        assert_eq!(IndexWidth::U16.promote(), Some(IndexWidth::U32));
        assert_eq!(IndexWidth::U32.promote(), Some(IndexWidth::U64));
        assert_eq!(IndexWidth::U64.promote(), None);
    }

    #[test]
    fn config_clamps_limit_up_to_init() {
        let cfg = DictionaryConfig::new(IndexWidth::U32, IndexWidth::U8);
        assert_eq!(cfg.limit_index_width, IndexWidth::U32);
    }
}
