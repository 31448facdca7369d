// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Producer configuration.

use crate::dictionary::{DictionaryConfig, IndexWidth};

/// Configuration accepted by a [`crate::api::OtapProducer`].
///
/// Every recognized option is represented here as a typed field; there is no
/// open-ended bag of extra settings.
#[derive(Clone, Copy, Debug)]
pub struct ProducerConfig {
    /// Byte budget enforced by the allocator guard. This crate wraps a
    /// checked byte counter rather than a pluggable allocator, so this
    /// field is that counter's limit.
    pub allocator_limit: usize,
    /// Initial dictionary index width; `IndexWidth::None` disables
    /// dictionary encoding entirely.
    pub init_index_size: IndexWidth,
    /// Widest index width the adaptive builder may promote to before
    /// falling back to the plain primitive.
    pub limit_index_size: IndexWidth,
    /// Enable zstd compression at the Arrow IPC layer.
    pub zstd: bool,
    /// Enable schema-stats collection (size histograms).
    pub stats: bool,
}

impl ProducerConfig {
    /// Builds the [`DictionaryConfig`] implied by `init_index_size` /
    /// `limit_index_size`.
    #[must_use]
    pub fn dictionary_config(&self) -> DictionaryConfig {
        DictionaryConfig::new(self.init_index_size, self.limit_index_size)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            allocator_limit: usize::MAX,
            init_index_size: IndexWidth::U8,
            limit_index_size: IndexWidth::U32,
            zstd: false,
            stats: true,
        }
    }
}

/// Configuration accepted by a [`crate::api::OtapConsumer`]. The consumer is
/// largely unconfigured (it adapts to whatever schema the producer used) but
/// shares the allocator limit and stats toggle.
#[derive(Clone, Copy, Debug)]
pub struct ConsumerConfig {
    /// Byte budget enforced by the allocator guard.
    pub allocator_limit: usize,
    /// Enable stats collection.
    pub stats: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            allocator_limit: usize::MAX,
            stats: true,
        }
    }
}
