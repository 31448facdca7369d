// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The stream producer/consumer state machine.

pub mod consumer;
pub mod producer;
