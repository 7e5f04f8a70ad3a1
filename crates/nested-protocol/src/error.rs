// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Errors raised while encoding or decoding envelopes.

use thiserror::Error;

use crate::envelope::MAX_MESSAGE_SIZE;
use crate::method::PayloadKind;

/// Errors that can occur during envelope encoding/decoding
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("missing message property: {0}")]
    MissingProperty(&'static str),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("response to {method} carries no object")]
    MissingObject { method: &'static str },

    #[error("expected {expected:?} payload, got {actual:?}")]
    PayloadMismatch {
        expected: PayloadKind,
        actual: PayloadKind,
    },

    #[error("expected a {0} envelope")]
    UnexpectedEnvelope(&'static str),
}
