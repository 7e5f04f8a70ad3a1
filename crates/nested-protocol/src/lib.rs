// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Nested Protocol - broker envelope + Protobuf messages
//!
//! This crate provides the wire contract shared by every nestedapi service:
//! - The method table (which queue serves a method, which schemas it uses)
//! - Domain messages (`User`, `Invoice`, `Token`, ...) with all-optional fields
//! - The `Request`/`Response` envelope carried over the broker
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     nested-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: Request (header + properties) / Response (body)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: any broker (see nested-rpc)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The method name never travels inside the encoded body. It is carried as
//! the `x-remote-method` transport header and selects the schema used to
//! decode the request body and the response `object`.
//!
//! # Usage
//!
//! ```ignore
//! use nested_protocol::{Method, Response, ResponsePayload, messages::UserKey};
//!
//! let body = Method::ReadUser.encode_request(&UserKey { id: Some(42) })?;
//!
//! // ... publish body, receive reply bytes ...
//!
//! let response = Response::decode(&reply)?;
//! let user = response.payload(Method::ReadUser)?.into_user()?;
//! ```

pub mod envelope;
pub mod error;
pub mod messages;
pub mod method;
pub mod status;

pub use envelope::{Envelope, METHOD_HEADER, MAX_MESSAGE_SIZE, Properties, Request, Response};
pub use error::ProtocolError;
pub use messages::{
    BoolValue, Invoice, InvoiceKey, Product, ResponsePayload, Token, TokenKey, User, UserKey,
};
pub use method::{Method, PayloadKind, Service};
