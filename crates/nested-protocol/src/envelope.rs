// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/response envelope carried over the broker.
//!
//! A request is split between the transport and the body:
//! - header `x-remote-method`: method name
//! - property `correlation_id`: joins the reply to the call
//! - property `reply_to`: private reply queue of the caller
//! - body: protobuf encoding of the method's request schema
//!
//! A response is a single protobuf message (`status`, `message`, `object`)
//! published to `reply_to` with the request's correlation id.

use bytes::Bytes;
use prost::Message;
use tracing::trace;

use crate::error::ProtocolError;
use crate::messages::ResponsePayload;
use crate::method::Method;
use crate::status;

/// Transport header naming the remote method
pub const METHOD_HEADER: &str = "x-remote-method";

/// Maximum encoded message size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Transport-level properties of a broker message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    /// Value of the `x-remote-method` header
    pub method: Option<String>,
}

impl Properties {
    pub fn request(method: &str, correlation_id: &str, reply_to: &str) -> Self {
        Self {
            correlation_id: Some(correlation_id.to_string()),
            reply_to: Some(reply_to.to_string()),
            method: Some(method.to_string()),
        }
    }

    pub fn reply(correlation_id: &str) -> Self {
        Self {
            correlation_id: Some(correlation_id.to_string()),
            ..Default::default()
        }
    }
}

/// Either side of a call as seen on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
}

impl Envelope {
    /// Classify a delivery: anything carrying the method header is a request.
    pub fn from_delivery(properties: &Properties, body: &Bytes) -> Result<Self, ProtocolError> {
        if properties.method.is_some() {
            Request::from_parts(properties, body.clone()).map(Envelope::Request)
        } else {
            Response::decode(body).map(Envelope::Response)
        }
    }

    pub fn into_request(self) -> Result<Request, ProtocolError> {
        match self {
            Envelope::Request(request) => Ok(request),
            Envelope::Response(_) => Err(ProtocolError::UnexpectedEnvelope("request")),
        }
    }

    pub fn into_response(self) -> Result<Response, ProtocolError> {
        match self {
            Envelope::Response(response) => Ok(response),
            Envelope::Request(_) => Err(ProtocolError::UnexpectedEnvelope("response")),
        }
    }
}

/// An inbound or outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub correlation_id: String,
    pub reply_to: String,
    pub payload: Bytes,
}

impl Request {
    /// Build a request from transport properties and a raw body.
    pub fn from_parts(properties: &Properties, payload: Bytes) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(payload.len()));
        }
        let method = properties
            .method
            .clone()
            .ok_or(ProtocolError::MissingProperty(METHOD_HEADER))?;
        let correlation_id = properties
            .correlation_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(ProtocolError::MissingProperty("correlation_id"))?;
        let reply_to = properties
            .reply_to
            .clone()
            .filter(|queue| !queue.is_empty())
            .ok_or(ProtocolError::MissingProperty("reply_to"))?;

        Ok(Self {
            method,
            correlation_id,
            reply_to,
            payload,
        })
    }

    pub fn properties(&self) -> Properties {
        Properties::request(&self.method, &self.correlation_id, &self.reply_to)
    }

    /// Decode the body as the given request schema
    pub fn decode<M: Message + Default>(&self) -> Result<M, ProtocolError> {
        Ok(M::decode(self.payload.clone())?)
    }
}

/// Reply to a call. `status` is the single source of truth for success.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub object: Option<Vec<u8>>,
}

impl Response {
    /// 200 response carrying `payload`
    pub fn success(payload: &ResponsePayload) -> Self {
        Self::with_status(status::OK, payload)
    }

    /// Successful response with an explicit 2xx status
    pub fn with_status(status: i32, payload: &ResponsePayload) -> Self {
        debug_assert!(status::is_success(status));
        Self {
            status,
            message: None,
            object: payload.encode_object(),
        }
    }

    /// Failure response. An empty message is replaced by the reason phrase.
    pub fn failure(status: i32, message: impl Into<String>) -> Self {
        debug_assert!(!status::is_success(status));
        let mut message = message.into();
        if message.is_empty() {
            message = status::reason(status).to_string();
        }
        Self {
            status,
            message: Some(message),
            object: None,
        }
    }

    pub fn not_implemented(method: &str) -> Self {
        Self::failure(
            status::NOT_IMPLEMENTED,
            format!("method {method} is not implemented"),
        )
    }

    pub fn is_success(&self) -> bool {
        status::is_success(self.status)
    }

    /// Decode `object` according to the response kind of `method`.
    pub fn payload(&self, method: Method) -> Result<ResponsePayload, ProtocolError> {
        ResponsePayload::decode_object(method, self.object.as_deref())
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let body = self.encode_to_vec();
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(body.len()));
        }
        Ok(Bytes::from(body))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(bytes.len()));
        }
        let response = <Self as Message>::decode(bytes)?;
        trace!(status = response.status, "decoded response");
        Ok(response)
    }
}
