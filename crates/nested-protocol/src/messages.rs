// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain messages.
//!
//! Every scalar field is `optional` on the wire so an absent field can be
//! told apart from an explicit empty value. `merge_patch` relies on that to
//! apply partial updates.
//!
//! Timestamps are Unix milliseconds; `birthday` is an ISO-8601 date string.

use prost::Message;

use crate::error::ProtocolError;
use crate::method::{Method, PayloadKind};

#[derive(Clone, PartialEq, Message)]
pub struct User {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub surname: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub email: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub password: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub telephone: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub birthday: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub country: Option<String>,
    #[prost(string, optional, tag = "9")]
    pub address: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub address_information: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Product {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(double, optional, tag = "3")]
    pub price: Option<f64>,
    #[prost(uint32, optional, tag = "4")]
    pub quantity: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Invoice {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub user_id: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub creation_date: Option<i64>,
    #[prost(string, optional, tag = "4")]
    pub delivery_address: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub delivery_postcode: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub delivery_country: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub delivery_currency: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub delivery_address_information: Option<String>,
    #[prost(message, repeated, tag = "9")]
    pub products: Vec<Product>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Token {
    #[prost(int64, optional, tag = "1")]
    pub user_id: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub token: Option<String>,
    #[prost(int64, optional, tag = "3")]
    pub valid_from: Option<i64>,
    #[prost(string, optional, tag = "4")]
    pub user_agent: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct UserKey {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct InvoiceKey {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TokenKey {
    #[prost(string, optional, tag = "1")]
    pub token: Option<String>,
}

/// Wrapper for boolean results (`IsValidToken`).
#[derive(Clone, Copy, PartialEq, Message)]
pub struct BoolValue {
    #[prost(bool, tag = "1")]
    pub value: bool,
}

macro_rules! merge_fields {
    ($target:expr, $patch:expr, $($field:ident),+ $(,)?) => {
        $(
            if $patch.$field.is_some() {
                $target.$field = $patch.$field;
            }
        )+
    };
}

impl User {
    /// Overwrite the fields present in `patch`, leaving the rest untouched.
    pub fn merge_patch(&mut self, patch: User) {
        merge_fields!(
            self,
            patch,
            id,
            name,
            surname,
            email,
            password,
            telephone,
            birthday,
            country,
            address,
            address_information,
        );
    }

    /// Copy suitable for returning to callers.
    pub fn without_password(mut self) -> Self {
        self.password = None;
        self
    }
}

impl Invoice {
    /// Overwrite the fields present in `patch`. A non-empty product list
    /// replaces the stored one; an empty list means "not provided".
    pub fn merge_patch(&mut self, patch: Invoice) {
        merge_fields!(
            self,
            patch,
            id,
            user_id,
            creation_date,
            delivery_address,
            delivery_postcode,
            delivery_country,
            delivery_currency,
            delivery_address_information,
        );
        if !patch.products.is_empty() {
            self.products = patch.products;
        }
    }
}

/// Decoded `object` of a successful response, shaped by the method.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    None,
    Bool(bool),
    User(User),
    Invoice(Invoice),
    Token(Token),
}

impl ResponsePayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            ResponsePayload::None => PayloadKind::None,
            ResponsePayload::Bool(_) => PayloadKind::Bool,
            ResponsePayload::User(_) => PayloadKind::User,
            ResponsePayload::Invoice(_) => PayloadKind::Invoice,
            ResponsePayload::Token(_) => PayloadKind::Token,
        }
    }

    /// Encode as `object` bytes; `None` carries no object at all.
    pub fn encode_object(&self) -> Option<Vec<u8>> {
        match self {
            ResponsePayload::None => None,
            ResponsePayload::Bool(value) => Some(BoolValue { value: *value }.encode_to_vec()),
            ResponsePayload::User(user) => Some(user.encode_to_vec()),
            ResponsePayload::Invoice(invoice) => Some(invoice.encode_to_vec()),
            ResponsePayload::Token(token) => Some(token.encode_to_vec()),
        }
    }

    /// Decode `object` bytes using the response kind declared by `method`.
    pub fn decode_object(method: Method, object: Option<&[u8]>) -> Result<Self, ProtocolError> {
        let kind = method.response_kind();
        if kind == PayloadKind::None {
            return Ok(ResponsePayload::None);
        }
        let bytes = object.ok_or(ProtocolError::MissingObject {
            method: method.name(),
        })?;
        Ok(match kind {
            PayloadKind::None => ResponsePayload::None,
            PayloadKind::Bool => ResponsePayload::Bool(BoolValue::decode(bytes)?.value),
            PayloadKind::User => ResponsePayload::User(User::decode(bytes)?),
            PayloadKind::Invoice => ResponsePayload::Invoice(Invoice::decode(bytes)?),
            PayloadKind::Token => ResponsePayload::Token(Token::decode(bytes)?),
        })
    }

    fn mismatch(&self, expected: PayloadKind) -> ProtocolError {
        ProtocolError::PayloadMismatch {
            expected,
            actual: self.kind(),
        }
    }

    pub fn into_bool(self) -> Result<bool, ProtocolError> {
        match self {
            ResponsePayload::Bool(value) => Ok(value),
            other => Err(other.mismatch(PayloadKind::Bool)),
        }
    }

    pub fn into_user(self) -> Result<User, ProtocolError> {
        match self {
            ResponsePayload::User(user) => Ok(user),
            other => Err(other.mismatch(PayloadKind::User)),
        }
    }

    pub fn into_invoice(self) -> Result<Invoice, ProtocolError> {
        match self {
            ResponsePayload::Invoice(invoice) => Ok(invoice),
            other => Err(other.mismatch(PayloadKind::Invoice)),
        }
    }

    pub fn into_token(self) -> Result<Token, ProtocolError> {
        match self {
            ResponsePayload::Token(token) => Ok(token),
            other => Err(other.mismatch(PayloadKind::Token)),
        }
    }
}
