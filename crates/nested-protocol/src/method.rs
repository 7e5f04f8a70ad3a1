// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Method table: which queue serves a method and what its response carries.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use prost::Message;

use crate::envelope::MAX_MESSAGE_SIZE;
use crate::error::ProtocolError;

/// A service and its well-known durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Users,
    Invoices,
    Auth,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Users, Service::Invoices, Service::Auth];

    /// Name of the durable queue the service consumes from.
    pub fn queue(self) -> &'static str {
        match self {
            Service::Users => "users",
            Service::Invoices => "invoices",
            Service::Auth => "auth",
        }
    }

    /// Methods served on this service's queue.
    pub fn methods(self) -> impl Iterator<Item = Method> {
        Method::ALL.into_iter().filter(move |m| m.service() == self)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue())
    }
}

impl FromStr for Service {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::ALL
            .into_iter()
            .find(|svc| svc.queue().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtocolError::UnknownService(s.to_string()))
    }
}

/// Shape of the `object` bytes carried by a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    None,
    Bool,
    User,
    Invoice,
    Token,
}

/// Every remote method known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    CreateUser,
    ReadUser,
    UpdateUser,
    DeleteUser,
    CreateInvoice,
    ReadInvoice,
    UpdateInvoice,
    DeleteInvoice,
    CreateToken,
    IsValidToken,
    RemoveToken,
    RemoveCredentials,
}

impl Method {
    pub const ALL: [Method; 12] = [
        Method::CreateUser,
        Method::ReadUser,
        Method::UpdateUser,
        Method::DeleteUser,
        Method::CreateInvoice,
        Method::ReadInvoice,
        Method::UpdateInvoice,
        Method::DeleteInvoice,
        Method::CreateToken,
        Method::IsValidToken,
        Method::RemoveToken,
        Method::RemoveCredentials,
    ];

    /// Value of the `x-remote-method` header.
    pub fn name(self) -> &'static str {
        match self {
            Method::CreateUser => "CreateUser",
            Method::ReadUser => "ReadUser",
            Method::UpdateUser => "UpdateUser",
            Method::DeleteUser => "DeleteUser",
            Method::CreateInvoice => "CreateInvoice",
            Method::ReadInvoice => "ReadInvoice",
            Method::UpdateInvoice => "UpdateInvoice",
            Method::DeleteInvoice => "DeleteInvoice",
            Method::CreateToken => "CreateToken",
            Method::IsValidToken => "IsValidToken",
            Method::RemoveToken => "RemoveToken",
            Method::RemoveCredentials => "RemoveCredentials",
        }
    }

    pub fn service(self) -> Service {
        match self {
            Method::CreateUser | Method::ReadUser | Method::UpdateUser | Method::DeleteUser => {
                Service::Users
            }
            Method::CreateInvoice
            | Method::ReadInvoice
            | Method::UpdateInvoice
            | Method::DeleteInvoice => Service::Invoices,
            Method::CreateToken
            | Method::IsValidToken
            | Method::RemoveToken
            | Method::RemoveCredentials => Service::Auth,
        }
    }

    pub fn queue(self) -> &'static str {
        self.service().queue()
    }

    pub fn response_kind(self) -> PayloadKind {
        match self {
            Method::CreateUser | Method::ReadUser | Method::UpdateUser => PayloadKind::User,
            Method::CreateInvoice | Method::ReadInvoice | Method::UpdateInvoice => {
                PayloadKind::Invoice
            }
            Method::CreateToken => PayloadKind::Token,
            Method::IsValidToken => PayloadKind::Bool,
            Method::DeleteUser
            | Method::DeleteInvoice
            | Method::RemoveToken
            | Method::RemoveCredentials => PayloadKind::None,
        }
    }

    /// Encode a request body for this method.
    pub fn encode_request<M: Message>(self, msg: &M) -> Result<Bytes, ProtocolError> {
        let body = msg.encode_to_vec();
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(body.len()));
        }
        Ok(Bytes::from(body))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ProtocolError::UnknownMethod(s.to_string()))
    }
}
