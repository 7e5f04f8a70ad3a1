// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP-style status codes carried in `Response.status`.

pub const OK: i32 = 200;
pub const CREATED: i32 = 201;
pub const ACCEPTED: i32 = 202;
pub const NO_CONTENT: i32 = 204;
pub const BAD_REQUEST: i32 = 400;
pub const NOT_FOUND: i32 = 404;
pub const INTERNAL_ERROR: i32 = 500;
pub const NOT_IMPLEMENTED: i32 = 501;
pub const SERVICE_UNAVAILABLE: i32 = 503;

/// Any 2xx status is a success; everything else is an error.
pub fn is_success(status: i32) -> bool {
    (200..300).contains(&status)
}

/// Short reason phrase used when a failure carries no message of its own.
pub fn reason(status: i32) -> &'static str {
    match status {
        OK => "OK",
        CREATED => "Created",
        ACCEPTED => "Accepted",
        NO_CONTENT => "No Content",
        BAD_REQUEST => "Bad Request",
        NOT_FOUND => "Not Found",
        INTERNAL_ERROR => "Internal Server Error",
        NOT_IMPLEMENTED => "Not Implemented",
        SERVICE_UNAVAILABLE => "Service Unavailable",
        _ => "Unknown Status",
    }
}
