// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the services.
//!
//! [`StoreError`] is what a store reports; [`ServiceError`] is what a handler
//! reports, and maps to the status of the reply.

use std::fmt;

use nested_protocol::status;
use nested_rpc::{HandlerError, PoolError};
use thiserror::Error;

/// Result type using ServiceError
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures reported by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("store error during '{operation}': {details}")]
    Backend { operation: String, details: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

/// Errors a handler can return.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ServiceError {
    /// The addressed entity does not exist.
    NotFound {
        entity: &'static str,
        key: String,
    },

    /// The request is missing a field or carries an invalid one.
    Validation {
        field: &'static str,
        message: String,
    },

    /// The store failed.
    Store { operation: String, details: String },

    /// No store handle could be obtained.
    Unavailable { details: String },
}

impl ServiceError {
    pub fn missing(field: &'static str) -> Self {
        Self::Validation {
            field,
            message: "is required".to_string(),
        }
    }

    /// Status code sent back in the reply.
    pub fn status(&self) -> i32 {
        match self {
            Self::NotFound { .. } => status::NOT_FOUND,
            Self::Validation { .. } => status::BAD_REQUEST,
            Self::Store { .. } => status::INTERNAL_ERROR,
            Self::Unavailable { .. } => status::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, key } => write!(f, "{} '{}' not found", entity, key),
            Self::Validation { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::Store { operation, details } => {
                write!(f, "Store error during '{}': {}", operation, details)
            }
            Self::Unavailable { details } => write!(f, "Service unavailable: {}", details),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => ServiceError::NotFound { entity, key },
            StoreError::Backend { operation, details } => {
                ServiceError::Store { operation, details }
            }
        }
    }
}

impl From<PoolError> for ServiceError {
    fn from(err: PoolError) -> Self {
        ServiceError::Unavailable {
            details: err.to_string(),
        }
    }
}

impl From<ServiceError> for HandlerError {
    fn from(err: ServiceError) -> Self {
        HandlerError::new(err.status(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_status_codes() {
        let test_cases = vec![
            (
                ServiceError::NotFound {
                    entity: "user",
                    key: "999".to_string(),
                },
                404,
            ),
            (ServiceError::missing("id"), 400),
            (
                ServiceError::Store {
                    operation: "insert".to_string(),
                    details: "disk I/O error".to_string(),
                },
                500,
            ),
            (
                ServiceError::Unavailable {
                    details: "pool is closed".to_string(),
                },
                503,
            ),
        ];

        for (error, expected) in test_cases {
            assert_eq!(error.status(), expected, "status for {:?}", error);
            let handler_error: HandlerError = error.into();
            assert_eq!(handler_error.status, expected);
        }
    }

    #[test]
    fn test_store_error_conversion() {
        let err: ServiceError = StoreError::not_found("user", 999).into();
        assert!(matches!(err, ServiceError::NotFound { entity: "user", .. }));
        assert_eq!(err.to_string(), "user '999' not found");

        let err: ServiceError = StoreError::Backend {
            operation: "update".to_string(),
            details: "locked".to_string(),
        }
        .into();
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_validation_display() {
        let err = ServiceError::missing("email");
        assert_eq!(err.to_string(), "Validation error for 'email': is required");
    }

    #[test]
    fn test_pool_error_is_unavailable() {
        let err: ServiceError = PoolError::Closed.into();
        assert_eq!(err.status(), 503);
    }
}
