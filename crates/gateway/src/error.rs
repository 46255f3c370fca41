// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! Server lifecycle errors, request handler errors, and the JSON error envelope
//! every failed request is answered with.

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use identity_client::IdentityError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Message used when an error renders to an empty string
const FALLBACK_ERROR_MESSAGE: &str = "internal server error";

/// Errors that stop the server from starting or running
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors produced while answering a request
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The identity client failed, or could not be built at startup
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A response body could not be encoded
    #[error("failed to encode response: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A handler panicked and the panic was recovered
    #[error("internal server error")]
    Panic,
}

impl HandlerError {
    /// HTTP status the envelope for this error is sent with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Identity(_) | Self::Serialization(_) | Self::Panic => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        map_error(&self).into_response_with_status(status)
    }
}

/// Body of every error response: `{"error":"<message>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable failure message, never empty
    pub error: String,
}

impl ErrorEnvelope {
    /// Wrap a message, substituting a generic one when it is blank
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self {
                error: FALLBACK_ERROR_MESSAGE.to_string(),
            }
        } else {
            Self { error: message }
        }
    }

    /// Envelope carrying an error's display text
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Self::new(error.to_string())
    }

    /// Render the envelope as a JSON response with the given status
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Translate a handler error into the envelope sent to the caller
///
/// Identity service failures carry a code next to their message. Every code
/// currently maps to the service message, so this is the single place to
/// special-case one.
pub fn map_error(error: &HandlerError) -> ErrorEnvelope {
    match error {
        HandlerError::Identity(identity) => {
            debug!(code = identity.code(), "mapping identity service error");
            ErrorEnvelope::from_error(identity)
        }
        HandlerError::Serialization(_) | HandlerError::Panic => ErrorEnvelope::from_error(error),
    }
}
