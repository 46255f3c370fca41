// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Caller identity client abstractions
//!
//! This crate provides the interface the gateway uses to ask an external identity
//! service "who am I?", independent of the wire protocol behind it.
//!
//! # Core Abstractions
//!
//! - **`IdentityClient` Trait**: the single `get_caller_identity` operation
//! - **Error Handling**: [`IdentityError`] with a service-defined failure code
//! - **Data Types**: [`CallerIdentity`], passed through to callers unmodified
//! - **Diagnostics**: [`ClientLogLevel`], an explicit verbosity value handed to
//!   client constructors instead of process-wide logging state

use std::future::Future;

use thiserror::Error;

pub mod log_level;
pub mod types;

pub use log_level::ClientLogLevel;
pub use types::CallerIdentity;

/// Interface to an external caller identity service
///
/// Implementations own credential resolution, retries and the wire protocol.
/// Callers only see the resulting identity or an [`IdentityError`].
pub trait IdentityClient: Send + Sync {
    /// Return the identity the service associates with this client's credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the request, cannot be reached,
    /// or answers with something that is not an identity document
    fn get_caller_identity(
        &self,
    ) -> impl Future<Output = Result<CallerIdentity, IdentityError>> + Send;

    /// Get the name/identifier of this client
    fn name(&self) -> &'static str;
}

/// Errors surfaced by identity clients
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum IdentityError {
    /// The service answered with an error document
    #[error("{message}")]
    Service {
        code: String,
        message: String,
        status: u16,
    },

    /// HTTP transport failed before a response was received
    #[error("HTTP request failed: {message}")]
    Http { message: String },

    /// Service did not answer within the configured timeout
    #[error("Request timeout after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Response could not be decoded
    #[error("Invalid response format: {message}")]
    InvalidResponse { message: String },

    /// Client could not be constructed from its configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl IdentityError {
    /// Failure code distinguishing this error
    ///
    /// Service errors report the code the service sent. Local failures report a
    /// fixed code per failure class.
    pub fn code(&self) -> &str {
        match self {
            Self::Service { code, .. } => code,
            Self::Http { .. } => "RequestError",
            Self::Timeout { .. } => "RequestTimeout",
            Self::InvalidResponse { .. } => "SerializationError",
            Self::Configuration { .. } => "ConfigurationError",
        }
    }

    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout { .. } => true,
            Self::Service { code, status, .. } => {
                *status >= 500 || code == "Throttling" || code == "ThrottlingException"
            }
            Self::InvalidResponse { .. } | Self::Configuration { .. } => false,
        }
    }
}
