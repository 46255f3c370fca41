// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Identity Gateway
//!
//! A minimal HTTP gateway that answers a liveness probe and relays the caller
//! identity reported by an external identity service, built with Axum.
//!
//! # Module Structure
//!
//! - [`config`]: Server configuration and environment management with hierarchical loading
//! - [`error`]: Server and handler errors, and the JSON error envelope
//! - [`state`]: Shared application state holding the identity client
//! - [`server`]: Main server implementation, lifecycle, and graceful shutdown
//! - [`routes`]: Route configuration and HTTP request handlers
//! - [`middleware`]: Per-request access logging and panic recovery
//!
//! # Endpoints
//!
//! - `/` (and any unmatched path): `200 WORKING`
//! - `/identity`: the caller identity as JSON, or `{"error": "..."}` with 500

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{Environment, IdentityConfig, ServerConfig};
pub use error::{ErrorEnvelope, HandlerError, ServerError, ServerResult};
pub use middleware::{ResponseCapture, RequestLogRecord};
pub use server::{
    LifecycleState, Server, ShutdownConfig, ShutdownHandle, ShutdownOutcome, ShutdownReason,
};
pub use state::ServerState;
