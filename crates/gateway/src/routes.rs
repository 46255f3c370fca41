// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! This module provides route configuration and handlers for the identity gateway.

pub mod handlers;

use axum::{Router, routing::any};
use handlers::{identity_handler, liveness_handler};
use identity_client::IdentityClient;

use crate::state::ServerState;

/// Path of the caller identity endpoint
pub const IDENTITY_PATH: &str = "/identity";

/// Create application routes
///
/// Both endpoints answer every method. Paths other than `/identity` fall back
/// to the liveness probe.
pub fn create_routes<C>() -> Router<ServerState<C>>
where
    C: IdentityClient + 'static,
{
    Router::new()
        .route("/", any(liveness_handler))
        .route(IDENTITY_PATH, any(identity_handler::<C>))
        .fallback(liveness_handler)
}
