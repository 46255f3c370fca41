// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared application state
//!
//! The identity client is built once at startup. If construction failed the
//! error is kept here and reported by every request that needs the client.

use std::sync::Arc;

use identity_client::IdentityError;

use crate::error::HandlerError;

/// Shared application state
#[derive(Debug)]
pub struct ServerState<C> {
    identity: Arc<Result<C, IdentityError>>,
}

// Manual impl: cloning shares the client and does not require `C: Clone`
impl<C> Clone for ServerState<C> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
        }
    }
}

impl<C> ServerState<C> {
    /// Create new server state
    ///
    /// # Arguments
    ///
    /// * `identity` - The identity client, or the error that prevented building it
    pub fn new(identity: Result<C, IdentityError>) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }

    /// The identity client
    ///
    /// # Errors
    ///
    /// Returns the construction error as a [`HandlerError::Identity`], so it is
    /// answered exactly like a failed identity call.
    pub fn identity_client(&self) -> Result<&C, HandlerError> {
        self.identity
            .as_ref()
            .as_ref()
            .map_err(|e| HandlerError::Identity(e.clone()))
    }
}
