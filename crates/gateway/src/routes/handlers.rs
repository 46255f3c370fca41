// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP request handlers

use axum::{
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use identity_client::IdentityClient;
use tracing::debug;

use crate::{error::HandlerError, state::ServerState};

/// Body of every liveness response
pub const LIVENESS_BODY: &str = "WORKING";

/// Liveness probe
pub async fn liveness_handler() -> &'static str {
    LIVENESS_BODY
}

/// Caller identity passthrough
///
/// Asks the identity service who the gateway is and relays the answer as JSON.
/// Any failure becomes an error envelope.
pub async fn identity_handler<C>(
    State(state): State<ServerState<C>>,
) -> Result<Response, HandlerError>
where
    C: IdentityClient,
{
    let client = state.identity_client()?;
    let identity = client.get_caller_identity().await?;
    debug!(client = client.name(), account = ?identity.account, "caller identity resolved");

    let body = serde_json::to_vec(&identity)?;
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )],
        body,
    )
        .into_response())
}
