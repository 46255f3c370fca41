// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

//! Test fixtures for the gateway
//!
//! A scripted identity client and helpers for starting a gateway on an
//! ephemeral port.

use std::{net::SocketAddr, time::Duration};

use gateway::{
    Server, ServerConfig, ServerResult, ShutdownConfig, ShutdownHandle, ShutdownOutcome,
};
use identity_client::{CallerIdentity, IdentityClient, IdentityError};
use tokio::task::JoinHandle;

/// What the mock does once its delay has passed
#[derive(Debug, Clone)]
enum Outcome {
    Answer(Result<CallerIdentity, IdentityError>),
    Panic(&'static str),
}

/// Identity client answering with a fixed result after an optional delay
#[derive(Debug, Clone)]
pub struct MockIdentityClient {
    outcome: Outcome,
    delay: Duration,
}

impl MockIdentityClient {
    /// Client that always resolves to `identity`
    pub fn succeeding(identity: CallerIdentity) -> Self {
        Self {
            outcome: Outcome::Answer(Ok(identity)),
            delay: Duration::ZERO,
        }
    }

    /// Client that always fails with `error`
    pub fn failing(error: IdentityError) -> Self {
        Self {
            outcome: Outcome::Answer(Err(error)),
            delay: Duration::ZERO,
        }
    }

    /// Client whose every call panics with `message`
    pub fn panicking(message: &'static str) -> Self {
        Self {
            outcome: Outcome::Panic(message),
            delay: Duration::ZERO,
        }
    }

    /// Wait `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl IdentityClient for MockIdentityClient {
    #[allow(clippy::panic)]
    async fn get_caller_identity(&self) -> Result<CallerIdentity, IdentityError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.outcome {
            Outcome::Answer(result) => result.clone(),
            Outcome::Panic(message) => panic!("{message}"),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Identity returned by the happy-path mock
pub fn sample_identity() -> CallerIdentity {
    CallerIdentity::new(
        "123456789012",
        "arn:aws:iam::123456789012:user/alice",
        "AIDAEXAMPLE",
    )
}

/// Service-side rejection with the given message
pub fn access_denied(message: &str) -> IdentityError {
    IdentityError::Service {
        code: "AccessDenied".to_string(),
        message: message.to_string(),
        status: 403,
    }
}

/// A running test gateway
pub type RunningGateway = (
    SocketAddr,
    ShutdownHandle,
    JoinHandle<ServerResult<ShutdownOutcome>>,
);

/// Start a gateway on an ephemeral port backed by `client`
pub async fn start_gateway(client: MockIdentityClient) -> RunningGateway {
    start_gateway_with(client, ShutdownConfig::default()).await
}

/// Start a gateway with a custom shutdown configuration
pub async fn start_gateway_with(
    client: MockIdentityClient,
    shutdown_config: ShutdownConfig,
) -> RunningGateway {
    Server::with_identity_client(ServerConfig::for_testing(), shutdown_config, client)
        .run_for_testing()
        .await
        .expect("Failed to start test server")
}
