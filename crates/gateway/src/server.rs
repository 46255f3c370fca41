// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the main server struct and its lifecycle:
//! `Starting` until the listener is bound, `Serving` until an interrupt arrives,
//! `ShuttingDown` while in-flight requests drain under a deadline, then
//! `Stopped`. A bind failure ends the lifecycle before it starts serving.

use std::{
    fmt,
    future::{IntoFuture, pending},
    io,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    http::{HeaderName, Request},
    middleware::from_fn,
};
use identity_client::IdentityClient;
use sts_client::StsClient;
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::timeout,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, error, info, info_span, warn};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    middleware::request_logging_middleware,
    routes::create_routes,
    state::ServerState,
};

// Server constants
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time in-flight requests get to finish once shutdown starts
    pub graceful_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

impl From<&ServerConfig> for ShutdownConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            graceful_timeout: config.shutdown_timeout_seconds.value(),
        }
    }
}

/// Lifecycle phase of a [`Server`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, listener not yet bound
    Starting,
    /// Accepting connections
    Serving,
    /// No longer accepting, draining in-flight requests
    ShuttingDown,
    /// Terminated
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Serving => write!(f, "serving"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// What triggered a shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// [`ShutdownHandle::shutdown`]
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Requested => write!(f, "requested"),
        }
    }
}

/// How serving ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished before the deadline
    Drained,
    /// The deadline passed with requests still in flight
    DeadlineExceeded,
    /// The server reported an error while shutting down
    Failed {
        /// Error message
        message: String,
    },
}

/// Requests a graceful shutdown of a running [`Server`]
///
/// Only the first request has an effect. The channel holds a single pending
/// reason and later requests are dropped.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: mpsc::Sender<ShutdownReason>,
}

impl ShutdownHandle {
    /// Begin graceful shutdown
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.trigger(ShutdownReason::Requested);
    }

    fn trigger(&self, reason: ShutdownReason) {
        match self.sender.try_send(reason) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(reason = %reason, "shutdown already pending, ignoring");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(reason = %reason, "server already shut down, ignoring");
            }
        }
    }
}

/// Main server struct
#[derive(Debug)]
pub struct Server {
    /// Server configuration
    config: ServerConfig,
    /// Application router
    router: Router,
    /// Configuration for graceful shutdown
    shutdown_config: ShutdownConfig,
    /// Sender side of the single-slot shutdown channel
    shutdown_tx: mpsc::Sender<ShutdownReason>,
    /// Receiver side, consumed when serving starts
    shutdown_rx: mpsc::Receiver<ShutdownReason>,
    /// Current lifecycle phase
    lifecycle: Arc<watch::Sender<LifecycleState>>,
}

impl Server {
    /// Create a server backed by the STS identity client
    ///
    /// Loads the AWS environment (region, credential providers) once. A client
    /// that cannot be built does not stop the server. The error is kept and
    /// returned as an error envelope by every `/identity` request.
    pub async fn new(config: ServerConfig, shutdown_config: ShutdownConfig) -> Self {
        let client = StsClient::new(config.identity.sts_config()).await;
        if let Err(e) = &client {
            warn!(error = %e, "identity client could not be constructed");
        }
        Self::from_parts(config, shutdown_config, client)
    }

    /// Create server with a custom identity client for dependency injection
    pub fn with_identity_client<C>(
        config: ServerConfig,
        shutdown_config: ShutdownConfig,
        client: C,
    ) -> Self
    where
        C: IdentityClient + 'static,
    {
        Self::from_parts(config, shutdown_config, Ok(client))
    }

    fn from_parts<C>(
        config: ServerConfig,
        shutdown_config: ShutdownConfig,
        client: Result<C, identity_client::IdentityError>,
    ) -> Self
    where
        C: IdentityClient + 'static,
    {
        let state = ServerState::new(client);
        let router = Self::create_router(state);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (lifecycle, _) = watch::channel(LifecycleState::Starting);

        Self {
            config,
            router,
            shutdown_config,
            shutdown_tx,
            shutdown_rx,
            lifecycle: Arc::new(lifecycle),
        }
    }

    /// Create application router with middleware
    ///
    /// The request logging middleware is outermost, so its record covers the
    /// whole stack and a panic anywhere below it is recovered. Trace events stay
    /// at debug so the access record is the only info line per request.
    fn create_router<C>(state: ServerState<C>) -> Router
    where
        C: IdentityClient + 'static,
    {
        let middleware = ServiceBuilder::new()
            .layer(from_fn(request_logging_middleware))
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request<_>| {
                        if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                            info_span!("http_request", ?request_id)
                        } else {
                            error!("failed to extract id from request");
                            info_span!("http_request", request_id = "unknown")
                        }
                    })
                    .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG))
                    .on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER));

        create_routes::<C>().layer(middleware).with_state(state)
    }

    /// Run the server until an interrupt or termination signal drains it
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or `ServerError::Startup` if the bound address cannot be read. Problems
    /// during shutdown are logged and reported through [`ShutdownOutcome`].
    pub async fn run(self) -> ServerResult<ShutdownOutcome> {
        let listener = self.bind().await?;

        let signal_handle = self.shutdown_handle();
        tokio::spawn(async move {
            info!("spawning the graceful shutdown task");
            Self::shutdown_signal_handler(signal_handle).await;
        });

        self.serve(listener).await
    }

    /// Bind the listener and enter `Serving`, or `Stopped` on failure
    async fn bind(&self) -> ServerResult<TcpListener> {
        let addr = self.config.socket_addr();
        let bound = match TcpListener::bind(&addr).await {
            Ok(listener) => listener
                .local_addr()
                .map(|actual| (listener, actual))
                .map_err(|source| ServerError::Startup { source }),
            Err(source) => Err(ServerError::Bind {
                address: addr,
                source,
            }),
        };

        match bound {
            Ok((listener, actual_addr)) => {
                self.lifecycle.send_replace(LifecycleState::Serving);
                info!(
                    address = %actual_addr,
                    environment = %self.config.environment,
                    "identity gateway serving",
                );
                Ok(listener)
            }
            Err(e) => {
                self.lifecycle.send_replace(LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    /// Serve on a bound listener until shutdown completes
    async fn serve(self, listener: TcpListener) -> ServerResult<ShutdownOutcome> {
        let Self {
            router,
            shutdown_config,
            mut shutdown_rx,
            lifecycle,
            ..
        } = self;

        let graceful_timeout = shutdown_config.graceful_timeout;
        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let signal_lifecycle = Arc::clone(&lifecycle);
        let shutdown_signal = async move {
            // All handles dropped means nobody can ask for shutdown any more
            let reason = match shutdown_rx.recv().await {
                Some(reason) => reason,
                None => pending::<ShutdownReason>().await,
            };
            warn!(
                reason = %reason,
                deadline_seconds = graceful_timeout.as_secs_f64(),
                "shutdown requested, draining in-flight requests"
            );
            signal_lifecycle.send_replace(LifecycleState::ShuttingDown);
            let _ = drain_tx.send(());
        };

        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .into_future();
        tokio::pin!(serve);

        let outcome = tokio::select! {
            biased;
            result = &mut serve => Self::outcome(result),
            Ok(()) = drain_rx => {
                match timeout(graceful_timeout, &mut serve).await {
                    Ok(result) => Self::outcome(result),
                    Err(_) => {
                        warn!(
                            deadline_seconds = graceful_timeout.as_secs_f64(),
                            "in-flight requests did not finish before the shutdown deadline"
                        );
                        ShutdownOutcome::DeadlineExceeded
                    }
                }
            }
        };

        lifecycle.send_replace(LifecycleState::Stopped);
        info!(outcome = ?outcome, "identity gateway stopped");
        Ok(outcome)
    }

    fn outcome(result: io::Result<()>) -> ShutdownOutcome {
        match result {
            Ok(()) => {
                info!("identity gateway shut down gracefully");
                ShutdownOutcome::Drained
            }
            Err(e) => {
                error!(error = ?e, "server error during shutdown");
                ShutdownOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Forward the first SIGINT or SIGTERM to the shutdown channel
    async fn shutdown_signal_handler(handle: ShutdownHandle) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                    (Err(e), _) | (_, Err(e)) => {
                        error!(error = %e, "failed to register shutdown signal handlers");
                        return;
                    }
                };

            let reason = tokio::select! {
                _ = sigterm.recv() => ShutdownReason::Terminate,
                _ = sigint.recv() => ShutdownReason::Interrupt,
            };
            warn!("Received {reason} signal, initiating graceful shutdown");
            handle.trigger(reason);
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Received CTRL+C signal, initiating graceful shutdown");
                    handle.trigger(ShutdownReason::Interrupt);
                }
                Err(e) => error!(error = %e, "failed to install CTRL+C signal handler"),
            }
        }
    }

    /// Handle that begins graceful shutdown when triggered
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.shutdown_tx.clone(),
        }
    }

    /// Watch the lifecycle phase
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Run server for testing without OS signal handling
    ///
    /// Returns the bound address, a handle that starts graceful shutdown, and
    /// the serving task, which resolves to the shutdown outcome.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address.
    pub async fn run_for_testing(
        self,
    ) -> ServerResult<(
        SocketAddr,
        ShutdownHandle,
        JoinHandle<ServerResult<ShutdownOutcome>>,
    )> {
        let listener = self.bind().await?;
        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let handle = self.shutdown_handle();
        let task = tokio::spawn(self.serve(listener));

        Ok((actual_addr, handle, task))
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Application router, for driving requests in-process
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
