// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! STS `GetCallerIdentity` client

use std::time::Duration;

use aws_config::{BehaviorVersion, Region, meta::region::RegionProviderChain};
use aws_sdk_sts::{
    Client,
    config::{Builder, retry::RetryConfig, timeout::TimeoutConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::get_caller_identity::{GetCallerIdentityError, GetCallerIdentityOutput},
};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use identity_client::{CallerIdentity, ClientLogLevel, IdentityClient, IdentityError};
use tracing::{debug, error, trace};
use url::Url;

/// Tracing target for client diagnostics
const LOG_TARGET: &str = "identity_client";
/// Region used when neither the configuration nor the environment names one
pub const DEFAULT_REGION: &str = "us-east-1";
const RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const UNKNOWN_ERROR_CODE: &str = "Unknown";

/// Configuration for the STS client
#[derive(Debug, Clone)]
pub struct StsConfig {
    /// Endpoint override, e.g. a local emulator. `None` uses the regional AWS endpoint
    pub endpoint: Option<String>,
    /// Signing region. `None` resolves it from the environment, then [`DEFAULT_REGION`]
    pub region: Option<String>,
    /// Per-attempt timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Client diagnostic verbosity
    pub log_level: ClientLogLevel,
}

impl Default for StsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: None,
            timeout_seconds: 10,
            max_retries: 1,
            log_level: ClientLogLevel::Off,
        }
    }
}

impl StsConfig {
    /// Check the values the SDK does not validate itself
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Configuration`] if the endpoint override is not
    /// an http(s) URL or the timeout is zero
    pub fn validate(&self) -> Result<Option<Url>, IdentityError> {
        if self.timeout_seconds == 0 {
            return Err(IdentityError::Configuration {
                message: "timeout must be greater than 0".to_string(),
            });
        }

        let Some(endpoint) = &self.endpoint else {
            return Ok(None);
        };

        if endpoint.trim().is_empty() {
            return Err(IdentityError::Configuration {
                message: "endpoint cannot be empty".to_string(),
            });
        }

        let url = Url::parse(endpoint.trim()).map_err(|e| IdentityError::Configuration {
            message: format!("invalid endpoint {endpoint}: {e}"),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(IdentityError::Configuration {
                message: format!("unsupported endpoint scheme: {}", url.scheme()),
            });
        }

        Ok(Some(url))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// STS client implementation
///
/// Requests are signed with credentials from the standard AWS provider chain
/// (environment, shared profile, web identity, container and instance metadata).
#[derive(Debug)]
pub struct StsClient {
    client: Client,
    config: StsConfig,
}

impl StsClient {
    /// Create a new STS client from the ambient AWS environment
    ///
    /// Credentials are resolved lazily on the first call, so a missing
    /// credential source surfaces as a per-request error.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Configuration`] if `config` fails
    /// [`StsConfig::validate`]
    pub async fn new(config: StsConfig) -> Result<Self, IdentityError> {
        config.validate()?;

        let region = match &config.region {
            Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
            None => RegionProviderChain::default_provider().or_else(DEFAULT_REGION),
        };
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        Self::with_sdk_config(Builder::from(&shared), config)
    }

    /// Create a client on top of an existing SDK configuration
    ///
    /// Retry, timeout and endpoint settings from `config` override those in
    /// `builder`. Credentials and region are taken from `builder` as is.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Configuration`] if `config` fails
    /// [`StsConfig::validate`]
    pub fn with_sdk_config(builder: Builder, config: StsConfig) -> Result<Self, IdentityError> {
        let endpoint = config.validate()?;

        let mut builder = builder
            .retry_config(
                RetryConfig::standard()
                    .with_max_attempts(config.max_retries.saturating_add(1))
                    .with_initial_backoff(RETRY_INITIAL_BACKOFF),
            )
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(config.timeout())
                    .build(),
            );
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint.as_str().trim_end_matches('/'));
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            config,
        })
    }

    fn identity_from_output(output: &GetCallerIdentityOutput) -> CallerIdentity {
        CallerIdentity {
            account: output.account().map(str::to_string),
            arn: output.arn().map(str::to_string),
            user_id: output.user_id().map(str::to_string),
        }
    }

    /// Translate an SDK failure into the client-neutral error
    fn map_sdk_error(&self, error: &SdkError<GetCallerIdentityError, HttpResponse>) -> IdentityError {
        let timeout = IdentityError::Timeout {
            timeout_seconds: self.config.timeout_seconds,
        };
        match error {
            SdkError::TimeoutError(_) => timeout,
            SdkError::DispatchFailure(failure) if failure.is_timeout() => timeout,
            SdkError::ServiceError(context) => {
                let status = context.raw().status();
                if status.is_success() {
                    return IdentityError::InvalidResponse {
                        message: DisplayErrorContext(error).to_string(),
                    };
                }
                service_error(status.as_u16(), context.err().code(), context.err().message())
            }
            SdkError::ResponseError(_) => IdentityError::InvalidResponse {
                message: DisplayErrorContext(error).to_string(),
            },
            SdkError::ConstructionFailure(_) => IdentityError::Configuration {
                message: DisplayErrorContext(error).to_string(),
            },
            _ => IdentityError::Http {
                message: DisplayErrorContext(error).to_string(),
            },
        }
    }
}

/// Build a service error from the parts of an error document
///
/// A missing code becomes `Unknown`. A missing message falls back to the code,
/// and to the status when both are missing.
fn service_error(status: u16, code: Option<&str>, message: Option<&str>) -> IdentityError {
    let code = code.filter(|c| !c.trim().is_empty());
    let message = message
        .filter(|m| !m.trim().is_empty())
        .or(code)
        .map_or_else(
            || format!("identity service returned status {status}"),
            str::to_string,
        );

    IdentityError::Service {
        code: code.unwrap_or(UNKNOWN_ERROR_CODE).to_string(),
        message,
        status,
    }
}

impl IdentityClient for StsClient {
    async fn get_caller_identity(&self) -> Result<CallerIdentity, IdentityError> {
        let level = self.config.log_level;
        if level.allows(ClientLogLevel::Debug) {
            debug!(
                target: LOG_TARGET,
                region = ?self.client.config().region(),
                max_retries = self.config.max_retries,
                "sending GetCallerIdentity"
            );
        }

        let result = self.client.get_caller_identity().send().await;

        match result {
            Ok(output) => {
                if level.allows(ClientLogLevel::Trace) {
                    trace!(target: LOG_TARGET, ?output, "received GetCallerIdentity response");
                }
                Ok(Self::identity_from_output(&output))
            }
            Err(sdk_error) => {
                let e = self.map_sdk_error(&sdk_error);
                if level.allows(ClientLogLevel::Error) {
                    error!(
                        target: LOG_TARGET,
                        code = e.code(),
                        retryable = e.is_retryable(),
                        error = %DisplayErrorContext(&sdk_error),
                        "GetCallerIdentity failed"
                    );
                }
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "sts"
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_sts::config::Credentials;

    use super::*;

    fn offline_builder() -> Builder {
        Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(DEFAULT_REGION))
            .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
    }

    #[test]
    fn sts_client_creation_success() {
        let client = StsClient::with_sdk_config(offline_builder(), StsConfig::default());
        assert!(client.is_ok());
        assert_eq!(client.unwrap().name(), "sts");
    }

    #[test]
    fn default_config_uses_aws_endpoint() {
        assert_eq!(StsConfig::default().validate().unwrap(), None);
    }

    #[test]
    fn sts_client_creation_empty_endpoint() {
        let config = StsConfig {
            endpoint: Some("  ".to_string()),
            ..Default::default()
        };

        let err = StsClient::with_sdk_config(offline_builder(), config).unwrap_err();
        assert!(matches!(err, IdentityError::Configuration { .. }));
        assert_eq!(err.to_string(), "Configuration error: endpoint cannot be empty");
    }

    #[test]
    fn sts_client_creation_rejects_non_http_scheme() {
        let config = StsConfig {
            endpoint: Some("ftp://sts.example.com".to_string()),
            ..Default::default()
        };

        let err = StsClient::with_sdk_config(offline_builder(), config).unwrap_err();
        assert!(err.to_string().contains("unsupported endpoint scheme"));
    }

    #[test]
    fn sts_client_creation_rejects_zero_timeout() {
        let config = StsConfig {
            timeout_seconds: 0,
            ..Default::default()
        };

        assert!(StsClient::with_sdk_config(offline_builder(), config).is_err());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_loading_environment() {
        let config = StsConfig {
            endpoint: Some("not a url".to_string()),
            ..Default::default()
        };

        let err = StsClient::new(config).await.unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: invalid endpoint"));
    }

    #[test]
    fn service_error_with_code_and_message() {
        let err = service_error(403, Some("AccessDenied"), Some("access denied"));
        match err {
            IdentityError::Service {
                code,
                message,
                status,
            } => {
                assert_eq!(code, "AccessDenied");
                assert_eq!(message, "access denied");
                assert_eq!(status, 403);
            }
            other => panic!("Expected Service error, got: {other:?}"),
        }
    }

    #[test]
    fn service_error_without_message_uses_code() {
        let err = service_error(403, Some("ExpiredToken"), None);
        assert_eq!(err.to_string(), "ExpiredToken");
        assert_eq!(err.code(), "ExpiredToken");
    }

    #[test]
    fn service_error_without_document() {
        let err = service_error(502, None, Some(" "));
        assert_eq!(err.to_string(), "identity service returned status 502");
        assert_eq!(err.code(), "Unknown");
        assert!(err.is_retryable());
    }
}
