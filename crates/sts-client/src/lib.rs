// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Caller identity client backed by the AWS STS SDK
//!
//! This crate implements [`identity_client::IdentityClient`] with
//! `aws-sdk-sts`. Requests are signed with credentials from the standard AWS
//! provider chain, so the gateway reports the identity of whatever role or user
//! the process runs as.
//!
//! # Features
//!
//! - **Bounded Retries**: the SDK's standard retry strategy, capped at
//!   `max_retries` retries after the first attempt
//! - **Explicit Diagnostics**: client logging is driven by the
//!   [`identity_client::ClientLogLevel`] in [`StsConfig`], not global state
//! - **Error Codes**: service error documents surface as
//!   [`identity_client::IdentityError::Service`] with the service's code
//! - **Endpoint Override**: an optional endpoint URL for emulators and VPC
//!   endpoints

pub mod client;

pub use client::*;
