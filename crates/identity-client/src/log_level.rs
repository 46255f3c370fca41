// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic verbosity for identity clients
//!
//! The level is a plain configuration value. It is resolved once at startup and
//! passed to the client constructor, so two clients in one process may log at
//! different levels.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, de};
use thiserror::Error;

/// Bit marking debug logging in the numeric level format
const DEBUG_FLAG: u32 = 0x1000;

/// How much an identity client reports about its own requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientLogLevel {
    /// No client diagnostics
    #[default]
    Off,
    /// Failed requests only
    Error,
    /// Requests, retries and failures
    Debug,
    /// Everything at debug plus response bodies
    Trace,
}

/// Error returned when a log level string is not recognised
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised client log level: {0}")]
pub struct ParseLogLevelError(String);

impl ClientLogLevel {
    /// Resolve a level from an optional environment value
    ///
    /// Absent, empty and unrecognised values all resolve to [`ClientLogLevel::Off`].
    pub fn from_env_value(value: Option<&str>) -> Self {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// Map the numeric bitmask form onto a level
    ///
    /// Zero is off. The debug bit enables debug, and any detail flag set next to
    /// it raises the level to trace. Values without the debug bit log nothing.
    pub fn from_bits(bits: u32) -> Self {
        if bits & DEBUG_FLAG == 0 {
            Self::Off
        } else if bits & !DEBUG_FLAG == 0 {
            Self::Debug
        } else {
            Self::Trace
        }
    }

    /// Whether a diagnostic at `level` should be emitted
    pub fn allows(self, level: Self) -> bool {
        level != Self::Off && self >= level
    }
}

impl FromStr for ClientLogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(bits) = s.parse::<u32>() {
            return Ok(Self::from_bits(bits));
        }

        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl fmt::Display for ClientLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Error => write!(f, "error"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

impl<'de> Deserialize<'de> for ClientLogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bits(u32),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bits(bits) => Ok(Self::from_bits(bits)),
            Raw::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}
