// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Identity data returned by identity services

use serde::{Deserialize, Serialize};

/// Identity of the caller as reported by the identity service
///
/// Field names follow the service's own document (`Account`, `Arn`, `UserId`) so
/// the structure can be handed to HTTP callers unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    /// Account that owns the calling credentials
    pub account: Option<String>,
    /// Resource name of the calling principal
    pub arn: Option<String>,
    /// Unique identifier of the calling principal
    pub user_id: Option<String>,
}

impl CallerIdentity {
    /// Create an identity with every field present
    pub fn new(
        account: impl Into<String>,
        arn: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            account: Some(account.into()),
            arn: Some(arn.into()),
            user_id: Some(user_id.into()),
        }
    }
}
