// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider secrets attached to a repository.

use crate::repo::RepoId;
use serde::{Deserialize, Serialize};

/// An encrypted credential scoped to one repository and provider.
///
/// The store only ever sees the encrypted value; decryption happens at
/// dispatch time and the plaintext is handed to the redactor before the
/// envelope is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSecret {
    pub repo_id: RepoId,
    /// Provider tag, e.g. "openai", "anthropic", "webhook-token".
    pub provider: String,
    pub encrypted_value: String,
    pub updated_at_ms: u64,
}

impl ProviderSecret {
    /// The provider tag that holds the repository's webhook token.
    pub const WEBHOOK_TOKEN_PROVIDER: &'static str = "webhook-token";
}
