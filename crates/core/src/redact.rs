// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-wise masking of known secret values.
//!
//! The redactor sits in front of every user-visible surface: structured
//! event payloads, envelopes, and log output. It only ever does exact
//! substring replacement of values it was told about; it never guesses at
//! secret-shaped strings.

use std::collections::HashMap;

/// The fixed token substituted for every recognised secret value.
pub const MASK: &str = "***";

/// Env var names whose values are treated as credentials.
const RECOGNISED_ENV_NAMES: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "OPENCODE_API_KEY",
    "ZAI_API_KEY",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "GITLAB_TOKEN",
    "AWS_SECRET_ACCESS_KEY",
    "AZURE_OPENAI_API_KEY",
    "WEBHOOK_TOKEN",
];

/// Masks known secret values in text.
///
/// Replacement is case-sensitive and longest-first so that a short secret
/// that happens to be a substring of a longer one cannot shadow it and
/// leave a recognisable fragment behind. Idempotent: redacting redacted
/// text is a no-op.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    values: Vec<String>,
}

impl Redactor {
    /// A redactor with no baseline values. Extra values can still be passed
    /// per call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect credential values from a run environment map.
    ///
    /// Values of recognised env var names are captured; everything else is
    /// ignored. Empty values are dropped — replacing the empty string would
    /// corrupt the text.
    pub fn with_env(env: &HashMap<String, String>) -> Self {
        let mut values: Vec<String> = env
            .iter()
            .filter(|(name, _)| RECOGNISED_ENV_NAMES.contains(&name.as_str()))
            .map(|(_, value)| value.clone())
            .filter(|v| !v.is_empty())
            .collect();
        values.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { values }
    }

    /// Register an additional secret value.
    pub fn add_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.values.push(value);
        self.values.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    /// Replace every occurrence of each known secret value with [`MASK`].
    ///
    /// `extra_values` augments the baseline set for this call only (e.g.
    /// values decrypted at dispatch time that must not persist on the
    /// redactor).
    pub fn redact(&self, text: &str, extra_values: &[&str]) -> String {
        if self.values.is_empty() && extra_values.is_empty() {
            return text.to_string();
        }
        let mut all: Vec<&str> = self
            .values
            .iter()
            .map(String::as_str)
            .chain(extra_values.iter().copied())
            .filter(|v| !v.is_empty())
            .collect();
        all.sort_by(|a, b| b.len().cmp(&a.len()));
        all.dedup();

        let mut out = text.to_string();
        for value in all {
            if out.contains(value) {
                out = out.replace(value, MASK);
            }
        }
        out
    }

    /// Redact the values of an env map for log output. Keys pass through
    /// unchanged; recognised credential values and any known secret values
    /// are masked.
    pub fn redact_env(&self, env: &HashMap<String, String>) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = env
            .iter()
            .map(|(k, v)| {
                if RECOGNISED_ENV_NAMES.contains(&k.as_str()) && !v.is_empty() {
                    (k.clone(), MASK.to_string())
                } else {
                    (k.clone(), self.redact(v, &[]))
                }
            })
            .collect();
        out.sort();
        out
    }

    /// Number of known secret values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
