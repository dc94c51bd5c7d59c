// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The harness result envelope.
//!
//! Every harness is expected to end its stdout with one JSON object
//! describing the outcome. Harnesses that predate the contract emit plain
//! text; for those the runtime synthesises an envelope from the captured
//! streams and exit code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome tag of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeStatus {
    Succeeded,
    Failed,
    Cancelled,
    PendingApproval,
}

agd_core::simple_display! {
    EnvelopeStatus {
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
        PendingApproval => "pending-approval",
    }
}

/// The terminal JSON object a harness emits describing its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Envelope {
    /// Scan harness stdout for the last well-formed envelope object.
    ///
    /// The scan is line-wise from the end so trailing log noise after the
    /// envelope does not defeat it. A line must parse as a JSON object with
    /// a recognised `status` tag to count.
    pub fn parse(stdout: &str) -> Option<Self> {
        for line in stdout.lines().rev() {
            let trimmed = line.trim();
            if !trimmed.starts_with('{') {
                continue;
            }
            if let Ok(envelope) = serde_json::from_str::<Envelope>(trimmed) {
                return Some(envelope);
            }
        }
        None
    }

    /// Wrap non-JSON harness output into a synthetic envelope.
    ///
    /// `status` is succeeded exactly when the exit code is zero. Stdout
    /// becomes the summary, stderr the error text; both are truncated to
    /// keep stored runs bounded.
    pub fn synthesize(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        const CAP: usize = 8 * 1024;
        let status = if exit_code == 0 { EnvelopeStatus::Succeeded } else { EnvelopeStatus::Failed };
        let mut metadata = HashMap::new();
        metadata.insert("exit_code".to_string(), exit_code.to_string());
        metadata.insert("synthetic".to_string(), "true".to_string());
        Self {
            status,
            summary: truncate(stdout.trim(), CAP),
            error: if exit_code == 0 { String::new() } else { truncate(stderr.trim(), CAP) },
            artifacts: Vec::new(),
            metadata,
        }
    }

    /// Parse the envelope if present, otherwise synthesise one.
    pub fn parse_or_synthesize(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self::parse(stdout).unwrap_or_else(|| Self::synthesize(stdout, stderr, exit_code))
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Succeeded
    }
}

fn truncate(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
