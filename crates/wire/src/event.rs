// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The structured event line format.
//!
//! Harness runtimes emit one JSON object per line. Only lines whose
//! `marker` field equals [`EVENT_MARKER`] — compared literally — are
//! structured events; every other line is a raw log line.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Protocol marker for structured harness runtime events, version 1.
pub const EVENT_MARKER: &str = "agentsdashboard.harness-runtime-event.v1";

/// One structured event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub marker: String,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl WireEvent {
    pub fn new(sequence: u64, event_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            marker: EVENT_MARKER.to_string(),
            sequence,
            event_type: event_type.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Parse one chunk line. `None` means the line is not a structured
    /// event (bad JSON, wrong marker, missing fields) and must be treated
    /// as a raw log line.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let event: WireEvent = serde_json::from_str(trimmed).ok()?;
        if event.marker != EVENT_MARKER {
            return None;
        }
        Some(event)
    }

    /// Serialize to one newline-free JSON line.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The content field parsed as JSON, when it holds a JSON object.
    pub fn content_json(&self) -> Option<serde_json::Value> {
        let trimmed = self.content.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str(trimmed).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
