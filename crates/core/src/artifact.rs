// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact records and MIME inference.

use crate::run::RunId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A file extracted from a run workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub run_id: RunId,
    pub filename: String,
    /// Path relative to the workspace root, preserved in the artifact store.
    pub relative_path: String,
    pub byte_size: u64,
    /// SHA-256 of the source bytes, lowercase hex.
    pub sha256: String,
    pub mime_type: String,
}

/// Fixed extension → MIME table. Unlisted extensions fall back to
/// `application/octet-stream`.
const MIME_TABLE: &[(&str, &str)] = &[
    ("patch", "text/x-patch"),
    ("diff", "text/x-patch"),
    ("md", "text/markdown"),
    ("json", "application/json"),
    ("yml", "application/yaml"),
    ("yaml", "application/yaml"),
    ("log", "text/plain"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("html", "text/html"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
    ("har", "application/json"),
    ("trace", "application/octet-stream"),
];

/// Infer a MIME type from the file extension, case-insensitively.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    MIME_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, m)| *m)
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
