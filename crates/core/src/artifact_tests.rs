// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for MIME inference.

use crate::artifact::mime_for_path;
use std::path::Path;
use yare::parameterized;

#[parameterized(
    patch = { "fix.patch", "text/x-patch" },
    diff = { "changes.diff", "text/x-patch" },
    markdown = { "README.md", "text/markdown" },
    json = { "report.json", "application/json" },
    yaml = { "ci.yaml", "application/yaml" },
    log = { "build.log", "text/plain" },
    png = { "shot.png", "image/png" },
    upper = { "SHOT.PNG", "image/png" },
    har = { "session.har", "application/json" },
    unknown = { "binary.so", "application/octet-stream" },
    no_ext = { "Makefile", "application/octet-stream" },
)]
fn infers_mime_from_extension(name: &str, expected: &str) {
    assert_eq!(mime_for_path(Path::new(name)), expected);
}
