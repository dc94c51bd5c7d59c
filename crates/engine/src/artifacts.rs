// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace artifact extraction.
//!
//! After a run the workspace is scanned for files worth keeping: patches,
//! reports, logs, captures. Candidates are filtered by an allowlist,
//! excluded-directory rules, and the task's caps, then copied into the
//! artifact store preserving their relative layout.

use agd_core::{mime_for_path, Artifact, ArtifactPolicy, RunId};
use glob::Pattern;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default allowlist applied when the task policy has no override.
pub const DEFAULT_PATTERNS: &[&str] = &[
    "*.patch", "*.diff", "*.md", "*.json", "*.yml", "*.yaml", "*.log", "*.txt", "*.xml",
    "*.html", "*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.webp", "*.mp4", "*.webm",
    "*.zip", "*.tar", "*.gz", "*.har", "*.trace",
];

/// Path components that never yield artifacts.
const EXCLUDED_COMPONENTS: &[&str] = &[
    ".git", ".github", "node_modules", "bin", "obj", "dist", "build", ".venv", "venv",
    "__pycache__", ".idea", ".vscode",
];

struct Candidate {
    absolute: PathBuf,
    relative: PathBuf,
    size: u64,
}

/// Scan `workspace` and copy eligible files under `artifact_root/<run-id>/`.
///
/// One unreadable file never fails the batch: it is logged and skipped.
/// Candidates are taken smallest-first so the count cap keeps as many
/// files as possible.
pub fn extract(
    run_id: RunId,
    workspace: &Path,
    policy: &ArtifactPolicy,
    artifact_root: &Path,
) -> Vec<Artifact> {
    let patterns = compile_patterns(policy);
    let mut candidates = Vec::new();
    collect(workspace, workspace, &patterns, &mut candidates);
    candidates.sort_by_key(|c| c.size);

    let destination_root = artifact_root.join(run_id.as_str());
    let mut extracted = Vec::new();
    let mut total_bytes = 0u64;

    for candidate in candidates {
        if extracted.len() >= policy.max_artifacts {
            break;
        }
        if total_bytes.saturating_add(candidate.size) > policy.max_total_bytes {
            continue;
        }

        let bytes = match std::fs::read(&candidate.absolute) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %candidate.absolute.display(), error = %e, "skipping unreadable artifact");
                continue;
            }
        };

        let destination = destination_root.join(&candidate.relative);
        if let Some(parent) = destination.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %destination.display(), error = %e, "artifact dir create failed");
                continue;
            }
        }
        if let Err(e) = std::fs::write(&destination, &bytes) {
            warn!(path = %destination.display(), error = %e, "artifact copy failed");
            continue;
        }

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let sha256 = format!("{:x}", hasher.finalize());

        total_bytes += candidate.size;
        extracted.push(Artifact {
            run_id,
            filename: candidate
                .relative
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            relative_path: candidate.relative.to_string_lossy().into_owned(),
            byte_size: candidate.size,
            sha256,
            mime_type: mime_for_path(&candidate.relative).to_string(),
        });
    }

    debug!(run_id = %run_id, count = extracted.len(), total_bytes, "artifacts extracted");
    extracted
}

fn compile_patterns(policy: &ArtifactPolicy) -> Vec<Pattern> {
    let sources: Vec<&str> = match &policy.patterns {
        Some(patterns) => patterns.iter().map(String::as_str).collect(),
        None => DEFAULT_PATTERNS.to_vec(),
    };
    sources
        .iter()
        .filter_map(|source| match Pattern::new(source) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = *source, error = %e, "ignoring malformed artifact pattern");
                None
            }
        })
        .collect()
}

fn collect(root: &Path, dir: &Path, patterns: &[Pattern], out: &mut Vec<Candidate>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "artifact scan skipping directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(file_type) = entry.file_type() else { continue };

        if file_type.is_dir() {
            if EXCLUDED_COMPONENTS.contains(&name.as_str()) {
                continue;
            }
            collect(root, &path, patterns, out);
        } else if file_type.is_file() && patterns.iter().any(|p| p.matches(&name)) {
            let Ok(metadata) = entry.metadata() else { continue };
            let Ok(relative) = path.strip_prefix(root) else { continue };
            out.push(Candidate {
                absolute: path.clone(),
                relative: relative.to_path_buf(),
                size: metadata.len(),
            });
        }
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
