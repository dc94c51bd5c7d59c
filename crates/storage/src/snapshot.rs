// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! zstd-compressed snapshots of the materialized state.

use crate::state::MaterializedState;
use std::path::Path;

pub(crate) const SNAPSHOT_FILE: &str = "state.snapshot.zst";
const ZSTD_LEVEL: i32 = 3;

/// Load the snapshot if one exists.
pub(crate) fn load(dir: &Path) -> std::io::Result<Option<MaterializedState>> {
    let path = dir.join(SNAPSHOT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let compressed = std::fs::read(&path)?;
    let bytes = zstd::decode_all(compressed.as_slice())?;
    match serde_json::from_slice(&bytes) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            // A corrupt snapshot is not fatal: the WAL still holds every
            // record since the previous good snapshot.
            tracing::warn!(error = %e, "snapshot unreadable, replaying WAL from empty state");
            Ok(None)
        }
    }
}

/// Write a snapshot atomically (tmp + rename).
pub(crate) fn save(dir: &Path, state: &MaterializedState) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let bytes = serde_json::to_vec(state)?;
    let compressed = zstd::encode_all(bytes.as_slice(), ZSTD_LEVEL)?;
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    std::fs::write(&tmp, &compressed)?;
    std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
    Ok(())
}
