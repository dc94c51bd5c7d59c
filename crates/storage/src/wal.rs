// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSON-lines write-ahead log.

use crate::record::Record;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub(crate) const WAL_FILE: &str = "wal.jsonl";

/// Append handle over the WAL file.
pub(crate) struct Wal {
    path: PathBuf,
    file: File,
}

impl Wal {
    /// Open (or create) the WAL under `dir`.
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(WAL_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Append one record and flush it to the OS.
    pub fn append(&mut self, record: &Record) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()
    }

    /// Fsync the WAL file. Called at terminal run transitions, where losing
    /// the record would resurrect a finished run after a crash.
    pub fn sync(&mut self) -> std::io::Result<()> {
        self.file.sync_data()
    }

    /// Replay every parseable record in file order.
    ///
    /// A torn final line (crash mid-append) is tolerated and logged; any
    /// other unparseable line is as well — replay favours availability over
    /// strictness since records are self-contained.
    pub fn replay(dir: &Path, mut apply: impl FnMut(Record)) -> std::io::Result<usize> {
        let path = dir.join(WAL_FILE);
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut applied = 0usize;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => {
                    apply(record);
                    applied += 1;
                }
                Err(e) => {
                    tracing::warn!(lineno, error = %e, "skipping unparseable WAL line");
                }
            }
        }
        Ok(applied)
    }

    /// Truncate after a successful snapshot.
    pub fn truncate(&mut self) -> std::io::Result<()> {
        self.file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        // Re-open in append mode for subsequent writes.
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
