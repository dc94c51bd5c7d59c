// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for WAL append and replay.

use crate::record::Record;
use crate::wal::Wal;
use agd_core::Run;

fn run_created(id: &str) -> Record {
    Record::RunCreated { run: Run::builder().id(id).build() }
}

#[test]
fn appends_replay_in_order() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(&run_created("run-1")).unwrap();
        wal.append(&run_created("run-2")).unwrap();
        wal.append(&run_created("run-3")).unwrap();
    }

    let mut seen = Vec::new();
    let applied = Wal::replay(dir.path(), |record| {
        if let Record::RunCreated { run } = record {
            seen.push(run.id.to_string());
        }
    })
    .unwrap();
    assert_eq!(applied, 3);
    assert_eq!(seen, vec!["run-1", "run-2", "run-3"]);
}

#[test]
fn replay_of_missing_wal_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let applied = Wal::replay(dir.path(), |_| panic!("nothing to apply")).unwrap();
    assert_eq!(applied, 0);
}

#[test]
fn torn_final_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(&run_created("run-ok")).unwrap();
    }
    // Simulate a crash mid-append.
    let path = dir.path().join("wal.jsonl");
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("{\"op\":\"run_created\",\"run\":{\"id\":\"run-torn");
    std::fs::write(&path, contents).unwrap();

    let mut seen = 0;
    let applied = Wal::replay(dir.path(), |_| seen += 1).unwrap();
    assert_eq!(applied, 1);
    assert_eq!(seen, 1);
}

#[test]
fn unknown_ops_replay_as_noops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.jsonl");
    std::fs::write(&path, "{\"op\":\"from_the_future\",\"field\":1}\n").unwrap();

    let mut records = Vec::new();
    Wal::replay(dir.path(), |r| records.push(r)).unwrap();
    assert_eq!(records, vec![Record::Unknown]);
}

#[test]
fn truncate_empties_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut wal = Wal::open(dir.path()).unwrap();
    wal.append(&run_created("run-1")).unwrap();
    wal.truncate().unwrap();

    let applied = Wal::replay(dir.path(), |_| {}).unwrap();
    assert_eq!(applied, 0);

    // Still writable after truncation.
    wal.append(&run_created("run-2")).unwrap();
    let applied = Wal::replay(dir.path(), |_| {}).unwrap();
    assert_eq!(applied, 1);
}
