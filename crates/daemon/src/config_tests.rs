// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for daemon configuration.

use crate::config::{ConfigError, DaemonConfig};

#[test]
fn defaults_are_sane() {
    let config = DaemonConfig::default();
    assert_eq!(config.scheduler_tick_secs, 10);
    assert_eq!(config.proxy_sweep_secs, 60);
    assert_eq!(config.per_repo_cap, 1);
    assert_eq!(config.retention_days, 30);
    assert!(config.containers_enabled());
    assert!(config.socket_path().ends_with("agdd.sock"));
}

#[test]
fn parses_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "state_dir = \"/srv/agd\"\nper_repo_cap = 2\nwebhook_bind = \"0.0.0.0:9900\"\n",
    )
    .unwrap();

    let config = DaemonConfig::from_file(&path).unwrap();
    assert_eq!(config.state_dir, std::path::PathBuf::from("/srv/agd"));
    assert_eq!(config.per_repo_cap, 2);
    assert_eq!(config.webhook_bind, "0.0.0.0:9900");
    // Untouched fields stay on defaults.
    assert_eq!(config.scheduler_tick_secs, 10);
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "no_such_key = true\n").unwrap();
    assert!(matches!(DaemonConfig::from_file(&path), Err(ConfigError::Parse { .. })));
}

#[test]
fn empty_docker_socket_disables_containers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "docker_socket = \"\"\n").unwrap();
    let config = DaemonConfig::from_file(&path).unwrap();
    assert!(!config.containers_enabled());
}
