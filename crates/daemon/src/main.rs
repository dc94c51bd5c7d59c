// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agdd` — the Agents Dashboard daemon binary.

use agd_daemon::{run_daemon, DaemonConfig};

fn main() -> std::process::ExitCode {
    let config = match DaemonConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("agdd: {e}");
            return std::process::ExitCode::from(4);
        }
    };

    let guard = match agd_daemon::logging_init(&config.log_dir()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("agdd: cannot initialise logging: {e}");
            return std::process::ExitCode::from(4);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("agdd: cannot start runtime: {e}");
            return std::process::ExitCode::from(4);
        }
    };

    let result = runtime.block_on(run_daemon(config));
    drop(guard);
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("agdd: {e}");
            std::process::ExitCode::from(4)
        }
    }
}
