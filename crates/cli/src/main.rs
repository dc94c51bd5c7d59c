// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agd` — operator CLI for the Agents Dashboard daemon.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod exit_error;
mod output;

use clap::Parser;
use exit_error::ExitError;

#[derive(Parser)]
#[command(name = "agd", version, about = "Agents Dashboard operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help/version are successful exits; anything else is usage.
            let is_help = matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            );
            let _ = e.print();
            return if is_help {
                std::process::ExitCode::SUCCESS
            } else {
                std::process::ExitCode::from(1)
            };
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("agd: cannot start runtime: {e}");
            return std::process::ExitCode::from(4);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("agd: {e}");
            std::process::ExitCode::from(e.code())
        }
    }
}

#[cfg(test)]
mod cli_tests {
    use assert_cmd::Command;

    #[test]
    fn help_exits_zero() {
        Command::cargo_bin("agd").unwrap().arg("--help").assert().success();
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        Command::cargo_bin("agd").unwrap().arg("--no-such-flag").assert().code(1);
    }

    #[test]
    fn missing_subcommand_is_a_usage_error() {
        Command::cargo_bin("agd").unwrap().assert().code(1);
    }

    #[test]
    fn unreachable_daemon_exits_three() {
        Command::cargo_bin("agd")
            .unwrap()
            .env("AGD_SOCKET", "/nonexistent/agdd.sock")
            .args(["daemon", "status"])
            .assert()
            .code(3);
    }
}
