// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing exit codes.
//!
//! `0` ok, `1` usage, `2` dependency missing, `3` unreachable store/daemon,
//! `4` unrecoverable.

#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    DependencyMissing(String),

    #[error("daemon unreachable at {0} (is agdd running?)")]
    Unreachable(String),

    #[error("{0}")]
    Unrecoverable(String),
}

impl ExitError {
    pub fn code(&self) -> u8 {
        match self {
            ExitError::Usage(_) => 1,
            ExitError::DependencyMissing(_) => 2,
            ExitError::Unreachable(_) => 3,
            ExitError::Unrecoverable(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExitError;
    use yare::parameterized;

    #[parameterized(
        usage = { ExitError::Usage("bad flag".into()), 1 },
        dependency = { ExitError::DependencyMissing("docker".into()), 2 },
        unreachable = { ExitError::Unreachable("/run/agd.sock".into()), 3 },
        unrecoverable = { ExitError::Unrecoverable("boom".into()), 4 },
    )]
    fn codes_match_contract(error: ExitError, code: u8) {
        assert_eq!(error.code(), code);
    }
}
