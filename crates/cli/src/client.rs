// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC client for the daemon socket.

use crate::exit_error::ExitError;
use agd_wire::{read_message, write_message, Request, Response};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Socket path: `AGD_SOCKET` override or the daemon default.
    pub fn socket_path() -> PathBuf {
        std::env::var_os("AGD_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| agd_daemon::DaemonConfig::default().socket_path())
    }

    pub async fn connect(path: &Path) -> Result<Self, ExitError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|_| ExitError::Unreachable(path.display().to_string()))?;
        Ok(Self { stream })
    }

    /// One request/response roundtrip. Protocol-level errors surface as
    /// unrecoverable; a dropped daemon surfaces as unreachable.
    pub async fn request(&mut self, request: Request) -> Result<Response, ExitError> {
        write_message(&mut self.stream, &request)
            .await
            .map_err(|e| ExitError::Unrecoverable(format!("request failed: {e}")))?;
        self.read_response().await
    }

    /// Read one more response (event streams).
    pub async fn read_response(&mut self) -> Result<Response, ExitError> {
        match read_message(&mut self.stream).await {
            Ok(response) => Ok(response),
            Err(agd_wire::FramingError::Closed) => {
                Err(ExitError::Unreachable("connection closed".to_string()))
            }
            Err(e) => Err(ExitError::Unrecoverable(format!("response failed: {e}"))),
        }
    }
}

/// Turn a daemon error response into the right exit class.
pub fn check_response(response: Response) -> Result<Response, ExitError> {
    match response {
        Response::Error { class, message } => match class.as_str() {
            "not_found" | "invalid_input" | "invalid_transition" => {
                Err(ExitError::Usage(message))
            }
            "configuration_error" => Err(ExitError::DependencyMissing(message)),
            _ => Err(ExitError::Unrecoverable(message)),
        },
        other => Ok(other),
    }
}
