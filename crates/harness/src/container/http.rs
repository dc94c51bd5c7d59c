// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP/1.1 client for the Docker Engine API over its Unix socket.
//!
//! The engine API is the only consumer, so this handles exactly what it
//! returns: status line, headers, then a body framed by Content-Length or
//! chunked transfer encoding.

use super::ContainerError;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(super) async fn get(socket: &Path, path: &str) -> Result<String, ContainerError> {
    let request = format!("GET {path} HTTP/1.1\r\nHost: docker\r\n\r\n");
    timed_request(socket, &request).await
}

pub(super) async fn post(socket: &Path, path: &str, body: &str) -> Result<String, ContainerError> {
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: docker\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len(),
    );
    timed_request(socket, &request).await
}

pub(super) async fn delete(socket: &Path, path: &str) -> Result<String, ContainerError> {
    let request = format!("DELETE {path} HTTP/1.1\r\nHost: docker\r\n\r\n");
    timed_request(socket, &request).await
}

async fn timed_request(socket: &Path, request: &str) -> Result<String, ContainerError> {
    tokio::time::timeout(REQUEST_TIMEOUT, send_request(socket, request))
        .await
        .map_err(|_| ContainerError::Api("docker request timed out".to_string()))?
}

async fn send_request(socket: &Path, request: &str) -> Result<String, ContainerError> {
    let mut stream = UnixStream::connect(socket)
        .await
        .map_err(|e| ContainerError::Api(format!("connect {} failed: {e}", socket.display())))?;
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ContainerError::Api(format!("write failed: {e}")))?;

    let mut reader = BufReader::new(&mut stream);
    read_http_response(&mut reader).await
}

/// Parse one HTTP response, returning the body on 2xx and an API error
/// carrying status + body otherwise.
pub(super) async fn read_http_response<R>(reader: &mut R) -> Result<String, ContainerError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| ContainerError::Api(format!("status read failed: {e}")))?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ContainerError::Api(format!("malformed status line {status_line:?}")))?;

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| ContainerError::Api(format!("header read failed: {e}")))?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let body = if headers.get("transfer-encoding").map(String::as_str) == Some("chunked") {
        read_chunked_body(reader).await?
    } else if let Some(length) = headers.get("content-length").and_then(|v| v.parse::<usize>().ok())
    {
        let mut buf = vec![0u8; length];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| ContainerError::Api(format!("body read failed: {e}")))?;
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        let mut buf = String::new();
        let _ = reader.read_to_string(&mut buf).await;
        buf
    };

    if (200..300).contains(&status) {
        Ok(body)
    } else if status == 404 {
        Err(ContainerError::NotFound(body))
    } else {
        Err(ContainerError::Api(format!("docker returned {status}: {}", body.trim())))
    }
}

async fn read_chunked_body<R>(reader: &mut R) -> Result<String, ContainerError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader
            .read_line(&mut size_line)
            .await
            .map_err(|e| ContainerError::Api(format!("chunk size read failed: {e}")))?;
        let size = usize::from_str_radix(size_line.trim(), 16)
            .map_err(|_| ContainerError::Api(format!("malformed chunk size {size_line:?}")))?;
        if size == 0 {
            // Trailing CRLF after the last chunk.
            let mut trailer = String::new();
            let _ = reader.read_line(&mut trailer).await;
            break;
        }
        let mut chunk = vec![0u8; size + 2];
        reader
            .read_exact(&mut chunk)
            .await
            .map_err(|e| ContainerError::Api(format!("chunk read failed: {e}")))?;
        chunk.truncate(size);
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Percent-encode a query value (the label filter JSON).
pub(super) fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
