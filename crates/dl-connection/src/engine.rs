//! Engine API client over a Unix socket
//!
//! Speaks just enough HTTP/1.0 for liveness probes and small GET requests:
//! one request per connection, body read until the engine closes the stream.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dl_core::error::EngineError;
use dl_core::traits::{EngineClient, EngineConnector};

/// Engine liveness endpoint
pub const PING_PATH: &str = "/_ping";

/// Client bound to one engine socket
#[derive(Debug, Clone)]
pub struct UnixEngineClient {
    endpoint: PathBuf,
}

impl UnixEngineClient {
    pub fn new(endpoint: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    #[cfg(unix)]
    async fn request(&self, path: &str) -> Result<(u16, String), EngineError> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixStream;

        let unreachable = |source| EngineError::Unreachable {
            path: self.endpoint.display().to_string(),
            source,
        };

        let mut stream = UnixStream::connect(&self.endpoint)
            .await
            .map_err(unreachable)?;
        let request = format!("GET {} HTTP/1.0\r\nHost: docker\r\n\r\n", path);
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(unreachable)?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.map_err(unreachable)?;
        parse_http_response(&raw)
    }

    #[cfg(not(unix))]
    async fn request(&self, _path: &str) -> Result<(u16, String), EngineError> {
        Err(EngineError::Unsupported(std::env::consts::OS.to_string()))
    }
}

#[async_trait]
impl EngineClient for UnixEngineClient {
    async fn ping(&self) -> Result<(), EngineError> {
        self.get(PING_PATH).await.map(|_| ())
    }

    async fn get(&self, path: &str) -> Result<String, EngineError> {
        let (status, body) = self.request(path).await?;
        if !(200..300).contains(&status) {
            return Err(EngineError::Status {
                status,
                body: body.trim().to_string(),
            });
        }
        Ok(body)
    }

    fn endpoint(&self) -> &Path {
        &self.endpoint
    }
}

/// Creates [`UnixEngineClient`]s
#[derive(Debug, Clone, Default)]
pub struct UnixEngineConnector;

impl EngineConnector for UnixEngineConnector {
    fn connect(&self, endpoint: &Path) -> Arc<dyn EngineClient> {
        Arc::new(UnixEngineClient::new(endpoint))
    }
}

/// Split a raw HTTP response into status code and body
pub fn parse_http_response(raw: &[u8]) -> Result<(u16, String), EngineError> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = text
        .split_once("\r\n\r\n")
        .ok_or_else(|| EngineError::Malformed("missing header terminator".to_string()))?;

    let status_line = head
        .lines()
        .next()
        .ok_or_else(|| EngineError::Malformed("empty response".to_string()))?;
    let mut parts = status_line.split_whitespace();
    match parts.next() {
        Some(version) if version.starts_with("HTTP/") => {}
        _ => {
            return Err(EngineError::Malformed(format!(
                "bad status line '{}'",
                status_line
            )))
        }
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| EngineError::Malformed(format!("bad status line '{}'", status_line)))?;

    Ok((status, body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok_response() {
        let raw = b"HTTP/1.0 200 OK\r\nApi-Version: 1.43\r\nContent-Length: 2\r\n\r\nOK";
        let (status, body) = parse_http_response(raw).unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "OK");
    }

    #[test]
    fn test_parse_error_status() {
        let raw = b"HTTP/1.1 500 Internal Server Error\r\n\r\n{\"message\":\"boom\"}";
        let (status, body) = parse_http_response(raw).unwrap();
        assert_eq!(status, 500);
        assert!(body.contains("boom"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_http_response(b"garbage"),
            Err(EngineError::Malformed(_))
        ));
        assert!(matches!(
            parse_http_response(b"SSH-2.0-OpenSSH\r\n\r\n"),
            Err(EngineError::Malformed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ping_against_fake_engine() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixListener;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            stream
                .write_all(b"HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\r\nOK")
                .await
                .unwrap();
            request
        });

        let client = UnixEngineConnector.connect(&path);
        client.ping().await.unwrap();
        assert!(server.await.unwrap().starts_with("GET /_ping HTTP/1.0"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ping_missing_socket_unreachable() {
        let dir = tempfile::TempDir::new().unwrap();
        let client = UnixEngineClient::new(dir.path().join("absent.sock"));
        assert!(matches!(
            client.ping().await,
            Err(EngineError::Unreachable { .. })
        ));
    }
}
