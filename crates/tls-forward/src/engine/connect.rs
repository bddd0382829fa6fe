//! Outbound TCP, optionally tunnelled through an HTTP proxy with `CONNECT`.

use crate::error::ForwardError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Upper bound on a proxy's CONNECT response head.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// An HTTP proxy able to open tunnels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProxy {
    host: String,
    port: u16,
    authorization: Option<String>,
}

impl HttpProxy {
    /// Accepts `http://[user:pass@]host:port`. Credentials may be percent-encoded.
    pub fn parse(raw: &str) -> Result<Self, ForwardError> {
        let url = Url::parse(raw).map_err(ForwardError::factory)?;
        if url.scheme() != "http" {
            return Err(ForwardError::factory(format!(
                "unsupported proxy scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ForwardError::factory("proxy without host"))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        let authorization = if url.username().is_empty() {
            None
        } else {
            let user = urlencoding::decode(url.username()).map_err(ForwardError::factory)?;
            let pass = urlencoding::decode(url.password().unwrap_or_default())
                .map_err(ForwardError::factory)?;
            Some(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
        };

        Ok(Self {
            host,
            port,
            authorization,
        })
    }

    /// Connect to the proxy and ask it for a tunnel to `host:port`.
    pub async fn tunnel(&self, host: &str, port: u16) -> Result<TcpStream, ForwardError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| ForwardError::transport(format!("proxy connect failed: {e}")))?;
        stream.set_nodelay(true).map_err(ForwardError::transport)?;

        let target = format!("{host}:{port}");
        let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
        if let Some(ref authorization) = self.authorization {
            request.push_str(&format!("Proxy-Authorization: {authorization}\r\n"));
        }
        request.push_str("\r\n");
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(ForwardError::transport)?;

        let head = read_response_head(&mut stream).await?;
        let status_line = head.lines().next().unwrap_or_default();
        let status = status_line.split_whitespace().nth(1).unwrap_or_default();
        if !status.starts_with('2') {
            return Err(ForwardError::transport(format!(
                "proxy refused tunnel to {target}: {status_line}"
            )));
        }

        debug!(proxy = %self.host, %target, "Proxy tunnel established");
        Ok(stream)
    }
}

/// Read up to the blank line ending the proxy's response head.
///
/// Reads one byte at a time so nothing past the head is consumed.
async fn read_response_head(stream: &mut TcpStream) -> Result<String, ForwardError> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_RESPONSE {
            return Err(ForwardError::transport("proxy response head too large"));
        }
        let read = stream
            .read(&mut byte)
            .await
            .map_err(ForwardError::transport)?;
        if read == 0 {
            return Err(ForwardError::transport(
                "proxy closed the connection during CONNECT",
            ));
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

/// Open a TCP connection to the target of `url`, through `proxy` when given.
pub async fn dial(url: &Url, proxy: Option<&HttpProxy>) -> Result<TcpStream, ForwardError> {
    let host = url
        .host_str()
        .ok_or_else(|| ForwardError::transport("target URL has no host"))?;
    // IPv6 literals keep their brackets in host_str
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ForwardError::transport("target URL has no port"))?;

    match proxy {
        Some(proxy) => proxy.tunnel(host, port).await,
        None => {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| ForwardError::transport(format!("connect to {host}:{port} failed: {e}")))?;
            stream.set_nodelay(true).map_err(ForwardError::transport)?;
            Ok(stream)
        }
    }
}
