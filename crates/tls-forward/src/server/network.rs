//! Listener creation.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

const LISTEN_BACKLOG: i32 = 1024;

/// Resolve `address` (`host:port`) to the first socket address it names.
pub async fn resolve(address: &str) -> std::io::Result<SocketAddr> {
    tokio::net::lookup_host(address).await?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("'{address}' did not resolve to any address"),
        )
    })
}

/// Create a non-blocking TCP listener with SO_REUSEADDR set.
pub fn create_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_on_ephemeral_port() {
        let addr = resolve("127.0.0.1:0").await.unwrap();
        let listener = create_listener(addr).unwrap();
        let local = listener.local_addr().unwrap();
        assert!(local.ip().is_loopback());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = resolve("localhost:8080").await.unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_resolve_rejects_garbage() {
        assert!(resolve("not an address").await.is_err());
    }
}
