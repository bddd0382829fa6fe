//! Inbound HTTP server.
//!
//! One hyper HTTP/1 connection task per accepted socket, optionally behind a
//! rustls acceptor. Every request goes through [`ForwardService`].

mod network;
mod response;
mod router;
mod tls;

pub use network::{create_listener, resolve};
pub use response::{error_response, failure_response, FailureBody};
pub use router::{handle_health, handle_metrics, ForwardService};
pub use tls::create_tls_acceptor;

use crate::config::Config;
use crate::forward::Forwarder;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub struct ForwardServer {
    config: Arc<Config>,
    service: ForwardService,
}

impl ForwardServer {
    pub fn new(config: Config, forwarder: Forwarder) -> Self {
        let service = ForwardService::new(
            forwarder,
            &config.forward.path,
            config.forward.max_body_bytes,
        );
        Self {
            config: Arc::new(config),
            service,
        }
    }

    /// Bind the configured address and serve until the accept loop fails.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = resolve(&self.config.listen.address()).await?;
        let listener = create_listener(addr)?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        let tls_acceptor = match self.config.listen.tls {
            Some(ref tls) => Some(create_tls_acceptor(&tls.cert_path, &tls.key_path)?),
            None => None,
        };

        let scheme = if tls_acceptor.is_some() { "https" } else { "http" };
        info!("Listening on {}://{}", scheme, listener.local_addr()?);
        info!("Forward endpoint: POST {}", self.config.forward.path);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let service = self.service.clone();
            let tls_acceptor = tls_acceptor.clone();

            tokio::spawn(async move {
                match tls_acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => serve_connection(TokioIo::new(tls_stream), service).await,
                        Err(err) => {
                            error!("TLS handshake failed from {}: {}", remote_addr, err);
                        }
                    },
                    None => serve_connection(TokioIo::new(stream), service).await,
                }
            });
        }
    }
}

async fn serve_connection<I>(io: I, service: ForwardService)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let svc = service_fn(move |req| {
        let service = service.clone();
        async move { Ok::<_, Infallible>(service.handle(req).await) }
    });

    if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
        debug!("Connection error: {}", err);
    }
}
