use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::Config;
use crate::error::Result;
use crate::proxy::session::Session;

/// Per-session deadlines taken from [`Config`].
#[derive(Debug, Clone, Copy)]
struct SessionLimits {
    header_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

/// TLS listener that starts one independent relay session per connection.
pub struct RelayListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    limits: SessionLimits,
    sessions: Option<Arc<Semaphore>>,
}

impl RelayListener {
    pub async fn bind(config: &Config, tls_config: Arc<ServerConfig>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls_config),
            limits: SessionLimits {
                header_timeout: config.header_timeout,
                connect_timeout: config.connect_timeout,
            },
            sessions: config.max_sessions.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` flips.
    ///
    /// Sessions already running are not interrupted by shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(addr = %self.local_addr()?, "TLS relay listening");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (tcp_stream, peer_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "failed to accept TCP connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "accepted TCP connection");

                    let permit = match &self.sessions {
                        Some(sessions) => match sessions.clone().try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                warn!(peer = %peer_addr, "session limit reached, dropping connection");
                                continue;
                            }
                        },
                        None => None,
                    };

                    let acceptor = self.acceptor.clone();
                    let limits = self.limits;
                    tokio::spawn(
                        async move {
                            handle_connection(acceptor, tcp_stream, limits).await;
                            drop(permit);
                        }
                        .instrument(tracing::info_span!("session", peer = %peer_addr)),
                    );
                }
                _ = shutdown.changed() => {
                    info!("TLS relay shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(acceptor: TlsAcceptor, tcp_stream: TcpStream, limits: SessionLimits) {
    let deadline = limits.header_timeout.map(|t| Instant::now() + t);

    let handshake = acceptor.accept(tcp_stream);
    let result = match deadline {
        Some(deadline) => match timeout_at(deadline, handshake).await {
            Ok(result) => result,
            Err(_) => {
                debug!("TLS handshake timed out");
                return;
            }
        },
        None => handshake.await,
    };

    let tls_stream = match result {
        Ok(tls_stream) => tls_stream,
        Err(e) => {
            debug!(error = %e, "TLS handshake failed");
            return;
        }
    };

    let session = Session::new(tls_stream)
        .with_header_deadline(deadline)
        .with_connect_timeout(limits.connect_timeout);

    if let Err(e) = session.run().await {
        if e.is_upstream_failure() {
            warn!(error = %e, "destination connect failed");
        } else {
            debug!(error = %e, "session ended");
        }
    }
}
