//! Upgrade acceptor: TCP accept, WebSocket handshake, admission.
//!
//! Accepting runs on tokio; each handshake runs on the blocking pool with a
//! read/write timeout so a silent client cannot hold a worker forever. Only
//! the configured path is upgraded; anything else gets a 404.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{Error as WsError, HandshakeError};

use crate::gateway::{Gateway, GatewayError};

use super::transport::WsTransport;

/// Handshake and admission settings.
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Request path that is upgraded.
    pub path: String,
    /// Bound on the whole handshake exchange.
    pub handshake_timeout: Duration,
    /// Bound on frames queued for a slow client.
    pub max_write_buffer_bytes: usize,
}

/// Errors upgrading one client.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("I/O error during upgrade: {0}")]
    Io(#[from] io::Error),

    #[error("Handshake timed out")]
    TimedOut,

    #[error("Upgrade rejected with status {0}")]
    Rejected(u16),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Admission(#[from] GatewayError),
}

/// Listens for upgrade requests and admits the resulting connections.
pub struct Acceptor {
    listener: TcpListener,
    gateway: Arc<Gateway>,
    config: Arc<AcceptorConfig>,
}

impl Acceptor {
    /// Binds the listen address. Failure here is fatal at startup.
    pub async fn bind(
        addr: SocketAddr,
        gateway: Arc<Gateway>,
        config: AcceptorConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            gateway,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever.
    pub async fn run(self) {
        tracing::info!(
            addr = ?self.listener.local_addr().ok(),
            path = %self.config.path,
            "Accepting WebSocket upgrades"
        );

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Typically descriptor exhaustion; back off instead of spinning.
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            if self.gateway.is_draining() {
                drop(stream);
                continue;
            }

            let stream = match stream.into_std() {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!(%peer, "Failed to detach stream: {}", e);
                    continue;
                }
            };

            let gateway = self.gateway.clone();
            let config = self.config.clone();
            tokio::task::spawn_blocking(move || {
                let admitted = upgrade(stream, &config)
                    .and_then(|t| gateway.admit(Box::new(t)).map_err(UpgradeError::from));
                match admitted {
                    Ok(conn) => tracing::trace!(%peer, connection = %conn.id(), "Upgraded"),
                    Err(UpgradeError::Rejected(status)) => {
                        tracing::debug!(%peer, status, "Upgrade rejected")
                    }
                    Err(e) => tracing::debug!(%peer, "Upgrade failed: {}", e),
                }
            });
        }
    }
}

/// Runs the server side of the handshake on a blocking stream.
pub fn upgrade(stream: TcpStream, config: &AcceptorConfig) -> Result<WsTransport, UpgradeError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(config.handshake_timeout))?;
    stream.set_write_timeout(Some(config.handshake_timeout))?;
    stream.set_nodelay(true)?;

    let path = config.path.as_str();
    let check_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == path {
            Ok(response)
        } else {
            Err(not_found())
        }
    };

    let ws_config = WebSocketConfig {
        max_write_buffer_size: config.max_write_buffer_bytes,
        ..WebSocketConfig::default()
    };

    match tungstenite::accept_hdr_with_config(stream, check_path, Some(ws_config)) {
        Ok(socket) => Ok(WsTransport::new(socket)?),
        // A read timeout surfaces as an interrupted handshake.
        Err(HandshakeError::Interrupted(_)) => Err(UpgradeError::TimedOut),
        Err(HandshakeError::Failure(WsError::Http(response))) => {
            Err(UpgradeError::Rejected(response.status().as_u16()))
        }
        Err(HandshakeError::Failure(WsError::Io(e))) if is_timeout(&e) => {
            Err(UpgradeError::TimedOut)
        }
        Err(HandshakeError::Failure(e)) => Err(UpgradeError::Handshake(e.to_string())),
    }
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Not Found".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
